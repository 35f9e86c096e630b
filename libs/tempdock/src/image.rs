// Image resolution: use the local copy when present, pull otherwise
use crate::engine::ContainerEngine;
use crate::error::{ProvisionError, Result};
use crate::logger::Logger;
use futures_util::stream::StreamExt;
use tracing::debug;

/// Append `:latest` to references that carry neither a tag nor a digest
///
/// `localhost:5000/app` has a registry port, not a tag, so only the last
/// path segment is inspected.
pub fn normalize_reference(image: &str) -> String {
    if image.contains('@') {
        return image.to_string();
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if last_segment.contains(':') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

/// Ensure `image` is available locally, pulling it if needed
///
/// Pull progress events are drained without interpretation; only a
/// stream error fails the resolution.
pub async fn ensure_image(engine: &dyn ContainerEngine, image: &str, logger: &dyn Logger) -> Result<()> {
    let reference = normalize_reference(image);
    let pull_error = |source| ProvisionError::Pull {
        image: reference.clone(),
        source,
    };

    logger.log(format_args!("Listing available images"));
    let images = engine.list_images().await.map_err(pull_error)?;
    let present = images
        .iter()
        .flat_map(|summary| summary.repo_tags.iter())
        .any(|tag| *tag == reference);
    if present {
        logger.log(format_args!("✓ Image cache hit: {}", reference));
        return Ok(());
    }

    logger.log(format_args!("Pulling {}", reference));
    let mut events = engine.pull_image(&reference);
    while let Some(event) = events.next().await {
        let event = event.map_err(pull_error)?;
        if let Some(status) = event.status {
            debug!(image = %reference, status = %status, "Pull progress");
        }
    }

    logger.log(format_args!("✓ Image {} pulled", reference));
    Ok(())
}
