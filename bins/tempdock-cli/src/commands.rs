// CLI commands for tempdock fixtures
use anyhow::{bail, Context, Result};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tempdock::{Provisioner, TracingLogger};
use tempdock_common::config::ProvisionerConfig;
use tempdock_common::types::{PortSpec, ProvisionRequest};
use tracing::info;

/// Parse a `KEY=VALUE` environment flag
pub fn parse_env_pair(entry: &str) -> Result<(String, String), String> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", entry)),
    }
}

/// Load a request from a JSON file
fn load_request(path: &Path) -> Result<ProvisionRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Assemble the request from an optional file plus command-line flags
///
/// Flags win over the file for name, image and cmd; ports and env entries
/// are appended.
pub fn build_request(
    file: Option<&Path>,
    name: Option<String>,
    image: Option<String>,
    ports: Vec<PortSpec>,
    env: Vec<(String, String)>,
    cmd: Vec<String>,
) -> Result<ProvisionRequest> {
    let mut request = match file {
        Some(path) => load_request(path)?,
        None => {
            let Some(image) = image.clone() else {
                bail!("--image is required without --request");
            };
            let name = name.clone().unwrap_or_else(|| default_name(&image));
            ProvisionRequest::new(name, image)
        }
    };

    if let Some(name) = name {
        request.name = name;
    }
    if let Some(image) = image {
        request.image = image;
    }
    request.ports.extend(ports);
    request.env.extend(env);
    if !cmd.is_empty() {
        request.cmd = Some(cmd);
    }

    Ok(request)
}

/// `redis:7` -> `redis`, `ghcr.io/org/app:1` -> `app`
fn default_name(image: &str) -> String {
    let repository = image.rsplit('/').next().unwrap_or(image);
    repository
        .split(':')
        .next()
        .unwrap_or(repository)
        .to_string()
}

fn provisioner() -> Result<Provisioner> {
    let config = ProvisionerConfig::from_env().context("Invalid TEMPDOCK_* configuration")?;
    let provisioner = Provisioner::connect_local()
        .context("Failed to connect to Docker")?
        .with_config(config)
        .with_logger(Arc::new(TracingLogger));
    Ok(provisioner)
}

/// Provision, print the handle, and (unless detached) remove on Ctrl-C
pub async fn up(request: &ProvisionRequest, detach: bool) -> Result<()> {
    let provisioner = provisioner()?;

    let (handle, teardown) = provisioner
        .provision(request)
        .await
        .with_context(|| format!("Failed to provision {}", request.image))?;

    println!("{}", serde_json::to_string_pretty(&handle)?);

    if detach {
        info!("Detached; remove with: tempdock down {}", handle.identifier);
        return Ok(());
    }

    info!("✓ {} ready, press Ctrl-C to remove", handle.name);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    teardown
        .run()
        .await
        .with_context(|| format!("Failed to remove {}", handle.name))?;
    Ok(())
}

/// Dry-run port allocation
pub fn show_ports(specs: &[PortSpec], address: Option<IpAddr>) -> Result<()> {
    let address = match address {
        Some(address) => address,
        None => {
            ProvisionerConfig::from_env()
                .context("Invalid TEMPDOCK_* configuration")?
                .address
        }
    };

    let assignment = tempdock::ports::allocate(address, specs).context("Port allocation failed")?;
    for entry in assignment.iter() {
        info!("{} -> {}:{}", entry.spec, address, entry.external);
    }
    println!("{}", serde_json::to_string_pretty(&assignment)?);
    Ok(())
}

/// Force-remove a container by ID or name
pub async fn down(id: &str) -> Result<()> {
    provisioner()?
        .teardown_for(id)
        .run()
        .await
        .with_context(|| format!("Failed to remove {}", id))?;
    println!("✓ Removed {}", id);
    Ok(())
}
