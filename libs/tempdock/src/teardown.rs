// Container removal: the caller's teardown handle and the cleanup guard
// used while provisioning is still in flight.
use crate::engine::ContainerEngine;
use crate::error::{is_not_found, ProvisionError, Result};
use crate::logger::Logger;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Single-use capability that force-removes one provisioned container
///
/// `run` consumes the handle, so a teardown can only be invoked once.
/// Removal skips the graceful stop to keep teardown latency bounded; an
/// engine answer of "no such container" counts as already removed.
pub struct Teardown {
    engine: Arc<dyn ContainerEngine>,
    id: String,
    name: String,
    logger: Arc<dyn Logger>,
}

impl Teardown {
    pub(crate) fn new(engine: Arc<dyn ContainerEngine>, id: String, name: String, logger: Arc<dyn Logger>) -> Self {
        Self { engine, id, name, logger }
    }

    /// Teardown for a container created elsewhere (e.g. a detached fixture)
    pub fn for_container(engine: Arc<dyn ContainerEngine>, id: impl Into<String>, logger: Arc<dyn Logger>) -> Self {
        let id = id.into();
        Self::new(engine, id.clone(), id, logger)
    }

    pub fn container_id(&self) -> &str {
        &self.id
    }

    pub async fn run(self) -> Result<()> {
        self.logger.log(format_args!("Removing container: {}", self.name));
        match self.engine.remove_container(&self.id, true).await {
            Ok(()) => {
                self.logger.log(format_args!("✓ Container removed: {}", self.name));
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                self.logger.log(format_args!("Container already removed: {}", self.name));
                Ok(())
            }
            Err(source) => Err(ProvisionError::Removal {
                container: self.name,
                source,
            }),
        }
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Removes a created container unless provisioning completes
///
/// Error paths call `cleanup` and await the removal. If the provisioning
/// future is dropped instead, `Drop` schedules a best-effort removal on the
/// current tokio runtime (Drop cannot be async).
pub(crate) struct ContainerGuard {
    engine: Arc<dyn ContainerEngine>,
    container_id: String,
    logger: Arc<dyn Logger>,
    armed: bool,
}

impl ContainerGuard {
    pub(crate) fn new(engine: Arc<dyn ContainerEngine>, container_id: String, logger: Arc<dyn Logger>) -> Self {
        Self {
            engine,
            container_id,
            logger,
            armed: true,
        }
    }

    /// Keep the container whatever happens next
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    /// Force-remove now; failures are logged, never returned
    pub(crate) async fn cleanup(mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        self.logger.log(format_args!("Removing container after failure: {}", self.container_id));
        match self.engine.remove_container(&self.container_id, true).await {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => {
                self.logger.log(format_args!("⚠ Failed to cleanup container {}: {}", self.container_id, e));
                warn!(container_id = %self.container_id, error = %e, "Failed to cleanup container");
            }
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(container_id = %self.container_id, "No runtime to cleanup container on drop");
            return;
        };

        let engine = self.engine.clone();
        let container_id = std::mem::take(&mut self.container_id);
        runtime.spawn(async move {
            if let Err(e) = engine.remove_container(&container_id, true).await {
                if !is_not_found(&e) {
                    warn!(container_id = %container_id, error = %e, "Failed to cleanup container");
                }
            }
        });
    }
}
