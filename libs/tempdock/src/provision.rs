/// Provisioner - High-Level Orchestration
///
/// **Responsibility:**
/// Turn a `ProvisionRequest` into a reachable container plus its teardown.
///
/// **Pipeline:**
/// 1. Validate the request (no engine call on failure)
/// 2. Resolve the image (pull if missing)
/// 3. Allocate external ports
/// 4. Create the container, then start it
/// 5. Run the readiness gate
/// 6. Hand back `ContainerHandle` + `Teardown`
///
/// Every stage returns its own `ProvisionError` variant immediately. Once
/// the container exists, a failure in a later stage force-removes it before
/// the error is returned, unless `cleanup_on_failure` is off.
///
/// This module is the glue layer - it knows nothing about:
/// - How ports are probed (ports.rs)
/// - How the engine is reached (engine.rs)
/// - How readiness is decided (readiness.rs)

use crate::engine::{ContainerEngine, DockerEngine};
use crate::error::{ProvisionError, Result};
use crate::image;
use crate::launcher::{self, CreatedContainer};
use crate::logger::{Logger, NoopLogger};
use crate::ports;
use crate::readiness::ReadinessGate;
use crate::teardown::{ContainerGuard, Teardown};
use std::net::IpAddr;
use std::sync::Arc;
use tempdock_common::config::ProvisionerConfig;
use tempdock_common::types::{ContainerHandle, PortAssignment, ProvisionRequest};
use tracing::instrument;

pub struct Provisioner {
    engine: Arc<dyn ContainerEngine>,
    config: ProvisionerConfig,
    logger: Arc<dyn Logger>,
}

impl Provisioner {
    /// Provisioner over any engine, with default config and a no-op logger
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            config: ProvisionerConfig::default(),
            logger: Arc::new(NoopLogger),
        }
    }

    /// Provisioner over the local Docker daemon
    pub fn connect_local() -> Result<Self> {
        let engine = DockerEngine::connect_local().map_err(ProvisionError::Connect)?;
        Ok(Self::new(Arc::new(engine)))
    }

    pub fn with_config(mut self, config: ProvisionerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<dyn ContainerEngine> {
        self.engine.clone()
    }

    /// Teardown for a container this provisioner did not create itself
    pub fn teardown_for(&self, container_id: impl Into<String>) -> Teardown {
        Teardown::for_container(self.engine.clone(), container_id, self.logger.clone())
    }

    /// Start a container for `request` and wait until it is reachable
    ///
    /// ## Returns
    /// Connection info and the single-use teardown, or the error of the first
    /// stage that failed. No teardown is handed out on failure.
    #[instrument(skip(self, request), fields(name = %request.name, image = %request.image))]
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<(ContainerHandle, Teardown)> {
        let logger = self.logger.as_ref();

        // Step 1: reject requests that cannot be readiness-checked
        validate(request)?;

        // Step 2: make sure the image is there
        image::ensure_image(self.engine.as_ref(), &request.image, logger).await?;

        // Step 3: external ports
        let address = self.config.address;
        let ports = ports::allocate(address, &request.ports)?;
        for entry in ports.iter() {
            logger.log(format_args!("Port {} -> {}:{}", entry.spec.port_key(), address, entry.external));
        }

        // Step 4: create; from here on the container must not leak
        let created = launcher::create(self.engine.as_ref(), request, address, &ports, logger).await?;
        let mut guard = ContainerGuard::new(self.engine.clone(), created.id.clone(), self.logger.clone());
        if !self.config.cleanup_on_failure {
            guard.disarm();
        }

        // Step 5: start and wait for readiness
        if let Err(e) = self.start_and_wait(&created, address, &ports).await {
            guard.cleanup().await;
            return Err(e);
        }
        guard.disarm();
        logger.log(format_args!("Container started: {}", created.name));

        let teardown = Teardown::new(
            self.engine.clone(),
            created.id.clone(),
            created.name.clone(),
            self.logger.clone(),
        );
        let handle = ContainerHandle {
            identifier: created.id,
            name: created.name,
            address,
            ports,
        };
        Ok((handle, teardown))
    }

    async fn start_and_wait(&self, created: &CreatedContainer, address: IpAddr, ports: &PortAssignment) -> Result<()> {
        let logger = self.logger.as_ref();
        launcher::start(self.engine.as_ref(), created, logger).await?;

        logger.log(format_args!("Waiting for container: {}", created.name));
        let gate = ReadinessGate::from_config(&self.config);
        let endpoints = gate.endpoints(address, ports);
        gate.wait(self.engine.as_ref(), &created.id, &endpoints, logger)
            .await
            .map(|_| ())
    }
}

fn validate(request: &ProvisionRequest) -> Result<()> {
    if request.ports.is_empty() {
        return Err(ProvisionError::Validation(
            "at least one port should be open for external communication".to_string(),
        ));
    }
    if request.name.trim().is_empty() {
        return Err(ProvisionError::Validation("name must not be empty".to_string()));
    }
    if request.image.trim().is_empty() {
        return Err(ProvisionError::Validation("image must not be empty".to_string()));
    }
    Ok(())
}

/// Provision against the local Docker daemon with `TEMPDOCK_*` configuration
pub async fn provision(request: &ProvisionRequest) -> Result<(ContainerHandle, Teardown)> {
    let config = ProvisionerConfig::from_env()?;
    Provisioner::connect_local()?
        .with_config(config)
        .provision(request)
        .await
}
