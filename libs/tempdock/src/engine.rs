/// Container Engine - the Docker boundary
///
/// **Core Responsibility:**
/// Expose the handful of engine calls provisioning needs, nothing more.
///
/// **Critical Architectural Boundary:**
/// - The engine knows HOW to talk to the daemon
/// - It does NOT pick ports, wait for readiness or decide on cleanup
/// - Orchestration only ever sees the `ContainerEngine` trait, so tests can
///   substitute an in-memory engine

use crate::error::EngineError;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{ContainerCreateResponse, ContainerInspectResponse, CreateImageInfo, ImageSummary};
use bollard::Docker;
use futures_util::stream::Stream;
use std::pin::Pin;

/// Progress events of an image pull
pub type ImageStream = Pin<Box<dyn Stream<Item = Result<CreateImageInfo, EngineError>> + Send>>;

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError>;

    fn pull_image(&self, image: &str) -> ImageStream;

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<ContainerCreateResponse, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;
}

/// Bollard-backed engine talking to the local Docker daemon
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` or the platform default socket
    pub fn connect_local() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError> {
        self.docker
            .list_images(None::<ListImagesOptions<String>>)
            .await
    }

    fn pull_image(&self, image: &str) -> ImageStream {
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });
        Box::pin(self.docker.create_image(options, None, None))
    }

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<ContainerCreateResponse, EngineError> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        self.docker.create_container(Some(options), config).await
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, EngineError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await
    }
}
