//! Error taxonomy of a provisioning attempt, one variant per stage.

use std::net::SocketAddr;
use std::time::Duration;
use tempdock_common::config::ConfigError;
use tempdock_common::interval::{IntervalError, PortRange};
use tempdock_common::types::PortSpec;

/// Errors surfaced by the container engine client
pub type EngineError = bollard::errors::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("invalid provisioning request: {0}")]
    Validation(String),

    #[error("parsing external range of {spec}")]
    Parse {
        spec: PortSpec,
        #[source]
        source: IntervalError,
    },

    #[error("no free port in {range} for {spec}")]
    ExhaustedRange { spec: PortSpec, range: PortRange },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not connect to the container engine")]
    Connect(#[source] EngineError),

    #[error("resolving image {image}")]
    Pull {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("launching container {container}")]
    Launch {
        container: String,
        #[source]
        source: EngineError,
    },

    #[error("container {id} not running after {waited:?}{}", inspect_suffix(.last_error))]
    ContainerNotStarted {
        id: String,
        waited: Duration,
        last_error: Option<String>,
    },

    #[error("could not reach {endpoint} within {waited:?}")]
    ServiceUnreachable { endpoint: SocketAddr, waited: Duration },

    #[error("removing container {container}")]
    Removal {
        container: String,
        #[source]
        source: EngineError,
    },
}

fn inspect_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last inspect error: {})", e))
        .unwrap_or_default()
}

impl ProvisionError {
    /// True for the two readiness timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProvisionError::ContainerNotStarted { .. } | ProvisionError::ServiceUnreachable { .. }
        )
    }
}

/// True when the engine answered "no such container/image"
pub(crate) fn is_not_found(err: &EngineError) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }
    )
}
