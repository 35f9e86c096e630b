//! Disposable Docker containers for tests.
//!
//! `provision` picks free host ports, starts the container and returns only
//! once the service inside accepts TCP connections. The returned
//! [`Teardown`] force-removes the container.
//!
//! ```no_run
//! use tempdock::{PortSpec, ProvisionRequest};
//!
//! # async fn run() -> tempdock::Result<()> {
//! let request = ProvisionRequest::new("cache", "redis:7")
//!     .port(PortSpec::tcp(6379, "40000-40100"));
//! let (handle, teardown) = tempdock::provision(&request).await?;
//! println!("redis on {:?}", handle.endpoint(&request.ports[0]));
//! teardown.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod image;
pub mod launcher;
pub mod logger;
pub mod ports;
pub mod provision;
pub mod readiness;
pub mod teardown;

#[cfg(test)]
mod mock;

pub use engine::{ContainerEngine, DockerEngine};
pub use error::{ProvisionError, Result};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use provision::{provision, Provisioner};
pub use readiness::ReadinessGate;
pub use teardown::Teardown;
pub use tempdock_common::config::ProvisionerConfig;
pub use tempdock_common::interval::PortRange;
pub use tempdock_common::types::{
    ContainerHandle, PortAssignment, PortSpec, Protocol, ProvisionRequest, ReadinessStrategy,
};
