/// Container Launcher - request translation and create/start
///
/// **Translation Rules:**
/// 1. Container name is `<name>-<uuid>` so reruns never collide
/// 2. Every internal port is exposed as `<port>/<proto>`
/// 3. Every internal port is bound to its assigned external port on the target address
/// 4. Environment is flattened to `KEY=VALUE` entries (order not significant)
///
/// Create warnings are reported through the logger and never fail the launch.

use crate::engine::ContainerEngine;
use crate::error::{ProvisionError, Result};
use crate::logger::Logger;
use bollard::container::Config;
use bollard::models::{HostConfig, PortBinding};
use std::collections::HashMap;
use std::net::IpAddr;
use tempdock_common::types::{PortAssignment, ProvisionRequest};

/// A container the engine accepted but that may not be running yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContainer {
    pub id: String,
    pub name: String,
}

pub fn container_name(name: &str) -> String {
    format!("{}-{}", name, uuid::Uuid::new_v4())
}

pub fn exposed_ports(assignment: &PortAssignment) -> HashMap<String, HashMap<(), ()>> {
    assignment
        .iter()
        .map(|entry| (entry.spec.port_key(), HashMap::new()))
        .collect()
}

/// Host bindings per container port
///
/// Specs sharing an internal port and protocol each keep their own host
/// binding under the same key.
pub fn port_bindings(address: IpAddr, assignment: &PortAssignment) -> HashMap<String, Option<Vec<PortBinding>>> {
    let mut bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for entry in assignment.iter() {
        let binding = PortBinding {
            host_ip: Some(address.to_string()),
            host_port: Some(entry.external.to_string()),
        };
        bindings
            .entry(entry.spec.port_key())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(binding);
    }
    bindings
}

pub fn env_entries(env: &HashMap<String, String>) -> Vec<String> {
    env.iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}

/// Engine configuration for `request` with the chosen ports
pub fn container_config(request: &ProvisionRequest, address: IpAddr, assignment: &PortAssignment) -> Config<String> {
    Config {
        image: Some(request.image.clone()),
        cmd: request.cmd.clone(),
        env: Some(env_entries(&request.env)),
        exposed_ports: Some(exposed_ports(assignment)),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings(address, assignment)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Create the container; it is not started yet
pub async fn create(
    engine: &dyn ContainerEngine,
    request: &ProvisionRequest,
    address: IpAddr,
    assignment: &PortAssignment,
    logger: &dyn Logger,
) -> Result<CreatedContainer> {
    let name = container_name(&request.name);
    let config = container_config(request, address, assignment);
    if let Some(bindings) = config.host_config.as_ref().and_then(|h| h.port_bindings.as_ref()) {
        logger.log(format_args!("Port Bindings: {:?}", bindings));
    }

    logger.log(format_args!("Creating container: {}", name));
    let response = engine
        .create_container(&name, config)
        .await
        .map_err(|source| ProvisionError::Launch {
            container: name.clone(),
            source,
        })?;

    for warning in &response.warnings {
        logger.log(format_args!("⚠ {}", warning));
    }

    Ok(CreatedContainer { id: response.id, name })
}

pub async fn start(engine: &dyn ContainerEngine, container: &CreatedContainer, logger: &dyn Logger) -> Result<()> {
    logger.log(format_args!("Starting container: {}", container.name));
    engine
        .start_container(&container.id)
        .await
        .map_err(|source| ProvisionError::Launch {
            container: container.name.clone(),
            source,
        })
}
