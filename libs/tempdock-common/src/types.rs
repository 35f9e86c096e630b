use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortSpecError {
    #[error("unknown protocol '{0}' (expected tcp or udp)")]
    UnknownProtocol(String),

    #[error("invalid internal port '{0}'")]
    InvalidInternalPort(String),

    #[error("port spec '{0}' should look like proto:internal:range (e.g. tcp:80:40000-40010)")]
    Malformed(String),
}

impl FromStr for Protocol {
    type Err = PortSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(PortSpecError::UnknownProtocol(other.to_string())),
        }
    }
}

/// A container port that must be reachable from the host
///
/// The external range is kept as text and only parsed at allocation time,
/// so a bad range is reported against the spec that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSpec {
    pub protocol: Protocol,
    pub internal: u16,
    pub external_range: String,
}

impl PortSpec {
    pub fn tcp(internal: u16, external_range: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Tcp,
            internal,
            external_range: external_range.into(),
        }
    }

    pub fn udp(internal: u16, external_range: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Udp,
            internal,
            external_range: external_range.into(),
        }
    }

    /// Engine-side port key, e.g. `80/tcp`
    pub fn port_key(&self) -> String {
        format!("{}/{}", self.internal, self.protocol)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.protocol, self.internal, self.external_range)
    }
}

impl FromStr for PortSpec {
    type Err = PortSpecError;

    /// Parse `proto:internal:range`, e.g. `tcp:5432:40000-40100`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(protocol), Some(internal), Some(range)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(PortSpecError::Malformed(s.to_string()));
        };

        let protocol = protocol.parse()?;
        let internal = internal
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| PortSpecError::InvalidInternalPort(internal.to_string()))?;
        let range = range.trim();
        if range.is_empty() {
            return Err(PortSpecError::Malformed(s.to_string()));
        }

        Ok(PortSpec {
            protocol,
            internal,
            external_range: range.to_string(),
        })
    }
}

/// External port chosen for one [`PortSpec`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedPort {
    pub spec: PortSpec,
    pub external: u16,
}

/// Port choices for one provisioning request, in the order the specs were declared
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortAssignment {
    entries: Vec<AssignedPort>,
}

impl PortAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spec: PortSpec, external: u16) {
        self.entries.push(AssignedPort { spec, external });
    }

    /// External port assigned to `spec`
    pub fn get(&self, spec: &PortSpec) -> Option<u16> {
        self.entries
            .iter()
            .find(|entry| &entry.spec == spec)
            .map(|entry| entry.external)
    }

    /// The first declared binding
    pub fn first(&self) -> Option<&AssignedPort> {
        self.entries.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssignedPort> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn external_ports(&self) -> Vec<u16> {
        self.entries.iter().map(|entry| entry.external).collect()
    }
}

/// Everything needed to start one fixture container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Logical name; a random suffix is appended for the actual container name
    pub name: String,
    pub image: String,
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Command override, passed to the engine unchanged
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
}

impl ProvisionRequest {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            env: HashMap::new(),
            cmd: None,
        }
    }

    pub fn port(mut self, spec: PortSpec) -> Self {
        self.ports.push(spec);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }
}

/// Connection info for a container that passed the readiness gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Engine-assigned container ID
    pub identifier: String,
    /// Generated container name (`<name>-<uuid>`)
    pub name: String,
    pub address: IpAddr,
    pub ports: PortAssignment,
}

impl ContainerHandle {
    pub fn external_port(&self, spec: &PortSpec) -> Option<u16> {
        self.ports.get(spec)
    }

    /// `address:external` for the given spec
    pub fn endpoint(&self, spec: &PortSpec) -> Option<SocketAddr> {
        self.external_port(spec)
            .map(|port| SocketAddr::new(self.address, port))
    }
}

/// Which published ports must accept a connection before a container counts as ready
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessStrategy {
    /// Only the first declared port
    #[default]
    #[serde(rename = "first")]
    FirstPort,
    /// Every TCP port of the assignment
    #[serde(rename = "all")]
    AllPorts,
}

impl FromStr for ReadinessStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" | "first-port" => Ok(ReadinessStrategy::FirstPort),
            "all" | "all-ports" => Ok(ReadinessStrategy::AllPorts),
            other => Err(format!("unknown readiness strategy '{}' (expected first or all)", other)),
        }
    }
}
