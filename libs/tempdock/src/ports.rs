/// Port Allocator - external port selection
///
/// **Selection Rules:**
/// 1. Specs are processed in declaration order
/// 2. Each range is scanned first-fit, ascending
/// 3. A candidate is skipped if an earlier spec of the same request took it
/// 4. A candidate is skipped if binding it on the target address fails
///
/// Probe sockets are closed before the next candidate is tried, so the
/// probe itself never holds the port the container is about to bind.
///
/// **Known limitation:** nothing is reserved between the probe and the
/// engine's own bind. Two provisioning calls running concurrently on the
/// same host can pick the same port.

use crate::error::{ProvisionError, Result};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, TcpListener, UdpSocket};
use tempdock_common::interval::{self, PortRange};
use tempdock_common::types::{PortAssignment, PortSpec, Protocol};
use tracing::debug;

/// True when `address:port` can currently be bound for `protocol`
pub fn is_port_free(address: IpAddr, protocol: Protocol, port: u16) -> bool {
    let addr = SocketAddr::new(address, port);
    match protocol {
        Protocol::Tcp => TcpListener::bind(addr).is_ok(),
        Protocol::Udp => UdpSocket::bind(addr).is_ok(),
    }
}

/// First port of `range` that is neither excluded nor bound on `address`
pub fn select_free_port(
    address: IpAddr,
    protocol: Protocol,
    range: PortRange,
    excluded: &HashSet<u16>,
) -> Option<u16> {
    range
        .iter()
        .filter(|port| !excluded.contains(port))
        .find(|port| {
            let free = is_port_free(address, protocol, *port);
            if !free {
                debug!(port = *port, protocol = %protocol, "Port already bound, skipping");
            }
            free
        })
}

/// Pick one distinct, currently free external port per spec
///
/// ## Returns
/// The assignment in spec order, or the first spec that could not be
/// satisfied. Nothing partial is returned on failure.
pub fn allocate(address: IpAddr, specs: &[PortSpec]) -> Result<PortAssignment> {
    let mut used = HashSet::new();
    let mut assignment = PortAssignment::new();

    for spec in specs {
        let range = interval::parse(&spec.external_range).map_err(|source| ProvisionError::Parse {
            spec: spec.clone(),
            source,
        })?;

        let port = select_free_port(address, spec.protocol, range, &used).ok_or_else(|| {
            ProvisionError::ExhaustedRange {
                spec: spec.clone(),
                range,
            }
        })?;

        debug!(spec = %spec, external = port, "Selected external port");
        used.insert(port);
        assignment.push(spec.clone(), port);
    }

    Ok(assignment)
}
