/// Readiness Gate - is the fixture actually usable?
///
/// **States:**
/// `Created → ProcessRunning → NetworkReachable → Ready`, or a timeout error
/// from either of the first two.
///
/// **Why two phases:**
/// A running process is necessary but not sufficient. Many services bind
/// their listening socket well after the process starts, so after the
/// engine reports the container running the gate keeps dialing the
/// published endpoint until a TCP connection succeeds.
///
/// **Timing:**
/// - Both phases poll every `step`
/// - Each phase has its own budget; worst case is roughly the sum of both
/// - Inspect errors while waiting for the process are retried, not fatal
/// - A single inspect or connect attempt never outlives its phase budget
///
/// The gate is a plain future: dropping it (e.g. under `tokio::time::timeout`
/// or `tokio::select!`) cancels the wait.

use crate::engine::ContainerEngine;
use crate::error::{ProvisionError, Result};
use crate::logger::Logger;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tempdock_common::config::ProvisionerConfig;
use tempdock_common::types::{PortAssignment, Protocol, ReadinessStrategy};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateState {
    Created,
    ProcessRunning,
    NetworkReachable,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessGate {
    pub step: Duration,
    pub start_timeout: Duration,
    pub reachable_timeout: Duration,
    pub strategy: ReadinessStrategy,
}

impl ReadinessGate {
    pub fn from_config(config: &ProvisionerConfig) -> Self {
        Self {
            step: config.step,
            start_timeout: config.start_timeout,
            reachable_timeout: config.reachable_timeout,
            strategy: config.readiness,
        }
    }

    /// Endpoints that must accept a connection, per strategy
    ///
    /// `FirstPort` uses the first declared binding whatever its protocol.
    /// `AllPorts` uses every TCP binding, or the first binding when there is no TCP one.
    pub fn endpoints(&self, address: IpAddr, assignment: &PortAssignment) -> Vec<SocketAddr> {
        let first = assignment
            .first()
            .map(|entry| SocketAddr::new(address, entry.external));

        match self.strategy {
            ReadinessStrategy::FirstPort => first.into_iter().collect(),
            ReadinessStrategy::AllPorts => {
                let tcp: Vec<SocketAddr> = assignment
                    .iter()
                    .filter(|entry| entry.spec.protocol == Protocol::Tcp)
                    .map(|entry| SocketAddr::new(address, entry.external))
                    .collect();
                if tcp.is_empty() {
                    first.into_iter().collect()
                } else {
                    tcp
                }
            }
        }
    }

    /// Run both phases for container `id`
    ///
    /// ## Returns
    /// Total time spent until `Ready`
    pub async fn wait(
        &self,
        engine: &dyn ContainerEngine,
        id: &str,
        endpoints: &[SocketAddr],
        logger: &dyn Logger,
    ) -> Result<Duration> {
        let started = Instant::now();
        debug!(container_id = %id, state = ?GateState::Created, "Readiness gate entered");

        self.wait_running(engine, id).await?;
        logger.log(format_args!("Container {} running after {:?}", id, started.elapsed()));
        debug!(container_id = %id, state = ?GateState::ProcessRunning, "Process running");

        self.wait_reachable(endpoints).await?;
        for endpoint in endpoints {
            logger.log(format_args!("✓ {} reachable", endpoint));
        }
        debug!(container_id = %id, state = ?GateState::NetworkReachable, "Endpoints reachable");

        let elapsed = started.elapsed();
        debug!(container_id = %id, state = ?GateState::Ready, elapsed_ms = elapsed.as_millis() as u64, "Container ready");
        Ok(elapsed)
    }

    /// Phase 1: poll inspection until the engine reports the process running
    pub async fn wait_running(&self, engine: &dyn ContainerEngine, id: &str) -> Result<()> {
        let deadline = Instant::now() + self.start_timeout;
        let mut last_error = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, engine.inspect_container(id)).await {
                Ok(Ok(info)) => {
                    let running = info.state.and_then(|state| state.running).unwrap_or(false);
                    if running {
                        return Ok(());
                    }
                    last_error = None;
                }
                Ok(Err(e)) => {
                    debug!(container_id = %id, error = %e, "Inspect failed, retrying");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    debug!(container_id = %id, "Inspect timed out");
                    last_error = Some("inspect did not answer in time".to_string());
                }
            }

            if Instant::now() >= deadline {
                return Err(ProvisionError::ContainerNotStarted {
                    id: id.to_string(),
                    waited: self.start_timeout,
                    last_error,
                });
            }
            sleep(self.step).await;
        }
    }

    /// Phase 2: dial every endpoint until each accepts one TCP connection
    pub async fn wait_reachable(&self, endpoints: &[SocketAddr]) -> Result<()> {
        let deadline = Instant::now() + self.reachable_timeout;

        for endpoint in endpoints {
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match timeout(remaining, TcpStream::connect(*endpoint)).await {
                    Ok(Ok(stream)) => {
                        drop(stream);
                        break;
                    }
                    Ok(Err(e)) => debug!(endpoint = %endpoint, error = %e, "Not reachable yet"),
                    Err(_) => debug!(endpoint = %endpoint, "Connect attempt timed out"),
                }

                if Instant::now() >= deadline {
                    return Err(ProvisionError::ServiceUnreachable {
                        endpoint: *endpoint,
                        waited: self.reachable_timeout,
                    });
                }
                sleep(self.step).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::testing::RecordingLogger;
    use crate::mock::{Call, MockEngine};
    use bollard::container::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempdock_common::types::PortSpec;
    use tokio::net::TcpListener;

    fn gate(strategy: ReadinessStrategy) -> ReadinessGate {
        ReadinessGate {
            step: Duration::from_millis(10),
            start_timeout: Duration::from_millis(300),
            reachable_timeout: Duration::from_millis(300),
            strategy,
        }
    }

    async fn created(engine: &MockEngine) -> String {
        engine
            .create_container("svc-test", Config::default())
            .await
            .unwrap()
            .id
    }

    /// Listener that counts accepted connections
    async fn counting_listener() -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });
        (addr, accepted)
    }

    /// An address nobody listens on
    async fn closed_endpoint() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    #[test]
    fn test_endpoints_per_strategy() {
        let address: IpAddr = "127.0.0.1".parse().unwrap();
        let mut ports = PortAssignment::new();
        ports.push(PortSpec::udp(53, "40000-40010"), 40000);
        ports.push(PortSpec::tcp(80, "41000-41010"), 41000);
        ports.push(PortSpec::tcp(443, "42000-42010"), 42000);

        assert_eq!(
            gate(ReadinessStrategy::FirstPort).endpoints(address, &ports),
            vec![SocketAddr::new(address, 40000)]
        );
        assert_eq!(
            gate(ReadinessStrategy::AllPorts).endpoints(address, &ports),
            vec![SocketAddr::new(address, 41000), SocketAddr::new(address, 42000)]
        );

        let mut udp_only = PortAssignment::new();
        udp_only.push(PortSpec::udp(53, "40000-40010"), 40005);
        assert_eq!(
            gate(ReadinessStrategy::AllPorts).endpoints(address, &udp_only),
            vec![SocketAddr::new(address, 40005)]
        );
    }

    #[tokio::test]
    async fn test_waits_for_running_then_reachable() {
        let engine = MockEngine::new().running_after(3);
        let id = created(&engine).await;
        let (endpoint, accepted) = counting_listener().await;
        let logger = RecordingLogger::default();

        gate(ReadinessStrategy::FirstPort)
            .wait(&engine, &id, &[endpoint], &logger)
            .await
            .unwrap();

        let inspections = engine
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::Inspect(_)))
            .count();
        assert_eq!(inspections, 4);
        assert!(accepted.load(Ordering::SeqCst) >= 1);
        assert!(logger.contains("reachable"));
    }

    #[tokio::test]
    async fn test_inspect_errors_are_transient() {
        let engine = MockEngine::new().inspect_errors(2).running_after(0);
        let id = created(&engine).await;

        gate(ReadinessStrategy::FirstPort)
            .wait_running(&engine, &id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_running_times_out_without_network_probe() {
        let engine = MockEngine::new().never_running();
        let id = created(&engine).await;
        let (endpoint, accepted) = counting_listener().await;
        let gate = ReadinessGate {
            start_timeout: Duration::from_millis(80),
            ..gate(ReadinessStrategy::FirstPort)
        };

        let started = std::time::Instant::now();
        let err = gate
            .wait(&engine, &id, &[endpoint], &RecordingLogger::default())
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_millis(80));
        match err {
            ProvisionError::ContainerNotStarted { id: failed, waited, last_error } => {
                assert_eq!(failed, id);
                assert_eq!(waited, Duration::from_millis(80));
                assert!(last_error.is_none());
            }
            other => panic!("expected ContainerNotStarted, got {:?}", other),
        }
        assert_eq!(accepted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_last_inspect_error_is_folded_into_timeout() {
        let engine = MockEngine::new().never_running();
        let gate = ReadinessGate {
            start_timeout: Duration::from_millis(50),
            ..gate(ReadinessStrategy::FirstPort)
        };

        let err = gate.wait_running(&engine, "missing").await.unwrap_err();

        match err {
            ProvisionError::ContainerNotStarted { last_error: Some(message), .. } => {
                assert!(message.contains("No such container"), "{}", message);
            }
            other => panic!("expected folded inspect error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hung_inspect_is_bounded_by_start_timeout() {
        let engine = MockEngine::new().slow_inspect(Duration::from_secs(2));
        let id = created(&engine).await;
        let gate = ReadinessGate {
            start_timeout: Duration::from_millis(100),
            ..gate(ReadinessStrategy::FirstPort)
        };

        let started = std::time::Instant::now();
        let err = gate.wait_running(&engine, &id).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(500), "phase 1 took {:?}", elapsed);
        match err {
            ProvisionError::ContainerNotStarted { waited, last_error: Some(message), .. } => {
                assert_eq!(waited, Duration::from_millis(100));
                assert!(message.contains("in time"), "{}", message);
            }
            other => panic!("expected ContainerNotStarted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_times_out() {
        let endpoint = closed_endpoint().await;
        let gate = ReadinessGate {
            reachable_timeout: Duration::from_millis(100),
            ..gate(ReadinessStrategy::FirstPort)
        };

        let started = std::time::Instant::now();
        let err = gate.wait_reachable(&[endpoint]).await.unwrap_err();

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(
            matches!(err, ProvisionError::ServiceUnreachable { endpoint: e, waited } if e == endpoint && waited == Duration::from_millis(100))
        );
    }

    #[tokio::test]
    async fn test_late_listener_is_picked_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        drop(listener);

        tokio::spawn(async move {
            sleep(Duration::from_millis(60)).await;
            let listener = TcpListener::bind(endpoint).await.unwrap();
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let started = std::time::Instant::now();
        gate(ReadinessStrategy::FirstPort)
            .wait_reachable(&[endpoint])
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_all_ports_requires_every_endpoint() {
        let (open, _) = counting_listener().await;
        let closed = closed_endpoint().await;
        let gate = ReadinessGate {
            reachable_timeout: Duration::from_millis(60),
            ..gate(ReadinessStrategy::AllPorts)
        };

        let err = gate.wait_reachable(&[open, closed]).await.unwrap_err();

        assert!(matches!(err, ProvisionError::ServiceUnreachable { endpoint, .. } if endpoint == closed));
    }
}
