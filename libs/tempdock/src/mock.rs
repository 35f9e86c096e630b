// In-memory ContainerEngine for orchestration tests
//
// Records every call. On start it can bind the published TCP host ports
// after a delay, the way a real service opens its socket some time after
// its process is up.

use crate::engine::{ContainerEngine, ImageStream};
use crate::error::EngineError;
use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::{
    ContainerCreateResponse, ContainerInspectResponse, ContainerState, CreateImageInfo, ImageSummary,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub enum Call {
    ListImages,
    PullImage(String),
    Create { name: String, config: Config<String> },
    Start(String),
    Inspect(String),
    Remove { id: String, force: bool },
}

fn server_error(status_code: u16, message: &str) -> EngineError {
    bollard::errors::Error::DockerResponseServerError {
        status_code,
        message: message.to_string(),
    }
}

#[derive(Default)]
pub struct MockEngine {
    images: Vec<String>,
    pull_fails: bool,
    create_fails: bool,
    create_warnings: Vec<String>,
    start_fails: bool,
    remove_fails: bool,
    /// Inspect calls answered "not running" before the container reports running
    running_after: Option<usize>,
    /// Inspect calls answered with an error before any real answer
    inspect_errors: usize,
    /// Delay before every inspect answer
    inspect_delay: Option<Duration>,
    listen_after: Option<Duration>,
    calls: Mutex<Vec<Call>>,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    next_id: usize,
    containers: HashMap<String, Config<String>>,
    inspections: usize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            running_after: Some(0),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, tag: &str) -> Self {
        self.images.push(tag.to_string());
        self
    }

    pub fn failing_pull(mut self) -> Self {
        self.pull_fails = true;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.create_fails = true;
        self
    }

    pub fn with_create_warning(mut self, warning: &str) -> Self {
        self.create_warnings.push(warning.to_string());
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.start_fails = true;
        self
    }

    pub fn failing_remove(mut self) -> Self {
        self.remove_fails = true;
        self
    }

    pub fn running_after(mut self, inspections: usize) -> Self {
        self.running_after = Some(inspections);
        self
    }

    pub fn never_running(mut self) -> Self {
        self.running_after = None;
        self
    }

    pub fn inspect_errors(mut self, count: usize) -> Self {
        self.inspect_errors = count;
        self
    }

    pub fn slow_inspect(mut self, delay: Duration) -> Self {
        self.inspect_delay = Some(delay);
        self
    }

    pub fn listening_after(mut self, delay: Duration) -> Self {
        self.listen_after = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_config(&self) -> Option<Config<String>> {
        self.calls().into_iter().find_map(|call| match call {
            Call::Create { config, .. } => Some(config),
            _ => None,
        })
    }

    pub fn removed(&self) -> Vec<(String, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Remove { id, force } => Some((id, force)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn published_tcp_ports(config: &Config<String>) -> Vec<SocketAddr> {
        let Some(bindings) = config.host_config.as_ref().and_then(|h| h.port_bindings.as_ref()) else {
            return Vec::new();
        };
        bindings
            .iter()
            .filter(|(key, _)| key.ends_with("/tcp"))
            .flat_map(|(_, bindings)| bindings.iter().flatten())
            .filter_map(|binding| {
                let ip = binding.host_ip.as_deref().unwrap_or("127.0.0.1");
                let port = binding.host_port.as_deref()?;
                format!("{}:{}", ip, port).parse().ok()
            })
            .collect()
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError> {
        self.record(Call::ListImages);
        Ok(self
            .images
            .iter()
            .map(|tag| ImageSummary {
                repo_tags: vec![tag.clone()],
                ..Default::default()
            })
            .collect())
    }

    fn pull_image(&self, image: &str) -> ImageStream {
        self.record(Call::PullImage(image.to_string()));
        let events: Vec<Result<CreateImageInfo, EngineError>> = if self.pull_fails {
            vec![
                Ok(CreateImageInfo {
                    status: Some("Pulling fs layer".to_string()),
                    ..Default::default()
                }),
                Err(server_error(404, "manifest unknown")),
            ]
        } else {
            vec![
                Ok(CreateImageInfo {
                    status: Some("Pulling fs layer".to_string()),
                    ..Default::default()
                }),
                Ok(CreateImageInfo {
                    status: Some(format!("Status: Downloaded newer image for {}", image)),
                    ..Default::default()
                }),
            ]
        };
        Box::pin(futures_util::stream::iter(events))
    }

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<ContainerCreateResponse, EngineError> {
        self.record(Call::Create {
            name: name.to_string(),
            config: config.clone(),
        });
        if self.create_fails {
            return Err(server_error(409, "Conflict. The container name is already in use"));
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        state.containers.insert(id.clone(), config);

        Ok(ContainerCreateResponse {
            id,
            warnings: self.create_warnings.clone(),
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(Call::Start(id.to_string()));
        if self.start_fails {
            return Err(server_error(500, "driver failed programming external connectivity"));
        }

        let config = self
            .state
            .lock()
            .unwrap()
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| server_error(404, "No such container"))?;

        if let Some(delay) = self.listen_after {
            for addr in Self::published_tcp_ports(&config) {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let Ok(listener) = TcpListener::bind(addr).await else {
                        return;
                    };
                    while let Ok((socket, _)) = listener.accept().await {
                        drop(socket);
                    }
                });
            }
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, EngineError> {
        self.record(Call::Inspect(id.to_string()));
        if let Some(delay) = self.inspect_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(id) {
            return Err(server_error(404, "No such container"));
        }

        state.inspections += 1;
        if state.inspections <= self.inspect_errors {
            return Err(server_error(500, "engine busy"));
        }

        let answered = state.inspections - self.inspect_errors;
        let running = self
            .running_after
            .map(|after| answered > after)
            .unwrap_or(false);

        Ok(ContainerInspectResponse {
            id: Some(id.to_string()),
            state: Some(ContainerState {
                running: Some(running),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        self.record(Call::Remove {
            id: id.to_string(),
            force,
        });
        if self.remove_fails {
            return Err(server_error(500, "removal failed"));
        }
        match self.state.lock().unwrap().containers.remove(id) {
            Some(_) => Ok(()),
            None => Err(server_error(404, "No such container")),
        }
    }
}
