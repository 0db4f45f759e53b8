//! A [`ContainerEngine`] implementation against a real Docker daemon, via the
//! Docker Engine API (`bollard`). This is the only crate in the workspace
//! that talks to a container runtime; everything else drives the trait.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bollard::container::{
    Config as DockerContainerConfig, CreateContainerOptions, LogOutput, RemoveContainerOptions, StopContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::{Stream, StreamExt};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use runner_core::connection::LineStream;
use runner_core::container::{ContainerEngine, ContainerId, ContainerSpec};
use runner_core::error::{ConnectionError, SandboxError};

/// Thin wrapper around a connected Docker client.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| SandboxError::ContainerEngine(e.to_string()))?;
        Ok(DockerEngine { docker })
    }
}

fn to_sandbox_err(e: bollard::errors::Error) -> SandboxError {
    SandboxError::ContainerEngine(e.to_string())
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<ContainerId, SandboxError> {
        let name = format!("sandbox-{:016x}", rand::rng().random::<u64>());

        // No swap (memory == memory_swap), every capability dropped, no
        // network, and a handful of small tmpfs mounts so a submission can
        // still import libraries that insist on a writable scratch dir.
        let mut tmpfs = HashMap::new();
        for path in ["/tmp", "/var/tmp", "/run/lock", "/var/lock"] {
            tmpfs.insert(path.to_string(), "size=1m".to_string());
        }
        let host_config = HostConfig {
            memory: Some(spec.memory_limit_bytes),
            memory_swap: Some(spec.memory_limit_bytes),
            nano_cpus: Some((spec.cpu_count * 1_000_000_000.0) as i64),
            cap_drop: Some(vec!["ALL".to_string()]),
            network_mode: Some("none".to_string()),
            tmpfs: Some(tmpfs),
            ..Default::default()
        };
        let config = DockerContainerConfig {
            image: Some(spec.image.clone()),
            cmd: Some(spec.keep_alive_command.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions { name: name.clone(), platform: None };
        self.docker.create_container(Some(options), config).await.map_err(to_sandbox_err)?;
        self.docker.start_container::<String>(&name, None).await.map_err(to_sandbox_err)?;
        debug!(container = %name, "sandbox container started");
        Ok(ContainerId(name))
    }

    async fn put_archive(&self, container: &ContainerId, dest_path: &str, tar_bytes: Vec<u8>) -> Result<(), SandboxError> {
        let options = UploadToContainerOptions { path: dest_path.to_string(), ..Default::default() };
        self.docker
            .upload_to_container(&container.0, Some(options), tar_bytes.into())
            .await
            .map_err(to_sandbox_err)
    }

    async fn exec_run(&self, container: &ContainerId, cmd: Vec<String>) -> Result<Box<dyn LineStream>, SandboxError> {
        let exec = self
            .docker
            .create_exec(
                &container.0,
                CreateExecOptions {
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(false),
                    cmd: Some(cmd),
                    ..Default::default()
                },
            )
            .await
            .map_err(to_sandbox_err)?;

        match self.docker.start_exec(&exec.id, Some(StartExecOptions { detach: false, ..Default::default() })).await.map_err(to_sandbox_err)? {
            StartExecResults::Attached { input, output } => {
                Ok(Box::new(ExecLineStream { input, output: Box::pin(output), buffer: String::new() }))
            }
            StartExecResults::Detached => Err(SandboxError::ContainerEngine("exec unexpectedly detached".into())),
        }
    }

    async fn wait(&self, container: &ContainerId, timeout_secs: f64) -> Result<(), SandboxError> {
        let deadline = tokio::time::Duration::from_secs_f64(timeout_secs.max(0.0));
        let wait_stream = self.docker.wait_container(&container.0, None::<WaitContainerOptions<String>>);
        match tokio::time::timeout(deadline, wait_stream.collect::<Vec<_>>()).await {
            Ok(_) => Ok(()),
            Err(_) => Err(SandboxError::ContainerEngine("container did not exit before the outer timeout".into())),
        }
    }

    async fn stop(&self, container: &ContainerId) -> Result<(), SandboxError> {
        let options = StopContainerOptions { t: 0 };
        match self.docker.stop_container(&container.0, Some(options)).await {
            Ok(()) => Ok(()),
            // Already stopped or already gone: stop is specified as idempotent.
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => {
                warn!(error = %e, container = %container.0, "stop_container failed");
                Err(to_sandbox_err(e))
            }
        }
    }

    async fn delete(&self, container: &ContainerId) -> Result<(), SandboxError> {
        let options = RemoveContainerOptions { force: true, ..Default::default() };
        match self.docker.remove_container(&container.0, Some(options)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(to_sandbox_err(e)),
        }
    }
}

/// Frames a Docker exec's attached stdio into [`LineStream`].
struct ExecLineStream {
    input: Pin<Box<dyn tokio::io::AsyncWrite + Send>>,
    output: Pin<Box<dyn Stream<Item = Result<LogOutput, bollard::errors::Error>> + Send>>,
    buffer: String,
}

fn log_output_text(log: &LogOutput) -> String {
    match log {
        LogOutput::StdOut { message } | LogOutput::StdErr { message } | LogOutput::Console { message } => {
            String::from_utf8_lossy(message).into_owned()
        }
        LogOutput::StdIn { .. } => String::new(),
    }
}

#[async_trait]
impl LineStream for ExecLineStream {
    async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.input.write_all(&bytes).await.map_err(|e| ConnectionError::Io(e.to_string()))?;
        self.input.flush().await.map_err(|e| ConnectionError::Io(e.to_string()))
    }

    async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        loop {
            if let Some(idx) = self.buffer.find('\n') {
                let rest = self.buffer.split_off(idx + 1);
                let mut line = std::mem::replace(&mut self.buffer, rest);
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }
            match self.output.next().await {
                Some(Ok(log)) => self.buffer.push_str(&log_output_text(&log)),
                Some(Err(e)) => return Err(ConnectionError::Io(e.to_string())),
                None => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(std::mem::take(&mut self.buffer)));
                }
            }
        }
    }
}
