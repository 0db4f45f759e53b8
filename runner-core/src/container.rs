//! The slice of the container engine's API the sandbox actually drives.
//! Kept as a narrow trait so the turn engine and its tests never need a real
//! Docker daemon; `sandbox-docker` supplies the production implementation.

use async_trait::async_trait;

use crate::connection::LineStream;
use crate::error::SandboxError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

/// Resource caps and the entry command for one sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub memory_limit_bytes: i64,
    pub cpu_count: f64,
    /// The PID-1 command, typically an indefinite sleep so the container
    /// stays up until it is explicitly stopped.
    pub keep_alive_command: Vec<String>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<ContainerId, SandboxError>;

    /// Copies a tar archive's contents into `dest_path` inside the container.
    async fn put_archive(&self, container: &ContainerId, dest_path: &str, tar_bytes: Vec<u8>) -> Result<(), SandboxError>;

    /// Execs `cmd` inside the container and returns a line-framed duplex
    /// stream over its stdio.
    async fn exec_run(&self, container: &ContainerId, cmd: Vec<String>) -> Result<Box<dyn LineStream>, SandboxError>;

    /// Blocks until the container exits or `timeout_secs` elapses, whichever first.
    async fn wait(&self, container: &ContainerId, timeout_secs: f64) -> Result<(), SandboxError>;

    /// Stops the container immediately (timeout = 0, i.e. SIGKILL). Idempotent:
    /// stopping an already-stopped or already-removed container is not an error.
    async fn stop(&self, container: &ContainerId) -> Result<(), SandboxError>;

    async fn delete(&self, container: &ContainerId) -> Result<(), SandboxError>;
}
