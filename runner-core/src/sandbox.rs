//! Provisions one disposable, resource-capped container per submission and
//! hands back a handshaken [`Connection`] over its stdio. The container's
//! own wall clock is enforced independently of anything the turn engine does
//! with the resulting connection.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::connection::Connection;
use crate::container::{ContainerEngine, ContainerId, ContainerSpec};
use crate::error::SandboxError;

/// Resource caps and timeouts for one sandbox invocation.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub memory_limit_bytes: i64,
    pub cpu_count: f64,
    /// Wall-clock budget for the whole container lifetime. After this, the
    /// container is killed unconditionally.
    pub outer_timeout_seconds: f64,
    pub entry_command: Vec<String>,
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Packs the harness source tree and a submission's files into one tar
/// archive ready for [`ContainerEngine::put_archive`].
pub fn build_archive(entries: &[(&str, &[u8])]) -> Result<Vec<u8>, SandboxError> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, bytes) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).map_err(|e| SandboxError::ContainerEngine(e.to_string()))?;
        header.set_size(bytes.len() as u64);
        header.set_mode(0o555);
        header.set_cksum();
        builder.append(&header, *bytes).map_err(|e| SandboxError::ContainerEngine(e.to_string()))?;
    }
    builder.into_inner().map_err(|e| SandboxError::ContainerEngine(e.to_string()))
}

/// A provisioned container, ready to be handshaken into a [`Connection`] and
/// later torn down.
pub struct Sandbox {
    engine: Arc<dyn ContainerEngine>,
    container: ContainerId,
}

impl Sandbox {
    /// Runs the provisioning sequence: create+start, copy the harness tree,
    /// copy the submission archive, lock permissions down, and start a
    /// background timer that force-kills the container after
    /// `config.outer_timeout_seconds`.
    pub async fn provision(
        engine: Arc<dyn ContainerEngine>,
        config: &SandboxConfig,
        submission_hash: &str,
        harness_archive: Vec<u8>,
        submission_archive: Vec<u8>,
    ) -> Result<Self, SandboxError> {
        if !is_hex(submission_hash) {
            return Err(SandboxError::InvalidSubmission(submission_hash.to_string()));
        }

        let spec = ContainerSpec {
            image: config.image.clone(),
            memory_limit_bytes: config.memory_limit_bytes,
            cpu_count: config.cpu_count,
            keep_alive_command: vec!["sleep".into(), "infinity".into()],
        };
        let container = engine.create_and_start(&spec).await?;

        engine.put_archive(&container, "/home/sandbox/", harness_archive).await?;
        engine.put_archive(&container, "/home/sandbox/submission/", submission_archive).await?;

        spawn_kill_timer(engine.clone(), container.clone(), config.outer_timeout_seconds);

        Ok(Sandbox { engine, container })
    }

    /// Execs the harness entry point and hands back the raw duplex stream,
    /// ready to be wrapped in [`Connection::handshake`].
    pub async fn connect(&self, config: &SandboxConfig) -> Result<Connection<Box<dyn crate::connection::LineStream>>, SandboxError> {
        let stream = self.engine.exec_run(&self.container, config.entry_command.clone()).await?;
        Connection::handshake(stream).await.map_err(SandboxError::from)
    }

    pub async fn teardown(self) {
        if let Err(e) = self.engine.stop(&self.container).await {
            warn!(error = %e, "stopping sandbox container failed");
        }
        if let Err(e) = self.engine.delete(&self.container).await {
            warn!(error = %e, "deleting sandbox container failed");
        }
    }
}

fn spawn_kill_timer(engine: Arc<dyn ContainerEngine>, container: ContainerId, timeout_seconds: f64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs_f64(timeout_seconds.max(0.0))).await;
        info!(?container, "sandbox outer timeout elapsed, force-stopping");
        let _ = engine.stop(&container).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_validation_rejects_non_hex_submission_ids() {
        assert!(is_hex("deadbeef01"));
        assert!(!is_hex("not-hex!"));
        assert!(!is_hex(""));
    }

    #[test]
    fn archive_builds_without_error_for_simple_entries() {
        let entries: Vec<(&str, &[u8])> = vec![("play.py", b"print('hi')")];
        let archive = build_archive(&entries).unwrap();
        assert!(!archive.is_empty());
    }
}
