//! Wires a gamemode, the Docker-backed sandbox, and the turn engine together
//! behind the narrow [`MatchExecutor`] seam the matchmaker depends on.

use std::sync::Arc;

use runner_core::container::ContainerEngine;
use runner_core::error::{ConnectionError, MatchmakerError, SandboxError};
use runner_core::gamemode::Gamemode;
use runner_core::matchmaker::MatchExecutor;
use runner_core::middleware::Middleware;
use runner_core::persistence::SubmissionId;
use runner_core::result::{Outcome, ParsedResult, ResultCode, SingleResult};
use runner_core::sandbox::{Sandbox, SandboxConfig};
use runner_core::timed_connection::TimedConnection;
use runner_core::turn_engine;
use async_trait::async_trait;
use tracing::warn;

pub struct SandboxMatchExecutor<G: Gamemode> {
    pub engine: Arc<dyn ContainerEngine>,
    pub config: SandboxConfig,
    pub gamemode: Arc<G>,
    pub turn_cap: usize,
    pub harness_archive: Vec<u8>,
    pub submissions_dir: String,
}

impl<G: Gamemode> SandboxMatchExecutor<G> {
    async fn load_submission_archive(&self, id: &str) -> Result<Vec<u8>, SandboxError> {
        let path = format!("{}/{}.tar", self.submissions_dir, id);
        tokio::fs::read(&path).await.map_err(|_| SandboxError::MissingArchive(path))
    }
}

#[async_trait]
impl<G: Gamemode> MatchExecutor for SandboxMatchExecutor<G> {
    async fn run_match(&self, submission_ids: &[SubmissionId]) -> Result<ParsedResult, MatchmakerError> {
        // The per-player clock budget the turn engine enforces is
        // independent of this: this is the Timed Connection's own wall-clock
        // safety net, sized generously so it never trips before the turn
        // engine's own chess clock does.
        let safety_net = (submission_ids.len() as u64 + 1) * self.gamemode.turn_time();

        let mut sandboxes = Vec::new();
        let mut connections = Vec::new();
        for (player_index, id) in submission_ids.iter().enumerate() {
            let submission_archive = match self.load_submission_archive(id).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(submission = %id, error = %e, "submission archive missing, treating match as a draw");
                    for sandbox in sandboxes {
                        sandbox.teardown().await;
                    }
                    return Ok(handshake_failure_result(&*self.gamemode, submission_ids.len(), player_index, String::new()));
                }
            };

            let sandbox = match Sandbox::provision(self.engine.clone(), &self.config, id, self.harness_archive.clone(), submission_archive).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(submission = %id, error = %e, "sandbox provisioning failed");
                    return Err(MatchmakerError::Sandbox(e));
                }
            };

            let connection = match sandbox.connect(&self.config).await {
                Ok(conn) => conn,
                Err(e) => {
                    let printed = match e {
                        SandboxError::Connection(ConnectionError::HandshakeFailed(lines)) => lines.join("\n"),
                        _ => String::new(),
                    };
                    sandbox.teardown().await;
                    for remaining in sandboxes {
                        remaining.teardown().await;
                    }
                    return Ok(handshake_failure_result(&*self.gamemode, submission_ids.len(), player_index, printed));
                }
            };

            connections.push(TimedConnection::new(connection, safety_net as f64));
            sandboxes.push(sandbox);
        }

        let mut middleware = Middleware::new(connections);
        let result = turn_engine::run_match(&*self.gamemode, &mut middleware, self.turn_cap).await;

        for sandbox in sandboxes {
            sandbox.teardown().await;
        }

        Ok(result)
    }
}

/// A submission failed to hand over control of the stream before a key
/// handshake, or its archive never made it to disk. The match is a full draw
/// with the infrastructure-failure result code; the offending player's
/// `printed` field carries whatever it managed to print before failing.
fn handshake_failure_result<G: Gamemode>(gamemode: &G, player_count: usize, failed_player: usize, printed: String) -> ParsedResult {
    let board = gamemode.setup();
    ParsedResult {
        initial_board: gamemode.encode_board(&board),
        moves: Vec::new(),
        submission_results: (0..player_count)
            .map(|i| {
                let printed = if i == failed_player { printed.clone() } else { String::new() };
                SingleResult::new(Outcome::Draw, gamemode.player_label(i), ResultCode::UnknownResultType, printed)
            })
            .collect(),
    }
}
