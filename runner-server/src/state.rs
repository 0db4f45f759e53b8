use std::sync::Arc;

use runner_core::persistence::Persistence;
use tic_tac_toe::TicTacToe;

use crate::executor::SandboxMatchExecutor;

/// Shared state for the HTTP/WS routes and the matchmaker workers. This
/// binary carries exactly one gamemode end to end, per the conformance scope
/// described alongside the `Gamemode` trait.
pub struct AppState {
    pub persistence: Arc<dyn Persistence>,
    pub executor: Arc<SandboxMatchExecutor<TicTacToe>>,
    pub gamemode: Arc<TicTacToe>,
}

impl AppState {
    pub fn player_count(&self) -> usize {
        use runner_core::gamemode::Gamemode;
        self.gamemode.player_count()
    }
}
