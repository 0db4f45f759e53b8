//! The data model produced by a completed match: per-player outcomes plus the
//! move recording, ready to hand to persistence or to serialise over HTTP.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    ValidGame,
    Timeout,
    IllegalMove,
    BrokenEntryPoint,
    Exception,
    ProcessKilled,
    GameUnfinished,
    UnknownResultType,
}

impl ResultCode {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ResultCode::ValidGame)
    }
}

/// The row for one player in a completed match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleResult {
    pub outcome: Outcome,
    pub healthy: bool,
    pub player_name: String,
    pub result_code: ResultCode,
    pub printed: String,
}

const MAX_PRINTED_CHARS: usize = 1000;

impl SingleResult {
    pub fn new(outcome: Outcome, player_name: impl Into<String>, code: ResultCode, printed: String) -> Self {
        let printed = printed.chars().take(MAX_PRINTED_CHARS).collect();
        SingleResult { outcome, healthy: code.is_healthy(), player_name: player_name.into(), result_code: code, printed }
    }
}

/// The complete, persistable outcome of one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedResult {
    pub initial_board: String,
    pub moves: Vec<String>,
    pub submission_results: Vec<SingleResult>,
}

impl ParsedResult {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.submission_results.iter().map(|r| r.outcome).collect()
    }

    pub fn healths(&self) -> Vec<bool> {
        self.submission_results.iter().map(|r| r.healthy).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printed_output_is_truncated() {
        let long = "x".repeat(MAX_PRINTED_CHARS + 50);
        let r = SingleResult::new(Outcome::Win, "alice", ResultCode::ValidGame, long);
        assert_eq!(r.printed.chars().count(), MAX_PRINTED_CHARS);
    }

    #[test]
    fn healthy_tracks_result_code() {
        let healthy = SingleResult::new(Outcome::Win, "a", ResultCode::ValidGame, String::new());
        let unhealthy = SingleResult::new(Outcome::Loss, "b", ResultCode::Timeout, String::new());
        assert!(healthy.healthy);
        assert!(!unhealthy.healthy);
    }
}
