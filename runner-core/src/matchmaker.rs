//! A long-lived worker that periodically selects submissions, runs a match
//! between them, and records the outcome and rating update. Decoupled from
//! how a match is actually executed via [`MatchExecutor`] so this module
//! never needs to know about sandboxes or connections.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use crate::error::MatchmakerError;
use crate::persistence::{MatchRecord, Persistence, ResultRow, SubmissionId};
use crate::rating;
use crate::result::ParsedResult;

/// Runs one complete match for the given submissions and returns its result.
/// The concrete implementation wires a gamemode, sandboxes, and the turn
/// engine together; the matchmaker only needs this narrow seam.
#[async_trait]
pub trait MatchExecutor: Send + Sync {
    async fn run_match(&self, submission_ids: &[SubmissionId]) -> Result<ParsedResult, MatchmakerError>;
}

#[derive(Debug, Clone)]
pub struct MatchmakerConfig {
    pub player_count: usize,
    pub target_seconds_per_run: f64,
    pub initial_score: f64,
    pub score_turbulence: f64,
    /// If true, every tick first looks for an untested submission and, if
    /// found, plays it against copies of itself with scoring suppressed.
    pub untested_mode: bool,
}

pub struct Matchmaker {
    persistence: Arc<dyn Persistence>,
    executor: Arc<dyn MatchExecutor>,
    config: MatchmakerConfig,
}

impl Matchmaker {
    pub fn new(persistence: Arc<dyn Persistence>, executor: Arc<dyn MatchExecutor>, config: MatchmakerConfig) -> Self {
        Matchmaker { persistence, executor, config }
    }

    /// Runs one selection+execution+persistence cycle. Returns `Ok(true)` if
    /// a match actually ran, `Ok(false)` if there was nothing to do.
    pub async fn tick(&self) -> Result<bool, MatchmakerError> {
        if self.config.untested_mode {
            return match self.persistence.untested_submissions().await?.into_iter().next() {
                Some(id) => {
                    let ids = vec![id; self.config.player_count];
                    let result = self.executor.run_match(&ids).await?;
                    self.persist(&ids, &result, false).await?;
                    Ok(true)
                }
                None => Ok(false),
            };
        }

        let Some(ids) = self.select_candidates().await? else {
            return Ok(false);
        };
        let result = self.executor.run_match(&ids).await?;
        let update_scores = result.submission_results.iter().any(|r| r.healthy);
        self.persist(&ids, &result, update_scores).await?;
        Ok(true)
    }

    /// Samples `player_count` distinct submissions weighted by health,
    /// dropping zero-health candidates. `None` if there aren't enough.
    async fn select_candidates(&self) -> Result<Option<Vec<SubmissionId>>, MatchmakerError> {
        let mut pool: Vec<(SubmissionId, f64)> = self
            .persistence
            .active_submissions_with_results()
            .await?
            .into_iter()
            .filter(|h| h.health > 0.0)
            .map(|h| (h.submission_id, h.health))
            .collect();

        if pool.len() < self.config.player_count {
            return Ok(None);
        }

        let mut chosen = Vec::with_capacity(self.config.player_count);
        let mut rng = rand::rng();
        for _ in 0..self.config.player_count {
            let total: f64 = pool.iter().map(|(_, w)| w).sum();
            let mut target = rng.random::<f64>() * total;
            let mut pick = pool.len() - 1;
            for (i, (_, w)) in pool.iter().enumerate() {
                if target < *w {
                    pick = i;
                    break;
                }
                target -= w;
            }
            chosen.push(pool.remove(pick).0);
        }
        Ok(Some(chosen))
    }

    async fn persist(&self, ids: &[SubmissionId], result: &ParsedResult, update_scores: bool) -> Result<(), MatchmakerError> {
        let deltas = if update_scores {
            let ratings = self.persistence.prior_rating_totals(ids, self.config.initial_score).await?;
            let rating_vec: Vec<f64> = ids.iter().map(|id| ratings[id]).collect();
            rating::calculate_deltas(&result.outcomes(), &rating_vec, self.config.score_turbulence)
        } else {
            vec![0.0; ids.len()]
        };

        let rows = ids
            .iter()
            .zip(&result.submission_results)
            .zip(&deltas)
            .map(|((id, single), delta)| ResultRow {
                submission_id: id.clone(),
                outcome: single.outcome,
                healthy: single.healthy,
                points_delta: *delta,
                player_label: single.player_name.clone(),
            })
            .collect();

        let record = MatchRecord { initial_board: result.initial_board.clone(), moves: result.moves.clone() };
        self.persistence.record_match(record, rows).await
    }

    /// Runs ticks forever at the configured cadence, with jitter on success
    /// and an extra back-off sleep on failure. Intended to be spawned as its
    /// own task; the loop has no exit condition.
    pub async fn run_forever(self: Arc<Self>) {
        loop {
            let start = Instant::now();
            match self.tick().await {
                Ok(ran) => {
                    if ran {
                        info!("matchmaker tick completed a match");
                    }
                    let elapsed = start.elapsed().as_secs_f64();
                    let jitter = rand::rng().random_range(-0.05..=0.05) * self.config.target_seconds_per_run;
                    let sleep_for = (self.config.target_seconds_per_run - elapsed + jitter).max(0.0);
                    tokio::time::sleep(Duration::from_secs_f64(sleep_for)).await;
                }
                Err(e) => {
                    warn!(error = %e, "matchmaker tick failed");
                    let cap = (2.0 * self.config.target_seconds_per_run.max(1.0)) as u64;
                    let extra = rand::rng().random_range(1..=cap.max(1));
                    tokio::time::sleep(Duration::from_secs(extra)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use crate::result::{Outcome, ResultCode, SingleResult};

    struct AlwaysDraw;

    #[async_trait]
    impl MatchExecutor for AlwaysDraw {
        async fn run_match(&self, ids: &[SubmissionId]) -> Result<ParsedResult, MatchmakerError> {
            Ok(ParsedResult {
                initial_board: "init".into(),
                moves: vec![],
                submission_results: ids
                    .iter()
                    .map(|id| SingleResult::new(Outcome::Draw, id.clone(), ResultCode::ValidGame, String::new()))
                    .collect(),
            })
        }
    }

    fn config() -> MatchmakerConfig {
        MatchmakerConfig { player_count: 2, target_seconds_per_run: 1.0, initial_score: 1000.0, score_turbulence: 32.0, untested_mode: true }
    }

    #[tokio::test]
    async fn tick_is_a_no_op_with_too_few_candidates() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let mm = Matchmaker::new(persistence, Arc::new(AlwaysDraw), MatchmakerConfig { untested_mode: false, ..config() });
        assert!(!mm.tick().await.unwrap());
    }

    #[tokio::test]
    async fn untested_submission_is_played_with_scoring_suppressed() {
        let persistence = Arc::new(InMemoryPersistence::new());
        persistence.add_submission("untested1");
        let mm = Matchmaker::new(persistence.clone(), Arc::new(AlwaysDraw), config());
        assert!(mm.tick().await.unwrap());
        assert_eq!(persistence.match_count(), 1);
        let totals = persistence.prior_rating_totals(&["untested1".to_string()], 1000.0).await.unwrap();
        assert_eq!(totals["untested1"], 1000.0);
    }

    #[tokio::test]
    async fn healthy_match_updates_scores() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let record = MatchRecord { initial_board: "i".into(), moves: vec![] };
        persistence
            .record_match(
                record,
                vec![
                    ResultRow { submission_id: "a".into(), outcome: Outcome::Win, healthy: true, points_delta: 0.0, player_label: "a".into() },
                    ResultRow { submission_id: "b".into(), outcome: Outcome::Loss, healthy: true, points_delta: 0.0, player_label: "b".into() },
                ],
            )
            .await
            .unwrap();

        let mm = Matchmaker::new(persistence.clone(), Arc::new(AlwaysDraw), MatchmakerConfig { untested_mode: false, ..config() });
        assert!(mm.tick().await.unwrap());
        assert_eq!(persistence.match_count(), 2);
    }
}
