//! The minimal persistence shape the matchmaker consumes: submission health,
//! untested submissions, prior rating totals, and match recording. A real
//! deployment backs this with a relational store; [`InMemoryPersistence`] is
//! the reference implementation used for tests and local runs, built on the
//! same `Mutex<HashMap<..>>` shape used elsewhere in this codebase for small
//! shared registries.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::MatchmakerError;
use crate::result::Outcome;

pub type SubmissionId = String;

#[derive(Debug, Clone)]
pub struct SubmissionHealth {
    pub submission_id: SubmissionId,
    /// Fraction of this submission's past results that were healthy, in `(0, 1]`.
    pub health: f64,
}

#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub initial_board: String,
    pub moves: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResultRow {
    pub submission_id: SubmissionId,
    pub outcome: Outcome,
    pub healthy: bool,
    pub points_delta: f64,
    pub player_label: String,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn active_submissions_with_results(&self) -> Result<Vec<SubmissionHealth>, MatchmakerError>;
    async fn untested_submissions(&self) -> Result<Vec<SubmissionId>, MatchmakerError>;
    async fn prior_rating_totals(
        &self,
        submission_ids: &[SubmissionId],
        initial_score: f64,
    ) -> Result<HashMap<SubmissionId, f64>, MatchmakerError>;
    async fn record_match(&self, record: MatchRecord, rows: Vec<ResultRow>) -> Result<(), MatchmakerError>;
}

#[derive(Default)]
struct SubmissionEntry {
    active: bool,
    results: Vec<ResultRow>,
}

/// An in-process, in-memory stand-in for the real relational store.
pub struct InMemoryPersistence {
    submissions: Mutex<HashMap<SubmissionId, SubmissionEntry>>,
    matches: Mutex<Vec<(MatchRecord, Vec<ResultRow>)>>,
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        InMemoryPersistence { submissions: Mutex::new(HashMap::new()), matches: Mutex::new(Vec::new()) }
    }
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a submission as active, with no prior results. Test/demo helper.
    pub fn add_submission(&self, id: impl Into<SubmissionId>) {
        self.submissions.lock().unwrap().entry(id.into()).or_insert_with(|| SubmissionEntry { active: true, results: Vec::new() });
    }

    pub fn match_count(&self) -> usize {
        self.matches.lock().unwrap().len()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn active_submissions_with_results(&self) -> Result<Vec<SubmissionHealth>, MatchmakerError> {
        let submissions = self.submissions.lock().unwrap();
        Ok(submissions
            .iter()
            .filter(|(_, e)| e.active && !e.results.is_empty())
            .map(|(id, e)| {
                let healthy = e.results.iter().filter(|r| r.healthy).count() as f64;
                SubmissionHealth { submission_id: id.clone(), health: healthy / e.results.len() as f64 }
            })
            .collect())
    }

    async fn untested_submissions(&self) -> Result<Vec<SubmissionId>, MatchmakerError> {
        let submissions = self.submissions.lock().unwrap();
        Ok(submissions.iter().filter(|(_, e)| e.active && e.results.is_empty()).map(|(id, _)| id.clone()).collect())
    }

    async fn prior_rating_totals(
        &self,
        submission_ids: &[SubmissionId],
        initial_score: f64,
    ) -> Result<HashMap<SubmissionId, f64>, MatchmakerError> {
        let submissions = self.submissions.lock().unwrap();
        Ok(submission_ids
            .iter()
            .map(|id| {
                let total = submissions
                    .get(id)
                    .map(|e| e.results.iter().map(|r| r.points_delta).sum::<f64>())
                    .unwrap_or(0.0);
                (id.clone(), initial_score + total)
            })
            .collect())
    }

    async fn record_match(&self, record: MatchRecord, rows: Vec<ResultRow>) -> Result<(), MatchmakerError> {
        {
            let mut submissions = self.submissions.lock().unwrap();
            for row in &rows {
                let entry = submissions.entry(row.submission_id.clone()).or_insert_with(|| SubmissionEntry { active: true, results: Vec::new() });
                entry.results.push(row.clone());
            }
        }
        self.matches.lock().unwrap().push((record, rows));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn untested_submission_has_no_health_entry() {
        let store = InMemoryPersistence::new();
        store.add_submission("abc123");
        assert!(store.active_submissions_with_results().await.unwrap().is_empty());
        assert_eq!(store.untested_submissions().await.unwrap(), vec!["abc123".to_string()]);
    }

    #[tokio::test]
    async fn recorded_results_compute_health_and_rating_total() {
        let store = InMemoryPersistence::new();
        let record = MatchRecord { initial_board: "init".into(), moves: vec![] };
        let rows = vec![
            ResultRow { submission_id: "a".into(), outcome: Outcome::Win, healthy: true, points_delta: 12.0, player_label: "a".into() },
            ResultRow { submission_id: "b".into(), outcome: Outcome::Loss, healthy: false, points_delta: -12.0, player_label: "b".into() },
        ];
        store.record_match(record, rows).await.unwrap();

        let health = store.active_submissions_with_results().await.unwrap();
        let a_health = health.iter().find(|h| h.submission_id == "a").unwrap();
        let b_health = health.iter().find(|h| h.submission_id == "b").unwrap();
        assert_eq!(a_health.health, 1.0);
        assert_eq!(b_health.health, 0.0);

        let totals = store.prior_rating_totals(&["a".to_string(), "b".to_string()], 1000.0).await.unwrap();
        assert_eq!(totals["a"], 1012.0);
        assert_eq!(totals["b"], 988.0);
    }
}
