mod executor;
mod routes;
mod state;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use runner_core::config::Config;
use runner_core::matchmaker::{Matchmaker, MatchmakerConfig};
use runner_core::persistence::InMemoryPersistence;
use runner_core::sandbox::SandboxConfig;
use sandbox_docker::DockerEngine;
use tic_tac_toe::TicTacToe;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::executor::SandboxMatchExecutor;
use crate::state::AppState;

#[tokio::main]
/// Sets up tracing, loads configuration, spawns the configured number of
/// matchmaker workers, and serves `/run` and `/ws/run` on port 8080.
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = Config::load_from_file("RunnerConfig.json").await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load RunnerConfig.json, using defaults");
        Config::default()
    });

    let engine = Arc::new(DockerEngine::connect().expect("could not reach the Docker daemon"));
    let gamemode = Arc::new(TicTacToe::new(config.gamemode.options.turn_time));

    let sandbox_config = SandboxConfig {
        image: "submission-runner-sandbox:latest".to_string(),
        memory_limit_bytes: parse_memory_limit(&config.submission_runner.sandbox_memory_limit),
        cpu_count: config.submission_runner.sandbox_cpu_count,
        outer_timeout_seconds: config.submission_runner.sandbox_run_timeout_seconds as f64,
        entry_command: vec!["python3".to_string(), "-m".to_string(), "sandbox.play".to_string()],
    };
    let harness_archive = tokio::fs::read("harness.tar").await.unwrap_or_else(|_| {
        tracing::warn!("harness.tar not found, sandboxes will start with an empty harness tree");
        Vec::new()
    });

    let executor = Arc::new(SandboxMatchExecutor {
        engine,
        config: sandbox_config,
        gamemode: gamemode.clone(),
        turn_cap: 9 * config.gamemode.options.turn_time.max(1) as usize,
        harness_archive,
        submissions_dir: "submissions".to_string(),
    });
    let persistence = Arc::new(InMemoryPersistence::new());

    let matchmaker_config = MatchmakerConfig {
        player_count: 2,
        target_seconds_per_run: config.submission_runner.target_seconds_per_game as f64,
        initial_score: config.initial_score,
        score_turbulence: config.score_turbulence,
        untested_mode: true,
    };
    for worker in 0..config.submission_runner.matchmakers {
        let matchmaker = Arc::new(Matchmaker::new(persistence.clone(), executor.clone(), matchmaker_config.clone()));
        tracing::info!(worker, "spawning matchmaker worker");
        tokio::spawn(matchmaker.run_forever());
    }

    let app_state = Arc::new(AppState { persistence, executor, gamemode });

    let app = Router::new()
        .route("/run", get(routes::run_handler))
        .route("/ws/run", get(routes::ws_run_handler))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Parses a Docker-style memory string ("256M", "1G", or a bare byte count)
/// into bytes.
fn parse_memory_limit(value: &str) -> i64 {
    let value = value.trim();
    let (number, multiplier) = match value.chars().last() {
        Some('G') | Some('g') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        Some('M') | Some('m') => (&value[..value.len() - 1], 1024 * 1024),
        Some('K') | Some('k') => (&value[..value.len() - 1], 1024),
        _ => (value, 1),
    };
    number.trim().parse::<i64>().unwrap_or(256 * 1024 * 1024) * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_megabyte_and_gigabyte_suffixes() {
        assert_eq!(parse_memory_limit("256M"), 256 * 1024 * 1024);
        assert_eq!(parse_memory_limit("1G"), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("4096"), 4096);
    }
}
