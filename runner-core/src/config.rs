//! Configuration keys the runner recognises, loaded from a small JSON file.
//! Every field has a default so a missing or partial config file still
//! produces a runnable server.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxRunnerConfig {
    pub sandbox_memory_limit: String,
    pub sandbox_cpu_count: f64,
    pub sandbox_unrun_timeout_seconds: u64,
    pub sandbox_run_timeout_seconds: u64,
    pub matchmakers: u32,
    pub target_seconds_per_game: u64,
}

impl Default for SandboxRunnerConfig {
    fn default() -> Self {
        SandboxRunnerConfig {
            sandbox_memory_limit: "256M".to_string(),
            sandbox_cpu_count: 1.0,
            sandbox_unrun_timeout_seconds: 10,
            sandbox_run_timeout_seconds: 60,
            matchmakers: 1,
            target_seconds_per_game: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GamemodeOptions {
    pub turn_time: u64,
}

impl Default for GamemodeOptions {
    fn default() -> Self {
        GamemodeOptions { turn_time: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GamemodeConfig {
    pub id: String,
    pub options: GamemodeOptions,
}

impl Default for GamemodeConfig {
    fn default() -> Self {
        GamemodeConfig { id: "tic-tac-toe".to_string(), options: GamemodeOptions::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug: bool,
    pub profile: bool,
    pub submission_runner: SandboxRunnerConfig,
    pub gamemode: GamemodeConfig,
    pub max_repo_size_bytes: u64,
    pub initial_score: f64,
    pub score_turbulence: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            profile: false,
            submission_runner: SandboxRunnerConfig::default(),
            gamemode: GamemodeConfig::default(),
            max_repo_size_bytes: 10 * 1024 * 1024,
            initial_score: 1000.0,
            score_turbulence: 32.0,
        }
    }
}

impl Config {
    /// Reads and parses a JSON config file. Missing keys fall back to
    /// defaults rather than failing, since the file is expected to list only
    /// the overrides a deployment cares about.
    pub async fn load_from_file(path: &str) -> Result<Self, std::io::Error> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.submission_runner.matchmakers, 1);
        assert!(config.score_turbulence > 0.0);
    }

    #[test]
    fn partial_json_fills_in_the_rest_with_defaults() {
        let json = r#"{"debug": true, "submission_runner": {"matchmakers": 4}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.debug);
        assert_eq!(config.submission_runner.matchmakers, 4);
        assert_eq!(config.submission_runner.sandbox_cpu_count, 1.0);
    }

    #[test]
    fn gamemode_turn_time_overrides_through_the_nested_options_key() {
        let json = r#"{"gamemode": {"id": "tic-tac-toe", "options": {"turn_time": 15}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.gamemode.options.turn_time, 15);
    }
}
