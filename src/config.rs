use std::path::PathBuf;

use crate::adaptive::rng::parse_seed;
use crate::adaptive::types::RunMode;

/// Process-level settings for the simulation binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub run_mode: RunMode,
    pub seed: u64,
    pub override_enabled: bool,
    pub profile_id: String,
    /// `None` keeps the bandit model in memory only.
    pub store_dir: Option<PathBuf>,
    pub sim_ticks: u32,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let run_mode = std::env::var("HHA_RUN_MODE")
            .map(|v| RunMode::parse(&v))
            .unwrap_or_default();

        let seed = std::env::var("HHA_SEED")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| parse_seed(&v))
            .unwrap_or(20_240_601);

        let override_enabled = std::env::var("HHA_OVERRIDE")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let profile_id = std::env::var("HHA_PROFILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "anon".to_string());

        let store_dir = std::env::var("HHA_STORE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let sim_ticks = std::env::var("HHA_SIM_TICKS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(90);

        Self {
            log_level,
            run_mode,
            seed,
            override_enabled,
            profile_id,
            store_dir,
            sim_ticks,
        }
    }
}
