use std::io::Write;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::{json, Value};

use hha_adaptive::adaptive::{
    Action, AdaptiveConfig, AdaptiveSession, CoachingTip, ContextEvent, DifficultyParams,
    FileStore, KeyValueStore, PolicyContext, TickOutput,
};
use hha_adaptive::config::Config;
use hha_adaptive::logging;

/// Scripted player whose hit chance reacts to the difficulty it is handed.
struct SyntheticPlayer {
    rng: ChaCha8Rng,
    skill: f64,
    hits: u32,
    misses: u32,
    combo: u32,
    health: f64,
    round_sec: u32,
}

impl SyntheticPlayer {
    fn new(seed: u64, round_sec: u32) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ 0x5eed_cafe);
        let skill = rng.random_range(0.45..0.80);
        Self {
            rng,
            skill,
            hits: 0,
            misses: 0,
            combo: 0,
            health: 1.0,
            round_sec,
        }
    }

    fn pressure(action: Action) -> f64 {
        match action {
            Action::Normal => 1.0,
            Action::Burst => 1.3,
            Action::Wave => 1.15,
            Action::Storm => 1.5,
        }
    }

    /// Plays one second and returns the raw host record plus any discrete event.
    fn step(&mut self, t: u32, params: DifficultyParams, action: Action) -> (Value, Option<ContextEvent>) {
        let pressure = Self::pressure(action);
        let targets = (2.0 * params.spawn_mul * pressure).round().max(1.0) as u32;
        let fatigue = f64::from(t) / 400.0;
        let p_hit = (self.skill * params.size_mul.sqrt() / (params.hazard_mul * pressure.sqrt())
            - fatigue)
            .clamp(0.05, 0.98);

        let mut event = None;
        for _ in 0..targets {
            if self.rng.random::<f64>() < p_hit {
                self.hits += 1;
                self.combo += 1;
            } else {
                self.misses += 1;
                if self.combo >= 5 {
                    event = Some(ContextEvent::ComboBreak);
                }
                self.combo = 0;
            }
        }

        let storm = action == Action::Storm;
        if storm && self.rng.random::<f64>() < 0.12 * params.hazard_mul {
            self.health = (self.health - 0.1).max(0.0);
            event = Some(ContextEvent::HazardHit);
        }
        self.skill = (self.skill + 0.0015).min(0.95);

        let total = self.hits + self.misses;
        let acc = if total > 0 {
            f64::from(self.hits) * 100.0 / f64::from(total)
        } else {
            0.0
        };
        let left = self.round_sec.saturating_sub(t);
        let rt_ms = 650.0 + (1.0 - p_hit) * 1400.0 + self.rng.random_range(-80.0..80.0);

        let raw = json!({
            "t": t,
            "accGoodPct": acc,
            "misses": self.misses,
            "hitGood": self.hits,
            "combo": self.combo,
            "leftSec": left,
            "storm": storm,
            "miniUrg": left > 0 && left <= 10,
            "hp": self.health,
            "rtMs": rt_ms,
            "tag": "sim",
        });
        (raw, event)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TickLine<'a> {
    tick: &'a TickOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_tip: Option<CoachingTip>,
}

fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    let file_store = match &config.store_dir {
        Some(dir) => match FileStore::open(dir) {
            Ok(store) => Some(Arc::new(store)),
            Err(err) => {
                tracing::warn!(error = %err, dir = %dir.display(), "file store not opened, running in memory");
                None
            }
        },
        None => None,
    };
    let store = file_store
        .clone()
        .map(|s| s as Arc<dyn KeyValueStore>);

    let context = PolicyContext::new(config.run_mode.clone(), config.seed)
        .with_override(config.override_enabled);
    let mut session =
        AdaptiveSession::attach(context, AdaptiveConfig::from_env(), store, &config.profile_id);
    let mut player = SyntheticPlayer::new(config.seed, config.sim_ticks);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut params = session.difficulty();
    let mut action = session.current_action();

    for t in 1..=config.sim_ticks {
        let (raw, event) = player.step(t, params, action);
        let output = session.tick(&raw);
        params = output.difficulty;
        action = output.action;

        let event_tip = event.and_then(|e| session.notify_event(e));
        let line = TickLine {
            tick: &output,
            event_tip,
        };
        match serde_json::to_string(&line) {
            Ok(text) => writeln!(out, "{text}")?,
            Err(err) => tracing::warn!(error = %err, tick = t, "tick output not serializable"),
        }
    }

    let summary = session.end();
    if let Some(store) = &file_store {
        store.flush();
    }
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => writeln!(out, "{text}")?,
        Err(err) => tracing::warn!(error = %err, "summary not serializable"),
    }
    Ok(())
}
