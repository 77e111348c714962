use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adaptive::types::{Action, DifficultyParams, FeatureKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("smoothing alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),
    #[error("max step must be positive and finite, got {0}")]
    InvalidMaxStep(f64),
    #[error("bounds for {param} are inverted: [{min}, {max}]")]
    InvertedBounds { param: &'static str, min: f64, max: f64 },
    #[error("probability bounds [{floor}, {ceil}] are infeasible for {actions} actions")]
    InfeasibleProbabilityBounds { floor: f64, ceil: f64, actions: usize },
    #[error("feature set is empty")]
    EmptyFeatureSet,
    #[error("reward window must be positive, got {0}")]
    InvalidRewardWindow(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    pub acc_bad: f64,
    pub miss_rise: f64,
    pub combo_low: f64,
    pub time_low: f64,
    pub hazard: f64,
    pub urgent: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            acc_bad: 0.40,
            miss_rise: 0.22,
            combo_low: 0.18,
            time_low: 0.10,
            hazard: 0.08,
            urgent: 0.06,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub alpha: f64,
    pub target_acc_pct: f64,
    pub acc_spread: f64,
    /// Misses per second that saturates `missRise`.
    pub ref_miss_rate: f64,
    pub ref_combo: f64,
    pub ref_time_sec: f64,
    pub ref_hit_rate: f64,
    pub fast_reaction_ms: f64,
    pub slow_reaction_ms: f64,
    pub fatigue_ref_sec: f64,
    pub miss_window_sec: f64,
    pub risk_floor: f64,
    pub risk_ceil: f64,
    pub weights: RiskWeights,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.25,
            target_acc_pct: 80.0,
            acc_spread: 50.0,
            ref_miss_rate: 0.45,
            ref_combo: 10.0,
            ref_time_sec: 12.0,
            ref_hit_rate: 1.5,
            fast_reaction_ms: 900.0,
            slow_reaction_ms: 1800.0,
            fatigue_ref_sec: 180.0,
            miss_window_sec: 10.0,
            risk_floor: 0.02,
            risk_ceil: 0.95,
            weights: RiskWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParamBounds {
    pub min: f64,
    pub max: f64,
}

impl ParamBounds {
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

impl Default for ParamBounds {
    fn default() -> Self {
        Self { min: 0.80, max: 1.25 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorConfig {
    /// Multipliers targeted at maximum risk.
    pub easy: DifficultyParams,
    /// Multipliers targeted at minimum risk.
    pub hard: DifficultyParams,
    pub spawn_bounds: ParamBounds,
    pub size_bounds: ParamBounds,
    pub hazard_bounds: ParamBounds,
    pub max_step: f64,
    pub log_capacity: usize,
}

impl DirectorConfig {
    pub fn bounds(&self) -> [ParamBounds; 3] {
        [self.spawn_bounds, self.size_bounds, self.hazard_bounds]
    }
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            easy: DifficultyParams::new(0.80, 1.20, 0.80),
            hard: DifficultyParams::new(1.20, 0.80, 1.20),
            spawn_bounds: ParamBounds::default(),
            size_bounds: ParamBounds::default(),
            hazard_bounds: ParamBounds::default(),
            max_step: 0.04,
            log_capacity: 18,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    pub enabled: bool,
    pub features: Vec<FeatureKind>,
    pub learning_rate: f64,
    pub l2: f64,
    pub epsilon: f64,
    pub prob_floor: f64,
    pub prob_ceil: f64,
    pub weight_clip: f64,
    pub bias_clip: f64,
    /// `(updates_seen, lr_factor)` pairs, applied in ascending order.
    pub lr_schedule: Vec<(u64, f64)>,
    pub reward_window_sec: f64,
    /// Samples observed after the choice; the sample the choice was made on is not counted.
    pub min_samples: usize,
    pub acc_improve_pct: f64,
    pub persist: bool,
}

impl BanditConfig {
    pub fn feature_dim(&self) -> usize {
        self.features.len()
    }

    pub fn effective_learning_rate(&self, updates: u64) -> f64 {
        let factor = self
            .lr_schedule
            .iter()
            .filter(|(after, _)| updates >= *after)
            .map(|(_, f)| *f)
            .last()
            .unwrap_or(1.0);
        self.learning_rate * factor
    }
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            features: FeatureKind::DEFAULT_SET.to_vec(),
            learning_rate: 0.10,
            l2: 0.0008,
            epsilon: 0.10,
            prob_floor: 0.06,
            prob_ceil: 0.70,
            weight_clip: 6.0,
            bias_clip: 6.0,
            lr_schedule: vec![(50, 0.8), (200, 0.6), (600, 0.4)],
            reward_window_sec: 6.0,
            min_samples: 3,
            acc_improve_pct: 2.0,
            persist: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachThresholds {
    pub acc_bad: f64,
    pub miss_ratio: f64,
    pub reaction_score: f64,
    pub health_ratio: f64,
    pub time_low: f64,
    pub pressure_risk: f64,
    pub skill_high: f64,
    pub risk_low: f64,
}

impl Default for CoachThresholds {
    fn default() -> Self {
        Self {
            acc_bad: 0.35,
            miss_ratio: 0.38,
            reaction_score: 0.42,
            health_ratio: 0.45,
            time_low: 0.5,
            pressure_risk: 0.55,
            skill_high: 0.70,
            risk_low: 0.30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachConfig {
    pub global_cooldown_ms: f64,
    pub reason_cooldown_ms: f64,
    /// 0 disables the per-session cap.
    pub max_tips: usize,
    pub thresholds: CoachThresholds,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            global_cooldown_ms: 6500.0,
            reason_cooldown_ms: 14000.0,
            max_tips: 6,
            thresholds: CoachThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    pub estimator: EstimatorConfig,
    pub director: DirectorConfig,
    pub bandit: BanditConfig,
    pub coach: CoachConfig,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            estimator: EstimatorConfig::default(),
            director: DirectorConfig::default(),
            bandit: BanditConfig::default(),
            coach: CoachConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AdaptiveConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = env_parse::<bool>("HHA_ADAPTIVE_ENABLED") {
            config.enabled = val;
        }
        if let Some(val) = env_parse("HHA_EMA_ALPHA") {
            config.estimator.alpha = val;
        }
        if let Some(val) = env_parse("HHA_MAX_STEP") {
            config.director.max_step = val;
        }
        if let Some(val) = env_parse("HHA_TIP_COOLDOWN_MS") {
            config.coach.global_cooldown_ms = val;
        }
        if let Some(val) = env_parse("HHA_TIP_REASON_COOLDOWN_MS") {
            config.coach.reason_cooldown_ms = val;
        }
        if let Some(val) = env_parse("HHA_MAX_TIPS") {
            config.coach.max_tips = val;
        }
        if let Some(val) = env_parse("HHA_BANDIT_LR") {
            config.bandit.learning_rate = val;
        }
        if let Some(val) = env_parse("HHA_BANDIT_L2") {
            config.bandit.l2 = val;
        }
        if let Some(val) = env_parse("HHA_BANDIT_EPSILON") {
            config.bandit.epsilon = val;
        }
        if let Some(val) = env_parse("HHA_REWARD_WINDOW_SEC") {
            config.bandit.reward_window_sec = val;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let alpha = self.estimator.alpha;
        if !(alpha.is_finite() && alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        let step = self.director.max_step;
        if !(step.is_finite() && step > 0.0) {
            return Err(ConfigError::InvalidMaxStep(step));
        }
        let names = ["spawnMul", "sizeMul", "hazardMul"];
        for (name, bounds) in names.iter().zip(self.director.bounds()) {
            if !(bounds.min <= bounds.max) {
                return Err(ConfigError::InvertedBounds {
                    param: *name,
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }
        let n = Action::COUNT as f64;
        let (floor, ceil) = (self.bandit.prob_floor, self.bandit.prob_ceil);
        if !(floor >= 0.0 && floor <= ceil && floor * n <= 1.0 && ceil * n >= 1.0) {
            return Err(ConfigError::InfeasibleProbabilityBounds {
                floor,
                ceil,
                actions: Action::COUNT,
            });
        }
        if self.bandit.features.is_empty() {
            return Err(ConfigError::EmptyFeatureSet);
        }
        let window = self.bandit.reward_window_sec;
        if !(window.is_finite() && window > 0.0) {
            return Err(ConfigError::InvalidRewardWindow(window));
        }
        Ok(())
    }

    /// Repairs values `validate` would reject, falling back to defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        while let Err(err) = self.validate() {
            tracing::warn!(error = %err, "adaptive config value replaced with default");
            match err {
                ConfigError::InvalidAlpha(_) => self.estimator.alpha = defaults.estimator.alpha,
                ConfigError::InvalidMaxStep(_) => {
                    self.director.max_step = defaults.director.max_step
                }
                ConfigError::InvertedBounds { .. } => {
                    self.director.spawn_bounds = defaults.director.spawn_bounds;
                    self.director.size_bounds = defaults.director.size_bounds;
                    self.director.hazard_bounds = defaults.director.hazard_bounds;
                }
                ConfigError::InfeasibleProbabilityBounds { .. } => {
                    self.bandit.prob_floor = defaults.bandit.prob_floor;
                    self.bandit.prob_ceil = defaults.bandit.prob_ceil;
                }
                ConfigError::EmptyFeatureSet => {
                    self.bandit.features = defaults.bandit.features.clone()
                }
                ConfigError::InvalidRewardWindow(_) => {
                    self.bandit.reward_window_sec = defaults.bandit.reward_window_sec
                }
            }
        }
        if !(self.bandit.epsilon.is_finite()) {
            self.bandit.epsilon = defaults.bandit.epsilon;
        }
        self.bandit.epsilon = self.bandit.epsilon.clamp(0.0, 1.0);
        self
    }
}
