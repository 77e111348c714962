use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Play,
    Research,
    Practice,
    #[serde(untagged)]
    Other(String),
}

impl RunMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Play => "play",
            Self::Research => "research",
            Self::Practice => "practice",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "play" => Self::Play,
            "research" => Self::Research,
            "practice" => Self::Practice,
            other => Self::Other(other.to_string()),
        }
    }

    /// Modes that must stay neutral unless explicitly overridden.
    pub fn is_research_like(&self) -> bool {
        matches!(self, Self::Research | Self::Practice)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyContext {
    pub run_mode: RunMode,
    pub seed: u64,
    pub override_enabled: bool,
}

impl PolicyContext {
    pub fn new(run_mode: RunMode, seed: u64) -> Self {
        Self {
            run_mode,
            seed,
            override_enabled: false,
        }
    }

    pub fn with_override(mut self, enabled: bool) -> Self {
        self.override_enabled = enabled;
        self
    }
}

impl Default for PolicyContext {
    fn default() -> Self {
        Self::new(RunMode::Play, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub t_sec: f64,
    pub accuracy_pct: f64,
    pub miss_count: f64,
    pub hit_count: f64,
    pub combo_count: f64,
    pub time_left_sec: f64,
    pub health_ratio: f64,
    pub reaction_ms: f64,
    pub hazard_active: bool,
    pub urgent: bool,
    pub context_tag: String,
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            t_sec: 0.0,
            accuracy_pct: 0.0,
            miss_count: 0.0,
            hit_count: 0.0,
            combo_count: 0.0,
            time_left_sec: 0.0,
            health_ratio: 1.0,
            reaction_ms: 0.0,
            hazard_active: false,
            urgent: false,
            context_tag: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKind {
    MissRate10s,
    AccuracyDeficit,
    ComboDeficit,
    TimeLeftDeficit,
    HazardActive,
    UrgencyFlag,
    Fatigue,
    SkillGap,
    Risk,
}

impl FeatureKind {
    pub const DEFAULT_SET: [FeatureKind; 6] = [
        FeatureKind::MissRate10s,
        FeatureKind::AccuracyDeficit,
        FeatureKind::ComboDeficit,
        FeatureKind::TimeLeftDeficit,
        FeatureKind::HazardActive,
        FeatureKind::UrgencyFlag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissRate10s => "missRate10s",
            Self::AccuracyDeficit => "accuracyDeficit",
            Self::ComboDeficit => "comboDeficit",
            Self::TimeLeftDeficit => "timeLeftDeficit",
            Self::HazardActive => "hazardActive",
            Self::UrgencyFlag => "urgencyFlag",
            Self::Fatigue => "fatigue",
            Self::SkillGap => "skillGap",
            Self::Risk => "risk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub labels: Vec<String>,
}

impl FeatureVector {
    /// Every value is clamped into `[0, 1]`; non-finite entries become 0.
    pub fn new(values: Vec<f64>, labels: Vec<String>) -> Self {
        let values = values
            .into_iter()
            .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
            .collect();
        Self { values, labels }
    }

    pub fn zeros(dim: usize) -> Self {
        Self {
            values: vec![0.0; dim],
            labels: vec![String::new(); dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Calm,
    Elevated,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_risk(risk: f64) -> Self {
        if risk >= 0.82 {
            Self::Critical
        } else if risk >= 0.62 {
            Self::High
        } else if risk >= 0.42 {
            Self::Elevated
        } else {
            Self::Calm
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Calm => 0,
            Self::Elevated => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatorState {
    pub skill_ema: f64,
    pub fatigue_ema: f64,
    pub risk_ema: f64,
    pub pace_ema: f64,
    pub last_update_t: f64,
}

impl Default for EstimatorState {
    fn default() -> Self {
        Self {
            skill_ema: 0.5,
            fatigue_ema: 0.0,
            risk_ema: 0.5,
            pace_ema: 0.5,
            last_update_t: 0.0,
        }
    }
}

/// Instantaneous sub-signals derived from the latest sample, all in `[0, 1]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBreakdown {
    pub acc_bad: f64,
    pub miss_rise: f64,
    pub combo_low: f64,
    pub time_low: f64,
    pub hazard: f64,
    pub urgent: f64,
    pub risk_instant: f64,
    pub skill_instant: f64,
    pub fatigue_instant: f64,
    pub pace_instant: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatorSnapshot {
    pub state: EstimatorState,
    pub signals: SignalBreakdown,
    pub risk_level: RiskLevel,
    pub miss_rate_10s: f64,
    pub recent_miss_ratio: f64,
    pub reaction_score: Option<f64>,
    pub health_ratio: f64,
    pub combo_count: f64,
    pub hazard_active: bool,
    pub urgent: bool,
    pub samples_seen: u64,
}

impl EstimatorSnapshot {
    pub fn t_sec(&self) -> f64 {
        self.state.last_update_t
    }
}

impl Default for EstimatorSnapshot {
    fn default() -> Self {
        let state = EstimatorState::default();
        Self {
            risk_level: RiskLevel::from_risk(state.risk_ema),
            state,
            signals: SignalBreakdown::default(),
            miss_rate_10s: 0.0,
            recent_miss_ratio: 0.0,
            reaction_score: None,
            health_ratio: 1.0,
            combo_count: 0.0,
            hazard_active: false,
            urgent: false,
            samples_seen: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyParams {
    pub spawn_mul: f64,
    pub size_mul: f64,
    pub hazard_mul: f64,
}

impl DifficultyParams {
    pub const NEUTRAL: Self = Self {
        spawn_mul: 1.0,
        size_mul: 1.0,
        hazard_mul: 1.0,
    };

    pub fn new(spawn_mul: f64, size_mul: f64, hazard_mul: f64) -> Self {
        Self {
            spawn_mul,
            size_mul,
            hazard_mul,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.spawn_mul, self.size_mul, self.hazard_mul]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

impl Default for DifficultyParams {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[derive(Default)]
pub enum Action {
    #[default]
    Normal,
    Burst,
    Wave,
    Storm,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Normal, Action::Burst, Action::Wave, Action::Storm];
    pub const COUNT: usize = 4;

    pub fn index(&self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Burst => 1,
            Self::Wave => 2,
            Self::Storm => 3,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        Self::ALL[idx.min(Self::COUNT - 1)]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Burst => "BURST",
            Self::Wave => "WAVE",
            Self::Storm => "STORM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Bad,
    Good,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdCrossing {
    pub signal: String,
    pub value: f64,
    pub threshold: f64,
    pub above: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipExplain {
    pub trigger: String,
    pub risk: f64,
    pub skill: f64,
    pub crossings: Vec<ThresholdCrossing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingTip {
    pub reason_key: String,
    pub message: String,
    pub severity: Severity,
    pub emitted_at_t: f64,
    pub explain: TipExplain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "action")]
pub enum ContextEvent {
    HazardHit,
    ComboBreak,
    PatternChanged(Action),
}

impl ContextEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HazardHit => "hazard_hit",
            Self::ComboBreak => "combo_break",
            Self::PatternChanged(_) => "pattern_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Diagnostic {
    StoreUnavailable { detail: String },
    ModelDiscarded { reason: String },
    RewardSkipped { samples: usize, required: usize },
    ValueClipped { action: Action, field: String },
    ModelPersisted { updates: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDecision {
    pub action: Action,
    pub features: FeatureVector,
    pub probabilities: Vec<f64>,
    pub explored: bool,
    pub chosen_at_t: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardOutcome {
    pub action: Action,
    pub reward: u8,
    pub prediction_before: f64,
    pub samples: usize,
}
