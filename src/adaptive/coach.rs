use std::collections::HashMap;

use crate::adaptive::config::{CoachConfig, CoachThresholds};
use crate::adaptive::rng::RandomSource;
use crate::adaptive::types::{
    Action, CoachingTip, ContextEvent, EstimatorSnapshot, Severity, ThresholdCrossing, TipExplain,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    HazardHit,
    ComboBreak,
    PatternHeadsUp,
    UrgentTime,
    Hazard,
    LowAcc,
    MissRate,
    SlowReaction,
    LowHealth,
    TimeLow,
    ComboKeep,
}

impl Reason {
    fn key(self) -> &'static str {
        match self {
            Self::HazardHit => "hazard_hit",
            Self::ComboBreak => "combo_break",
            Self::PatternHeadsUp => "pattern_heads_up",
            Self::UrgentTime => "urgent_time",
            Self::Hazard => "hazard",
            Self::LowAcc => "low_acc",
            Self::MissRate => "miss_rate",
            Self::SlowReaction => "slow_reaction",
            Self::LowHealth => "low_health",
            Self::TimeLow => "time_low",
            Self::ComboKeep => "combo_keep",
        }
    }

    fn severity(self) -> Severity {
        match self {
            Self::HazardHit | Self::LowHealth => Severity::Bad,
            Self::ComboKeep => Severity::Good,
            Self::PatternHeadsUp => Severity::Info,
            _ => Severity::Warn,
        }
    }

    fn templates(self) -> &'static [&'static str] {
        match self {
            Self::HazardHit => &[
                "Ouch! Watch out for hazards, dodge before you tap.",
                "Hazard hit. Slow down and check what you're aiming at.",
            ],
            Self::ComboBreak => &[
                "Combo broken. Take a breath and rebuild it one hit at a time.",
                "Lost the streak. Aim for clean hits, speed comes back on its own.",
            ],
            Self::PatternHeadsUp => &[
                "A rush is coming. Stay centered and pick targets calmly.",
                "Pattern change ahead. Eyes up, get ready.",
            ],
            Self::UrgentTime => &[
                "Final seconds! Go for the sure hits.",
                "Almost out of time. Only take the safe targets.",
            ],
            Self::Hazard => &[
                "Storm is active. Be picky and skip risky targets.",
                "Hazards on screen. Accuracy beats speed right now.",
            ],
            Self::LowAcc => &[
                "Accuracy is slipping. Aim for the center of each target.",
                "Take a moment to aim. Fewer, cleaner hits score more.",
                "Slow down a little. Precision first.",
            ],
            Self::MissRate => &[
                "Lots of misses lately. Wait for the target before tapping.",
                "Missing often. Track one target at a time.",
            ],
            Self::SlowReaction => &[
                "Reactions are a bit slow. Keep your eyes near the center.",
                "Try to spot targets earlier, scan the whole area.",
            ],
            Self::LowHealth => &[
                "Health is low! Play safe for a while.",
                "Careful, you're running low. Avoid bad targets.",
            ],
            Self::TimeLow => &[
                "Time is running low. Keep the rhythm steady.",
                "Clock is ticking. Focus on what you can hit.",
            ],
            Self::ComboKeep => &[
                "Great rhythm! Keep that combo going.",
                "You're on fire. Stay steady and keep the streak.",
            ],
        }
    }
}

fn crossing(signal: &str, value: f64, threshold: f64, above: bool) -> Option<ThresholdCrossing> {
    let crossed = if above { value >= threshold } else { value < threshold };
    crossed.then(|| ThresholdCrossing {
        signal: signal.to_string(),
        value,
        threshold,
        above,
    })
}

/// Every threshold the snapshot crosses, in trigger order. Reported in the tip's explain block.
fn crossings(snapshot: &EstimatorSnapshot, th: &CoachThresholds) -> Vec<ThresholdCrossing> {
    let risk = snapshot.state.risk_ema;
    let s = &snapshot.signals;
    [
        crossing("risk", risk, th.pressure_risk, true),
        crossing("accBad", s.acc_bad, th.acc_bad, true),
        crossing("recentMissRatio", snapshot.recent_miss_ratio, th.miss_ratio, true),
        snapshot
            .reaction_score
            .and_then(|r| crossing("reactionScore", r, th.reaction_score, false)),
        crossing("healthRatio", snapshot.health_ratio, th.health_ratio, false),
        crossing("timeLow", s.time_low, th.time_low, true),
        crossing("skill", snapshot.state.skill_ema, th.skill_high, true),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn select(snapshot: &EstimatorSnapshot, event: Option<ContextEvent>, th: &CoachThresholds) -> Option<Reason> {
    match event {
        Some(ContextEvent::HazardHit) => return Some(Reason::HazardHit),
        Some(ContextEvent::ComboBreak) => return Some(Reason::ComboBreak),
        Some(ContextEvent::PatternChanged(Action::Burst | Action::Storm)) => {
            return Some(Reason::PatternHeadsUp)
        }
        Some(ContextEvent::PatternChanged(_)) | None => {}
    }

    let risk = snapshot.state.risk_ema;
    let pressured = risk >= th.pressure_risk;
    let s = &snapshot.signals;
    let slow = snapshot.reaction_score.is_some_and(|r| r < th.reaction_score);

    let ordered = [
        (snapshot.urgent && pressured, Reason::UrgentTime),
        (snapshot.hazard_active && pressured, Reason::Hazard),
        (s.acc_bad >= th.acc_bad, Reason::LowAcc),
        (snapshot.recent_miss_ratio >= th.miss_ratio, Reason::MissRate),
        (slow, Reason::SlowReaction),
        (snapshot.health_ratio < th.health_ratio, Reason::LowHealth),
        (s.time_low >= th.time_low && pressured, Reason::TimeLow),
        (
            snapshot.state.skill_ema >= th.skill_high && risk <= th.risk_low,
            Reason::ComboKeep,
        ),
    ];
    ordered.into_iter().find(|(hit, _)| *hit).map(|(_, reason)| reason)
}

/// Emits at most one explainable tip per cooldown window.
///
/// Cooldowns run on game time. A blocked tip leaves every timestamp untouched, so a
/// suppressed trigger does not extend its own cooldown.
pub struct CoachingNotifier {
    config: CoachConfig,
    last_any_ms: Option<f64>,
    last_by_reason: HashMap<&'static str, f64>,
    tips_shown: usize,
}

impl CoachingNotifier {
    pub fn new(config: CoachConfig) -> Self {
        Self {
            config,
            last_any_ms: None,
            last_by_reason: HashMap::new(),
            tips_shown: 0,
        }
    }

    pub fn tips_shown(&self) -> usize {
        self.tips_shown
    }

    fn can_fire(&self, key: &str, now_ms: f64) -> bool {
        let global_ok = self
            .last_any_ms
            .map_or(true, |last| now_ms - last >= self.config.global_cooldown_ms);
        let reason_ok = self
            .last_by_reason
            .get(key)
            .map_or(true, |last| now_ms - last >= self.config.reason_cooldown_ms);
        global_ok && reason_ok
    }

    fn mark_fired(&mut self, key: &'static str, now_ms: f64) {
        self.last_any_ms = Some(now_ms);
        self.last_by_reason.insert(key, now_ms);
        self.tips_shown += 1;
    }

    pub fn maybe_notify(
        &mut self,
        snapshot: &EstimatorSnapshot,
        event: Option<ContextEvent>,
        enabled: bool,
        rng: &mut dyn RandomSource,
    ) -> Option<CoachingTip> {
        if !enabled {
            return None;
        }
        if self.config.max_tips > 0 && self.tips_shown >= self.config.max_tips {
            return None;
        }

        let th = &self.config.thresholds;
        let reason = select(snapshot, event, th)?;
        let key = reason.key();
        let t_sec = snapshot.t_sec();
        let now_ms = t_sec * 1000.0;

        // A clock that ran backwards means a new round; old stamps no longer apply.
        if self.last_any_ms.is_some_and(|last| now_ms < last) {
            self.last_any_ms = None;
            self.last_by_reason.clear();
        }
        if !self.can_fire(key, now_ms) {
            return None;
        }

        let templates = reason.templates();
        let message = templates[rng.next_index(templates.len())].to_string();
        let explain = TipExplain {
            trigger: key.to_string(),
            risk: snapshot.state.risk_ema,
            skill: snapshot.state.skill_ema,
            crossings: crossings(snapshot, th),
            event: event.map(|e| e.as_str().to_string()),
        };

        self.mark_fired(key, now_ms);

        tracing::debug!(reason = key, t_sec, tips_shown = self.tips_shown, "coaching tip emitted");

        Some(CoachingTip {
            reason_key: key.to_string(),
            message,
            severity: reason.severity(),
            emitted_at_t: t_sec,
            explain,
        })
    }
}

impl Default for CoachingNotifier {
    fn default() -> Self {
        Self::new(CoachConfig::default())
    }
}
