use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::adaptive::config::DirectorConfig;
use crate::adaptive::types::{DifficultyParams, EstimatorSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorDecision {
    pub t_sec: f64,
    pub risk: f64,
    pub target: DifficultyParams,
    pub prev: DifficultyParams,
    pub next: DifficultyParams,
}

/// Maps smoothed risk to bounded spawn/size/hazard multipliers.
///
/// Each call moves every parameter toward its target by at most `max_step`, then
/// clamps it into the fairness range, so no telemetry sequence can make the game
/// jump or leave the approved envelope.
pub struct DifficultyDirector {
    config: DirectorConfig,
    current: DifficultyParams,
    log: VecDeque<DirectorDecision>,
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

impl DifficultyDirector {
    pub fn new(config: DirectorConfig) -> Self {
        let bounds = config.bounds();
        let neutral = DifficultyParams::NEUTRAL.as_array();
        let start = std::array::from_fn(|i| bounds[i].clamp(neutral[i]));
        Self {
            config,
            current: DifficultyParams::from_array(start),
            log: VecDeque::new(),
        }
    }

    pub fn current(&self) -> DifficultyParams {
        self.current
    }

    pub fn recent_decisions(&self) -> impl Iterator<Item = &DirectorDecision> {
        self.log.iter()
    }

    /// Target set for a given risk: high risk leans on `easy`, low risk on `hard`.
    pub fn target_for(&self, risk: f64) -> DifficultyParams {
        let t = if risk.is_finite() {
            (1.0 - risk).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let easy = self.config.easy.as_array();
        let hard = self.config.hard.as_array();
        DifficultyParams::from_array(std::array::from_fn(|i| lerp(easy[i], hard[i], t)))
    }

    pub fn update(&mut self, snapshot: &EstimatorSnapshot, enabled: bool) -> DifficultyParams {
        if !enabled {
            return DifficultyParams::NEUTRAL;
        }

        let risk = snapshot.state.risk_ema;
        let target = self.target_for(risk);
        let prev = self.current;
        let max_step = self.config.max_step.abs();
        let bounds = self.config.bounds();
        let old = prev.as_array();
        let goal = target.as_array();

        let next = std::array::from_fn(|i| {
            let delta = goal[i] - old[i];
            if !delta.is_finite() {
                return old[i];
            }
            bounds[i].clamp(old[i] + delta.max(-max_step).min(max_step))
        });
        self.current = DifficultyParams::from_array(next);

        self.log.push_front(DirectorDecision {
            t_sec: snapshot.t_sec(),
            risk,
            target,
            prev,
            next: self.current,
        });
        self.log.truncate(self.config.log_capacity);

        tracing::trace!(
            risk,
            spawn_mul = self.current.spawn_mul,
            size_mul = self.current.size_mul,
            hazard_mul = self.current.hazard_mul,
            "director step"
        );

        self.current
    }
}

impl Default for DifficultyDirector {
    fn default() -> Self {
        Self::new(DirectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_risk(risk: f64) -> EstimatorSnapshot {
        let mut snap = EstimatorSnapshot::default();
        snap.state.risk_ema = risk;
        snap
    }

    #[test]
    fn test_neutral_at_mid_risk() {
        let director = DifficultyDirector::default();
        let target = director.target_for(0.5);
        assert!((target.spawn_mul - 1.0).abs() < 1e-12);
        assert!((target.size_mul - 1.0).abs() < 1e-12);
        assert!((target.hazard_mul - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_high_risk_eases() {
        let mut director = DifficultyDirector::default();
        let p = director.update(&snapshot_with_risk(0.95), true);
        assert!(p.spawn_mul < 1.0);
        assert!(p.size_mul > 1.0);
        assert!(p.hazard_mul < 1.0);
    }

    #[test]
    fn test_step_is_limited() {
        let mut director = DifficultyDirector::default();
        let mut prev = director.current();
        for i in 0..50 {
            let risk = if i % 2 == 0 { 0.02 } else { 0.95 };
            let next = director.update(&snapshot_with_risk(risk), true);
            for (a, b) in prev.as_array().iter().zip(next.as_array()) {
                assert!((b - a).abs() <= 0.04 + 1e-12);
            }
            prev = next;
        }
    }

    #[test]
    fn test_stays_in_bounds() {
        let mut director = DifficultyDirector::default();
        for _ in 0..200 {
            let p = director.update(&snapshot_with_risk(0.02), true);
            for v in p.as_array() {
                assert!((0.80..=1.25).contains(&v));
            }
        }
        assert!((director.current().spawn_mul - 1.192).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_returns_neutral() {
        let mut director = DifficultyDirector::default();
        for _ in 0..10 {
            assert_eq!(director.update(&snapshot_with_risk(0.95), false), DifficultyParams::NEUTRAL);
        }
        assert_eq!(director.recent_decisions().count(), 0);
    }

    #[test]
    fn test_nan_risk_holds_center() {
        let mut director = DifficultyDirector::default();
        let p = director.update(&snapshot_with_risk(f64::NAN), true);
        assert!(p.as_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_log_capacity() {
        let mut director = DifficultyDirector::default();
        for _ in 0..40 {
            director.update(&snapshot_with_risk(0.7), true);
        }
        assert_eq!(director.recent_decisions().count(), 18);
    }
}
