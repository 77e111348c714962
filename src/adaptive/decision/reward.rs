use crate::adaptive::config::BanditConfig;
use crate::adaptive::types::{Action, FeatureVector, PatternDecision, TelemetrySample};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Progress {
    accuracy_pct: f64,
    miss_count: f64,
    combo_count: f64,
}

impl Progress {
    fn of(sample: &TelemetrySample) -> Self {
        Self {
            accuracy_pct: sample.accuracy_pct,
            miss_count: sample.miss_count,
            combo_count: sample.combo_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowVerdict {
    Reward(u8),
    Insufficient { samples: usize, required: usize },
}

/// Observation window opened when a pattern is chosen. The reward compares the
/// sample the choice was made on with the last one seen while it was open. Only
/// samples observed after the choice count toward `min_samples`.
#[derive(Debug, Clone)]
pub struct RewardWindow {
    action: Action,
    features: FeatureVector,
    opened_at_t: f64,
    baseline: Progress,
    latest: Progress,
    samples: usize,
}

impl RewardWindow {
    pub fn open(decision: &PatternDecision, sample: &TelemetrySample) -> Self {
        let baseline = Progress::of(sample);
        Self {
            action: decision.action,
            features: decision.features.clone(),
            opened_at_t: decision.chosen_at_t,
            baseline,
            latest: baseline,
            samples: 0,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn opened_at_t(&self) -> f64 {
        self.opened_at_t
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn observe(&mut self, sample: &TelemetrySample) {
        self.latest = Progress::of(sample);
        self.samples += 1;
    }

    /// Closed once the window length elapsed, or when the clock jumped backwards.
    pub fn is_due(&self, t_sec: f64, window_sec: f64) -> bool {
        t_sec < self.opened_at_t || t_sec - self.opened_at_t >= window_sec
    }

    pub fn evaluate(&self, config: &BanditConfig) -> WindowVerdict {
        if self.samples < config.min_samples {
            return WindowVerdict::Insufficient {
                samples: self.samples,
                required: config.min_samples,
            };
        }
        let acc_gain = self.latest.accuracy_pct - self.baseline.accuracy_pct;
        let misses_flat = self.latest.miss_count <= self.baseline.miss_count;
        let combo_grew = self.latest.combo_count > self.baseline.combo_count;
        let improved = acc_gain >= config.acc_improve_pct || (misses_flat && combo_grew);
        WindowVerdict::Reward(u8::from(improved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(t: f64) -> PatternDecision {
        PatternDecision {
            action: Action::Wave,
            features: FeatureVector::zeros(6),
            probabilities: vec![0.25; 4],
            explored: false,
            chosen_at_t: t,
        }
    }

    fn sample(t: f64, acc: f64, miss: f64, combo: f64) -> TelemetrySample {
        TelemetrySample {
            t_sec: t,
            accuracy_pct: acc,
            miss_count: miss,
            combo_count: combo,
            ..Default::default()
        }
    }

    #[test]
    fn test_accuracy_gain_rewards() {
        let mut w = RewardWindow::open(&decision(0.0), &sample(0.0, 60.0, 3.0, 0.0));
        w.observe(&sample(2.0, 60.0, 4.0, 0.0));
        w.observe(&sample(4.0, 61.0, 5.0, 0.0));
        w.observe(&sample(6.0, 63.0, 6.0, 0.0));
        assert!(w.is_due(6.0, 6.0));
        assert_eq!(w.evaluate(&BanditConfig::default()), WindowVerdict::Reward(1));
    }

    #[test]
    fn test_combo_without_misses_rewards() {
        let mut w = RewardWindow::open(&decision(0.0), &sample(0.0, 70.0, 3.0, 2.0));
        w.observe(&sample(2.0, 70.0, 3.0, 4.0));
        w.observe(&sample(4.0, 70.0, 3.0, 5.0));
        w.observe(&sample(6.0, 70.5, 3.0, 8.0));
        assert_eq!(w.evaluate(&BanditConfig::default()), WindowVerdict::Reward(1));
    }

    #[test]
    fn test_no_progress_is_zero() {
        let mut w = RewardWindow::open(&decision(0.0), &sample(0.0, 70.0, 3.0, 2.0));
        w.observe(&sample(2.0, 70.0, 3.0, 3.0));
        w.observe(&sample(4.0, 69.0, 4.0, 5.0));
        w.observe(&sample(6.0, 68.0, 6.0, 0.0));
        assert_eq!(w.evaluate(&BanditConfig::default()), WindowVerdict::Reward(0));
    }

    #[test]
    fn test_too_few_samples() {
        let mut w = RewardWindow::open(&decision(0.0), &sample(0.0, 70.0, 3.0, 2.0));
        w.observe(&sample(7.0, 90.0, 3.0, 2.0));
        assert_eq!(
            w.evaluate(&BanditConfig::default()),
            WindowVerdict::Insufficient { samples: 1, required: 3 }
        );
    }

    #[test]
    fn test_choice_sample_does_not_count() {
        let mut w = RewardWindow::open(&decision(0.0), &sample(0.0, 50.0, 3.0, 0.0));
        assert_eq!(w.samples(), 0);
        w.observe(&sample(3.0, 60.0, 3.0, 0.0));
        w.observe(&sample(6.0, 70.0, 3.0, 0.0));
        assert_eq!(
            w.evaluate(&BanditConfig::default()),
            WindowVerdict::Insufficient { samples: 2, required: 3 }
        );
        w.observe(&sample(7.0, 71.0, 3.0, 0.0));
        assert_eq!(w.evaluate(&BanditConfig::default()), WindowVerdict::Reward(1));
    }

    #[test]
    fn test_clock_reset_closes_window() {
        let w = RewardWindow::open(&decision(30.0), &sample(30.0, 70.0, 3.0, 2.0));
        assert!(!w.is_due(32.0, 6.0));
        assert!(w.is_due(1.0, 6.0));
    }
}
