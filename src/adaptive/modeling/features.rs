use crate::adaptive::modeling::estimator::unit;
use crate::adaptive::types::{EstimatorSnapshot, FeatureKind, FeatureVector};

/// Turns estimator snapshots into the fixed-order bandit context.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    kinds: Vec<FeatureKind>,
    ref_miss_rate: f64,
}

impl FeatureExtractor {
    pub fn new(kinds: Vec<FeatureKind>, ref_miss_rate: f64) -> Self {
        Self {
            kinds,
            ref_miss_rate,
        }
    }

    pub fn dim(&self) -> usize {
        self.kinds.len()
    }

    pub fn kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }

    pub fn extract(&self, snapshot: &EstimatorSnapshot) -> FeatureVector {
        let signals = &snapshot.signals;
        let state = &snapshot.state;
        let values = self
            .kinds
            .iter()
            .map(|kind| match kind {
                FeatureKind::MissRate10s => unit(snapshot.miss_rate_10s / self.ref_miss_rate),
                FeatureKind::AccuracyDeficit => signals.acc_bad,
                FeatureKind::ComboDeficit => signals.combo_low,
                FeatureKind::TimeLeftDeficit => signals.time_low,
                FeatureKind::HazardActive => signals.hazard,
                FeatureKind::UrgencyFlag => signals.urgent,
                FeatureKind::Fatigue => state.fatigue_ema,
                FeatureKind::SkillGap => 1.0 - state.skill_ema,
                FeatureKind::Risk => state.risk_ema,
            })
            .collect();
        let labels = self.kinds.iter().map(|k| k.as_str().to_string()).collect();
        FeatureVector::new(values, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::modeling::SignalEstimator;
    use crate::adaptive::types::TelemetrySample;

    #[test]
    fn test_default_set_shape() {
        let fx = FeatureExtractor::new(FeatureKind::DEFAULT_SET.to_vec(), 0.45);
        let fv = fx.extract(&EstimatorSnapshot::default());
        assert_eq!(fv.dim(), 6);
        assert_eq!(fv.labels[0], "missRate10s");
        assert!(fv.values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_flags_propagate() {
        let mut est = SignalEstimator::default();
        let snap = est.update(&TelemetrySample {
            t_sec: 1.0,
            hazard_active: true,
            urgent: true,
            ..Default::default()
        });
        let fx = FeatureExtractor::new(
            vec![FeatureKind::HazardActive, FeatureKind::UrgencyFlag, FeatureKind::Risk],
            0.45,
        );
        let fv = fx.extract(&snap);
        assert_eq!(fv.values[0], 1.0);
        assert_eq!(fv.values[1], 1.0);
        assert!((fv.values[2] - snap.state.risk_ema).abs() < 1e-12);
    }
}
