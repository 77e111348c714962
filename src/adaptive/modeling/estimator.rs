use std::collections::VecDeque;

use crate::adaptive::config::EstimatorConfig;
use crate::adaptive::types::{
    EstimatorSnapshot, EstimatorState, RiskLevel, SignalBreakdown, TelemetrySample,
};

/// Clamp into `[0, 1]`; NaN maps to 0.
pub(crate) fn unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn finite(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowPoint {
    t: f64,
    miss: f64,
    hit: f64,
}

pub struct SignalEstimator {
    config: EstimatorConfig,
    state: EstimatorState,
    prev: Option<WindowPoint>,
    last_miss_rate: f64,
    last_hit_rate: f64,
    window: VecDeque<WindowPoint>,
    samples_seen: u64,
    last_snapshot: EstimatorSnapshot,
}

impl SignalEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            state: EstimatorState::default(),
            prev: None,
            last_miss_rate: 0.0,
            last_hit_rate: 0.0,
            window: VecDeque::new(),
            samples_seen: 0,
            last_snapshot: EstimatorSnapshot::default(),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn snapshot(&self) -> &EstimatorSnapshot {
        &self.last_snapshot
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn update(&mut self, sample: &TelemetrySample) -> EstimatorSnapshot {
        let cfg = &self.config;
        let t = finite(sample.t_sec).max(0.0);
        let miss = finite(sample.miss_count).max(0.0);
        let hit = finite(sample.hit_count).max(0.0);
        let acc = finite(sample.accuracy_pct).clamp(0.0, 100.0);
        let combo = finite(sample.combo_count).max(0.0);
        let time_left = finite(sample.time_left_sec);

        let (miss_rate, hit_rate) = match self.prev {
            Some(prev) if t > prev.t => {
                let dt = t - prev.t;
                ((miss - prev.miss).max(0.0) / dt, (hit - prev.hit).max(0.0) / dt)
            }
            Some(_) => (self.last_miss_rate, self.last_hit_rate),
            None if t > 0.0 => (miss / t, hit / t),
            None => (0.0, 0.0),
        };
        self.last_miss_rate = finite(miss_rate);
        self.last_hit_rate = finite(hit_rate);

        let acc_bad = unit((cfg.target_acc_pct - acc) / cfg.acc_spread);
        let miss_rise = unit(miss_rate / cfg.ref_miss_rate);
        let combo_low = unit((cfg.ref_combo - combo) / cfg.ref_combo);
        // No clock reported (or round already over): the timer adds no pressure.
        let time_low = if time_left > 0.0 {
            unit((cfg.ref_time_sec - time_left) / cfg.ref_time_sec)
        } else {
            0.0
        };
        let hazard = if sample.hazard_active { 1.0 } else { 0.0 };
        let urgent = if sample.urgent { 1.0 } else { 0.0 };

        let w = &cfg.weights;
        let risk_raw = w.acc_bad * acc_bad
            + w.miss_rise * miss_rise
            + w.combo_low * combo_low
            + w.time_low * time_low
            + w.hazard * hazard
            + w.urgent * urgent;
        let risk_instant = finite(risk_raw).max(cfg.risk_floor).min(cfg.risk_ceil);

        let reaction_score = (sample.reaction_ms.is_finite() && sample.reaction_ms > 0.0).then(|| {
            let span = (cfg.slow_reaction_ms - cfg.fast_reaction_ms).max(1.0);
            1.0 - unit((sample.reaction_ms - cfg.fast_reaction_ms) / span)
        });
        let pace_instant = reaction_score.unwrap_or_else(|| unit(hit_rate / cfg.ref_hit_rate));
        let skill_instant = unit(
            0.60 * acc / 100.0 + 0.25 * unit(combo / cfg.ref_combo) + 0.15 * pace_instant,
        );
        let fatigue_instant = unit(0.60 * unit(t / cfg.fatigue_ref_sec) + 0.40 * miss_rise);

        let alpha = cfg.alpha.clamp(0.0, 1.0);
        let ema = |old: f64, new: f64| unit((1.0 - alpha) * old + alpha * new);
        self.state.risk_ema = ema(self.state.risk_ema, risk_instant)
            .max(cfg.risk_floor)
            .min(cfg.risk_ceil);
        self.state.skill_ema = ema(self.state.skill_ema, skill_instant);
        self.state.fatigue_ema = ema(self.state.fatigue_ema, fatigue_instant);
        self.state.pace_ema = ema(self.state.pace_ema, pace_instant);
        self.state.last_update_t = t;

        let point = WindowPoint { t, miss, hit };
        self.push_window(point);
        self.prev = Some(point);
        self.samples_seen += 1;

        let (miss_rate_10s, recent_miss_ratio) = self.window_rates();

        self.last_snapshot = EstimatorSnapshot {
            state: self.state.clone(),
            signals: SignalBreakdown {
                acc_bad,
                miss_rise,
                combo_low,
                time_low,
                hazard,
                urgent,
                risk_instant,
                skill_instant,
                fatigue_instant,
                pace_instant,
            },
            risk_level: RiskLevel::from_risk(self.state.risk_ema),
            miss_rate_10s,
            recent_miss_ratio,
            reaction_score,
            health_ratio: unit(sample.health_ratio),
            combo_count: combo,
            hazard_active: sample.hazard_active,
            urgent: sample.urgent,
            samples_seen: self.samples_seen,
        };
        self.last_snapshot.clone()
    }

    fn push_window(&mut self, point: WindowPoint) {
        // Time went backwards: a new round started, old counters are meaningless.
        if self.window.back().is_some_and(|last| point.t < last.t) {
            self.window.clear();
        }
        self.window.push_back(point);
        let cutoff = point.t - self.config.miss_window_sec;
        while self.window.front().is_some_and(|p| p.t < cutoff) {
            self.window.pop_front();
        }
    }

    /// Misses per second over the window, and misses / (misses + hits) in it.
    fn window_rates(&self) -> (f64, f64) {
        let (Some(first), Some(last)) = (self.window.front(), self.window.back()) else {
            return (0.0, 0.0);
        };
        if self.window.len() < 2 {
            return (0.0, 0.0);
        }
        let dm = (last.miss - first.miss).max(0.0);
        let dh = (last.hit - first.hit).max(0.0);
        let rate = finite(dm / self.config.miss_window_sec.max(1.0));
        let ratio = if dm + dh > 0.0 { dm / (dm + dh) } else { 0.0 };
        (rate, ratio)
    }
}

impl Default for SignalEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}
