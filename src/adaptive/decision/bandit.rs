use serde::{Deserialize, Serialize};

use crate::adaptive::config::BanditConfig;
use crate::adaptive::rng::RandomSource;
use crate::adaptive::types::{Action, FeatureVector, PatternDecision};

const Z_LIMIT: f64 = 30.0;
const PROB_EPSILON: f64 = 1e-12;

/// Per-action logistic scorer. `weights[a.index()]` has length `dim`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanditModel {
    pub dim: usize,
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub updates: u64,
}

impl BanditModel {
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            weights: vec![vec![0.0; dim]; Action::COUNT],
            bias: vec![0.0; Action::COUNT],
            updates: 0,
        }
    }

    /// Shape matches `dim` and every parameter is finite.
    pub fn is_well_formed(&self, dim: usize) -> bool {
        self.dim == dim
            && self.weights.len() == Action::COUNT
            && self.bias.len() == Action::COUNT
            && self.weights.iter().all(|w| w.len() == dim)
            && self.weights.iter().flatten().all(|v| v.is_finite())
            && self.bias.iter().all(|v| v.is_finite())
    }

    pub fn score(&self, action: Action, x: &FeatureVector) -> f64 {
        let idx = action.index();
        let dot: f64 = self.weights[idx]
            .iter()
            .zip(x.values.iter())
            .map(|(w, xi)| w * xi)
            .sum();
        self.bias[idx] + dot
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub prediction_before: f64,
    pub prediction_after: f64,
    /// Names of parameters that hit their clip bound (or came out non-finite).
    pub clipped: Vec<String>,
}

pub fn sigmoid(z: f64) -> f64 {
    let z = if z.is_nan() { 0.0 } else { z.clamp(-Z_LIMIT, Z_LIMIT) };
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

pub fn softmax(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let uniform = vec![1.0 / scores.len() as f64; scores.len()];
    let max = scores
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return uniform;
    }
    let exps: Vec<f64> = scores
        .iter()
        .map(|s| if s.is_finite() { (s - max).exp() } else { 0.0 })
        .collect();
    let total: f64 = exps.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return uniform;
    }
    exps.into_iter().map(|e| e / total).collect()
}

/// Projects a distribution into `[floor, ceil]` per entry while keeping total mass 1.
///
/// Entries that violate a bound are pinned to it and the free mass is rescaled,
/// repeating until nothing moves. Infeasible bounds yield the uniform distribution.
pub fn bound_probabilities(raw: &[f64], floor: f64, ceil: f64) -> Vec<f64> {
    let n = raw.len();
    if n == 0 {
        return Vec::new();
    }
    let nf = n as f64;
    let uniform = vec![1.0 / nf; n];
    let feasible = floor.is_finite()
        && ceil.is_finite()
        && floor >= 0.0
        && floor <= ceil
        && floor * nf <= 1.0 + PROB_EPSILON
        && ceil * nf >= 1.0 - PROB_EPSILON;
    if !feasible {
        return uniform;
    }

    let mut p: Vec<f64> = raw
        .iter()
        .map(|v| if v.is_finite() && *v > 0.0 { *v } else { 0.0 })
        .collect();
    let total: f64 = p.iter().sum();
    if total > 0.0 {
        p.iter_mut().for_each(|v| *v /= total);
    } else {
        p = uniform;
    }

    let mut pinned = vec![false; n];
    pin_until_stable(&mut p, &mut pinned, |v| v < floor, floor);
    pin_until_stable(&mut p, &mut pinned, |v| v > ceil, ceil);

    let leftover = 1.0 - p.iter().sum::<f64>();
    if leftover.abs() > PROB_EPSILON {
        spread_leftover(&mut p, leftover, floor, ceil);
    }
    p
}

fn rescale_free(p: &mut [f64], pinned: &[bool]) {
    let pinned_mass: f64 = p.iter().zip(pinned).filter(|(_, f)| **f).map(|(v, _)| v).sum();
    let free_mass: f64 = p.iter().zip(pinned).filter(|(_, f)| !**f).map(|(v, _)| v).sum();
    let free_count = pinned.iter().filter(|f| !**f).count();
    if free_count == 0 {
        return;
    }
    let remaining = (1.0 - pinned_mass).max(0.0);
    for (v, f) in p.iter_mut().zip(pinned) {
        if *f {
            continue;
        }
        *v = if free_mass > 0.0 {
            *v * remaining / free_mass
        } else {
            remaining / free_count as f64
        };
    }
}

fn pin_until_stable(p: &mut [f64], pinned: &mut [bool], violates: impl Fn(f64) -> bool, bound: f64) {
    loop {
        rescale_free(p, pinned);
        let mut changed = false;
        for (v, f) in p.iter_mut().zip(pinned.iter_mut()) {
            if !*f && violates(*v) {
                *v = bound;
                *f = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// Everything got pinned and the mass is off: hand the difference to entries with room.
fn spread_leftover(p: &mut [f64], mut leftover: f64, floor: f64, ceil: f64) {
    for _ in 0..p.len() {
        if leftover.abs() <= PROB_EPSILON {
            break;
        }
        let open: Vec<usize> = (0..p.len())
            .filter(|&i| {
                if leftover > 0.0 {
                    p[i] < ceil
                } else {
                    p[i] > floor
                }
            })
            .collect();
        if open.is_empty() {
            break;
        }
        let share = leftover / open.len() as f64;
        for i in open {
            let room = if leftover > 0.0 { ceil - p[i] } else { floor - p[i] };
            let delta = if leftover > 0.0 { share.min(room) } else { share.max(room) };
            p[i] += delta;
            leftover -= delta;
        }
    }
}

/// Clamp to `[-bound, bound]`; NaN keeps the previous value.
fn clip(value: f64, bound: f64, last_valid: f64) -> (f64, bool) {
    let bound = if bound.is_nan() { 0.0 } else { bound.abs() };
    if value.is_nan() {
        return (last_valid.max(-bound).min(bound), true);
    }
    let clipped = value.max(-bound).min(bound);
    (clipped, clipped != value)
}

/// Contextual bandit over spawn patterns: softmax over logistic scores with a
/// probability floor/ceiling, epsilon-greedy exploration and online SGD.
pub struct PatternBandit {
    config: BanditConfig,
    model: BanditModel,
    last_decision: Option<PatternDecision>,
}

impl PatternBandit {
    pub fn new(config: BanditConfig) -> Self {
        let model = BanditModel::zeros(config.feature_dim());
        Self {
            config,
            model,
            last_decision: None,
        }
    }

    /// Uses `model` if it fits this configuration, otherwise starts from zeros.
    pub fn with_model(config: BanditConfig, model: BanditModel) -> Self {
        let mut bandit = Self::new(config);
        if model.is_well_formed(bandit.dim()) {
            bandit.model = model;
        } else {
            tracing::warn!(
                expected = bandit.dim(),
                found = model.dim,
                "bandit model does not fit feature set, starting fresh"
            );
        }
        bandit
    }

    pub fn dim(&self) -> usize {
        self.config.feature_dim()
    }

    pub fn model(&self) -> &BanditModel {
        &self.model
    }

    pub fn config(&self) -> &BanditConfig {
        &self.config
    }

    pub fn last_decision(&self) -> Option<&PatternDecision> {
        self.last_decision.as_ref()
    }

    pub fn predict(&self, action: Action, x: &FeatureVector) -> f64 {
        sigmoid(self.model.score(action, x))
    }

    /// Selection distribution after softmax and probability bounds, indexed like `Action::ALL`.
    pub fn probabilities(&self, x: &FeatureVector) -> Vec<f64> {
        let scores: Vec<f64> = Action::ALL.iter().map(|a| self.model.score(*a, x)).collect();
        bound_probabilities(&softmax(&scores), self.config.prob_floor, self.config.prob_ceil)
    }

    pub fn choose(&mut self, x: &FeatureVector, t_sec: f64, rng: &mut dyn RandomSource) -> Action {
        let probabilities = self.probabilities(x);
        let explored = rng.next_unit() < self.config.epsilon;
        let action = if explored {
            Action::from_index(rng.next_index(Action::COUNT))
        } else {
            let u = rng.next_unit();
            let mut cumulative = 0.0;
            let mut picked = Action::COUNT - 1;
            for (idx, p) in probabilities.iter().enumerate() {
                cumulative += p;
                if u < cumulative {
                    picked = idx;
                    break;
                }
            }
            Action::from_index(picked)
        };

        self.last_decision = Some(PatternDecision {
            action,
            features: x.clone(),
            probabilities,
            explored,
            chosen_at_t: t_sec,
        });
        action
    }

    /// One logistic-regression SGD step for `action` toward `reward` (0 or 1).
    pub fn update(&mut self, action: Action, x: &FeatureVector, reward: u8) -> UpdateReport {
        let y = if reward > 0 { 1.0 } else { 0.0 };
        let idx = action.index();
        let prediction_before = self.predict(action, x);
        let err = y - prediction_before;
        let lr = self.config.effective_learning_rate(self.model.updates);
        let l2 = self.config.l2;
        let mut clipped = Vec::new();

        let weights = &mut self.model.weights[idx];
        for (i, w) in weights.iter_mut().enumerate() {
            let xi = x.values.get(i).copied().unwrap_or(0.0);
            let proposed = *w + lr * (err * xi - l2 * *w);
            let (value, hit) = clip(proposed, self.config.weight_clip, *w);
            if hit {
                clipped.push(format!("w{i}"));
            }
            *w = value;
        }
        let b = self.model.bias[idx];
        let (value, hit) = clip(b + lr * (err - l2 * b), self.config.bias_clip, b);
        if hit {
            clipped.push("bias".to_string());
        }
        self.model.bias[idx] = value;
        self.model.updates += 1;

        if !clipped.is_empty() {
            tracing::debug!(action = action.as_str(), fields = ?clipped, "bandit parameters clipped");
        }

        UpdateReport {
            prediction_before,
            prediction_after: self.predict(action, x),
            clipped,
        }
    }
}
