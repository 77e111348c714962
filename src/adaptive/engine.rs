use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::adaptive::coach::CoachingNotifier;
use crate::adaptive::config::AdaptiveConfig;
use crate::adaptive::decision::{
    DifficultyDirector, DirectorDecision, PatternBandit, RewardWindow, WindowVerdict,
};
use crate::adaptive::modeling::{FeatureExtractor, SignalEstimator};
use crate::adaptive::persistence::{self, KeyValueStore, LoadOutcome};
use crate::adaptive::policy::PolicyGate;
use crate::adaptive::rng::{RandomSource, SeededRandom};
use crate::adaptive::telemetry;
use crate::adaptive::types::*;

/// Everything the host needs after one telemetry tick.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickOutput {
    pub t_sec: f64,
    pub snapshot: EstimatorSnapshot,
    pub difficulty: DifficultyParams,
    /// Pattern currently in effect; `NORMAL` whenever adaptation is off.
    pub action: Action,
    /// Present only on ticks where a new pattern was chosen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip: Option<CoachingTip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardTally {
    pub positive: u64,
    pub negative: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub profile_id: String,
    pub run_mode: String,
    pub enabled: bool,
    pub seed: u64,
    pub ticks: u64,
    pub final_difficulty: DifficultyParams,
    pub director_log: Vec<DirectorDecision>,
    pub tips_shown: usize,
    pub bandit_updates: u64,
    pub rewards: RewardTally,
    pub persisted: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// One player session. Owns all adaptive state; the host feeds it telemetry and
/// applies what comes back.
pub struct AdaptiveSession {
    id: Uuid,
    profile_id: String,
    config: AdaptiveConfig,
    gate: PolicyGate,
    rng: Box<dyn RandomSource>,
    estimator: SignalEstimator,
    features: FeatureExtractor,
    director: DifficultyDirector,
    bandit: PatternBandit,
    coach: CoachingNotifier,
    window: Option<RewardWindow>,
    current_action: Action,
    store: Option<Arc<dyn KeyValueStore>>,
    pending: Vec<Diagnostic>,
    ticks: u64,
    rewards: RewardTally,
    started_at: DateTime<Utc>,
}

impl AdaptiveSession {
    pub fn attach(
        context: PolicyContext,
        config: AdaptiveConfig,
        store: Option<Arc<dyn KeyValueStore>>,
        profile_id: &str,
    ) -> Self {
        let config = config.sanitized();
        let gate = PolicyGate::attach(context, config.enabled);
        let seed = gate.context().seed;
        let learning = gate.enabled() && config.bandit.enabled;

        let mut pending = Vec::new();
        let mut store = store;
        let mut bandit = PatternBandit::new(config.bandit.clone());

        if let Some(kv) = store.clone().filter(|_| learning && config.bandit.persist) {
            match persistence::load_model(kv.as_ref(), profile_id, config.bandit.feature_dim()) {
                LoadOutcome::Loaded(model) => {
                    bandit = PatternBandit::with_model(config.bandit.clone(), model);
                }
                LoadOutcome::Missing => {}
                LoadOutcome::Discarded(reason) => {
                    pending.push(Diagnostic::ModelDiscarded { reason });
                }
                LoadOutcome::StoreFailed(detail) => {
                    pending.push(Diagnostic::StoreUnavailable { detail });
                    store = None;
                }
            }
        }

        let id = Uuid::new_v4();
        tracing::info!(
            session_id = %id,
            profile_id = %profile_id,
            run_mode = %gate.context().run_mode.as_str(),
            enabled = gate.enabled(),
            seed,
            "adaptive session attached"
        );

        Self {
            id,
            profile_id: profile_id.to_string(),
            features: FeatureExtractor::new(
                config.bandit.features.clone(),
                config.estimator.ref_miss_rate,
            ),
            estimator: SignalEstimator::new(config.estimator.clone()),
            director: DifficultyDirector::new(config.director.clone()),
            coach: CoachingNotifier::new(config.coach.clone()),
            rng: Box::new(SeededRandom::new(seed)),
            bandit,
            gate,
            config,
            window: None,
            current_action: Action::Normal,
            store,
            pending,
            ticks: 0,
            rewards: RewardTally::default(),
            started_at: Utc::now(),
        }
    }

    /// Replaces the seeded generator, e.g. with a scripted one in tests.
    pub fn with_random_source(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn enabled(&self) -> bool {
        self.gate.enabled()
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &EstimatorSnapshot {
        self.estimator.snapshot()
    }

    pub fn difficulty(&self) -> DifficultyParams {
        if self.enabled() {
            self.director.current()
        } else {
            DifficultyParams::NEUTRAL
        }
    }

    pub fn current_action(&self) -> Action {
        self.current_action
    }

    pub fn bandit(&self) -> &PatternBandit {
        &self.bandit
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Builds a sample from a loosely-typed host record and runs one tick.
    pub fn tick(&mut self, raw: &Value) -> TickOutput {
        self.tick_sample(telemetry::build(raw))
    }

    pub fn tick_sample(&mut self, sample: TelemetrySample) -> TickOutput {
        self.ticks += 1;
        let mut diagnostics = std::mem::take(&mut self.pending);
        let enabled = self.gate.enabled();

        let snapshot = self.estimator.update(&sample);
        let difficulty = self.director.update(&snapshot, enabled);

        let mut pattern = None;
        let mut reward = None;
        if enabled && self.config.bandit.enabled {
            let t = snapshot.t_sec();
            match self.window.take() {
                Some(mut window) if !window.is_due(t, self.config.bandit.reward_window_sec) => {
                    window.observe(&sample);
                    self.window = Some(window);
                }
                Some(mut window) => {
                    if t >= window.opened_at_t() {
                        window.observe(&sample);
                    }
                    reward = self.settle(&window, &mut diagnostics);
                }
                None => {}
            }

            if self.window.is_none() {
                let x = self.features.extract(&snapshot);
                self.current_action = self.bandit.choose(&x, t, self.rng.as_mut());
                if let Some(decision) = self.bandit.last_decision().cloned() {
                    self.window = Some(RewardWindow::open(&decision, &sample));
                    pattern = Some(decision);
                }
            }
        } else {
            self.current_action = Action::Normal;
        }

        let event = pattern
            .as_ref()
            .map(|decision| ContextEvent::PatternChanged(decision.action));
        let tip = self
            .coach
            .maybe_notify(&snapshot, event, enabled, self.rng.as_mut());

        TickOutput {
            t_sec: snapshot.t_sec(),
            snapshot,
            difficulty,
            action: self.current_action,
            pattern,
            tip,
            reward,
            diagnostics,
        }
    }

    /// Discrete gameplay event from the host; may produce an event-driven tip.
    pub fn notify_event(&mut self, event: ContextEvent) -> Option<CoachingTip> {
        let enabled = self.gate.enabled();
        let snapshot = self.estimator.snapshot().clone();
        self.coach
            .maybe_notify(&snapshot, Some(event), enabled, self.rng.as_mut())
    }

    fn settle(&mut self, window: &RewardWindow, diagnostics: &mut Vec<Diagnostic>) -> Option<RewardOutcome> {
        match window.evaluate(&self.config.bandit) {
            WindowVerdict::Insufficient { samples, required } => {
                self.rewards.skipped += 1;
                tracing::debug!(samples, required, "reward window skipped");
                diagnostics.push(Diagnostic::RewardSkipped { samples, required });
                None
            }
            WindowVerdict::Reward(value) => {
                let action = window.action();
                let report = self.bandit.update(action, window.features(), value);
                if value > 0 {
                    self.rewards.positive += 1;
                } else {
                    self.rewards.negative += 1;
                }
                diagnostics.extend(
                    report
                        .clipped
                        .into_iter()
                        .map(|field| Diagnostic::ValueClipped { action, field }),
                );
                if let Some(diag) = self.persist() {
                    diagnostics.push(diag);
                }
                Some(RewardOutcome {
                    action,
                    reward: value,
                    prediction_before: report.prediction_before,
                    samples: window.samples(),
                })
            }
        }
    }

    /// Best-effort save. A failing store is dropped and the session carries on in memory.
    fn persist(&mut self) -> Option<Diagnostic> {
        if !self.config.bandit.persist {
            return None;
        }
        let store = self.store.as_ref()?;
        if !store.is_available() {
            self.store = None;
            tracing::warn!(profile_id = %self.profile_id, "store unavailable, continuing in memory");
            return Some(Diagnostic::StoreUnavailable {
                detail: "store reported unavailable".to_string(),
            });
        }
        match persistence::save_model(store.as_ref(), &self.profile_id, self.bandit.model()) {
            Ok(()) => Some(Diagnostic::ModelPersisted {
                updates: self.bandit.model().updates,
            }),
            Err(e) => {
                tracing::warn!(error = %e, profile_id = %self.profile_id, "bandit model save failed");
                self.store = None;
                Some(Diagnostic::StoreUnavailable {
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Final persistence attempt, then the session summary.
    pub fn end(mut self) -> SessionSummary {
        let persisted = self.enabled()
            && self.bandit.model().updates > 0
            && matches!(self.persist(), Some(Diagnostic::ModelPersisted { .. }));

        let summary = SessionSummary {
            session_id: self.id,
            profile_id: self.profile_id.clone(),
            run_mode: self.gate.context().run_mode.as_str().to_string(),
            enabled: self.gate.enabled(),
            seed: self.gate.context().seed,
            ticks: self.ticks,
            final_difficulty: self.difficulty(),
            director_log: self.director.recent_decisions().cloned().collect(),
            tips_shown: self.coach.tips_shown(),
            bandit_updates: self.bandit.model().updates,
            rewards: self.rewards,
            persisted,
            started_at: self.started_at,
            ended_at: Utc::now(),
        };

        tracing::info!(
            session_id = %summary.session_id,
            ticks = summary.ticks,
            tips = summary.tips_shown,
            bandit_updates = summary.bandit_updates,
            persisted,
            "adaptive session ended"
        );
        summary
    }
}
