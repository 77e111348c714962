//! Bandit model persistence: dimension checks, file-backed storage across
//! sessions, and graceful degradation when the store fails.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hha_adaptive::adaptive::config::AdaptiveConfig;
use hha_adaptive::adaptive::decision::BanditModel;
use hha_adaptive::adaptive::engine::AdaptiveSession;
use hha_adaptive::adaptive::persistence::{
    load_model, model_key, save_model, FileStore, KeyValueStore, LoadOutcome, MemoryStore,
    StoreError,
};
use hha_adaptive::adaptive::types::{
    Diagnostic, FeatureKind, PolicyContext, RunMode, TelemetrySample,
};

/// Reads always fail; counts attempted writes.
#[derive(Default)]
struct BrokenStore {
    writes: AtomicUsize,
}

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    fn set_async(&self, _key: &str, _value: String) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_available(&self) -> bool {
        false
    }
}

fn assert_models_close(a: &BanditModel, b: &BanditModel) {
    assert_eq!(a.dim, b.dim);
    assert_eq!(a.updates, b.updates);
    let wa = a.weights.iter().flatten().chain(a.bias.iter());
    let wb = b.weights.iter().flatten().chain(b.bias.iter());
    for (x, y) in wa.zip(wb) {
        assert!((x - y).abs() < 1e-12, "{x} != {y}");
    }
}

fn improving_ticks(session: &mut AdaptiveSession, count: u32) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for t in 1..=count {
        let out = session.tick_sample(TelemetrySample {
            t_sec: f64::from(t),
            accuracy_pct: 40.0 + f64::from(t),
            miss_count: 2.0,
            combo_count: f64::from(t),
            time_left_sec: 80.0,
            ..Default::default()
        });
        diagnostics.extend(out.diagnostics);
    }
    diagnostics
}

fn eight_feature_config() -> AdaptiveConfig {
    let mut config = AdaptiveConfig::default();
    config.bandit.features = FeatureKind::DEFAULT_SET.to_vec();
    config.bandit.features.extend([FeatureKind::Fatigue, FeatureKind::SkillGap]);
    config
}

#[test]
fn six_dim_model_is_discarded_for_eight_dim_config() {
    let store = Arc::new(MemoryStore::new());
    let mut stale = BanditModel::zeros(6);
    stale.bias[1] = 2.5;
    save_model(store.as_ref(), "kid", &stale).unwrap();

    assert!(matches!(load_model(store.as_ref(), "kid", 8), LoadOutcome::Discarded(_)));

    let kv: Arc<dyn KeyValueStore> = store.clone();
    let mut session = AdaptiveSession::attach(
        PolicyContext::new(RunMode::Play, 1),
        eight_feature_config(),
        Some(kv),
        "kid",
    );
    assert_eq!(session.bandit().model(), &BanditModel::zeros(8));

    let first = session.tick_sample(TelemetrySample {
        t_sec: 1.0,
        ..Default::default()
    });
    assert!(first
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::ModelDiscarded { .. })));
    assert_eq!(first.pattern.map(|p| p.features.dim()), Some(8));
}

#[test]
fn model_carries_over_between_sessions() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let context = PolicyContext::new(RunMode::Play, 4);

    let mut first =
        AdaptiveSession::attach(context.clone(), AdaptiveConfig::default(), Some(store.clone()), "p");
    improving_ticks(&mut first, 20);
    let learned = first.bandit().model().clone();
    assert!(learned.updates > 0);
    assert!(first.end().persisted);

    let second = AdaptiveSession::attach(context, AdaptiveConfig::default(), Some(store), "p");
    assert_models_close(second.bandit().model(), &learned);
}

#[test]
fn file_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();

    let mut model = BanditModel::zeros(6);
    model.weights[3] = vec![0.1, -0.2, 0.3, -0.4, 0.5, -0.6];
    model.updates = 9;
    {
        let store = FileStore::open(dir.path()).unwrap();
        save_model(&store, "kid", &model).unwrap();
        store.flush();
        assert!(dir
            .path()
            .join(format!("{}.json", model_key("kid")))
            .exists());
    }

    let reopened = FileStore::open(dir.path()).unwrap();
    match load_model(&reopened, "kid", 6) {
        LoadOutcome::Loaded(loaded) => assert_models_close(&loaded, &model),
        other => panic!("expected loaded model, got {other:?}"),
    }
    assert_eq!(load_model(&reopened, "other", 6), LoadOutcome::Missing);
}

#[test]
fn file_store_keeps_last_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    for i in 0..20 {
        store.set_async("k", format!("v{i}"));
    }
    store.flush();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v19"));
}

#[test]
fn failing_store_degrades_to_memory() {
    let broken = Arc::new(BrokenStore::default());
    let kv: Arc<dyn KeyValueStore> = broken.clone();
    let mut session = AdaptiveSession::attach(
        PolicyContext::new(RunMode::Play, 8),
        AdaptiveConfig::default(),
        Some(kv),
        "kid",
    );
    assert!(!session.is_persistent());

    let diagnostics = improving_ticks(&mut session, 20);
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::StoreUnavailable { .. })));
    assert!(session.bandit().model().updates > 0);

    let summary = session.end();
    assert!(!summary.persisted);
    assert_eq!(broken.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn corrupt_record_starts_fresh() {
    let store = Arc::new(MemoryStore::new());
    store.set_async(
        &model_key("kid"),
        r#"{"schemaVersion":1,"D":6,"weights":{"NORMAL":[1e999]},"bias":{}}"#.to_string(),
    );
    let kv: Arc<dyn KeyValueStore> = store;
    let session = AdaptiveSession::attach(
        PolicyContext::new(RunMode::Play, 8),
        AdaptiveConfig::default(),
        Some(kv),
        "kid",
    );
    assert_eq!(session.bandit().model(), &BanditModel::zeros(6));
}

#[test]
fn file_store_write_failure_disables_store() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("profiles");
    let store = Arc::new(FileStore::open(&dir).unwrap());
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let mut session = AdaptiveSession::attach(
        PolicyContext::new(RunMode::Play, 8),
        AdaptiveConfig::default(),
        Some(kv),
        "kid",
    );
    assert!(session.is_persistent());
    std::fs::remove_dir_all(&dir).unwrap();

    let mut diagnostics = Vec::new();
    for t in 1..=14 {
        let out = session.tick_sample(TelemetrySample {
            t_sec: f64::from(t),
            accuracy_pct: 40.0 + f64::from(t),
            miss_count: 2.0,
            combo_count: f64::from(t),
            time_left_sec: 80.0,
            ..Default::default()
        });
        diagnostics.extend(out.diagnostics);
        if t == 7 {
            // The first reward queued a write into the missing directory.
            store.flush();
            assert!(!store.is_available());
        }
    }

    assert!(!session.is_persistent());
    assert_eq!(
        diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::StoreUnavailable { .. }))
            .count(),
        1
    );
    assert!(store.get(&model_key("kid")).is_err());
    assert!(!session.end().persisted);
}
