use serde_json::Value;

use crate::adaptive::types::TelemetrySample;

const T_KEYS: &[&str] = &["tSec", "t", "elapsedSec"];
const ACC_KEYS: &[&str] = &["accuracyPct", "accGoodPct", "acc", "accuracy"];
const MISS_KEYS: &[&str] = &["missCount", "misses", "miss"];
const HIT_KEYS: &[&str] = &["hitCount", "hits", "hitGood"];
const COMBO_KEYS: &[&str] = &["comboCount", "combo"];
const LEFT_KEYS: &[&str] = &["timeLeftSec", "leftSec", "left", "timeLeft"];
const HEALTH_KEYS: &[&str] = &["healthRatio", "hp"];
const REACTION_KEYS: &[&str] = &["reactionMs", "rtMs"];
const HAZARD_KEYS: &[&str] = &["hazardActive", "hazard", "storm", "stormOn"];
const URGENT_KEYS: &[&str] = &["urgent", "urgencyFlag", "miniUrg", "stormUrgent"];
const TAG_KEYS: &[&str] = &["contextTag", "tag", "groupKey"];

/// Builds a [`TelemetrySample`] from an arbitrary host snapshot. Never fails.
pub fn build(raw: &Value) -> TelemetrySample {
    let defaults = TelemetrySample::default();
    TelemetrySample {
        t_sec: number(raw, T_KEYS).unwrap_or(defaults.t_sec).max(0.0),
        accuracy_pct: number(raw, ACC_KEYS)
            .unwrap_or(defaults.accuracy_pct)
            .clamp(0.0, 100.0),
        miss_count: count(raw, MISS_KEYS),
        hit_count: count(raw, HIT_KEYS),
        combo_count: count(raw, COMBO_KEYS),
        time_left_sec: number(raw, LEFT_KEYS)
            .unwrap_or(defaults.time_left_sec)
            .max(0.0),
        health_ratio: number(raw, HEALTH_KEYS)
            .unwrap_or(defaults.health_ratio)
            .clamp(0.0, 1.0),
        reaction_ms: count(raw, REACTION_KEYS),
        hazard_active: flag(raw, HAZARD_KEYS),
        urgent: flag(raw, URGENT_KEYS),
        context_tag: text(raw, TAG_KEYS),
    }
}

fn lookup<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = raw.as_object()?;
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// Numeric coercion: numbers, numeric strings and booleans. Non-finite values are dropped.
fn number(raw: &Value, keys: &[&str]) -> Option<f64> {
    let value = lookup(raw, keys)?;
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn count(raw: &Value, keys: &[&str]) -> f64 {
    number(raw, keys).unwrap_or(0.0).max(0.0)
}

fn flag(raw: &Value, keys: &[&str]) -> bool {
    match lookup(raw, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0 && v.is_finite()),
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}

fn text(raw: &Value, keys: &[&str]) -> String {
    match lookup(raw, keys) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
