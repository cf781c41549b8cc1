use engine_core::{Tier, ToolName};
use serde_json::Value;

/// Free-tier caps on signal list lengths.
fn signal_cap(tool: ToolName) -> Option<usize> {
    match tool {
        ToolName::AnalyzeSecurity => Some(3),
        ToolName::AnalyzeFibonacci => Some(10),
        _ => None,
    }
}

/// Shape a raw tool result for the requesting tier. Pro and max receive the
/// full payload; free gets capped signal lists. AI fields are stripped for
/// any tier without the AI entitlement, regardless of request flags.
pub fn shape_result(tool: ToolName, tier: Tier, mut value: Value, ai_allowed: bool) -> Value {
    if !ai_allowed {
        strip_ai_fields(&mut value);
    }

    if tier == Tier::Free {
        if let Some(cap) = signal_cap(tool) {
            truncate_signals(&mut value, cap);
        }
    }

    value
}

/// Copy of a result with the AI overlay removed. This is what the run store
/// persists: the deterministic baseline, never the overlay.
pub fn without_ai(mut value: Value) -> Value {
    strip_ai_fields(&mut value);
    value
}

/// Remove every object key starting with `ai_`, recursively.
fn strip_ai_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !key.starts_with("ai_"));
            for child in map.values_mut() {
                strip_ai_fields(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_ai_fields(item);
            }
        }
        _ => {}
    }
}

fn truncate_signals(value: &mut Value, cap: usize) {
    if let Some(signals) = value.get_mut("signals").and_then(Value::as_array_mut) {
        signals.truncate(cap);
    }
}
