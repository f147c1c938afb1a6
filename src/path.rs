//! Dot-path lookup into response bodies.

use serde_json::Value;

/// Resolve a dot-separated `path` inside `value`.
///
/// Mapping segments are key lookups. On a sequence, a numeric segment
/// indexes it while any other segment descends into the first element and
/// is then applied to that element, so `items.id` reads the id of the first
/// item. Empty segments are ignored. `None` marks an unresolvable path.
pub fn resolve_path<'a>(path: &str, value: &'a Value) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }
        current = step(current, part)?;
    }

    Some(current)
}

fn step<'a>(current: &'a Value, part: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => {
            if is_index(part) {
                items.get(part.parse::<usize>().ok()?)
            } else {
                step(items.first()?, part)
            }
        }
        _ => None,
    }
}

fn is_index(part: &str) -> bool {
    part.bytes().all(|b| b.is_ascii_digit())
}
