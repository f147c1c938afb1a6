//! Placeholder substitution in request payloads.
//!
//! Three prefixes are recognised on string values:
//!
//! | prefix | source                                  |
//! |--------|-----------------------------------------|
//! | `##`   | config sheet attribute                  |
//! | `$#`   | body of the most recent response        |
//! | `$$`   | body of the response before that one    |
//!
//! The remainder of a `$#`/`$$` string is a dot path resolved with
//! [`resolve_path`]; a path that does not resolve binds `null`.

use crate::path::resolve_path;
use crate::table::ConfigTable;
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::LazyLock;
use tracing::debug;

pub const CONFIG_PREFIX: &str = "##";
pub const PREVIOUS_RESPONSE_PREFIX: &str = "$$";
pub const LATEST_RESPONSE_PREFIX: &str = "$#";

/// The two most recent response bodies of a running sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionWindow {
    most_recent: Value,
    second_most_recent: Value,
}

impl Default for ExecutionWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionWindow {
    pub fn new() -> Self {
        Self {
            most_recent: Value::Object(Default::default()),
            second_most_recent: Value::Object(Default::default()),
        }
    }

    pub fn most_recent(&self) -> &Value {
        &self.most_recent
    }

    pub fn second_most_recent(&self) -> &Value {
        &self.second_most_recent
    }

    /// Move the most recent body into the second slot. The most recent
    /// slot stays empty until [`ExecutionWindow::record`] is called.
    pub fn shift(&mut self) {
        self.second_most_recent = std::mem::replace(
            &mut self.most_recent,
            Value::Object(Default::default()),
        );
    }

    pub fn record(&mut self, body: Value) {
        self.most_recent = body;
    }
}

/// Resolves placeholders against a config table and an execution window.
#[derive(Debug, Clone, Copy)]
pub struct PayloadBinder<'a> {
    config: &'a ConfigTable,
}

impl<'a> PayloadBinder<'a> {
    pub fn new(config: &'a ConfigTable) -> Self {
        Self { config }
    }

    /// Bind every placeholder of `payload`.
    ///
    /// Config references are applied first, then `$#` against the most
    /// recent response, then `$$` against the one before it.
    pub fn bind(&self, payload: &Value, window: &ExecutionWindow) -> Value {
        let mut bound = payload.clone();
        bind_config(&mut bound, self.config);
        bind_response(&mut bound, LATEST_RESPONSE_PREFIX, window.most_recent());
        bind_response(
            &mut bound,
            PREVIOUS_RESPONSE_PREFIX,
            window.second_most_recent(),
        );
        bound
    }
}

/// Replace `##attribute` strings with coerced config values. Missing or
/// blank attributes leave the placeholder in place.
pub fn bind_config(payload: &mut Value, config: &ConfigTable) {
    rewrite_strings(payload, &mut |text| {
        let attribute = text.strip_prefix(CONFIG_PREFIX)?;
        let raw = config.lookup(attribute)?;
        let value = coerce_config_value(raw);
        debug!("bound config attribute '{}' = {}", attribute, value);
        Some(value)
    });
}

/// Replace strings starting with `prefix` by the value their path selects
/// in `response`, or `null` when the path does not resolve.
pub fn bind_response(payload: &mut Value, prefix: &str, response: &Value) {
    rewrite_strings(payload, &mut |text| {
        let path = text.strip_prefix(prefix)?;
        let value = resolve_path(path, response).cloned();
        if value.is_none() {
            debug!("path '{}' not found in response, binding null", path);
        }
        Some(value.unwrap_or(Value::Null))
    });
}

/// Apply `replace` to string values of mappings, recursing into nested
/// mappings and into mapping elements of sequences. Other values are left
/// untouched.
fn rewrite_strings<F>(value: &mut Value, replace: &mut F)
where
    F: FnMut(&str) -> Option<Value>,
{
    match value {
        Value::Object(map) => {
            for entry in map.values_mut() {
                let replacement = match entry {
                    Value::String(text) => replace(text),
                    Value::Object(_) | Value::Array(_) => {
                        rewrite_strings(entry, replace);
                        None
                    }
                    _ => None,
                };
                if let Some(new_value) = replacement {
                    *entry = new_value;
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut().filter(|item| item.is_object()) {
                rewrite_strings(item, replace);
            }
        }
        _ => {}
    }
}

/// Coerce a raw config cell: `int[N]` gives the integer N, `num[N]` and
/// `str[N]` the string "N", `true`/`false` (any case) a boolean. Anything
/// else passes through.
pub fn coerce_config_value(raw: &Value) -> Value {
    static TYPED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(int|num|str)\[(\d+)\]")
            .expect("failed to compile config coercion regex")
    });

    let text = match raw {
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => raw.to_string(),
        _ => return raw.clone(),
    };

    if let Some(caps) = TYPED_RE.captures(&text) {
        let digits = &caps[2];
        return if &caps[1] == "int" {
            digits
                .parse::<u64>()
                .map(|n| Value::Number(Number::from(n)))
                .unwrap_or_else(|_| Value::String(digits.to_string()))
        } else {
            Value::String(digits.to_string())
        };
    }

    match text.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw.clone(),
    }
}
