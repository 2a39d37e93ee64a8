//! Rendering of the value templates this crate emits.
//!
//! The hub is what ultimately evaluates a `value_template` against our state
//! payloads; this module renders the same templates locally so the crate (and
//! its tests) can verify what the hub will extract.
//!
//! Context variables:
//!   value      — raw payload string
//!   value_json — parsed JSON from the payload

use minijinja::{Environment, Value};
use std::sync::OnceLock;

use chrono::{TimeZone, Utc};

/// Shared template environment (filters registered once).
static ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn env() -> &'static Environment<'static> {
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.add_filter("int", filter_int);
        env.add_filter("float", filter_float);
        env.add_filter("round", filter_round);
        env.add_filter("default", filter_default);
        env.add_function("as_datetime", fn_as_datetime);
        env
    })
}

/// Render a template string with the given context variables.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String, String> {
    let tmpl = env()
        .template_from_str(template)
        .map_err(|e| format!("template parse error: {}", e))?;

    let context = match (&ctx.value, &ctx.value_json) {
        (Some(v), Some(vj)) => minijinja::context! { value => v, value_json => vj },
        (Some(v), None) => minijinja::context! { value => v },
        (None, Some(vj)) => minijinja::context! { value_json => vj },
        (None, None) => minijinja::context! {},
    };

    tmpl.render(context)
        .map_err(|e| format!("template render error: {}", e))
}

/// Context variables for template rendering.
#[derive(Default)]
pub struct TemplateContext {
    /// Raw payload string
    pub value: Option<String>,
    /// Parsed JSON from the payload
    pub value_json: Option<Value>,
}

impl TemplateContext {
    /// Build context from a published payload.
    pub fn from_payload(payload: &str) -> Self {
        let value_json = serde_json::from_str::<serde_json::Value>(payload)
            .ok()
            .map(|v| json_to_template(&v));

        Self {
            value: Some(payload.to_string()),
            value_json,
        }
    }
}

/// Convert serde_json::Value to minijinja::Value
fn json_to_template(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::from(()),
        serde_json::Value::Bool(b) => Value::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(f) = n.as_f64() {
                Value::from(f)
            } else {
                Value::from(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(arr) => {
            Value::from(arr.iter().map(json_to_template).collect::<Vec<_>>())
        }
        serde_json::Value::Object(map) => Value::from(
            map.iter()
                .map(|(k, v)| (k.as_str(), json_to_template(v)))
                .collect::<std::collections::BTreeMap<&str, Value>>(),
        ),
    }
}

// ── Filters & functions ─────────────────────────────────

fn filter_int(value: Value) -> Value {
    if let Some(s) = value.as_str() {
        Value::from(s.parse::<i64>().unwrap_or(0))
    } else if let Some(f) = as_f64(&value) {
        Value::from(f as i64)
    } else {
        Value::from(0i64)
    }
}

fn filter_float(value: Value) -> Value {
    if let Some(s) = value.as_str() {
        Value::from(s.parse::<f64>().unwrap_or(0.0))
    } else if let Some(f) = as_f64(&value) {
        Value::from(f)
    } else {
        Value::from(0.0f64)
    }
}

fn filter_round(value: Value, precision: Option<Value>) -> Value {
    let p = precision.and_then(|v| as_f64(&v)).unwrap_or(0.0) as i32;
    if let Some(f) = as_f64(&value) {
        let factor = 10f64.powi(p);
        Value::from((f * factor).round() / factor)
    } else {
        value
    }
}

fn filter_default(value: Value, default: Option<Value>) -> Value {
    if value.is_undefined() || value.is_none() {
        default.unwrap_or_else(|| Value::from(""))
    } else {
        value
    }
}

/// Epoch seconds (int, float, or numeric string) to an RFC 3339 timestamp.
fn fn_as_datetime(value: Value) -> Value {
    let Some(epoch) = as_f64(&value) else {
        return value;
    };
    let secs = epoch.trunc() as i64;
    let nanos = (epoch.fract() * 1e9) as u32;
    match Utc.timestamp_opt(secs, nanos).single() {
        Some(dt) => Value::from(dt.to_rfc3339()),
        None => value,
    }
}

/// Helper: extract f64 from a minijinja Value
fn as_f64(v: &Value) -> Option<f64> {
    if let Ok(i) = i64::try_from(v.clone()) {
        Some(i as f64)
    } else if let Ok(f) = f64::try_from(v.clone()) {
        Some(f)
    } else if let Some(s) = v.as_str() {
        s.parse::<f64>().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value() {
        let ctx = TemplateContext::from_payload("42.5");
        assert_eq!(render("{{ value }}", &ctx).unwrap(), "42.5");
    }

    #[test]
    fn test_value_json_slot() {
        let ctx = TemplateContext::from_payload(r#"{"temperature": 21.5}"#);
        let result = render("{{ value_json.temperature }}", &ctx).unwrap();
        assert_eq!(result, "21.5");
    }

    #[test]
    fn test_round_filter() {
        let ctx = TemplateContext::from_payload(r#"{"temp": 21.456}"#);
        let result = render("{{ value_json.temp | round(1) }}", &ctx).unwrap();
        assert_eq!(result, "21.5");
    }

    #[test]
    fn test_default_filter() {
        let ctx = TemplateContext {
            value: None,
            value_json: None,
        };
        let result = render("{{ missing | default('N/A') }}", &ctx).unwrap();
        assert_eq!(result, "N/A");
    }

    #[test]
    fn test_as_datetime_from_epoch() {
        let ctx = TemplateContext::from_payload(r#"{"boot": 1700000000}"#);
        let result = render("{{ as_datetime(value_json.boot) }}", &ctx).unwrap();
        assert!(result.starts_with("2023-11-14T22:13:20"), "{result}");
    }

    #[test]
    fn test_as_datetime_passes_non_numbers_through() {
        let ctx = TemplateContext::from_payload(r#"{"boot": "soon"}"#);
        let result = render("{{ as_datetime(value_json.boot) }}", &ctx).unwrap();
        assert_eq!(result, "soon");
    }
}
