//! `{key}` template substitution for spec-tool requests.
//!
//! Query parameters coerce the argument to a string (URLs are strings);
//! body templates substitute the argument verbatim so JSON types survive.

use serde_json::Value;

use parley_domain::error::{Error, Result};
use parley_domain::tool::ApiSpec;

/// If `value` is exactly `{key}`, return `key`.
pub fn placeholder_key(value: &str) -> Option<&str> {
    let inner = value.strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() {
        return None;
    }
    Some(inner)
}

/// Coerce a JSON argument to its query-string form. Strings drop their
/// quotes; everything else uses its compact JSON rendering.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the request URL: `base_url` + `path`, then the query parameters.
///
/// A parameter whose value is a `{key}` placeholder takes
/// `arguments[key]` (coerced to string) and is omitted when the argument
/// is absent. Literal values copy through unchanged.
pub fn build_url(spec: &ApiSpec, arguments: &Value) -> Result<reqwest::Url> {
    let joined = format!("{}{}", spec.base_url, spec.path);
    let mut url = reqwest::Url::parse(&joined).map_err(|e| Error::ToolMisconfigured {
        name: joined.clone(),
        reason: format!("invalid URL: {e}"),
    })?;

    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &spec.query_params {
            match placeholder_key(value) {
                Some(arg_key) => {
                    if let Some(arg) = arguments.get(arg_key) {
                        pairs.append_pair(key, &coerce_to_string(arg));
                    }
                }
                None => {
                    pairs.append_pair(key, value);
                }
            }
        }
    }
    // Dropping an empty `query_pairs_mut` serializer leaves a trailing
    // `?`; clear it so the URL is exactly `base_url + path`.
    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

/// Recursively render a body template against the call arguments.
///
/// Arrays map element-wise, objects map key-wise, and string leaves that
/// are exactly `{key}` are replaced by `arguments[key]` verbatim, so the
/// argument's JSON type is preserved, not stringified. All other leaves
/// pass through unchanged; a placeholder with no matching argument stays
/// literal.
pub fn render_body(template: &Value, arguments: &Value) -> Value {
    match template {
        Value::Array(items) => Value::Array(
            items.iter().map(|item| render_body(item, arguments)).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_body(v, arguments)))
                .collect(),
        ),
        Value::String(s) => match placeholder_key(s).and_then(|key| arguments.get(key)) {
            Some(arg) => arg.clone(),
            None => template.clone(),
        },
        other => other.clone(),
    }
}
