//! HTTP execution of spec tools.

use serde_json::Value;

use parley_domain::error::{Error, Result};
use parley_domain::tool::ApiSpec;

use crate::template::{build_url, render_body};

/// Execute one spec-tool call: build the request from the spec and
/// arguments, send it, and return the parsed JSON body.
///
/// Spec tools are not idempotent; this function never retries. A non-2xx
/// response fails with [`Error::Upstream`].
pub async fn dispatch_spec(
    client: &reqwest::Client,
    tool_name: &str,
    spec: &ApiSpec,
    arguments: &Value,
) -> Result<Value> {
    let method: reqwest::Method =
        spec.method
            .to_uppercase()
            .parse()
            .map_err(|_| Error::ToolMisconfigured {
                name: tool_name.to_owned(),
                reason: format!("invalid HTTP method '{}'", spec.method),
            })?;

    let url = build_url(spec, arguments)?;
    tracing::debug!(tool = tool_name, method = %method, url = %url, "dispatching spec tool");

    let mut request = client.request(method.clone(), url);
    for (key, value) in &spec.headers {
        request = request.header(key, value);
    }
    if method != reqwest::Method::GET {
        if let Some(template) = &spec.body_template {
            request = request.json(&render_body(template, arguments));
        }
    }

    let response = request.send().await.map_err(|e| Error::Upstream {
        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
        status_text: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Upstream {
            status: status.as_u16(),
            status_text: status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_owned(),
        });
    }

    response.json::<Value>().await.map_err(|e| Error::Upstream {
        status: status.as_u16(),
        status_text: format!("response body is not JSON: {e}"),
    })
}
