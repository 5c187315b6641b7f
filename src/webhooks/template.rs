//! Request rendering for webhook deliveries.
//!
//! Header values and body strings may contain `{{path.to.field}}`
//! placeholders, resolved against [`Event::to_json`]. A string consisting of
//! a single placeholder is replaced by the raw JSON value.

use super::client::WebhookRequest;
use crate::events::Event;
use crate::store::{HttpMethod, Webhook};
use serde_json::Value;

/// Builds the HTTP request for delivering `event` to `webhook`.
///
/// A POST without a configured body sends the whole event document. GET
/// requests carry no body.
pub fn build_request(webhook: &Webhook, event: &Event) -> WebhookRequest {
    let context = event.to_json();

    let mut headers = Vec::new();
    if let Some(Value::Object(map)) = &webhook.headers {
        for (name, value) in map {
            let rendered = match value {
                Value::String(s) => interpolate(s, &context),
                other => display(other),
            };
            headers.push((name.clone(), rendered));
        }
    }

    let body = match webhook.method {
        HttpMethod::Get => None,
        HttpMethod::Post => {
            let value = match &webhook.body {
                Some(template) => render(template, &context),
                None => context,
            };
            Some(value.to_string())
        }
    };

    if body.is_some()
        && !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
    {
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }

    WebhookRequest {
        method: webhook.method,
        url: webhook.url.clone(),
        headers,
        body,
    }
}

/// Renders every string in `template` against `context`.
pub fn render(template: &Value, context: &Value) -> Value {
    match template {
        Value::String(s) => match sole_placeholder(s) {
            Some(path) => lookup(context, path).cloned().unwrap_or(Value::Null),
            None => Value::String(interpolate(s, context)),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Substitutes placeholders inside `s`. Missing paths render empty.
pub fn interpolate(s: &str, context: &Value) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                if let Some(value) = lookup(context, after[..end].trim()) {
                    out.push_str(&display(value));
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn sole_placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
