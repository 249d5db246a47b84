// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! `{{marker}}` substitution.
//!
//! Markers are resolved against a value map first. Whatever is left is tried
//! as an expression (`{{base64(user)}}`), and anything still unresolved is
//! reported so the caller can skip the variation.

use serde_json::Value;

use crate::engine::input::ScanTarget;
use crate::operators::dsl;
use crate::output::{value_as_string, InternalEvent};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Byte ranges and inner text of every `{{...}}` marker, left to right.
fn markers(text: &str) -> Vec<(usize, usize, &str)> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(start) = text[offset..].find(OPEN) {
        let start = offset + start;
        let inner_start = start + OPEN.len();
        match text[inner_start..].find(CLOSE) {
            Some(len) => {
                let end = inner_start + len + CLOSE.len();
                found.push((start, end, &text[inner_start..inner_start + len]));
                offset = end;
            }
            None => break,
        }
    }
    found
}

/// Replaces each marker whose trimmed name is a key of `values`, then
/// evaluates the remaining markers as expressions over `values`.
pub fn replace(text: &str, values: &InternalEvent) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for (start, end, inner) in markers(text) {
        output.push_str(&text[last..start]);
        let name = inner.trim();
        let resolved = match values.get(name) {
            Some(value) => Some(value_as_string(value)),
            None => evaluate(name, values),
        };
        match resolved {
            Some(value) => output.push_str(&value),
            None => output.push_str(&text[start..end]),
        }
        last = end;
    }
    output.push_str(&text[last..]);
    output
}

fn evaluate(expression: &str, values: &InternalEvent) -> Option<String> {
    let compiled = dsl::compile(expression).ok()?;
    match compiled.evaluate(values).ok()? {
        Value::Null => None,
        value => Some(value_as_string(&value)),
    }
}

/// Names of markers still present in `text`.
pub fn unresolved(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (_, _, inner) in markers(text) {
        let name = inner.trim().to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

pub fn contains_marker(text: &str, name: &str) -> bool {
    markers(text).iter().any(|(_, _, inner)| inner.trim() == name)
}

/// Built-in variables derived from the target URL.
///
/// For `https://example.com:8443/app/login?x=1`:
/// `BaseURL` is the input as given, `RootURL` is `https://example.com:8443`,
/// `Hostname` is `example.com:8443`, `Host` is `example.com`, `Port` is
/// `8443`, `Path` is `/app/login` and `Scheme` is `https`.
pub fn url_variables(target: &ScanTarget) -> InternalEvent {
    let mut values = InternalEvent::new();
    let Some(url) = target.url() else {
        values.insert("BaseURL".to_string(), Value::String(target.to_string()));
        return values;
    };

    let host = url.host_str().unwrap_or_default().to_string();
    let port = url.port_or_known_default().unwrap_or_default();
    let hostname = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.clone(),
    };
    let root = format!("{}://{}", url.scheme(), hostname);
    let base = target.as_str().trim_end_matches('/');
    let base = if base.contains("://") {
        base.to_string()
    } else {
        format!("{}{}", root, url.path().trim_end_matches('/'))
    };

    values.insert("BaseURL".to_string(), Value::String(base));
    values.insert("RootURL".to_string(), Value::String(root));
    values.insert("Hostname".to_string(), Value::String(hostname));
    values.insert("Host".to_string(), Value::String(host));
    values.insert("Port".to_string(), Value::String(port.to_string()));
    values.insert("Path".to_string(), Value::String(url.path().to_string()));
    values.insert("Scheme".to_string(), Value::String(url.scheme().to_string()));
    values
}
