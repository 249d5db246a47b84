// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Parsing of raw HTTP request text written directly in templates.

#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Parses `METHOD PATH [VERSION]`, header lines, a blank line and a body.
///
/// `Content-Length` is dropped; the transport computes it from the body.
pub fn parse(text: &str) -> Result<RawRequest, String> {
    let normalized = text.replace("\r\n", "\n");
    let normalized = normalized.trim_start();
    let (head, body) = match normalized.split_once("\n\n") {
        Some((head, body)) => (head, body.to_string()),
        None => (normalized.trim_end(), String::new()),
    };

    let mut lines = head.lines();
    let request_line = lines.next().ok_or("empty raw request")?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or("missing method")?.to_string();
    let path = parts
        .next()
        .ok_or_else(|| format!("missing path in request line '{}'", request_line))?
        .to_string();

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| format!("malformed header line '{}'", line))?;
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    Ok(RawRequest {
        method,
        path,
        headers,
        body,
    })
}
