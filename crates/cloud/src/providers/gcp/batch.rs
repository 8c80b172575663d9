//! `multipart/mixed` encoding for Google JSON API batch requests.
//!
//! A batch body is a sequence of parts, each one an embedded HTTP request
//! (`Content-Type: application/http`). The response mirrors it: one part per
//! request, its `Content-ID` prefixed with `response-`.

use std::fmt::Write as _;

use serde_json::Value;

use crate::providers::traits::CloudProviderError;

/// One embedded request of a batch.
#[derive(Debug, Clone)]
pub struct BatchPart<'a> {
    /// Identifier echoed back in the matching response part.
    pub content_id: &'a str,
    /// HTTP method of the embedded request.
    pub method: &'a str,
    /// Path and query of the embedded request (e.g. `/storage/v1/b/b1`).
    pub path: String,
    /// JSON body.
    pub body: &'a Value,
}

/// One embedded response of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResponse {
    /// `Content-ID` of the request this part answers, without the
    /// `response-` prefix or angle brackets.
    pub content_id: Option<String>,
    /// Status code of the embedded response.
    pub status: u16,
    /// Body of the embedded response.
    pub body: String,
}

/// Serialize `parts` into a batch body delimited by `boundary`.
#[must_use]
pub fn encode(boundary: &str, parts: &[BatchPart<'_>]) -> String {
    let mut out = String::new();
    for part in parts {
        let body = part.body.to_string();
        let _ = write!(
            out,
            "--{boundary}\r\n\
             Content-Type: application/http\r\n\
             Content-Transfer-Encoding: binary\r\n\
             Content-ID: <{id}>\r\n\
             \r\n\
             {method} {path} HTTP/1.1\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\
             Content-Length: {len}\r\n\
             \r\n\
             {body}\r\n",
            id = part.content_id,
            method = part.method,
            path = part.path,
            len = body.len(),
        );
    }
    let _ = write!(out, "--{boundary}--\r\n");
    out
}

/// Extract the boundary parameter from a `multipart/mixed` content type.
fn boundary_of(content_type: &str) -> Option<&str> {
    content_type.split(';').map(str::trim).find_map(|param| {
        param
            .strip_prefix("boundary=")
            .map(|b| b.trim_matches('"'))
    })
}

/// Split a batch response into its parts.
///
/// # Errors
/// Returns [`CloudProviderError::Api`] when the content type carries no
/// boundary or a part has no status line.
pub fn decode(content_type: &str, body: &str) -> Result<Vec<PartResponse>, CloudProviderError> {
    let boundary = boundary_of(content_type).ok_or_else(|| CloudProviderError::Api {
        status: 502,
        message: format!("batch response without multipart boundary: {content_type}"),
    })?;
    let delimiter = format!("--{boundary}");

    let mut responses = Vec::new();
    for raw in body.split(delimiter.as_str()) {
        let raw = raw.trim_start_matches("\r\n").trim_start_matches('\n');
        if raw.trim().is_empty() || raw.starts_with("--") {
            continue;
        }
        responses.push(decode_part(raw)?);
    }
    Ok(responses)
}

fn decode_part(raw: &str) -> Result<PartResponse, CloudProviderError> {
    let mut content_id = None;
    let mut status = None;
    let mut lines = raw.lines();

    // Outer part headers, then the embedded status line.
    for line in lines.by_ref() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("HTTP/") {
            status = rest
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse::<u16>().ok());
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-id") {
                let id = value.trim().trim_start_matches('<').trim_end_matches('>');
                let id = id.strip_prefix("response-").unwrap_or(id);
                content_id = Some(id.to_string());
            }
        }
    }

    let status = status.ok_or_else(|| CloudProviderError::Api {
        status: 502,
        message: "batch response part without status line".to_string(),
    })?;

    // Embedded headers end at the first blank line; the rest is the body.
    for line in lines.by_ref() {
        if line.trim_end_matches('\r').is_empty() {
            break;
        }
    }
    let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();

    Ok(PartResponse {
        content_id,
        status,
        body,
    })
}
