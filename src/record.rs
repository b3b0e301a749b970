//! Capture records
//!
//! A [`CaptureRecord`] is built by the interceptor, filled in by the stream
//! capture task, and frozen once it reaches the store.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use hyper::header::{HeaderMap, COOKIE};
use hyper::Uri;
use serde::Serialize;
use serde_json::Value;

use crate::config::CaptureMode;
use crate::network::{header_map_to_map, RequestBody, RequestHeaders};

/// Monotonic millisecond clock shared by all records of one recorder
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Start a clock at zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds since the clock started
    #[must_use]
    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic timing samples in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// When the call entered the interceptor
    pub start_time: f64,
    /// When the underlying call resolved or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    /// When the body stream ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// `response_time - start_time`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// `end_time - start_time`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
}

/// Snapshot of the outgoing request body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Text body that parsed as JSON
    Json(Value),
    /// Any other text body
    Text(String),
    /// Form fields
    Form(BTreeMap<String, String>),
    /// Opaque binary body, recorded by size only
    Binary {
        /// Length in bytes
        size: usize,
    },
}

impl Payload {
    /// Snapshot a request body
    #[must_use]
    pub fn from_body(body: &RequestBody) -> Self {
        match body {
            RequestBody::Text(text) => serde_json::from_str(text)
                .map_or_else(|_| Payload::Text(text.clone()), Payload::Json),
            RequestBody::Form(fields) => Payload::Form(fields.iter().cloned().collect()),
            RequestBody::Binary(bytes) => Payload::Binary { size: bytes.len() },
        }
    }
}

/// One observed request/response cycle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    /// Unique id, `req_<n>`
    pub request_id: String,
    /// Wall-clock creation instant
    pub timestamp: DateTime<Utc>,
    /// Full request URL
    pub request_url: String,
    /// Upper-cased request method
    pub request_method: String,
    /// URL path, or the whole URL when it cannot be parsed
    pub request_path: String,
    /// Decoded query parameters
    pub request_params: BTreeMap<String, String>,
    /// Raw `?query`, empty when absent
    pub request_search: String,
    /// Raw `#fragment`, empty when absent
    pub request_hash: String,
    /// Outgoing headers
    pub request_headers: BTreeMap<String, String>,
    /// Outgoing body snapshot
    pub request_payload: Option<Payload>,
    /// Cookies sent with the request
    pub request_cookies: BTreeMap<String, String>,
    /// Response status, unset until the response arrives
    pub response_status: Option<u16>,
    /// Response headers
    pub response_headers: BTreeMap<String, String>,
    response_chunks: Vec<String>,
    full_response: String,
    /// Timing samples
    pub timing: Timing,
    error: Option<String>,
    /// Mode in effect when the record was created
    pub capture_mode: CaptureMode,
}

impl CaptureRecord {
    /// Build the scaffold for an admitted request
    #[must_use]
    pub fn new(
        request_id: String,
        url: &str,
        method: &str,
        capture_mode: CaptureMode,
        start_time: f64,
    ) -> Self {
        let parts = UrlParts::parse(url);
        Self {
            request_id,
            timestamp: Utc::now(),
            request_url: url.to_string(),
            request_method: method.to_ascii_uppercase(),
            request_path: parts.path,
            request_params: parts.params,
            request_search: parts.search,
            request_hash: parts.hash,
            request_headers: BTreeMap::new(),
            request_payload: None,
            request_cookies: BTreeMap::new(),
            response_status: None,
            response_headers: BTreeMap::new(),
            response_chunks: Vec::new(),
            full_response: String::new(),
            timing: Timing {
                start_time,
                ..Timing::default()
            },
            error: None,
            capture_mode,
        }
    }

    /// Snapshot outgoing headers and the cookies they carry
    #[must_use]
    pub fn with_request_headers(mut self, headers: &RequestHeaders) -> Self {
        self.request_headers = headers.to_map();
        if let Some(cookie) = headers.get(COOKIE.as_str()) {
            self.request_cookies = parse_cookies(&cookie);
        }
        self
    }

    /// Snapshot the outgoing body
    #[must_use]
    pub fn with_payload(mut self, body: &RequestBody) -> Self {
        self.request_payload = Some(Payload::from_body(body));
        self
    }

    /// Record response metadata
    pub fn set_response(&mut self, status: u16, headers: &HeaderMap, response_time: f64) {
        self.response_status = Some(status);
        self.response_headers = header_map_to_map(headers);
        self.timing.response_time = Some(response_time);
        self.timing.duration = Some(response_time - self.timing.start_time);
    }

    /// Append a decoded fragment
    ///
    /// `full_response` is extended in the same step, so it always equals the
    /// concatenation of `response_chunks`.
    pub fn push_chunk(&mut self, chunk: String) {
        self.full_response.push_str(&chunk);
        self.response_chunks.push(chunk);
    }

    /// Record end of stream
    pub fn finish(&mut self, end_time: f64) {
        self.timing.end_time = Some(end_time);
        self.timing.total_duration = Some(end_time - self.timing.start_time);
    }

    /// Record a failed call; only the call latency is known
    pub fn fail_call(&mut self, message: impl Into<String>, failed_at: f64) {
        self.timing.duration = Some(failed_at - self.timing.start_time);
        self.fail(message);
    }

    /// Set the error, returning false if one was already set
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.error = Some(message.into());
        true
    }

    /// Failure description, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Decoded fragments in arrival order
    #[must_use]
    pub fn response_chunks(&self) -> &[String] {
        &self.response_chunks
    }

    /// Concatenation of all fragments
    #[must_use]
    pub fn full_response(&self) -> &str {
        &self.full_response
    }
}

#[derive(Debug, Default, PartialEq)]
struct UrlParts {
    path: String,
    params: BTreeMap<String, String>,
    search: String,
    hash: String,
}

impl UrlParts {
    fn parse(url: &str) -> Self {
        let (rest, fragment) = match url.split_once('#') {
            Some((rest, fragment)) => (rest, fragment),
            None => (url, ""),
        };

        let Ok(uri) = rest.parse::<Uri>() else {
            return Self {
                path: url.to_string(),
                ..Self::default()
            };
        };

        let query = uri.query().unwrap_or_default();
        Self {
            path: uri.path().to_string(),
            params: parse_query(query),
            search: if query.is_empty() {
                String::new()
            } else {
                format!("?{query}")
            },
            hash: if fragment.is_empty() {
                String::new()
            } else {
                format!("#{fragment}")
            },
        }
    }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).map_or(spaced.clone(), |decoded| decoded.into_owned())
}

/// Parse a `cookie` header into a name to value mapping
#[must_use]
pub fn parse_cookies(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .filter_map(|cookie| {
            let cookie = cookie.trim();
            let (key, value) = cookie.split_once('=').unwrap_or((cookie, ""));
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}
