//! Capture admission filter
//!
//! [`should_capture`] is a pure predicate over `(url, method, status)` and the
//! current [`CaptureConfig`]. The interceptor calls it twice per request: once
//! before dispatch with the status unknown, and once after the response
//! headers arrive.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use hyper::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{CaptureConfig, CaptureMode};
use crate::{Result, TapError};

/// Length of a chat session identifier
pub const CHAT_ID_LEN: usize = 36;

/// Decide whether a request should be captured
#[must_use]
pub fn should_capture(
    config: &CaptureConfig,
    url: &str,
    method: &str,
    status: Option<u16>,
) -> bool {
    if !config.is_recording {
        return false;
    }

    match config.capture_mode {
        CaptureMode::All => true,
        CaptureMode::ChatOnly => method.eq_ignore_ascii_case("POST") && is_chat_url(url),
        CaptureMode::Custom => config.filter.admits(url, method, status),
    }
}

/// Check whether a URL addresses a chat session resource
///
/// Matches `/chat/` followed by a 36 character identifier of lowercase hex
/// digits and hyphens, ending the path segment.
#[must_use]
pub fn is_chat_url(url: &str) -> bool {
    static CHAT_PATTERN: OnceLock<Regex> = OnceLock::new();
    CHAT_PATTERN
        .get_or_init(|| {
            Regex::new(&format!(r"/chat/[0-9a-f-]{{{CHAT_ID_LEN}}}(?:[/?#]|$)"))
                .expect("chat pattern is a valid regex")
        })
        .is_match(url)
}

/// Path entry of the custom filter
///
/// Matches when the URL contains the raw text, or when the text compiles as a
/// regular expression that matches the URL.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PathPattern {
    raw: String,
    regex: Option<Regex>,
}

impl PathPattern {
    /// Create a pattern from its textual form
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let regex = Regex::new(&raw).ok();
        Self { raw, regex }
    }

    /// Raw text of the pattern
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern could also be used as a regular expression
    #[must_use]
    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Check the pattern against a URL
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        url.contains(&self.raw) || self.regex.as_ref().is_some_and(|re| re.is_match(url))
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.raw).finish()
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PathPattern {}

impl From<String> for PathPattern {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for PathPattern {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.raw
    }
}

/// Custom-mode filter; an empty axis is unconstrained
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// URL substrings or regular expressions, OR-matched
    #[serde(default)]
    pub paths: Vec<PathPattern>,
    /// Admitted methods
    #[serde(default)]
    pub methods: BTreeSet<String>,
    /// Admitted response statuses
    #[serde(default, alias = "status_codes")]
    pub status_codes: BTreeSet<u16>,
}

impl FilterSpec {
    /// Evaluate all three axes
    #[must_use]
    pub fn admits(&self, url: &str, method: &str, status: Option<u16>) -> bool {
        self.path_passes(url) && self.method_passes(method) && self.status_passes(status)
    }

    fn path_passes(&self, url: &str) -> bool {
        self.paths.is_empty() || self.paths.iter().any(|p| p.matches(url))
    }

    fn method_passes(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    fn status_passes(&self, status: Option<u16>) -> bool {
        match status {
            None => true,
            Some(code) => self.status_codes.is_empty() || self.status_codes.contains(&code),
        }
    }

    /// Validate every axis
    ///
    /// # Errors
    ///
    /// Returns error on an empty path, an invalid method token or a status
    /// code outside 100..=999
    pub fn validate(&self) -> Result<()> {
        validate_paths(self.paths.iter().map(PathPattern::as_str))?;
        validate_methods(self.methods.iter().map(String::as_str))?;
        validate_status_codes(self.status_codes.iter().copied())
    }

    /// Merge a partial update; axes absent from the update are left unchanged
    ///
    /// # Errors
    ///
    /// Returns error if any supplied axis is invalid, in which case `self` is
    /// not modified
    pub fn merge(&mut self, update: FilterUpdate) -> Result<()> {
        update.validate()?;

        if let Some(paths) = update.paths {
            let mut merged: Vec<PathPattern> = Vec::with_capacity(paths.len());
            for path in paths {
                let pattern = PathPattern::new(path);
                if !merged.contains(&pattern) {
                    merged.push(pattern);
                }
            }
            self.paths = merged;
        }
        if let Some(methods) = update.methods {
            self.methods = methods.into_iter().collect();
        }
        if let Some(status_codes) = update.status_codes {
            self.status_codes = status_codes.into_iter().collect();
        }

        Ok(())
    }
}

/// Partial filter update; `None` leaves the axis as it is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterUpdate {
    /// Replacement path list
    #[serde(default)]
    pub paths: Option<Vec<String>>,
    /// Replacement method set
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    /// Replacement status set
    #[serde(default, alias = "status_codes")]
    pub status_codes: Option<Vec<u16>>,
}

impl FilterUpdate {
    /// Create an empty update
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the path list
    #[must_use]
    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the method set
    #[must_use]
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the status set
    #[must_use]
    pub fn status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = Some(codes.into_iter().collect());
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(paths) = &self.paths {
            validate_paths(paths.iter().map(String::as_str))?;
        }
        if let Some(methods) = &self.methods {
            validate_methods(methods.iter().map(String::as_str))?;
        }
        if let Some(codes) = &self.status_codes {
            validate_status_codes(codes.iter().copied())?;
        }
        Ok(())
    }
}

fn validate_paths<'a>(paths: impl Iterator<Item = &'a str>) -> Result<()> {
    for path in paths {
        if path.is_empty() {
            return Err(TapError::InvalidConfig(
                "Filter path cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_methods<'a>(methods: impl Iterator<Item = &'a str>) -> Result<()> {
    for method in methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            return Err(TapError::InvalidConfig(format!(
                "Invalid HTTP method in filter: '{method}'"
            )));
        }
    }
    Ok(())
}

fn validate_status_codes(codes: impl Iterator<Item = u16>) -> Result<()> {
    for code in codes {
        if !(100..=999).contains(&code) {
            return Err(TapError::InvalidConfig(format!(
                "Invalid status code in filter: {code}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT_URL: &str = "https://example.ai/chat/3fa85f64-5717-4562-b3fc-2c963f66afa6";

    fn config(mode: CaptureMode) -> CaptureConfig {
        CaptureConfig {
            capture_mode: mode,
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn test_not_recording_rejects_everything() {
        let mut cfg = config(CaptureMode::All);
        cfg.is_recording = false;
        assert!(!should_capture(&cfg, "https://a.test/", "GET", None));
        assert!(!should_capture(&cfg, CHAT_URL, "POST", Some(200)));
    }

    #[test]
    fn test_all_mode_admits_everything() {
        let cfg = config(CaptureMode::All);
        assert!(should_capture(&cfg, "https://a.test/x", "GET", None));
        assert!(should_capture(&cfg, "https://a.test/x", "DELETE", Some(500)));
    }

    #[test]
    fn test_chat_only_requires_post_and_chat_url() {
        let cfg = config(CaptureMode::ChatOnly);
        assert!(should_capture(&cfg, CHAT_URL, "POST", None));
        assert!(!should_capture(&cfg, CHAT_URL, "GET", None));
        assert!(!should_capture(&cfg, "https://example.ai/api/models", "POST", None));
    }

    #[test]
    fn test_chat_only_ignores_filter() {
        let mut cfg = config(CaptureMode::ChatOnly);
        cfg.filter.methods.insert("GET".to_string());
        cfg.filter.status_codes.insert(404);
        assert!(should_capture(&cfg, CHAT_URL, "POST", Some(200)));
    }

    #[test]
    fn test_chat_url_shape() {
        assert!(is_chat_url(CHAT_URL));
        assert!(is_chat_url(&format!("{CHAT_URL}?stream=true")));
        assert!(is_chat_url(&format!("{CHAT_URL}/messages")));
        assert!(!is_chat_url("https://example.ai/chat/"));
        assert!(!is_chat_url("https://example.ai/chat/3FA85F64-5717-4562-B3FC-2C963F66AFA6"));
        assert!(!is_chat_url(&format!("{CHAT_URL}0")));
    }

    #[test]
    fn test_custom_method_filter() {
        let mut cfg = config(CaptureMode::Custom);
        cfg.filter.methods.insert("POST".to_string());
        assert!(should_capture(&cfg, "https://a.test/any", "POST", None));
        assert!(should_capture(&cfg, "https://a.test/any", "post", None));
        assert!(!should_capture(&cfg, "https://a.test/any", "GET", None));
        assert!(!should_capture(&cfg, CHAT_URL, "GET", None));
    }

    #[test]
    fn test_custom_path_substring_and_regex() {
        let mut cfg = config(CaptureMode::Custom);
        cfg.filter.paths = vec![PathPattern::new("/api/v2"), PathPattern::new(r"/users/\d+$")];
        assert!(should_capture(&cfg, "https://a.test/api/v2/items", "GET", None));
        assert!(should_capture(&cfg, "https://a.test/users/42", "GET", None));
        assert!(!should_capture(&cfg, "https://a.test/users/abc", "GET", None));
    }

    #[test]
    fn test_invalid_regex_still_matches_as_substring() {
        let pattern = PathPattern::new("/weird[");
        assert!(!pattern.is_regex());
        assert!(pattern.matches("https://a.test/weird[1]"));
        assert!(!pattern.matches("https://a.test/weird"));
    }

    #[test]
    fn test_custom_status_axis() {
        let mut cfg = config(CaptureMode::Custom);
        cfg.filter.status_codes.insert(200);
        assert!(should_capture(&cfg, "https://a.test/", "GET", None));
        assert!(should_capture(&cfg, "https://a.test/", "GET", Some(200)));
        assert!(!should_capture(&cfg, "https://a.test/", "GET", Some(404)));
    }

    #[test]
    fn test_merge_leaves_unspecified_axes() {
        let mut spec = FilterSpec::default();
        spec.merge(FilterUpdate::new().methods(["POST"]).status_codes([200]))
            .unwrap();
        spec.merge(FilterUpdate::new().paths(["/api", "/api"])).unwrap();

        assert_eq!(spec.paths, vec![PathPattern::new("/api")]);
        assert!(spec.methods.contains("POST"));
        assert!(spec.status_codes.contains(&200));
    }

    #[test]
    fn test_merge_rejects_invalid_and_keeps_state() {
        let mut spec = FilterSpec::default();
        spec.merge(FilterUpdate::new().methods(["GET"])).unwrap();

        let before = spec.clone();
        assert!(spec.merge(FilterUpdate::new().methods(["BAD METHOD"])).is_err());
        assert!(spec.merge(FilterUpdate::new().status_codes([42])).is_err());
        assert!(spec.merge(FilterUpdate::new().paths([""])).is_err());
        assert_eq!(spec, before);
    }

    #[test]
    fn test_should_capture_is_deterministic() {
        let mut cfg = config(CaptureMode::Custom);
        cfg.filter.paths = vec![PathPattern::new("/api")];
        let first = should_capture(&cfg, "https://a.test/api/x", "GET", Some(200));
        for _ in 0..10 {
            assert_eq!(
                should_capture(&cfg, "https://a.test/api/x", "GET", Some(200)),
                first
            );
        }
    }

    #[test]
    fn test_path_pattern_serde() {
        let spec: FilterSpec =
            serde_json::from_str(r#"{"paths":["/api"],"methods":["GET"],"statusCodes":[204]}"#)
                .unwrap();
        assert_eq!(spec.paths[0].as_str(), "/api");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["paths"][0], "/api");
        assert_eq!(json["statusCodes"][0], 204);
    }
}
