//! Network entry point abstraction
//!
//! Every outgoing request goes through a [`Fetch`] implementation. The
//! [`EntryPoint`] holds whichever implementation is currently installed; the
//! recorder decorates the original one with its interceptor.

mod body;
mod client;
mod entry;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::Uri;

pub use body::{Body, StreamError};
pub use client::HyperFetch;
pub use entry::{EntryPoint, OwnerToken};

/// Error produced by a network entry point, passed through the interceptor untouched
pub type FetchError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Future returned by [`Fetch::fetch`]
pub type FetchFuture =
    Pin<Box<dyn Future<Output = std::result::Result<FetchResponse, FetchError>> + Send>>;

/// Default method when neither the options nor the resource carry one
pub const DEFAULT_METHOD: &str = "GET";

/// A callable network entry point
pub trait Fetch: Send + Sync + 'static {
    /// Issue a request
    fn fetch(&self, resource: Resource, options: FetchOptions) -> FetchFuture;
}

impl<F, Fut> Fetch for F
where
    F: Fn(Resource, FetchOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<FetchResponse, FetchError>> + Send + 'static,
{
    fn fetch(&self, resource: Resource, options: FetchOptions) -> FetchFuture {
        Box::pin(self(resource, options))
    }
}

/// Target of a fetch call
#[derive(Debug, Clone)]
pub enum Resource {
    /// Plain URL string
    Url(String),
    /// Structured request carrying its own URL
    Request(Request),
    /// Parsed URI value
    Uri(Uri),
}

impl Resource {
    /// URL addressed by the resource
    #[must_use]
    pub fn url(&self) -> String {
        match self {
            Resource::Url(url) => url.clone(),
            Resource::Request(request) => request.url.clone(),
            Resource::Uri(uri) => uri.to_string(),
        }
    }

    fn method(&self) -> Option<&str> {
        match self {
            Resource::Request(request) => request.method.as_deref(),
            Resource::Url(_) | Resource::Uri(_) => None,
        }
    }

    fn headers(&self) -> Option<&RequestHeaders> {
        match self {
            Resource::Request(request) => request.headers.as_ref(),
            Resource::Url(_) | Resource::Uri(_) => None,
        }
    }
}

impl From<&str> for Resource {
    fn from(url: &str) -> Self {
        Resource::Url(url.to_string())
    }
}

impl From<String> for Resource {
    fn from(url: String) -> Self {
        Resource::Url(url)
    }
}

impl From<Uri> for Resource {
    fn from(uri: Uri) -> Self {
        Resource::Uri(uri)
    }
}

impl From<Request> for Resource {
    fn from(request: Request) -> Self {
        Resource::Request(request)
    }
}

/// Structured request resource
#[derive(Debug, Clone)]
pub struct Request {
    /// Request URL
    pub url: String,
    /// Method carried by the request itself
    pub method: Option<String>,
    /// Headers carried by the request itself
    pub headers: Option<RequestHeaders>,
}

impl Request {
    /// Create a request resource for a URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: None,
        }
    }

    /// Set the method
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set the headers
    #[must_use]
    pub fn headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// Outgoing headers in either accepted shape
#[derive(Debug, Clone)]
pub enum RequestHeaders {
    /// Iterable header structure
    Fields(HeaderMap),
    /// Plain name to value mapping
    Map(BTreeMap<String, String>),
}

impl RequestHeaders {
    /// Snapshot as a name to value mapping
    ///
    /// Non-UTF-8 header values are replaced lossily.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            RequestHeaders::Fields(fields) => header_map_to_map(fields),
            RequestHeaders::Map(map) => map.clone(),
        }
    }

    /// Header pairs in insertion order
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        match self {
            RequestHeaders::Fields(fields) => fields
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            RequestHeaders::Map(map) => map
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Look up a header, ignoring name case
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        match self {
            RequestHeaders::Fields(fields) => fields
                .get(name)
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned()),
            RequestHeaders::Map(map) => map
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone()),
        }
    }
}

/// Outgoing request body
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Text, possibly JSON
    Text(String),
    /// Form fields
    Form(Vec<(String, String)>),
    /// Opaque binary data
    Binary(Bytes),
}

impl RequestBody {
    /// Encode the body for the wire
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            RequestBody::Text(text) => Bytes::from(text.clone()),
            RequestBody::Form(fields) => Bytes::from(encode_form(fields)),
            RequestBody::Binary(bytes) => bytes.clone(),
        }
    }
}

/// Encode form fields as `application/x-www-form-urlencoded`
#[must_use]
pub fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Optional arguments of a fetch call
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Request method, `GET` when absent
    pub method: Option<String>,
    /// Request headers
    pub headers: Option<RequestHeaders>,
    /// Request body
    pub body: Option<RequestBody>,
}

impl FetchOptions {
    /// Create empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the method
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header, switching to the plain mapping shape if needed
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = self.headers.take().map(|h| h.to_map()).unwrap_or_default();
        map.insert(name.into(), value.into());
        self.headers = Some(RequestHeaders::Map(map));
        self
    }

    /// Set the headers
    #[must_use]
    pub fn headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set a text body
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(text.into()));
        self
    }

    /// Set a JSON body
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized
    pub fn json<T: serde::Serialize>(self, value: &T) -> crate::Result<Self> {
        let body = serde_json::to_string(value)?;
        Ok(self.header("content-type", "application/json").text(body))
    }

    /// Set a form body
    #[must_use]
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    /// Set a binary body
    #[must_use]
    pub fn binary(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Binary(bytes.into()));
        self
    }

    /// Upper-cased method for a call on `resource`
    #[must_use]
    pub fn effective_method(&self, resource: &Resource) -> String {
        self.method
            .as_deref()
            .or_else(|| resource.method())
            .unwrap_or(DEFAULT_METHOD)
            .to_ascii_uppercase()
    }

    /// Headers for a call on `resource`; options take precedence
    #[must_use]
    pub fn effective_headers<'a>(&'a self, resource: &'a Resource) -> Option<&'a RequestHeaders> {
        self.headers.as_ref().or_else(|| resource.headers())
    }
}

/// Response returned by an entry point
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Streaming body
    pub body: Body,
}

impl FetchResponse {
    /// Create a response
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Value of the `content-type` header, if readable
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Fork the response into two independent readers
    ///
    /// `self` keeps one branch of the body and the returned copy gets the
    /// other; each branch sees every fragment in order regardless of how the
    /// other branch is consumed. Must be called within a tokio runtime.
    #[must_use]
    pub fn fork(&mut self) -> FetchResponse {
        let body = std::mem::replace(&mut self.body, Body::empty());
        let (own, copy) = body.tee();
        self.body = own;
        FetchResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: copy,
        }
    }
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Snapshot a header map as a name to value mapping
#[must_use]
pub fn header_map_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}
