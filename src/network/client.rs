//! Hyper-backed network entry point

use std::time::Duration;

use futures_util::future;
use futures_util::StreamExt;
use http_body_util::{BodyStream, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::{Body, Fetch, FetchError, FetchFuture, FetchOptions, FetchResponse, Resource, StreamError};

/// Plain-HTTP entry point backed by a pooled hyper client
///
/// Response bodies are handed back as streams; nothing is buffered.
#[derive(Clone)]
pub struct HyperFetch {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperFetch {
    /// Create a new client
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client }
    }

    async fn send(
        client: Client<HttpConnector, Full<Bytes>>,
        resource: Resource,
        options: FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        let url = resource.url();
        let uri = parse_uri(&url)?;
        let method = parse_method(&options.effective_method(&resource))?;

        debug!("Sending {} to {}", method, uri);

        let mut request_builder = Request::builder().method(method).uri(uri);
        if let Some(headers) = options.effective_headers(&resource) {
            for (name, value) in headers.pairs() {
                request_builder = request_builder.header(name, value);
            }
        }

        let body = options
            .body
            .as_ref()
            .map(super::RequestBody::to_bytes)
            .unwrap_or_default();
        let http_request = request_builder.body(Full::new(body))?;

        let response = client.request(http_request).await.map_err(|e| {
            warn!("Request to {url} failed: {e}");
            e
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let frames = BodyStream::new(response.into_body()).filter_map(|frame| {
            future::ready(match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(e) => Some(Err(StreamError::new(e.to_string()))),
            })
        });

        Ok(FetchResponse::new(status, headers, Body::from_stream(frames)))
    }
}

impl Default for HyperFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for HyperFetch {
    fn fetch(&self, resource: Resource, options: FetchOptions) -> FetchFuture {
        Box::pin(Self::send(self.client.clone(), resource, options))
    }
}

fn parse_uri(url: &str) -> Result<Uri, FetchError> {
    url.parse::<Uri>()
        .map_err(|e| format!("Invalid URL '{url}': {e}").into())
}

fn parse_method(method: &str) -> Result<Method, FetchError> {
    Method::from_bytes(method.as_bytes())
        .map_err(|e| format!("Invalid HTTP method '{method}': {e}").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let uri = parse_uri("http://example.com:8080/api/test?q=1").unwrap();
        assert_eq!(uri.path(), "/api/test");
        assert_eq!(uri.query(), Some("q=1"));
        assert!(parse_uri("http://exa mple.com/").is_err());
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("PATCH").unwrap(), Method::PATCH);
        let err = parse_method("BAD METHOD").unwrap_err();
        assert!(err.to_string().contains("BAD METHOD"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let client = HyperFetch::new();
        let result = client
            .fetch(Resource::from("http://127.0.0.1:1/"), FetchOptions::new())
            .await;
        assert!(result.is_err());
    }
}
