//! Capturing wrapper around the original network entry point

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::network::{Fetch, FetchFuture, FetchOptions, Resource};
use crate::record::CaptureRecord;

use super::state::Shared;

/// Wraps the original entry point with capture
///
/// Always delegates to the original saved at recorder construction, never to
/// whatever happens to be installed, so reinstalling never builds a chain.
pub struct Interceptor {
    original: Arc<dyn Fetch>,
    shared: Arc<Shared>,
}

impl Interceptor {
    pub(crate) fn new(original: Arc<dyn Fetch>, shared: Arc<Shared>) -> Self {
        Self { original, shared }
    }
}

impl Fetch for Interceptor {
    fn fetch(&self, resource: Resource, options: FetchOptions) -> FetchFuture {
        let request_id = self.shared.next_call();
        let url = resource.url();
        let method = options.effective_method(&resource);

        if !self.shared.should_capture(&url, &method, None) {
            trace!("Skipping [{request_id}] {method} {url}");
            return self.original.fetch(resource, options);
        }

        debug!("Capturing [{request_id}] {method} {url}");

        let mode = self.shared.capture_mode();
        let mut record = CaptureRecord::new(request_id, &url, &method, mode, self.shared.clock.now_ms());
        if let Some(headers) = options.effective_headers(&resource) {
            record = record.with_request_headers(headers);
        }
        if let Some(body) = &options.body {
            record = record.with_payload(body);
        }

        let in_flight = self.shared.track();
        let shared = Arc::clone(&self.shared);
        let call = self.original.fetch(resource, options);

        Box::pin(async move {
            match call.await {
                Ok(mut response) => {
                    record.set_response(response.status, &response.headers, shared.clock.now_ms());

                    if !shared.should_capture(&url, &method, Some(response.status)) {
                        debug!(
                            "Skipping [{}] due to status filter ({})",
                            record.request_id, response.status
                        );
                        return Ok(response);
                    }

                    let copy = response.fork();
                    tokio::spawn(async move {
                        let record = shared.stream.run(record, copy).await;
                        shared.commit(record);
                        drop(in_flight);
                    });
                    Ok(response)
                }
                Err(error) => {
                    warn!("Error [{}]: {error}", record.request_id);
                    record.fail_call(error.to_string(), shared.clock.now_ms());
                    tokio::spawn(async move {
                        shared.commit(record);
                        drop(in_flight);
                    });
                    Err(error)
                }
            }
        })
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor").finish_non_exhaustive()
    }
}
