//! Off-path draining of a forked response body into a record

use std::time::Duration;

use tracing::{debug, warn};

use crate::decode::TextDecoder;
use crate::network::{Body, FetchResponse};
use crate::record::{CaptureRecord, MonotonicClock};

/// Drains one forked response into its record
#[derive(Debug, Clone, Copy)]
pub struct StreamCapture {
    clock: MonotonicClock,
    timeout: Option<Duration>,
}

impl StreamCapture {
    /// Create a stream capture bounded by `timeout`, unbounded when `None`
    #[must_use]
    pub fn new(clock: MonotonicClock, timeout: Option<Duration>) -> Self {
        Self { clock, timeout }
    }

    /// Read `response` to the end, appending decoded fragments to `record`
    ///
    /// A read failure or timeout sets the record's error and keeps every
    /// fragment captured so far. The record is returned in either case.
    pub async fn run(&self, mut record: CaptureRecord, response: FetchResponse) -> CaptureRecord {
        let mut decoder = TextDecoder::for_content_type(response.content_type());
        let mut body = response.body;

        debug!("Reading stream [{}]", record.request_id);

        let completed = match self.timeout {
            Some(limit) => {
                let drain = self.drain(&mut record, &mut decoder, &mut body);
                if tokio::time::timeout(limit, drain).await.is_err() {
                    flush(&mut record, &mut decoder);
                    let message = format!("stream capture timed out after {}ms", limit.as_millis());
                    warn!("Stream error [{}]: {message}", record.request_id);
                    record.fail(message);
                    false
                } else {
                    record.error().is_none()
                }
            }
            None => {
                self.drain(&mut record, &mut decoder, &mut body).await;
                record.error().is_none()
            }
        };

        if completed {
            debug!(
                "Stream complete [{}], chunks: {}",
                record.request_id,
                record.response_chunks().len()
            );
        }
        record
    }

    async fn drain(&self, record: &mut CaptureRecord, decoder: &mut TextDecoder, body: &mut Body) {
        while let Some(fragment) = body.read().await {
            match fragment {
                Ok(bytes) => record.push_chunk(decoder.decode(&bytes)),
                Err(e) => {
                    flush(record, decoder);
                    warn!("Stream error [{}]: {e}", record.request_id);
                    record.fail(e.message());
                    return;
                }
            }
        }

        flush(record, decoder);
        record.finish(self.clock.now_ms());
    }
}

fn flush(record: &mut CaptureRecord, decoder: &mut TextDecoder) {
    let tail = decoder.finish();
    if !tail.is_empty() {
        record.push_chunk(tail);
    }
}
