//! State shared between the recorder, its interceptor and capture tasks

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::{CaptureConfig, CaptureMode};
use crate::export::ExportManager;
use crate::filter;
use crate::record::{CaptureRecord, MonotonicClock};
use crate::storage::CaptureStore;

use super::stream::StreamCapture;
use super::REQUEST_ID_PREFIX;

/// One recorder's context; no process globals
pub(crate) struct Shared {
    pub(crate) config: RwLock<CaptureConfig>,
    pub(crate) store: CaptureStore,
    pub(crate) exporter: ExportManager,
    pub(crate) auto_save: bool,
    pub(crate) clock: MonotonicClock,
    pub(crate) stream: StreamCapture,
    fetch_calls: AtomicU64,
    request_seq: AtomicU64,
    in_flight: AtomicUsize,
    settled: Notify,
}

impl Shared {
    pub(crate) fn new(
        config: CaptureConfig,
        exporter: ExportManager,
        auto_save: bool,
        stream: StreamCapture,
        clock: MonotonicClock,
    ) -> Self {
        Self {
            store: CaptureStore::new(config.max_captures),
            config: RwLock::new(config),
            exporter,
            auto_save,
            clock,
            stream,
            fetch_calls: AtomicU64::new(0),
            request_seq: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            settled: Notify::new(),
        }
    }

    /// Count a call and hand out its id
    pub(crate) fn next_call(&self) -> String {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{REQUEST_ID_PREFIX}{seq}")
    }

    pub(crate) fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn should_capture(&self, url: &str, method: &str, status: Option<u16>) -> bool {
        filter::should_capture(&self.config.read(), url, method, status)
    }

    pub(crate) fn capture_mode(&self) -> CaptureMode {
        self.config.read().capture_mode
    }

    /// Mark a record as in flight until the guard drops
    pub(crate) fn track(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlight {
            shared: Arc::clone(self),
        }
    }

    /// Store a finished record and auto-save it
    pub(crate) fn commit(&self, record: CaptureRecord) {
        let saved = self.auto_save.then(|| self.exporter.export_record(&record));
        let request_id = record.request_id.clone();

        for evicted in self.store.add(record) {
            debug!("Removed oldest capture: {}", evicted.request_id);
        }

        match saved {
            Some(Ok(filename)) => info!("Saved [{request_id}]: {filename}"),
            Some(Err(e)) => warn!("Failed to save [{request_id}]: {e}"),
            None => debug!("Stored [{request_id}]"),
        }
    }

    /// Wait until no capture is in flight
    pub(crate) async fn settle(&self) {
        loop {
            let notified = self.settled.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps a capture counted as in flight
pub(crate) struct InFlight {
    shared: Arc<Shared>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.shared.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.settled.notify_waiters();
        }
    }
}
