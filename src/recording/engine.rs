//! Recorder: owns the capture context and exposes the control surface

use std::sync::Arc;

use tracing::info;

use crate::config::{CaptureMode, Config, SupervisorConfig};
use crate::export::{ExportCriteria, ExportManager};
use crate::filter::FilterUpdate;
use crate::network::{EntryPoint, Fetch};
use crate::record::{CaptureRecord, MonotonicClock};
use crate::stats::Stats;
use crate::storage::Sink;
use crate::Result;

use super::control::{
    CapacityReply, ClearReply, ExportReply, FilterReply, ModeReply, RecordingReply, RecordingState,
    StatusReport,
};
use super::interceptor::Interceptor;
use super::state::Shared;
use super::stream::StreamCapture;
use super::supervisor::{Installation, Supervisor};

/// Client-side traffic recorder bound to one entry point
///
/// The entry point's handler at construction time is saved as the original;
/// the interceptor always delegates to it.
pub struct Recorder {
    shared: Arc<Shared>,
    installation: Arc<Installation>,
}

impl Recorder {
    /// Create a recorder for `entry`, writing saves and exports to `sink`
    ///
    /// Nothing is installed until [`Recorder::install`] is called.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: &Config, entry: Arc<EntryPoint>, sink: Arc<dyn Sink>) -> Result<Self> {
        config.validate()?;

        let clock = MonotonicClock::new();
        let exporter = ExportManager::new(sink, config.export.file_prefix.clone());
        let stream = StreamCapture::new(clock, config.limits.stream_timeout());
        let shared = Arc::new(Shared::new(
            config.capture.clone(),
            exporter,
            config.export.auto_save,
            stream,
            clock,
        ));

        let original = entry.current();
        let interceptor: Arc<dyn Fetch> =
            Arc::new(Interceptor::new(Arc::clone(&original), Arc::clone(&shared)));
        let installation = Arc::new(Installation::new(entry, original, interceptor));

        Ok(Self {
            shared,
            installation,
        })
    }

    /// Install the interceptor; a no-op if already installed
    pub fn install(&self) -> bool {
        self.installation.install()
    }

    /// Reinstall the interceptor unconditionally
    pub fn force_install(&self) {
        self.installation.force();
    }

    /// Restore the original entry point
    pub fn uninstall(&self) -> bool {
        self.installation.uninstall()
    }

    /// Whether the interceptor is the active entry point
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installation.is_current()
    }

    /// Build a reinstallation supervisor for this recorder
    #[must_use]
    pub fn supervisor(&self, config: &SupervisorConfig) -> Supervisor {
        Supervisor::new(Arc::clone(&self.installation), config)
    }

    /// Turn recording on
    pub fn start_recording(&self) -> RecordingReply {
        self.set_recording(|_| true)
    }

    /// Turn recording off
    pub fn stop_recording(&self) -> RecordingReply {
        self.set_recording(|_| false)
    }

    /// Flip the recording gate
    pub fn toggle_recording(&self) -> RecordingReply {
        self.set_recording(|current| !current)
    }

    fn set_recording(&self, next: impl FnOnce(bool) -> bool) -> RecordingReply {
        let (is_recording, mode) = {
            let mut config = self.shared.config.write();
            config.is_recording = next(config.is_recording);
            (config.is_recording, config.capture_mode)
        };

        let status = RecordingState::from(is_recording);
        info!(
            "Recording {}",
            if is_recording { "started" } else { "stopped" }
        );

        RecordingReply {
            status,
            mode,
            captured: self.shared.store.len(),
        }
    }

    /// Set the capture mode from its wire name
    ///
    /// # Errors
    ///
    /// Returns error if `mode` is not `all`, `chat-only` or `custom`; the
    /// current mode is kept
    pub fn set_capture_mode(&self, mode: &str) -> Result<ModeReply> {
        let mode: CaptureMode = mode.parse()?;
        self.shared.config.write().capture_mode = mode;
        info!("Capture mode set to: {mode}");
        Ok(ModeReply { mode })
    }

    /// Merge a partial filter update
    ///
    /// # Errors
    ///
    /// Returns error if any supplied axis is invalid; the filter is kept
    pub fn set_filter(&self, update: FilterUpdate) -> Result<FilterReply> {
        let filter = {
            let mut config = self.shared.config.write();
            config.filter.merge(update)?;
            config.filter.clone()
        };
        info!("Filter updated: {:?}", filter);
        Ok(FilterReply { filter })
    }

    /// Change the store bound, evicting the oldest records if needed
    ///
    /// # Errors
    ///
    /// Returns error if `max_captures` is zero
    pub fn set_max_captures(&self, max_captures: usize) -> Result<CapacityReply> {
        let mut config = self.shared.config.write();
        let evicted = self.shared.store.set_capacity(max_captures)?.len();
        config.max_captures = max_captures;
        drop(config);

        info!("Max captures set to {max_captures}, evicted {evicted}");
        Ok(CapacityReply {
            max_captures,
            evicted,
        })
    }

    /// Remove every stored record
    pub fn clear_captures(&self) -> ClearReply {
        let cleared = self.shared.store.clear();
        info!("Cleared {cleared} captures");
        ClearReply { cleared }
    }

    /// Aggregate statistics over the store
    #[must_use]
    pub fn get_stats(&self) -> Stats {
        let records = self.shared.store.all();
        let (is_recording, capture_mode) = {
            let config = self.shared.config.read();
            (config.is_recording, config.capture_mode)
        };

        Stats {
            is_recording,
            capture_mode,
            fetch_calls: self.shared.fetch_calls(),
            ..Stats::from_records(&records)
        }
    }

    /// Current configuration and counters
    #[must_use]
    pub fn get_status(&self) -> StatusReport {
        let config = self.shared.config.read().clone();
        StatusReport {
            is_recording: config.is_recording,
            capture_mode: config.capture_mode,
            total_captures: self.shared.store.len(),
            fetch_calls: self.shared.fetch_calls(),
            injections: self.installation.injections(),
            filter: config.filter,
            max_captures: self.shared.store.capacity(),
            is_our_interceptor: self.installation.is_current(),
        }
    }

    /// Export every stored record
    pub fn export_all(&self) -> ExportReply {
        let records = self.shared.store.all();
        let reply = ExportReply::from_outcome(self.shared.exporter.export_all(&records), "No captures");
        log_export(&reply);
        reply
    }

    /// Export the stored records matching `criteria`
    pub fn export_filtered(&self, criteria: &ExportCriteria) -> ExportReply {
        let records = self.shared.store.all();
        let reply = ExportReply::from_outcome(
            self.shared.exporter.export_filtered(&records, criteria),
            "No matches",
        );
        log_export(&reply);
        reply
    }

    /// Snapshot of the stored records, oldest first
    #[must_use]
    pub fn captures(&self) -> Vec<Arc<CaptureRecord>> {
        self.shared.store.all()
    }

    /// Wait for every in-flight capture to reach the store
    pub async fn settle(&self) {
        self.shared.settle().await;
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("installation", &self.installation)
            .finish_non_exhaustive()
    }
}

fn log_export(reply: &ExportReply) {
    match reply {
        ExportReply::Exported { exported, filename } => {
            info!("Exported {exported} captures to {filename}");
        }
        ExportReply::NothingToExport { error } => info!("Nothing to export: {error}"),
        ExportReply::Failed { error } => tracing::error!("Export failed: {error}"),
    }
}
