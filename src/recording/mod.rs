//! Capture engine: interceptor, stream capture, supervision and control

mod control;
mod engine;
mod interceptor;
mod state;
mod stream;
mod supervisor;

pub use control::{
    CapacityReply, ClearReply, ExportReply, FilterReply, ModeReply, RecordingReply, RecordingState,
    StatusReport,
};
pub use engine::Recorder;
pub use interceptor::Interceptor;
pub use stream::StreamCapture;
pub use supervisor::{Installation, Supervisor, SupervisorHandle};

/// Prefix of every request id
pub const REQUEST_ID_PREFIX: &str = "req_";
