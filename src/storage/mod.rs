//! Capture storage and sinks

mod sink;
mod store;

pub use sink::{DirectorySink, MemorySink, Sink, SinkEntry};
pub use store::CaptureStore;
