//! Destinations for serialized captures

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{Result, TapError};

/// Longest accepted file name
const NAME_LEN_MAX: usize = 255;

/// Accepts serialized payloads under a suggested name
///
/// `prompt_user` is a hint for interactive sinks: single-record saves pass
/// `false`, bulk exports pass `true`.
pub trait Sink: Send + Sync {
    /// Store one payload
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be stored
    fn accept(&self, payload: &str, suggested_name: &str, prompt_user: bool) -> Result<()>;
}

/// Writes each payload to a file in a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create a sink writing into `dir`, created on first use
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Sink for DirectorySink {
    fn accept(&self, payload: &str, suggested_name: &str, prompt_user: bool) -> Result<()> {
        validate_file_name(suggested_name)?;
        std::fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(suggested_name);
        std::fs::write(&path, payload)?;

        if prompt_user {
            info!("Exported {}", path.display());
        } else {
            debug!("Saved {}", path.display());
        }
        Ok(())
    }
}

/// One payload accepted by a [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEntry {
    /// Suggested file name
    pub name: String,
    /// Serialized payload
    pub payload: String,
    /// Whether the caller asked for an interactive prompt
    pub prompt_user: bool,
}

/// Keeps accepted payloads in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<SinkEntry>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything accepted so far, in order
    #[must_use]
    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries.lock().clone()
    }

    /// Number of accepted payloads
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Sink for MemorySink {
    fn accept(&self, payload: &str, suggested_name: &str, prompt_user: bool) -> Result<()> {
        self.entries.lock().push(SinkEntry {
            name: suggested_name.to_string(),
            payload: payload.to_string(),
            prompt_user,
        });
        Ok(())
    }
}

/// Validate a suggested file name
///
/// # Errors
///
/// Returns error if the name is empty, too long, hidden, or could escape the
/// target directory
fn validate_file_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(TapError::Sink {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return reject("file name cannot be empty");
    }

    if name.len() > NAME_LEN_MAX {
        return reject("file name too long");
    }

    if name.contains('/') || name.contains('\\') {
        return reject("file name cannot contain path separators");
    }

    if name.starts_with('.') {
        return reject("file name cannot start with dot");
    }

    if name.contains('\0') {
        return reject("file name cannot contain null bytes");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_sink_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp_dir.path().join("out"));

        sink.accept("{\"a\":1}", "capture.json", false).unwrap();

        let written = std::fs::read_to_string(temp_dir.path().join("out/capture.json")).unwrap();
        assert_eq!(written, "{\"a\":1}");
    }

    #[test]
    fn test_directory_sink_rejects_bad_names() {
        let temp_dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp_dir.path());

        for name in ["", "../escape.json", "a/b.json", ".hidden", "nul\0.json"] {
            let err = sink.accept("{}", name, true).unwrap_err();
            assert!(matches!(err, TapError::Sink { .. }), "{name:?}");
        }
        assert!(sink.accept("{}", &"x".repeat(256), true).is_err());
    }

    #[test]
    fn test_memory_sink_records_entries() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.accept("one", "a.json", false).unwrap();
        sink.accept("two", "b.json", true).unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "b.json");
        assert!(entries[1].prompt_user);
        assert!(!entries[0].prompt_user);
    }
}
