//! Serialization of captures to a sink

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::CaptureRecord;
use crate::storage::Sink;
use crate::Result;

/// Criteria for a filtered export; absent fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportCriteria {
    /// Exact method, compared ignoring ASCII case
    #[serde(default)]
    pub method: Option<String>,
    /// Substring of the request path
    #[serde(default)]
    pub path: Option<String>,
    /// Earliest creation instant, inclusive
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Latest creation instant, inclusive
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl ExportCriteria {
    /// Match everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a method
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Restrict to paths containing `path`
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Restrict to records created within `[start, end]`
    #[must_use]
    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Whether `record` satisfies every present criterion
    #[must_use]
    pub fn matches(&self, record: &CaptureRecord) -> bool {
        if let Some(method) = &self.method {
            if !record.request_method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if !record.request_path.contains(path.as_str()) {
                return false;
            }
        }
        if self.start_time.is_some_and(|start| record.timestamp < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| record.timestamp > end) {
            return false;
        }
        true
    }
}

/// Result of an export request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Payload handed to the sink
    Exported {
        /// Records in the payload
        count: usize,
        /// Name the payload was offered under
        filename: String,
    },
    /// No record matched; the sink was not called
    NothingToExport,
}

/// Serializes captures and hands them to a [`Sink`]
pub struct ExportManager {
    sink: Arc<dyn Sink>,
    file_prefix: String,
}

impl ExportManager {
    /// Create a manager writing to `sink` with names starting `file_prefix`
    pub fn new(sink: Arc<dyn Sink>, file_prefix: impl Into<String>) -> Self {
        Self {
            sink,
            file_prefix: file_prefix.into(),
        }
    }

    /// Export every record
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the sink fails
    pub fn export_all(&self, records: &[Arc<CaptureRecord>]) -> Result<ExportOutcome> {
        self.export_bulk(records.iter().map(|record| &**record).collect(), "all")
    }

    /// Export the records matching `criteria`, preserving their order
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the sink fails
    pub fn export_filtered(
        &self,
        records: &[Arc<CaptureRecord>],
        criteria: &ExportCriteria,
    ) -> Result<ExportOutcome> {
        let selected = records
            .iter()
            .map(|record| &**record)
            .filter(|record| criteria.matches(record))
            .collect();
        self.export_bulk(selected, "filtered")
    }

    /// Save a single record without prompting
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the sink fails
    pub fn export_record(&self, record: &CaptureRecord) -> Result<String> {
        let payload = serde_json::to_string_pretty(record)?;
        let filename = format!(
            "{}-capture-{}-{}.json",
            self.file_prefix,
            record.request_id,
            file_stamp(Utc::now())
        );
        self.sink.accept(&payload, &filename, false)?;
        Ok(filename)
    }

    fn export_bulk(&self, records: Vec<&CaptureRecord>, kind: &str) -> Result<ExportOutcome> {
        if records.is_empty() {
            return Ok(ExportOutcome::NothingToExport);
        }

        let payload = serde_json::to_string_pretty(&records)?;
        let filename = format!(
            "{}-captures-{kind}-{}.json",
            self.file_prefix,
            file_stamp(Utc::now())
        );
        self.sink.accept(&payload, &filename, true)?;

        Ok(ExportOutcome::Exported {
            count: records.len(),
            filename,
        })
    }
}

impl std::fmt::Debug for ExportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportManager")
            .field("file_prefix", &self.file_prefix)
            .finish_non_exhaustive()
    }
}

/// ISO-8601 instant with `:` and `.` replaced so it is safe in file names
fn file_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureMode;
    use crate::storage::MemorySink;
    use chrono::{Duration, TimeZone};

    fn record(id: usize, method: &str, url: &str) -> Arc<CaptureRecord> {
        Arc::new(CaptureRecord::new(
            format!("req_{id}"),
            url,
            method,
            CaptureMode::All,
            0.0,
        ))
    }

    fn mixed_records() -> Vec<Arc<CaptureRecord>> {
        vec![
            record(1, "POST", "http://a.test/chat/1"),
            record(2, "GET", "http://a.test/items"),
            record(3, "POST", "http://a.test/chat/2"),
            record(4, "GET", "http://a.test/items/9"),
            record(5, "POST", "http://a.test/upload"),
        ]
    }

    fn exported_ids(payload: &str) -> Vec<String> {
        let value: serde_json::Value = serde_json::from_str(payload).unwrap();
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["requestId"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_file_stamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap() + Duration::milliseconds(42);
        assert_eq!(file_stamp(at), "2024-03-09T14-05-07-042Z");
    }

    #[test]
    fn test_export_all() {
        let sink = Arc::new(MemorySink::new());
        let manager = ExportManager::new(sink.clone(), "tap");

        let outcome = manager.export_all(&mixed_records()).unwrap();
        let ExportOutcome::Exported { count, filename } = outcome else {
            panic!("expected export");
        };
        assert_eq!(count, 5);
        assert!(filename.starts_with("tap-captures-all-"));
        assert!(filename.ends_with(".json"));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].prompt_user);
        assert_eq!(entries[0].name, filename);
        assert_eq!(exported_ids(&entries[0].payload).len(), 5);
    }

    #[test]
    fn test_export_filtered_by_method_keeps_order() {
        let sink = Arc::new(MemorySink::new());
        let manager = ExportManager::new(sink.clone(), "tap");

        let outcome = manager
            .export_filtered(&mixed_records(), &ExportCriteria::new().method("POST"))
            .unwrap();
        assert!(matches!(outcome, ExportOutcome::Exported { count: 3, ref filename } if filename.starts_with("tap-captures-filtered-")));
        assert_eq!(
            exported_ids(&sink.entries()[0].payload),
            ["req_1", "req_3", "req_5"]
        );
    }

    #[test]
    fn test_export_filtered_by_path_and_time() {
        let sink = Arc::new(MemorySink::new());
        let manager = ExportManager::new(sink.clone(), "tap");
        let records = mixed_records();

        let criteria = ExportCriteria::new().path("/items");
        manager.export_filtered(&records, &criteria).unwrap();
        assert_eq!(exported_ids(&sink.entries()[0].payload), ["req_2", "req_4"]);

        let first = records[0].timestamp;
        let inclusive = ExportCriteria::new().between(Some(first), Some(Utc::now()));
        assert!(inclusive.matches(&records[0]));
        let future = ExportCriteria::new().between(Some(Utc::now() + Duration::hours(1)), None);
        assert!(!future.matches(&records[0]));
    }

    #[test]
    fn test_empty_result_skips_sink() {
        let sink = Arc::new(MemorySink::new());
        let manager = ExportManager::new(sink.clone(), "tap");

        assert_eq!(manager.export_all(&[]).unwrap(), ExportOutcome::NothingToExport);
        assert_eq!(
            manager
                .export_filtered(&mixed_records(), &ExportCriteria::new().method("DELETE"))
                .unwrap(),
            ExportOutcome::NothingToExport
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_export_record_does_not_prompt() {
        let sink = Arc::new(MemorySink::new());
        let manager = ExportManager::new(sink.clone(), "tap");
        let filename = manager.export_record(&record(7, "GET", "/x")).unwrap();

        assert!(filename.starts_with("tap-capture-req_7-"));
        let entries = sink.entries();
        assert!(!entries[0].prompt_user);
        let value: serde_json::Value = serde_json::from_str(&entries[0].payload).unwrap();
        assert_eq!(value["requestId"], "req_7");
    }

    #[test]
    fn test_criteria_deserialize() {
        let criteria: ExportCriteria =
            serde_json::from_str(r#"{"method":"POST","startTime":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(criteria.method.as_deref(), Some("POST"));
        assert!(criteria.start_time.is_some());
        assert!(criteria.path.is_none());
    }
}
