//! Aggregate statistics over stored captures

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::CaptureMode;
use crate::record::CaptureRecord;

/// Summary of the capture store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Records currently stored
    pub total_captures: usize,
    /// Recording gate at the time of the snapshot
    pub is_recording: bool,
    /// Capture mode at the time of the snapshot
    pub capture_mode: CaptureMode,
    /// Calls seen by the interceptor, captured or not
    pub fetch_calls: u64,
    /// Record count per request method
    pub by_method: BTreeMap<String, usize>,
    /// Record count per request path
    pub by_path: BTreeMap<String, usize>,
    /// Record count per response status, for records that have one
    pub by_status: BTreeMap<u16, usize>,
    /// Mean total duration over records that finished streaming
    pub avg_duration_ms: Option<f64>,
    /// Records with an error set
    pub errors: usize,
}

impl Stats {
    /// Group and count a snapshot of records
    #[must_use]
    pub fn from_records(records: &[Arc<CaptureRecord>]) -> Self {
        let mut stats = Self {
            total_captures: records.len(),
            ..Self::default()
        };

        let mut duration_sum = 0.0;
        let mut duration_count = 0usize;

        for record in records {
            *stats
                .by_method
                .entry(record.request_method.clone())
                .or_insert(0) += 1;

            let path = if record.request_path.is_empty() {
                &record.request_url
            } else {
                &record.request_path
            };
            *stats.by_path.entry(path.clone()).or_insert(0) += 1;

            if let Some(status) = record.response_status {
                *stats.by_status.entry(status).or_insert(0) += 1;
            }

            if let Some(total) = record.timing.total_duration {
                duration_sum += total;
                duration_count += 1;
            }

            if record.error().is_some() {
                stats.errors += 1;
            }
        }

        if duration_count > 0 {
            stats.avg_duration_ms = Some(duration_sum / duration_count as f64);
        }

        stats
    }

    /// Mean duration as `"12.34ms"`, or `"N/A"` when nothing finished
    #[must_use]
    pub fn avg_duration_label(&self) -> String {
        match self.avg_duration_ms {
            Some(avg) => format!("{avg:.2}ms"),
            None => "N/A".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::HeaderMap;

    fn record(method: &str, url: &str, status: Option<u16>, total: Option<f64>) -> Arc<CaptureRecord> {
        let mut record = CaptureRecord::new("req_1".to_string(), url, method, CaptureMode::All, 0.0);
        if let Some(status) = status {
            record.set_response(status, &HeaderMap::new(), 1.0);
        }
        if let Some(total) = total {
            record.finish(total);
        }
        Arc::new(record)
    }

    #[test]
    fn test_empty_store_stats() {
        let stats = Stats::from_records(&[]);
        assert_eq!(stats.total_captures, 0);
        assert_eq!(stats.avg_duration_ms, None);
        assert_eq!(stats.avg_duration_label(), "N/A");
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_grouping() {
        let records = vec![
            record("GET", "http://a.test/items", Some(200), Some(10.0)),
            record("GET", "http://a.test/items", Some(404), Some(20.0)),
            record("POST", "http://a.test/chat", Some(200), None),
        ];
        let stats = Stats::from_records(&records);

        assert_eq!(stats.total_captures, 3);
        assert_eq!(stats.by_method.get("GET"), Some(&2));
        assert_eq!(stats.by_method.get("POST"), Some(&1));
        assert_eq!(stats.by_path.get("/items"), Some(&2));
        assert_eq!(stats.by_path.get("/chat"), Some(&1));
        assert_eq!(stats.by_status.get(&200), Some(&2));
        assert_eq!(stats.by_status.get(&404), Some(&1));
        assert_eq!(stats.avg_duration_ms, Some(15.0));
        assert_eq!(stats.avg_duration_label(), "15.00ms");
    }

    #[test]
    fn test_errors_and_missing_status() {
        let mut failed = CaptureRecord::new("req_2".to_string(), "/x", "GET", CaptureMode::All, 0.0);
        failed.fail_call("refused", 2.0);
        let records = vec![Arc::new(failed), record("GET", "/x", Some(200), Some(4.0))];

        let stats = Stats::from_records(&records);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.by_status.values().sum::<usize>(), 1);
        assert_eq!(stats.avg_duration_ms, Some(4.0));
    }

    #[test]
    fn test_serialized_keys() {
        let stats = Stats::from_records(&[record("GET", "/x", Some(201), Some(1.0))]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["byStatus"]["201"], 1);
        assert_eq!(json["totalCaptures"], 1);
        assert_eq!(json["avgDurationMs"], 1.0);
    }
}
