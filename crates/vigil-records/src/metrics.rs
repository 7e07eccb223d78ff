//! Indexing and query metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Detection records written by the result indexer.
    pub const RECORDS_WRITTEN: &str = "vigil_records_written_total";

    /// Index commits by outcome (written, duplicate, error).
    pub const INDEX_COMMITS: &str = "vigil_index_commits_total";

    /// Time spent committing one job's batch.
    pub const INDEX_COMMIT_SECONDS: &str = "vigil_index_commit_seconds";

    /// Queries by outcome (ok, invalid, not_found, unavailable).
    pub const QUERIES: &str = "vigil_queries_total";

    /// Query latency.
    pub const QUERY_SECONDS: &str = "vigil_query_seconds";

    /// Query failures caused by an unreachable backend.
    pub const QUERY_BACKEND_FAILURES: &str = "vigil_query_backend_failures_total";
}

/// Record a finished index commit.
pub fn record_commit(outcome: &'static str, written: usize, elapsed_secs: f64) {
    counter!(names::INDEX_COMMITS, "outcome" => outcome).increment(1);
    if written > 0 {
        counter!(names::RECORDS_WRITTEN).increment(written as u64);
    }
    histogram!(names::INDEX_COMMIT_SECONDS).record(elapsed_secs);
}

/// Record a finished query.
pub fn record_query(outcome: &'static str, elapsed_secs: f64) {
    counter!(names::QUERIES, "outcome" => outcome).increment(1);
    histogram!(names::QUERY_SECONDS).record(elapsed_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::RECORDS_WRITTEN.ends_with("_total"));
        assert!(names::INDEX_COMMIT_SECONDS.ends_with("_seconds"));
        assert!(names::QUERIES.starts_with("vigil_"));
    }
}
