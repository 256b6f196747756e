//! # Commit Coordinator Metrics
//!
//! Prometheus metrics for change request outcomes and their sub-results.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! commit-coordinator = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `commit_operations_total` - Counter of finished operations (by operation, result)
//! - `commit_endorsement_rejections_total` - Counter of requests stopped at the endorsement gate
//! - `commit_watch_results_total` - Counter of resolved commit listeners (by result)
//! - `commit_submissions_total` - Counter of submission calls (by operation, result)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter_vec, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Finished operations, labeled by operation and result
    pub static ref OPERATIONS: IntCounterVec = register_int_counter_vec!(
        "commit_operations_total",
        "Total number of finished change requests",
        &["operation", "result"]
    )
    .expect("Failed to create OPERATIONS metric");

    /// Requests that failed endorsement, labeled by operation
    pub static ref ENDORSEMENT_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "commit_endorsement_rejections_total",
        "Total number of change requests stopped at the endorsement gate",
        &["operation"]
    )
    .expect("Failed to create ENDORSEMENT_REJECTIONS metric");

    /// Resolved commit listeners, labeled by result
    pub static ref WATCH_RESULTS: IntCounterVec = register_int_counter_vec!(
        "commit_watch_results_total",
        "Total number of resolved commit listeners",
        &["result"]
    )
    .expect("Failed to create WATCH_RESULTS metric");

    /// Submission calls, labeled by operation and result
    pub static ref SUBMISSIONS: IntCounterVec = register_int_counter_vec!(
        "commit_submissions_total",
        "Total number of submission calls",
        &["operation", "result"]
    )
    .expect("Failed to create SUBMISSIONS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a finished operation
#[cfg(feature = "metrics")]
pub fn record_outcome(operation: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    OPERATIONS.with_label_values(&[operation, result]).inc();
}

/// Record a request stopped at the endorsement gate
#[cfg(feature = "metrics")]
pub fn record_endorsement_rejected(operation: &str) {
    ENDORSEMENT_REJECTIONS.with_label_values(&[operation]).inc();
}

/// Record a resolved commit listener
#[cfg(feature = "metrics")]
pub fn record_watch(result: &str) {
    WATCH_RESULTS.with_label_values(&[result]).inc();
}

/// Record a submission call
#[cfg(feature = "metrics")]
pub fn record_submission(operation: &str, result: &str) {
    SUBMISSIONS.with_label_values(&[operation, result]).inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_outcome(_operation: &str, _success: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_endorsement_rejected(_operation: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_watch(_result: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_submission(_operation: &str, _result: &str) {}
