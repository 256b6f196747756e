//! Aggregation of all sub-results into the externally visible outcome
//!
//! Results are tagged by role: the submission result sits in its own field
//! and every watch outcome carries its peer, so nothing depends on the
//! position of a result in a joined list.

use super::commit::WatchOutcome;
use super::request::{ChannelName, OperationKind, OrgName};
use super::submission::{SubmissionOutcome, SubmissionRole};
use serde::{Deserialize, Serialize};

/// The response body handed to the HTTP layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
}

impl OperationOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Joined sub-results of one change request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReport {
    pub role: SubmissionRole,
    pub submission: SubmissionOutcome,
    /// One entry per armed listener, in arming order
    pub watches: Vec<WatchOutcome>,
}

impl CommitReport {
    pub fn succeeded(&self) -> bool {
        self.submission.is_accepted() && self.watches.iter().all(WatchOutcome::is_success)
    }

    /// The failure that decides the outcome message.
    ///
    /// Submission failure first, then the first failed watch in arming
    /// order.
    pub fn first_failure(&self) -> Option<String> {
        self.submission
            .failure_message(&self.role)
            .or_else(|| self.watches.iter().find_map(WatchOutcome::failure_message))
    }
}

/// Success and failure wording of one operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeWording {
    success: String,
    failure_prefix: &'static str,
}

impl OutcomeWording {
    pub fn for_operation(kind: OperationKind, org: &OrgName, channel: &ChannelName) -> Self {
        match kind {
            OperationKind::Instantiate => Self {
                success: format!(
                    "Successfully instantiate chaincode in organization {org} to the channel '{channel}'"
                ),
                failure_prefix: "Failed to instantiate the chaincode. cause:",
            },
            OperationKind::Upgrade => Self {
                success: format!(
                    "Successfully upgrade chaincode in organization {org} to the channel '{channel}'"
                ),
                failure_prefix: "Failed to upgrade the chaincode. cause:",
            },
            OperationKind::JoinChannel => Self {
                success: format!(
                    "Successfully joined peers in organization {org} to the channel:{channel}"
                ),
                failure_prefix: "Failed to join all peers to channel. cause:",
            },
            OperationKind::Reconfigure => Self {
                success: format!(
                    "Successfully update anchor peers in organization {org} to the channel '{channel}'"
                ),
                failure_prefix: "Failed to update anchor peers. cause:",
            },
        }
    }

    /// Render the terminal outcome from the deciding failure, if any.
    pub fn render(&self, failure: Option<String>) -> OperationOutcome {
        match failure {
            None => OperationOutcome::success(self.success.clone()),
            Some(cause) => OperationOutcome::failure(format!("{}{}", self.failure_prefix, cause)),
        }
    }

    pub fn render_report(&self, report: &CommitReport) -> OperationOutcome {
        self.render(report.first_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(peer: &str) -> WatchOutcome {
        WatchOutcome::Committed {
            peer: peer.into(),
            message: "ok".to_string(),
        }
    }

    fn wording() -> OutcomeWording {
        OutcomeWording::for_operation(
            OperationKind::Instantiate,
            &"Org1".into(),
            &"mychannel".into(),
        )
    }

    #[test]
    fn test_all_success() {
        let report = CommitReport {
            role: SubmissionRole::Ordering,
            submission: SubmissionOutcome::Accepted,
            watches: vec![committed("peer0"), committed("peer1")],
        };
        let outcome = wording().render_report(&report);

        assert!(report.succeeded());
        assert!(outcome.success);
        assert_eq!(
            outcome.message,
            "Successfully instantiate chaincode in organization Org1 to the channel 'mychannel'"
        );
    }

    #[test]
    fn test_submission_failure_preferred_over_watch_failure() {
        let report = CommitReport {
            role: SubmissionRole::Ordering,
            submission: SubmissionOutcome::Rejected {
                status: "BAD_REQUEST".to_string(),
                reason: "NO_SUFFICIENT_ENDORSEMENTS".to_string(),
            },
            watches: vec![WatchOutcome::TimedOut {
                peer: "peer0".into(),
            }],
        };
        let outcome = wording().render_report(&report);

        assert!(!outcome.success);
        assert!(outcome.message.contains("NO_SUFFICIENT_ENDORSEMENTS"));
        assert!(!outcome.message.contains("REQUEST_TIMEOUT"));
    }

    #[test]
    fn test_first_watch_failure_in_arming_order() {
        let report = CommitReport {
            role: SubmissionRole::Ordering,
            submission: SubmissionOutcome::Accepted,
            watches: vec![
                committed("peer0"),
                WatchOutcome::TimedOut {
                    peer: "peer1".into(),
                },
                WatchOutcome::Failed {
                    peer: "peer2".into(),
                    reason: "stream reset".to_string(),
                },
            ],
        };

        assert_eq!(report.first_failure().unwrap(), "REQUEST_TIMEOUT:peer1");
    }

    #[test]
    fn test_zero_watches_depends_on_submission_only() {
        let report = CommitReport {
            role: SubmissionRole::Ordering,
            submission: SubmissionOutcome::Accepted,
            watches: Vec::new(),
        };
        assert!(report.succeeded());
        assert_eq!(report.first_failure(), None);
    }

    #[test]
    fn test_aggregation_is_repeatable() {
        let report = CommitReport {
            role: SubmissionRole::Ordering,
            submission: SubmissionOutcome::Accepted,
            watches: vec![
                committed("peer0"),
                WatchOutcome::Invalid {
                    peer: "peer1".into(),
                    code: "ENDORSEMENT_POLICY_FAILURE".to_string(),
                    message: "invalid".to_string(),
                },
            ],
        };

        let first = wording().render_report(&report);
        let second = wording().render_report(&report);
        assert_eq!(first, second);
    }

    #[test]
    fn test_outcome_body_shape() {
        let body = serde_json::to_value(OperationOutcome::failure("boom")).unwrap();
        assert_eq!(body, serde_json::json!({ "success": false, "message": "boom" }));
    }
}
