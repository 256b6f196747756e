//! Ordering-service submission results

use super::request::ChannelName;
use std::fmt;

/// Broadcast status meaning the orderer accepted the envelope
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Raw orderer answer to a broadcast
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub status: String,
    pub info: String,
}

impl BroadcastResponse {
    pub fn success() -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            info: String::new(),
        }
    }

    pub fn rejected(status: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            info: info.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Which call played the role of submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionRole {
    /// Endorsed transaction broadcast to the orderer
    Ordering,
    /// Join proposal sent to the target peers
    PeerJoin,
    /// Signed config update broadcast to the orderer
    ChannelUpdate { channel: ChannelName },
}

/// Submission result, independent of endorsement and of commit confirmation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted,
    /// The service answered with a non-success status
    Rejected { status: String, reason: String },
    /// The call itself failed, or its answer could not be used
    Failed { reason: String },
}

impl SubmissionOutcome {
    pub fn from_response(response: BroadcastResponse) -> Self {
        if response.is_success() {
            Self::Accepted
        } else {
            Self::Rejected {
                status: response.status,
                reason: response.info,
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Failed { .. } => "failed",
        }
    }

    /// Message surfaced for a failed submission, worded for its role.
    pub fn failure_message(&self, role: &SubmissionRole) -> Option<String> {
        match (self, role) {
            (Self::Accepted, _) => None,
            (Self::Failed { reason }, _) => Some(reason.clone()),
            (Self::Rejected { status, reason }, SubmissionRole::ChannelUpdate { channel }) => {
                Some(format!(
                    "Failed to update anchor peers to the channel {channel} with status: {status} reason: {reason}"
                ))
            }
            (Self::Rejected { status, reason }, _) if reason.is_empty() => Some(format!(
                "Failed to order the transaction. Error code: {status}"
            )),
            (Self::Rejected { status, reason }, _) => Some(format!(
                "Failed to order the transaction. Error code: {status}, reason: {reason}"
            )),
        }
    }
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => f.write_str(STATUS_SUCCESS),
            Self::Rejected { status, reason } => write!(f, "{status} ({reason})"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response_is_accepted() {
        let outcome = SubmissionOutcome::from_response(BroadcastResponse::success());
        assert!(outcome.is_accepted());
        assert_eq!(outcome.failure_message(&SubmissionRole::Ordering), None);
    }

    #[test]
    fn test_rejection_keeps_reason() {
        let outcome = SubmissionOutcome::from_response(BroadcastResponse::rejected(
            "BAD_REQUEST",
            "NO_SUFFICIENT_ENDORSEMENTS",
        ));
        let message = outcome.failure_message(&SubmissionRole::Ordering).unwrap();
        assert_eq!(
            message,
            "Failed to order the transaction. Error code: BAD_REQUEST, reason: NO_SUFFICIENT_ENDORSEMENTS"
        );
    }

    #[test]
    fn test_channel_update_wording() {
        let outcome = SubmissionOutcome::from_response(BroadcastResponse::rejected(
            "FORBIDDEN",
            "implicit policy evaluation failed",
        ));
        let role = SubmissionRole::ChannelUpdate {
            channel: "mychannel".into(),
        };
        assert_eq!(
            outcome.failure_message(&role).unwrap(),
            "Failed to update anchor peers to the channel mychannel with status: FORBIDDEN reason: implicit policy evaluation failed"
        );
    }
}
