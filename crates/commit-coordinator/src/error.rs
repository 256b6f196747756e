//! Error types for the commit coordinator
//!
//! Every variant is recovered inside the coordinator and rendered into an
//! [`OperationOutcome`](crate::domain::OperationOutcome) message; none of
//! them escape to the caller.

use thiserror::Error;

/// Commit coordinator errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// No client context could be produced for the requester
    #[error("Failed to get client for organization {org}: {reason}")]
    ClientUnavailable { org: String, reason: String },

    /// The channel is not part of the client's connection profile
    #[error("Channel {channel} was not defined in the connection profile")]
    ChannelNotFound { channel: String },

    /// The proposal round-trip failed as a whole
    #[error("Proposal failed: {reason}")]
    Proposal { reason: String },

    /// The ordering service could not be reached or answered with an error
    #[error("Ordering service error: {reason}")]
    Ordering { reason: String },

    /// A peer's event source failed
    #[error("Event source error on peer {peer}: {reason}")]
    EventSource { peer: String, reason: String },

    /// A peer's event stream ended before the awaited commit arrived
    #[error("Event stream closed on peer {peer}")]
    EventStreamClosed { peer: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Anything else that went wrong mid-sequence
    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_not_found_message() {
        let err = CoordinatorError::ChannelNotFound {
            channel: "mychannel".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Channel mychannel was not defined in the connection profile"
        );
    }

    #[test]
    fn test_event_source_message_names_peer() {
        let err = CoordinatorError::EventSource {
            peer: "peer0.org1:7051".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("peer0.org1:7051"));
        assert!(err.to_string().contains("connection refused"));
    }
}
