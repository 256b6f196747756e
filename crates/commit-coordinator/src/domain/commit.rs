//! Commit events and per-peer watch outcomes

use super::request::{DeployKind, PeerAddress, TransactionId};
use std::fmt;

/// Validation code a peer attaches to a committed transaction
pub const VALID_CODE: &str = "VALID";

/// Prefix of the failure reported when a peer never confirms in time
pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";

/// Notification delivered by a peer's event source
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitEvent {
    /// A transaction reached a terminal status inside a block
    Transaction {
        tx_id: TransactionId,
        code: String,
        block_number: u64,
    },
    /// A block was appended to the peer's ledger
    Block { number: u64 },
}

/// What a listener waits for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitMatcher {
    /// A specific deployment transaction reaching a terminal status
    Transaction {
        tx_id: TransactionId,
        kind: DeployKind,
    },
    /// Any next block, used for configuration updates
    NextBlock,
}

impl CommitMatcher {
    pub fn matches(&self, event: &CommitEvent) -> bool {
        match (self, event) {
            (Self::Transaction { tx_id, .. }, CommitEvent::Transaction { tx_id: seen, .. }) => {
                tx_id == seen
            }
            (Self::NextBlock, CommitEvent::Block { .. }) => true,
            _ => false,
        }
    }

    /// Turn a matching event into the watch outcome.
    ///
    /// Callers check [`matches`](Self::matches) first.
    pub fn resolve(&self, peer: &PeerAddress, event: &CommitEvent) -> WatchOutcome {
        match (self, event) {
            (Self::Transaction { kind, .. }, CommitEvent::Transaction { code, .. })
                if code == VALID_CODE =>
            {
                WatchOutcome::Committed {
                    peer: peer.clone(),
                    message: format!("The chaincode {} transaction was valid.", kind.verb()),
                }
            }
            (Self::Transaction { kind, .. }, CommitEvent::Transaction { code, .. }) => {
                WatchOutcome::Invalid {
                    peer: peer.clone(),
                    code: code.clone(),
                    message: format!(
                        "The chaincode {} transaction was invalid, code:{}",
                        kind.verb(),
                        code
                    ),
                }
            }
            (_, CommitEvent::Block { .. }) => WatchOutcome::Committed {
                peer: peer.clone(),
                message: format!("The config update has been committed on peer {peer}"),
            },
            (Self::NextBlock, CommitEvent::Transaction { .. }) => WatchOutcome::Failed {
                peer: peer.clone(),
                reason: "transaction event delivered to a block watch".to_string(),
            },
        }
    }
}

impl fmt::Display for CommitMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction { tx_id, .. } => write!(f, "tx {tx_id}"),
            Self::NextBlock => f.write_str("next block"),
        }
    }
}

/// Result of one commit watch; produced exactly once per armed listener
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchOutcome {
    Committed {
        peer: PeerAddress,
        message: String,
    },
    Invalid {
        peer: PeerAddress,
        code: String,
        message: String,
    },
    TimedOut {
        peer: PeerAddress,
    },
    Failed {
        peer: PeerAddress,
        reason: String,
    },
}

impl WatchOutcome {
    pub fn peer(&self) -> &PeerAddress {
        match self {
            Self::Committed { peer, .. }
            | Self::Invalid { peer, .. }
            | Self::TimedOut { peer }
            | Self::Failed { peer, .. } => peer,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Message surfaced when this watch decides the operation's failure.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Committed { .. } => None,
            Self::Invalid { message, .. } => Some(message.clone()),
            Self::TimedOut { peer } => Some(format!("{REQUEST_TIMEOUT}:{peer}")),
            Self::Failed { reason, .. } => Some(reason.clone()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Committed { .. } => "committed",
            Self::Invalid { .. } => "invalid",
            Self::TimedOut { .. } => "timeout",
            Self::Failed { .. } => "error",
        }
    }
}
