//! Endorsement results and the all-good verdict
//!
//! A peer result is good iff it is a response (not an error) carrying
//! [`STATUS_OK`]. Any other status, 4xx and 5xx alike, fails the verdict.

use super::request::{ChannelName, DeployKind, PeerAddress, TransactionId};
use std::fmt;
use uuid::Uuid;

/// The only status a peer may answer with for a change to proceed
pub const STATUS_OK: u32 = 200;

/// Signed attestation of a simulated proposal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endorsement {
    pub endorser: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Structured answer of one peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalResponse {
    pub peer: PeerAddress,
    pub status: u32,
    pub message: String,
    pub payload: Vec<u8>,
    pub endorsement: Option<Endorsement>,
}

/// Outcome of sending a proposal to one peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndorsementResult {
    Response(ProposalResponse),
    Error { peer: PeerAddress, message: String },
}

impl EndorsementResult {
    pub fn ok(peer: impl Into<PeerAddress>, payload: Vec<u8>) -> Self {
        let peer = peer.into();
        Self::Response(ProposalResponse {
            endorsement: Some(Endorsement {
                endorser: peer.as_str().as_bytes().to_vec(),
                signature: Vec::new(),
            }),
            peer,
            status: STATUS_OK,
            message: "OK".to_string(),
            payload,
        })
    }

    pub fn peer(&self) -> &PeerAddress {
        match self {
            Self::Response(response) => &response.peer,
            Self::Error { peer, .. } => peer,
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, Self::Response(response) if response.status == STATUS_OK)
    }
}

/// Handle of the signed proposal, needed again when the transaction is
/// assembled for ordering
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub id: Uuid,
    pub tx_id: TransactionId,
    pub bytes: Vec<u8>,
}

/// Everything a proposal round-trip returns, in request order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalResponses {
    pub responses: Vec<EndorsementResult>,
    pub proposal: Proposal,
}

/// What the responses were collected for; decides the failure wording
#[derive(Clone, Copy, Debug)]
pub enum ResponseContext<'a> {
    Proposal(DeployKind),
    ChannelJoin(&'a ChannelName),
}

impl ResponseContext<'_> {
    fn describe(&self, result: &EndorsementResult) -> String {
        match (self, result) {
            (Self::Proposal(kind), EndorsementResult::Error { peer, message }) => format!(
                "{} proposal resulted in an error :: {}: {}",
                kind.verb(),
                peer,
                message
            ),
            (Self::Proposal(kind), EndorsementResult::Response(response)) => format!(
                "{} proposal was bad for peer {}: status {}, message {}",
                kind.verb(),
                response.peer,
                response.status,
                response.message
            ),
            (Self::ChannelJoin(_), EndorsementResult::Error { peer, message }) => format!(
                "Failed to join peer to the channel with error :: {}: {}",
                peer, message
            ),
            (Self::ChannelJoin(channel), EndorsementResult::Response(response)) => format!(
                "Failed to join peer {} to the channel {}: status {}, message {}",
                response.peer, channel, response.status, response.message
            ),
        }
    }

    fn describe_empty(&self) -> String {
        match self {
            Self::Proposal(kind) => format!("{} proposal received no responses", kind.verb()),
            Self::ChannelJoin(channel) => {
                format!("Failed to join peers to the channel {channel}: no responses")
            }
        }
    }
}

/// Derived verdict over a response sequence.
///
/// Carries the first failure in sequence order; later failures are only
/// counted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndorsementVerdict {
    good: usize,
    bad: usize,
    first_failure: Option<String>,
}

impl EndorsementVerdict {
    pub fn evaluate(context: ResponseContext<'_>, results: &[EndorsementResult]) -> Self {
        if results.is_empty() {
            return Self {
                good: 0,
                bad: 0,
                first_failure: Some(context.describe_empty()),
            };
        }

        let mut verdict = Self {
            good: 0,
            bad: 0,
            first_failure: None,
        };
        for result in results {
            if result.is_good() {
                verdict.good += 1;
                continue;
            }
            verdict.bad += 1;
            if verdict.first_failure.is_none() {
                verdict.first_failure = Some(context.describe(result));
            }
        }
        verdict
    }

    /// Verdict for a proposal call that failed before any peer answered.
    pub fn call_failed(kind: DeployKind, reason: impl fmt::Display) -> Self {
        Self {
            good: 0,
            bad: 0,
            first_failure: Some(format!(
                "{} proposal resulted in an error :: {}",
                kind.verb(),
                reason
            )),
        }
    }

    pub fn all_good(&self) -> bool {
        self.first_failure.is_none()
    }

    pub fn first_failure(&self) -> Option<&str> {
        self.first_failure.as_deref()
    }

    pub fn good(&self) -> usize {
        self.good
    }

    pub fn bad(&self) -> usize {
        self.bad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bad(peer: &str, status: u32) -> EndorsementResult {
        EndorsementResult::Response(ProposalResponse {
            peer: peer.into(),
            status,
            message: format!("status {status}"),
            payload: Vec::new(),
            endorsement: None,
        })
    }

    fn err(peer: &str, message: &str) -> EndorsementResult {
        EndorsementResult::Error {
            peer: peer.into(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_all_ok_is_good() {
        let results = vec![
            EndorsementResult::ok("peer0", vec![]),
            EndorsementResult::ok("peer1", vec![]),
        ];
        let verdict =
            EndorsementVerdict::evaluate(ResponseContext::Proposal(DeployKind::Instantiate), &results);

        assert!(verdict.all_good());
        assert_eq!(verdict.good(), 2);
        assert_eq!(verdict.first_failure(), None);
    }

    #[test]
    fn test_first_failure_wins() {
        let results = vec![
            EndorsementResult::ok("peer0", vec![]),
            bad("peer1", 500),
            err("peer2", "chaincode container crashed"),
        ];
        let verdict =
            EndorsementVerdict::evaluate(ResponseContext::Proposal(DeployKind::Instantiate), &results);

        assert!(!verdict.all_good());
        assert_eq!(verdict.bad(), 2);
        let failure = verdict.first_failure().unwrap();
        assert!(failure.contains("peer1"));
        assert!(failure.contains("status 500"));
        assert!(!failure.contains("peer2"));
    }

    #[test]
    fn test_error_result_wording() {
        let results = vec![err("peer0", "connection refused")];
        let verdict =
            EndorsementVerdict::evaluate(ResponseContext::Proposal(DeployKind::Upgrade), &results);

        assert_eq!(
            verdict.first_failure(),
            Some("upgrade proposal resulted in an error :: peer0: connection refused")
        );
    }

    #[test]
    fn test_client_error_status_is_bad_too() {
        let results = vec![bad("peer0", 404)];
        let verdict =
            EndorsementVerdict::evaluate(ResponseContext::Proposal(DeployKind::Instantiate), &results);
        assert!(!verdict.all_good());
    }

    #[test]
    fn test_empty_sequence_is_not_good() {
        let verdict =
            EndorsementVerdict::evaluate(ResponseContext::Proposal(DeployKind::Instantiate), &[]);
        assert!(!verdict.all_good());
    }

    #[test]
    fn test_join_wording() {
        let channel = ChannelName::from("mychannel");
        let results = vec![bad("peer1", 500)];
        let verdict = EndorsementVerdict::evaluate(ResponseContext::ChannelJoin(&channel), &results);

        let failure = verdict.first_failure().unwrap();
        assert!(failure.starts_with("Failed to join peer peer1 to the channel mychannel"));
    }
}
