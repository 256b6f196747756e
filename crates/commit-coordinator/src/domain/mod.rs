//! Domain module for the commit coordinator
//!
//! Pure types and reductions; nothing here performs I/O.
//!
//! - request: change requests and their payloads
//! - endorsement: peer proposal results and the all-good verdict
//! - commit: commit events, matchers and watch outcomes
//! - submission: ordering-service results
//! - outcome: role-tagged aggregation into the final outcome

pub mod commit;
pub mod endorsement;
pub mod outcome;
pub mod request;
pub mod submission;

pub use commit::{CommitEvent, CommitMatcher, WatchOutcome, REQUEST_TIMEOUT, VALID_CODE};
pub use endorsement::{
    Endorsement, EndorsementResult, EndorsementVerdict, Proposal, ProposalResponse,
    ProposalResponses, ResponseContext, STATUS_OK,
};
pub use outcome::{CommitReport, OperationOutcome, OutcomeWording};
pub use request::{
    ChaincodeSpec, ChaincodeType, ChangeRequest, ChannelConfig, ChannelName, ConfigSignature,
    DeployKind, EndorsementPolicy, GenesisBlock, MemberIdentity, Operation, OperationKind,
    OrgName, PeerAddress, TransactionId,
};
pub use submission::{BroadcastResponse, SubmissionOutcome, SubmissionRole, STATUS_SUCCESS};
