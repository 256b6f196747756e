//! # commit-coordinator
//!
//! Client-side coordinator that submits state changes to a permissioned
//! ledger network and reports success only once every relevant peer has
//! confirmed the commit.
//!
//! ## Overview
//!
//! This crate provides:
//! - **Endorsement gate**: a change is ordered only if every target peer endorsed it
//! - **Armed-before-submit listeners**: commit watches are connected before the
//!   orderer sees the transaction, so no commit notification can be missed
//! - **Independent deadlines**: one bounded wait per peer, each torn down exactly once
//! - **Role-tagged aggregation**: one deterministic outcome from partially failing signals
//!
//! ## Architecture
//!
//! ```text
//! Requester ──→ CommitCoordinator
//!                    │
//!                    ├── EndorsementCollector ──proposal──→ target peers
//!                    │
//!                    ├── CommitListener × N ──connect──→ org peers' event services
//!                    │
//!                    └── OrderSubmitter ──────────────→ ordering service
//!                                                            │
//!                    peers commit the block ←────────────────┘
//! ```
//!
//! ## Operations
//!
//! | Operation | Submission | Confirmation |
//! |-----------|------------|--------------|
//! | instantiate / upgrade chaincode | endorsed transaction | tx event on each org peer |
//! | join channel | peer join proposal | none; settle delay |
//! | update anchor peers | signed config update | next block on each org peer |
//!
//! ## Example
//!
//! ```rust,ignore
//! use commit_coordinator::{CommitCoordinator, CoordinatorConfig};
//! use commit_coordinator::ports::inbound::CommitCoordinatorApi;
//!
//! let coordinator = CommitCoordinator::new(CoordinatorConfig::from_env()?, clients);
//!
//! let outcome = coordinator.instantiate_chaincode(request).await;
//! println!("{}", serde_json::to_string(&outcome)?);
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use config::CoordinatorConfig;
pub use domain::{
    ChaincodeSpec, ChaincodeType, ChangeRequest, ChannelName, CommitMatcher, CommitReport,
    EndorsementPolicy, OperationKind, OperationOutcome, OrgName, PeerAddress,
    SubmissionOutcome, TransactionId, WatchOutcome,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use ports::inbound::{
    AnchorPeerUpdateRequest, CommitCoordinatorApi, DeployChaincodeRequest, JoinChannelRequest,
    Requester,
};
pub use ports::outbound::{
    ChannelGateway, ClientProvider, EventConnection, EventSource, LedgerClient,
};
pub use service::{CommitCoordinator, CommitListener, EndorsementCollector, OrderSubmitter};
