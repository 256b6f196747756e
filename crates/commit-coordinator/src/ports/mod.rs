//! Ports module for the commit coordinator

pub mod inbound;
pub mod outbound;

pub use inbound::{
    AnchorPeerUpdateRequest, CommitCoordinatorApi, DeployChaincodeRequest, JoinChannelRequest,
    Requester,
};
pub use outbound::{
    ChannelGateway, ChannelUpdateRequest, ClientProvider, DeployProposalRequest, EventConnection,
    EventSource, JoinRequest, LedgerClient, TransactionRequest,
};
