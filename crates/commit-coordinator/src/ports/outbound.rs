//! Driven Ports (SPI - Outbound Dependencies)
//!
//! The coordinator sees the network only through these traits. A client
//! context is produced per request and never shared between requests.

use crate::domain::{
    BroadcastResponse, ChaincodeSpec, ChannelConfig, ChannelName, CommitEvent, ConfigSignature,
    DeployKind, EndorsementPolicy, EndorsementResult, GenesisBlock, OrgName, PeerAddress,
    Proposal, ProposalResponses, TransactionId,
};
use crate::error::CoordinatorResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces an authenticated client context for a requester.
///
/// Identity enrollment and credential stores live behind this port.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn client_for_org(
        &self,
        org: &OrgName,
        username: &str,
    ) -> CoordinatorResult<Arc<dyn LedgerClient>>;
}

/// Per-request client context
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Channel handle from the connection profile, `None` if undefined
    fn channel(&self, name: &ChannelName) -> Option<Arc<dyn ChannelGateway>>;

    /// Fresh transaction id bound to the client's admin identity
    fn new_transaction_id(&self) -> TransactionId;

    /// Pull the config update out of a config transaction envelope
    fn extract_channel_config(&self, envelope: &[u8]) -> CoordinatorResult<ChannelConfig>;

    /// Sign a config update with the client's identity
    fn sign_channel_config(&self, config: &ChannelConfig) -> CoordinatorResult<ConfigSignature>;

    /// Broadcast a signed config update to the ordering service
    async fn update_channel(
        &self,
        request: ChannelUpdateRequest,
    ) -> CoordinatorResult<BroadcastResponse>;
}

/// Instantiate/upgrade proposal
#[derive(Clone, Debug)]
pub struct DeployProposalRequest {
    pub kind: DeployKind,
    pub tx_id: TransactionId,
    pub targets: Vec<PeerAddress>,
    pub chaincode: ChaincodeSpec,
    pub endorsement_policy: EndorsementPolicy,
}

/// Endorsed transaction for the orderer
///
/// Carries the same tx id as the proposal so the envelope is signed by the
/// same identity.
#[derive(Clone, Debug)]
pub struct TransactionRequest {
    pub tx_id: TransactionId,
    pub proposal: Proposal,
    pub responses: Vec<EndorsementResult>,
}

/// Join proposal for the target peers
#[derive(Clone, Debug)]
pub struct JoinRequest {
    pub tx_id: TransactionId,
    pub targets: Vec<PeerAddress>,
    pub genesis_block: GenesisBlock,
}

/// Signed channel configuration update
#[derive(Clone, Debug)]
pub struct ChannelUpdateRequest {
    pub channel: ChannelName,
    pub tx_id: TransactionId,
    pub config: ChannelConfig,
    pub signatures: Vec<ConfigSignature>,
}

/// One channel as seen by a client context
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    fn name(&self) -> &ChannelName;

    /// Send the proposal to every target; results come back in target order
    async fn send_deploy_proposal(
        &self,
        request: DeployProposalRequest,
    ) -> CoordinatorResult<ProposalResponses>;

    /// Broadcast the endorsed transaction to the ordering service
    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> CoordinatorResult<BroadcastResponse>;

    /// Fetch the channel's genesis block from the ordering service
    async fn genesis_block(&self, tx_id: TransactionId) -> CoordinatorResult<GenesisBlock>;

    /// Ask the target peers to join the channel
    async fn join_channel(&self, request: JoinRequest) -> CoordinatorResult<Vec<EndorsementResult>>;

    /// Event sources of the client's own organisation on this channel
    fn event_sources_for_org(&self) -> Vec<Arc<dyn EventSource>>;

    /// Release every connection the handle holds
    fn close(&self);
}

/// A peer's commit event service
#[async_trait]
pub trait EventSource: Send + Sync {
    fn peer_address(&self) -> &PeerAddress;

    /// Open an exclusively-owned event connection.
    ///
    /// Events committed after this returns are guaranteed to be delivered
    /// on the connection.
    async fn connect(&self) -> CoordinatorResult<Box<dyn EventConnection>>;
}

/// Live connection to a peer's event service
#[async_trait]
pub trait EventConnection: Send {
    /// Next event, or an error when the stream fails or ends
    async fn next_event(&mut self) -> CoordinatorResult<CommitEvent>;

    /// Close the connection. Calling it more than once is a no-op.
    fn disconnect(&mut self);
}
