//! Driving Ports (API - Inbound)
//!
//! Requests arrive already validated for field presence; every operation
//! returns an [`OperationOutcome`] and never an error.

use crate::domain::{ChaincodeSpec, ChannelName, OperationOutcome, OrgName, PeerAddress};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Authenticated caller, as resolved by the HTTP layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub username: String,
    pub org: OrgName,
}

impl Requester {
    pub fn new(username: impl Into<String>, org: impl Into<OrgName>) -> Self {
        Self {
            username: username.into(),
            org: org.into(),
        }
    }
}

/// Instantiate or upgrade a chaincode on a channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployChaincodeRequest {
    pub channel: ChannelName,
    pub peers: Vec<PeerAddress>,
    pub chaincode: ChaincodeSpec,
    pub requester: Requester,
}

/// Join peers of the requester's organisation to a channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChannelRequest {
    pub channel: ChannelName,
    pub peers: Vec<PeerAddress>,
    pub requester: Requester,
}

/// Apply an anchor-peer config update envelope to a channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorPeerUpdateRequest {
    pub channel: ChannelName,
    pub config_envelope: Vec<u8>,
    pub requester: Requester,
}

impl AnchorPeerUpdateRequest {
    /// Load the envelope from a `.tx` artifact on disk.
    pub fn from_file(
        channel: ChannelName,
        path: impl AsRef<Path>,
        requester: Requester,
    ) -> std::io::Result<Self> {
        Ok(Self {
            channel,
            config_envelope: std::fs::read(path)?,
            requester,
        })
    }
}

/// Primary coordinator API
#[async_trait]
pub trait CommitCoordinatorApi: Send + Sync {
    /// Endorse, order and confirm a chaincode instantiation
    async fn instantiate_chaincode(&self, request: DeployChaincodeRequest) -> OperationOutcome;

    /// Endorse, order and confirm a chaincode upgrade
    async fn upgrade_chaincode(&self, request: DeployChaincodeRequest) -> OperationOutcome;

    /// Fetch the genesis block and have the target peers join the channel
    async fn join_channel(&self, request: JoinChannelRequest) -> OperationOutcome;

    /// Submit a signed anchor-peer update and wait for the next block on
    /// every org peer
    async fn update_anchor_peers(&self, request: AnchorPeerUpdateRequest) -> OperationOutcome;
}
