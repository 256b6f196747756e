//! In-memory ledger network
//!
//! Implements every outbound port against scripted peers and a scripted
//! orderer. Commit events are fanned out over one `broadcast` channel per
//! peer, so an event sent before a listener connected is lost, the same way
//! a real peer's event service behaves.
//!
//! Every network-visible call is appended to a [`CallTrace`], which tests
//! use to check ordering (connects before submission, one disconnect per
//! connection).

use crate::domain::{
    BroadcastResponse, ChannelConfig, ChannelName, CommitEvent, ConfigSignature,
    EndorsementResult, GenesisBlock, OrgName, PeerAddress, Proposal, ProposalResponse,
    ProposalResponses, TransactionId, VALID_CODE,
};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ports::outbound::{
    ChannelGateway, ChannelUpdateRequest, ClientProvider, DeployProposalRequest,
    EventConnection, EventSource, JoinRequest, LedgerClient, TransactionRequest,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const EVENT_BUFFER: usize = 64;

/// How a peer answers a proposal (deploy or join)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposalScript {
    Endorse,
    Status { status: u32, message: String },
    Error(String),
}

/// What a peer's event service emits once a change is ordered
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitScript {
    /// Transaction committed with `VALID`, followed by its block
    Valid,
    /// Transaction committed with the given validation code
    Invalid(String),
    /// Nothing is ever delivered
    Silent,
    /// The event stream fails with the given reason
    Fault(String),
}

/// Scripted behaviour of one peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerScript {
    pub endorsement: ProposalScript,
    pub join: ProposalScript,
    pub commit: CommitScript,
    /// When set, connecting to the event service fails with this reason
    pub connect_error: Option<String>,
}

impl Default for PeerScript {
    fn default() -> Self {
        Self {
            endorsement: ProposalScript::Endorse,
            join: ProposalScript::Endorse,
            commit: CommitScript::Valid,
            connect_error: None,
        }
    }
}

impl PeerScript {
    pub fn endorsement_status(mut self, status: u32, message: impl Into<String>) -> Self {
        self.endorsement = ProposalScript::Status {
            status,
            message: message.into(),
        };
        self
    }

    pub fn endorsement_error(mut self, message: impl Into<String>) -> Self {
        self.endorsement = ProposalScript::Error(message.into());
        self
    }

    pub fn join_status(mut self, status: u32, message: impl Into<String>) -> Self {
        self.join = ProposalScript::Status {
            status,
            message: message.into(),
        };
        self
    }

    pub fn commit(mut self, commit: CommitScript) -> Self {
        self.commit = commit;
        self
    }

    pub fn connect_error(mut self, reason: impl Into<String>) -> Self {
        self.connect_error = Some(reason.into());
        self
    }
}

/// Scripted ordering service
#[derive(Clone, Debug)]
pub struct OrdererScript {
    /// Answer to endorsed transactions; `Err` is a transport failure
    pub transaction: Result<BroadcastResponse, String>,
    /// Answer to channel config updates
    pub config_update: Result<BroadcastResponse, String>,
    /// Answer to genesis block fetches
    pub genesis: Result<Vec<u8>, String>,
    /// Time the orderer takes to answer, after commits were already fanned out
    pub latency: Duration,
}

impl Default for OrdererScript {
    fn default() -> Self {
        Self {
            transaction: Ok(BroadcastResponse::success()),
            config_update: Ok(BroadcastResponse::success()),
            genesis: Ok(b"genesis".to_vec()),
            latency: Duration::ZERO,
        }
    }
}

/// One network-visible call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEntry {
    Proposal { targets: Vec<PeerAddress> },
    Connect(PeerAddress),
    Disconnect(PeerAddress),
    SubmitTransaction(TransactionId),
    GenesisFetch,
    JoinCall { targets: Vec<PeerAddress> },
    ChannelUpdate(TransactionId),
    ChannelClosed(ChannelName),
}

/// Shared, append-only record of calls
#[derive(Clone, Debug, Default)]
pub struct CallTrace(Arc<Mutex<Vec<TraceEntry>>>);

impl CallTrace {
    fn push(&self, entry: TraceEntry) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        self.0.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.count(|e| matches!(e, TraceEntry::Connect(_)))
    }

    pub fn disconnects_of(&self, peer: &PeerAddress) -> usize {
        self.count(|e| matches!(e, TraceEntry::Disconnect(p) if p == peer))
    }

    pub fn submissions(&self) -> usize {
        self.count(|e| {
            matches!(
                e,
                TraceEntry::SubmitTransaction(_)
                    | TraceEntry::JoinCall { .. }
                    | TraceEntry::ChannelUpdate(_)
            )
        })
    }

    pub fn channel_closes(&self) -> usize {
        self.count(|e| matches!(e, TraceEntry::ChannelClosed(_)))
    }

    /// True when every connect happened before the first submission call.
    pub fn connects_precede_submission(&self) -> bool {
        let entries = self.entries();
        let Some(first_submit) = entries.iter().position(|e| {
            matches!(
                e,
                TraceEntry::SubmitTransaction(_) | TraceEntry::ChannelUpdate(_)
            )
        }) else {
            return true;
        };
        !entries[first_submit..]
            .iter()
            .any(|e| matches!(e, TraceEntry::Connect(_)))
    }

    fn count(&self, predicate: impl Fn(&TraceEntry) -> bool) -> usize {
        self.0.lock().iter().filter(|e| predicate(e)).count()
    }
}

#[derive(Clone, Debug)]
enum PeerSignal {
    Event(CommitEvent),
    Fault(String),
}

struct PeerNode {
    address: PeerAddress,
    org: OrgName,
    script: PeerScript,
    events: broadcast::Sender<PeerSignal>,
}

struct NetworkState {
    peers: RwLock<Vec<PeerNode>>,
    channels: RwLock<HashSet<ChannelName>>,
    users: RwLock<Option<HashSet<(OrgName, String)>>>,
    orderer: RwLock<OrdererScript>,
    block_height: AtomicU64,
    trace: CallTrace,
}

/// Scripted in-memory network; cheap to clone, clones share state
#[derive(Clone)]
pub struct InMemoryNetwork {
    state: Arc<NetworkState>,
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::new(NetworkState {
                peers: RwLock::new(Vec::new()),
                channels: RwLock::new(HashSet::new()),
                users: RwLock::new(None),
                orderer: RwLock::new(OrdererScript::default()),
                block_height: AtomicU64::new(1),
                trace: CallTrace::default(),
            }),
        }
    }

    pub fn with_channel(self, channel: impl Into<ChannelName>) -> Self {
        self.state.channels.write().insert(channel.into());
        self
    }

    pub fn with_peer(
        self,
        address: impl Into<PeerAddress>,
        org: impl Into<OrgName>,
        script: PeerScript,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        self.state.peers.write().push(PeerNode {
            address: address.into(),
            org: org.into(),
            script,
            events,
        });
        self
    }

    pub fn with_orderer(self, orderer: OrdererScript) -> Self {
        *self.state.orderer.write() = orderer;
        self
    }

    /// Restrict client contexts to registered users.
    ///
    /// Without any registration every user is accepted.
    pub fn with_user(self, org: impl Into<OrgName>, username: impl Into<String>) -> Self {
        self.state
            .users
            .write()
            .get_or_insert_with(HashSet::new)
            .insert((org.into(), username.into()));
        self
    }

    pub fn trace(&self) -> CallTrace {
        self.state.trace.clone()
    }

    fn peer_script(&self, address: &PeerAddress) -> Option<PeerScript> {
        self.state
            .peers
            .read()
            .iter()
            .find(|p| &p.address == address)
            .map(|p| p.script.clone())
    }

    fn answer(script: Option<PeerScript>, peer: &PeerAddress, join: bool) -> EndorsementResult {
        let Some(script) = script else {
            return EndorsementResult::Error {
                peer: peer.clone(),
                message: "peer not found in connection profile".to_string(),
            };
        };
        let proposal = if join { script.join } else { script.endorsement };
        match proposal {
            ProposalScript::Endorse => EndorsementResult::ok(peer.clone(), Vec::new()),
            ProposalScript::Status { status, message } => {
                EndorsementResult::Response(ProposalResponse {
                    peer: peer.clone(),
                    status,
                    message,
                    payload: Vec::new(),
                    endorsement: None,
                })
            }
            ProposalScript::Error(message) => EndorsementResult::Error {
                peer: peer.clone(),
                message,
            },
        }
    }

    /// Fan out what each peer emits for a freshly ordered block.
    fn commit_block(&self, tx_id: Option<&TransactionId>) {
        let number = self.state.block_height.fetch_add(1, Ordering::SeqCst);
        let peers = self.state.peers.read();
        for peer in peers.iter() {
            let signals = match (&peer.script.commit, tx_id) {
                (CommitScript::Silent, _) => Vec::new(),
                (CommitScript::Fault(reason), _) => vec![PeerSignal::Fault(reason.clone())],
                (CommitScript::Valid, Some(tx_id)) => vec![
                    PeerSignal::Event(CommitEvent::Transaction {
                        tx_id: tx_id.clone(),
                        code: VALID_CODE.to_string(),
                        block_number: number,
                    }),
                    PeerSignal::Event(CommitEvent::Block { number }),
                ],
                (CommitScript::Invalid(code), Some(tx_id)) => vec![
                    PeerSignal::Event(CommitEvent::Transaction {
                        tx_id: tx_id.clone(),
                        code: code.clone(),
                        block_number: number,
                    }),
                    PeerSignal::Event(CommitEvent::Block { number }),
                ],
                (_, None) => vec![PeerSignal::Event(CommitEvent::Block { number })],
            };
            for signal in signals {
                // No receiver means nobody is listening; the event is lost.
                let _ = peer.events.send(signal);
            }
        }
    }
}

#[async_trait]
impl ClientProvider for InMemoryNetwork {
    async fn client_for_org(
        &self,
        org: &OrgName,
        username: &str,
    ) -> CoordinatorResult<Arc<dyn LedgerClient>> {
        if let Some(users) = self.state.users.read().as_ref() {
            if !users.contains(&(org.clone(), username.to_string())) {
                return Err(CoordinatorError::ClientUnavailable {
                    org: org.to_string(),
                    reason: format!("User was not found: {username}"),
                });
            }
        }
        Ok(Arc::new(InMemoryClient {
            network: self.clone(),
            org: org.clone(),
            identity: format!("{username}@{org}"),
        }))
    }
}

/// Client context handed out by [`InMemoryNetwork`]
pub struct InMemoryClient {
    network: InMemoryNetwork,
    org: OrgName,
    identity: String,
}

#[async_trait]
impl LedgerClient for InMemoryClient {
    fn channel(&self, name: &ChannelName) -> Option<Arc<dyn ChannelGateway>> {
        if !self.network.state.channels.read().contains(name) {
            return None;
        }
        Some(Arc::new(InMemoryChannel {
            network: self.network.clone(),
            name: name.clone(),
            org: self.org.clone(),
        }))
    }

    fn new_transaction_id(&self) -> TransactionId {
        let mut nonce = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut nonce);
        TransactionId::derive(&nonce, self.identity.as_bytes())
    }

    fn extract_channel_config(&self, envelope: &[u8]) -> CoordinatorResult<ChannelConfig> {
        if envelope.is_empty() {
            return Err(CoordinatorError::Internal {
                reason: "config envelope is empty".to_string(),
            });
        }
        Ok(ChannelConfig(envelope.to_vec()))
    }

    fn sign_channel_config(&self, config: &ChannelConfig) -> CoordinatorResult<ConfigSignature> {
        let mut hasher = Sha256::new();
        hasher.update(&config.0);
        hasher.update(self.identity.as_bytes());
        Ok(ConfigSignature {
            signer: self.identity.clone(),
            signature: hasher.finalize().to_vec(),
        })
    }

    async fn update_channel(
        &self,
        request: ChannelUpdateRequest,
    ) -> CoordinatorResult<BroadcastResponse> {
        self.network
            .state
            .trace
            .push(TraceEntry::ChannelUpdate(request.tx_id.clone()));
        let orderer = self.network.state.orderer.read().clone();

        let response = orderer
            .config_update
            .map_err(|reason| CoordinatorError::Ordering { reason })?;
        if response.is_success() {
            self.network.commit_block(None);
        }
        tokio::time::sleep(orderer.latency).await;
        Ok(response)
    }
}

/// Channel handle handed out by [`InMemoryClient`]
pub struct InMemoryChannel {
    network: InMemoryNetwork,
    name: ChannelName,
    org: OrgName,
}

#[async_trait]
impl ChannelGateway for InMemoryChannel {
    fn name(&self) -> &ChannelName {
        &self.name
    }

    async fn send_deploy_proposal(
        &self,
        request: DeployProposalRequest,
    ) -> CoordinatorResult<ProposalResponses> {
        self.network.state.trace.push(TraceEntry::Proposal {
            targets: request.targets.clone(),
        });
        let responses = request
            .targets
            .iter()
            .map(|peer| InMemoryNetwork::answer(self.network.peer_script(peer), peer, false))
            .collect();

        Ok(ProposalResponses {
            responses,
            proposal: Proposal {
                id: Uuid::new_v4(),
                tx_id: request.tx_id,
                bytes: request.chaincode.name.into_bytes(),
            },
        })
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> CoordinatorResult<BroadcastResponse> {
        self.network
            .state
            .trace
            .push(TraceEntry::SubmitTransaction(request.tx_id.clone()));
        let orderer = self.network.state.orderer.read().clone();

        let response = orderer
            .transaction
            .map_err(|reason| CoordinatorError::Ordering { reason })?;
        if response.is_success() {
            // Commits land before the orderer's answer does.
            self.network.commit_block(Some(&request.tx_id));
        }
        tokio::time::sleep(orderer.latency).await;
        Ok(response)
    }

    async fn genesis_block(&self, _tx_id: TransactionId) -> CoordinatorResult<GenesisBlock> {
        self.network.state.trace.push(TraceEntry::GenesisFetch);
        let genesis = self.network.state.orderer.read().genesis.clone();
        genesis
            .map(GenesisBlock)
            .map_err(|reason| CoordinatorError::Ordering { reason })
    }

    async fn join_channel(&self, request: JoinRequest) -> CoordinatorResult<Vec<EndorsementResult>> {
        self.network.state.trace.push(TraceEntry::JoinCall {
            targets: request.targets.clone(),
        });
        Ok(request
            .targets
            .iter()
            .map(|peer| InMemoryNetwork::answer(self.network.peer_script(peer), peer, true))
            .collect())
    }

    fn event_sources_for_org(&self) -> Vec<Arc<dyn EventSource>> {
        self.network
            .state
            .peers
            .read()
            .iter()
            .filter(|p| p.org == self.org)
            .map(|p| {
                Arc::new(InMemoryEventSource {
                    address: p.address.clone(),
                    connect_error: p.script.connect_error.clone(),
                    events: p.events.clone(),
                    trace: self.network.state.trace.clone(),
                }) as Arc<dyn EventSource>
            })
            .collect()
    }

    fn close(&self) {
        debug!(channel = %self.name, "Closing in-memory channel");
        self.network
            .state
            .trace
            .push(TraceEntry::ChannelClosed(self.name.clone()));
    }
}

/// Event service of one in-memory peer
pub struct InMemoryEventSource {
    address: PeerAddress,
    connect_error: Option<String>,
    events: broadcast::Sender<PeerSignal>,
    trace: CallTrace,
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    fn peer_address(&self) -> &PeerAddress {
        &self.address
    }

    async fn connect(&self) -> CoordinatorResult<Box<dyn EventConnection>> {
        if let Some(reason) = &self.connect_error {
            return Err(CoordinatorError::EventSource {
                peer: self.address.to_string(),
                reason: reason.clone(),
            });
        }
        let receiver = self.events.subscribe();
        self.trace.push(TraceEntry::Connect(self.address.clone()));
        Ok(Box::new(InMemoryEventConnection {
            peer: self.address.clone(),
            receiver,
            connected: true,
            trace: self.trace.clone(),
        }))
    }
}

struct InMemoryEventConnection {
    peer: PeerAddress,
    receiver: broadcast::Receiver<PeerSignal>,
    connected: bool,
    trace: CallTrace,
}

#[async_trait]
impl EventConnection for InMemoryEventConnection {
    async fn next_event(&mut self) -> CoordinatorResult<CommitEvent> {
        if !self.connected {
            return Err(CoordinatorError::EventStreamClosed {
                peer: self.peer.to_string(),
            });
        }
        loop {
            match self.receiver.recv().await {
                Ok(PeerSignal::Event(event)) => return Ok(event),
                Ok(PeerSignal::Fault(reason)) => {
                    return Err(CoordinatorError::EventSource {
                        peer: self.peer.to_string(),
                        reason,
                    })
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(peer = %self.peer, lagged = count, "Event connection lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(CoordinatorError::EventStreamClosed {
                        peer: self.peer.to_string(),
                    })
                }
            }
        }
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.trace.push(TraceEntry::Disconnect(self.peer.clone()));
        }
    }
}
