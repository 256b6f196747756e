//! # Commit Coordinator Service
//!
//! Drives one change request through
//! `Validating → Gated | Arming → Submitting → Joining → Done`.
//!
//! ```text
//! EndorsementCollector ──not all good──→ Gated ─────────────────┐
//!        │ all good / not required                              │
//!        ▼                                                      ▼
//! CommitListener::arm_all ──→ join!(submit, resolve_all, settle) ──→ Done
//! ```
//!
//! Listener connects all complete before the submission call starts.

mod endorsement;
mod listener;
mod submitter;


pub use endorsement::{EndorsementCollector, EndorsementPhase};
pub use listener::{ArmedListener, CommitListener};
pub use submitter::OrderSubmitter;

use crate::config::CoordinatorConfig;
use crate::domain::{
    ChangeRequest, ChannelName, CommitMatcher, CommitReport, DeployKind, EndorsementVerdict,
    Operation, OperationKind, OperationOutcome, OutcomeWording,
};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::metrics;
use crate::ports::inbound::{
    AnchorPeerUpdateRequest, CommitCoordinatorApi, DeployChaincodeRequest, JoinChannelRequest,
    Requester,
};
use crate::ports::outbound::{ChannelGateway, ClientProvider, LedgerClient};
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, Instrument};

/// Where a change request ended up
#[derive(Debug)]
enum Conclusion {
    /// Stopped at the endorsement gate; nothing was armed or submitted
    Gated(EndorsementVerdict),
    /// Went through submission; every sub-result is in the report
    Reported(CommitReport),
}

/// Channel handle that is closed when dropped
struct OpenChannel {
    gateway: Arc<dyn ChannelGateway>,
}

impl Deref for OpenChannel {
    type Target = dyn ChannelGateway;

    fn deref(&self) -> &Self::Target {
        self.gateway.as_ref()
    }
}

impl Drop for OpenChannel {
    fn drop(&mut self) {
        self.gateway.close();
    }
}

/// Commit coordinator
///
/// Holds no per-request state; concurrent calls share only the client
/// provider.
pub struct CommitCoordinator<P>
where
    P: ClientProvider,
{
    config: CoordinatorConfig,
    clients: Arc<P>,
    collector: EndorsementCollector,
    listener: CommitListener,
    submitter: OrderSubmitter,
}

impl<P> CommitCoordinator<P>
where
    P: ClientProvider,
{
    pub fn new(config: CoordinatorConfig, clients: Arc<P>) -> Self {
        Self {
            collector: EndorsementCollector::new(config.proposal_timeout),
            listener: CommitListener::new(config.listener_timeout),
            submitter: OrderSubmitter::new(),
            config,
            clients,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    async fn open_channel(
        &self,
        requester: &Requester,
        name: &ChannelName,
    ) -> CoordinatorResult<(Arc<dyn LedgerClient>, OpenChannel)> {
        let client = self
            .clients
            .client_for_org(&requester.org, &requester.username)
            .await?;
        let gateway = client
            .channel(name)
            .ok_or_else(|| CoordinatorError::ChannelNotFound {
                channel: name.to_string(),
            })?;
        debug!(channel = %name, org = %requester.org, "Channel handle opened");
        Ok((client, OpenChannel { gateway }))
    }

    /// Run an already-built change request to its conclusion inside its
    /// own span.
    async fn execute(
        &self,
        client: &dyn LedgerClient,
        channel: &dyn ChannelGateway,
        change: ChangeRequest,
    ) -> Conclusion {
        let span = info_span!(
            "change_request",
            operation = change.kind().label(),
            channel = %change.channel(),
            org = %change.org(),
            tx_id = %change.tx_id(),
        );
        self.run_phases(client, channel, change).instrument(span).await
    }

    async fn run_phases(
        &self,
        client: &dyn LedgerClient,
        channel: &dyn ChannelGateway,
        change: ChangeRequest,
    ) -> Conclusion {
        // Validating
        let endorsed = match self.collector.collect(channel, &change).await {
            EndorsementPhase::Rejected(verdict) => return Conclusion::Gated(verdict),
            EndorsementPhase::Endorsed(responses) => Some(responses),
            EndorsementPhase::NotRequired => None,
        };

        // Arming
        let armed = match matcher_for(&change) {
            Some(matcher) => {
                self.listener
                    .arm_all(&channel.event_sources_for_org(), &matcher)
                    .await
            }
            None => Vec::new(),
        };
        debug!(
            tx_id = %change.tx_id(),
            listeners = armed.len(),
            "Commit listeners armed"
        );

        let settle = match change.kind() {
            OperationKind::JoinChannel => self.config.join_settle_delay,
            _ => Duration::ZERO,
        };

        // Submitting + Joining
        let ((role, submission), watches, ()) = tokio::join!(
            self.submitter.submit(client, channel, &change, endorsed),
            CommitListener::resolve_all(armed),
            tokio::time::sleep(settle),
        );

        Conclusion::Reported(CommitReport {
            role,
            submission,
            watches,
        })
    }

    /// Done: render and record the outcome.
    fn conclude(
        &self,
        kind: OperationKind,
        wording: &OutcomeWording,
        result: CoordinatorResult<Conclusion>,
    ) -> OperationOutcome {
        let outcome = match result {
            Ok(Conclusion::Reported(report)) => wording.render_report(&report),
            Ok(Conclusion::Gated(verdict)) => {
                wording.render(verdict.first_failure().map(str::to_string))
            }
            Err(e) => wording.render(Some(e.to_string())),
        };

        if outcome.success {
            info!(operation = kind.label(), "{}", outcome.message);
        } else {
            error!(operation = kind.label(), "{}", outcome.message);
        }
        metrics::record_outcome(kind.label(), outcome.success);
        outcome
    }

    async fn deploy(
        &self,
        kind: DeployKind,
        request: DeployChaincodeRequest,
    ) -> CoordinatorResult<Conclusion> {
        let (client, channel) = self
            .open_channel(&request.requester, &request.channel)
            .await?;
        let change = ChangeRequest::new(
            client.new_transaction_id(),
            request.channel,
            request.requester.org,
            request.peers,
            Operation::Deploy {
                kind,
                chaincode: request.chaincode,
            },
        );
        info!(
            channel = %change.channel(),
            tx_id = %change.tx_id(),
            "Deploying chaincode ({})",
            kind.verb()
        );
        Ok(self.execute(client.as_ref(), &*channel, change).await)
    }

    async fn join(&self, request: JoinChannelRequest) -> CoordinatorResult<Conclusion> {
        let (client, channel) = self
            .open_channel(&request.requester, &request.channel)
            .await?;
        let genesis_block = channel.genesis_block(client.new_transaction_id()).await?;
        debug!(
            channel = %request.channel,
            bytes = genesis_block.0.len(),
            "Fetched genesis block"
        );

        let change = ChangeRequest::new(
            client.new_transaction_id(),
            request.channel,
            request.requester.org,
            request.peers,
            Operation::JoinChannel { genesis_block },
        );
        Ok(self.execute(client.as_ref(), &*channel, change).await)
    }

    async fn reconfigure(
        &self,
        request: AnchorPeerUpdateRequest,
    ) -> CoordinatorResult<Conclusion> {
        let (client, channel) = self
            .open_channel(&request.requester, &request.channel)
            .await?;
        let config = client.extract_channel_config(&request.config_envelope)?;
        let signature = client.sign_channel_config(&config)?;

        let change = ChangeRequest::new(
            client.new_transaction_id(),
            request.channel,
            request.requester.org,
            Vec::new(),
            Operation::Reconfigure {
                config,
                signatures: vec![signature],
            },
        );
        Ok(self.execute(client.as_ref(), &*channel, change).await)
    }
}

/// Which commit signal confirms `change`, if any.
///
/// Joining peers are not channel members yet, so a join has nothing to
/// listen on.
fn matcher_for(change: &ChangeRequest) -> Option<CommitMatcher> {
    match change.operation() {
        Operation::Deploy { kind, .. } => Some(CommitMatcher::Transaction {
            tx_id: change.tx_id().clone(),
            kind: *kind,
        }),
        Operation::Reconfigure { .. } => Some(CommitMatcher::NextBlock),
        Operation::JoinChannel { .. } => None,
    }
}

#[async_trait]
impl<P> CommitCoordinatorApi for CommitCoordinator<P>
where
    P: ClientProvider + 'static,
{
    async fn instantiate_chaincode(&self, request: DeployChaincodeRequest) -> OperationOutcome {
        let wording = OutcomeWording::for_operation(
            OperationKind::Instantiate,
            &request.requester.org,
            &request.channel,
        );
        let result = self.deploy(DeployKind::Instantiate, request).await;
        self.conclude(OperationKind::Instantiate, &wording, result)
    }

    async fn upgrade_chaincode(&self, request: DeployChaincodeRequest) -> OperationOutcome {
        let wording = OutcomeWording::for_operation(
            OperationKind::Upgrade,
            &request.requester.org,
            &request.channel,
        );
        let result = self.deploy(DeployKind::Upgrade, request).await;
        self.conclude(OperationKind::Upgrade, &wording, result)
    }

    async fn join_channel(&self, request: JoinChannelRequest) -> OperationOutcome {
        let wording = OutcomeWording::for_operation(
            OperationKind::JoinChannel,
            &request.requester.org,
            &request.channel,
        );
        let result = self.join(request).await;
        self.conclude(OperationKind::JoinChannel, &wording, result)
    }

    async fn update_anchor_peers(&self, request: AnchorPeerUpdateRequest) -> OperationOutcome {
        let wording = OutcomeWording::for_operation(
            OperationKind::Reconfigure,
            &request.requester.org,
            &request.channel,
        );
        let result = self.reconfigure(request).await;
        self.conclude(OperationKind::Reconfigure, &wording, result)
    }
}
