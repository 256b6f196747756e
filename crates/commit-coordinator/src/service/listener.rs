//! Commit listener
//!
//! Arming connects to a peer's event service and fixes the deadline;
//! resolving waits for the matching event or the deadline, whichever comes
//! first. Both halves are separate so that every listener can be armed
//! before the change is submitted.

use crate::domain::{CommitMatcher, PeerAddress, WatchOutcome};
use crate::metrics;
use crate::ports::outbound::{EventConnection, EventSource};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Arms bounded-time commit watches
#[derive(Clone, Debug)]
pub struct CommitListener {
    timeout: Duration,
}

impl CommitListener {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect to `source` and register `matcher`.
    ///
    /// Returns once the connection is live. A failed connect still yields a
    /// listener, one that resolves straight to the connect error.
    pub async fn arm(&self, source: Arc<dyn EventSource>, matcher: CommitMatcher) -> ArmedListener {
        let peer = source.peer_address().clone();
        let deadline = Instant::now() + self.timeout;

        let state = match source.connect().await {
            Ok(connection) => {
                debug!(peer = %peer, watch = %matcher, "Commit listener armed");
                ArmState::Connected(connection)
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "Commit listener failed to connect");
                ArmState::ConnectFailed(e.to_string())
            }
        };

        ArmedListener {
            peer,
            matcher,
            deadline,
            state,
        }
    }

    /// Arm one listener per source, concurrently.
    ///
    /// Every connect has completed when this returns.
    pub async fn arm_all(
        &self,
        sources: &[Arc<dyn EventSource>],
        matcher: &CommitMatcher,
    ) -> Vec<ArmedListener> {
        join_all(
            sources
                .iter()
                .map(|source| self.arm(Arc::clone(source), matcher.clone())),
        )
        .await
    }

    /// Resolve every armed listener, preserving arming order.
    pub async fn resolve_all(armed: Vec<ArmedListener>) -> Vec<WatchOutcome> {
        join_all(armed.into_iter().map(ArmedListener::resolve)).await
    }
}

enum ArmState {
    Connected(Box<dyn EventConnection>),
    ConnectFailed(String),
    Resolved,
}

/// A connected watch waiting to be resolved.
///
/// Resolution consumes the listener, so it happens at most once; the
/// connection is closed on every path, including when the listener is
/// dropped unresolved.
pub struct ArmedListener {
    peer: PeerAddress,
    matcher: CommitMatcher,
    deadline: Instant,
    state: ArmState,
}

impl ArmedListener {
    pub fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ArmState::Connected(_))
    }

    /// Wait for the matching event or the deadline.
    ///
    /// The connection stays owned by the listener while waiting, so a
    /// resolve future dropped mid-wait still disconnects through `Drop`.
    pub async fn resolve(mut self) -> WatchOutcome {
        let outcome = match &mut self.state {
            ArmState::Connected(connection) => {
                let waited = timeout_at(
                    self.deadline,
                    wait_for_match(connection.as_mut(), &self.matcher, &self.peer),
                )
                .await;
                connection.disconnect();

                match waited {
                    Ok(outcome) => outcome,
                    Err(_) => WatchOutcome::TimedOut {
                        peer: self.peer.clone(),
                    },
                }
            }
            ArmState::ConnectFailed(reason) => WatchOutcome::Failed {
                peer: self.peer.clone(),
                reason: reason.clone(),
            },
            ArmState::Resolved => WatchOutcome::Failed {
                peer: self.peer.clone(),
                reason: "listener already resolved".to_string(),
            },
        };
        self.state = ArmState::Resolved;

        match &outcome {
            WatchOutcome::Committed { message, .. } => {
                info!(peer = %self.peer, "{}", message)
            }
            other => error!(
                peer = %self.peer,
                "{}",
                other.failure_message().unwrap_or_default()
            ),
        }
        metrics::record_watch(outcome.label());
        outcome
    }
}

impl Drop for ArmedListener {
    fn drop(&mut self) {
        if let ArmState::Connected(connection) = &mut self.state {
            debug!(peer = %self.peer, "Disconnecting unresolved commit listener");
            connection.disconnect();
        }
    }
}

async fn wait_for_match(
    connection: &mut dyn EventConnection,
    matcher: &CommitMatcher,
    peer: &PeerAddress,
) -> WatchOutcome {
    loop {
        match connection.next_event().await {
            Ok(event) if matcher.matches(&event) => return matcher.resolve(peer, &event),
            Ok(_) => continue,
            Err(e) => {
                return WatchOutcome::Failed {
                    peer: peer.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CommitScript, InMemoryNetwork, PeerScript, TraceEntry};
    use crate::domain::{DeployKind, Proposal, TransactionId};
    use crate::ports::outbound::{ChannelGateway, ClientProvider, LedgerClient, TransactionRequest};
    use uuid::Uuid;

    const PEER: &str = "peer0.org1:7051";

    async fn channel_for(net: &InMemoryNetwork) -> Arc<dyn ChannelGateway> {
        let client: Arc<dyn LedgerClient> =
            net.client_for_org(&"Org1".into(), "admin").await.unwrap();
        client.channel(&"mychannel".into()).unwrap()
    }

    fn network(commit: CommitScript) -> InMemoryNetwork {
        InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_peer(PEER, "Org1", PeerScript::default().commit(commit))
    }

    fn matcher(tx_id: &TransactionId) -> CommitMatcher {
        CommitMatcher::Transaction {
            tx_id: tx_id.clone(),
            kind: DeployKind::Instantiate,
        }
    }

    async fn submit(channel: &Arc<dyn ChannelGateway>, tx_id: &TransactionId) {
        channel
            .send_transaction(TransactionRequest {
                tx_id: tx_id.clone(),
                proposal: Proposal {
                    id: Uuid::new_v4(),
                    tx_id: tx_id.clone(),
                    bytes: Vec::new(),
                },
                responses: Vec::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_commit_resolves_success() {
        let net = network(CommitScript::Valid);
        let channel = channel_for(&net).await;
        let tx_id = TransactionId::derive(b"n", b"admin");
        let listener = CommitListener::new(Duration::from_secs(60));

        let armed = listener
            .arm_all(&channel.event_sources_for_org(), &matcher(&tx_id))
            .await;
        submit(&channel, &tx_id).await;
        let outcomes = CommitListener::resolve_all(armed).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
        assert_eq!(net.trace().disconnects_of(&PEER.into()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out_and_disconnects_once() {
        let net = network(CommitScript::Silent);
        let channel = channel_for(&net).await;
        let tx_id = TransactionId::derive(b"n", b"admin");
        let listener = CommitListener::new(Duration::from_secs(60));

        let armed = listener
            .arm_all(&channel.event_sources_for_org(), &matcher(&tx_id))
            .await;
        submit(&channel, &tx_id).await;
        let started = Instant::now();
        let outcomes = CommitListener::resolve_all(armed).await;

        assert_eq!(
            outcomes[0],
            WatchOutcome::TimedOut { peer: PEER.into() }
        );
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(net.trace().disconnects_of(&PEER.into()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_fault_resolves_with_error() {
        let net = network(CommitScript::Fault("stream reset".to_string()));
        let channel = channel_for(&net).await;
        let tx_id = TransactionId::derive(b"n", b"admin");
        let listener = CommitListener::new(Duration::from_secs(60));

        let armed = listener
            .arm_all(&channel.event_sources_for_org(), &matcher(&tx_id))
            .await;
        submit(&channel, &tx_id).await;
        let outcomes = CommitListener::resolve_all(armed).await;

        let message = outcomes[0].failure_message().unwrap();
        assert!(message.contains("stream reset"));
        assert_eq!(net.trace().disconnects_of(&PEER.into()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_resolves_immediately() {
        let net = InMemoryNetwork::new().with_channel("mychannel").with_peer(
            PEER,
            "Org1",
            PeerScript::default().connect_error("connection refused"),
        );
        let channel = channel_for(&net).await;
        let listener = CommitListener::new(Duration::from_secs(60));

        let armed = listener
            .arm_all(&channel.event_sources_for_org(), &CommitMatcher::NextBlock)
            .await;
        assert!(!armed[0].is_connected());

        let outcomes = CommitListener::resolve_all(armed).await;
        assert!(outcomes[0]
            .failure_message()
            .unwrap()
            .contains("connection refused"));
        assert_eq!(net.trace().connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_listener_disconnects() {
        let net = network(CommitScript::Valid);
        let channel = channel_for(&net).await;
        let listener = CommitListener::new(Duration::from_secs(60));

        let armed = listener
            .arm_all(&channel.event_sources_for_org(), &CommitMatcher::NextBlock)
            .await;
        drop(armed);

        let entries = net.trace().entries();
        assert_eq!(
            entries,
            vec![
                TraceEntry::Connect(PEER.into()),
                TraceEntry::Disconnect(PEER.into())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_dropped_mid_wait_disconnects() {
        let net = network(CommitScript::Silent);
        let channel = channel_for(&net).await;
        let tx_id = TransactionId::derive(b"n", b"admin");
        let listener = CommitListener::new(Duration::from_secs(60));

        let armed = listener
            .arm_all(&channel.event_sources_for_org(), &matcher(&tx_id))
            .await;
        submit(&channel, &tx_id).await;
        let waited =
            tokio::time::timeout(Duration::from_secs(5), CommitListener::resolve_all(armed)).await;

        assert!(waited.is_err());
        assert_eq!(net.trace().disconnects_of(&PEER.into()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_transactions_are_skipped() {
        let net = network(CommitScript::Valid);
        let channel = channel_for(&net).await;
        let mine = TransactionId::derive(b"mine", b"admin");
        let other = TransactionId::derive(b"other", b"admin");
        let listener = CommitListener::new(Duration::from_secs(60));

        let armed = listener
            .arm_all(&channel.event_sources_for_org(), &matcher(&mine))
            .await;
        submit(&channel, &other).await;
        submit(&channel, &mine).await;
        let outcomes = CommitListener::resolve_all(armed).await;

        assert!(outcomes[0].is_success());
    }
}
