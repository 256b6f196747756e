//! Order submitter
//!
//! Performs the one call that plays the submission role for a change:
//! the endorsed transaction for deployments, the peer join call for
//! channel joins, the signed config update for reconfigurations.

use crate::domain::{
    ChangeRequest, EndorsementVerdict, Operation, ProposalResponses, ResponseContext,
    SubmissionOutcome, SubmissionRole,
};
use crate::metrics;
use crate::ports::outbound::{
    ChannelGateway, ChannelUpdateRequest, JoinRequest, LedgerClient, TransactionRequest,
};
use tracing::{debug, error, info};

/// Submits changes to the ordering service (or to the peers, for joins)
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderSubmitter;

impl OrderSubmitter {
    pub fn new() -> Self {
        Self
    }

    /// Submit `change` and classify the answer.
    ///
    /// Transport errors become [`SubmissionOutcome::Failed`]; nothing is
    /// propagated, so the caller can join this with the pending watches.
    pub async fn submit(
        &self,
        client: &dyn LedgerClient,
        channel: &dyn ChannelGateway,
        change: &ChangeRequest,
        endorsed: Option<ProposalResponses>,
    ) -> (SubmissionRole, SubmissionOutcome) {
        let (role, outcome) = match change.operation() {
            Operation::Deploy { .. } => (
                SubmissionRole::Ordering,
                Self::order_transaction(channel, change, endorsed).await,
            ),
            Operation::JoinChannel { genesis_block } => {
                let request = JoinRequest {
                    tx_id: change.tx_id().clone(),
                    targets: change.targets().to_vec(),
                    genesis_block: genesis_block.clone(),
                };
                (
                    SubmissionRole::PeerJoin,
                    Self::join_peers(channel, change, request).await,
                )
            }
            Operation::Reconfigure { config, signatures } => {
                let request = ChannelUpdateRequest {
                    channel: change.channel().clone(),
                    tx_id: change.tx_id().clone(),
                    config: config.clone(),
                    signatures: signatures.clone(),
                };
                (
                    SubmissionRole::ChannelUpdate {
                        channel: change.channel().clone(),
                    },
                    match client.update_channel(request).await {
                        Ok(response) => SubmissionOutcome::from_response(response),
                        Err(e) => SubmissionOutcome::Failed {
                            reason: e.to_string(),
                        },
                    },
                )
            }
        };

        match &outcome {
            SubmissionOutcome::Accepted => {
                info!(tx_id = %change.tx_id(), channel = %change.channel(), "Submission accepted")
            }
            other => error!(
                tx_id = %change.tx_id(),
                channel = %change.channel(),
                "{}",
                other.failure_message(&role).unwrap_or_default()
            ),
        }
        metrics::record_submission(change.kind().label(), outcome.label());
        (role, outcome)
    }

    async fn order_transaction(
        channel: &dyn ChannelGateway,
        change: &ChangeRequest,
        endorsed: Option<ProposalResponses>,
    ) -> SubmissionOutcome {
        let Some(endorsed) = endorsed else {
            return SubmissionOutcome::Failed {
                reason: "no endorsed proposal to order".to_string(),
            };
        };
        let request = TransactionRequest {
            tx_id: change.tx_id().clone(),
            proposal: endorsed.proposal,
            responses: endorsed.responses,
        };
        debug!(tx_id = %change.tx_id(), "Sending endorsed transaction to the orderer");

        match channel.send_transaction(request).await {
            Ok(response) => SubmissionOutcome::from_response(response),
            Err(e) => SubmissionOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    async fn join_peers(
        channel: &dyn ChannelGateway,
        change: &ChangeRequest,
        request: JoinRequest,
    ) -> SubmissionOutcome {
        debug!(
            channel = %change.channel(),
            targets = request.targets.len(),
            "Sending join proposal"
        );
        let results = match channel.join_channel(request).await {
            Ok(results) => results,
            Err(e) => {
                return SubmissionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let verdict =
            EndorsementVerdict::evaluate(ResponseContext::ChannelJoin(change.channel()), &results);
        match verdict.first_failure() {
            None => {
                info!(
                    channel = %change.channel(),
                    peers = verdict.good(),
                    "Successfully joined peers to the channel"
                );
                SubmissionOutcome::Accepted
            }
            Some(reason) => SubmissionOutcome::Failed {
                reason: reason.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryNetwork, OrdererScript, PeerScript, TraceEntry};
    use crate::domain::{
        BroadcastResponse, ChannelConfig, EndorsementResult, GenesisBlock, Proposal,
        TransactionId,
    };
    use crate::ports::outbound::ClientProvider;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn client_and_channel(
        net: &InMemoryNetwork,
    ) -> (Arc<dyn LedgerClient>, Arc<dyn ChannelGateway>) {
        let client = net.client_for_org(&"Org1".into(), "admin").await.unwrap();
        let channel = client.channel(&"mychannel".into()).unwrap();
        (client, channel)
    }

    fn change(operation: Operation, targets: &[&str]) -> ChangeRequest {
        ChangeRequest::new(
            TransactionId::derive(b"n", b"admin"),
            "mychannel".into(),
            "Org1".into(),
            targets.iter().map(|p| (*p).into()).collect(),
            operation,
        )
    }

    fn endorsed(tx_id: &TransactionId) -> ProposalResponses {
        ProposalResponses {
            responses: vec![EndorsementResult::ok("peer0", Vec::new())],
            proposal: Proposal {
                id: Uuid::new_v4(),
                tx_id: tx_id.clone(),
                bytes: Vec::new(),
            },
        }
    }

    fn reconfigure() -> Operation {
        Operation::Reconfigure {
            config: ChannelConfig(b"anchors".to_vec()),
            signatures: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_order_rejection_is_classified() {
        let net = InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_orderer(OrdererScript {
                transaction: Ok(BroadcastResponse::rejected("BAD_REQUEST", "")),
                ..OrdererScript::default()
            });
        let (client, channel) = client_and_channel(&net).await;
        let change = change(
            Operation::Deploy {
                kind: crate::domain::DeployKind::Instantiate,
                chaincode: crate::domain::ChaincodeSpec {
                    name: "energyblocks".to_string(),
                    version: "v0".to_string(),
                    chaincode_type: crate::domain::ChaincodeType::Node,
                    function: None,
                    args: vec![],
                    endorsement_policy: None,
                },
            },
            &["peer0"],
        );

        let (role, outcome) = OrderSubmitter::new()
            .submit(
                client.as_ref(),
                channel.as_ref(),
                &change,
                Some(endorsed(change.tx_id())),
            )
            .await;

        assert_eq!(role, SubmissionRole::Ordering);
        assert_eq!(
            outcome.failure_message(&role).unwrap(),
            "Failed to order the transaction. Error code: BAD_REQUEST"
        );
    }

    #[tokio::test]
    async fn test_join_accepts_when_every_peer_joins() {
        let net = InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_peer("peer0", "Org1", PeerScript::default())
            .with_peer("peer1", "Org1", PeerScript::default());
        let (client, channel) = client_and_channel(&net).await;
        let change = change(
            Operation::JoinChannel {
                genesis_block: GenesisBlock(b"genesis".to_vec()),
            },
            &["peer0", "peer1"],
        );

        let (role, outcome) = OrderSubmitter::new()
            .submit(client.as_ref(), channel.as_ref(), &change, None)
            .await;

        assert_eq!(role, SubmissionRole::PeerJoin);
        assert!(outcome.is_accepted());
        assert_eq!(
            net.trace().entries(),
            vec![TraceEntry::JoinCall {
                targets: vec!["peer0".into(), "peer1".into()]
            }]
        );
    }

    #[tokio::test]
    async fn test_join_reports_first_refusing_peer() {
        let net = InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_peer("peer0", "Org1", PeerScript::default())
            .with_peer(
                "peer1",
                "Org1",
                PeerScript::default().join_status(500, "already joined"),
            );
        let (client, channel) = client_and_channel(&net).await;
        let change = change(
            Operation::JoinChannel {
                genesis_block: GenesisBlock(b"genesis".to_vec()),
            },
            &["peer0", "peer1"],
        );

        let (role, outcome) = OrderSubmitter::new()
            .submit(client.as_ref(), channel.as_ref(), &change, None)
            .await;

        let message = outcome.failure_message(&role).unwrap();
        assert!(message.contains("peer1"));
        assert!(message.contains("already joined"));
    }

    #[tokio::test]
    async fn test_channel_update_rejection_uses_update_wording() {
        let net = InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_orderer(OrdererScript {
                config_update: Ok(BroadcastResponse::rejected("BAD_REQUEST", "stale config")),
                ..OrdererScript::default()
            });
        let (client, channel) = client_and_channel(&net).await;
        let change = change(reconfigure(), &[]);

        let (role, outcome) = OrderSubmitter::new()
            .submit(client.as_ref(), channel.as_ref(), &change, None)
            .await;

        assert_eq!(
            outcome.failure_message(&role).unwrap(),
            "Failed to update anchor peers to the channel mychannel with status: BAD_REQUEST reason: stale config"
        );
    }

    #[tokio::test]
    async fn test_transport_error_becomes_failed() {
        let net = InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_orderer(OrdererScript {
                config_update: Err("orderer unreachable".to_string()),
                ..OrdererScript::default()
            });
        let (client, channel) = client_and_channel(&net).await;
        let change = change(reconfigure(), &[]);

        let (_, outcome) = OrderSubmitter::new()
            .submit(client.as_ref(), channel.as_ref(), &change, None)
            .await;

        let SubmissionOutcome::Failed { reason } = outcome else {
            panic!("expected transport failure, got {outcome:?}");
        };
        assert!(reason.contains("orderer unreachable"));
    }
}
