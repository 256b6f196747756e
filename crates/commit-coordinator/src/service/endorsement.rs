//! Endorsement collector
//!
//! Sends a deployment proposal to every target peer and gates the flow on
//! the all-good verdict.

use crate::domain::{
    ChangeRequest, EndorsementResult, EndorsementVerdict, Operation, ProposalResponses,
    ResponseContext,
};
use crate::metrics;
use crate::ports::outbound::{ChannelGateway, DeployProposalRequest};
use std::time::Duration;
use tracing::{debug, error, info};

/// Result of the validating step
#[derive(Debug)]
pub enum EndorsementPhase {
    /// The operation does not go through endorsement
    NotRequired,
    /// Every peer endorsed; the responses are needed for submission
    Endorsed(ProposalResponses),
    /// At least one peer failed; the flow stops here
    Rejected(EndorsementVerdict),
}

/// Collects and judges proposal responses
#[derive(Clone, Debug)]
pub struct EndorsementCollector {
    proposal_timeout: Duration,
}

impl EndorsementCollector {
    pub fn new(proposal_timeout: Duration) -> Self {
        Self { proposal_timeout }
    }

    pub async fn collect(
        &self,
        channel: &dyn ChannelGateway,
        change: &ChangeRequest,
    ) -> EndorsementPhase {
        let Operation::Deploy { kind, chaincode } = change.operation() else {
            return EndorsementPhase::NotRequired;
        };
        let kind = *kind;

        let endorsement_policy = chaincode.effective_policy();
        if let Err(reason) = endorsement_policy.validate() {
            metrics::record_endorsement_rejected(change.kind().label());
            return EndorsementPhase::Rejected(EndorsementVerdict::call_failed(kind, reason));
        }

        let request = DeployProposalRequest {
            kind,
            tx_id: change.tx_id().clone(),
            targets: change.targets().to_vec(),
            chaincode: chaincode.clone(),
            endorsement_policy,
        };
        debug!(
            channel = %change.channel(),
            tx_id = %change.tx_id(),
            chaincode = %chaincode.name,
            version = %chaincode.version,
            targets = change.targets().len(),
            "Sending {} proposal",
            kind.verb()
        );

        let responses = match tokio::time::timeout(
            self.proposal_timeout,
            channel.send_deploy_proposal(request),
        )
        .await
        {
            Ok(Ok(responses)) => responses,
            Ok(Err(e)) => {
                error!(tx_id = %change.tx_id(), error = %e, "{} proposal failed", kind.verb());
                metrics::record_endorsement_rejected(change.kind().label());
                return EndorsementPhase::Rejected(EndorsementVerdict::call_failed(kind, e));
            }
            Err(_) => {
                let reason = format!(
                    "no answer within {}ms",
                    self.proposal_timeout.as_millis()
                );
                error!(tx_id = %change.tx_id(), "{} proposal timed out", kind.verb());
                metrics::record_endorsement_rejected(change.kind().label());
                return EndorsementPhase::Rejected(EndorsementVerdict::call_failed(kind, reason));
            }
        };

        for result in &responses.responses {
            match result {
                EndorsementResult::Response(response) if result.is_good() => {
                    info!(peer = %response.peer, "{} proposal was good", kind.verb())
                }
                EndorsementResult::Response(response) => error!(
                    peer = %response.peer,
                    status = response.status,
                    "{} proposal was bad: {}",
                    kind.verb(),
                    response.message
                ),
                EndorsementResult::Error { peer, message } => error!(
                    peer = %peer,
                    "{} proposal resulted in an error: {}",
                    kind.verb(),
                    message
                ),
            }
        }

        let verdict =
            EndorsementVerdict::evaluate(ResponseContext::Proposal(kind), &responses.responses);
        if verdict.all_good() {
            info!(
                tx_id = %change.tx_id(),
                endorsements = verdict.good(),
                "Successfully sent proposal and received proposal responses"
            );
            EndorsementPhase::Endorsed(responses)
        } else {
            metrics::record_endorsement_rejected(change.kind().label());
            EndorsementPhase::Rejected(verdict)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryNetwork, PeerScript};
    use crate::domain::{
        ChaincodeSpec, ChaincodeType, DeployKind, EndorsementPolicy, GenesisBlock,
        MemberIdentity, TransactionId,
    };
    use crate::ports::outbound::{ClientProvider, LedgerClient};
    use std::sync::Arc;

    fn spec() -> ChaincodeSpec {
        ChaincodeSpec {
            name: "energyblocks".to_string(),
            version: "v0".to_string(),
            chaincode_type: ChaincodeType::Node,
            function: None,
            args: vec![],
            endorsement_policy: None,
        }
    }

    fn deploy(peers: &[&str], chaincode: ChaincodeSpec) -> ChangeRequest {
        ChangeRequest::new(
            TransactionId::derive(b"n", b"admin"),
            "mychannel".into(),
            "Org1".into(),
            peers.iter().map(|p| (*p).into()).collect(),
            Operation::Deploy {
                kind: DeployKind::Instantiate,
                chaincode,
            },
        )
    }

    async fn channel(net: &InMemoryNetwork) -> Arc<dyn ChannelGateway> {
        let client: Arc<dyn LedgerClient> =
            net.client_for_org(&"Org1".into(), "admin").await.unwrap();
        client.channel(&"mychannel".into()).unwrap()
    }

    #[tokio::test]
    async fn test_all_endorsed() {
        let net = InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_peer("peer0", "Org1", PeerScript::default())
            .with_peer("peer1", "Org1", PeerScript::default());
        let channel = channel(&net).await;
        let collector = EndorsementCollector::new(Duration::from_secs(300));

        let phase = collector
            .collect(channel.as_ref(), &deploy(&["peer0", "peer1"], spec()))
            .await;

        let EndorsementPhase::Endorsed(responses) = phase else {
            panic!("expected endorsement, got {phase:?}");
        };
        assert_eq!(responses.responses.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_status_rejects() {
        let net = InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_peer("peer0", "Org1", PeerScript::default())
            .with_peer(
                "peer1",
                "Org1",
                PeerScript::default().endorsement_status(500, "chaincode init failed"),
            );
        let channel = channel(&net).await;
        let collector = EndorsementCollector::new(Duration::from_secs(300));

        let phase = collector
            .collect(channel.as_ref(), &deploy(&["peer0", "peer1"], spec()))
            .await;

        let EndorsementPhase::Rejected(verdict) = phase else {
            panic!("expected rejection, got {phase:?}");
        };
        assert!(verdict.first_failure().unwrap().contains("chaincode init failed"));
    }

    #[tokio::test]
    async fn test_invalid_policy_never_leaves_client() {
        let net = InMemoryNetwork::new()
            .with_channel("mychannel")
            .with_peer("peer0", "Org1", PeerScript::default());
        let channel = channel(&net).await;
        let collector = EndorsementCollector::new(Duration::from_secs(300));
        let mut chaincode = spec();
        chaincode.endorsement_policy = Some(EndorsementPolicy {
            identities: vec![MemberIdentity::member("Org1MSP")],
            required: 1,
            signed_by: vec![5],
        });

        let phase = collector
            .collect(channel.as_ref(), &deploy(&["peer0"], chaincode))
            .await;

        assert!(matches!(phase, EndorsementPhase::Rejected(_)));
        assert!(net.trace().entries().is_empty());
    }

    #[tokio::test]
    async fn test_join_needs_no_endorsement() {
        let net = InMemoryNetwork::new().with_channel("mychannel");
        let channel = channel(&net).await;
        let collector = EndorsementCollector::new(Duration::from_secs(300));
        let change = ChangeRequest::new(
            TransactionId::derive(b"n", b"admin"),
            "mychannel".into(),
            "Org1".into(),
            vec![],
            Operation::JoinChannel {
                genesis_block: GenesisBlock(vec![1]),
            },
        );

        let phase = collector.collect(channel.as_ref(), &change).await;
        assert!(matches!(phase, EndorsementPhase::NotRequired));
    }
}
