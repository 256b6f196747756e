//! Change requests
//!
//! A [`ChangeRequest`] is built once per API call, after the client context
//! has handed out a transaction id, and is never mutated afterwards.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Channel (ledger partition) name
    ChannelName
);
string_id!(
    /// Network address of a peer, e.g. `peer0.org1.example.com:7051`
    PeerAddress
);
string_id!(
    /// Organisation name as known to the connection profile
    OrgName
);

/// Transaction identifier.
///
/// Hex-encoded SHA-256 over `nonce || creator`, the derivation the network
/// uses to bind a transaction to its submitter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn derive(nonce: &[u8], creator: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(nonce);
        hasher.update(creator);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chaincode runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChaincodeType {
    Golang,
    Node,
    Java,
}

impl fmt::Display for ChaincodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Golang => "golang",
            Self::Node => "node",
            Self::Java => "java",
        };
        f.write_str(name)
    }
}

/// A principal that may sign an endorsement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub role: String,
    pub msp_id: String,
}

impl MemberIdentity {
    pub fn member(msp_id: impl Into<String>) -> Self {
        Self {
            role: "member".to_string(),
            msp_id: msp_id.into(),
        }
    }
}

/// `n-of` endorsement policy over a list of identities.
///
/// `signed_by` holds indexes into `identities`; at least `required` of those
/// principals must endorse for the ledger to accept the transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementPolicy {
    pub identities: Vec<MemberIdentity>,
    pub required: usize,
    pub signed_by: Vec<usize>,
}

impl EndorsementPolicy {
    /// Policy applied when a deployment does not carry its own:
    /// 2 of {Org1MSP, Org3MSP} members.
    pub fn default_consortium() -> Self {
        Self {
            identities: vec![
                MemberIdentity::member("Org1MSP"),
                MemberIdentity::member("Org2MSP"),
                MemberIdentity::member("Org3MSP"),
            ],
            required: 2,
            signed_by: vec![0, 2],
        }
    }

    /// Structural check, run before the proposal leaves the client.
    pub fn validate(&self) -> Result<(), String> {
        if self.required == 0 {
            return Err("endorsement policy requires at least one signature".to_string());
        }
        if self.required > self.signed_by.len() {
            return Err(format!(
                "endorsement policy requires {} of only {} principals",
                self.required,
                self.signed_by.len()
            ));
        }
        if let Some(index) = self
            .signed_by
            .iter()
            .find(|&&index| index >= self.identities.len())
        {
            return Err(format!(
                "endorsement policy references unknown identity index {index}"
            ));
        }
        Ok(())
    }
}

impl Default for EndorsementPolicy {
    fn default() -> Self {
        Self::default_consortium()
    }
}

/// What to deploy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeSpec {
    pub name: String,
    pub version: String,
    pub chaincode_type: ChaincodeType,
    /// Init function; omitted means the chaincode's default init
    pub function: Option<String>,
    pub args: Vec<String>,
    pub endorsement_policy: Option<EndorsementPolicy>,
}

impl ChaincodeSpec {
    /// The policy that goes on the wire.
    pub fn effective_policy(&self) -> EndorsementPolicy {
        self.endorsement_policy.clone().unwrap_or_default()
    }
}

/// Instantiate and upgrade share one flow; only the proposal kind differs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployKind {
    Instantiate,
    Upgrade,
}

impl DeployKind {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Instantiate => "instantiate",
            Self::Upgrade => "upgrade",
        }
    }
}

/// Genesis block bytes fetched from the orderer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisBlock(pub Vec<u8>);

/// Channel configuration update extracted from an envelope
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig(pub Vec<u8>);

/// Signature over a [`ChannelConfig`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigSignature {
    pub signer: String,
    pub signature: Vec<u8>,
}

/// Operation-specific payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Deploy {
        kind: DeployKind,
        chaincode: ChaincodeSpec,
    },
    JoinChannel {
        genesis_block: GenesisBlock,
    },
    Reconfigure {
        config: ChannelConfig,
        signatures: Vec<ConfigSignature>,
    },
}

/// Discriminant of [`Operation`], used for logging and metric labels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Instantiate,
    Upgrade,
    JoinChannel,
    Reconfigure,
}

impl OperationKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Instantiate => "instantiate",
            Self::Upgrade => "upgrade",
            Self::JoinChannel => "join_channel",
            Self::Reconfigure => "update_anchor_peers",
        }
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Deploy {
                kind: DeployKind::Instantiate,
                ..
            } => OperationKind::Instantiate,
            Self::Deploy {
                kind: DeployKind::Upgrade,
                ..
            } => OperationKind::Upgrade,
            Self::JoinChannel { .. } => OperationKind::JoinChannel,
            Self::Reconfigure { .. } => OperationKind::Reconfigure,
        }
    }
}

/// One state change, bound to a transaction id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRequest {
    tx_id: TransactionId,
    channel: ChannelName,
    org: OrgName,
    targets: Vec<PeerAddress>,
    operation: Operation,
}

impl ChangeRequest {
    pub fn new(
        tx_id: TransactionId,
        channel: ChannelName,
        org: OrgName,
        targets: Vec<PeerAddress>,
        operation: Operation,
    ) -> Self {
        Self {
            tx_id,
            channel,
            org,
            targets,
            operation,
        }
    }

    pub fn tx_id(&self) -> &TransactionId {
        &self.tx_id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn org(&self) -> &OrgName {
        &self.org
    }

    pub fn targets(&self) -> &[PeerAddress] {
        &self.targets
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_id_is_deterministic_sha256_hex() {
        let a = TransactionId::derive(b"nonce", b"admin@Org1MSP");
        let b = TransactionId::derive(b"nonce", b"admin@Org1MSP");
        let c = TransactionId::derive(b"other", b"admin@Org1MSP");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_default_policy_is_valid_two_of() {
        let policy = EndorsementPolicy::default();
        assert_eq!(policy.required, 2);
        assert_eq!(policy.identities.len(), 3);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_rejects_out_of_range_index() {
        let policy = EndorsementPolicy {
            identities: vec![MemberIdentity::member("Org1MSP")],
            required: 1,
            signed_by: vec![3],
        };
        assert!(policy.validate().unwrap_err().contains("index 3"));
    }

    #[test]
    fn test_policy_rejects_unreachable_threshold() {
        let policy = EndorsementPolicy {
            identities: vec![MemberIdentity::member("Org1MSP")],
            required: 2,
            signed_by: vec![0],
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_chaincode_type_serializes_lowercase() {
        let json = serde_json::to_string(&ChaincodeType::Golang).unwrap();
        assert_eq!(json, "\"golang\"");
    }
}
