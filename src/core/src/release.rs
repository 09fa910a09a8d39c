//! Release artifact.
//!
//! A release is the final, immutable description of a deployment: which
//! image (by digest) to run, the public environment in plaintext, the
//! private environment encrypted for the target application, and the time
//! by which the upgrade must be applied.

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// An image the release deploys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Content digest; always exactly 32 bytes.
    pub digest: Digest,
    /// Image name without tag, e.g. `docker.io/acme/app`.
    pub registry: String,
}

/// Deployment artifact handed to the submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub artifacts: Vec<Artifact>,
    /// Unix seconds.
    pub upgrade_by_time: u64,
    /// UTF-8 JSON of the public variables.
    #[serde(with = "hex_bytes")]
    pub public_env: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub encrypted_env: Vec<u8>,
}

impl Release {
    /// The first (and for now only) artifact.
    pub fn primary_artifact(&self) -> Option<&Artifact> {
        self.artifacts.first()
    }
}

/// Submission receipt from the out-of-scope chain client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResult {
    pub tx_hash: String,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}
