//! Provenance verification.
//!
//! The service answers `verify` with its own verdict. A `Verified` verdict
//! is only accepted after checking locally that the build's provenance
//! statement names the same image, repository and commit, and that the
//! statement carries a valid ECDSA P-256 signature from the environment's
//! KMS signing key. A bad or missing signature downgrades the verdict to
//! `Failed`; only transport failures are errors.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use sealcraft_core::build::{BuildIdentifier, BuildRecord, ProvenanceVerificationResult};
use sealcraft_core::config::KmsKeys;
use sealcraft_core::digest::Digest;
use sealcraft_core::error::{Result, SealError};

use super::api::BuildApi;

/// Verifies build provenance against the KMS signing key.
pub struct ProvenanceVerifier {
    api: Arc<dyn BuildApi>,
    key: VerifyingKey,
}

impl ProvenanceVerifier {
    pub fn new(api: Arc<dyn BuildApi>, signing_public_key_pem: &str) -> Result<Self> {
        let key = VerifyingKey::from_public_key_pem(signing_public_key_pem.trim())
            .map_err(|e| SealError::Crypto(format!("invalid signing public key: {}", e)))?;
        Ok(Self { api, key })
    }

    pub fn from_kms_keys(api: Arc<dyn BuildApi>, keys: &KmsKeys) -> Result<Self> {
        Self::new(api, &keys.signing_public_key_pem)
    }

    /// Verify the build named by `identifier`.
    pub async fn verify(&self, identifier: &BuildIdentifier) -> Result<ProvenanceVerificationResult> {
        let verdict = self.api.verify(identifier).await?;

        let build_id = match &verdict {
            ProvenanceVerificationResult::Failed { error, build_id } => {
                tracing::info!(identifier = %identifier, build_id = ?build_id, error = %error, "Provenance not verified");
                return Ok(verdict);
            }
            ProvenanceVerificationResult::Verified { build_id, .. } => build_id.clone(),
        };

        let record = self.api.get(&build_id).await?;
        match self.check(identifier, &verdict, &record) {
            Ok(()) => {
                tracing::info!(identifier = %identifier, build_id = %build_id, "Provenance verified");
                Ok(verdict)
            }
            Err(reason) => {
                tracing::warn!(identifier = %identifier, build_id = %build_id, reason = %reason, "Provenance rejected");
                Ok(ProvenanceVerificationResult::failed(reason, Some(build_id)))
            }
        }
    }

    fn check(
        &self,
        identifier: &BuildIdentifier,
        verdict: &ProvenanceVerificationResult,
        record: &BuildRecord,
    ) -> std::result::Result<(), String> {
        let ProvenanceVerificationResult::Verified {
            image_digest,
            repo_url,
            git_ref,
            provenance_signature,
            ..
        } = verdict
        else {
            return Err("verdict is not verified".to_string());
        };

        let digest = Digest::decode_lenient(image_digest)
            .map_err(|_| format!("malformed image digest '{}'", image_digest))?;
        match identifier {
            BuildIdentifier::ImageDigest(wanted) if *wanted != digest => {
                return Err(format!("verified image {} is not the requested {}", digest, wanted));
            }
            BuildIdentifier::CommitSha(sha) if !sha.as_str().eq_ignore_ascii_case(git_ref) => {
                return Err(format!("verified commit {} is not the requested {}", git_ref, sha));
            }
            _ => {}
        }

        let statement = record
            .provenance_json
            .as_deref()
            .ok_or_else(|| "build has no provenance statement".to_string())?;
        check_statement(statement, &digest, repo_url, git_ref)?;

        if provenance_signature.trim().is_empty() {
            return Err("missing provenance signature".to_string());
        }
        let signature = decode_signature(provenance_signature)?;
        self.key
            .verify(statement.as_bytes(), &signature)
            .map_err(|_| "invalid provenance signature".to_string())
    }
}

/// The signed statement must describe the artifact the verdict names.
fn check_statement(
    statement: &str,
    digest: &Digest,
    repo_url: &str,
    git_ref: &str,
) -> std::result::Result<(), String> {
    let value: serde_json::Value =
        serde_json::from_str(statement).map_err(|e| format!("unreadable provenance statement: {}", e))?;
    let field = |name: &str| value.get(name).and_then(|v| v.as_str()).unwrap_or_default().to_string();

    let stated_digest = field("imageDigest");
    if Digest::decode_lenient(&stated_digest).ok().as_ref() != Some(digest) {
        return Err(format!("provenance names image '{}', expected {}", stated_digest, digest));
    }
    let stated_repo = field("repoUrl");
    if stated_repo != repo_url {
        return Err(format!("provenance names repository '{}', expected {}", stated_repo, repo_url));
    }
    let stated_ref = field("gitRef");
    if !stated_ref.eq_ignore_ascii_case(git_ref) {
        return Err(format!("provenance names commit '{}', expected {}", stated_ref, git_ref));
    }
    Ok(())
}

/// Signatures are base64 (or hex) of either DER or fixed-size `r || s`.
fn decode_signature(encoded: &str) -> std::result::Result<Signature, String> {
    let encoded = encoded.trim();
    // Hex text is also valid base64, so both decodings are candidates.
    let candidates: Vec<Vec<u8>> = [STANDARD.decode(encoded).ok(), hex::decode(encoded).ok()]
        .into_iter()
        .flatten()
        .collect();
    if candidates.is_empty() {
        return Err("provenance signature is not base64 or hex".to_string());
    }
    candidates
        .iter()
        .find_map(|bytes| {
            Signature::from_der(bytes)
                .or_else(|_| Signature::from_slice(bytes))
                .ok()
        })
        .ok_or_else(|| "malformed provenance signature".to_string())
}
