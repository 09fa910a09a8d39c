//! Hybrid encryption of the private environment.
//!
//! ## Scheme
//!
//! - A fresh 256-bit content key (CEK) per call, never retained.
//! - The CEK is wrapped with AES-256-GCM under a key-encryption key derived
//!   by HKDF-SHA256 from an ephemeral P-256 ECDH agreement with the
//!   environment's KMS public key. The HKDF info carries the application id.
//! - The payload is encrypted with AES-256-GCM under the CEK. The AAD is the
//!   encoded protected header, which names the application id, so a blob
//!   cannot be replayed against another application.
//!
//! ## Format
//!
//! JWE-style compact serialisation, all parts base64url without padding:
//! `header.encrypted_key.iv.ciphertext.tag`

use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;
use p256::{PublicKey, SecretKey};
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, NONCE_LEN};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use sealcraft_core::config::KmsKeys;
use sealcraft_core::error::{Result, SealError};
use serde::{Deserialize, Serialize};

use super::envfile::{EnvFile, EnvSplit};

/// Key management algorithm named in the protected header.
pub const KEY_ALGORITHM: &str = "ECDH-ES+A256GCMKW";

/// Content encryption algorithm named in the protected header.
pub const CONTENT_ALGORITHM: &str = "A256GCM";

/// Salt for HKDF key derivation.
const HKDF_SALT: &[u8] = b"sealcraft-env-v1";

const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

/// Authenticated header bound to every blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: String,
    pub enc: String,
    /// Ephemeral public key, SEC1 uncompressed, base64url
    pub epk: String,
    /// Key-wrap nonce, base64url
    pub iv: String,
    /// Key-wrap tag, base64url
    pub tag: String,
    /// Application the blob is bound to
    #[serde(rename = "appId")]
    pub app_id: String,
}

/// Output of [`EnvironmentEncryptor::split_and_encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentPayload {
    /// UTF-8 JSON object of public variables
    pub public_env: Vec<u8>,
    /// Compact-serialised encrypted private variables
    pub encrypted_env: Vec<u8>,
}

/// Encrypts environments under one KMS encryption key.
#[derive(Debug, Clone)]
pub struct EnvironmentEncryptor {
    recipient: PublicKey,
}

impl EnvironmentEncryptor {
    /// Parse a PEM (SPKI) P-256 public key.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let recipient = PublicKey::from_public_key_pem(pem.trim())
            .map_err(|e| SealError::Crypto(format!("invalid KMS encryption key: {}", e)))?;
        Ok(Self { recipient })
    }

    pub fn from_kms_keys(keys: &KmsKeys) -> Result<Self> {
        Self::from_pem(&keys.encryption_public_key_pem)
    }

    /// Read an optional env file, split it, and encrypt the private half.
    pub fn split_and_encrypt(
        &self,
        env_file: Option<&Path>,
        app_id: &str,
        instance_type: &str,
    ) -> Result<EnvironmentPayload> {
        let split = match env_file {
            Some(path) => EnvFile::load(path)?.split(),
            None => EnvSplit::default(),
        };
        self.encrypt_split(&split, app_id, instance_type)
    }

    /// Encrypt an already split environment.
    pub fn encrypt_split(
        &self,
        split: &EnvSplit,
        app_id: &str,
        instance_type: &str,
    ) -> Result<EnvironmentPayload> {
        let public_env = serde_json::to_vec(&split.public_with_machine_type(instance_type))?;
        let private = serde_json::to_vec(&split.private)?;
        let encrypted_env = self.encrypt(app_id, &private)?;

        tracing::debug!(
            app_id = %app_id,
            public = split.public.len(),
            private = split.private.len(),
            "Encrypted environment"
        );

        Ok(EnvironmentPayload {
            public_env,
            encrypted_env: encrypted_env.into_bytes(),
        })
    }

    /// Encrypt `plaintext` for `app_id`. Two calls never produce the same
    /// output.
    pub fn encrypt(&self, app_id: &str, plaintext: &[u8]) -> Result<String> {
        if app_id.trim().is_empty() {
            return Err(SealError::Validation("application id must not be empty".to_string()));
        }

        let rng = SystemRandom::new();

        let ephemeral = p256::ecdh::EphemeralSecret::random(&mut rand::rngs::OsRng);
        let epk = ephemeral.public_key().to_encoded_point(false);
        let shared = ephemeral.diffie_hellman(&self.recipient);
        let kek = derive_kek(shared.raw_secret_bytes().as_slice(), app_id)?;

        let mut cek = [0u8; KEY_LEN];
        fill_random(&rng, &mut cek)?;

        // Wrap the content key
        let wrap_nonce = random_nonce(&rng)?;
        let mut wrapped = cek.to_vec();
        let wrap_tag = seal(&kek, wrap_nonce, app_id.as_bytes(), &mut wrapped)?;

        let header = ProtectedHeader {
            alg: KEY_ALGORITHM.to_string(),
            enc: CONTENT_ALGORITHM.to_string(),
            epk: URL_SAFE_NO_PAD.encode(epk.as_bytes()),
            iv: URL_SAFE_NO_PAD.encode(wrap_nonce),
            tag: URL_SAFE_NO_PAD.encode(wrap_tag),
            app_id: app_id.to_string(),
        };
        let encoded_header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);

        // Encrypt the payload, authenticated by the header
        let content_nonce = random_nonce(&rng)?;
        let mut ciphertext = plaintext.to_vec();
        let content_tag = seal(&cek, content_nonce, encoded_header.as_bytes(), &mut ciphertext)?;

        Ok(format!(
            "{}.{}.{}.{}.{}",
            encoded_header,
            URL_SAFE_NO_PAD.encode(&wrapped),
            URL_SAFE_NO_PAD.encode(content_nonce),
            URL_SAFE_NO_PAD.encode(&ciphertext),
            URL_SAFE_NO_PAD.encode(content_tag),
        ))
    }
}

/// Decrypt a blob produced by [`EnvironmentEncryptor::encrypt`].
///
/// Fails unless the blob was produced for `app_id` and the KMS key pair.
pub fn decrypt(secret: &SecretKey, app_id: &str, blob: &str) -> Result<Vec<u8>> {
    let parts: Vec<&str> = blob.trim().split('.').collect();
    let [header_b64, wrapped_b64, iv_b64, ct_b64, tag_b64] = parts.as_slice() else {
        return Err(SealError::Crypto(format!(
            "expected 5 compact parts, found {}",
            parts.len()
        )));
    };

    let header: ProtectedHeader = serde_json::from_slice(&b64(header_b64)?)?;
    if header.alg != KEY_ALGORITHM || header.enc != CONTENT_ALGORITHM {
        return Err(SealError::Crypto(format!(
            "unsupported algorithms {}/{}",
            header.alg, header.enc
        )));
    }
    if header.app_id != app_id {
        return Err(SealError::Crypto(format!(
            "blob is bound to application '{}', not '{}'",
            header.app_id, app_id
        )));
    }

    let epk = PublicKey::from_sec1_bytes(&b64(&header.epk)?)
        .map_err(|e| SealError::Crypto(format!("invalid ephemeral key: {}", e)))?;
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), epk.as_affine());
    let kek = derive_kek(shared.raw_secret_bytes().as_slice(), app_id)?;

    let mut wrapped = b64(wrapped_b64)?;
    wrapped.extend_from_slice(&b64(&header.tag)?);
    let cek = open(&kek, nonce_from(&b64(&header.iv)?)?, app_id.as_bytes(), wrapped)?;

    let mut ciphertext = b64(ct_b64)?;
    ciphertext.extend_from_slice(&b64(tag_b64)?);
    open(&cek, nonce_from(&b64(iv_b64)?)?, header_b64.as_bytes(), ciphertext)
}

// ============================================================================
// Primitives
// ============================================================================

/// Derive the key-encryption key from the ECDH shared secret.
fn derive_kek(shared_secret: &[u8], app_id: &str) -> Result<[u8; KEY_LEN]> {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT);
    let prk = salt.extract(shared_secret);
    let info = [KEY_ALGORITHM.as_bytes(), app_id.as_bytes()];
    let okm = prk
        .expand(&info, HkdfLen(KEY_LEN))
        .map_err(|_| SealError::Crypto("HKDF expand failed".to_string()))?;

    let mut key = [0u8; KEY_LEN];
    okm.fill(&mut key)
        .map_err(|_| SealError::Crypto("HKDF fill failed".to_string()))?;
    Ok(key)
}

/// AES-256-GCM in place; returns the detached tag.
fn seal(
    key: &[u8],
    nonce: [u8; NONCE_LEN],
    aad: &[u8],
    in_out: &mut Vec<u8>,
) -> Result<[u8; TAG_LEN]> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| SealError::Crypto("Failed to create AES-256-GCM key".to_string()))?;
    let mut sealing_key = aead::SealingKey::new(unbound, SingleNonce::new(nonce));
    let tag = sealing_key
        .seal_in_place_separate_tag(Aad::from(aad), in_out)
        .map_err(|_| SealError::Crypto("AES-256-GCM seal failed".to_string()))?;

    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(tag.as_ref());
    Ok(out)
}

/// Inverse of [`seal`]; `in_out` is ciphertext followed by the tag.
fn open(key: &[u8], nonce: [u8; NONCE_LEN], aad: &[u8], mut in_out: Vec<u8>) -> Result<Vec<u8>> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| SealError::Crypto("Failed to create AES-256-GCM key".to_string()))?;
    let mut opening_key = aead::OpeningKey::new(unbound, SingleNonce::new(nonce));
    let plaintext = opening_key
        .open_in_place(Aad::from(aad), &mut in_out)
        .map_err(|_| SealError::Crypto("decryption failed: wrong key or tampered data".to_string()))?;
    Ok(plaintext.to_vec())
}

fn fill_random(rng: &SystemRandom, buf: &mut [u8]) -> Result<()> {
    rng.fill(buf)
        .map_err(|_| SealError::Crypto("Failed to generate random bytes".to_string()))
}

fn random_nonce(rng: &SystemRandom) -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(rng, &mut nonce)?;
    Ok(nonce)
}

fn nonce_from(bytes: &[u8]) -> Result<[u8; NONCE_LEN]> {
    bytes
        .try_into()
        .map_err(|_| SealError::Crypto(format!("nonce must be {} bytes", NONCE_LEN)))
}

fn b64(part: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| SealError::Crypto(format!("invalid base64url: {}", e)))
}

/// A NonceSequence that yields a single nonce then fails.
struct SingleNonce {
    nonce: Option<[u8; NONCE_LEN]>,
}

impl SingleNonce {
    fn new(nonce: [u8; NONCE_LEN]) -> Self {
        Self { nonce: Some(nonce) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// HKDF output length wrapper for ring.
struct HkdfLen(usize);

impl hkdf::KeyType for HkdfLen {
    fn len(&self) -> usize {
        self.0
    }
}
