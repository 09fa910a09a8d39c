//! Registry digest lookup.
//!
//! Uses the `oci-distribution` client for the token exchange and the
//! manifest `HEAD` (falling back to `GET`) whose `Docker-Content-Digest`
//! header carries the digest. Used for pre-built images that never went
//! through local layering.

use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::errors::OciDistributionError;
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use sealcraft_core::digest::Digest;
use sealcraft_core::error::{Result, SealError};

use super::docker::is_manifest_missing;
use super::reference::ImageReference;

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Read `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`, falling back to
    /// anonymous if either is unset.
    pub fn from_env() -> Self {
        match (
            std::env::var("REGISTRY_USERNAME").ok(),
            std::env::var("REGISTRY_PASSWORD").ok(),
        ) {
            (Some(u), Some(p)) => Self::basic(u, p),
            _ => Self::anonymous(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.password.is_none()
    }

    /// Convert to oci-distribution auth type.
    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// Resolves tags to digests over the registry HTTP protocol.
pub struct RegistryClient {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryClient {
    pub fn new(auth: RegistryAuth) -> Result<Self> {
        Self::with_insecure_registries(auth, Vec::new())
    }

    /// Client that talks plain HTTP to the listed `host[:port]` registries.
    pub fn with_insecure_registries(auth: RegistryAuth, insecure: Vec<String>) -> Result<Self> {
        let protocol = if insecure.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(insecure)
        };
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        Ok(Self {
            client: Client::new(config),
            auth,
        })
    }

    /// Resolve a reference to the digest the registry reports for it.
    ///
    /// A pinned reference answers without network access. Otherwise the
    /// `Docker-Content-Digest` header must be a lowercase `sha256:` digest.
    pub async fn resolve_digest(&self, reference: &ImageReference) -> Result<Digest> {
        if let Some(pinned) = reference.pinned_digest() {
            return pinned;
        }

        let oci_ref = to_oci_reference(reference)?;
        tracing::debug!(reference = %reference, "Resolving registry digest");

        let value = self
            .client
            .fetch_manifest_digest(&oci_ref, &self.auth.to_oci_auth())
            .await
            .map_err(|e| map_registry_error(reference, e))?;

        let digest = Digest::parse(value.trim())?;
        tracing::info!(reference = %reference, digest = %digest, "Resolved registry digest");
        Ok(digest)
    }
}

/// Convert an ImageReference to an oci-distribution Reference.
fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let ref_str = match reference.tag {
        Some(ref tag) => format!("{}/{}:{}", reference.registry, reference.repository, tag),
        None => format!("{}/{}:latest", reference.registry, reference.repository),
    };

    ref_str.parse::<Reference>().map_err(|e| {
        SealError::InvalidReference(format!("Invalid OCI reference '{}': {}", ref_str, e))
    })
}

fn map_registry_error(reference: &ImageReference, err: OciDistributionError) -> SealError {
    match err {
        OciDistributionError::ServerError { code: 404, .. }
        | OciDistributionError::ImageManifestNotFoundError(_) => {
            SealError::ManifestNotFound(reference.to_string())
        }
        other => {
            let message = other.to_string();
            if is_manifest_missing(&message) {
                SealError::ManifestNotFound(reference.to_string())
            } else {
                SealError::Registry {
                    registry: reference.registry.clone(),
                    message,
                }
            }
        }
    }
}
