//! Digest resolution for freshly pushed images.

use std::sync::Arc;

use sealcraft_core::config::RetryPolicy;
use sealcraft_core::digest::Digest;
use sealcraft_core::error::{ErrorClass, Result, SealError};
use tokio_util::sync::CancellationToken;

use crate::oci::engine::ContainerEngine;
use crate::oci::reference::ImageReference;
use crate::retry::retry;

/// Digest and registry path of a pushed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub digest: Digest,
    /// `registry/repository`, without tag or digest
    pub registry: String,
}

/// Resolves image references to digests, tolerating registry propagation
/// lag.
pub struct DigestResolver {
    engine: Arc<dyn ContainerEngine>,
    platform: String,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl DigestResolver {
    pub fn new(engine: Arc<dyn ContainerEngine>, platform: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            engine,
            platform: platform.into(),
            policy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve `image` to its digest and registry path.
    ///
    /// Transient failures (manifest not served yet, registry or network
    /// trouble) are retried under the policy; anything else surfaces
    /// unchanged. Exhausting the attempts is [`SealError::DigestUnresolved`].
    pub async fn resolve_digest_and_registry(&self, image: &ImageReference) -> Result<ResolvedImage> {
        let reference = image.full_reference();

        let digest = retry(
            &self.policy,
            &self.cancel,
            |e| e.class() == ErrorClass::Transient,
            |attempt| {
                tracing::debug!(reference = %reference, attempt, "Resolving digest");
                self.engine.manifest_digest(&reference, &self.platform)
            },
        )
        .await
        .map_err(|e| {
            e.into_error(|attempts, last| SealError::DigestUnresolved {
                reference: reference.clone(),
                attempts,
                message: last.to_string(),
            })
        })?;

        tracing::info!(reference = %reference, digest = %digest, "Resolved image digest");
        Ok(ResolvedImage {
            digest,
            registry: image.repository_path(),
        })
    }
}
