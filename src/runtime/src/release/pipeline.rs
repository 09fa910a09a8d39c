//! End-to-end release preparation.
//!
//! ```text
//! Dockerfile ──layer──▶ push ──resolve digest──┐
//! remote image ──layer if needed──▶ push ──────┤──▶ compose ──▶ Release
//! verifiable build ──wait──▶ verify ───────────┘
//! ```
//!
//! The verifiable-build path takes the digest the build service reports and
//! skips local layering and digest resolution.

use std::path::Path;
use std::sync::Arc;

use sealcraft_core::build::{BuildIdentifier, BuildRecord, BuildRequest, ProvenanceVerificationResult};
use sealcraft_core::config::{KmsKeys, SealConfig};
use sealcraft_core::error::{Result, SealError};
use sealcraft_core::release::{Release, TxResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::compose::ReleaseComposer;
use super::resolver::DigestResolver;
use super::submit::ReleaseSubmitter;
use crate::build::{BuildApi, BuildClient, ProvenanceVerifier, WaitOptions};
use crate::layering::{LayeringConfig, LayeringEngine};
use crate::oci::engine::ContainerEngine;
use crate::oci::reference::ImageReference;
use crate::process::OutputLine;
use crate::secrets::EnvironmentEncryptor;

/// Application a release is prepared for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    /// Identity the private environment is bound to
    pub app_id: String,
    /// Recorded in the public environment
    pub instance_type: String,
}

impl DeployTarget {
    pub fn new(app_id: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            instance_type: instance_type.into(),
        }
    }
}

/// Build service collaborators for the verifiable-build path.
pub struct VerifiableBuilds {
    pub client: BuildClient,
    pub verifier: ProvenanceVerifier,
    pub wait: WaitOptions,
}

/// A release from a verifiable build, with the build it came from.
#[derive(Debug, Clone)]
pub struct VerifiedRelease {
    pub release: Release,
    pub build: BuildRecord,
    pub provenance: ProvenanceVerificationResult,
}

/// Wires the layering, resolution, encryption and composition steps.
pub struct ReleasePipeline {
    layering: LayeringEngine,
    resolver: DigestResolver,
    encryptor: EnvironmentEncryptor,
    composer: ReleaseComposer,
    builds: Option<VerifiableBuilds>,
    cancel: CancellationToken,
}

impl ReleasePipeline {
    pub fn new(
        layering: LayeringEngine,
        resolver: DigestResolver,
        encryptor: EnvironmentEncryptor,
        composer: ReleaseComposer,
    ) -> Self {
        Self {
            layering,
            resolver,
            encryptor,
            composer,
            builds: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Assemble a pipeline from configuration and the environment's keys.
    pub fn from_config(
        config: &SealConfig,
        keys: &KmsKeys,
        engine: Arc<dyn ContainerEngine>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let layering = LayeringEngine::new(engine.clone(), LayeringConfig::from_seal_config(config, keys))
            .with_cancellation(cancel.clone());
        let resolver = DigestResolver::new(engine, config.platform.clone(), config.digest_retry.clone())
            .with_cancellation(cancel.clone());
        let encryptor = EnvironmentEncryptor::from_kms_keys(keys)?;
        let composer = ReleaseComposer::new(config.upgrade_grace());

        Ok(Self::new(layering, resolver, encryptor, composer).with_cancellation(cancel))
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_verifiable_builds(mut self, builds: VerifiableBuilds) -> Self {
        self.builds = Some(builds);
        self
    }

    /// Enable the verifiable-build path against `api`.
    pub fn with_build_api(self, api: Arc<dyn BuildApi>, keys: &KmsKeys, wait: WaitOptions) -> Result<Self> {
        let verifier = ProvenanceVerifier::from_kms_keys(api.clone(), keys)?;
        Ok(self.with_verifiable_builds(VerifiableBuilds {
            client: BuildClient::new(api),
            verifier,
            wait,
        }))
    }

    /// Build `dockerfile`, layer and push it as `image`, and compose a
    /// release for the pushed digest.
    pub async fn from_dockerfile(
        &self,
        dockerfile: &Path,
        image: &ImageReference,
        env_file: Option<&Path>,
        target: &DeployTarget,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<Release> {
        let layered = self
            .layering
            .layer_from_dockerfile(dockerfile, image, env_file, sink)
            .await?;
        self.compose_for(&layered, env_file, target).await
    }

    /// Layer a registry image if it is not layered yet and compose a
    /// release for it.
    pub async fn from_image(
        &self,
        source: &ImageReference,
        env_file: Option<&Path>,
        target: &DeployTarget,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<Release> {
        let layered = self
            .layering
            .layer_remote_if_needed(source, env_file, sink)
            .await?;
        self.compose_for(&layered, env_file, target).await
    }

    /// Submit a verifiable build, follow it, verify its provenance and
    /// compose a release from the digest the service reports.
    pub async fn from_verifiable_build(
        &self,
        request: &BuildRequest,
        env_file: Option<&Path>,
        target: &DeployTarget,
        log_sink: Option<&mpsc::Sender<String>>,
    ) -> Result<VerifiedRelease> {
        let builds = self.builds.as_ref().ok_or_else(|| {
            SealError::Config("verifiable builds are not configured".to_string())
        })?;

        let build_id = builds.client.submit(request).await?;
        let build = builds
            .client
            .wait_for_build(&build_id, &builds.wait, log_sink, &self.cancel)
            .await?;

        let provenance = builds
            .verifier
            .verify(&BuildIdentifier::BuildId(build_id.clone()))
            .await?;
        let (image_url, image_digest) = match &provenance {
            ProvenanceVerificationResult::Verified {
                image_url,
                image_digest,
                ..
            } => (image_url.clone(), image_digest.clone()),
            ProvenanceVerificationResult::Failed { error, .. } => {
                return Err(SealError::ProvenanceUnverified {
                    build_id,
                    reason: error.clone(),
                })
            }
        };

        let registry = ImageReference::parse(&image_url)?.repository_path();
        let payload = self
            .encryptor
            .split_and_encrypt(env_file, &target.app_id, &target.instance_type)?;
        let release = self.composer.compose_release(
            &image_digest,
            &registry,
            payload.public_env,
            payload.encrypted_env,
        )?;

        tracing::info!(build_id = %build_id, digest = %image_digest, "Release composed from verified build");
        Ok(VerifiedRelease {
            release,
            build,
            provenance,
        })
    }

    /// Hand a release to the scheduler.
    pub async fn publish(&self, release: &Release, submitter: &dyn ReleaseSubmitter) -> Result<TxResult> {
        let tx = submitter.submit(release).await?;
        tracing::info!(tx_hash = %tx.tx_hash, "Release submitted");
        Ok(tx)
    }

    async fn compose_for(
        &self,
        image: &ImageReference,
        env_file: Option<&Path>,
        target: &DeployTarget,
    ) -> Result<Release> {
        let resolved = self.resolver.resolve_digest_and_registry(image).await?;
        let payload = self
            .encryptor
            .split_and_encrypt(env_file, &target.app_id, &target.instance_type)?;
        Ok(self.composer.compose(
            resolved.digest,
            &resolved.registry,
            payload.public_env,
            payload.encrypted_env,
        ))
    }
}
