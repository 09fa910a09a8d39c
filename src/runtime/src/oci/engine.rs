//! Container engine abstraction.
//!
//! The layering engine and the digest resolver only talk to the container
//! engine through [`ContainerEngine`]. [`super::docker::DockerCli`] is the
//! production implementation; tests use in-memory fakes.

use std::path::PathBuf;

use async_trait::async_trait;
use sealcraft_core::digest::Digest;
use sealcraft_core::error::Result;
use tokio::sync::mpsc;

use super::image::ImageMetadata;
use crate::process::OutputLine;

/// Inputs of one `build` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Target platform, e.g. `linux/amd64`
    pub platform: String,
    /// Tag applied to the result
    pub tag: String,
    /// Dockerfile to build
    pub dockerfile: PathBuf,
    /// Build context directory
    pub context: PathBuf,
}

impl BuildSpec {
    /// Engine CLI arguments: `build --platform <p> -t <tag> -f <dockerfile> <context>`.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "build".to_string(),
            "--platform".to_string(),
            self.platform.clone(),
            "-t".to_string(),
            self.tag.clone(),
            "-f".to_string(),
            self.dockerfile.display().to_string(),
            self.context.display().to_string(),
        ]
    }
}

/// Operations sealcraft needs from a container engine.
///
/// Every method that runs a long subprocess accepts an optional sink for
/// streamed output; dropping the receiving end aborts the subprocess.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build an image. A failed build is [`SealError::ImageBuild`] carrying
    /// the full build output.
    ///
    /// [`SealError::ImageBuild`]: sealcraft_core::error::SealError::ImageBuild
    async fn build(&self, spec: &BuildSpec, sink: Option<&mpsc::Sender<OutputLine>>) -> Result<()>;

    /// Give an existing local image another name.
    async fn tag(&self, source: &str, target: &str) -> Result<()>;

    /// Push a reference. Failures are classified as permission or generic.
    async fn push(&self, reference: &str, sink: Option<&mpsc::Sender<OutputLine>>) -> Result<()>;

    /// Pull a reference for one platform.
    async fn pull(
        &self,
        reference: &str,
        platform: &str,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<()>;

    /// Check that the registry serves a manifest for the reference.
    /// Absence is [`SealError::ManifestNotFound`].
    ///
    /// [`SealError::ManifestNotFound`]: sealcraft_core::error::SealError::ManifestNotFound
    async fn manifest_inspect(&self, reference: &str) -> Result<()>;

    /// Content digest of the reference's manifest for one platform.
    async fn manifest_digest(&self, reference: &str, platform: &str) -> Result<Digest>;

    /// Introspect a local image.
    async fn inspect_image(&self, reference: &str) -> Result<ImageMetadata>;
}
