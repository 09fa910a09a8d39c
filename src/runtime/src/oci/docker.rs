//! Docker-compatible CLI engine.
//!
//! Drives `docker` (or any CLI with the same surface, such as `podman`)
//! through [`ProcessRunner`]. Exit status and output are classified here so
//! callers see typed errors instead of raw transcripts.

use async_trait::async_trait;
use sealcraft_core::digest::Digest;
use sealcraft_core::error::{Result, SealError};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::engine::{BuildSpec, ContainerEngine};
use super::image::ImageMetadata;
use crate::process::{OutputLine, ProcessOutput, ProcessRunner};

/// Output fragments that mean the registry refused us for lack of access.
const PERMISSION_KEYWORDS: &[&str] = &[
    "denied",
    "unauthorized",
    "forbidden",
    "access forbidden",
    "authentication required",
    "insufficient_scope",
];

/// Output fragments that mean the registry has no such manifest (yet).
const NOT_FOUND_KEYWORDS: &[&str] = &["manifest unknown", "not found", "no such manifest"];

/// Container engine backed by a docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    runner: ProcessRunner,
}

impl DockerCli {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    async fn run(
        &self,
        args: Vec<String>,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<ProcessOutput> {
        self.runner.run(&args, sink).await
    }

    fn subprocess_error(&self, out: ProcessOutput) -> SealError {
        SealError::Subprocess {
            program: self.runner.program().to_string(),
            status: out.status,
            output: out.output,
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn build(&self, spec: &BuildSpec, sink: Option<&mpsc::Sender<OutputLine>>) -> Result<()> {
        tracing::info!(tag = %spec.tag, platform = %spec.platform, "Building image");
        let out = self.run(spec.to_args(), sink).await?;
        if out.success() {
            Ok(())
        } else {
            Err(SealError::ImageBuild {
                reference: spec.tag.clone(),
                output: out.output,
            })
        }
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        let args = vec!["tag".to_string(), source.to_string(), target.to_string()];
        let out = self.run(args, None).await?;
        if out.success() {
            Ok(())
        } else {
            Err(self.subprocess_error(out))
        }
    }

    async fn push(&self, reference: &str, sink: Option<&mpsc::Sender<OutputLine>>) -> Result<()> {
        tracing::info!(reference = %reference, "Pushing image");
        let out = self
            .run(vec!["push".to_string(), reference.to_string()], sink)
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(classify_push_failure(reference, out.output))
        }
    }

    async fn pull(
        &self,
        reference: &str,
        platform: &str,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<()> {
        tracing::info!(reference = %reference, platform = %platform, "Pulling image");
        let args = vec![
            "pull".to_string(),
            reference.to_string(),
            "--platform".to_string(),
            platform.to_string(),
        ];
        let out = self.run(args, sink).await?;
        if out.success() {
            Ok(())
        } else if is_manifest_missing(&out.output) {
            Err(SealError::ManifestNotFound(reference.to_string()))
        } else {
            Err(self.subprocess_error(out))
        }
    }

    async fn manifest_inspect(&self, reference: &str) -> Result<()> {
        let args = vec![
            "manifest".to_string(),
            "inspect".to_string(),
            reference.to_string(),
        ];
        let out = self.run(args, None).await?;
        if out.success() {
            Ok(())
        } else if is_manifest_missing(&out.output) {
            Err(SealError::ManifestNotFound(reference.to_string()))
        } else {
            Err(self.subprocess_error(out))
        }
    }

    async fn manifest_digest(&self, reference: &str, platform: &str) -> Result<Digest> {
        let args = vec![
            "manifest".to_string(),
            "inspect".to_string(),
            "-v".to_string(),
            reference.to_string(),
        ];
        let out = self.run(args, None).await?;
        if !out.success() {
            return Err(if is_manifest_missing(&out.output) {
                SealError::ManifestNotFound(reference.to_string())
            } else {
                self.subprocess_error(out)
            });
        }
        parse_manifest_digest(reference, &out.output, platform)
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageMetadata> {
        let args = vec![
            "image".to_string(),
            "inspect".to_string(),
            reference.to_string(),
        ];
        let out = self.run(args, None).await?;
        if !out.success() {
            return Err(self.subprocess_error(out));
        }
        ImageMetadata::from_inspect_json(reference, &out.output)
    }
}

/// Decide between a permission failure and a generic one from push output.
pub fn classify_push_failure(reference: &str, output: String) -> SealError {
    let lower = output.to_lowercase();
    if PERMISSION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        SealError::PushDenied {
            reference: reference.to_string(),
            output,
        }
    } else {
        SealError::PushFailed {
            reference: reference.to_string(),
            output,
        }
    }
}

/// Whether engine output says the manifest does not exist.
pub fn is_manifest_missing(output: &str) -> bool {
    let lower = output.to_lowercase();
    NOT_FOUND_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VerboseManifest {
    List(Vec<VerboseEntry>),
    Single(VerboseEntry),
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VerboseEntry {
    descriptor: Descriptor,
}

#[derive(Deserialize)]
struct Descriptor {
    digest: String,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Deserialize)]
struct Platform {
    architecture: String,
    os: String,
    #[serde(default)]
    variant: Option<String>,
}

impl Platform {
    fn matches(&self, wanted: &str) -> bool {
        let mut parts = wanted.split('/');
        let os = parts.next().unwrap_or_default();
        let arch = parts.next().unwrap_or_default();
        let variant = parts.next();
        self.os == os
            && self.architecture == arch
            && match (variant, self.variant.as_deref()) {
                (Some(w), Some(v)) => w == v,
                (Some(_), None) => false,
                (None, _) => true,
            }
    }
}

/// Pick the digest out of `manifest inspect -v` output.
///
/// A single manifest yields its own digest. A list yields the entry whose
/// platform matches `platform`, or the only entry if there is just one.
pub fn parse_manifest_digest(reference: &str, json: &str, platform: &str) -> Result<Digest> {
    let manifest: VerboseManifest = serde_json::from_str(json).map_err(|e| SealError::Registry {
        registry: reference.to_string(),
        message: format!("unreadable manifest inspect output: {}", e),
    })?;

    let descriptor = match manifest {
        VerboseManifest::Single(entry) => entry.descriptor,
        VerboseManifest::List(entries) => {
            let count = entries.len();
            let mut entries = entries.into_iter();
            let found = if count == 1 {
                entries.next().map(|e| e.descriptor)
            } else {
                entries
                    .map(|e| e.descriptor)
                    .find(|d| d.platform.as_ref().is_some_and(|p| p.matches(platform)))
            };
            found.ok_or_else(|| SealError::Registry {
                registry: reference.to_string(),
                message: format!("no manifest for platform {}", platform),
            })?
        }
    };

    Digest::parse(&descriptor.digest)
}
