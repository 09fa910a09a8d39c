//! In-memory container engine for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sealcraft_core::digest::Digest;
use sealcraft_core::error::{Result, SealError};
use tokio::sync::mpsc;

use super::docker::classify_push_failure;
use super::engine::{BuildSpec, ContainerEngine};
use super::image::ImageMetadata;
use super::labels::LAYERED_BY_LABEL;
use crate::process::{OutputLine, OutputSource};

/// What a build saw in its context directory, captured before the
/// directory goes away.
#[derive(Debug, Clone)]
pub(crate) struct BuildSnapshot {
    pub tag: String,
    pub dockerfile: String,
    /// File name -> unix mode bits
    pub files: BTreeMap<String, u32>,
    pub symlinks: Vec<String>,
    pub context: std::path::PathBuf,
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    pub images: Mutex<HashMap<String, ImageMetadata>>,
    pub digests: Mutex<HashMap<String, Digest>>,
    pub calls: Mutex<Vec<String>>,
    pub builds: Mutex<Vec<BuildSnapshot>>,
    pub build_error: Mutex<Option<String>>,
    pub push_error: Mutex<Option<String>>,
    /// `manifest_inspect` reports not-found this many times before succeeding
    pub manifest_misses: AtomicU32,
    /// `manifest_digest` reports not-found this many times before succeeding
    pub digest_misses: AtomicU32,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, reference: &str, meta: ImageMetadata) -> Self {
        self.images
            .lock()
            .unwrap()
            .insert(reference.to_string(), meta);
        self
    }

    pub fn with_digest(self, reference: &str, digest: Digest) -> Self {
        self.digests
            .lock()
            .unwrap()
            .insert(reference.to_string(), digest);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(op))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn emit(&self, sink: Option<&mpsc::Sender<OutputLine>>, line: &str) -> Result<()> {
        if let Some(tx) = sink {
            tx.send(OutputLine {
                source: OutputSource::Stdout,
                line: line.to_string(),
            })
            .await
            .map_err(|_| SealError::Cancelled("output consumer went away".to_string()))?;
        }
        Ok(())
    }

    fn snapshot(spec: &BuildSpec) -> BuildSnapshot {
        use std::os::unix::fs::PermissionsExt;

        let dockerfile = std::fs::read_to_string(&spec.dockerfile).unwrap_or_default();
        let mut files = BTreeMap::new();
        let mut symlinks = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&spec.context) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if let Ok(meta) = std::fs::symlink_metadata(entry.path()) {
                    if meta.file_type().is_symlink() {
                        symlinks.push(name.clone());
                    }
                    files.insert(name, meta.permissions().mode() & 0o777);
                }
            }
        }
        BuildSnapshot {
            tag: spec.tag.clone(),
            dockerfile,
            files,
            symlinks,
            context: spec.context.clone(),
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn build(&self, spec: &BuildSpec, sink: Option<&mpsc::Sender<OutputLine>>) -> Result<()> {
        self.record(format!("build {}", spec.tag));
        let snapshot = Self::snapshot(spec);
        let layered = snapshot.dockerfile.contains(LAYERED_BY_LABEL);
        self.builds.lock().unwrap().push(snapshot);
        self.emit(sink, &format!("Step 1/1 : building {}", spec.tag))
            .await?;

        if let Some(output) = self.build_error.lock().unwrap().clone() {
            return Err(SealError::ImageBuild {
                reference: spec.tag.clone(),
                output,
            });
        }

        let mut meta = ImageMetadata {
            reference: spec.tag.clone(),
            cmd: vec!["node".to_string(), "server.js".to_string()],
            user: "app".to_string(),
            ..Default::default()
        };
        if layered {
            meta.labels
                .insert(LAYERED_BY_LABEL.to_string(), "test".to_string());
        }
        self.images.lock().unwrap().insert(spec.tag.clone(), meta);
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.record(format!("tag {} {}", source, target));
        let mut images = self.images.lock().unwrap();
        let meta = images
            .get(source)
            .cloned()
            .ok_or_else(|| SealError::Other(format!("No such image: {}", source)))?;
        images.insert(target.to_string(), meta);
        Ok(())
    }

    async fn push(&self, reference: &str, sink: Option<&mpsc::Sender<OutputLine>>) -> Result<()> {
        self.record(format!("push {}", reference));
        self.emit(sink, &format!("pushing {}", reference)).await?;
        match self.push_error.lock().unwrap().clone() {
            Some(output) => Err(classify_push_failure(reference, output)),
            None => Ok(()),
        }
    }

    async fn pull(
        &self,
        reference: &str,
        platform: &str,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<()> {
        self.record(format!("pull {} {}", reference, platform));
        self.emit(sink, &format!("pulling {}", reference)).await?;
        if self.images.lock().unwrap().contains_key(reference) {
            Ok(())
        } else {
            Err(SealError::ManifestNotFound(reference.to_string()))
        }
    }

    async fn manifest_inspect(&self, reference: &str) -> Result<()> {
        self.record(format!("manifest-inspect {}", reference));
        let remaining = self.manifest_misses.load(Ordering::SeqCst);
        if remaining > 0 {
            self.manifest_misses.store(remaining - 1, Ordering::SeqCst);
            return Err(SealError::ManifestNotFound(reference.to_string()));
        }
        Ok(())
    }

    async fn manifest_digest(&self, reference: &str, _platform: &str) -> Result<Digest> {
        self.record(format!("manifest-digest {}", reference));
        let remaining = self.digest_misses.load(Ordering::SeqCst);
        if remaining > 0 {
            self.digest_misses.store(remaining - 1, Ordering::SeqCst);
            return Err(SealError::ManifestNotFound(reference.to_string()));
        }
        self.digests
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .ok_or_else(|| SealError::ManifestNotFound(reference.to_string()))
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageMetadata> {
        self.record(format!("inspect {}", reference));
        self.images
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| SealError::Other(format!("No such image: {}", reference)))
    }
}
