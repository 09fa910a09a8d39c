//! Image layering engine.
//!
//! Wraps a user image with the platform's secret-fetch client, an optional
//! TLS front-end and an entrypoint script that loads decrypted secrets
//! before running the original command.
//!
//! # Process
//!
//! 1. Introspect the source image; an image carrying the layering marker is
//!    returned unchanged
//! 2. Decide on TLS from the env file's `DOMAIN`
//! 3. Render the derived Dockerfile and the wrapper script
//! 4. Materialise a scratch build context (copies, read-only modes)
//! 5. Build, push, and poll the registry until the push is visible
//! 6. Remove the scratch context on every exit path

pub mod assets;
pub mod template;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sealcraft_core::config::{
    EnvironmentConfig, KmsKeys, LogRedirect, RetryPolicy, SealConfig, KMS_SIGNING_KEY_FILE,
};
use sealcraft_core::error::{Result, SealError};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::oci::engine::{BuildSpec, ContainerEngine};
use crate::oci::image::ImageMetadata;
use crate::oci::reference::ImageReference;
use crate::process::OutputLine;
use crate::retry::retry;
use crate::secrets::envfile::EnvFile;

pub use assets::{LayeringAssets, KMS_CLIENT_FILE, TLS_KEYGEN_FILE};
pub use template::{DockerfileParams, ScriptParams};

/// File name of the wrapper script in the build context.
pub const SCRIPT_FILE: &str = "sealcraft-entrypoint.sh";

/// File name of the reverse-proxy config in the build context.
pub const CADDYFILE: &str = "Caddyfile";

const EXEC_MODE: u32 = 0o555;
const DATA_MODE: u32 = 0o444;

/// Everything the layering engine needs besides the container engine.
#[derive(Debug, Clone)]
pub struct LayeringConfig {
    /// Target platform of builds and pulls
    pub platform: String,
    pub log_redirect: LogRedirect,
    /// KMS and user API endpoints baked into the wrapper script
    pub endpoints: EnvironmentConfig,
    /// KMS signing public key copied into the image
    pub signing_key_pem: String,
    pub assets: LayeringAssets,
    /// Reverse-proxy config produced by the TLS configure step
    pub caddyfile: PathBuf,
    pub push_verify_retry: RetryPolicy,
    /// Version recorded in the layering marker label
    pub tool_version: String,
}

impl LayeringConfig {
    pub fn from_seal_config(config: &SealConfig, keys: &KmsKeys) -> Self {
        Self {
            platform: config.platform.clone(),
            log_redirect: config.log_redirect,
            endpoints: config.endpoints(),
            signing_key_pem: keys.signing_public_key_pem.clone(),
            assets: LayeringAssets::resolve(&config.assets_dir, config.environment),
            caddyfile: PathBuf::from(CADDYFILE),
            push_verify_retry: config.push_verify_retry.clone(),
            tool_version: sealcraft_core::VERSION.to_string(),
        }
    }
}

/// Builds layered images through a [`ContainerEngine`].
pub struct LayeringEngine {
    engine: Arc<dyn ContainerEngine>,
    config: LayeringConfig,
    cancel: CancellationToken,
}

impl LayeringEngine {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: LayeringConfig) -> Self {
        Self {
            engine,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort retry waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &LayeringConfig {
        &self.config
    }

    /// Build the user's Dockerfile, layer the result as `target` and push it.
    ///
    /// If the user's image already carries the marker it is pushed as
    /// `target` without another layering build.
    pub async fn layer_from_dockerfile(
        &self,
        dockerfile: &Path,
        target: &ImageReference,
        env_file: Option<&Path>,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<ImageReference> {
        if !dockerfile.is_file() {
            return Err(SealError::precondition(
                format!("Dockerfile not found: {}", dockerfile.display()),
                "Pass the path of an existing Dockerfile",
            ));
        }
        let env = load_env(env_file)?;

        let context = match dockerfile.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base_tag = format!("sealcraft-base-{}:latest", uuid::Uuid::new_v4().simple());

        tracing::info!(
            dockerfile = %dockerfile.display(),
            target = %target,
            "Building base image"
        );
        self.engine
            .build(
                &BuildSpec {
                    platform: self.config.platform.clone(),
                    tag: base_tag.clone(),
                    dockerfile: dockerfile.to_path_buf(),
                    context,
                },
                sink,
            )
            .await?;

        let base = self.engine.inspect_image(&base_tag).await?;
        let target_ref = target.full_reference();

        if base.is_layered() {
            tracing::info!(target = %target, "Base image is already layered, pushing as is");
            self.engine.tag(&base_tag, &target_ref).await?;
            self.push_and_verify(&target_ref, sink).await?;
            return Ok(target.clone());
        }

        self.layer_image(&base, &base_tag, &target_ref, &env, sink)
            .await?;
        Ok(target.clone())
    }

    /// Pull `source` and layer it in place unless it is already layered.
    ///
    /// The layered image is pushed as `<tag>-layered` next to the source,
    /// which is left untouched. A source pinned only by digest gets a
    /// `layered-<digest prefix>` tag instead.
    pub async fn layer_remote_if_needed(
        &self,
        source: &ImageReference,
        env_file: Option<&Path>,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<ImageReference> {
        let env = load_env(env_file)?;
        let source_ref = source.full_reference();

        self.engine
            .pull(&source_ref, &self.config.platform, sink)
            .await?;
        let meta = self.engine.inspect_image(&source_ref).await?;

        if meta.is_layered() {
            tracing::info!(
                reference = %source,
                layered_by = ?meta.layering_labels().layered_by,
                "Image already layered, skipping"
            );
            return Ok(source.clone());
        }

        let target = layered_target(source);
        self.layer_image(&meta, &source_ref, &target.full_reference(), &env, sink)
            .await?;
        Ok(target)
    }

    async fn layer_image(
        &self,
        base: &ImageMetadata,
        base_ref: &str,
        target: &str,
        env: &EnvFile,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<()> {
        let include_tls = env.requires_tls();
        if include_tls && !self.config.caddyfile.is_file() {
            return Err(SealError::precondition(
                format!(
                    "DOMAIN is set but no TLS config was found at {}",
                    self.config.caddyfile.display()
                ),
                "Generate the Caddyfile with the TLS configure step, or remove DOMAIN from the env file",
            ));
        }
        self.config.assets.check(include_tls)?;

        let dockerfile = DockerfileParams {
            base_image: base_ref.to_string(),
            original_cmd: base.original_command_json()?,
            original_user: base.user.clone(),
            log_redirect: self.config.log_redirect,
            include_tls,
            tool_version: self.config.tool_version.clone(),
        }
        .render()?;
        let script = ScriptParams {
            kms_server_url: self.config.endpoints.kms_server_url.clone(),
            user_api_url: self.config.endpoints.user_api_url.clone(),
        }
        .render()?;

        let scratch = self.materialize(&dockerfile, &script, include_tls)?;
        tracing::debug!(dir = %scratch.path().display(), "Materialised scratch build context");

        let spec = BuildSpec {
            platform: self.config.platform.clone(),
            tag: target.to_string(),
            dockerfile: scratch.path().join("Dockerfile"),
            context: scratch.path().to_path_buf(),
        };

        tracing::info!(base = %base_ref, target = %target, tls = include_tls, "Layering image");
        let outcome = match self.engine.build(&spec, sink).await {
            Ok(()) => self.push_and_verify(target, sink).await,
            Err(e) => Err(e),
        };

        if let Err(e) = scratch.close() {
            tracing::warn!(error = %e, "Failed to remove scratch build directory");
        }
        outcome
    }

    /// Write the build context into a fresh temporary directory.
    fn materialize(&self, dockerfile: &str, script: &str, include_tls: bool) -> Result<TempDir> {
        let scratch = tempfile::Builder::new()
            .prefix("sealcraft-layer-")
            .tempdir()?;
        let dir = scratch.path();
        set_mode(dir, 0o700)?;

        write_file(&dir.join("Dockerfile"), dockerfile.as_bytes(), DATA_MODE)?;
        write_file(&dir.join(SCRIPT_FILE), script.as_bytes(), EXEC_MODE)?;
        write_file(
            &dir.join(KMS_SIGNING_KEY_FILE),
            self.config.signing_key_pem.as_bytes(),
            DATA_MODE,
        )?;
        copy_file(&self.config.assets.kms_client, &dir.join(KMS_CLIENT_FILE), EXEC_MODE)?;

        if include_tls {
            copy_file(&self.config.assets.tls_keygen, &dir.join(TLS_KEYGEN_FILE), EXEC_MODE)?;
            copy_file(&self.config.caddyfile, &dir.join(CADDYFILE), DATA_MODE)?;
        }

        Ok(scratch)
    }

    async fn push_and_verify(
        &self,
        reference: &str,
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<()> {
        self.engine.push(reference, sink).await?;

        retry(
            &self.config.push_verify_retry,
            &self.cancel,
            |e| matches!(e, SealError::ManifestNotFound(_)),
            |_| self.engine.manifest_inspect(reference),
        )
        .await
        .map_err(|e| {
            e.into_error(|attempts, _| SealError::PushNotVisible {
                reference: reference.to_string(),
                attempts,
            })
        })?;

        tracing::info!(reference = %reference, "Push verified");
        Ok(())
    }
}

/// Where a remote image's layered version goes.
fn layered_target(source: &ImageReference) -> ImageReference {
    match (&source.tag, &source.digest) {
        (Some(tag), _) => source.with_tag(format!("{}-layered", tag)),
        (None, Some(digest)) => {
            let hex = digest.split_once(':').map(|(_, h)| h).unwrap_or(digest);
            let prefix: String = hex.chars().take(12).collect();
            source.with_tag(format!("layered-{}", prefix))
        }
        (None, None) => source.with_tag("latest-layered"),
    }
}

fn load_env(env_file: Option<&Path>) -> Result<EnvFile> {
    match env_file {
        Some(path) => EnvFile::load(path),
        None => Ok(EnvFile::default()),
    }
}

fn write_file(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    std::fs::write(path, data)?;
    set_mode(path, mode)
}

/// Copy file contents; a symlinked source still yields a regular file.
fn copy_file(from: &Path, to: &Path, mode: u32) -> Result<()> {
    std::fs::copy(from, to).map_err(|e| {
        SealError::precondition(
            format!("Failed to copy {}: {}", from.display(), e),
            "Check that the sealcraft assets are installed and readable",
        )
    })?;
    set_mode(to, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::fake::FakeEngine;
    use crate::oci::labels::LAYERED_BY_LABEL;
    use crate::process::output_channel;
    use futures::StreamExt;
    use sealcraft_core::config::{Backoff, BuildType, Environment};
    use std::sync::atomic::Ordering;

    const SOURCE: &str = "docker.io/acme/app:v1";
    const LAYERED: &str = "docker.io/acme/app:v1-layered";

    struct Fixture {
        _assets: TempDir,
        work: TempDir,
        config: LayeringConfig,
    }

    fn fixture() -> Fixture {
        let assets_dir = TempDir::new().unwrap();
        let assets = LayeringAssets::resolve(assets_dir.path(), Environment::Testnet);
        std::fs::create_dir_all(assets.kms_client.parent().unwrap()).unwrap();
        std::fs::write(&assets.kms_client, b"#!/bin/sh\necho kms\n").unwrap();
        std::fs::write(&assets.tls_keygen, b"#!/bin/sh\necho tls\n").unwrap();

        let work = TempDir::new().unwrap();
        let config = LayeringConfig {
            platform: "linux/amd64".to_string(),
            log_redirect: LogRedirect::Off,
            endpoints: EnvironmentConfig::resolve(Environment::Testnet, BuildType::Prod),
            signing_key_pem: "-----BEGIN PUBLIC KEY-----\nsigning\n-----END PUBLIC KEY-----\n"
                .to_string(),
            assets,
            caddyfile: work.path().join(CADDYFILE),
            push_verify_retry: RetryPolicy {
                max_attempts: 5,
                backoff: Backoff::Fixed { delay_ms: 1 },
            },
            tool_version: "9.9.9".to_string(),
        };
        Fixture {
            _assets: assets_dir,
            work,
            config,
        }
    }

    fn plain_image() -> ImageMetadata {
        ImageMetadata {
            reference: SOURCE.to_string(),
            entrypoint: vec!["/sbin/tini".to_string(), "--".to_string()],
            cmd: vec!["node".to_string(), "server.js".to_string()],
            user: "app".to_string(),
            ..Default::default()
        }
    }

    fn layered_image() -> ImageMetadata {
        let mut meta = plain_image();
        meta.labels
            .insert(LAYERED_BY_LABEL.to_string(), "0.0.1".to_string());
        meta
    }

    fn source() -> ImageReference {
        ImageReference::parse(SOURCE).unwrap()
    }

    fn layering(fake: &Arc<FakeEngine>, config: LayeringConfig) -> LayeringEngine {
        LayeringEngine::new(fake.clone(), config)
    }

    fn env_file(fx: &Fixture, content: &str) -> PathBuf {
        let path = fx.work.path().join(".env");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_already_layered_is_returned_unchanged() {
        let fx = fixture();
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, layered_image()));
        let engine = layering(&fake, fx.config.clone());

        let result = engine.layer_remote_if_needed(&source(), None, None).await.unwrap();

        assert_eq!(result, source());
        assert_eq!(fake.count("build"), 0);
        assert_eq!(fake.count("push"), 0);
        assert_eq!(fake.count("manifest-inspect"), 0);
    }

    #[tokio::test]
    async fn test_layers_remote_image() {
        let fx = fixture();
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        let engine = layering(&fake, fx.config.clone());

        let result = engine.layer_remote_if_needed(&source(), None, None).await.unwrap();
        assert_eq!(result.full_reference(), LAYERED);

        assert_eq!(
            fake.calls(),
            vec![
                format!("pull {} linux/amd64", SOURCE),
                format!("inspect {}", SOURCE),
                format!("build {}", LAYERED),
                format!("push {}", LAYERED),
                format!("manifest-inspect {}", LAYERED),
            ]
        );

        let builds = fake.builds.lock().unwrap().clone();
        let build = &builds[0];
        assert!(build.dockerfile.starts_with(&format!("FROM {}\n", SOURCE)));
        assert!(build
            .dockerfile
            .contains(r#"CMD ["/sbin/tini","--","node","server.js"]"#));
        assert!(build.dockerfile.contains(r#"LABEL io.sealcraft.layered-by="9.9.9""#));
        assert!(build.symlinks.is_empty());
        assert_eq!(
            build.files.keys().map(String::as_str).collect::<Vec<_>>(),
            vec![
                "Dockerfile",
                KMS_CLIENT_FILE,
                KMS_SIGNING_KEY_FILE,
                SCRIPT_FILE,
            ]
        );
        assert_eq!(build.files[KMS_CLIENT_FILE], EXEC_MODE);
        assert_eq!(build.files[SCRIPT_FILE], EXEC_MODE);
        assert_eq!(build.files[KMS_SIGNING_KEY_FILE], DATA_MODE);
        assert!(!build.context.exists(), "scratch directory must be removed");
    }

    #[tokio::test]
    async fn test_tls_requires_caddyfile() {
        let fx = fixture();
        let env = env_file(&fx, "DOMAIN=app.example.com\n");
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        let engine = layering(&fake, fx.config.clone());

        let err = engine
            .layer_remote_if_needed(&source(), Some(&env), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::Precondition { .. }));
        assert!(err.hint().unwrap().contains("Caddyfile"));
        assert_eq!(fake.count("build"), 0);
    }

    #[tokio::test]
    async fn test_tls_context_includes_proxy_files() {
        let fx = fixture();
        std::fs::write(&fx.config.caddyfile, "app.example.com {\n reverse_proxy :3000\n}\n").unwrap();
        let env = env_file(&fx, "DOMAIN=app.example.com\n");
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        let engine = layering(&fake, fx.config.clone());

        engine
            .layer_remote_if_needed(&source(), Some(&env), None)
            .await
            .unwrap();

        let build = fake.builds.lock().unwrap()[0].clone();
        assert_eq!(build.files[CADDYFILE], DATA_MODE);
        assert_eq!(build.files[TLS_KEYGEN_FILE], EXEC_MODE);
        assert!(build.dockerfile.contains("COPY Caddyfile /etc/caddy/Caddyfile"));
    }

    #[tokio::test]
    async fn test_localhost_domain_does_not_need_tls() {
        let fx = fixture();
        let env = env_file(&fx, "DOMAIN=localhost\n");
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        let engine = layering(&fake, fx.config.clone());

        engine
            .layer_remote_if_needed(&source(), Some(&env), None)
            .await
            .unwrap();
        let build = fake.builds.lock().unwrap()[0].clone();
        assert!(!build.files.contains_key(CADDYFILE));
    }

    #[tokio::test]
    async fn test_build_failure_surfaces_output_and_cleans_up() {
        let fx = fixture();
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        *fake.build_error.lock().unwrap() = Some("COPY failed: no such file".to_string());
        let engine = layering(&fake, fx.config.clone());

        let err = engine
            .layer_remote_if_needed(&source(), None, None)
            .await
            .unwrap_err();
        match err {
            SealError::ImageBuild { output, .. } => assert!(output.contains("COPY failed")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fake.count("push"), 0);
        let build = fake.builds.lock().unwrap()[0].clone();
        assert!(!build.context.exists());
    }

    #[tokio::test]
    async fn test_push_denied_is_classified_and_cleans_up() {
        let fx = fixture();
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        *fake.push_error.lock().unwrap() =
            Some("denied: requested access to the resource is denied".to_string());
        let engine = layering(&fake, fx.config.clone());

        let err = engine
            .layer_remote_if_needed(&source(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::PushDenied { .. }));
        assert_eq!(fake.count("manifest-inspect"), 0);
        let build = fake.builds.lock().unwrap()[0].clone();
        assert!(!build.context.exists());
    }

    #[tokio::test]
    async fn test_push_visible_after_propagation_delay() {
        let fx = fixture();
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        fake.manifest_misses.store(2, Ordering::SeqCst);
        let engine = layering(&fake, fx.config.clone());

        engine.layer_remote_if_needed(&source(), None, None).await.unwrap();
        assert_eq!(fake.count("manifest-inspect"), 3);
    }

    #[tokio::test]
    async fn test_push_never_visible() {
        let fx = fixture();
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        fake.manifest_misses.store(100, Ordering::SeqCst);
        let engine = layering(&fake, fx.config.clone());

        let err = engine
            .layer_remote_if_needed(&source(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::PushNotVisible { attempts: 5, .. }));
        assert_eq!(fake.count("manifest-inspect"), 5);
        assert!(err.hint().is_some());
    }

    #[tokio::test]
    async fn test_missing_client_binary_is_precondition() {
        let fx = fixture();
        std::fs::remove_file(&fx.config.assets.kms_client).unwrap();
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        let engine = layering(&fake, fx.config.clone());

        let err = engine
            .layer_remote_if_needed(&source(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::Precondition { .. }));
        assert_eq!(fake.count("build"), 0);
    }

    #[tokio::test]
    async fn test_digest_pinned_source_gets_layered_tag() {
        let fx = fixture();
        let pinned = format!("docker.io/acme/app@sha256:{}", "ab".repeat(32));
        let fake = Arc::new(FakeEngine::new().with_image(&pinned, plain_image()));
        let engine = layering(&fake, fx.config.clone());

        let result = engine
            .layer_remote_if_needed(&ImageReference::parse(&pinned).unwrap(), None, None)
            .await
            .unwrap();
        assert_eq!(result.full_reference(), "docker.io/acme/app:layered-abababababab");
        assert_eq!(fake.count("push"), 1);
    }

    #[test]
    fn test_layered_target_never_reuses_source_tag() {
        let tagged = ImageReference::parse("ghcr.io/acme/app:v3").unwrap();
        assert_eq!(layered_target(&tagged).full_reference(), "ghcr.io/acme/app:v3-layered");

        let short = ImageReference::parse("ghcr.io/acme/app@sha256:abc").unwrap();
        assert_eq!(layered_target(&short).tag.as_deref(), Some("layered-abc"));
    }

    #[tokio::test]
    async fn test_layer_from_dockerfile() {
        let fx = fixture();
        let dockerfile = fx.work.path().join("Dockerfile");
        std::fs::write(&dockerfile, "FROM node:20\nCMD [\"node\", \"server.js\"]\n").unwrap();
        let fake = Arc::new(FakeEngine::new());
        let engine = layering(&fake, fx.config.clone());
        let target = ImageReference::parse("ghcr.io/acme/app:v2").unwrap();

        let result = engine
            .layer_from_dockerfile(&dockerfile, &target, None, None)
            .await
            .unwrap();
        assert_eq!(result, target);

        let builds = fake.builds.lock().unwrap().clone();
        assert_eq!(builds.len(), 2);
        assert!(builds[0].tag.starts_with("sealcraft-base-"));
        assert_eq!(builds[0].context, fx.work.path());
        assert_eq!(builds[1].tag, "ghcr.io/acme/app:v2");
        assert!(builds[1]
            .dockerfile
            .starts_with(&format!("FROM {}\n", builds[0].tag)));
        assert_eq!(fake.count("push"), 1);
    }

    #[tokio::test]
    async fn test_layer_from_dockerfile_with_layered_base() {
        let fx = fixture();
        let dockerfile = fx.work.path().join("Dockerfile");
        std::fs::write(
            &dockerfile,
            format!("FROM scratch\nLABEL {}=\"0.0.1\"\n", LAYERED_BY_LABEL),
        )
        .unwrap();
        let fake = Arc::new(FakeEngine::new());
        let engine = layering(&fake, fx.config.clone());
        let target = ImageReference::parse("ghcr.io/acme/app:v2").unwrap();

        engine
            .layer_from_dockerfile(&dockerfile, &target, None, None)
            .await
            .unwrap();
        assert_eq!(fake.count("build"), 1);
        assert_eq!(fake.count("tag"), 1);
        assert_eq!(fake.count("push"), 1);
    }

    #[tokio::test]
    async fn test_missing_dockerfile_is_precondition() {
        let fx = fixture();
        let fake = Arc::new(FakeEngine::new());
        let engine = layering(&fake, fx.config.clone());
        let err = engine
            .layer_from_dockerfile(
                &fx.work.path().join("nope"),
                &ImageReference::parse("acme/app:v1").unwrap(),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::Precondition { .. }));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_output_is_streamed() {
        let fx = fixture();
        let fake = Arc::new(FakeEngine::new().with_image(SOURCE, plain_image()));
        let engine = layering(&fake, fx.config.clone());
        let (tx, stream) = output_channel(64);

        engine
            .layer_remote_if_needed(&source(), None, Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let lines: Vec<String> = stream.map(|l| l.line).collect().await;
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("building"));
    }
}
