//! Per-invocation state shared by the commands.

use std::path::PathBuf;
use std::sync::Arc;

use sealcraft_core::{Environment, KmsKeys, SealConfig};
use sealcraft_runtime::{DockerCli, HttpBuildApi, ProcessRunner};
use tokio_util::sync::CancellationToken;

/// Loaded configuration plus the cancellation token tied to Ctrl-C.
pub struct Context {
    pub config: SealConfig,
    pub cancel: CancellationToken,
}

impl Context {
    /// Load configuration, apply command-line overrides and arm Ctrl-C.
    pub fn load(
        config_path: Option<&PathBuf>,
        environment: Option<Environment>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = match config_path {
            Some(path) => SealConfig::load(path)?,
            None => SealConfig::load_or_default()?,
        };
        if let Some(env) = environment {
            config.environment = env;
        }

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                on_interrupt.cancel();
            }
        });

        Ok(Self { config, cancel })
    }

    pub fn keys(&self) -> Result<KmsKeys, Box<dyn std::error::Error>> {
        Ok(self.config.kms_keys()?)
    }

    /// Container engine bound to this invocation's cancellation.
    pub fn engine(&self) -> Arc<DockerCli> {
        Arc::new(DockerCli::new(ProcessRunner::with_cancellation(
            self.config.container_engine.clone(),
            self.cancel.clone(),
        )))
    }

    pub fn build_api(&self) -> Result<Arc<HttpBuildApi>, Box<dyn std::error::Error>> {
        Ok(Arc::new(HttpBuildApi::new(self.config.endpoints().build_api_url)?))
    }
}
