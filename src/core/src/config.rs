//! Sealcraft configuration.
//!
//! `SealConfig` is read from `~/.sealcraft/config.yaml` (or an explicit
//! path) and falls back to defaults. Per-environment endpoints, KMS key
//! material and retry policies are derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SealError};

/// File name of the KMS encryption public key inside a key directory.
pub const KMS_ENCRYPTION_KEY_FILE: &str = "kms-encryption-public-key.pem";

/// File name of the KMS signing public key inside a key directory.
pub const KMS_SIGNING_KEY_FILE: &str = "kms-signing-public-key.pem";

/// Environment variable selecting the deployment environment.
pub const ENV_ENVIRONMENT: &str = "SEALCRAFT_ENV";

/// Environment variable overriding the assets directory.
pub const ENV_ASSETS_DIR: &str = "SEALCRAFT_ASSETS_DIR";

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testnet => "testnet",
            Environment::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" => Ok(Environment::Testnet),
            "mainnet" => Ok(Environment::Mainnet),
            other => Err(SealError::Config(format!("unknown environment '{}'", other))),
        }
    }
}

/// Build flavour of the platform binaries and keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Dev,
    #[default]
    Prod,
}

impl BuildType {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildType::Dev => "dev",
            BuildType::Prod => "prod",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(BuildType::Dev),
            "prod" => Ok(BuildType::Prod),
            other => Err(SealError::Config(format!("unknown build type '{}'", other))),
        }
    }
}

/// Service endpoints for one (environment, build type) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub environment: Environment,
    pub build_type: BuildType,
    /// KMS server the in-image secret-fetch client talks to
    pub kms_server_url: String,
    /// User API the in-image client reports to
    pub user_api_url: String,
    /// Verifiable build service
    pub build_api_url: String,
}

impl EnvironmentConfig {
    /// Look up the endpoints for an environment and build type.
    pub fn resolve(environment: Environment, build_type: BuildType) -> Self {
        let (kms, user_api, build_api) = match (environment, build_type) {
            (Environment::Development, _) => (
                "http://kms.dev.sealcraft.io:8080",
                "https://api.dev.sealcraft.io",
                "https://builds.dev.sealcraft.io",
            ),
            (Environment::Testnet, BuildType::Dev) => (
                "http://kms.testnet-dev.sealcraft.io:8080",
                "https://api.testnet-dev.sealcraft.io",
                "https://builds.testnet-dev.sealcraft.io",
            ),
            (Environment::Testnet, BuildType::Prod) => (
                "http://kms.testnet.sealcraft.io:8080",
                "https://api.testnet.sealcraft.io",
                "https://builds.testnet.sealcraft.io",
            ),
            (Environment::Mainnet, BuildType::Dev) => (
                "http://kms.mainnet-dev.sealcraft.io:8080",
                "https://api.mainnet-dev.sealcraft.io",
                "https://builds.mainnet-dev.sealcraft.io",
            ),
            (Environment::Mainnet, BuildType::Prod) => (
                "http://kms.mainnet.sealcraft.io:8080",
                "https://api.mainnet.sealcraft.io",
                "https://builds.mainnet.sealcraft.io",
            ),
        };

        Self {
            environment,
            build_type,
            kms_server_url: kms.to_string(),
            user_api_url: user_api.to_string(),
            build_api_url: build_api.to_string(),
        }
    }
}

/// PEM-encoded KMS public keys for one (environment, build type) pair.
///
/// Loaded once at startup and handed to every component that needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsKeys {
    pub encryption_public_key_pem: String,
    pub signing_public_key_pem: String,
}

impl KmsKeys {
    /// Directory holding the keys: `<assets>/keys/<environment>/<build_type>`.
    pub fn dir(assets_dir: &Path, environment: Environment, build_type: BuildType) -> PathBuf {
        assets_dir
            .join("keys")
            .join(environment.as_str())
            .join(build_type.as_str())
    }

    /// Read both keys from the assets directory.
    pub fn load(assets_dir: &Path, environment: Environment, build_type: BuildType) -> Result<Self> {
        let dir = Self::dir(assets_dir, environment, build_type);
        let read = |name: &str| -> Result<String> {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|e| {
                SealError::precondition(
                    format!("Failed to read KMS key {}: {}", path.display(), e),
                    format!(
                        "Install the {} / {} key material under {}",
                        environment,
                        build_type,
                        dir.display()
                    ),
                )
            })
        };

        Ok(Self {
            encryption_public_key_pem: read(KMS_ENCRYPTION_KEY_FILE)?,
            signing_public_key_pem: read(KMS_SIGNING_KEY_FILE)?,
        })
    }
}

/// Where the wrapper script sends the application's output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRedirect {
    /// Leave stdout/stderr untouched
    #[default]
    Off,
    /// Always mirror output to the platform console
    Always,
}

impl LogRedirect {
    pub fn as_str(self) -> &'static str {
        match self {
            LogRedirect::Off => "off",
            LogRedirect::Always => "always",
        }
    }
}

impl FromStr for LogRedirect {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LogRedirect::Off),
            "always" => Ok(LogRedirect::Always),
            other => Err(SealError::Config(format!("unknown log redirect mode '{}'", other))),
        }
    }
}

/// Delay between attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay after every failed attempt
    Fixed { delay_ms: u64 },
    /// Delay after attempt `n` is `delays_ms[n]`; the last entry repeats
    Schedule { delays_ms: Vec<u64> },
}

/// Bounded retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Digest resolution after a push: 3 attempts, 5 s apart.
    pub fn digest_resolution() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed { delay_ms: 5_000 },
        }
    }

    /// Push visibility check: 5 attempts, escalating 2/4/8/16 s.
    pub fn push_verification() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Schedule {
                delays_ms: vec![2_000, 4_000, 8_000, 16_000],
            },
        }
    }

    /// Delay to wait after the given failed attempt (0-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = match &self.backoff {
            Backoff::Fixed { delay_ms } => *delay_ms,
            Backoff::Schedule { delays_ms } => delays_ms
                .get(attempt as usize)
                .or_else(|| delays_ms.last())
                .copied()
                .unwrap_or(0),
        };
        Duration::from_millis(ms)
    }
}

/// Top-level sealcraft configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub environment: Environment,

    pub build_type: BuildType,

    /// Base directory of bundled binaries and key material
    pub assets_dir: PathBuf,

    /// Target platform for builds and pulls
    pub platform: String,

    /// Container engine CLI
    pub container_engine: String,

    /// Log redirection mode baked into layered images
    pub log_redirect: LogRedirect,

    /// Seconds added to "now" for a release's upgrade deadline
    pub upgrade_grace_secs: u64,

    /// Upper bound on waiting for a verifiable build
    pub build_wait_timeout_secs: u64,

    /// Interval between build status/log polls
    pub build_poll_interval_ms: u64,

    /// Retry policy for digest resolution
    pub digest_retry: RetryPolicy,

    /// Retry policy for push visibility checks
    pub push_verify_retry: RetryPolicy,

    /// Override for the build service URL
    pub build_api_url: Option<String>,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            build_type: BuildType::default(),
            assets_dir: default_home().join("assets"),
            platform: "linux/amd64".to_string(),
            container_engine: "docker".to_string(),
            log_redirect: LogRedirect::default(),
            upgrade_grace_secs: 3_600,
            build_wait_timeout_secs: 3_600,
            build_poll_interval_ms: 2_000,
            digest_retry: RetryPolicy::digest_resolution(),
            push_verify_retry: RetryPolicy::push_verification(),
            build_api_url: None,
        }
    }
}

impl SealConfig {
    /// Default config file location (`~/.sealcraft/config.yaml`).
    pub fn default_path() -> PathBuf {
        default_home().join("config.yaml")
    }

    /// Load from a YAML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            SealError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: SealConfig = serde_yaml::from_str(&data)?;
        config.apply_env_overrides()?;
        tracing::debug!(
            path = %path.display(),
            environment = %config.environment,
            build_type = %config.build_type,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load the default file if it exists, otherwise use defaults.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            return Self::load(&path);
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(env) = std::env::var(ENV_ENVIRONMENT) {
            self.environment = env.parse()?;
        }
        if let Ok(dir) = std::env::var(ENV_ASSETS_DIR) {
            self.assets_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Endpoints for the configured environment, with overrides applied.
    pub fn endpoints(&self) -> EnvironmentConfig {
        let mut endpoints = EnvironmentConfig::resolve(self.environment, self.build_type);
        if let Some(ref url) = self.build_api_url {
            endpoints.build_api_url = url.clone();
        }
        endpoints
    }

    /// KMS key material for the configured environment.
    pub fn kms_keys(&self) -> Result<KmsKeys> {
        KmsKeys::load(&self.assets_dir, self.environment, self.build_type)
    }

    pub fn upgrade_grace(&self) -> Duration {
        Duration::from_secs(self.upgrade_grace_secs)
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".sealcraft"))
        .unwrap_or_else(|| PathBuf::from(".sealcraft"))
}
