//! Binaries and key material copied into the layering build context.

use std::path::{Path, PathBuf};

use sealcraft_core::config::Environment;
use sealcraft_core::error::{Result, SealError};

/// File name of the secret-fetch client in the build context.
pub const KMS_CLIENT_FILE: &str = "kms-client";

/// File name of the TLS certificate issuance binary in the build context.
pub const TLS_KEYGEN_FILE: &str = "tls-keygen";

/// Paths of the platform binaries, resolved from one configured base
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeringAssets {
    /// Environment-specific secret-fetch client
    pub kms_client: PathBuf,
    /// TLS certificate issuance binary
    pub tls_keygen: PathBuf,
}

impl LayeringAssets {
    /// `<assets>/bin/<environment>/kms-client` and `<assets>/bin/tls-keygen`.
    pub fn resolve(assets_dir: &Path, environment: Environment) -> Self {
        let bin = assets_dir.join("bin");
        Self {
            kms_client: bin.join(environment.as_str()).join(KMS_CLIENT_FILE),
            tls_keygen: bin.join(TLS_KEYGEN_FILE),
        }
    }

    /// Fail with an actionable message if a binary layering needs is missing.
    pub fn check(&self, include_tls: bool) -> Result<()> {
        require_file(&self.kms_client, "secret-fetch client")?;
        if include_tls {
            require_file(&self.tls_keygen, "TLS certificate issuer")?;
        }
        Ok(())
    }
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SealError::precondition(
            format!("{} not found at {}", what, path.display()),
            format!(
                "Install the sealcraft assets or point {} at the directory that holds them",
                sealcraft_core::config::ENV_ASSETS_DIR
            ),
        ))
    }
}
