//! Release composition.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sealcraft_core::digest::Digest;
use sealcraft_core::error::Result;
use sealcraft_core::release::{Artifact, Release};

/// Source of "now" in unix seconds.
pub type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Assembles [`Release`] values.
pub struct ReleaseComposer {
    grace: Duration,
    clock: Clock,
}

impl ReleaseComposer {
    /// Composer whose releases must be applied within `grace` of creation.
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            clock: Box::new(system_clock),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Compose a release from a digest string.
    ///
    /// The digest may come from an external service; it must decode to
    /// exactly 32 bytes or no release is produced.
    pub fn compose_release(
        &self,
        digest: &str,
        registry: &str,
        public_env: Vec<u8>,
        encrypted_env: Vec<u8>,
    ) -> Result<Release> {
        let digest = Digest::decode_lenient(digest)?;
        Ok(self.compose(digest, registry, public_env, encrypted_env))
    }

    /// Compose a release from an already validated digest.
    pub fn compose(
        &self,
        digest: Digest,
        registry: &str,
        public_env: Vec<u8>,
        encrypted_env: Vec<u8>,
    ) -> Release {
        let upgrade_by_time = (self.clock)().saturating_add(self.grace.as_secs());
        tracing::debug!(
            digest = %digest,
            registry = %registry,
            upgrade_by_time,
            "Composed release"
        );
        Release {
            artifacts: vec![Artifact {
                digest,
                registry: registry.to_string(),
            }],
            upgrade_by_time,
            public_env,
            encrypted_env,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealcraft_core::error::SealError;

    fn composer() -> ReleaseComposer {
        ReleaseComposer::new(Duration::from_secs(3_600)).with_clock(Box::new(|| 1_700_000_000))
    }

    #[test]
    fn test_compose_release() {
        let hex = "0f".repeat(32);
        let release = composer()
            .compose_release(
                &format!("sha256:{}", hex),
                "docker.io/acme/app",
                b"{}".to_vec(),
                b"blob".to_vec(),
            )
            .unwrap();

        assert_eq!(release.upgrade_by_time, 1_700_003_600);
        let artifact = release.primary_artifact().unwrap();
        assert_eq!(artifact.digest.hex(), hex);
        assert_eq!(artifact.registry, "docker.io/acme/app");
        assert_eq!(release.public_env, b"{}");
        assert_eq!(release.encrypted_env, b"blob");
    }

    #[test]
    fn test_bare_hex_digest_accepted() {
        let release = composer()
            .compose_release(&"ab".repeat(32), "ghcr.io/acme/app", vec![], vec![])
            .unwrap();
        assert_eq!(release.artifacts.len(), 1);
    }

    #[test]
    fn test_short_and_long_digests_rejected() {
        for bytes in [31usize, 33] {
            let digest = format!("sha256:{}", "ab".repeat(bytes));
            let err = composer()
                .compose_release(&digest, "docker.io/acme/app", vec![], vec![])
                .unwrap_err();
            assert!(matches!(err, SealError::InvalidDigest(_)), "{} bytes", bytes);
        }
    }

    #[test]
    fn test_non_hex_digest_rejected() {
        let err = composer()
            .compose_release("sha256:not-hex", "docker.io/acme/app", vec![], vec![])
            .unwrap_err();
        assert!(matches!(err, SealError::InvalidDigest(_)));
    }

    #[test]
    fn test_system_clock_is_recent() {
        let release = ReleaseComposer::new(Duration::from_secs(60)).compose(
            Digest::from_slice(&[1u8; 32]).unwrap(),
            "docker.io/acme/app",
            vec![],
            vec![],
        );
        assert!(release.upgrade_by_time > 1_600_000_000);
    }
}
