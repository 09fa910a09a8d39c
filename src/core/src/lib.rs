//! Sealcraft Core - Foundational Types
//!
//! Errors, configuration, content digests, the release artifact and the
//! verifiable build model shared by the sealcraft runtime and CLI.

pub mod build;
pub mod config;
pub mod digest;
pub mod error;
pub mod release;

// Re-export commonly used types
pub use build::{
    Build, BuildIdentifier, BuildRecord, BuildRequest, BuildStatus, CommitSha,
    ProvenanceVerificationResult,
};
pub use config::{
    Backoff, BuildType, Environment, EnvironmentConfig, KmsKeys, LogRedirect, RetryPolicy,
    SealConfig,
};
pub use digest::Digest;
pub use error::{ErrorClass, Result, SealError};
pub use release::{Artifact, Release, TxResult};

/// Sealcraft version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
