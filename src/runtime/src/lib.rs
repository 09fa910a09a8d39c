//! Sealcraft Runtime - image layering and release preparation.
//!
//! This crate drives the container engine, the registry and the verifiable
//! build service to turn a Dockerfile, a registry image or a source commit
//! into a [`Release`](sealcraft_core::Release) ready for submission.

#![allow(clippy::result_large_err)]

pub mod build;
pub mod layering;
pub mod oci;
pub mod process;
pub mod release;
pub mod retry;
pub mod secrets;

// Re-export common types
pub use build::{BuildApi, BuildClient, HttpBuildApi, ProvenanceVerifier, WaitOptions};
pub use layering::{LayeringAssets, LayeringConfig, LayeringEngine};
pub use oci::{ContainerEngine, DockerCli, ImageMetadata, ImageReference, RegistryAuth, RegistryClient};
pub use process::{output_channel, OutputLine, OutputSource, ProcessRunner, DEFAULT_OUTPUT_CAPACITY};
pub use release::{DeployTarget, DigestResolver, ReleaseComposer, ReleasePipeline, ReleaseSubmitter};
pub use retry::{retry, RetryError};
pub use secrets::{EnvFile, EnvironmentEncryptor, EnvironmentPayload};

/// Sealcraft Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default container engine binary.
pub const DEFAULT_CONTAINER_ENGINE: &str = "docker";
