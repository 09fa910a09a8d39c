use thiserror::Error;

/// Coarse classification of a [`SealError`].
///
/// Pipeline orchestration retries only the classes it knows how to retry;
/// everything else surfaces unchanged so the caller can render a precise
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Registry propagation lag or a network blip. Retried locally.
    Transient,
    /// Access refused by the registry or the build service.
    Permission,
    /// Malformed input. Never retried.
    Validation,
    /// A required file, binary or config is missing. Never retried.
    Precondition,
    /// A container build or a remote verifiable build failed.
    BuildFailure,
    /// Everything else.
    Fatal,
}

/// Sealcraft error types
#[derive(Error, Debug)]
pub enum SealError {
    /// Digest string or bytes are not a sha256 content digest
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Git commit reference is not 40 hex characters
    #[error("Invalid commit SHA '{0}': expected 40 hexadecimal characters")]
    InvalidCommitSha(String),

    /// Image reference could not be parsed
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    /// Any other rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A precondition for the operation does not hold
    #[error("{message}")]
    Precondition {
        message: String,
        hint: Option<String>,
    },

    /// A container engine invocation exited non-zero
    #[error("{program} exited with status {status:?}")]
    Subprocess {
        program: String,
        status: Option<i32>,
        output: String,
    },

    /// Local container build failed
    #[error("Image build failed for {reference}:\n{output}")]
    ImageBuild { reference: String, output: String },

    /// Registry rejected the push for lack of access
    #[error("Permission denied pushing {reference}")]
    PushDenied { reference: String, output: String },

    /// Registry rejected the push for another reason
    #[error("Failed to push {reference}:\n{output}")]
    PushFailed { reference: String, output: String },

    /// The registry does not (yet) serve a manifest for the reference
    #[error("Manifest not found for {0}")]
    ManifestNotFound(String),

    /// Pushed image never became visible in the registry
    #[error("Image {reference} not visible in registry after {attempts} attempts")]
    PushNotVisible { reference: String, attempts: u32 },

    /// Digest could not be resolved after exhausting retries
    #[error("Could not resolve digest for {reference} after {attempts} attempts: {message}")]
    DigestUnresolved {
        reference: String,
        attempts: u32,
        message: String,
    },

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Build service returned an error or could not be reached
    #[error("Build service error: {message}")]
    BuildService {
        status_code: Option<u16>,
        message: String,
    },

    /// Network transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Verifiable build finished with status FAILED
    #[error("Build {build_id} failed: {message}")]
    RemoteBuildFailed { build_id: String, message: String },

    /// Provenance of a build could not be verified
    #[error("Provenance of build {build_id} not verified: {reason}")]
    ProvenanceUnverified { build_id: String, reason: String },

    /// Build status moved in a direction the state machine forbids
    #[error("Invalid build status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation was cancelled cooperatively
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl SealError {
    /// Classify this error for retry and rendering decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            SealError::InvalidDigest(_)
            | SealError::InvalidCommitSha(_)
            | SealError::InvalidReference(_)
            | SealError::Validation(_) => ErrorClass::Validation,
            SealError::Precondition { .. } | SealError::Config(_) => ErrorClass::Precondition,
            SealError::PushDenied { .. }
            | SealError::BuildService {
                status_code: Some(401 | 403),
                ..
            } => ErrorClass::Permission,
            // 408 and 429 are retryable, other 4xx are not.
            SealError::BuildService {
                status_code: Some(code),
                ..
            } if (400..500).contains(code) && !matches!(*code, 408 | 429) => ErrorClass::Fatal,
            SealError::ManifestNotFound(_)
            | SealError::Registry { .. }
            | SealError::BuildService { .. }
            | SealError::Network(_) => ErrorClass::Transient,
            SealError::ImageBuild { .. } | SealError::RemoteBuildFailed { .. } => {
                ErrorClass::BuildFailure
            }
            _ => ErrorClass::Fatal,
        }
    }

    /// Remediation text for the user, when one exists.
    pub fn hint(&self) -> Option<String> {
        match self {
            SealError::Precondition { hint, .. } => hint.clone(),
            SealError::PushDenied { reference, .. } => Some(format!(
                "Re-authenticate with the registry (e.g. `docker login`) and check that your \
                 account can push to {}",
                reference
            )),
            SealError::PushNotVisible { reference, .. } => Some(format!(
                "The push reported success but the registry does not serve it yet. \
                 Check manually with `docker manifest inspect {}`",
                reference
            )),
            SealError::DigestUnresolved { reference, .. } => Some(format!(
                "Verify the image exists with `docker manifest inspect {}` and retry",
                reference
            )),
            SealError::ProvenanceUnverified { build_id, .. } => Some(format!(
                "Inspect the build with `sealcraft build verify {}`",
                build_id
            )),
            _ => None,
        }
    }

    /// Build a precondition error with a remediation hint.
    pub fn precondition(message: impl Into<String>, hint: impl Into<String>) -> Self {
        SealError::Precondition {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }
}

impl From<serde_json::Error> for SealError {
    fn from(err: serde_json::Error) -> Self {
        SealError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SealError {
    fn from(err: serde_yaml::Error) -> Self {
        SealError::Serialization(err.to_string())
    }
}

/// Result type alias for sealcraft operations
pub type Result<T> = std::result::Result<T, SealError>;
