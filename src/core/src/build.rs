//! Verifiable build model.
//!
//! A [`Build`] is created when a build request is submitted and moves
//! through a one-way state machine:
//!
//! ```text
//! BUILDING ──success──▶ SUCCESS
//!     │
//!     └─────failure───▶ FAILED
//! ```
//!
//! Dependencies are other builds, keyed by the digest of the image they
//! produced. They are resolved lazily when the canonical build is fetched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{Result, SealError};

/// Length of a full git commit SHA in hex characters.
pub const COMMIT_SHA_LEN: usize = 40;

/// Build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Building,
    Success,
    Failed,
}

impl BuildStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, BuildStatus::Building)
    }

    /// Apply a transition. Only `BUILDING -> SUCCESS` and `BUILDING -> FAILED`
    /// are valid.
    pub fn transition(self, next: BuildStatus) -> Result<BuildStatus> {
        match (self, next) {
            (BuildStatus::Building, BuildStatus::Success)
            | (BuildStatus::Building, BuildStatus::Failed) => Ok(next),
            _ => Err(SealError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            }),
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStatus::Building => "BUILDING",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A full 40-character git commit SHA, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitSha(String);

impl CommitSha {
    /// Validate a commit SHA. Hex digits are accepted in either case.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != COMMIT_SHA_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SealError::InvalidCommitSha(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommitSha {
    type Error = SealError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<CommitSha> for String {
    fn from(sha: CommitSha) -> Self {
        sha.0
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request for a verifiable build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub repo_url: String,
    pub git_ref: String,
    pub dockerfile_path: String,
    pub build_context_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caddyfile_path: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Digest>,
}

impl BuildRequest {
    pub fn new(repo_url: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            git_ref: git_ref.into(),
            dockerfile_path: "Dockerfile".to_string(),
            build_context_path: ".".to_string(),
            caddyfile_path: None,
            dependencies: Vec::new(),
        }
    }

    /// Reject requests the service would reject, before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.repo_url.trim().is_empty() {
            return Err(SealError::Validation("repository URL is empty".to_string()));
        }
        CommitSha::parse(&self.git_ref)?;
        if self.dockerfile_path.trim().is_empty() {
            return Err(SealError::Validation("Dockerfile path is empty".to_string()));
        }
        Ok(())
    }
}

/// Build record as served by the build service. Dependencies are digests
/// only; see [`Build`] for the resolved form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub build_id: String,
    pub status: BuildStatus,
    pub repo_url: String,
    pub git_ref: String,
    pub dockerfile_path: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_digest: Option<String>,
    #[serde(default)]
    pub provenance_json: Option<String>,
    #[serde(default)]
    pub provenance_signature: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Canonical build with its dependency graph resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub build_id: String,
    pub status: BuildStatus,
    pub repo_url: String,
    pub git_ref: String,
    pub dockerfile_path: String,
    pub image_url: Option<String>,
    pub image_digest: Option<String>,
    pub provenance_json: Option<String>,
    pub provenance_signature: Option<String>,
    pub dependencies: BTreeMap<Digest, Build>,
    pub error_message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Build {
    /// Attach resolved dependencies to a service record.
    pub fn from_record(record: BuildRecord, dependencies: BTreeMap<Digest, Build>) -> Self {
        Self {
            build_id: record.build_id,
            status: record.status,
            repo_url: record.repo_url,
            git_ref: record.git_ref,
            dockerfile_path: record.dockerfile_path,
            image_url: record.image_url,
            image_digest: record.image_digest,
            provenance_json: record.provenance_json,
            provenance_signature: record.provenance_signature,
            dependencies,
            error_message: record.error_message,
            created_at: record.created_at,
        }
    }

    /// Render the dependency tree, one line per dependency, sorted by digest
    /// at each level. A build reachable through several paths is listed once.
    pub fn dependency_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut seen = BTreeSet::new();
        render_dependencies(&self.dependencies, 0, &mut seen, &mut lines);
        lines
    }
}

fn render_dependencies(
    deps: &BTreeMap<Digest, Build>,
    depth: usize,
    seen: &mut BTreeSet<Digest>,
    lines: &mut Vec<String>,
) {
    for (digest, build) in deps {
        if !seen.insert(*digest) {
            continue;
        }
        lines.push(format!(
            "{}{} {} ({}@{}) {}",
            "  ".repeat(depth),
            digest,
            build.build_id,
            build.repo_url,
            build.git_ref,
            build.status
        ));
        render_dependencies(&build.dependencies, depth + 1, seen, lines);
    }
}

/// The three ways a build can be named when asking for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildIdentifier {
    ImageDigest(Digest),
    CommitSha(CommitSha),
    BuildId(String),
}

impl BuildIdentifier {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SealError::Validation("empty build identifier".to_string()));
        }
        if s.starts_with(crate::digest::SHA256_PREFIX) {
            return Digest::parse(s).map(BuildIdentifier::ImageDigest);
        }
        if let Ok(sha) = CommitSha::parse(s) {
            return Ok(BuildIdentifier::CommitSha(sha));
        }
        Ok(BuildIdentifier::BuildId(s.to_string()))
    }
}

impl fmt::Display for BuildIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildIdentifier::ImageDigest(d) => write!(f, "{}", d),
            BuildIdentifier::CommitSha(sha) => write!(f, "{}", sha),
            BuildIdentifier::BuildId(id) => f.write_str(id),
        }
    }
}

/// Outcome of provenance verification. `Failed` is an answer, not an error:
/// transport failures are reported through `Result::Err` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProvenanceVerificationResult {
    #[serde(rename_all = "camelCase")]
    Verified {
        image_url: String,
        image_digest: String,
        repo_url: String,
        git_ref: String,
        build_id: String,
        provenance_signature: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        error: String,
        #[serde(default)]
        build_id: Option<String>,
    },
}

impl ProvenanceVerificationResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, ProvenanceVerificationResult::Verified { .. })
    }

    pub fn failed(error: impl Into<String>, build_id: Option<String>) -> Self {
        ProvenanceVerificationResult::Failed {
            error: error.into(),
            build_id,
        }
    }
}
