//! OCI image reference parsing.
//!
//! Parses image references like `ghcr.io/acme/app:v0.1.0` into structured components.

use sealcraft_core::digest::Digest;
use sealcraft_core::error::{Result, SealError};

/// Default registry when none is specified.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "acme/app")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `acme/app` → docker.io/acme/app:latest
    /// - `ghcr.io/acme/app:tag` → ghcr.io/acme/app:tag
    /// - `ghcr.io/acme/app@sha256:abc...` → ghcr.io/acme/app@sha256:abc...
    /// - `localhost:5000/app` → localhost:5000/app:latest
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SealError::InvalidReference("empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(SealError::InvalidReference(format!(
                        "invalid digest in '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let (name, tag) = split_tag(name_tag);
        let (registry, repository) = split_registry_repository(name, reference)?;
        validate_repository(&repository, reference)?;

        if let Some(ref t) = tag {
            if t.is_empty() || !t.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
            {
                return Err(SealError::InvalidReference(format!(
                    "invalid tag '{}' in '{}'",
                    t, reference
                )));
            }
        }

        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Image name without tag or digest, e.g. `docker.io/acme/app`.
    ///
    /// This is the `registry` field of a release artifact.
    pub fn repository_path(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Parsed digest, if the reference is pinned by one.
    pub fn pinned_digest(&self) -> Option<Result<Digest>> {
        self.digest.as_deref().map(Digest::parse)
    }

    /// Same repository, different tag, no digest.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Some(tag.into()),
            digest: None,
        }
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = self.repository_path();
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split `name[:tag]`. A colon only introduces a tag when it follows the
/// last slash and what comes after it is not a bare port number.
fn split_tag(name_tag: &str) -> (&str, Option<String>) {
    let last_segment_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
    let last_segment = &name_tag[last_segment_start..];

    match last_segment.rfind(':') {
        Some(colon) => {
            let after = &last_segment[colon + 1..];
            let is_port = last_segment_start == 0 && after.chars().all(|c| c.is_ascii_digit());
            if is_port && !after.is_empty() {
                (name_tag, None)
            } else {
                let split = last_segment_start + colon;
                (&name_tag[..split], Some(after.to_string()))
            }
        }
        None => (name_tag, None),
    }
}

/// Split a name into registry and repository components.
fn split_registry_repository(name: &str, reference: &str) -> Result<(String, String)> {
    // The first component is a registry if it looks like a hostname
    // (contains a dot or colon, or is "localhost").
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return Err(SealError::InvalidReference(format!(
                    "empty repository in '{}'",
                    reference
                )));
            }
            return Ok((first.to_string(), rest.to_string()));
        }
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    };

    Ok((DEFAULT_REGISTRY.to_string(), repository))
}

fn validate_repository(repository: &str, reference: &str) -> Result<()> {
    let valid_component = |c: &str| {
        !c.is_empty()
            && c.chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || "._-".contains(ch))
            && c.chars().next().is_some_and(|ch| ch.is_ascii_alphanumeric())
    };

    if repository.split('/').all(valid_component) {
        Ok(())
    } else {
        Err(SealError::InvalidReference(format!(
            "repository '{}' in '{}' must be lowercase alphanumerics separated by '.', '_', '-' or '/'",
            repository, reference
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX64: &str = "abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890";

    #[test]
    fn test_parse_simple_name() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, Some("latest".to_string()));
        assert_eq!(r.digest, None);
    }

    #[test]
    fn test_parse_user_repo_with_tag() {
        let r = ImageReference::parse("acme/app:v1.0").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "acme/app");
        assert_eq!(r.tag, Some("v1.0".to_string()));
    }

    #[test]
    fn test_parse_custom_registry() {
        let r = ImageReference::parse("ghcr.io/acme/app:v0.1.0").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "acme/app");
        assert_eq!(r.tag, Some("v0.1.0".to_string()));
    }

    #[test]
    fn test_parse_digest_only() {
        let r = ImageReference::parse(&format!("ghcr.io/acme/app@sha256:{}", HEX64)).unwrap();
        assert_eq!(r.tag, None);
        assert_eq!(r.digest, Some(format!("sha256:{}", HEX64)));
        assert!(r.pinned_digest().unwrap().is_ok());
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let r = ImageReference::parse("ghcr.io/acme/app:v0.1.0@sha256:abcdef12").unwrap();
        assert_eq!(r.tag, Some("v0.1.0".to_string()));
        assert_eq!(r.digest, Some("sha256:abcdef12".to_string()));
        assert!(r.pinned_digest().unwrap().is_err());
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("registry.local:5000/app:v1").unwrap();
        assert_eq!(r.registry, "registry.local:5000");
        assert_eq!(r.repository, "app");
        assert_eq!(r.tag, Some("v1".to_string()));

        let r = ImageReference::parse("localhost:5000/app").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.tag, Some("latest".to_string()));
    }

    #[test]
    fn test_parse_deep_repository_path() {
        let r = ImageReference::parse("ghcr.io/org/sub/image:v1").unwrap();
        assert_eq!(r.repository, "org/sub/image");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("nginx@invaliddigest").is_err());
        assert!(ImageReference::parse("Acme/App:v1").is_err());
        assert!(ImageReference::parse("ghcr.io/").is_err());
        assert!(ImageReference::parse("acme/app:").is_err());
        assert!(ImageReference::parse("acme//app").is_err());
    }

    #[test]
    fn test_repository_path() {
        let r = ImageReference::parse("acme/app:v1").unwrap();
        assert_eq!(r.repository_path(), "docker.io/acme/app");

        let r = ImageReference::parse("ghcr.io/acme/app:v1").unwrap();
        assert_eq!(r.repository_path(), "ghcr.io/acme/app");
    }

    #[test]
    fn test_with_tag_drops_digest() {
        let r = ImageReference::parse(&format!("acme/app@sha256:{}", HEX64)).unwrap();
        let tagged = r.with_tag("base-123");
        assert_eq!(tagged.full_reference(), "docker.io/acme/app:base-123");
    }

    #[test]
    fn test_display_round_trips() {
        let r = ImageReference::parse("nginx:1.25").unwrap();
        assert_eq!(format!("{}", r), "docker.io/library/nginx:1.25");
        assert_eq!(ImageReference::parse(&r.to_string()).unwrap(), r);
    }
}
