//! Image metadata from the container engine.
//!
//! Parses the JSON printed by `image inspect` into the handful of fields
//! layering needs: the original command, user and labels.

use std::collections::HashMap;

use sealcraft_core::error::{Result, SealError};
use serde::Deserialize;

use super::labels::LayeringLabels;

/// Introspected metadata of a local image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Reference the image was inspected under
    pub reference: String,

    /// Entrypoint
    pub entrypoint: Vec<String>,

    /// Default command arguments
    pub cmd: Vec<String>,

    /// User to run as; empty means the image default (root)
    pub user: String,

    /// Labels
    pub labels: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    #[serde(default)]
    config: Option<InspectConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    entrypoint: Option<Vec<String>>,
    #[serde(default)]
    cmd: Option<Vec<String>>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

impl ImageMetadata {
    /// Parse `image inspect` output (a JSON array with one entry).
    pub fn from_inspect_json(reference: &str, json: &str) -> Result<Self> {
        let entries: Vec<InspectEntry> = serde_json::from_str(json)?;
        let entry = entries.into_iter().next().ok_or_else(|| SealError::Other(format!(
            "image inspect returned no entries for {}",
            reference
        )))?;
        let config = entry.config.unwrap_or(InspectConfig {
            entrypoint: None,
            cmd: None,
            user: None,
            labels: None,
        });

        Ok(Self {
            reference: reference.to_string(),
            entrypoint: config.entrypoint.unwrap_or_default(),
            cmd: config.cmd.unwrap_or_default(),
            user: config.user.unwrap_or_default(),
            labels: config.labels.unwrap_or_default(),
        })
    }

    /// Sealcraft labels of this image.
    pub fn layering_labels(&self) -> LayeringLabels {
        LayeringLabels::from_labels(&self.labels)
    }

    /// Whether the image already carries the layering marker.
    pub fn is_layered(&self) -> bool {
        self.layering_labels().is_layered()
    }

    /// Entrypoint followed by cmd: what the container would have executed.
    pub fn original_command(&self) -> Vec<String> {
        self.entrypoint
            .iter()
            .chain(self.cmd.iter())
            .cloned()
            .collect()
    }

    /// [`Self::original_command`] as a JSON array literal, ready to paste into
    /// a Dockerfile `CMD`.
    pub fn original_command_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.original_command())?)
    }
}
