//! Layering labels.
//!
//! Images produced by the layering engine carry labels in the
//! `io.sealcraft.*` namespace. The presence of [`LAYERED_BY_LABEL`] marks an
//! image as already layered, which makes layering idempotent.
//!
//! # Label Schema
//!
//! - `io.sealcraft.layered-by` - sealcraft version that performed the layering
//! - `io.sealcraft.log-redirect` - log redirection mode baked into the wrapper
//! - `io.sealcraft.tls` - `"true"` when the TLS front-end is included
//!
//! # Example
//!
//! ```dockerfile
//! LABEL io.sealcraft.layered-by="0.1.0"
//! LABEL io.sealcraft.log-redirect="off"
//! LABEL io.sealcraft.tls="false"
//! ```

use std::collections::HashMap;

/// Marker label identifying the sealcraft version that layered the image.
pub const LAYERED_BY_LABEL: &str = "io.sealcraft.layered-by";

/// Log redirection mode of the wrapper script.
pub const LOG_REDIRECT_LABEL: &str = "io.sealcraft.log-redirect";

/// Whether the TLS front-end was included.
pub const TLS_LABEL: &str = "io.sealcraft.tls";

/// Sealcraft labels parsed from an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayeringLabels {
    /// Version that performed the layering
    pub layered_by: Option<String>,

    /// Log redirection mode
    pub log_redirect: Option<String>,

    /// TLS front-end included
    pub tls: bool,
}

impl LayeringLabels {
    /// Parse sealcraft labels, ignoring everything else.
    pub fn from_labels(labels: &HashMap<String, String>) -> Self {
        let mut parsed = Self::default();

        for (key, value) in labels {
            match key.as_str() {
                LAYERED_BY_LABEL => parsed.layered_by = Some(value.clone()),
                LOG_REDIRECT_LABEL => parsed.log_redirect = Some(value.clone()),
                TLS_LABEL => parsed.tls = value == "true",
                _ => {}
            }
        }

        parsed
    }

    /// Whether the marker label is present.
    pub fn is_layered(&self) -> bool {
        self.layered_by.is_some()
    }
}
