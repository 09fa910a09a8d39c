//! Container image support.
//!
//! - [`reference`]: image reference parsing
//! - [`image`] and [`labels`]: introspected metadata and the layering marker
//! - [`engine`] and [`docker`]: the container engine seam and its CLI implementation
//! - [`registry`]: digest lookup through the registry API

pub mod docker;
pub mod engine;
pub mod image;
pub mod labels;
pub mod reference;
pub mod registry;

#[cfg(test)]
pub(crate) mod fake;

pub use docker::DockerCli;
pub use engine::{BuildSpec, ContainerEngine};
pub use image::ImageMetadata;
pub use labels::{LayeringLabels, LAYERED_BY_LABEL};
pub use reference::ImageReference;
pub use registry::{RegistryAuth, RegistryClient};
