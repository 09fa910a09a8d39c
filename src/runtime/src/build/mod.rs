//! Verifiable build service: submission, polling and provenance.

pub mod api;
pub mod client;
pub mod provenance;

#[cfg(test)]
pub(crate) mod fake;

pub use api::{BuildApi, HttpBuildApi};
pub use client::{BuildClient, WaitOptions};
pub use provenance::ProvenanceVerifier;
