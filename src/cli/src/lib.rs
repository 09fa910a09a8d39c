//! Sealcraft CLI - layer images and prepare confidential releases.

pub mod commands;
pub mod context;
pub mod output;
