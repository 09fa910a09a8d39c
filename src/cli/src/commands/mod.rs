//! CLI command definitions and dispatch.

mod build;
mod digest;
mod layer;
mod release;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sealcraft_core::Environment;

use crate::context::Context;

pub use build::{BuildArgs, BuildCommand};
pub use digest::DigestArgs;
pub use layer::LayerArgs;
pub use release::ReleaseArgs;

/// Sealcraft: layer container images and prepare confidential releases.
#[derive(Parser)]
#[command(name = "sealcraft", version, about)]
pub struct Cli {
    /// Verbose logging (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ~/.sealcraft/config.yaml)
    #[arg(long, global = true, env = "SEALCRAFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deployment environment (development, testnet, mainnet)
    #[arg(long, global = true, value_parser = parse_environment)]
    pub env: Option<Environment>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Layer a Dockerfile or registry image and push it
    Layer(LayerArgs),
    /// Prepare a release from a Dockerfile, an image or a verifiable build
    Release(ReleaseArgs),
    /// Verifiable builds
    Build(BuildArgs),
    /// Resolve an image tag to its content digest through the registry API
    Digest(DigestArgs),
}

fn parse_environment(s: &str) -> Result<Environment, String> {
    s.parse().map_err(|e: sealcraft_core::SealError| e.to_string())
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let command = match cli.command {
        // The registry lookup needs no configuration.
        Command::Digest(args) => return digest::execute(args).await,
        other => other,
    };

    let ctx = Context::load(cli.config.as_ref(), cli.env)?;
    match command {
        Command::Layer(args) => layer::execute(&ctx, args).await,
        Command::Release(args) => release::execute(&ctx, args).await,
        Command::Build(args) => build::execute(&ctx, args).await,
        Command::Digest(args) => digest::execute(args).await,
    }
}
