//! `sealcraft layer` command.

use std::path::PathBuf;

use clap::Args;
use sealcraft_runtime::{ImageReference, LayeringConfig, LayeringEngine};

use crate::context::Context;
use crate::output;

#[derive(Args)]
pub struct LayerArgs {
    /// Registry image to layer (skipped if already layered)
    #[arg(long, conflicts_with = "dockerfile", required_unless_present = "dockerfile")]
    pub image: Option<String>,

    /// Dockerfile to build and layer
    #[arg(short = 'f', long, requires = "tag")]
    pub dockerfile: Option<PathBuf>,

    /// Target reference for the Dockerfile build
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Environment file; DOMAIN selects the TLS front-end
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Reverse-proxy config used when DOMAIN is set
    #[arg(long)]
    pub caddyfile: Option<PathBuf>,

    /// Suppress container engine output
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(ctx: &Context, args: LayerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let keys = ctx.keys()?;
    let mut config = LayeringConfig::from_seal_config(&ctx.config, &keys);
    if let Some(caddyfile) = args.caddyfile {
        config.caddyfile = caddyfile;
    }
    let engine = LayeringEngine::new(ctx.engine(), config).with_cancellation(ctx.cancel.clone());

    let (tx, printer) = output::spawn_output_printer(args.quiet);
    let result = match (&args.dockerfile, &args.tag, &args.image) {
        (Some(dockerfile), Some(tag), _) => {
            let target = ImageReference::parse(tag)?;
            engine
                .layer_from_dockerfile(dockerfile, &target, args.env_file.as_deref(), Some(&tx))
                .await
        }
        (_, _, Some(image)) => {
            let source = ImageReference::parse(image)?;
            engine
                .layer_remote_if_needed(&source, args.env_file.as_deref(), Some(&tx))
                .await
        }
        _ => return Err("either --image or --dockerfile with --tag is required".into()),
    };
    drop(tx);
    let _ = printer.await;

    println!("{}", result?);
    Ok(())
}
