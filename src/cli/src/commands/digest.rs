//! `sealcraft digest` command.

use clap::Args;
use sealcraft_runtime::{ImageReference, RegistryAuth, RegistryClient};

#[derive(Args)]
pub struct DigestArgs {
    /// Image reference (e.g., "nginx:1.27", "ghcr.io/org/image:tag")
    pub image: String,
}

pub async fn execute(args: DigestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reference = ImageReference::parse(&args.image)?;
    let client = RegistryClient::new(RegistryAuth::from_env())?;
    let digest = client.resolve_digest(&reference).await?;
    println!("{digest}");
    Ok(())
}
