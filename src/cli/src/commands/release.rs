//! `sealcraft release` command.

use std::path::PathBuf;

use clap::Args;
use sealcraft_core::{BuildRequest, Digest, Release};
use sealcraft_runtime::{DeployTarget, ImageReference, ReleasePipeline, WaitOptions};

use crate::context::Context;
use crate::output;

#[derive(Args)]
pub struct ReleaseArgs {
    /// Application the private environment is encrypted for
    #[arg(long)]
    pub app_id: String,

    /// Instance type recorded in the public environment
    #[arg(long, default_value = "g1-standard-4t")]
    pub instance_type: String,

    /// Environment file (KEY=VALUE; *_PUBLIC keys stay in plaintext)
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Registry image to release (layered first if needed)
    #[arg(long, conflicts_with_all = ["dockerfile", "repo"])]
    pub image: Option<String>,

    /// Dockerfile to build, layer and release
    #[arg(short = 'f', long, requires = "tag", conflicts_with = "repo")]
    pub dockerfile: Option<PathBuf>,

    /// Target reference for the Dockerfile build
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Repository for a verifiable build
    #[arg(long, requires = "commit")]
    pub repo: Option<String>,

    /// Full 40-character commit SHA for a verifiable build
    #[arg(long)]
    pub commit: Option<String>,

    /// Dockerfile path inside the repository
    #[arg(long, default_value = "Dockerfile")]
    pub build_dockerfile: String,

    /// Build context inside the repository
    #[arg(long, default_value = ".")]
    pub build_context: String,

    /// Digest of a verifiable build this build depends on (repeatable)
    #[arg(long = "dependency")]
    pub dependencies: Vec<String>,

    /// Write the release JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suppress build output
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(ctx: &Context, args: ReleaseArgs) -> Result<(), Box<dyn std::error::Error>> {
    let keys = ctx.keys()?;
    let pipeline = ReleasePipeline::from_config(&ctx.config, &keys, ctx.engine(), ctx.cancel.clone())?;
    let target = DeployTarget::new(args.app_id.clone(), args.instance_type.clone());
    let env_file = args.env_file.as_deref();

    let release = if let (Some(repo), Some(commit)) = (&args.repo, &args.commit) {
        let mut request = BuildRequest::new(repo.clone(), commit.clone());
        request.dockerfile_path = args.build_dockerfile.clone();
        request.build_context_path = args.build_context.clone();
        request.dependencies = args
            .dependencies
            .iter()
            .map(|d| Digest::parse(d))
            .collect::<Result<_, _>>()?;

        let pipeline = pipeline.with_build_api(
            ctx.build_api()?,
            &keys,
            WaitOptions::from_config(&ctx.config),
        )?;
        let (tx, printer) = output::spawn_log_printer();
        let sink = (!args.quiet).then_some(&tx);
        let result = pipeline
            .from_verifiable_build(&request, env_file, &target, sink)
            .await;
        drop(tx);
        let _ = printer.await;

        let verified = result?;
        eprintln!(
            "Build {} verified ({}@{})",
            verified.build.build_id,
            verified.build.repo_url,
            output::short_commit(&verified.build.git_ref)
        );
        verified.release
    } else {
        let (tx, printer) = output::spawn_output_printer(args.quiet);
        let result = match (&args.dockerfile, &args.tag, &args.image) {
            (Some(dockerfile), Some(tag), _) => {
                let image = ImageReference::parse(tag)?;
                pipeline
                    .from_dockerfile(dockerfile, &image, env_file, &target, Some(&tx))
                    .await
            }
            (_, _, Some(image)) => {
                let source = ImageReference::parse(image)?;
                pipeline.from_image(&source, env_file, &target, Some(&tx)).await
            }
            _ => return Err("one of --image, --dockerfile with --tag, or --repo with --commit is required".into()),
        };
        drop(tx);
        let _ = printer.await;
        result?
    };

    write_release(&release, args.output.as_ref())
}

fn write_release(release: &Release, path: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(release)?;
    match path {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))?;
            eprintln!("Release written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
