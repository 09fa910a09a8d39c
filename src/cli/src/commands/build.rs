//! `sealcraft build` commands.

use clap::{Args, Subcommand};
use sealcraft_core::{BuildIdentifier, BuildRequest, Digest, ProvenanceVerificationResult};
use sealcraft_runtime::{BuildClient, ProvenanceVerifier, WaitOptions};

use crate::context::Context;
use crate::output;

#[derive(Args)]
pub struct BuildArgs {
    #[command(subcommand)]
    pub command: BuildCommand,
}

#[derive(Subcommand)]
pub enum BuildCommand {
    /// Submit a verifiable build
    Submit {
        /// Git repository URL
        #[arg(long)]
        repo: String,
        /// Full 40-character commit SHA
        #[arg(long)]
        commit: String,
        /// Dockerfile path inside the repository
        #[arg(long, default_value = "Dockerfile")]
        dockerfile: String,
        /// Build context inside the repository
        #[arg(long, default_value = ".")]
        context: String,
        /// Caddyfile path inside the repository
        #[arg(long)]
        caddyfile: Option<String>,
        /// Digest of a build this one depends on (repeatable)
        #[arg(long = "dependency")]
        dependencies: Vec<String>,
        /// Follow the build until it finishes
        #[arg(short, long)]
        wait: bool,
    },
    /// Follow a build, streaming its log
    Wait {
        build_id: String,
    },
    /// Show a build and its dependency tree
    Get {
        build_id: String,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a build's log
    Logs {
        build_id: String,
    },
    /// List builds for a billing address
    List {
        billing_address: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Verify provenance by build id, image digest or commit SHA
    Verify {
        identifier: String,
    },
}

pub async fn execute(ctx: &Context, args: BuildArgs) -> Result<(), Box<dyn std::error::Error>> {
    let api = ctx.build_api()?;
    let client = BuildClient::new(api.clone());

    match args.command {
        BuildCommand::Submit {
            repo,
            commit,
            dockerfile,
            context,
            caddyfile,
            dependencies,
            wait,
        } => {
            let mut request = BuildRequest::new(repo, commit);
            request.dockerfile_path = dockerfile;
            request.build_context_path = context;
            request.caddyfile_path = caddyfile;
            request.dependencies = dependencies
                .iter()
                .map(|d| Digest::parse(d))
                .collect::<Result<_, _>>()?;

            let build_id = client.submit(&request).await?;
            println!("{build_id}");
            if wait {
                follow(ctx, &client, &build_id).await?;
            }
        }
        BuildCommand::Wait { build_id } => follow(ctx, &client, &build_id).await?,
        BuildCommand::Get { build_id, json } => {
            let build = client.get(&build_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&build)?);
            } else {
                println!("Build:      {}", build.build_id);
                println!("Status:     {}", build.status);
                println!("Repository: {}", build.repo_url);
                println!("Commit:     {}", build.git_ref);
                println!("Dockerfile: {}", build.dockerfile_path);
                if let Some(ref url) = build.image_url {
                    println!("Image:      {url}");
                }
                if let Some(ref digest) = build.image_digest {
                    println!("Digest:     {digest}");
                }
                if let Some(ref error) = build.error_message {
                    println!("Error:      {error}");
                }
                let deps = build.dependency_lines();
                if !deps.is_empty() {
                    println!("Dependencies:");
                    for line in deps {
                        println!("  {line}");
                    }
                }
            }
        }
        BuildCommand::Logs { build_id } => print!("{}", client.logs(&build_id).await?),
        BuildCommand::List {
            billing_address,
            limit,
            offset,
        } => {
            let records = client.list(&billing_address, limit, offset).await?;
            println!("{}", output::builds_table(&records));
        }
        BuildCommand::Verify { identifier } => {
            let keys = ctx.keys()?;
            let verifier = ProvenanceVerifier::from_kms_keys(api, &keys)?;
            let identifier = BuildIdentifier::parse(&identifier)?;
            match verifier.verify(&identifier).await? {
                ProvenanceVerificationResult::Verified {
                    image_url,
                    image_digest,
                    repo_url,
                    git_ref,
                    build_id,
                    ..
                } => {
                    println!("Verified build {build_id}");
                    println!("  image:  {image_url}@{image_digest}");
                    println!("  source: {repo_url}@{git_ref}");
                }
                ProvenanceVerificationResult::Failed { error, build_id } => {
                    let build = build_id.map(|id| format!(" for build {id}")).unwrap_or_default();
                    return Err(format!("Provenance not verified{build}: {error}").into());
                }
            }
        }
    }
    Ok(())
}

async fn follow(ctx: &Context, client: &BuildClient, build_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, printer) = output::spawn_log_printer();
    let result = client
        .wait_for_build(build_id, &WaitOptions::from_config(&ctx.config), Some(&tx), &ctx.cancel)
        .await;
    drop(tx);
    let _ = printer.await;

    let record = result?;
    match record.image_digest {
        Some(digest) => println!("{} {} {}", record.build_id, record.status, digest),
        None => println!("{} {}", record.build_id, record.status),
    }
    Ok(())
}
