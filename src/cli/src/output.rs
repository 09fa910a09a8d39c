//! Table formatting and progress output helpers.

use comfy_table::{ContentArrangement, Table};
use sealcraft_core::BuildRecord;
use sealcraft_runtime::{output_channel, OutputLine, DEFAULT_OUTPUT_CAPACITY};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Shorten `sha256:<hex>` to its first 12 hex characters.
pub fn short_digest(digest: &str) -> String {
    let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
    let truncated = if hex.len() > 12 { &hex[..12] } else { hex };
    format!("sha256:{truncated}")
}

/// Shorten a commit SHA to 8 characters.
pub fn short_commit(sha: &str) -> &str {
    if sha.len() > 8 {
        &sha[..8]
    } else {
        sha
    }
}

/// Render build records as a table.
pub fn builds_table(records: &[BuildRecord]) -> Table {
    let mut table = new_table(&["BUILD ID", "STATUS", "REPOSITORY", "COMMIT", "IMAGE", "CREATED"]);
    for record in records {
        let image = record
            .image_digest
            .as_deref()
            .map(short_digest)
            .unwrap_or_else(|| "<none>".to_string());
        let created = record
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        table.add_row(vec![
            record.build_id.clone(),
            record.status.to_string(),
            record.repo_url.clone(),
            short_commit(&record.git_ref).to_string(),
            image,
            created,
        ]);
    }
    table
}

/// Print container engine output to stderr until the sender side closes.
pub fn spawn_output_printer(quiet: bool) -> (mpsc::Sender<OutputLine>, JoinHandle<()>) {
    let (tx, mut stream) = output_channel(DEFAULT_OUTPUT_CAPACITY);
    let handle = tokio::spawn(async move {
        while let Some(line) = stream.next().await {
            if !quiet {
                eprintln!("{}", line.line);
            }
        }
    });
    (tx, handle)
}

/// Print streamed build log chunks to stderr until the sender side closes.
pub fn spawn_log_printer() -> (mpsc::Sender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(DEFAULT_OUTPUT_CAPACITY);
    let handle = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            eprint!("{chunk}");
        }
    });
    (tx, handle)
}
