//! Subprocess runner for container engine invocations.
//!
//! Output from stdout and stderr is collected into one transcript and, when
//! a sink is supplied, streamed line by line through a bounded channel. If
//! the consumer drops its end of the channel, or the cancellation token
//! fires, the child process is killed.

use std::process::Stdio;

use sealcraft_core::error::{Result, SealError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Default capacity of an output channel.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 256;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

/// One line of subprocess output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: OutputSource,
    pub line: String,
}

/// Create a bounded output channel. The receiver side is a `Stream`.
pub fn output_channel(capacity: usize) -> (mpsc::Sender<OutputLine>, ReceiverStream<OutputLine>) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ReceiverStream::new(rx))
}

/// Result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code, `None` if terminated by a signal.
    pub status: Option<i32>,
    /// Interleaved stdout and stderr, one line per line.
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs one program with different argument lists.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    cancel: CancellationToken,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_cancellation(program, CancellationToken::new())
    }

    /// Runner whose subprocesses are killed when `cancel` fires.
    pub fn with_cancellation(program: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            program: program.into(),
            cancel,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run to completion. A non-zero exit is not an error here; callers
    /// classify it from [`ProcessOutput`].
    pub async fn run(
        &self,
        args: &[String],
        sink: Option<&mpsc::Sender<OutputLine>>,
    ) -> Result<ProcessOutput> {
        if self.cancel.is_cancelled() {
            return Err(SealError::Cancelled(format!("{} not started", self.program)));
        }

        tracing::debug!(program = %self.program, args = ?args, "Spawning subprocess");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SealError::precondition(
                        format!("{} not found", self.program),
                        format!("Install {} and make sure it is on PATH", self.program),
                    )
                } else {
                    SealError::Subprocess {
                        program: self.program.clone(),
                        status: None,
                        output: format!("failed to spawn: {}", e),
                    }
                }
            })?;

        let stdout = child.stdout.take().ok_or_else(|| self.pipe_error("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| self.pipe_error("stderr"))?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;
        let mut transcript = String::new();

        while !(out_done && err_done) {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(self.abort(&mut child, "cancelled").await);
                }
                line = out_lines.next_line(), if !out_done => (OutputSource::Stdout, line?),
                line = err_lines.next_line(), if !err_done => (OutputSource::Stderr, line?),
            };

            match next {
                (OutputSource::Stdout, None) => out_done = true,
                (OutputSource::Stderr, None) => err_done = true,
                (source, Some(line)) => {
                    tracing::debug!(program = %self.program, "{}", line);
                    transcript.push_str(&line);
                    transcript.push('\n');
                    if let Some(tx) = sink {
                        if tx.send(OutputLine { source, line }).await.is_err() {
                            return Err(self.abort(&mut child, "output consumer went away").await);
                        }
                    }
                }
            }
        }

        let waited = tokio::select! {
            _ = self.cancel.cancelled() => None,
            status = child.wait() => Some(status?),
        };
        let Some(status) = waited else {
            return Err(self.abort(&mut child, "cancelled").await);
        };

        Ok(ProcessOutput {
            status: status.code(),
            output: transcript,
        })
    }

    async fn abort(&self, child: &mut Child, reason: &str) -> SealError {
        if let Err(e) = child.kill().await {
            tracing::warn!(program = %self.program, error = %e, "Failed to kill subprocess");
        }
        SealError::Cancelled(format!("{}: {}", self.program, reason))
    }

    fn pipe_error(&self, pipe: &str) -> SealError {
        SealError::Subprocess {
            program: self.program.clone(),
            status: None,
            output: format!("{} was not captured", pipe),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_collects_both_streams() {
        let runner = ProcessRunner::new("sh");
        let out = runner
            .run(&sh("echo hello; echo oops 1>&2"), None)
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.output.contains("hello\n"));
        assert!(out.output.contains("oops\n"));
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let runner = ProcessRunner::new("sh");
        let out = runner.run(&sh("echo failing; exit 3"), None).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.status, Some(3));
        assert!(out.output.contains("failing"));
    }

    #[tokio::test]
    async fn test_missing_program_is_precondition() {
        let runner = ProcessRunner::new("sealcraft-no-such-binary");
        let err = runner.run(&[], None).await.unwrap_err();
        assert!(matches!(err, SealError::Precondition { .. }));
    }

    #[tokio::test]
    async fn test_streams_lines_to_sink() {
        let runner = ProcessRunner::new("sh");
        let (tx, stream) = output_channel(DEFAULT_OUTPUT_CAPACITY);
        let out = runner
            .run(&sh("echo one; echo two; echo three 1>&2"), Some(&tx))
            .await
            .unwrap();
        drop(tx);
        assert!(out.success());

        let lines: Vec<OutputLine> = stream.collect().await;
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(&OutputLine {
            source: OutputSource::Stderr,
            line: "three".to_string()
        }));
        let stdout: Vec<&str> = lines
            .iter()
            .filter(|l| l.source == OutputSource::Stdout)
            .map(|l| l.line.as_str())
            .collect();
        assert_eq!(stdout, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let token = CancellationToken::new();
        let runner = ProcessRunner::with_cancellation("sh", token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let started = Instant::now();
        let err = runner.run(&sh("sleep 30"), None).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, SealError::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_dropped_consumer_kills_process() {
        let runner = ProcessRunner::new("sh");
        let (tx, stream) = output_channel(1);
        drop(stream);

        let started = Instant::now();
        let err = runner
            .run(&sh("while true; do echo tick; sleep 0.01; done"), Some(&tx))
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_spawn() {
        let token = CancellationToken::new();
        token.cancel();
        let runner = ProcessRunner::with_cancellation("sh", token);
        let err = runner.run(&sh("echo never"), None).await.unwrap_err();
        assert!(matches!(err, SealError::Cancelled(_)));
    }
}
