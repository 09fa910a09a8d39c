//! Build submission and polling.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use sealcraft_core::build::{Build, BuildRecord, BuildRequest, BuildStatus};
use sealcraft_core::config::SealConfig;
use sealcraft_core::digest::Digest;
use sealcraft_core::error::{Result, SealError};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::api::BuildApi;

/// Bounds for [`BuildClient::wait_for_build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up once the build has been followed this long.
    pub timeout: Duration,
    /// Pause between polls.
    pub poll_interval: Duration,
}

impl WaitOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(config: &SealConfig) -> Self {
        Self::new(
            Duration::from_secs(config.build_wait_timeout_secs),
            Duration::from_millis(config.build_poll_interval_ms),
        )
    }
}

/// Client for the verifiable build service.
///
/// Statuses seen through one client (and its clones) only move forward:
/// a build reported `SUCCESS` or `FAILED` that later comes back with any
/// other status is an [`SealError::InvalidTransition`].
#[derive(Clone)]
pub struct BuildClient {
    api: Arc<dyn BuildApi>,
    observed: Arc<Mutex<HashMap<String, BuildStatus>>>,
}

/// Bookkeeping for one dependency resolution.
#[derive(Default)]
struct Resolution {
    /// Digests on the current path, to break cycles.
    path: HashSet<Digest>,
    /// Builds already resolved, shared between parents.
    resolved: HashMap<Digest, Build>,
}

impl BuildClient {
    pub fn new(api: Arc<dyn BuildApi>) -> Self {
        Self {
            api,
            observed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn api(&self) -> &Arc<dyn BuildApi> {
        &self.api
    }

    /// Validate and submit a build request. Returns the build id without
    /// waiting for the build.
    pub async fn submit(&self, request: &BuildRequest) -> Result<String> {
        request.validate()?;
        let build_id = self.api.submit(request).await?;
        if build_id.trim().is_empty() {
            return Err(SealError::BuildService {
                status_code: None,
                message: "service returned an empty build id".to_string(),
            });
        }
        tracing::info!(build_id = %build_id, repo = %request.repo_url, "Build submitted");
        Ok(build_id)
    }

    /// Follow a build until it leaves `BUILDING`.
    ///
    /// Each poll reads the status, then the log. Only log bytes not yet
    /// delivered are forwarded to `log_sink`. A `FAILED` build is
    /// [`SealError::RemoteBuildFailed`] with the service's error message.
    /// Dropping the receiving end of `log_sink` cancels the wait.
    pub async fn wait_for_build(
        &self,
        build_id: &str,
        options: &WaitOptions,
        log_sink: Option<&mpsc::Sender<String>>,
        cancel: &CancellationToken,
    ) -> Result<BuildRecord> {
        // An unrepresentable deadline means no deadline.
        let deadline = Instant::now().checked_add(options.timeout);
        let mut status = self.last_observed(build_id);
        let mut delivered = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(SealError::Cancelled(format!("waiting for build {}", build_id)));
            }

            let record = self.api.get(build_id).await?;
            let logs = self.api.get_logs(build_id).await?;
            delivered = forward_new_logs(build_id, &logs, delivered, log_sink).await?;

            let next = self.observe(build_id, record.status)?;
            if next != status {
                status = next;
                tracing::info!(build_id = %build_id, status = %status, "Build status changed");
            }

            match status {
                BuildStatus::Success => return Ok(record),
                BuildStatus::Failed => {
                    return Err(SealError::RemoteBuildFailed {
                        build_id: build_id.to_string(),
                        message: record
                            .error_message
                            .unwrap_or_else(|| "no error message reported".to_string()),
                    })
                }
                BuildStatus::Building => {}
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(SealError::Timeout(format!(
                            "build {} still BUILDING after {}s",
                            build_id,
                            options.timeout.as_secs()
                        )));
                    }
                    options.poll_interval.min(deadline - now)
                }
                None => options.poll_interval,
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(SealError::Cancelled(format!("waiting for build {}", build_id)));
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Fetch a build with its dependency graph resolved.
    pub async fn get(&self, build_id: &str) -> Result<Build> {
        let record = self.api.get(build_id).await?;
        self.observe(&record.build_id, record.status)?;
        let mut resolution = Resolution::default();
        self.resolve(record, &mut resolution).await
    }

    /// Fetch the build that produced `digest`, with dependencies.
    pub async fn get_by_digest(&self, digest: &Digest) -> Result<Build> {
        let record = self.api.get_by_digest(digest).await?;
        self.observe(&record.build_id, record.status)?;
        let mut resolution = Resolution::default();
        resolution.path.insert(*digest);
        self.resolve(record, &mut resolution).await
    }

    pub async fn logs(&self, build_id: &str) -> Result<String> {
        self.api.get_logs(build_id).await
    }

    pub async fn list(&self, billing_address: &str, limit: u32, offset: u32) -> Result<Vec<BuildRecord>> {
        self.api.list(billing_address, limit, offset).await
    }

    fn last_observed(&self, build_id: &str) -> BuildStatus {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(build_id)
            .copied()
            .unwrap_or(BuildStatus::Building)
    }

    /// Record a reported status, rejecting moves the state machine forbids.
    fn observe(&self, build_id: &str, reported: BuildStatus) -> Result<BuildStatus> {
        let mut observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        let last = observed.get(build_id).copied().unwrap_or(BuildStatus::Building);
        if last == reported {
            return Ok(last);
        }
        let next = last.transition(reported)?;
        observed.insert(build_id.to_string(), next);
        Ok(next)
    }

    fn resolve<'a>(
        &'a self,
        record: BuildRecord,
        resolution: &'a mut Resolution,
    ) -> BoxFuture<'a, Result<Build>> {
        async move {
            let mut dependencies = BTreeMap::new();
            for raw in &record.dependencies {
                let digest = Digest::decode_lenient(raw)?;
                if let Some(build) = resolution.resolved.get(&digest) {
                    dependencies.insert(digest, build.clone());
                    continue;
                }
                if !resolution.path.insert(digest) {
                    tracing::warn!(
                        build_id = %record.build_id,
                        dependency = %digest,
                        "Dependency cycle, not descending"
                    );
                    continue;
                }

                tracing::debug!(build_id = %record.build_id, dependency = %digest, "Resolving dependency");
                let dep_record = self.api.get_by_digest(&digest).await?;
                let dep = self.resolve(dep_record, &mut *resolution).await?;
                resolution.path.remove(&digest);
                resolution.resolved.insert(digest, dep.clone());
                dependencies.insert(digest, dep);
            }
            Ok(Build::from_record(record, dependencies))
        }
        .boxed()
    }
}

/// Send the part of `logs` past `delivered` and return the new offset.
/// A log shorter than what was already delivered sends nothing.
async fn forward_new_logs(
    build_id: &str,
    logs: &str,
    delivered: usize,
    sink: Option<&mpsc::Sender<String>>,
) -> Result<usize> {
    if logs.len() <= delivered {
        return Ok(delivered);
    }
    let chunk = String::from_utf8_lossy(&logs.as_bytes()[delivered..]).into_owned();
    if let Some(sink) = sink {
        sink.send(chunk).await.map_err(|_| {
            SealError::Cancelled(format!("log consumer for build {} went away", build_id))
        })?;
    }
    Ok(logs.len())
}
