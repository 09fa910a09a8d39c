//! In-memory build service for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sealcraft_core::build::{
    BuildIdentifier, BuildRecord, BuildRequest, BuildStatus, ProvenanceVerificationResult,
};
use sealcraft_core::digest::Digest;
use sealcraft_core::error::{Result, SealError};

use super::api::BuildApi;

/// One scripted poll: the status `get` reports and the full log text
/// `get_logs` serves afterwards.
pub(crate) type Step = (BuildStatus, &'static str);

struct Timeline {
    steps: Vec<Step>,
    polls: usize,
}

#[derive(Default)]
struct State {
    records: HashMap<String, BuildRecord>,
    by_digest: HashMap<Digest, String>,
    timelines: HashMap<String, Timeline>,
    pending: VecDeque<Vec<Step>>,
    verdicts: HashMap<String, ProvenanceVerificationResult>,
    submitted: Vec<BuildRequest>,
    calls: Vec<String>,
}

#[derive(Default)]
pub(crate) struct FakeBuildApi {
    state: Mutex<State>,
    /// Every call fails with a network error while set.
    pub offline: AtomicBool,
}

pub(crate) fn record(build_id: &str, status: BuildStatus) -> BuildRecord {
    BuildRecord {
        build_id: build_id.to_string(),
        status,
        repo_url: "https://github.com/acme/demo".to_string(),
        git_ref: "a".repeat(40),
        dockerfile_path: "Dockerfile".to_string(),
        image_url: None,
        image_digest: None,
        provenance_json: None,
        provenance_signature: None,
        dependencies: Vec::new(),
        error_message: None,
        created_at: None,
    }
}

impl FakeBuildApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record; records with an image digest are also served by
    /// `get_by_digest`.
    pub fn with_record(self, record: BuildRecord) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(digest) = record.image_digest.as_deref() {
                let digest = Digest::decode_lenient(digest).unwrap();
                state.by_digest.insert(digest, record.build_id.clone());
            }
            state.records.insert(record.build_id.clone(), record);
        }
        self
    }

    /// Script the statuses an existing build reports on successive polls.
    pub fn with_timeline(self, build_id: &str, steps: Vec<Step>) -> Self {
        self.state
            .lock()
            .unwrap()
            .timelines
            .insert(build_id.to_string(), Timeline { steps, polls: 0 });
        self
    }

    /// Script the timeline of the next submitted build.
    pub fn with_next_build(self, steps: Vec<Step>) -> Self {
        self.state.lock().unwrap().pending.push_back(steps);
        self
    }

    pub fn with_verdict(self, identifier: &str, verdict: ProvenanceVerificationResult) -> Self {
        self.state
            .lock()
            .unwrap()
            .verdicts
            .insert(identifier.to_string(), verdict);
        self
    }

    pub fn submitted(&self) -> Vec<BuildRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{} ", op);
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    fn enter(&self, call: String) -> Result<std::sync::MutexGuard<'_, State>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SealError::Network("connection refused".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        Ok(state)
    }
}

fn not_found(what: String) -> SealError {
    SealError::BuildService {
        status_code: Some(404),
        message: format!("{} not found", what),
    }
}

#[async_trait]
impl BuildApi for FakeBuildApi {
    async fn submit(&self, request: &BuildRequest) -> Result<String> {
        let mut state = self.enter(format!("submit {}", request.repo_url))?;
        state.submitted.push(request.clone());
        let build_id = format!("bld-{}", state.submitted.len());

        let mut rec = record(&build_id, BuildStatus::Building);
        rec.repo_url = request.repo_url.clone();
        rec.git_ref = request.git_ref.clone();
        rec.dockerfile_path = request.dockerfile_path.clone();
        // A record registered ahead of time for this id wins.
        state.records.entry(build_id.clone()).or_insert(rec);

        if let Some(steps) = state.pending.pop_front() {
            state
                .timelines
                .insert(build_id.clone(), Timeline { steps, polls: 0 });
        }
        Ok(build_id)
    }

    async fn get(&self, build_id: &str) -> Result<BuildRecord> {
        let mut state = self.enter(format!("get {}", build_id))?;
        let mut rec = state
            .records
            .get(build_id)
            .cloned()
            .ok_or_else(|| not_found(format!("build {}", build_id)))?;
        if let Some(timeline) = state.timelines.get_mut(build_id) {
            let idx = timeline.polls.min(timeline.steps.len().saturating_sub(1));
            if let Some((status, _)) = timeline.steps.get(idx) {
                rec.status = *status;
            }
            timeline.polls += 1;
        }
        Ok(rec)
    }

    async fn get_by_digest(&self, digest: &Digest) -> Result<BuildRecord> {
        let state = self.enter(format!("get-by-digest {}", digest))?;
        let id = state
            .by_digest
            .get(digest)
            .ok_or_else(|| not_found(format!("image {}", digest)))?;
        Ok(state.records[id].clone())
    }

    async fn get_logs(&self, build_id: &str) -> Result<String> {
        let state = self.enter(format!("logs {}", build_id))?;
        let logs = state.timelines.get(build_id).and_then(|t| {
            let idx = t.polls.saturating_sub(1).min(t.steps.len().saturating_sub(1));
            t.steps.get(idx).map(|(_, logs)| logs.to_string())
        });
        Ok(logs.unwrap_or_default())
    }

    async fn list(&self, billing_address: &str, limit: u32, offset: u32) -> Result<Vec<BuildRecord>> {
        let state = self.enter(format!("list {}", billing_address))?;
        let mut records: Vec<BuildRecord> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.build_id.cmp(&b.build_id));
        Ok(records
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn verify(&self, identifier: &BuildIdentifier) -> Result<ProvenanceVerificationResult> {
        let key = identifier.to_string();
        let state = self.enter(format!("verify {}", key))?;
        Ok(state
            .verdicts
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ProvenanceVerificationResult::failed("no build found", None)))
    }
}
