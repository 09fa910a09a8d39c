//! Verifiable build service API.
//!
//! [`BuildApi`] is the seam between the build client and the service;
//! [`HttpBuildApi`] speaks its JSON-over-HTTPS protocol.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | submit | `POST /builds` with a [`BuildRequest`] body |
//! | get | `GET /builds/{id}` |
//! | get by digest | `GET /builds/image/{digest}` |
//! | logs | `GET /builds/{id}/logs` (plain text) |
//! | list | `GET /builds?billingAddress=..&limit=..&offset=..` |
//! | verify | `GET /builds/verify/{identifier}` |

use async_trait::async_trait;
use reqwest::StatusCode;
use sealcraft_core::build::{BuildIdentifier, BuildRecord, BuildRequest, ProvenanceVerificationResult};
use sealcraft_core::digest::Digest;
use sealcraft_core::error::{Result, SealError};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Operations offered by the verifiable build service.
#[async_trait]
pub trait BuildApi: Send + Sync {
    /// Start a build; returns its id immediately.
    async fn submit(&self, request: &BuildRequest) -> Result<String>;

    async fn get(&self, build_id: &str) -> Result<BuildRecord>;

    /// Build that produced the image with this digest.
    async fn get_by_digest(&self, digest: &Digest) -> Result<BuildRecord>;

    /// Full log text so far.
    async fn get_logs(&self, build_id: &str) -> Result<String>;

    async fn list(&self, billing_address: &str, limit: u32, offset: u32) -> Result<Vec<BuildRecord>>;

    async fn verify(&self, identifier: &BuildIdentifier) -> Result<ProvenanceVerificationResult>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    build_id: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    builds: Vec<BuildRecord>,
}

/// HTTP client for the build service.
#[derive(Debug, Clone)]
pub struct HttpBuildApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBuildApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sealcraft/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SealError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| SealError::Network(format!("build service: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.http.get(self.endpoint(path))).await?;
        response
            .json()
            .await
            .map_err(|e| SealError::Serialization(format!("build service response: {}", e)))
    }
}

/// Map a non-success response to an error carrying the service's message.
fn status_error(status: StatusCode, body: &str) -> SealError {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(alias = "error")]
        message: String,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    SealError::BuildService {
        status_code: Some(status.as_u16()),
        message,
    }
}

#[async_trait]
impl BuildApi for HttpBuildApi {
    async fn submit(&self, request: &BuildRequest) -> Result<String> {
        tracing::debug!(repo = %request.repo_url, git_ref = %request.git_ref, "Submitting build");
        let response = self
            .send(self.http.post(self.endpoint("builds")).json(request))
            .await?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SealError::Serialization(format!("submit response: {}", e)))?;
        Ok(body.build_id)
    }

    async fn get(&self, build_id: &str) -> Result<BuildRecord> {
        self.get_json(&format!("builds/{}", build_id)).await
    }

    async fn get_by_digest(&self, digest: &Digest) -> Result<BuildRecord> {
        self.get_json(&format!("builds/image/{}", digest)).await
    }

    async fn get_logs(&self, build_id: &str) -> Result<String> {
        let response = self
            .send(self.http.get(self.endpoint(&format!("builds/{}/logs", build_id))))
            .await?;
        response
            .text()
            .await
            .map_err(|e| SealError::Network(format!("build logs: {}", e)))
    }

    async fn list(&self, billing_address: &str, limit: u32, offset: u32) -> Result<Vec<BuildRecord>> {
        let request = self.http.get(self.endpoint("builds")).query(&[
            ("billingAddress", billing_address.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]);
        let response = self.send(request).await?;
        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| SealError::Serialization(format!("list response: {}", e)))?;
        Ok(body.builds)
    }

    async fn verify(&self, identifier: &BuildIdentifier) -> Result<ProvenanceVerificationResult> {
        self.get_json(&format!("builds/verify/{}", identifier)).await
    }
}
