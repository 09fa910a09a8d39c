//! Hand-off of a composed release to the deployment scheduler.

use async_trait::async_trait;
use sealcraft_core::error::Result;
use sealcraft_core::release::{Release, TxResult};

/// Consumes a [`Release`] exactly once and reports the resulting
/// transaction. The on-chain client behind it lives outside this crate.
#[async_trait]
pub trait ReleaseSubmitter: Send + Sync {
    async fn submit(&self, release: &Release) -> Result<TxResult>;
}
