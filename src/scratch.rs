//! Local key-value persistence used to survive restarts.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use crate::report::DailyReport;

pub const ACTIVE_SESSION_KEY: &str = "active_session";
pub const PENDING_REPORTS_KEY: &str = "pending_reports";

#[async_trait]
pub trait ScratchStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn clear(&self, key: &str) -> Result<()>;
}

/// Process-local store for tests and for running without a data directory.
#[derive(Default)]
pub struct MemoryScratch {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScratchStore for MemoryScratch {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("scratch store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("scratch store poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("scratch store poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// A report whose submission failed, kept for a later retry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PendingReport {
    pub user_id: String,
    pub report: DailyReport,
}

pub async fn load_pending_reports(store: &dyn ScratchStore) -> Result<Vec<PendingReport>> {
    match store.get(PENDING_REPORTS_KEY).await? {
        Some(raw) => serde_json::from_str(&raw).context("corrupt pending report list"),
        None => Ok(Vec::new()),
    }
}

pub async fn save_pending_reports(
    store: &dyn ScratchStore,
    pending: &[PendingReport],
) -> Result<()> {
    if pending.is_empty() {
        return store.clear(PENDING_REPORTS_KEY).await;
    }
    let raw = serde_json::to_string(pending)?;
    store.set(PENDING_REPORTS_KEY, &raw).await
}

pub async fn push_pending_report(store: &dyn ScratchStore, entry: PendingReport) -> Result<()> {
    let mut pending = load_pending_reports(store).await?;
    pending.push(entry);
    save_pending_reports(store, &pending).await
}
