//! Audit log - append-only record of every stage decision, keyed by tip.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tipgate_common::{AuditEntry, AuditTrail};
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Append-only audit storage. There is no update or delete.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<()>;

    async fn entries_for(&self, tip_id: &str) -> Result<AuditTrail>;
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    trails: RwLock<HashMap<String, AuditTrail>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut trails = self.trails.write().await;
        trails
            .entry(entry.tip_id.clone())
            .or_insert_with(|| AuditTrail::new(entry.tip_id.clone()))
            .append(entry.clone());
        Ok(())
    }

    async fn entries_for(&self, tip_id: &str) -> Result<AuditTrail> {
        Ok(self
            .trails
            .read()
            .await
            .get(tip_id)
            .cloned()
            .unwrap_or_else(|| AuditTrail::new(tip_id)))
    }
}

/// JSONL file, one entry per line, synced after every write
pub struct JsonlAuditLog {
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub async fn new(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        if let Some(dir) = log_path.parent() {
            create_dir_all(dir)
                .await
                .context("Failed to create audit log directory")?;
        }

        info!("Audit log initialized: {}", log_path.display());

        Ok(Self {
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the path to the audit log
    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        let json = serde_json::to_string(entry)? + "\n";

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .context("Failed to open audit log")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write audit entry")?;

        file.sync_all().await.context("Failed to sync audit log")?;

        Ok(())
    }

    async fn entries_for(&self, tip_id: &str) -> Result<AuditTrail> {
        let mut trail = AuditTrail::new(tip_id);
        if !self.log_path.exists() {
            return Ok(trail);
        }

        let content = tokio::fs::read_to_string(&self.log_path)
            .await
            .context("Failed to read audit log")?;

        for (line_no, line) in content.lines().enumerate().filter(|(_, l)| !l.is_empty()) {
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) if entry.tip_id == tip_id => {
                    trail.append(entry);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable audit line {}: {}", line_no + 1, e),
            }
        }

        Ok(trail)
    }
}
