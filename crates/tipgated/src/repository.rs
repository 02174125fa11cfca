//! Tip storage.
//!
//! Tips are saved and read back, never deleted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tipgate_common::Tip;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[async_trait]
pub trait TipRepository: Send + Sync {
    async fn get(&self, tip_id: &str) -> Result<Option<Tip>>;

    /// Insert or replace the stored record
    async fn save(&self, tip: &Tip) -> Result<()>;

    async fn list(&self) -> Result<Vec<Tip>>;
}

/// Process-local store for tests and single-run tools
#[derive(Default)]
pub struct InMemoryTipRepository {
    tips: RwLock<HashMap<String, Tip>>,
}

impl InMemoryTipRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TipRepository for InMemoryTipRepository {
    async fn get(&self, tip_id: &str) -> Result<Option<Tip>> {
        Ok(self.tips.read().await.get(tip_id).cloned())
    }

    async fn save(&self, tip: &Tip) -> Result<()> {
        self.tips.write().await.insert(tip.tip_id.clone(), tip.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Tip>> {
        let mut tips: Vec<Tip> = self.tips.read().await.values().cloned().collect();
        tips.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.tip_id.cmp(&b.tip_id))
        });
        Ok(tips)
    }
}

/// One pretty-printed JSON file per tip
pub struct JsonTipRepository {
    dir: PathBuf,
}

impl JsonTipRepository {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create tip directory {}", dir.display()))?;
        info!("Tip repository initialized: {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, tip_id: &str) -> PathBuf {
        let safe: String = tip_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl TipRepository for JsonTipRepository {
    async fn get(&self, tip_id: &str) -> Result<Option<Tip>> {
        let path = self.path_for(tip_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let tip: Tip = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt tip record {}", path.display()))?;
        Ok(Some(tip))
    }

    async fn save(&self, tip: &Tip) -> Result<()> {
        let path = self.path_for(&tip.tip_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tip)?;
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!("Saved tip {} to {}", tip.tip_id, path.display());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Tip>> {
        let mut tips = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            let tip: Tip = serde_json::from_str(&content)
                .with_context(|| format!("Corrupt tip record {}", path.display()))?;
            tips.push(tip);
        }
        tips.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.tip_id.cmp(&b.tip_id))
        });
        Ok(tips)
    }
}
