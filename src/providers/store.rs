//! Reference state stores
//!
//! In-memory store for tests and a JSON file store for the paper-trading
//! binary. Real deployments plug a durable store in behind the same trait.

use super::{EngineSnapshot, StateStore};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Keeps the latest snapshot in memory
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: RwLock<Option<EngineSnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, snapshot: &EngineSnapshot) -> anyhow::Result<()> {
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> anyhow::Result<Option<EngineSnapshot>> {
        Ok(self.snapshot.read().await.clone())
    }
}

/// Persists snapshots as pretty-printed JSON on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn save(&self, snapshot: &EngineSnapshot) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }

    async fn load(&self) -> anyhow::Result<Option<EngineSnapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskState;
    use chrono::Utc;

    fn snapshot() -> EngineSnapshot {
        EngineSnapshot {
            positions: vec![],
            risk: RiskState::new("main", Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStateStore::new();
        assert!(store.load().await.unwrap().is_none());

        let snap = snapshot();
        store.save(&snap).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snap));
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());

        let snap = snapshot();
        store.save(&snap).await.unwrap();
        let restored = store.load().await.unwrap().unwrap();
        assert_eq!(restored, snap);
    }
}
