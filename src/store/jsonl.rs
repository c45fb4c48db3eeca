//! JSON-lines file store.
//!
//! Each collection is a file with one JSON document per line, appended in
//! arrival order.

use super::{
    CropRecommendation, HardwareMessage, RecommendationStore, StoreError, READINGS_COLLECTION,
    RECOMMENDATIONS_COLLECTION,
};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct JsonlStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.jsonl"))
    }

    async fn append<T: Serialize + Sync>(&self, collection: &str, doc: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(doc)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.collection_path(collection))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl RecommendationStore for JsonlStore {
    async fn save_reading(&self, message: &HardwareMessage) -> Result<(), StoreError> {
        self.append(READINGS_COLLECTION, message).await
    }

    async fn save_recommendation(&self, recommendation: &CropRecommendation) -> Result<(), StoreError> {
        self.append(RECOMMENDATIONS_COLLECTION, recommendation).await
    }

    async fn latest_reading(&self) -> Result<Option<HardwareMessage>, StoreError> {
        let path = self.collection_path(READINGS_COLLECTION);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match content.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => Ok(Some(serde_json::from_str(line)?)),
            None => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "jsonl"
    }
}
