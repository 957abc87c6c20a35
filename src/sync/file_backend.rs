//! JSON file mirror
//!
//! Keeps all mirrored courses in one JSON document, e.g. on a shared or
//! mounted folder. Writes go to a temporary file that is renamed over the
//! mirror so a reader never sees a half-written document.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use super::RemoteMirror;
use crate::error::{EngineError, Result};
use crate::progress::RemoteProgress;

#[derive(Debug, Default, Serialize, Deserialize)]
struct MirrorDocument {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    courses: BTreeMap<String, RemoteProgress>,
}

pub struct FileMirror {
    path: PathBuf,
    /// Serializes read-modify-write cycles from concurrent write-throughs
    lock: Mutex<()>,
}

impl FileMirror {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn read_document(&self) -> Result<MirrorDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                EngineError::RemoteSync(format!("mirror file {:?} is unreadable: {}", self.path, e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MirrorDocument::default()),
            Err(e) => Err(EngineError::RemoteSync(format!(
                "failed to read mirror file {:?}: {}",
                self.path, e
            ))),
        }
    }

    async fn write_document(&self, doc: &MirrorDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(doc)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteMirror for FileMirror {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_progress(&self) -> Result<Vec<RemoteProgress>> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document().await?;
        debug!("Read {} courses from {:?}", doc.courses.len(), self.path);
        Ok(doc.courses.into_values().collect())
    }

    async fn update_progress(&self, course_id: &str, update: &RemoteProgress) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.courses.insert(course_id.to_string(), update.clone());
        doc.updated_at = Some(Utc::now());
        self.write_document(&doc).await
    }
}
