//! Remote progress mirror
//!
//! The mirror is a best-effort copy of the learner's course progress. Local
//! state is authoritative for the session; the mirror is read once at load
//! time and written through after every mutation without waiting for the
//! result.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod file_backend;
pub mod http_backend;

pub use file_backend::FileMirror;
pub use http_backend::HttpMirror;

use crate::config::SyncBackend;
use crate::error::Result;
use crate::progress::RemoteProgress;

#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    async fn get_progress(&self) -> Result<Vec<RemoteProgress>>;

    async fn update_progress(&self, course_id: &str, update: &RemoteProgress) -> Result<()>;
}

/// Build the configured mirror. `None` means local-only mode.
///
/// Relative file paths resolve against the data directory.
pub fn mirror_from_config(
    backend: &SyncBackend,
    data_dir: &Path,
) -> Result<Option<Arc<dyn RemoteMirror>>> {
    match backend {
        SyncBackend::None => Ok(None),
        SyncBackend::File { path } => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                data_dir.join(path)
            };
            Ok(Some(Arc::new(FileMirror::new(path))))
        }
        SyncBackend::Http { url } => Ok(Some(Arc::new(HttpMirror::from_env(url)?))),
    }
}

/// Fire-and-forget write of one course's progress.
///
/// Returns `None` when no tokio runtime is running; the write is skipped
/// and the next mutation (or `sync push`) catches the mirror up.
pub fn spawn_write_through(
    mirror: Arc<dyn RemoteMirror>,
    update: RemoteProgress,
) -> Option<JoinHandle<()>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!("No runtime, skipping mirror write for {}", update.course_id);
        return None;
    };

    Some(handle.spawn(async move {
        match mirror.update_progress(&update.course_id, &update).await {
            Ok(()) => debug!("Mirrored {} to {}", update.course_id, mirror.name()),
            Err(e) => warn!("Mirror write for {} failed: {}", update.course_id, e),
        }
    }))
}

/// Push every given course to the mirror, stopping at the first failure
pub async fn push_all(mirror: &dyn RemoteMirror, updates: &[RemoteProgress]) -> Result<usize> {
    for update in updates {
        mirror.update_progress(&update.course_id, update).await?;
    }
    info!("Pushed {} courses to {}", updates.len(), mirror.name());
    Ok(updates.len())
}
