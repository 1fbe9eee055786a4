//! Manifest file watcher (spec §4.2): observes `.sidecar/shells.json`
//! and emits `Message::ShellManifestChanged` when it is replaced or
//! written, the way the corpus's `notify`-backed agent watcher wires
//! filesystem events into a channel consumed by an async task.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::message::Message;

/// Holds the native watcher alive for as long as the manifest should
/// be observed; dropping it (or the whole `ManifestWatcher`) stops
/// delivery.
pub struct ManifestWatcher {
    _watcher: Option<RecommendedWatcher>,
}

impl ManifestWatcher {
    /// Start watching `manifest_path`. Falls back to polling the
    /// manifest's mtime every 2s if the native watcher can't be set up
    /// (spec §4.2 supplement) — this never hard-fails the caller.
    pub fn start(manifest_path: &Path, tx: mpsc::Sender<Message>) -> Self {
        match Self::try_native(manifest_path, tx.clone()) {
            Ok(watcher) => ManifestWatcher {
                _watcher: Some(watcher),
            },
            Err(err) => {
                tracing::warn!(%err, path = %manifest_path.display(), "native manifest watcher unavailable, falling back to polling");
                spawn_polling_fallback(manifest_path.to_path_buf(), tx);
                ManifestWatcher { _watcher: None }
            }
        }
    }

    fn try_native(manifest_path: &Path, tx: mpsc::Sender<Message>) -> notify::Result<RecommendedWatcher> {
        let watch_dir = manifest_path.parent().unwrap_or(manifest_path).to_path_buf();
        std::fs::create_dir_all(&watch_dir).ok();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = tx.blocking_send(Message::ShellManifestChanged);
            }
        })?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

fn spawn_polling_fallback(manifest_path: PathBuf, tx: mpsc::Sender<Message>) {
    tokio::spawn(async move {
        let mut last_mtime = mtime_of(&manifest_path);
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let current = mtime_of(&manifest_path);
            if current != last_mtime {
                last_mtime = current;
                if tx.send(Message::ShellManifestChanged).await.is_err() {
                    break;
                }
            }
        }
    });
}

fn mtime_of(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn polling_fallback_detects_manifest_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shells.json");
        std::fs::write(&path, "{}").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        spawn_polling_fallback(path.clone(), tx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(&path, "{\"version\":1,\"shells\":[]}").unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(msg, Ok(Some(Message::ShellManifestChanged))));
    }
}
