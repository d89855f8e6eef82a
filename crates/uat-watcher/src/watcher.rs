//! Debounced state-file watching.
//!
//! The watcher observes the file's parent directory (editors often replace
//! files instead of writing in place), waits for events on the file to
//! settle, then reloads it and forwards the snapshot.

use crate::state::{StateFile, StateFileError};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),
    #[error(transparent)]
    State(#[from] StateFileError),
    #[error("State file path has no parent directory: {0}")]
    NoParent(PathBuf),
}

/// Watches `path` and sends a snapshot after every settled change.
///
/// The current contents are sent first. A file that fails to parse is
/// logged and skipped; the previous snapshot stays in effect. Returns once
/// the receiver is dropped.
pub async fn watch_state_file(
    path: PathBuf,
    debounce: Duration,
    tx: mpsc::Sender<StateFile>,
) -> Result<(), WatchError> {
    let dir = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => return Err(WatchError::NoParent(path)),
    };

    let (notify_tx, mut notify_rx) = mpsc::channel::<notify::Result<Event>>(256);

    // Create watcher in sync context
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = notify_tx.blocking_send(res);
        },
        Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("Watching state file {}", path.display());

    if !reload(&path, &tx).await {
        return Ok(());
    }

    let mut pending: Option<Instant> = None;

    loop {
        if let Some(since) = pending {
            if since.elapsed() >= debounce {
                pending = None;
                if !reload(&path, &tx).await {
                    break;
                }
            }
        }

        match tokio::time::timeout(Duration::from_millis(50), notify_rx.recv()).await {
            Ok(Some(Ok(event))) => {
                if event.paths.iter().any(|p| is_same_file(p, &path)) {
                    pending = Some(Instant::now());
                }
            }
            Ok(Some(Err(e))) => {
                warn!("Watch error: {}", e);
            }
            Ok(None) => break, // Channel closed
            Err(_) => {}       // Timeout, continue
        }

        if tx.is_closed() {
            break;
        }
    }

    debug!("Stopped watching {}", path.display());
    Ok(())
}

/// Loads the file and forwards it. Returns `false` once nobody listens.
async fn reload(path: &Path, tx: &mpsc::Sender<StateFile>) -> bool {
    match StateFile::load(path) {
        Ok(state) => {
            debug!(
                "Loaded {} ({} variables)",
                path.display(),
                state.variable_count()
            );
            tx.send(state).await.is_ok()
        }
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            !tx.is_closed()
        }
    }
}

/// Checks whether an event path refers to the watched file.
fn is_same_file(event_path: &Path, target: &Path) -> bool {
    event_path.file_name().is_some() && event_path.file_name() == target.file_name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_same_file() {
        let target = Path::new("feeds/state.json");

        assert!(is_same_file(Path::new("/abs/feeds/state.json"), target));
        assert!(!is_same_file(Path::new("/abs/feeds/other.json"), target));
        assert!(!is_same_file(Path::new("/"), target));
    }

    #[tokio::test]
    async fn test_initial_snapshot_and_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"A": {"x": 1}}"#).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(watch_state_file(
            path.clone(),
            Duration::from_millis(20),
            tx,
        ));

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.variable_count(), 1);

        fs::write(&path, r#"{"A": {"x": 2}, "B": {}}"#).unwrap();

        let second = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let state = rx.recv().await.unwrap();
                if state.slot_names().any(|s| s == "B") {
                    return state;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(second.vars()[0].value, serde_json::json!(2));

        drop(rx);
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }

    #[tokio::test]
    async fn test_invalid_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(watch_state_file(
            path.clone(),
            Duration::from_millis(20),
            tx,
        ));

        // give the watcher time to start before fixing the file
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(&path, r#"{"": {"g": true}}"#).unwrap();

        let state = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.vars(), vec![uat_core::Var::ungrouped("g", true)]);

        drop(rx);
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }
}
