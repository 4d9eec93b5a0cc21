//! Device settings watcher
//!
//! Turns hand edits of the settings file into raw port values for the
//! connection manager.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::SettingsStore;

/// Settle time for editors that write in several steps
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the settings file and yields the raw device port after each change
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<String>,
}

impl SettingsWatcher {
    pub fn new(store: SettingsStore) -> Result<Self> {
        let (tx, rx) = mpsc::channel(10);

        // The parent directory is watched so editors that replace the file
        // are still seen
        let file = store.path().to_path_buf();
        let dir = watch_dir(&file);

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    if !event.paths.iter().any(|p| same_file(p, &file)) {
                        return;
                    }
                    debug!("Device settings modified: {:?}", event.paths);

                    let store = store.clone();
                    let tx = tx.clone();
                    runtime_handle.spawn(async move {
                        tokio::time::sleep(DEBOUNCE).await;

                        match store.load_raw_port().await {
                            Ok(raw) => {
                                if let Err(e) = tx.send(raw).await {
                                    debug!("Settings receiver gone: {}", e);
                                }
                            }
                            Err(e) => {
                                warn!("Failed to reload device settings: {:#}", e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch settings directory: {}", dir.display()))?;

        info!("Watching device settings in {}", dir.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next edit
    /// Returns None if the watcher has been closed
    pub async fn next_edit(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

fn watch_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn same_file(event_path: &Path, file: &Path) -> bool {
    match (event_path.file_name(), file.file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_watch_dir_for_bare_file_name() {
        assert_eq!(watch_dir(Path::new("device.yaml")), PathBuf::from("."));
        assert_eq!(
            watch_dir(Path::new("/etc/gw/device.yaml")),
            PathBuf::from("/etc/gw")
        );
    }

    #[tokio::test]
    async fn test_settings_watcher_reports_edit() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("device.yaml");
        let store = SettingsStore::new(&path);
        store.save_port(0).await?;

        let mut watcher = SettingsWatcher::new(store)?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, "device_port: 16000\n")?;

        let edit = tokio::time::timeout(Duration::from_secs(2), watcher.next_edit()).await?;

        assert_eq!(edit.as_deref(), Some("16000"));

        Ok(())
    }
}
