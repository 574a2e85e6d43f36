use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::config::{AppPaths, Settings};
use crate::device::SystemClipboard;
use crate::enrich::{EnrichEvent, Enricher, HttpFetcher};
use crate::errors::{ClipError, Result};
use crate::history::HistoryManager;
use crate::monitor::ClipboardMonitor;
use crate::store::SnapshotStore;

const RETENTION_SWEEP: Duration = Duration::from_secs(3600);

pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    fs::write(path, pid.to_string()).map_err(|e| ClipError::Daemon(e.to_string()))
}

pub fn read_pid_file(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(contents) => match contents.trim().parse::<u32>() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => Ok(None),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ClipError::Daemon(e.to_string())),
    }
}

pub fn remove_pid_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ClipError::Daemon(e.to_string())),
    }
}

pub fn is_process_running(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

pub fn stop_daemon(paths: &AppPaths) -> Result<bool> {
    match read_pid_file(&paths.pid_file)? {
        Some(pid) if is_process_running(pid) => {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            remove_pid_file(&paths.pid_file)?;
            Ok(true)
        }
        Some(_) => {
            remove_pid_file(&paths.pid_file)?;
            Ok(false)
        }
        None => Ok(false),
    }
}

pub fn daemon_status(paths: &AppPaths) -> Result<Option<u32>> {
    match read_pid_file(&paths.pid_file)? {
        Some(pid) if is_process_running(pid) => Ok(Some(pid)),
        Some(_) => {
            remove_pid_file(&paths.pid_file)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Foreground watcher. Builds a runtime whose single owner task serializes
/// every mutation of the history: monitor candidates, enrichment results,
/// and periodic retention sweeps all arrive as messages on this loop, so no
/// two mutations ever interleave.
pub fn run_watcher(paths: &AppPaths) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    fs::create_dir_all(&paths.base_dir).map_err(|e| ClipError::Daemon(e.to_string()))?;
    write_pid_file(&paths.pid_file)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| ClipError::Daemon(e.to_string()))?;
    let result = runtime.block_on(owner_loop(paths));

    remove_pid_file(&paths.pid_file)?;
    tracing::info!("clipstack watcher shut down");
    result
}

async fn owner_loop(paths: &AppPaths) -> Result<()> {
    let settings = Settings::load(&paths.settings_path);
    let mut history = HistoryManager::open(
        SnapshotStore::new(paths.history_path.clone()),
        settings.max_items_limit,
        settings.retention_days,
    );

    let (event_tx, mut events) = mpsc::channel::<EnrichEvent>(32);
    let fetcher = Arc::new(HttpFetcher::new()?);
    let mut enricher = Enricher::new(fetcher, event_tx);

    // URL items that were persisted before their title arrived get another
    // chance on every load.
    for (id, url) in history.unenriched_urls() {
        enricher.enqueue_page(id, url);
    }

    let device = SystemClipboard::new()?;
    let (candidate_tx, mut candidates) = mpsc::channel(32);
    let (monitor_stop, monitor_task) = ClipboardMonitor::new(device).spawn(candidate_tx);

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| ClipError::Daemon(e.to_string()))?;
    let mut retention_tick = tokio::time::interval(RETENTION_SWEEP);
    retention_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    retention_tick.tick().await; // immediate first tick

    tracing::info!(pid = std::process::id(), "watching clipboard");

    loop {
        tokio::select! {
            Some(candidate) = candidates.recv() => {
                // CLI invocations edit the snapshot while the daemon is
                // resident; fold those in before building on our copy.
                history.reload_if_changed();
                let outcome = history.insert_or_refresh(candidate);
                tracing::info!(merged = outcome.merged, "clipboard item recorded");
                if outcome.needs_enrichment {
                    if let Some(item) = history.get(outcome.id) {
                        enricher.enqueue_page(outcome.id, item.display_text.clone());
                    }
                }
            }
            Some(event) = events.recv() => {
                history.reload_if_changed();
                match event {
                    EnrichEvent::Metadata { id, title, thumbnail_url } => {
                        if let Some(title) = title {
                            history.apply_title(id, &title);
                        }
                        let wants_thumbnail = history
                            .get(id)
                            .map(|item| item.url_thumbnail.is_none())
                            .unwrap_or(false);
                        if wants_thumbnail {
                            if let Some(url) = thumbnail_url {
                                enricher.enqueue_thumbnail(id, url);
                            }
                        }
                    }
                    EnrichEvent::Thumbnail { id, bytes } => {
                        history.apply_thumbnail(id, bytes);
                    }
                }
            }
            _ = retention_tick.tick() => {
                history.reload_if_changed();
                history.apply_retention_policy();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("termination requested");
                break;
            }
        }
    }

    monitor_stop.cancel();
    enricher.cancel_all();
    let _ = monitor_task.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_pid_file() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("test.pid");
        write_pid_file(&pid_path).unwrap();
        let pid = read_pid_file(&pid_path).unwrap();
        assert_eq!(pid, Some(std::process::id()));
    }

    #[test]
    fn test_read_missing_pid_file() {
        let dir = TempDir::new().unwrap();
        let pid = read_pid_file(&dir.path().join("nonexistent.pid")).unwrap();
        assert!(pid.is_none());
    }

    #[test]
    fn test_read_garbage_pid_file() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("test.pid");
        fs::write(&pid_path, "not a pid").unwrap();
        assert!(read_pid_file(&pid_path).unwrap().is_none());
    }

    #[test]
    fn test_remove_pid_file() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("test.pid");
        write_pid_file(&pid_path).unwrap();
        remove_pid_file(&pid_path).unwrap();
        assert!(!pid_path.exists());
    }

    #[test]
    fn test_remove_missing_pid_file_ok() {
        let dir = TempDir::new().unwrap();
        assert!(remove_pid_file(&dir.path().join("nonexistent.pid")).is_ok());
    }

    #[test]
    fn test_is_process_running_self() {
        assert!(is_process_running(std::process::id()));
    }

    #[test]
    fn test_daemon_status_not_running() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::from_base(dir.path().to_path_buf());
        assert!(daemon_status(&paths).unwrap().is_none());
    }

    #[test]
    fn test_daemon_status_stale_pid_cleans_up() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::from_base(dir.path().to_path_buf());
        fs::write(&paths.pid_file, "2000000000").unwrap();
        assert!(daemon_status(&paths).unwrap().is_none());
        assert!(!paths.pid_file.exists());
    }
}
