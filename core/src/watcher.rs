//! Watches the storage directory so a running process picks up analysis
//! writes made by another Vizor process (or a manual edit).
//!
//! Events are debounced: atomic writes land as a rename burst, and the
//! two analysis keys are written back to back, so the watcher waits for
//! the burst to settle before triggering a single resync.

use anyhow::Context;
use anyhow::Result;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::TryRecvError;
use std::time::Duration;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::storage::keys;
use crate::storage::LocalStore;
use crate::sync::AnalysisManager;

/// How often the run loop drains pending filesystem events.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default debounce for change bursts.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

pub struct StorageWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<Result<Event, notify::Error>>,
    debounce_duration: Duration,
    last_event_time: Option<Instant>,
    pending_changes: HashSet<PathBuf>,
}

impl StorageWatcher {
    /// Watch the store's directory. The directory (not the key files) is
    /// watched because atomic writes replace files by rename, which
    /// breaks per-file watches.
    pub fn new(store: &LocalStore, debounce_ms: u64) -> Result<Self> {
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .context("Failed to create storage watcher")?;

        watcher
            .watch(store.base_dir(), RecursiveMode::NonRecursive)
            .with_context(|| {
                format!("Failed to watch storage dir: {}", store.base_dir().display())
            })?;

        Ok(Self {
            _watcher: watcher,
            rx,
            debounce_duration: Duration::from_millis(debounce_ms),
            last_event_time: None,
            pending_changes: HashSet::new(),
        })
    }

    /// Drain pending events and report changed analysis keys once the
    /// debounce period has elapsed. `None` while quiet or still settling.
    pub fn check_for_changes(&mut self) -> Option<Vec<PathBuf>> {
        let mut has_new_events = false;

        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => {
                    if should_process_event(&event) {
                        for path in &event.paths {
                            if is_analysis_key(path) {
                                self.pending_changes.insert(path.clone());
                                has_new_events = true;
                            }
                        }
                    }
                }
                // Watcher error - ignore and keep draining
                Ok(Err(_)) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if has_new_events {
            self.last_event_time = Some(Instant::now());
        }

        if let Some(last_time) = self.last_event_time
            && !self.pending_changes.is_empty()
            && last_time.elapsed() >= self.debounce_duration
        {
            let changes: Vec<PathBuf> = self.pending_changes.drain().collect();
            self.last_event_time = None;
            return Some(changes);
        }

        None
    }

    /// Poll for changes until cancelled, resyncing the manager whenever
    /// an analysis key settles.
    pub async fn run(mut self, manager: AnalysisManager, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    if let Some(changes) = self.check_for_changes() {
                        debug!("storage changed ({} key(s)), resyncing", changes.len());
                        manager.resync_from_storage();
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub fn debounce_duration(&self) -> Duration {
        self.debounce_duration
    }
}

fn should_process_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Only the analysis pair triggers a resync; session keys and the `.tmp`
/// siblings of in-progress atomic writes are ignored.
fn is_analysis_key(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|name| name.to_str()),
        Some(keys::ANALYSIS_DATA) | Some(keys::ANALYSIS_TIMESTAMP)
    )
}
