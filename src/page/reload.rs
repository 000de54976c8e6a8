//! Development-mode build reloading
//!
//! `BuildHandle` holds the active `PageBuild`. Requests take a cheap `Arc`
//! snapshot under a read lock; only the file-watch task writes, swapping in
//! a freshly loaded build and bumping the version.

use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::PageBuild;
use crate::config::PageConfig;
use crate::error::AppError;
use crate::metrics::{BUILD_RELOADS_TOTAL, BUILD_VERSION};

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// Swappable reference to the active page build
pub struct BuildHandle {
    current: RwLock<Arc<PageBuild>>,
    version: AtomicU64,
    config: PageConfig,
}

impl BuildHandle {
    /// Load the initial build
    pub fn load(config: PageConfig) -> Result<Self, AppError> {
        let build = PageBuild::load(&config)?;
        BUILD_VERSION.set(1);
        Ok(Self {
            current: RwLock::new(Arc::new(build)),
            version: AtomicU64::new(1),
            config,
        })
    }

    /// Snapshot of the active build
    pub fn current(&self) -> Arc<PageBuild> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Version of the active build, starting at 1
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Reload the template and swap it in
    ///
    /// On error the previous build stays active.
    pub fn reload(&self) -> Result<u64, AppError> {
        let build = Arc::new(PageBuild::load(&self.config)?);

        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = build;
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        drop(current);

        BUILD_RELOADS_TOTAL.inc();
        BUILD_VERSION.set(version as i64);
        Ok(version)
    }

    fn template_path(&self) -> Option<&Path> {
        self.config.template.as_deref()
    }
}

/// Keeps the file watch alive; dropping it stops reloading
pub struct BuildWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    task: JoinHandle<()>,
}

impl Drop for BuildWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch the configured template and reload the build when it changes
///
/// Returns `None` when the build uses the embedded template, which has no
/// file to watch. The parent directory is watched so that editors replacing
/// the file by rename are still noticed.
pub fn spawn_build_watcher(handle: Arc<BuildHandle>) -> Result<Option<BuildWatcher>, AppError> {
    let Some(template) = handle.template_path().map(Path::to_path_buf) else {
        tracing::info!("Using embedded page template; build watcher not started");
        return Ok(None);
    };

    let template = template.canonicalize().unwrap_or(template);
    let directory = template
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    // A single save produces a burst of events; the debouncer coalesces them
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(RELOAD_DEBOUNCE, None, move |result: DebounceEventResult| {
        let _ = tx.send(result);
    })
    .map_err(|e| AppError::Internal(e.into()))?;
    debouncer
        .watch(&directory, RecursiveMode::NonRecursive)
        .map_err(|e| AppError::Internal(e.into()))?;

    tracing::info!(path = %template.display(), "Watching page template for changes");

    let task = tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            match result {
                Ok(events) if events.iter().any(|e| touches(&e.event, &template)) => {}
                Ok(_) => continue,
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(%error, "Page template watch error");
                    }
                    continue;
                }
            }

            match handle.reload() {
                Ok(version) => tracing::info!(version, "Page build reloaded"),
                Err(error) => tracing::error!(%error, "Page build reload failed; keeping previous build"),
            }
        }
    });

    Ok(Some(BuildWatcher {
        _debouncer: debouncer,
        task,
    }))
}

fn touches(event: &notify::Event, template: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|path| path == template || path.file_name() == template.file_name())
}
