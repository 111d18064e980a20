//! Configuration file watcher for hot reload.
//!
//! Only `[retries]` and `[breaker]` take effect while the coordinator runs.
//! Each reload is compared with the last accepted file and forwarded only
//! when one of those sections changed. Edits to any other section are
//! logged as needing a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::CoordinatorConfig;

/// Sections that changed between two configurations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    /// `[retries]` or `[breaker]` changed.
    pub reloadable: bool,
    /// Changed sections that only apply after a restart.
    pub restart_required: Vec<&'static str>,
}

impl ConfigDiff {
    pub fn between(current: &CoordinatorConfig, next: &CoordinatorConfig) -> Self {
        let sections = [
            ("workers", current.workers != next.workers),
            ("pubsub", current.pubsub != next.pubsub),
            ("translator", current.translator != next.translator),
            ("cache", current.cache != next.cache),
            ("feedback", current.feedback != next.feedback),
            ("tracker", current.tracker != next.tracker),
            ("persistence", current.persistence != next.persistence),
            ("ingestion", current.ingestion != next.ingestion),
            ("observability", current.observability != next.observability),
        ];

        Self {
            reloadable: current.retries != next.retries || current.breaker != next.breaker,
            restart_required: sections
                .into_iter()
                .filter(|(_, changed)| *changed)
                .map(|(section, _)| section)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.reloadable && self.restart_required.is_empty()
    }
}

/// Record `next` as the accepted configuration and return it when it carries
/// a reloadable change.
fn accept(current: &mut CoordinatorConfig, next: CoordinatorConfig) -> Option<CoordinatorConfig> {
    let diff = ConfigDiff::between(current, &next);
    if diff.is_empty() {
        tracing::debug!("Config file unchanged, nothing to reload");
        return None;
    }
    if !diff.restart_required.is_empty() {
        tracing::warn!(
            sections = ?diff.restart_required,
            "Config changes take effect only after a restart"
        );
    }

    *current = next;
    if diff.reloadable {
        tracing::info!("Retry or breaker settings changed, reloading");
        Some(current.clone())
    } else {
        None
    }
}

/// Watches the configuration file and forwards reloadable updates.
pub struct ConfigWatcher {
    path: PathBuf,
    current: CoordinatorConfig,
    update_tx: mpsc::UnboundedSender<CoordinatorConfig>,
}

impl ConfigWatcher {
    /// `current` is the configuration the coordinator was started with.
    ///
    /// Returns the watcher and a receiver for validated updates that change
    /// retry or breaker settings.
    pub fn new(
        path: &Path,
        current: CoordinatorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<CoordinatorConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(next) => {
                            if let Some(update) = accept(&mut current, next) {
                                let _ = update_tx.send(update);
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                path = ?path,
                                error = %e,
                                "Invalid config file, keeping current settings"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}
