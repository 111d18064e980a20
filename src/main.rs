//! Translation coordinator CLI.
//!
//! Reads translation requests as JSON lines on stdin, submits them to the
//! coordinator and prints every result as a JSON line on stdout as soon as
//! it is delivered. Logs go to stderr.
//!
//! ```text
//! $ echo '{"text":"Hello","source_lang":"en","target_lang":"de"}' | translation-coordinator
//! {"request_id":"…","state":"completed","outcome":{"kind":"translated","text":"Hallo",…},…}
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use translation_coordinator::config::watcher::ConfigWatcher;
use translation_coordinator::config::{load_config, CoordinatorConfig};
use translation_coordinator::lifecycle::wait_for_shutdown_signal;
use translation_coordinator::observability::{logging, metrics};
use translation_coordinator::{Coordinator, SubmitError, TranslationRequest};

#[derive(Parser)]
#[command(name = "translation-coordinator")]
#[command(about = "Resilient asynchronous translation coordinator", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Reload retry and breaker settings when the config file changes
    #[arg(long)]
    watch: bool,
}

/// One stdin line.
#[derive(Debug, Deserialize)]
struct IncomingRequest {
    #[serde(default)]
    id: Option<String>,
    text: String,
    source_lang: String,
    target_lang: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl From<IncomingRequest> for TranslationRequest {
    fn from(incoming: IncomingRequest) -> Self {
        let mut request =
            TranslationRequest::new(incoming.text, incoming.source_lang, incoming.target_lang);
        if let Some(id) = incoming.id {
            request = request.with_id(id);
        }
        request.user_id = incoming.user_id;
        request.metadata = incoming.metadata;
        request
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CoordinatorConfig::default(),
    };
    // Reloads are compared with the file, not with command-line overrides.
    let file_config = config.clone();
    if let Some(workers) = cli.workers {
        config.workers.count = workers;
    }

    logging::init_logging(&config.observability);
    tracing::info!("translation-coordinator v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let coordinator = Arc::new(Coordinator::builder(config).start()?);

    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, file_config);
            let handle = watcher.run()?;
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    coordinator.apply_config(&new_config);
                }
            });
            Some(handle)
        }
        (None, true) => {
            tracing::warn!("--watch needs --config, hot reload disabled");
            None
        }
        _ => None,
    };

    tokio::select! {
        result = read_requests(coordinator.clone()) => result?,
        _ = wait_for_shutdown_signal() => {}
    }

    coordinator.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Submit stdin requests until EOF, then wait for their results.
async fn read_requests(coordinator: Arc<Coordinator>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut waiting = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: TranslationRequest = match serde_json::from_str::<IncomingRequest>(&line) {
            Ok(incoming) => incoming.into(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed request line");
                continue;
            }
        };

        let id = match coordinator.submit(request).await {
            Ok(id) => id,
            Err(SubmitError::Duplicate(id)) => {
                tracing::warn!(request_id = %id, "Duplicate request id ignored");
                continue;
            }
            // Rejected requests still produce a failed result.
            Err(e) => e.request_id().clone(),
        };

        let coordinator = coordinator.clone();
        waiting.spawn(async move {
            match coordinator.await_result(&id).await {
                Some(result) => match serde_json::to_string(&result) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!(request_id = %id, error = %e, "Failed to encode result"),
                },
                None => tracing::warn!(request_id = %id, "Timed out waiting for result"),
            }
        });
    }

    while waiting.join_next().await.is_some() {}
    Ok(())
}
