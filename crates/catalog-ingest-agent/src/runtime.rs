//! Agent runtime: the inbox trigger.
//!
//! Every poll interval the inbox directory is scanned for `*.csv` files.
//! Each file is one invocation, run to completion before the next one
//! starts. Afterwards the file is moved out of the inbox so it fires only
//! once; a file whose invocation could not reach the store stays put and
//! fires again on the next scan.

use crate::config::{AgentConfig, InboxConfig};
use anyhow::{Context, Result};
use catalog_ingest_core::{handle_blob, Blob, IngestError, IngestOptions, IngestSummary};
use catalog_ingest_sqlite::SqliteConnector;
use std::fs::{self, File};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Where a file goes once its invocation is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Move to the processed archive
    Processed,
    /// Move to the failed archive
    Failed,
    /// Leave in the inbox for the next scan
    Retry,
}

impl Disposition {
    /// Decide from an invocation result.
    #[must_use]
    pub fn of(result: &Result<IngestSummary, IngestError>) -> Self {
        match result {
            Ok(_) => Self::Processed,
            Err(err) if err.is_transient() => Self::Retry,
            Err(_) => Self::Failed,
        }
    }
}

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
    connector: SqliteConnector,
}

impl Agent {
    /// Create a new agent.
    ///
    /// # Errors
    ///
    /// Returns error if the connection string is invalid or the inbox
    /// directories cannot be created.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let connector =
            SqliteConnector::from_url(&config.database_url).context("Invalid DATABASE_URL")?;

        for dir in [
            &config.inbox.dir,
            &config.inbox.processed_dir,
            &config.inbox.failed_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }

        Ok(Self { config, connector })
    }

    /// Run the agent's main loop until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error if the inbox cannot be scanned.
    pub async fn run(self) -> Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Run the agent's main loop until `shutdown` completes.
    ///
    /// The batch in progress finishes first; a shutdown that fires during
    /// it stops the loop before the next scan.
    ///
    /// # Errors
    ///
    /// Returns error if the inbox cannot be scanned.
    pub async fn run_until<F: Future>(self, shutdown: F) -> Result<()> {
        tracing::info!(
            inbox = %self.config.inbox.dir.display(),
            poll_interval_secs = self.config.inbox.poll_interval.as_secs(),
            "Agent running, press Ctrl+C to stop"
        );

        let mut interval = tokio::time::interval(self.config.inbox.poll_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for path in scan_inbox(&self.config.inbox.dir)? {
                        let connector = self.connector.clone();
                        let inbox = self.config.inbox.clone();
                        let options = IngestOptions { encoding: self.config.encoding };

                        let outcome = tokio::task::spawn_blocking(move || {
                            process_file(&connector, &inbox, &options, &path)
                        })
                        .await
                        .context("Invocation task panicked")?;

                        if let Err(err) = outcome {
                            tracing::error!(error = %err, "Failed to archive blob");
                        }
                    }
                }

                // Handle shutdown
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        tracing::info!("Agent stopped");
        Ok(())
    }
}

/// List the `.csv` files waiting in `dir`, in name order.
///
/// # Errors
///
/// Returns error if the directory cannot be read.
pub fn scan_inbox(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Run one invocation for the file at `path` and archive it.
///
/// # Errors
///
/// Returns error if the file cannot be opened or moved. Invocation
/// failures are not errors here; they decide where the file goes.
pub fn process_file(
    connector: &SqliteConnector,
    inbox: &InboxConfig,
    options: &IngestOptions,
    path: &Path,
) -> Result<Disposition> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let length = file.metadata().ok().map(|meta| meta.len());

    let blob = Blob {
        name: blob_name(inbox, path),
        length,
        reader: file,
    };

    let result = handle_blob(connector, blob, options);
    let disposition = Disposition::of(&result);

    let target_dir = match disposition {
        Disposition::Processed => &inbox.processed_dir,
        Disposition::Failed => &inbox.failed_dir,
        Disposition::Retry => {
            tracing::warn!(path = %path.display(), "Store unreachable, will retry on next scan");
            return Ok(disposition);
        }
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let target = target_dir.join(file_name);
    fs::rename(path, &target).with_context(|| {
        format!("Failed to move {} to {}", path.display(), target.display())
    })?;
    tracing::debug!(from = %path.display(), to = %target.display(), "Blob archived");

    Ok(disposition)
}

/// Name the blob relative to the inbox, like a container path.
fn blob_name(inbox: &InboxConfig, path: &Path) -> String {
    let container = inbox
        .dir
        .file_name()
        .map_or_else(|| "inbox".into(), |name| name.to_string_lossy());
    let file = path
        .file_name()
        .map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy());
    format!("{container}/{file}")
}
