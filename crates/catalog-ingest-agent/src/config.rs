//! Agent configuration.

use anyhow::{bail, Context, Result};
use catalog_ingest_core::TextEncoding;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Catalog store connection string
    pub database_url: String,

    /// Inbox configuration
    pub inbox: InboxConfig,

    /// Declared encoding of uploaded files
    pub encoding: TextEncoding,
}

/// Inbox configuration.
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// Directory watched for uploaded `.csv` files
    pub dir: PathBuf,

    /// Where files go after a completed invocation
    pub processed_dir: PathBuf,

    /// Where files go after a failed invocation
    pub failed_dir: PathBuf,

    /// Poll interval
    pub poll_interval: Duration,
}

impl InboxConfig {
    fn under(dir: PathBuf) -> Self {
        Self {
            processed_dir: dir.join("processed"),
            failed_dir: dir.join("failed"),
            dir,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self::under(PathBuf::from("./inbox"))
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: catalog store connection string (required)
    /// - `CATALOG_INBOX_DIR`: watched directory
    /// - `CATALOG_PROCESSED_DIR`: archive for processed files
    /// - `CATALOG_FAILED_DIR`: archive for failed files
    /// - `CATALOG_POLL_INTERVAL_SECS`: seconds between inbox scans
    /// - `CATALOG_INPUT_ENCODING`: `utf-8` or `iso-8859-1`
    ///
    /// # Errors
    ///
    /// Returns error if `DATABASE_URL` is missing or a value is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if `DATABASE_URL` is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(database_url) = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty())
        else {
            bail!("DATABASE_URL must be set");
        };

        let mut inbox = lookup("CATALOG_INBOX_DIR")
            .map(PathBuf::from)
            .map_or_else(InboxConfig::default, InboxConfig::under);

        if let Some(dir) = lookup("CATALOG_PROCESSED_DIR") {
            inbox.processed_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("CATALOG_FAILED_DIR") {
            inbox.failed_dir = PathBuf::from(dir);
        }

        if let Some(secs) = lookup("CATALOG_POLL_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .context("Invalid CATALOG_POLL_INTERVAL_SECS")?;
            inbox.poll_interval = Duration::from_secs(secs.max(1));
        }

        let encoding = match lookup("CATALOG_INPUT_ENCODING") {
            Some(name) => name.parse().context("Invalid CATALOG_INPUT_ENCODING")?,
            None => TextEncoding::default(),
        };

        Ok(Self {
            database_url,
            inbox,
            encoding,
        })
    }
}
