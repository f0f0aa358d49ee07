//! # Catalog Ingest SQLite
//!
//! `SQLite` implementation of the catalog store.
//!
//! - [`SqliteSession`]: one connection in autocommit mode, so each
//!   supplier or product write is committed as soon as it returns
//! - [`SqliteConnector`]: parses `DATABASE_URL` and opens one session per
//!   invocation

#![warn(missing_docs)]
#![warn(clippy::all)]

mod store;

pub use store::{ConnectorError, DatabaseTarget, SqliteConnector, SqliteSession};
