//! # Catalog Ingest Core
//!
//! Turns an uploaded CSV file into product and supplier rows.
//!
//! This crate provides:
//! - A lazy line decoder over a byte stream
//! - A header-keyed CSV record parser
//! - Typed catalog entities with numeric price/stock comparison
//! - The reconciler: insert-if-absent, update-if-changed, per-row commit
//! - The invocation entry point that owns one store session per file

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod decode;
pub mod ingest;
pub mod model;
pub mod parse;
pub mod reconcile;
pub mod store;

#[cfg(test)]
mod testing;

pub use clock::{TimeSource, UpdateClock, WallClock};
pub use decode::{DecodeError, Decoder, TextEncoding};
pub use ingest::{handle_blob, ingest, read_records, Blob, IngestError, IngestOptions};
pub use model::{NewProduct, Product, ProductFields, ProductRow, RowError, Supplier, SurrogateId};
pub use parse::{ParseError, Record, RecordParser};
pub use reconcile::{IngestSummary, ProductOutcome, ReconcileError, Reconciler, RowOutcome};
pub use store::{CatalogSession, SessionFactory, StoreError};
