//! One invocation: bytes in, catalog rows out.
//!
//! The whole file is decoded and parsed before the first write, so a
//! malformed file leaves the store untouched. Reconciliation then runs
//! row by row against a single session that is closed on every path.

use crate::clock::TimeSource;
use crate::decode::{DecodeError, Decoder, TextEncoding};
use crate::parse::{ParseError, Record, RecordParser};
use crate::reconcile::{IngestSummary, Reconciler};
use crate::store::{CatalogSession, SessionFactory, StoreError};
use std::io::Read;
use uuid::Uuid;

/// Per-invocation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Declared encoding of the input bytes
    pub encoding: TextEncoding,
}

/// An uploaded file handed over by the trigger.
#[derive(Debug)]
pub struct Blob<R> {
    /// Name the file was uploaded under
    pub name: String,
    /// Size in bytes, when the trigger knows it
    pub length: Option<u64>,
    /// File contents
    pub reader: R,
}

/// Decode and parse a whole file.
///
/// # Errors
///
/// Returns the first decode or parse error; no records are returned in
/// that case.
pub fn read_records<R: Read>(reader: R, encoding: TextEncoding) -> Result<Vec<Record>, ParseError> {
    RecordParser::new(Decoder::new(reader, encoding))?.collect()
}

/// Run one file through the reconciler on an already-open session.
///
/// # Errors
///
/// Returns error if the file cannot be decoded or parsed (nothing is
/// written), or if a store error that is not row-scoped aborts the run.
pub fn ingest<R, S, T>(
    reader: R,
    options: &IngestOptions,
    session: &mut S,
    reconciler: &mut Reconciler<T>,
) -> Result<IngestSummary, IngestError>
where
    R: Read,
    S: CatalogSession + ?Sized,
    T: TimeSource,
{
    let records = read_records(reader, options.encoding)?;
    tracing::debug!(records = records.len(), "File parsed");

    let summary = reconciler.reconcile_records(session, records)?;
    Ok(summary)
}

/// Trigger entry point: process one uploaded file end to end.
///
/// Opens a session, ingests the blob, commits, and closes the session on
/// every path. A failed final commit is logged rather than returned;
/// every row written before it was already committed on its own.
///
/// # Errors
///
/// Returns error if the session cannot be opened, or if [`ingest`] fails.
pub fn handle_blob<F, R>(
    factory: &F,
    blob: Blob<R>,
    options: &IngestOptions,
) -> Result<IngestSummary, IngestError>
where
    F: SessionFactory,
    R: Read,
{
    let invocation_id = Uuid::new_v4();
    let span = tracing::info_span!("invocation", %invocation_id, blob = %blob.name);
    let _entered = span.enter();

    tracing::info!(
        name = %blob.name,
        length = ?blob.length,
        encoding = %options.encoding,
        "Blob trigger fired"
    );

    let mut session = factory.open().map_err(|err| {
        tracing::error!(error = %err, "Could not open store session");
        IngestError::Store(err)
    })?;

    let mut reconciler = Reconciler::new();
    let result = ingest(blob.reader, options, &mut session, &mut reconciler);

    match &result {
        Ok(summary) => {
            match session.commit() {
                Ok(()) => tracing::info!(
                    rows = summary.rows_read,
                    suppliers_created = summary.suppliers_created,
                    products_created = summary.products_created,
                    products_updated = summary.products_updated,
                    products_unchanged = summary.products_unchanged,
                    rows_rejected = summary.rows_rejected,
                    rows_failed = summary.rows_failed,
                    "Data processed successfully."
                ),
                Err(err) => tracing::error!(error = %err, "Error processing data: {err}"),
            }
        }
        Err(err) => tracing::error!(error = %err, "Invocation failed"),
    }

    if let Err(err) = session.close() {
        tracing::warn!(error = %err, "Failed to close store session");
    }

    result
}

/// Run-level failure of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// Input bytes are invalid in the declared encoding
    #[error(transparent)]
    Decode(DecodeError),
    /// Input is not well-formed CSV or lacks required columns
    #[error(transparent)]
    Parse(ParseError),
    /// The store failed in a way that is not row-scoped
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Whether retrying the same file later might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(StoreError::Connection(_)))
    }
}

impl From<ParseError> for IngestError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Decode(err) => Self::Decode(err),
            other => Self::Parse(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCatalog;
    use rust_decimal::Decimal;

    const HEADER: &str = "SUPPLIER,PRODUCT_CODE,PRODUCT_NAME,CATEGORY,PRICE,STOCK\n";

    fn blob(body: &str) -> Blob<&[u8]> {
        Blob {
            name: "container1/catalog.csv".to_string(),
            length: Some(body.len() as u64),
            reader: body.as_bytes(),
        }
    }

    #[test]
    fn single_row_on_empty_store() {
        let store = MemoryCatalog::new();
        let body = format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\n");

        let summary = handle_blob(&store, blob(&body), &IngestOptions::default()).unwrap();

        assert_eq!(summary.suppliers_created, 1);
        assert_eq!(summary.products_created, 1);

        let acme = store.supplier("Acme").unwrap();
        let p1 = store.product("P1").unwrap();
        assert_eq!(p1.fields.name.as_deref(), Some("Widget"));
        assert_eq!(p1.fields.price, Some(Decimal::new(999, 2)));
        assert_eq!(p1.fields.stock, Some(100));
        assert_eq!(p1.fields.supplier_id, acme.id);

        let state = store.state.borrow();
        assert_eq!((state.opened, state.commits, state.closed), (1, 1, 1));
    }

    #[test]
    fn second_pass_is_a_noop() {
        let store = MemoryCatalog::new();
        let body = format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\nAcme,P2,Gear,Parts,2,3\n");

        handle_blob(&store, blob(&body), &IngestOptions::default()).unwrap();
        let first = store.state.borrow().products.clone();

        let summary = handle_blob(&store, blob(&body), &IngestOptions::default()).unwrap();

        assert!(summary.is_noop());
        assert_eq!(summary.products_unchanged, 2);
        assert_eq!(store.state.borrow().products, first);
        assert_eq!(store.state.borrow().suppliers.len(), 1);
    }

    #[test]
    fn parse_error_writes_nothing() {
        let store = MemoryCatalog::new();
        let body = format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\nAcme,P2\n");

        let err = handle_blob(&store, blob(&body), &IngestOptions::default()).unwrap_err();

        assert!(matches!(err, IngestError::Parse(ParseError::FieldCount { line: 3, .. })));
        let state = store.state.borrow();
        assert!(state.writes.is_empty());
        assert_eq!(state.commits, 0);
        assert_eq!(state.closed, 1);
    }

    #[test]
    fn decode_error_is_reported_as_such() {
        let store = MemoryCatalog::new();
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"Acme,P1,\xc3\x28,Tools,1,1\n");

        let blob = Blob {
            name: "bad.csv".to_string(),
            length: None,
            reader: bytes.as_slice(),
        };
        let err = handle_blob(&store, blob, &IngestOptions::default()).unwrap_err();

        assert!(matches!(err, IngestError::Decode(DecodeError::InvalidBytes { line: 2, .. })));
        assert!(!err.is_transient());
    }

    #[test]
    fn latin1_input() {
        let store = MemoryCatalog::new();
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"M\xfcller,P1,Widget,Tools,1,1\n");

        let blob = Blob {
            name: "latin.csv".to_string(),
            length: None,
            reader: bytes.as_slice(),
        };
        let options = IngestOptions {
            encoding: TextEncoding::Latin1,
        };
        handle_blob(&store, blob, &options).unwrap();

        assert!(store.supplier("Müller").is_some());
    }

    #[test]
    fn unreachable_store_aborts_before_reading() {
        let store = MemoryCatalog::new();
        store.state.borrow_mut().unreachable = true;

        let err = handle_blob(&store, blob("not even csv \""), &IngestOptions::default())
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(store.state.borrow().closed, 0);
    }

    #[test]
    fn failed_commit_is_logged_not_returned() {
        let store = MemoryCatalog::new();
        store.state.borrow_mut().fail_commit =
            Some(StoreError::Connection("server closed the connection".to_string()));
        let body = format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\n");

        let summary = handle_blob(&store, blob(&body), &IngestOptions::default()).unwrap();

        assert_eq!(summary.products_created, 1);
        assert!(store.product("P1").is_some());
        assert_eq!(store.state.borrow().closed, 1);
    }

    #[test]
    fn update_scenario() {
        let store = MemoryCatalog::new();
        let first = format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\n");
        let second = format!("{HEADER}Acme,P1,Widget,Tools,12.50,80\n");

        handle_blob(&store, blob(&first), &IngestOptions::default()).unwrap();
        let before = store.product("P1").unwrap();
        let summary = handle_blob(&store, blob(&second), &IngestOptions::default()).unwrap();

        assert_eq!(summary.products_updated, 1);
        let after = store.product("P1").unwrap();
        assert_eq!(after.fields.price, Some(Decimal::new(1250, 2)));
        assert_eq!(after.fields.stock, Some(80));
        assert!(after.updated_at > before.updated_at);
    }
}
