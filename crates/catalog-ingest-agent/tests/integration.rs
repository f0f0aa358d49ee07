use catalog_ingest_core::{
    handle_blob, ingest, Blob, CatalogSession, IngestError, IngestOptions, IngestSummary,
    NewProduct, ParseError, Product, Reconciler, SessionFactory, StoreError, Supplier,
};
use catalog_ingest_sqlite::{DatabaseTarget, SqliteConnector, SqliteSession};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;

const HEADER: &str = "SUPPLIER,PRODUCT_CODE,PRODUCT_NAME,CATEGORY,PRICE,STOCK\n";

fn connector(dir: &Path) -> SqliteConnector {
    SqliteConnector::new(DatabaseTarget::File(dir.join("catalog.db")))
}

fn upload(connector: &SqliteConnector, body: &str) -> Result<IngestSummary, IngestError> {
    let blob = Blob {
        name: "container1/catalog.csv".to_string(),
        length: Some(body.len() as u64),
        reader: body.as_bytes(),
    };
    handle_blob(connector, blob, &IngestOptions::default())
}

fn count(session: &SqliteSession, table: &str) -> i64 {
    session
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
}

/// Delegates to `SQLite` but misses some codes on lookup, as if another
/// writer inserted them between the lookup and the insert.
struct RacingSession {
    inner: SqliteSession,
    hidden: HashSet<String>,
}

impl CatalogSession for RacingSession {
    fn find_supplier_by_name(&mut self, name: &str) -> Result<Option<Supplier>, StoreError> {
        self.inner.find_supplier_by_name(name)
    }

    fn insert_supplier(&mut self, name: &str) -> Result<Supplier, StoreError> {
        self.inner.insert_supplier(name)
    }

    fn find_product_by_code(&mut self, code: &str) -> Result<Option<Product>, StoreError> {
        if self.hidden.contains(code) {
            return Ok(None);
        }
        self.inner.find_product_by_code(code)
    }

    fn insert_product(&mut self, product: &NewProduct) -> Result<Product, StoreError> {
        self.inner.insert_product(product)
    }

    fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.inner.update_product(product)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit()
    }

    fn close(self) -> Result<(), StoreError> {
        self.inner.close()
    }
}

#[test]
fn new_supplier_and_product() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector(dir.path());

    let summary = upload(&connector, &format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\n")).unwrap();
    assert_eq!(summary.suppliers_created, 1);
    assert_eq!(summary.products_created, 1);

    let mut session = connector.open().unwrap();
    let acme = session.find_supplier_by_name("Acme").unwrap().unwrap();
    let p1 = session.find_product_by_code("P1").unwrap().unwrap();

    assert_eq!(p1.fields.name.as_deref(), Some("Widget"));
    assert_eq!(p1.fields.category.as_deref(), Some("Tools"));
    assert_eq!(p1.fields.price, Some(Decimal::new(999, 2)));
    assert_eq!(p1.fields.stock, Some(100));
    assert_eq!(p1.fields.supplier_id, acme.id);
}

#[test]
fn rerun_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector(dir.path());
    let body = format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\nAcme,P2,Gear,Parts,10.0,5\n");

    upload(&connector, &body).unwrap();
    let before = connector.open().unwrap().find_product_by_code("P2").unwrap();

    let summary = upload(&connector, &body).unwrap();

    assert!(summary.is_noop());
    assert_eq!(summary.products_unchanged, 2);

    let mut session = connector.open().unwrap();
    assert_eq!(count(&session, "supplier"), 1);
    assert_eq!(count(&session, "product"), 2);
    assert_eq!(session.find_product_by_code("P2").unwrap(), before);
}

#[test]
fn changed_row_updates_product() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector(dir.path());

    upload(&connector, &format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\n")).unwrap();
    let before = connector.open().unwrap().find_product_by_code("P1").unwrap().unwrap();

    let summary = upload(&connector, &format!("{HEADER}Acme,P1,Widget,Tools,12.50,80\n")).unwrap();
    assert_eq!(summary.products_updated, 1);

    let after = connector.open().unwrap().find_product_by_code("P1").unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.fields.price, Some(Decimal::new(1250, 2)));
    assert_eq!(after.fields.stock, Some(80));
    assert!(after.updated_at > before.updated_at);
}

#[test]
fn racing_insert_is_isolated_to_its_row() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector(dir.path());
    upload(&connector, &format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\n")).unwrap();

    let mut session = RacingSession {
        inner: connector.open().unwrap(),
        hidden: HashSet::from(["P1".to_string()]),
    };
    let body = format!("{HEADER}Acme,P1,Widget,Tools,1,1\nAcme,P2,Gear,Parts,2,3\n");

    let summary = ingest(
        body.as_bytes(),
        &IngestOptions::default(),
        &mut session,
        &mut Reconciler::new(),
    )
    .unwrap();

    assert_eq!(summary.rows_failed, 1);
    assert_eq!(summary.products_created, 1);

    let mut inner = session.inner;
    let p1 = inner.find_product_by_code("P1").unwrap().unwrap();
    assert_eq!(p1.fields.price, Some(Decimal::new(999, 2)));
    assert!(inner.find_product_by_code("P2").unwrap().is_some());
}

#[test]
fn malformed_file_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector(dir.path());

    let err = upload(
        &connector,
        &format!("{HEADER}Acme,P1,Widget,Tools,9.99,100\nBeta,\"P2,Gear,Parts,1,1\n"),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Parse(ParseError::UnterminatedQuote { .. })
    ));

    let session = connector.open().unwrap();
    assert_eq!(count(&session, "supplier"), 0);
    assert_eq!(count(&session, "product"), 0);
}

#[test]
fn missing_column_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector(dir.path());

    let err = upload(
        &connector,
        "SUPPLIER,PRODUCT_CODE,PRODUCT_NAME,CATEGORY,PRICE\nAcme,P1,Widget,Tools,9.99\n",
    )
    .unwrap_err();

    assert_eq!(err, IngestError::Parse(ParseError::MissingColumn("STOCK")));
}
