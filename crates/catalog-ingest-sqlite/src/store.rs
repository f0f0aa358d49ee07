//! `SQLite` catalog session.

use catalog_ingest_core::{
    CatalogSession, NewProduct, Product, ProductFields, SessionFactory, StoreError, Supplier,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const PRODUCT_COLUMNS: &str =
    "id, code, name, category, price, stock, supplier_id, update_date";

/// `SQLite`-backed catalog session.
///
/// The connection stays in autocommit mode, so every write is its own
/// transaction.
pub struct SqliteSession {
    conn: Connection,
}

impl SqliteSession {
    /// Open or create a `SQLite` database file.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the database cannot be opened, or any
    /// error raised while preparing the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))?;
        let session = Self::init(conn)?;
        tracing::debug!(path = %path.display(), "Catalog database opened");
        Ok(session)
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Connection(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        let session = Self { conn };
        session.init_schema().map_err(map_error)?;
        Ok(session)
    }

    /// Enable foreign keys and create the catalog tables if absent.
    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            r"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS supplier (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            -- price is canonical decimal text so no precision is lost
            CREATE TABLE IF NOT EXISTS product (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                name TEXT,
                category TEXT,
                price TEXT,
                stock INTEGER,
                supplier_id INTEGER NOT NULL REFERENCES supplier(id),
                update_date TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_product_supplier_id ON product(supplier_id);
            ",
        )
    }

    /// Borrow the underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl CatalogSession for SqliteSession {
    fn find_supplier_by_name(&mut self, name: &str) -> Result<Option<Supplier>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, name FROM supplier WHERE name = ?1",
                [name],
                |row| {
                    Ok(Supplier {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(map_error)
    }

    fn insert_supplier(&mut self, name: &str) -> Result<Supplier, StoreError> {
        self.conn
            .execute("INSERT INTO supplier (name) VALUES (?1)", [name])
            .map_err(map_error)?;

        Ok(Supplier {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn find_product_by_code(&mut self, code: &str) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE code = ?1");
        self.conn
            .query_row(&sql, [code], product_from_row)
            .optional()
            .map_err(map_error)
    }

    fn insert_product(&mut self, product: &NewProduct) -> Result<Product, StoreError> {
        let fields = &product.fields;
        self.conn
            .execute(
                r"
                INSERT INTO product (code, name, category, price, stock, supplier_id, update_date)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                (
                    &product.code,
                    &fields.name,
                    &fields.category,
                    price_to_text(fields.price),
                    fields.stock,
                    fields.supplier_id,
                    product.updated_at,
                ),
            )
            .map_err(map_error)?;

        Ok(Product {
            id: self.conn.last_insert_rowid(),
            code: product.code.clone(),
            fields: product.fields.clone(),
            updated_at: product.updated_at,
        })
    }

    fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let fields = &product.fields;
        let changed = self
            .conn
            .execute(
                r"
                UPDATE product
                SET name = ?2, category = ?3, price = ?4, stock = ?5,
                    supplier_id = ?6, update_date = ?7
                WHERE id = ?1
                ",
                (
                    product.id,
                    &fields.name,
                    &fields.category,
                    price_to_text(fields.price),
                    fields.stock,
                    fields.supplier_id,
                    product.updated_at,
                ),
            )
            .map_err(map_error)?;

        if changed == 0 {
            return Err(StoreError::Backend(format!(
                "product {} (id {}) no longer exists",
                product.code, product.id
            )));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT").map_err(map_error)
    }

    fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| map_error(e))
    }
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let price: Option<String> = row.get(4)?;
    let price = price
        .map(|text| {
            Decimal::from_str(&text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
            })
        })
        .transpose()?;
    let updated_at: DateTime<Utc> = row.get(7)?;

    Ok(Product {
        id: row.get(0)?,
        code: row.get(1)?,
        fields: ProductFields {
            name: row.get(2)?,
            category: row.get(3)?,
            price,
            stock: row.get(5)?,
            supplier_id: row.get(6)?,
        },
        updated_at,
    })
}

fn price_to_text(price: Option<Decimal>) -> Option<String> {
    price.map(|p| p.normalize().to_string())
}

/// Sort a rusqlite failure into the catalog error taxonomy.
fn map_error(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::ConstraintViolation(err.to_string()),
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::NotADatabase
            | ErrorCode::PermissionDenied
            | ErrorCode::SystemIoFailure,
        ) => StoreError::Connection(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Where a connector opens its sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    /// A database file
    File(PathBuf),
    /// A fresh in-memory database per session
    Memory,
}

/// Opens one [`SqliteSession`] per invocation from a connection string.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    target: DatabaseTarget,
}

impl SqliteConnector {
    /// Parse a connection string.
    ///
    /// Accepts `sqlite://<path>`, `sqlite:<path>`, `sqlite::memory:`,
    /// `:memory:` or a bare file path.
    ///
    /// # Errors
    ///
    /// Returns error if the string is empty or names another database.
    pub fn from_url(url: &str) -> Result<Self, ConnectorError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ConnectorError::Empty);
        }

        let rest = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if rest == ":memory:" {
            return Ok(Self::new(DatabaseTarget::Memory));
        }

        if let Some((scheme, _)) = rest.split_once("://") {
            return Err(ConnectorError::UnsupportedScheme(scheme.to_string()));
        }

        if rest.is_empty() {
            return Err(ConnectorError::Empty);
        }

        Ok(Self::new(DatabaseTarget::File(PathBuf::from(rest))))
    }

    /// Create a connector for an explicit target.
    #[must_use]
    pub fn new(target: DatabaseTarget) -> Self {
        Self { target }
    }

    /// Where sessions are opened.
    #[must_use]
    pub fn target(&self) -> &DatabaseTarget {
        &self.target
    }
}

impl SessionFactory for SqliteConnector {
    type Session = SqliteSession;

    fn open(&self) -> Result<Self::Session, StoreError> {
        match &self.target {
            DatabaseTarget::File(path) => SqliteSession::open(path),
            DatabaseTarget::Memory => SqliteSession::in_memory(),
        }
    }
}

/// Errors in a connection string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// Nothing to connect to
    #[error("connection string is empty")]
    Empty,
    /// Not a `SQLite` connection string
    #[error("unsupported database scheme {0}://")]
    UnsupportedScheme(String),
}
