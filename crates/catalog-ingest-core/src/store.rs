//! Store session abstraction.
//!
//! A session is the only handle the reconciler has on persistent state.
//! It is passed in explicitly; nothing in this crate reaches for a global
//! connection.
//!
//! Every write method commits on its own: once `insert_supplier`,
//! `insert_product` or `update_product` returns `Ok`, the change is
//! durable even if a later row aborts the run. `commit` only flushes
//! whatever the backend still holds open.

use crate::model::{NewProduct, Product, Supplier};

/// A live session against the catalog store.
pub trait CatalogSession {
    /// Look up a supplier by exact name.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn find_supplier_by_name(&mut self, name: &str) -> Result<Option<Supplier>, StoreError>;

    /// Insert a supplier and return it with its surrogate id.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the name already exists.
    fn insert_supplier(&mut self, name: &str) -> Result<Supplier, StoreError>;

    /// Look up a product by exact code.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn find_product_by_code(&mut self, code: &str) -> Result<Option<Product>, StoreError>;

    /// Insert a product and return it with its surrogate id.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the code already exists or the
    /// supplier reference is dangling.
    fn insert_product(&mut self, product: &NewProduct) -> Result<Product, StoreError>;

    /// Overwrite the mutable fields and timestamp of an existing product.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the supplier reference is dangling.
    fn update_product(&mut self, product: &Product) -> Result<(), StoreError>;

    /// Flush anything still pending.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot commit.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Release the session.
    ///
    /// # Errors
    ///
    /// Returns error if the backend reports a failure while closing.
    fn close(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

/// Opens sessions; one per invocation.
pub trait SessionFactory {
    /// Session type produced.
    type Session: CatalogSession;

    /// Acquire a session.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the store is unreachable.
    fn open(&self) -> Result<Self::Session, StoreError>;
}

/// Errors reported by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Unique-key or foreign-key violation
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    /// Store unreachable or lost
    #[error("store unreachable: {0}")]
    Connection(String),
    /// Any other backend failure
    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the failure concerns only the row being written.
    ///
    /// Constraint violations are caused by the data (or a racing writer)
    /// and leave the session usable; everything else does not.
    #[must_use]
    pub fn is_row_scoped(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}
