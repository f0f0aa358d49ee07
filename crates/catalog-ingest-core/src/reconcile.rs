//! Supplier/product reconciliation.
//!
//! Each row is applied in two steps, supplier first so the product can
//! link to it:
//!
//! 1. **Supplier**: find by name, insert if absent. Existing suppliers are
//!    never modified.
//! 2. **Product**: find by code. Absent → insert. Present → compare the
//!    five mutable fields; if any differ, overwrite all five and refresh
//!    `updated_at`, otherwise leave the row untouched.
//!
//! Row isolation: a constraint violation on any of the three writes is
//! logged and the run moves on to the next row. Any other store failure
//! aborts the run; rows already written stay written.

use crate::clock::{TimeSource, UpdateClock, WallClock};
use crate::model::{NewProduct, Product, ProductRow, Supplier};
use crate::parse::Record;
use crate::store::{CatalogSession, StoreError};
use serde::Serialize;

/// What happened to the product of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductOutcome {
    /// Code was unseen; product inserted
    Created,
    /// At least one field differed; product overwritten
    Updated,
    /// All fields equal; nothing written
    Unchanged,
}

/// Result of reconciling one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOutcome {
    /// Resolved supplier
    pub supplier: Supplier,
    /// Whether the supplier was inserted by this row
    pub supplier_created: bool,
    /// Product resolution
    pub product: ProductOutcome,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Data rows read from the file
    pub rows_read: u64,
    /// Suppliers inserted
    pub suppliers_created: u64,
    /// Products inserted
    pub products_created: u64,
    /// Products overwritten
    pub products_updated: u64,
    /// Products left as they were
    pub products_unchanged: u64,
    /// Rows skipped because they failed validation
    pub rows_rejected: u64,
    /// Rows skipped because a write hit a constraint violation
    pub rows_failed: u64,
}

impl IngestSummary {
    fn record_product(&mut self, outcome: ProductOutcome) {
        match outcome {
            ProductOutcome::Created => self.products_created += 1,
            ProductOutcome::Updated => self.products_updated += 1,
            ProductOutcome::Unchanged => self.products_unchanged += 1,
        }
    }

    /// Whether the run wrote nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.suppliers_created == 0 && self.products_created == 0 && self.products_updated == 0
    }
}

/// Applies rows to a catalog session.
#[derive(Debug, Clone)]
pub struct Reconciler<T = WallClock> {
    clock: UpdateClock<T>,
}

impl Reconciler<WallClock> {
    /// Create a reconciler stamping updates with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(UpdateClock::new())
    }
}

impl Default for Reconciler<WallClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> Reconciler<T> {
    /// Create a reconciler with an explicit clock.
    #[must_use]
    pub fn with_clock(clock: UpdateClock<T>) -> Self {
        Self { clock }
    }

    /// Reconcile every record, isolating row-level failures.
    ///
    /// Records that fail validation and rows whose writes hit a
    /// constraint violation are logged and counted; the next row is
    /// processed regardless.
    ///
    /// # Errors
    ///
    /// Returns the first store error that is not row-scoped. Rows
    /// reconciled before it remain committed.
    pub fn reconcile_records<S, I>(
        &mut self,
        session: &mut S,
        records: I,
    ) -> Result<IngestSummary, StoreError>
    where
        S: CatalogSession + ?Sized,
        I: IntoIterator<Item = Record>,
    {
        let mut summary = IngestSummary::default();

        for record in records {
            summary.rows_read += 1;

            let row = match ProductRow::try_from(&record) {
                Ok(row) => row,
                Err(err) => {
                    tracing::warn!(line = record.line(), error = %err, "Row rejected");
                    summary.rows_rejected += 1;
                    continue;
                }
            };

            match self.apply_row(session, &row, &mut summary) {
                Ok(()) => {}
                Err(err) if err.is_row_scoped() => {
                    tracing::error!(
                        line = row.line,
                        code = %row.code,
                        product = %row.label(),
                        error = %err.store_error(),
                        "{err}"
                    );
                    summary.rows_failed += 1;
                }
                Err(err) => {
                    tracing::error!(line = row.line, error = %err, "Aborting run");
                    return Err(err.into_store_error());
                }
            }
        }

        Ok(summary)
    }

    /// Reconcile a single row.
    ///
    /// # Errors
    ///
    /// Returns error naming the lookup or write that failed.
    pub fn reconcile_row<S>(
        &mut self,
        session: &mut S,
        row: &ProductRow,
    ) -> Result<RowOutcome, ReconcileError>
    where
        S: CatalogSession + ?Sized,
    {
        let (supplier, supplier_created) = resolve_supplier(session, &row.supplier)?;
        let product = self.resolve_product(session, row, &supplier)?;

        Ok(RowOutcome {
            supplier,
            supplier_created,
            product,
        })
    }

    /// Reconcile a row, counting each write as soon as it lands so a
    /// supplier inserted before a failed product write is still reported.
    fn apply_row<S>(
        &mut self,
        session: &mut S,
        row: &ProductRow,
        summary: &mut IngestSummary,
    ) -> Result<(), ReconcileError>
    where
        S: CatalogSession + ?Sized,
    {
        let (supplier, supplier_created) = resolve_supplier(session, &row.supplier)?;
        if supplier_created {
            summary.suppliers_created += 1;
        }

        let product = self.resolve_product(session, row, &supplier)?;
        summary.record_product(product);
        Ok(())
    }

    fn resolve_product<S>(
        &mut self,
        session: &mut S,
        row: &ProductRow,
        supplier: &Supplier,
    ) -> Result<ProductOutcome, ReconcileError>
    where
        S: CatalogSession + ?Sized,
    {
        let existing = session
            .find_product_by_code(&row.code)
            .map_err(|source| ReconcileError::Lookup {
                entity: "product",
                key: row.code.clone(),
                source,
            })?;

        let incoming = row.fields(supplier.id);

        let Some(mut product) = existing else {
            let new_product = NewProduct {
                code: row.code.clone(),
                fields: incoming,
                updated_at: self.clock.tick(),
            };
            let product = session.insert_product(&new_product).map_err(|source| {
                ReconcileError::CreateProduct {
                    product: row.label().to_string(),
                    source,
                }
            })?;
            tracing::info!(
                code = %product.code,
                product_id = product.id,
                supplier = %supplier.name,
                "Product added: {}",
                product.label()
            );
            return Ok(ProductOutcome::Created);
        };

        if !product.differs_from(&incoming) {
            tracing::info!(code = %product.code, "No changes for product: {}", product.label());
            return Ok(ProductOutcome::Unchanged);
        }

        let previous = product.updated_at;
        product.fields = incoming;
        product.updated_at = self.clock.tick_after(previous);

        session
            .update_product(&product)
            .map_err(|source| ReconcileError::UpdateProduct {
                product: product.label().to_string(),
                source,
            })?;
        log_update(&product, previous);

        Ok(ProductOutcome::Updated)
    }
}

fn resolve_supplier<S>(session: &mut S, name: &str) -> Result<(Supplier, bool), ReconcileError>
where
    S: CatalogSession + ?Sized,
{
    let existing = session
        .find_supplier_by_name(name)
        .map_err(|source| ReconcileError::Lookup {
            entity: "supplier",
            key: name.to_string(),
            source,
        })?;

    if let Some(supplier) = existing {
        return Ok((supplier, false));
    }

    let supplier = session
        .insert_supplier(name)
        .map_err(|source| ReconcileError::CreateSupplier {
            name: name.to_string(),
            source,
        })?;
    tracing::info!(supplier_id = supplier.id, "Supplier created: {}", supplier.name);

    Ok((supplier, true))
}

fn log_update(product: &Product, previous: chrono::DateTime<chrono::Utc>) {
    tracing::info!(
        code = %product.code,
        product_id = product.id,
        previous_update = %previous,
        updated_at = %product.updated_at,
        "Product updated: {}",
        product.label()
    );
}

/// A lookup or write that failed while reconciling a row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Business-key lookup failed
    #[error("failed to look up {entity} {key}: {source}")]
    Lookup {
        /// "supplier" or "product"
        entity: &'static str,
        /// Business key
        key: String,
        /// Store error
        source: StoreError,
    },
    /// Supplier insert failed
    #[error("Error creating supplier {name}: {source}")]
    CreateSupplier {
        /// Supplier name
        name: String,
        /// Store error
        source: StoreError,
    },
    /// Product insert failed
    #[error("Error adding product {product}: {source}")]
    CreateProduct {
        /// Product name (or code when unnamed)
        product: String,
        /// Store error
        source: StoreError,
    },
    /// Product update failed
    #[error("Error updating product {product}: {source}")]
    UpdateProduct {
        /// Product name (or code when unnamed)
        product: String,
        /// Store error
        source: StoreError,
    },
}

impl ReconcileError {
    /// The underlying store error.
    #[must_use]
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::Lookup { source, .. }
            | Self::CreateSupplier { source, .. }
            | Self::CreateProduct { source, .. }
            | Self::UpdateProduct { source, .. } => source,
        }
    }

    /// Whether the run can continue with the next row.
    #[must_use]
    pub fn is_row_scoped(&self) -> bool {
        !matches!(self, Self::Lookup { .. }) && self.store_error().is_row_scoped()
    }

    /// Discard the context and keep the store error.
    #[must_use]
    pub fn into_store_error(self) -> StoreError {
        match self {
            Self::Lookup { source, .. }
            | Self::CreateSupplier { source, .. }
            | Self::CreateProduct { source, .. }
            | Self::UpdateProduct { source, .. } => source,
        }
    }
}
