//! In-memory catalog used by unit tests.

use crate::model::{NewProduct, Product, Supplier};
use crate::store::{CatalogSession, SessionFactory, StoreError};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// A write the store accepted, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Supplier(String),
    InsertProduct(String),
    UpdateProduct(String),
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub suppliers: Vec<Supplier>,
    pub products: Vec<Product>,
    pub writes: Vec<Write>,
    pub commits: usize,
    pub opened: usize,
    pub closed: usize,
    /// Codes `find_product_by_code` pretends not to see, as if another
    /// writer inserted them after the lookup
    pub hidden_codes: HashSet<String>,
    /// Supplier names `find_supplier_by_name` pretends not to see
    pub hidden_suppliers: HashSet<String>,
    pub unreachable: bool,
    pub fail_updates: Option<StoreError>,
    pub fail_commit: Option<StoreError>,
}

/// Shared handle; clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    pub state: Rc<RefCell<MemoryState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(&self, code: &str) -> Option<Product> {
        self.state
            .borrow()
            .products
            .iter()
            .find(|p| p.code == code)
            .cloned()
    }

    pub fn supplier(&self, name: &str) -> Option<Supplier> {
        self.state
            .borrow()
            .suppliers
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.borrow().writes.clone()
    }
}

impl CatalogSession for MemoryCatalog {
    fn find_supplier_by_name(&mut self, name: &str) -> Result<Option<Supplier>, StoreError> {
        if self.state.borrow().hidden_suppliers.contains(name) {
            return Ok(None);
        }
        Ok(self.supplier(name))
    }

    fn insert_supplier(&mut self, name: &str) -> Result<Supplier, StoreError> {
        let mut state = self.state.borrow_mut();
        if state.suppliers.iter().any(|s| s.name == name) {
            return Err(StoreError::ConstraintViolation(format!(
                "UNIQUE constraint failed: supplier.name ({name})"
            )));
        }

        let supplier = Supplier {
            id: i64::try_from(state.suppliers.len()).unwrap() + 1,
            name: name.to_string(),
        };
        state.suppliers.push(supplier.clone());
        state.writes.push(Write::Supplier(name.to_string()));
        Ok(supplier)
    }

    fn find_product_by_code(&mut self, code: &str) -> Result<Option<Product>, StoreError> {
        if self.state.borrow().hidden_codes.contains(code) {
            return Ok(None);
        }
        Ok(self.product(code))
    }

    fn insert_product(&mut self, product: &NewProduct) -> Result<Product, StoreError> {
        let mut state = self.state.borrow_mut();
        if state.products.iter().any(|p| p.code == product.code) {
            return Err(StoreError::ConstraintViolation(format!(
                "UNIQUE constraint failed: product.code ({})",
                product.code
            )));
        }
        if !state
            .suppliers
            .iter()
            .any(|s| s.id == product.fields.supplier_id)
        {
            return Err(StoreError::ConstraintViolation(
                "FOREIGN KEY constraint failed".to_string(),
            ));
        }

        let stored = Product {
            id: i64::try_from(state.products.len()).unwrap() + 1,
            code: product.code.clone(),
            fields: product.fields.clone(),
            updated_at: product.updated_at,
        };
        state.products.push(stored.clone());
        state.writes.push(Write::InsertProduct(product.code.clone()));
        Ok(stored)
    }

    fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.fail_updates.clone() {
            return Err(err);
        }

        let slot = state
            .products
            .iter_mut()
            .find(|p| p.id == product.id)
            .ok_or_else(|| StoreError::Backend(format!("no product with id {}", product.id)))?;
        *slot = product.clone();
        state.writes.push(Write::UpdateProduct(product.code.clone()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.fail_commit.clone() {
            return Err(err);
        }
        state.commits += 1;
        Ok(())
    }

    fn close(self) -> Result<(), StoreError> {
        self.state.borrow_mut().closed += 1;
        Ok(())
    }
}

impl SessionFactory for MemoryCatalog {
    type Session = MemoryCatalog;

    fn open(&self) -> Result<Self::Session, StoreError> {
        let mut state = self.state.borrow_mut();
        if state.unreachable {
            return Err(StoreError::Connection("connection refused".to_string()));
        }
        state.opened += 1;
        Ok(self.clone())
    }
}
