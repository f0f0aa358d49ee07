//! Catalog entities and the typed form of an input row.
//!
//! Suppliers and products are identified by business keys (supplier name,
//! product code). Surrogate ids are assigned by the store and only used
//! to link a product to its supplier.

use crate::parse::{columns, Record};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Store-generated identity of a row.
pub type SurrogateId = i64;

/// A supplier row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supplier {
    /// Surrogate id
    pub id: SurrogateId,
    /// Unique supplier name
    pub name: String,
}

/// The five product fields an input row can change.
///
/// Equality is numeric for `price` (`10` equals `10.0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFields {
    /// Product display name
    pub name: Option<String>,
    /// Product category
    pub category: Option<String>,
    /// Unit price
    pub price: Option<Decimal>,
    /// Units in stock
    pub stock: Option<i64>,
    /// Owning supplier
    pub supplier_id: SurrogateId,
}

/// A product row as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Surrogate id
    pub id: SurrogateId,
    /// Unique product code
    pub code: String,
    /// Mutable fields
    pub fields: ProductFields,
    /// Last time any mutable field changed
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether any mutable field differs from `incoming`.
    #[must_use]
    pub fn differs_from(&self, incoming: &ProductFields) -> bool {
        self.fields != *incoming
    }

    /// Name used in log lines: the product name, or its code when unnamed.
    #[must_use]
    pub fn label(&self) -> &str {
        self.fields.name.as_deref().unwrap_or(&self.code)
    }
}

/// A product that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    /// Unique product code
    pub code: String,
    /// Initial field values
    pub fields: ProductFields,
    /// Creation timestamp
    pub updated_at: DateTime<Utc>,
}

/// One data row of the input file, validated and typed.
///
/// Price and stock are coerced here, once, so every later comparison is
/// numeric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    /// 1-based source line of the record
    pub line: u64,
    /// Supplier business key
    pub supplier: String,
    /// Product business key
    pub code: String,
    /// Product name
    pub name: Option<String>,
    /// Product category
    pub category: Option<String>,
    /// Unit price, normalized
    pub price: Option<Decimal>,
    /// Units in stock
    pub stock: Option<i64>,
}

impl ProductRow {
    /// The mutable product fields this row carries, linked to `supplier_id`.
    #[must_use]
    pub fn fields(&self, supplier_id: SurrogateId) -> ProductFields {
        ProductFields {
            name: self.name.clone(),
            category: self.category.clone(),
            price: self.price,
            stock: self.stock,
            supplier_id,
        }
    }

    /// Name used in log lines: the product name, or its code when unnamed.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.code)
    }
}

impl TryFrom<&Record> for ProductRow {
    type Error = RowError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let line = record.line();

        let supplier = required(record, columns::SUPPLIER)?;
        let code = required(record, columns::PRODUCT_CODE)?;

        let price = optional(record, columns::PRICE)
            .map(|raw| parse_price(raw, line))
            .transpose()?;
        let stock = optional(record, columns::STOCK)
            .map(|raw| parse_stock(raw, line))
            .transpose()?;

        Ok(Self {
            line,
            supplier,
            code,
            name: optional(record, columns::PRODUCT_NAME).map(str::to_string),
            category: optional(record, columns::CATEGORY).map(str::to_string),
            price,
            stock,
        })
    }
}

fn required(record: &Record, column: &'static str) -> Result<String, RowError> {
    optional(record, column)
        .map(str::to_string)
        .ok_or(RowError::MissingField {
            line: record.line(),
            column,
        })
}

fn optional<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    record.get(column).filter(|value| !value.is_empty())
}

fn parse_price(raw: &str, line: u64) -> Result<Decimal, RowError> {
    Decimal::from_str(raw.trim())
        .map(|price| price.normalize())
        .map_err(|_| RowError::InvalidPrice {
            line,
            value: raw.to_string(),
        })
}

fn parse_stock(raw: &str, line: u64) -> Result<i64, RowError> {
    let trimmed = raw.trim();
    if let Ok(stock) = trimmed.parse::<i64>() {
        return Ok(stock);
    }

    // Spreadsheet exports often write integral counts as "80.0"
    Decimal::from_str(trimmed)
        .ok()
        .filter(|value| value.fract().is_zero())
        .and_then(|value| value.to_i64())
        .ok_or_else(|| RowError::InvalidStock {
            line,
            value: raw.to_string(),
        })
}

/// Reasons a record cannot be turned into a [`ProductRow`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// A business key column is empty
    #[error("line {line}: missing value for {column}")]
    MissingField {
        /// Source line
        line: u64,
        /// Column name
        column: &'static str,
    },
    /// Price is not a decimal number
    #[error("line {line}: invalid price {value:?}")]
    InvalidPrice {
        /// Source line
        line: u64,
        /// Raw value
        value: String,
    },
    /// Stock is not an integer
    #[error("line {line}: invalid stock {value:?}")]
    InvalidStock {
        /// Source line
        line: u64,
        /// Raw value
        value: String,
    },
}
