//! Decoded lines to header-keyed records.
//!
//! The first line is the header. Every following record becomes a
//! [`Record`] mapping header names to raw field text. Quoting follows
//! RFC 4180: quoted fields may hold commas, doubled quotes and newlines.
//!
//! Field splitting is done by the `csv` crate reading from [`LineSource`],
//! an `io::Read` adapter over the decoder's lines. The adapter also tracks
//! quote state so a quote left open at end of input is reported instead
//! of silently swallowing the rest of the file.

use crate::decode::DecodeError;
use std::collections::HashMap;
use std::io::{self, Read};

/// Column names the reconciler reads.
pub mod columns {
    /// Supplier name
    pub const SUPPLIER: &str = "SUPPLIER";
    /// Product code
    pub const PRODUCT_CODE: &str = "PRODUCT_CODE";
    /// Product name
    pub const PRODUCT_NAME: &str = "PRODUCT_NAME";
    /// Product category
    pub const CATEGORY: &str = "CATEGORY";
    /// Unit price
    pub const PRICE: &str = "PRICE";
    /// Units in stock
    pub const STOCK: &str = "STOCK";

    /// Columns every input header must contain.
    pub const REQUIRED: [&str; 6] = [SUPPLIER, PRODUCT_CODE, PRODUCT_NAME, CATEGORY, PRICE, STOCK];
}

/// One data row, keyed by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    line: u64,
    fields: HashMap<String, String>,
}

impl Record {
    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(line: u64, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            line,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw value of `column`, if the header has it.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// 1-based line the record starts on.
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }
}

/// Lazy record parser over decoded lines.
pub struct RecordParser<I> {
    reader: csv::Reader<LineSource<I>>,
    headers: Vec<String>,
    record: csv::StringRecord,
    done: bool,
}

impl<I> RecordParser<I>
where
    I: Iterator<Item = Result<String, DecodeError>>,
{
    /// Read the header line and validate it.
    ///
    /// # Errors
    ///
    /// Returns error if the input is empty, a required column is missing,
    /// or the header line itself cannot be decoded or parsed.
    pub fn new(lines: I) -> Result<Self, ParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(LineSource::new(lines));

        let headers: Vec<String> = reader
            .headers()
            .map_err(ParseError::from_csv)?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();

        if headers.iter().all(String::is_empty) {
            return Err(ParseError::EmptyInput);
        }

        if let Some(missing) = columns::REQUIRED
            .into_iter()
            .find(|column| !headers.iter().any(|h| h == *column))
        {
            return Err(ParseError::MissingColumn(missing));
        }

        Ok(Self {
            reader,
            headers,
            record: csv::StringRecord::new(),
            done: false,
        })
    }

    /// Header names in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<I> Iterator for RecordParser<I>
where
    I: Iterator<Item = Result<String, DecodeError>>,
{
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                let line = self.record.position().map_or(0, csv::Position::line);
                Some(Ok(Record::from_pairs(
                    line,
                    self.headers.iter().cloned().zip(self.record.iter()),
                )))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(ParseError::from_csv(err)))
            }
        }
    }
}

/// `io::Read` over decoded lines, watching quote state as bytes pass.
struct LineSource<I> {
    lines: I,
    pending: Vec<u8>,
    pos: usize,
    line: u64,
    quotes: QuoteScanner,
}

impl<I> LineSource<I> {
    fn new(lines: I) -> Self {
        Self {
            lines,
            pending: Vec::new(),
            pos: 0,
            line: 0,
            quotes: QuoteScanner::default(),
        }
    }
}

impl<I> Read for LineSource<I>
where
    I: Iterator<Item = Result<String, DecodeError>>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.pending.len() {
            match self.lines.next() {
                Some(Ok(text)) => {
                    self.line += 1;
                    self.quotes.scan(&text, self.line);
                    self.pending = text.into_bytes();
                    self.pos = 0;
                }
                Some(Err(err)) => return Err(SourceError::Decode(err).into_io()),
                None => {
                    return match self.quotes.open_since() {
                        Some(line) => Err(SourceError::UnterminatedQuote { line }.into_io()),
                        None => Ok(0),
                    };
                }
            }
        }

        let remaining = &self.pending[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum QuoteState {
    #[default]
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Tracks whether the input is inside a quoted field.
#[derive(Debug, Default)]
struct QuoteScanner {
    state: QuoteState,
    opened_on: u64,
}

impl QuoteScanner {
    fn scan(&mut self, text: &str, line: u64) {
        for ch in text.chars() {
            self.state = match (self.state, ch) {
                (QuoteState::FieldStart, '"') => {
                    self.opened_on = line;
                    QuoteState::Quoted
                }
                (QuoteState::Quoted, '"') => QuoteState::QuoteInQuoted,
                (QuoteState::Quoted, _) | (QuoteState::QuoteInQuoted, '"') => QuoteState::Quoted,
                (_, ',' | '\n' | '\r') => QuoteState::FieldStart,
                _ => QuoteState::Unquoted,
            };
        }
    }

    /// Line the currently open quote started on.
    fn open_since(&self) -> Option<u64> {
        (self.state == QuoteState::Quoted).then_some(self.opened_on)
    }
}

/// Failures raised inside [`LineSource`], carried through `io::Error`.
#[derive(Debug, thiserror::Error)]
enum SourceError {
    #[error(transparent)]
    Decode(DecodeError),
    #[error("unterminated quote opened on line {line}")]
    UnterminatedQuote { line: u64 },
}

impl SourceError {
    fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }
}

/// Errors raised while parsing records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// No header line
    #[error("input has no header line")]
    EmptyInput,
    /// Header lacks a required column
    #[error("header is missing required column {0}")]
    MissingColumn(&'static str),
    /// Record has a different number of fields than the header
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        /// Line the record starts on
        line: u64,
        /// Header field count
        expected: u64,
        /// Record field count
        found: u64,
    },
    /// Quote still open at end of input
    #[error("unterminated quote opened on line {line}")]
    UnterminatedQuote {
        /// Line the quote opened on
        line: u64,
    },
    /// Any other structural CSV failure
    #[error("malformed CSV: {0}")]
    Malformed(String),
    /// The bytes could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ParseError {
    fn from_csv(err: csv::Error) -> Self {
        let message = err.to_string();

        match err.into_kind() {
            csv::ErrorKind::Io(io_err) => {
                let source = io_err
                    .into_inner()
                    .and_then(|inner| inner.downcast::<SourceError>().ok());
                match source.map(|boxed| *boxed) {
                    Some(SourceError::Decode(err)) => Self::Decode(err),
                    Some(SourceError::UnterminatedQuote { line }) => {
                        Self::UnterminatedQuote { line }
                    }
                    None => Self::Malformed(message),
                }
            }
            csv::ErrorKind::UnequalLengths {
                pos,
                expected_len,
                len,
            } => Self::FieldCount {
                line: pos.map_or(0, |p| p.line()),
                expected: expected_len,
                found: len,
            },
            _ => Self::Malformed(message),
        }
    }
}
