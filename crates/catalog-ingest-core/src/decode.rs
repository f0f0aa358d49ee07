//! Byte stream to text lines.
//!
//! The decoder is a single forward pass over the input: it yields one
//! decoded line per item, in source order, with the line terminator kept
//! so quoted fields spanning lines survive intact. It cannot be rewound.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;

const UTF8_BOM: &str = "\u{feff}";

/// Declared text encoding of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8
    #[default]
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value
    Latin1,
}

impl FromStr for TextEncoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Self::Latin1),
            _ => Err(UnknownEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8 => f.write_str("utf-8"),
            Self::Latin1 => f.write_str("iso-8859-1"),
        }
    }
}

/// An encoding name that is not supported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported text encoding: {0}")]
pub struct UnknownEncoding(pub String);

/// Lazy line decoder over a byte stream.
pub struct Decoder<R> {
    reader: BufReader<R>,
    encoding: TextEncoding,
    line: u64,
    buf: Vec<u8>,
    done: bool,
}

impl<R: Read> Decoder<R> {
    /// Create a decoder for `reader` in the declared `encoding`.
    pub fn new(reader: R, encoding: TextEncoding) -> Self {
        Self {
            reader: BufReader::new(reader),
            encoding,
            line: 0,
            buf: Vec::new(),
            done: false,
        }
    }

    fn decode_line(&self) -> Result<String, DecodeError> {
        match self.encoding {
            TextEncoding::Utf8 => match std::str::from_utf8(&self.buf) {
                Ok(text) => {
                    let text = if self.line == 1 {
                        text.strip_prefix(UTF8_BOM).unwrap_or(text)
                    } else {
                        text
                    };
                    Ok(text.to_string())
                }
                Err(err) => Err(DecodeError::InvalidBytes {
                    encoding: self.encoding,
                    line: self.line,
                    offset: err.valid_up_to(),
                }),
            },
            TextEncoding::Latin1 => Ok(self.buf.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl<R: Read> Iterator for Decoder<R> {
    type Item = Result<String, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.line += 1;
                let decoded = self.decode_line();
                if decoded.is_err() {
                    self.done = true;
                }
                Some(decoded)
            }
            Err(err) => {
                self.done = true;
                Some(Err(DecodeError::Io {
                    line: self.line + 1,
                    message: err.to_string(),
                }))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for Decoder<R> {}

/// Errors raised while decoding the byte stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Bytes are not valid in the declared encoding
    #[error("line {line}: invalid {encoding} byte sequence at offset {offset}")]
    InvalidBytes {
        /// Declared encoding
        encoding: TextEncoding,
        /// 1-based line number
        line: u64,
        /// Byte offset of the first invalid byte within the line
        offset: usize,
    },
    /// The underlying reader failed
    #[error("line {line}: read failed: {message}")]
    Io {
        /// 1-based line number being read
        line: u64,
        /// Reader error text
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], encoding: TextEncoding) -> Vec<Result<String, DecodeError>> {
        Decoder::new(bytes, encoding).collect()
    }

    #[test]
    fn yields_lines_in_order_with_terminators() {
        let lines = decode(b"a,b\r\nc,d\ne,f", TextEncoding::Utf8);

        assert_eq!(
            lines,
            vec![
                Ok("a,b\r\n".to_string()),
                Ok("c,d\n".to_string()),
                Ok("e,f".to_string()),
            ]
        );
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(decode(b"", TextEncoding::Utf8).is_empty());
    }

    #[test]
    fn strips_bom_on_first_line_only() {
        let lines = decode("\u{feff}x\n\u{feff}y\n".as_bytes(), TextEncoding::Utf8);

        assert_eq!(lines[0], Ok("x\n".to_string()));
        assert_eq!(lines[1], Ok("\u{feff}y\n".to_string()));
    }

    #[test]
    fn invalid_utf8_stops_the_stream() {
        let mut decoder = Decoder::new(&b"ok\nbad \xff here\nnever\n"[..], TextEncoding::Utf8);

        assert_eq!(decoder.next(), Some(Ok("ok\n".to_string())));
        assert_eq!(
            decoder.next(),
            Some(Err(DecodeError::InvalidBytes {
                encoding: TextEncoding::Utf8,
                line: 2,
                offset: 4,
            }))
        );
        assert_eq!(decoder.next(), None);
    }

    #[test]
    fn latin1_maps_every_byte() {
        let lines = decode(b"caf\xe9\n", TextEncoding::Latin1);
        assert_eq!(lines, vec![Ok("café\n".to_string())]);
    }

    #[test]
    fn multibyte_utf8_survives() {
        let lines = decode("Müller GmbH,Ø\n".as_bytes(), TextEncoding::Utf8);
        assert_eq!(lines, vec![Ok("Müller GmbH,Ø\n".to_string())]);
    }

    #[test]
    fn encoding_names() {
        assert_eq!("UTF-8".parse::<TextEncoding>(), Ok(TextEncoding::Utf8));
        assert_eq!("iso-8859-1".parse::<TextEncoding>(), Ok(TextEncoding::Latin1));
        assert_eq!(
            "utf-16".parse::<TextEncoding>(),
            Err(UnknownEncoding("utf-16".to_string()))
        );
        assert_eq!(TextEncoding::default().to_string(), "utf-8");
    }
}
