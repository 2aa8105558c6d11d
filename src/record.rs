//! Fixed-layout binary records.
//!
//! Every on-disk structure in a DBPF file (header, index entry, hole,
//! directory entry, QFS frame header) is a fixed-width run of little-endian
//! fields.  [`Record`] captures that shape once: an implementor declares its
//! width and how to read/write its fields in order, and gets a checked
//! `parse` and a `to_bytes` for free.
//!
//! `parse` reads the full width into a scratch buffer *before* decoding any
//! field, so a short source fails with [`RecordError::Short`] and callers
//! never see a half-populated value.

use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("{record} record needs {width} bytes but the source ran out")]
    Short { record: &'static str, width: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A fixed-width binary record.
///
/// `Args` carries whatever selects the record's shape (the index version for
/// index and directory records, `()` for the rest).
pub trait Record: Sized {
    type Args: Copy;

    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Encoded width in bytes for the given shape.
    fn width(args: Self::Args) -> usize;

    /// Decode fields in declaration order.  `reader` always holds exactly
    /// `width(args)` bytes.
    fn read_fields<R: Read>(reader: &mut R, args: Self::Args) -> io::Result<Self>;

    /// Encode fields in declaration order.
    fn write_fields<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    /// Read one record from `source`, consuming exactly `width(args)` bytes.
    fn parse<R: Read>(source: &mut R, args: Self::Args) -> Result<Self, RecordError> {
        let width = Self::width(args);
        let mut buf = vec![0u8; width];
        source.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => RecordError::Short { record: Self::NAME, width },
            _ => RecordError::Io(e),
        })?;
        Ok(Self::read_fields(&mut Cursor::new(buf), args)?)
    }

    /// Decode a record from the front of `bytes`.
    fn from_bytes(bytes: &[u8], args: Self::Args) -> Result<Self, RecordError> {
        Self::parse(&mut Cursor::new(bytes), args)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_fields(&mut out);
        out
    }
}
