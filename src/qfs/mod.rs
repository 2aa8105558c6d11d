//! QFS: the LZ77-style codec used for individual DBPF records.
//!
//! # Frame
//! ```text
//! offset  size  field
//! 0       4     compressed_size   u32 LE, counts the whole frame
//! 4       2     magic             u16 LE, always 0xFB10
//! 6       3     uncompressed_size 24-bit, most significant byte first
//! 9       ..    opcode stream
//! ```
//!
//! # Opcodes
//! Each opcode may emit a short literal run followed by a back-reference
//! copy.  The class is chosen by the opcode's high bits:
//!
//! | opcode      | follow | literals             | copy length            | copy offset                         |
//! |-------------|--------|----------------------|------------------------|-------------------------------------|
//! | `0x00-0x7F` | 1      | `op & 3`             | `((op>>2)&7)+3`        | `((op&0x60)<<3)+b0+1`               |
//! | `0x80-0xBF` | 2      | `b0>>6`              | `(op&0x3F)+4`          | `((b0&0x3F)<<8)+b1+1`               |
//! | `0xC0-0xDF` | 3      | `op & 3`             | `((op&0x0C)<<6)+b2+5`  | `((op&0x10)<<12)+(b0<<8)+b1+1`      |
//! | `0xE0-0xFB` | 0      | `((op&0x1F)<<2)+4`   | -                      | -                                   |
//! | `0xFC-0xFF` | 0      | `op & 3`             | -                      | -                                   |
//!
//! Both directions are pure functions over byte slices and hold no shared
//! state, so they may run concurrently on independent buffers.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::record::{Record, RecordError};

mod compress;
mod decompress;

pub use compress::{compress, compress_body, try_compress};
pub use decompress::{decompress, decompress_body};

pub const QFS_MAGIC: u16 = 0xFB10;
pub const FRAME_HEADER_SIZE: usize = 9;
/// Largest payload the 24-bit size field can describe.
pub const MAX_UNCOMPRESSED_SIZE: usize = 0xFF_FFFF;

pub const MIN_MATCH: usize = 5;
pub const MAX_MATCH: usize = 1028;
pub const WINDOW: usize = 1200;

#[derive(Error, Debug)]
pub enum QfsError {
    #[error("Invalid QFS magic 0x{0:04X} (expected 0xFB10)")]
    InvalidMagic(u16),
    #[error("Invalid QFS frame header: {0}")]
    InvalidHeader(String),
    #[error("QFS stream ended after {produced} of {expected} bytes")]
    TruncatedStream { produced: usize, expected: usize },
    #[error("Back-reference {offset} bytes back with only {available} bytes decoded")]
    InvalidBackReference { offset: usize, available: usize },
    /// A match the compressor chose fits no copy opcode.  Cannot happen with
    /// the built-in length and window limits.
    #[error("No copy opcode encodes length {length} at offset {offset}")]
    EncodingRange { length: usize, offset: usize },
    #[error("{0} bytes exceeds the 16 MiB QFS frame limit")]
    InputTooLarge(usize),
}

impl From<RecordError> for QfsError {
    fn from(e: RecordError) -> Self {
        QfsError::InvalidHeader(e.to_string())
    }
}

/// The 9-byte header in front of every compressed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub compressed_size:   u32,
    pub magic:             u16,
    pub uncompressed_size: u32,
}

impl FrameHeader {
    pub fn new(body_len: usize, uncompressed_size: usize) -> Self {
        Self {
            compressed_size:   (body_len + FRAME_HEADER_SIZE) as u32,
            magic:             QFS_MAGIC,
            uncompressed_size: (uncompressed_size & MAX_UNCOMPRESSED_SIZE) as u32,
        }
    }

    /// Parse and validate the header at the front of `data`.
    pub fn read_from(data: &[u8]) -> Result<Self, QfsError> {
        let header = Self::from_bytes(data, ())?;
        if header.magic != QFS_MAGIC {
            return Err(QfsError::InvalidMagic(header.magic));
        }
        if (header.compressed_size as usize) < FRAME_HEADER_SIZE {
            return Err(QfsError::InvalidHeader(format!(
                "compressed size {} is smaller than the header",
                header.compressed_size
            )));
        }
        Ok(header)
    }

    pub fn body_len(&self) -> usize {
        (self.compressed_size as usize).saturating_sub(FRAME_HEADER_SIZE)
    }
}

impl Record for FrameHeader {
    type Args = ();
    const NAME: &'static str = "QFS frame";

    fn width(_: ()) -> usize { FRAME_HEADER_SIZE }

    fn read_fields<R: Read>(r: &mut R, _: ()) -> io::Result<Self> {
        let compressed_size = r.read_u32::<LittleEndian>()?;
        let magic = r.read_u16::<LittleEndian>()?;
        let mut size = [0u8; 3];
        r.read_exact(&mut size)?;
        Ok(Self {
            compressed_size,
            magic,
            uncompressed_size: u32::from(size[0]) << 16 | u32::from(size[1]) << 8 | u32::from(size[2]),
        })
    }

    fn write_fields<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u16::<LittleEndian>(self.magic)?;
        let s = self.uncompressed_size;
        w.write_all(&[(s >> 16) as u8, (s >> 8) as u8, s as u8])
    }
}
