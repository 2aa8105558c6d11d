use std::io;
use thiserror::Error;

use crate::header::IndexVersion;
use crate::index::ResourceKey;
use crate::qfs::QfsError;
use crate::record::RecordError;

#[derive(Error, Debug)]
pub enum DbpfError {
    #[error("Not a DBPF file: magic is {0:02X?}")]
    Format([u8; 4]),
    #[error("Unsupported {what} version: {version}")]
    UnsupportedVersion { what: &'static str, version: String },
    #[error("Malformed version string: {0:?}")]
    InvalidVersionString(String),
    /// A table's declared size disagrees with the bytes its records occupy,
    /// or the file ends inside the table.
    #[error("{table} table is truncated or malformed: expected to end at {expected}, ended at {actual}")]
    Truncated { table: &'static str, expected: u64, actual: u64 },
    #[error("Decompression error: {0}")]
    Decompression(#[from] QfsError),
    #[error("Container is closed")]
    ClosedResource,
    #[error("Entry {0} does not belong to this container")]
    ForeignEntry(ResourceKey),
    #[error("Directory record {0} matches no index entry")]
    UnmatchedDirectoryRecord(ResourceKey),
    #[error("Key {key} cannot be stored in an index version {version} container")]
    KeyShape { key: ResourceKey, version: IndexVersion },
    #[error("Key {0} is reserved for the directory table")]
    ReservedKey(ResourceKey),
    #[error("Container exceeds the 4 GiB addressable by 32-bit offsets")]
    TooLarge,
    #[error("Record error: {0}")]
    Record(RecordError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<RecordError> for DbpfError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Io(e) => DbpfError::Io(e),
            other => DbpfError::Record(other),
        }
    }
}

pub type Result<T, E = DbpfError> = std::result::Result<T, E>;
