//! Writing DBPF containers.
//!
//! # Layout
//! ```text
//! header (96 B)
//! index table    one record per entry, plus the directory entry if any
//!                payload is compressed
//! payloads       in index order
//! directory      one record per compressed payload
//! ```
//! Every offset is computed at write time; nothing is carried over from the
//! file the container was read from, and the hole table is always empty.
//! Magic and container version are always written as `DBPF` 1.0.
//!
//! All payloads are gathered before the first byte is written, so a payload
//! that cannot be read aborts the save without touching the destination.
//! [`Container::save`] additionally writes through a temporary file in the
//! destination directory and renames it into place.

use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::container::Container;
use crate::error::{DbpfError, Result};
use crate::header::{CONTAINER_VERSION, HEADER_SIZE, MAGIC};
use crate::index::{DirectoryEntry, IndexEntry, ResourceKey};
use crate::perf;
use crate::qfs::FrameHeader;
use crate::record::Record;

/// What happens to each payload's stored form on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionPolicy {
    /// Keep every payload as it is stored now.
    #[default]
    Preserve,
    /// QFS-compress every uncompressed payload where that makes it smaller.
    CompressAll,
    /// Store every payload uncompressed.
    DecompressAll,
}

/// Configuration for [`Container::save`] and [`Container::write_to`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub compression: CompressionPolicy,
}

/// What a save produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveSummary {
    pub entries:    usize,
    pub compressed: usize,
    pub bytes:      u64,
}

/// One payload in its final stored form.
struct Prepared {
    key:               ResourceKey,
    compressed:        bool,
    bytes:             Vec<u8>,
    uncompressed_size: u32,
}

impl<R: Read + Seek> Container<R> {
    /// Write the container to `path`, replacing it atomically.
    pub fn save<P: AsRef<Path>>(&mut self, path: P, opts: &SaveOptions) -> Result<SaveSummary> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        let summary = {
            let mut out = BufWriter::new(tmp.as_file_mut());
            let summary = self.write_to(&mut out, opts)?;
            out.flush()?;
            summary
        };
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| DbpfError::Io(e.error))?;
        debug!(path = %path.display(), entries = summary.entries, bytes = summary.bytes, "container saved");
        Ok(summary)
    }

    /// Serialize the container to `out`.
    pub fn write_to<W: Write>(&mut self, out: &mut W, opts: &SaveOptions) -> Result<SaveSummary> {
        let prepared = self.prepare(opts.compression)?;
        let version = self.index_version();

        let compressed: Vec<DirectoryEntry> = prepared
            .iter()
            .filter(|p| p.compressed)
            .map(|p| DirectoryEntry { key: p.key, size: p.uncompressed_size })
            .collect();
        let has_directory = !compressed.is_empty();

        let index_count = prepared.len() + usize::from(has_directory);
        let index_size = index_count * version.index_record_size();
        let mut cursor = (HEADER_SIZE + index_size) as u64;

        let mut index = Vec::with_capacity(index_count);
        for p in &prepared {
            let location = to_u32(cursor)?;
            let size = to_u32(p.bytes.len() as u64)?;
            index.push(IndexEntry::new(p.key, location, size));
            cursor += p.bytes.len() as u64;
        }
        if has_directory {
            let size = compressed.len() * version.directory_record_size();
            index.push(IndexEntry::new(ResourceKey::directory(version), to_u32(cursor)?, to_u32(size as u64)?));
            cursor += size as u64;
        }
        to_u32(cursor)?;

        let mut header = self.header().clone();
        header.magic = *MAGIC;
        (header.version_major, header.version_minor) = CONTAINER_VERSION;
        header.set_index_version(version);
        header.index_count   = index_count as u32;
        header.index_offset  = HEADER_SIZE as u32;
        header.index_size    = index_size as u32;
        header.index_offset2 = 0;
        header.hole_count    = 0;
        header.hole_offset   = 0;
        header.hole_size     = 0;
        header.touch();
        debug!(
            entries = prepared.len(),
            compressed = compressed.len(),
            index_size,
            total = cursor,
            "writing container"
        );

        header.write_fields(out)?;
        for entry in &index {
            entry.write_fields(out)?;
        }
        for p in &prepared {
            out.write_all(&p.bytes)?;
        }
        for record in &compressed {
            record.write_fields(out)?;
        }

        Ok(SaveSummary { entries: prepared.len(), compressed: compressed.len(), bytes: cursor })
    }

    /// Read every entry's stored bytes and bring them into the form `policy`
    /// asks for.
    fn prepare(&mut self, policy: CompressionPolicy) -> Result<Vec<Prepared>> {
        let entries = self.entries().to_vec();
        let mut prepared = Vec::with_capacity(entries.len());
        for entry in &entries {
            let bytes = self.read_raw(entry)?;
            let uncompressed_size = if entry.compressed {
                FrameHeader::read_from(&bytes)?.uncompressed_size
            } else {
                to_u32(bytes.len() as u64)?
            };
            prepared.push(Prepared { key: entry.key, compressed: entry.compressed, bytes, uncompressed_size });
        }

        match policy {
            CompressionPolicy::Preserve => {}
            CompressionPolicy::CompressAll => {
                let targets: Vec<usize> = (0..prepared.len()).filter(|&i| !prepared[i].compressed).collect();
                let inputs: Vec<&[u8]> = targets.iter().map(|&i| prepared[i].bytes.as_slice()).collect();
                let results = perf::compress_payloads(&inputs);
                for (&i, (compressed, bytes)) in targets.iter().zip(results) {
                    if compressed {
                        prepared[i].compressed = true;
                        prepared[i].bytes = bytes;
                    }
                }
            }
            CompressionPolicy::DecompressAll => {
                let targets: Vec<usize> = (0..prepared.len()).filter(|&i| prepared[i].compressed).collect();
                let inputs: Vec<&[u8]> = targets.iter().map(|&i| prepared[i].bytes.as_slice()).collect();
                let results = perf::decompress_payloads(&inputs)?;
                for (&i, plain) in targets.iter().zip(results) {
                    prepared[i].compressed = false;
                    prepared[i].bytes = plain;
                }
            }
        }
        Ok(prepared)
    }
}

fn to_u32(v: u64) -> Result<u32> {
    u32::try_from(v).map_err(|_| DbpfError::TooLarge)
}
