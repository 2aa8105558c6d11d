//! Reading DBPF containers.
//!
//! Opening runs header -> index table -> hole table -> directory table.  The
//! directory pass flips `compressed` on every index entry it names; that
//! flag then decides whether [`Container::payload`] routes the stored bytes
//! through the QFS decoder.  A failed open drops the byte source before
//! returning, and never hands back a partial container.
//!
//! ```no_run
//! use dbpf::Container;
//!
//! let mut dbpf = Container::open_path("city.dat")?;
//! for entry in dbpf.entries().to_vec() {
//!     let data = dbpf.payload(&entry)?;
//!     println!("{} {} bytes", entry.key, data.len());
//! }
//! # Ok::<(), dbpf::DbpfError>(())
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::error::{DbpfError, Result};
use crate::header::{Header, IndexVersion, CONTAINER_VERSION, HEADER_SIZE};
use crate::index::{DirectoryEntry, HoleEntry, IndexEntry, Origin, ResourceKey, SourceId};
use crate::qfs;
use crate::record::{Record, RecordError};

// ── Options ──────────────────────────────────────────────────────────────────

/// What to do with a directory record that names no index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectoryMode {
    /// Log and skip it.  Real-world archives contain such records.
    #[default]
    Lenient,
    /// Fail the open with [`DbpfError::UnmatchedDirectoryRecord`].
    Strict,
}

/// Configuration for [`Container::open_with`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Accept files whose magic is not `DBPF`.
    pub ignore_magic: bool,
    pub directory:    DirectoryMode,
}

/// How [`Container::insert`] stores a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Stored,
    /// QFS-compress, falling back to stored when that does not shrink it.
    Qfs,
}

/// Lifecycle of a container.  `open` walks every stage up to `Ready` or
/// fails; callers only ever observe `Ready` and `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unopened,
    HeaderRead,
    IndexRead,
    HolesRead,
    DirectoryResolved,
    Ready,
    Closed,
}

// ── Container ────────────────────────────────────────────────────────────────

pub struct Container<R> {
    id:            SourceId,
    source:        Option<R>,
    header:        Header,
    index_version: IndexVersion,
    entries:       Vec<IndexEntry>,
    directory:     Option<IndexEntry>,
    holes:         Vec<HoleEntry>,
    /// Payloads added through `insert`, already in their stored form.
    staged:        Vec<Vec<u8>>,
    state:         State,
}

impl Container<File> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_path_with(path, &OpenOptions::default())
    }

    pub fn open_path_with<P: AsRef<Path>>(path: P, opts: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening container");
        Self::open_with(File::open(path)?, opts)
    }
}

impl<R: Read + Seek> Container<R> {
    pub fn open(source: R) -> Result<Self> {
        Self::open_with(source, &OpenOptions::default())
    }

    pub fn open_with(mut source: R, opts: &OpenOptions) -> Result<Self> {
        let id = SourceId::next();
        let mut state = State::Unopened;

        let header = read_header(&mut source, opts)?;
        let index_version = header.index_version().ok_or_else(|| DbpfError::UnsupportedVersion {
            what:    "index",
            version: header.index_version_str(),
        })?;
        advance(&mut state, State::HeaderRead);

        let mut indices: Vec<IndexEntry> = read_table(
            &mut source,
            "index",
            header.index_offset,
            header.index_count,
            header.index_size,
            index_version,
        )?;
        for entry in &mut indices {
            entry.origin = Origin::Source(id);
        }
        advance(&mut state, State::IndexRead);

        let holes: Vec<HoleEntry> = read_table(
            &mut source,
            "hole",
            header.hole_offset,
            header.hole_count,
            header.hole_size,
            (),
        )?;
        advance(&mut state, State::HolesRead);

        let (mut entries, directory) = split_directory(indices);
        if let Some(dir) = &directory {
            resolve_directory(&mut source, dir, index_version, &mut entries, opts.directory)?;
        }
        advance(&mut state, State::DirectoryResolved);

        debug!(
            entries = entries.len(),
            compressed = entries.iter().filter(|e| e.compressed).count(),
            holes = holes.len(),
            version = %index_version,
            "container ready"
        );
        advance(&mut state, State::Ready);

        Ok(Self {
            id,
            source: Some(source),
            header,
            index_version,
            entries,
            directory,
            holes,
            staged: Vec::new(),
            state,
        })
    }
}

impl<R> Container<R> {
    /// An empty container with no byte source; everything in it is staged.
    pub fn new(index_version: IndexVersion) -> Self {
        Self {
            id:            SourceId::next(),
            source:        None,
            header:        Header::new(index_version),
            index_version,
            entries:       Vec::new(),
            directory:     None,
            holes:         Vec::new(),
            staged:        Vec::new(),
            state:         State::Ready,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Mutable header access for user version and flags.  Table fields are
    /// recomputed on save.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn index_version(&self) -> IndexVersion {
        self.index_version
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Index entries in table order, without the directory entry.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The index entry locating the directory table, if the file had one.
    pub fn directory_entry(&self) -> Option<&IndexEntry> {
        self.directory.as_ref()
    }

    pub fn holes(&self) -> &[HoleEntry] {
        &self.holes
    }

    pub fn find(&self, key: &ResourceKey) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }

    /// Stage `data` under `key`, replacing the first entry with that key or
    /// appending a new one.
    pub fn insert(&mut self, key: ResourceKey, data: Vec<u8>, compression: Compression) -> Result<&IndexEntry> {
        self.ensure_open()?;
        let key = key
            .for_version(self.index_version)
            .ok_or(DbpfError::KeyShape { key, version: self.index_version })?;
        if key.is_directory() {
            return Err(DbpfError::ReservedKey(key));
        }

        let (compressed, bytes) = match compression {
            Compression::Stored => (false, data),
            Compression::Qfs    => qfs::try_compress(&data),
        };
        let size = u32::try_from(bytes.len()).map_err(|_| DbpfError::TooLarge)?;
        trace!(%key, size, compressed, "staging payload");

        let existing = self.entries.iter().position(|e| e.key == key);
        let reusable = existing.and_then(|idx| match self.entries[idx].origin {
            Origin::Staged(id, slot) if id == self.id && slot < self.staged.len() => Some(slot),
            _ => None,
        });
        let slot = match reusable {
            Some(slot) => {
                self.staged[slot] = bytes;
                slot
            }
            None => {
                self.staged.push(bytes);
                self.staged.len() - 1
            }
        };

        let mut entry = IndexEntry::new(key, 0, size);
        entry.compressed = compressed;
        entry.origin = Origin::Staged(self.id, slot);

        let idx = match existing {
            Some(idx) => {
                self.entries[idx] = entry;
                idx
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        Ok(&self.entries[idx])
    }

    /// Remove the first entry with `key`.
    pub fn remove(&mut self, key: &ResourceKey) -> Option<IndexEntry> {
        let idx = self.entries.iter().position(|e| &e.key == key)?;
        Some(self.entries.remove(idx))
    }

    /// Release the byte source and staged payloads.  Entries handed out
    /// earlier stay valid as values, but reading through them fails with
    /// [`DbpfError::ClosedResource`].
    pub fn close(&mut self) {
        self.source = None;
        self.staged.clear();
        self.state = State::Closed;
        debug!("container closed");
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Closed => Err(DbpfError::ClosedResource),
            _ => Ok(()),
        }
    }
}

impl<R: Read + Seek> Container<R> {
    /// The entry's bytes exactly as stored, compressed or not.
    pub fn read_raw(&mut self, entry: &IndexEntry) -> Result<Vec<u8>> {
        self.ensure_open()?;
        match entry.origin {
            Origin::Source(id) if id == self.id => {
                let source = self.source.as_mut().ok_or(DbpfError::ClosedResource)?;
                source.seek(SeekFrom::Start(u64::from(entry.location)))?;
                // Grow with the bytes actually present rather than trusting `size`.
                let mut buf = Vec::new();
                source.by_ref().take(u64::from(entry.size)).read_to_end(&mut buf)?;
                if buf.len() != entry.size as usize {
                    return Err(DbpfError::Truncated {
                        table:    "payload",
                        expected: u64::from(entry.location) + u64::from(entry.size),
                        actual:   u64::from(entry.location) + buf.len() as u64,
                    });
                }
                Ok(buf)
            }
            Origin::Staged(id, slot) if id == self.id => self
                .staged
                .get(slot)
                .cloned()
                .ok_or(DbpfError::ForeignEntry(entry.key)),
            _ => Err(DbpfError::ForeignEntry(entry.key)),
        }
    }

    /// The entry's payload, decompressed when the directory marked it so.
    pub fn payload(&mut self, entry: &IndexEntry) -> Result<Vec<u8>> {
        let raw = self.read_raw(entry)?;
        if !entry.compressed {
            return Ok(raw);
        }
        let (frame, plain) = qfs::decompress(&raw)?;
        trace!(key = %entry.key, stored = raw.len(), size = frame.uncompressed_size, "decompressed payload");
        Ok(plain)
    }

    /// Hand every entry's payload to `handler`, in table order.
    pub fn visit<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&IndexEntry, Vec<u8>),
    {
        for i in 0..self.entries.len() {
            let entry = self.entries[i].clone();
            let data = self.payload(&entry)?;
            handler(&entry, data);
        }
        Ok(())
    }
}

// ── Open stages ──────────────────────────────────────────────────────────────

fn advance(state: &mut State, next: State) {
    trace!(from = ?*state, to = ?next, "open stage");
    *state = next;
}

fn read_header<R: Read + Seek>(source: &mut R, opts: &OpenOptions) -> Result<Header> {
    source.seek(SeekFrom::Start(0))?;
    let header = Header::parse(source, ()).map_err(|e| truncated(e, "header", HEADER_SIZE as u64, source))?;

    if !opts.ignore_magic && !header.has_valid_magic() {
        return Err(DbpfError::Format(header.magic));
    }
    if (header.version_major, header.version_minor) != CONTAINER_VERSION {
        return Err(DbpfError::UnsupportedVersion { what: "container", version: header.version() });
    }
    Ok(header)
}

/// Read `count` records at `offset` and check they fill exactly `size` bytes.
fn read_table<R, T>(
    source: &mut R,
    table:  &'static str,
    offset: u32,
    count:  u32,
    size:   u32,
    args:   T::Args,
) -> Result<Vec<T>>
where
    R: Read + Seek,
    T: Record,
{
    if count == 0 {
        return Ok(Vec::new());
    }
    let expected = u64::from(offset) + u64::from(size);
    source.seek(SeekFrom::Start(u64::from(offset)))?;

    let mut records = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        records.push(T::parse(source, args).map_err(|e| truncated(e, table, expected, source))?);
    }

    let actual = source.stream_position()?;
    if actual != expected {
        return Err(DbpfError::Truncated { table, expected, actual });
    }
    trace!(table, count, "table read");
    Ok(records)
}

fn truncated<S: Seek>(e: RecordError, table: &'static str, expected: u64, source: &mut S) -> DbpfError {
    match e {
        RecordError::Short { .. } => DbpfError::Truncated {
            table,
            expected,
            actual: source.stream_position().unwrap_or(0),
        },
        other => other.into(),
    }
}

/// Pull the directory entry out of the index list.
fn split_directory(indices: Vec<IndexEntry>) -> (Vec<IndexEntry>, Option<IndexEntry>) {
    let mut directory = None;
    let mut entries = Vec::with_capacity(indices.len());
    for entry in indices {
        if !entry.is_directory() {
            entries.push(entry);
        } else if directory.is_none() {
            directory = Some(entry);
        } else {
            warn!(key = %entry.key, "ignoring additional directory entry");
        }
    }
    (entries, directory)
}

/// Mark every entry named by the directory table as compressed.  Each entry
/// is matched at most once, so duplicate keys are claimed in table order.
fn resolve_directory<R: Read + Seek>(
    source:    &mut R,
    directory: &IndexEntry,
    version:   IndexVersion,
    entries:   &mut [IndexEntry],
    mode:      DirectoryMode,
) -> Result<()> {
    let width = version.directory_record_size();
    let count = directory.size as usize / width;
    if directory.size as usize % width != 0 {
        warn!(size = directory.size, width, "directory size is not a multiple of the record width");
    }
    let expected = u64::from(directory.location) + (count * width) as u64;
    source.seek(SeekFrom::Start(u64::from(directory.location)))?;

    let mut pool: Vec<usize> = (0..entries.len()).collect();
    for _ in 0..count {
        let record = DirectoryEntry::parse(source, version)
            .map_err(|e| truncated(e, "directory", expected, source))?;
        match pool.iter().position(|&i| record.matches(&entries[i])) {
            Some(p) => {
                let i = pool.remove(p);
                entries[i].compressed = true;
            }
            None => match mode {
                DirectoryMode::Lenient => warn!(key = %record.key, "directory record matches no index entry"),
                DirectoryMode::Strict  => return Err(DbpfError::UnmatchedDirectoryRecord(record.key)),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn replacing_a_staged_entry_reuses_its_slot() {
        let mut dbpf: Container<Cursor<Vec<u8>>> = Container::new(IndexVersion::V7_0);
        let key = ResourceKey::new(1, 2, 3);
        for round in 0..5u8 {
            dbpf.insert(key, vec![round; 8], Compression::Stored).unwrap();
        }
        dbpf.insert(ResourceKey::new(1, 2, 4), vec![9; 8], Compression::Stored).unwrap();

        assert_eq!(dbpf.staged.len(), 2);
        let entry = dbpf.entries()[0].clone();
        assert_eq!(dbpf.payload(&entry).unwrap(), vec![4u8; 8]);
    }
}
