//! Index, hole and directory table records.
//!
//! Index and directory records change shape with the header's index version:
//! 7.1 adds a second instance id.  Both carry that field as
//! `ResourceKey::instance2_id`, which is `Some` exactly when the owning
//! container uses 7.1.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::header::IndexVersion;
use crate::record::Record;

/// Type id of the index entry that locates the directory table.
pub const DIRECTORY_TYPE_ID: u32 = 0xE86B_1EEF;
pub const DIRECTORY_GROUP_ID: u32 = 0xE86B_1EEF;
pub const DIRECTORY_INSTANCE_ID: u32 = 0x286B_1F03;

// ── ResourceKey ──────────────────────────────────────────────────────────────

/// Identifying fields shared by index and directory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceKey {
    pub type_id:      u32,
    pub group_id:     u32,
    pub instance_id:  u32,
    pub instance2_id: Option<u32>,
}

impl ResourceKey {
    pub fn new(type_id: u32, group_id: u32, instance_id: u32) -> Self {
        Self { type_id, group_id, instance_id, instance2_id: None }
    }

    pub fn with_instance2(mut self, instance2_id: u32) -> Self {
        self.instance2_id = Some(instance2_id);
        self
    }

    /// The fixed key of the directory-table entry.
    pub fn directory(version: IndexVersion) -> Self {
        let key = Self::new(DIRECTORY_TYPE_ID, DIRECTORY_GROUP_ID, DIRECTORY_INSTANCE_ID);
        if version.has_instance2() { key.with_instance2(DIRECTORY_INSTANCE_ID) } else { key }
    }

    pub fn is_directory(&self) -> bool {
        self.type_id == DIRECTORY_TYPE_ID
    }

    /// Reshape for `version`: 7.1 fills a missing second instance with 0;
    /// 7.0 drops a zero second instance.  `None` if a non-zero second
    /// instance cannot be represented.
    pub fn for_version(self, version: IndexVersion) -> Option<Self> {
        match (version.has_instance2(), self.instance2_id) {
            (true, None)                => Some(self.with_instance2(0)),
            (true, Some(_))             => Some(self),
            (false, None | Some(0))     => Some(Self { instance2_id: None, ..self }),
            (false, Some(_))            => None,
        }
    }

    fn read<R: Read>(r: &mut R, version: IndexVersion) -> io::Result<Self> {
        let key = Self::new(
            r.read_u32::<LittleEndian>()?,
            r.read_u32::<LittleEndian>()?,
            r.read_u32::<LittleEndian>()?,
        );
        Ok(if version.has_instance2() { key.with_instance2(r.read_u32::<LittleEndian>()?) } else { key })
    }

    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.type_id)?;
        w.write_u32::<LittleEndian>(self.group_id)?;
        w.write_u32::<LittleEndian>(self.instance_id)?;
        if let Some(i2) = self.instance2_id {
            w.write_u32::<LittleEndian>(i2)?;
        }
        Ok(())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}-{:08X}-{:08X}", self.type_id, self.group_id, self.instance_id)?;
        if let Some(i2) = self.instance2_id {
            write!(f, "-{i2:08X}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError(pub String);

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected TYPE-GROUP-INSTANCE[-INSTANCE2] in hex, got {:?}", self.0)
    }
}

impl std::error::Error for ParseKeyError {}

impl FromStr for ResourceKey {
    type Err = ParseKeyError;

    /// Parses the `Display` form; extra `.ext` suffixes are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseKeyError(s.to_owned());
        let stem = s.split('.').next().unwrap_or(s);
        let ids = stem
            .split('-')
            .map(|part| u32::from_str_radix(part, 16))
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| bad())?;
        match ids[..] {
            [t, g, i]     => Ok(Self::new(t, g, i)),
            [t, g, i, i2] => Ok(Self::new(t, g, i).with_instance2(i2)),
            _             => Err(bad()),
        }
    }
}

// ── Source handles ───────────────────────────────────────────────────────────

/// Identifies the container an entry was read from or staged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where an entry's stored bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Origin {
    /// Not attached to any container.
    #[default]
    Detached,
    /// `location`/`size` within the container's byte source.
    Source(SourceId),
    /// Slot in the container's staging table.
    Staged(SourceId, usize),
}

impl Origin {
    pub fn source_id(self) -> Option<SourceId> {
        match self {
            Origin::Detached => None,
            Origin::Source(id) | Origin::Staged(id, _) => Some(id),
        }
    }
}

// ── IndexEntry ───────────────────────────────────────────────────────────────

/// One record in the index table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub key:        ResourceKey,
    pub location:   u32,
    pub size:       u32,
    /// Learned from the directory table; never stored in the index record.
    pub compressed: bool,
    #[serde(skip)]
    pub(crate) origin: Origin,
}

impl IndexEntry {
    pub fn new(key: ResourceKey, location: u32, size: u32) -> Self {
        Self { key, location, size, compressed: false, origin: Origin::Detached }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_directory(&self) -> bool {
        self.key.is_directory()
    }
}

impl Record for IndexEntry {
    type Args = IndexVersion;
    const NAME: &'static str = "index";

    fn width(version: IndexVersion) -> usize {
        version.index_record_size()
    }

    fn read_fields<R: Read>(r: &mut R, version: IndexVersion) -> io::Result<Self> {
        let key = ResourceKey::read(r, version)?;
        let location = r.read_u32::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        Ok(Self::new(key, location, size))
    }

    fn write_fields<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.key.write(w)?;
        w.write_u32::<LittleEndian>(self.location)?;
        w.write_u32::<LittleEndian>(self.size)
    }
}

// ── HoleEntry ────────────────────────────────────────────────────────────────

/// An unused byte range.  Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HoleEntry {
    pub location: u32,
    pub size:     u32,
}

impl Record for HoleEntry {
    type Args = ();
    const NAME: &'static str = "hole";

    fn width(_: ()) -> usize { 8 }

    fn read_fields<R: Read>(r: &mut R, _: ()) -> io::Result<Self> {
        Ok(Self {
            location: r.read_u32::<LittleEndian>()?,
            size:     r.read_u32::<LittleEndian>()?,
        })
    }

    fn write_fields<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.location)?;
        w.write_u32::<LittleEndian>(self.size)
    }
}

// ── DirectoryEntry ───────────────────────────────────────────────────────────

/// One record of the directory table: marks the index entry with the same
/// key as compressed and carries its uncompressed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub key:  ResourceKey,
    pub size: u32,
}

impl DirectoryEntry {
    /// Matches on every identifying field; sizes are not compared.
    pub fn matches(&self, entry: &IndexEntry) -> bool {
        self.key == entry.key
    }
}

impl Record for DirectoryEntry {
    type Args = IndexVersion;
    const NAME: &'static str = "directory";

    fn width(version: IndexVersion) -> usize {
        version.directory_record_size()
    }

    fn read_fields<R: Read>(r: &mut R, version: IndexVersion) -> io::Result<Self> {
        Ok(Self {
            key:  ResourceKey::read(r, version)?,
            size: r.read_u32::<LittleEndian>()?,
        })
    }

    fn write_fields<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.key.write(w)?;
        w.write_u32::<LittleEndian>(self.size)
    }
}
