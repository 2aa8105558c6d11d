use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};

use crate::error::DbpfError;
use crate::record::Record;

pub const MAGIC: &[u8; 4] = b"DBPF";
pub const HEADER_SIZE: usize = 96;
/// The only container version this crate reads and writes.
pub const CONTAINER_VERSION: (u32, u32) = (1, 0);

/// Index-record layout, selected by the header's index version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IndexVersion {
    /// 7.0: type, group, instance.
    V7_0,
    /// 7.1: type, group, instance, second instance.
    V7_1,
}

impl IndexVersion {
    pub fn from_parts(major: u32, minor: u32) -> Option<Self> {
        match (major, minor) {
            (7, 0) => Some(Self::V7_0),
            (7, 1) => Some(Self::V7_1),
            _      => None,
        }
    }

    pub fn parts(self) -> (u32, u32) {
        match self {
            Self::V7_0 => (7, 0),
            Self::V7_1 => (7, 1),
        }
    }

    pub fn has_instance2(self) -> bool {
        self == Self::V7_1
    }

    /// Width of one index-table record.
    pub fn index_record_size(self) -> usize {
        if self.has_instance2() { 24 } else { 20 }
    }

    /// Width of one directory-table record.
    pub fn directory_record_size(self) -> usize {
        if self.has_instance2() { 20 } else { 16 }
    }
}

impl fmt::Display for IndexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor) = self.parts();
        write!(f, "{major}.{minor}")
    }
}

impl std::str::FromStr for IndexVersion {
    type Err = DbpfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = parse_version(s)?;
        Self::from_parts(major, minor)
            .ok_or_else(|| DbpfError::UnsupportedVersion { what: "index", version: s.to_owned() })
    }
}

/// The 96-byte file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub magic:               [u8; 4],
    pub version_major:       u32,
    pub version_minor:       u32,
    pub user_version_major:  u32,
    pub user_version_minor:  u32,
    pub flags:               u32,
    pub ctime:               u32,
    pub mtime:               u32,
    pub index_version_major: u32,
    pub index_count:         u32,
    pub index_offset:        u32,
    pub index_size:          u32,
    pub hole_count:          u32,
    pub hole_offset:         u32,
    pub hole_size:           u32,
    pub index_version_minor: u32,
    pub index_offset2:       u32,
    pub unknown:             u32,
    pub reserved:            [u8; 24],
}

impl Header {
    /// A fresh header for an empty container, stamped with the current time.
    pub fn new(index_version: IndexVersion) -> Self {
        let now = unix_now();
        let (major, minor) = index_version.parts();
        Self {
            magic:               *MAGIC,
            version_major:       CONTAINER_VERSION.0,
            version_minor:       CONTAINER_VERSION.1,
            user_version_major:  0,
            user_version_minor:  0,
            flags:               0,
            ctime:               now,
            mtime:               now,
            index_version_major: major,
            index_count:         0,
            index_offset:        0,
            index_size:          0,
            hole_count:          0,
            hole_offset:         0,
            hole_size:           0,
            index_version_minor: minor,
            index_offset2:       0,
            unknown:             0,
            reserved:            [0u8; 24],
        }
    }

    pub fn version(&self) -> String {
        format!("{}.{}", self.version_major, self.version_minor)
    }

    pub fn user_version(&self) -> String {
        format!("{}.{}", self.user_version_major, self.user_version_minor)
    }

    /// The raw `"major.minor"` index version, recognised or not.
    pub fn index_version_str(&self) -> String {
        format!("{}.{}", self.index_version_major, self.index_version_minor)
    }

    /// The index layout, or `None` if the header names an unknown one.
    pub fn index_version(&self) -> Option<IndexVersion> {
        IndexVersion::from_parts(self.index_version_major, self.index_version_minor)
    }

    pub fn set_version(&mut self, version: &str) -> Result<(), DbpfError> {
        (self.version_major, self.version_minor) = parse_version(version)?;
        Ok(())
    }

    pub fn set_user_version(&mut self, version: &str) -> Result<(), DbpfError> {
        (self.user_version_major, self.user_version_minor) = parse_version(version)?;
        Ok(())
    }

    pub fn set_index_version(&mut self, version: IndexVersion) {
        (self.index_version_major, self.index_version_minor) = version.parts();
    }

    pub fn has_valid_magic(&self) -> bool {
        &self.magic == MAGIC
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.ctime), 0)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.mtime), 0)
    }

    pub fn touch(&mut self) {
        self.mtime = unix_now();
    }
}

impl Record for Header {
    type Args = ();
    const NAME: &'static str = "header";

    fn width(_: ()) -> usize { HEADER_SIZE }

    fn read_fields<R: Read>(r: &mut R, _: ()) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        let mut h = Self {
            magic,
            version_major:       r.read_u32::<LittleEndian>()?,
            version_minor:       r.read_u32::<LittleEndian>()?,
            user_version_major:  r.read_u32::<LittleEndian>()?,
            user_version_minor:  r.read_u32::<LittleEndian>()?,
            flags:               r.read_u32::<LittleEndian>()?,
            ctime:               r.read_u32::<LittleEndian>()?,
            mtime:               r.read_u32::<LittleEndian>()?,
            index_version_major: r.read_u32::<LittleEndian>()?,
            index_count:         r.read_u32::<LittleEndian>()?,
            index_offset:        r.read_u32::<LittleEndian>()?,
            index_size:          r.read_u32::<LittleEndian>()?,
            hole_count:          r.read_u32::<LittleEndian>()?,
            hole_offset:         r.read_u32::<LittleEndian>()?,
            hole_size:           r.read_u32::<LittleEndian>()?,
            index_version_minor: r.read_u32::<LittleEndian>()?,
            index_offset2:       r.read_u32::<LittleEndian>()?,
            unknown:             r.read_u32::<LittleEndian>()?,
            reserved:            [0u8; 24],
        };
        r.read_exact(&mut h.reserved)?;
        Ok(h)
    }

    fn write_fields<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.magic)?;
        for field in [
            self.version_major,
            self.version_minor,
            self.user_version_major,
            self.user_version_minor,
            self.flags,
            self.ctime,
            self.mtime,
            self.index_version_major,
            self.index_count,
            self.index_offset,
            self.index_size,
            self.hole_count,
            self.hole_offset,
            self.hole_size,
            self.index_version_minor,
            self.index_offset2,
            self.unknown,
        ] {
            w.write_u32::<LittleEndian>(field)?;
        }
        w.write_all(&self.reserved)
    }
}

fn parse_version(s: &str) -> Result<(u32, u32), DbpfError> {
    let bad = || DbpfError::InvalidVersionString(s.to_owned());
    let (major, minor) = s.split_once('.').ok_or_else(bad)?;
    Ok((major.parse().map_err(|_| bad())?, minor.parse().map_err(|_| bad())?))
}

fn unix_now() -> u32 {
    u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX)
}
