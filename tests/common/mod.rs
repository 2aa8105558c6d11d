#![allow(dead_code)]

use dbpf::index::DIRECTORY_TYPE_ID;
use dbpf::{DirectoryEntry, Header, IndexEntry, IndexVersion, Record, ResourceKey};

/// Lay out a DBPF file by hand: header, payloads, directory table, then the
/// index table last, the way many real archives are arranged.
pub fn build(version: IndexVersion, records: &[(ResourceKey, Vec<u8>)], directory: &[DirectoryEntry]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut index = Vec::new();
    let base = 96u32;

    for (key, data) in records {
        index.push(IndexEntry::new(*key, base + body.len() as u32, data.len() as u32));
        body.extend_from_slice(data);
    }
    if !directory.is_empty() {
        let location = base + body.len() as u32;
        for record in directory {
            body.extend_from_slice(&record.to_bytes());
        }
        let size = (directory.len() * version.directory_record_size()) as u32;
        index.push(IndexEntry::new(ResourceKey::directory(version), location, size));
    }

    let mut header = Header::new(version);
    header.index_count = index.len() as u32;
    header.index_offset = base + body.len() as u32;
    header.index_size = (index.len() * version.index_record_size()) as u32;

    let mut out = header.to_bytes();
    out.extend_from_slice(&body);
    for entry in &index {
        out.extend_from_slice(&entry.to_bytes());
    }
    out
}

pub fn key(type_id: u32, group_id: u32, instance_id: u32) -> ResourceKey {
    ResourceKey::new(type_id, group_id, instance_id)
}

pub fn dir(key: ResourceKey, size: usize) -> DirectoryEntry {
    DirectoryEntry { key, size: size as u32 }
}

/// Byte offset of the header's `index_size` field.
pub const INDEX_SIZE_OFFSET: usize = 44;

pub fn patch_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn is_directory(e: &IndexEntry) -> bool {
    e.key.type_id == DIRECTORY_TYPE_ID
}

/// Compressible filler of `len` bytes.
pub fn text(len: usize) -> Vec<u8> {
    b"the quick brown fox jumps over the lazy dog. ".iter().copied().cycle().take(len).collect()
}
