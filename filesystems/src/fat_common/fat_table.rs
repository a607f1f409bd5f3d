// Cluster chain codec for FAT12, FAT16 and FAT32 table entries
// Pure functions over sector buffers; the session handles device I/O

use super::boot_sector::FatWidth;
use super::constants::FAT32_CLUSTER_MASK;
use byteorder::{ByteOrder, LittleEndian};

/// Decoded meaning of a FAT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterRef {
    /// Value 0: the cluster is unallocated.
    Free,
    /// The chain continues at this cluster.
    Next(u32),
    /// Any value at or above the width-specific threshold.
    EndOfChain,
}

impl ClusterRef {
    pub fn classify(raw: u32, width: FatWidth) -> Self {
        if raw == 0 {
            ClusterRef::Free
        } else if raw >= width.eoc_threshold() {
            ClusterRef::EndOfChain
        } else {
            ClusterRef::Next(raw)
        }
    }

    /// Value stored on disk for this reference.
    pub fn to_raw(self, width: FatWidth) -> u32 {
        match self {
            ClusterRef::Free => 0,
            ClusterRef::Next(cluster) => cluster & width.value_mask(),
            ClusterRef::EndOfChain => width.eoc_marker(),
        }
    }

    pub fn is_free(self) -> bool {
        self == ClusterRef::Free
    }
}

fn is_high_nibble(cluster: u32) -> bool {
    // 12-bit entries of odd clusters start halfway through a byte
    cluster & 1 == 1
}

fn entry_len(width: FatWidth) -> usize {
    match width {
        FatWidth::Fat12 | FatWidth::Fat16 => 2,
        FatWidth::Fat32 => 4,
    }
}

/// Extracts the raw entry value of `cluster` found at `offset` in `buf`.
/// Returns `None` when the buffer does not hold the whole entry.
pub fn decode_entry(buf: &[u8], offset: usize, cluster: u32, width: FatWidth) -> Option<u32> {
    let bytes = buf.get(offset..offset + entry_len(width))?;

    let raw = match width {
        FatWidth::Fat12 => {
            let pair = LittleEndian::read_u16(bytes) as u32;
            if is_high_nibble(cluster) {
                pair >> 4
            } else {
                pair & 0x0FFF
            }
        }
        FatWidth::Fat16 => LittleEndian::read_u16(bytes) as u32,
        FatWidth::Fat32 => LittleEndian::read_u32(bytes) & FAT32_CLUSTER_MASK,
    };

    Some(raw)
}

/// Returns a copy of `buf` with the entry of `cluster` at `offset` set to
/// `value`. Neighbouring FAT12 nibbles and FAT32 flag bits are preserved.
/// Returns `None` when the buffer does not hold the whole entry.
pub fn encode_entry(
    buf: &[u8],
    offset: usize,
    cluster: u32,
    value: u32,
    width: FatWidth,
) -> Option<Vec<u8>> {
    let len = entry_len(width);
    if offset + len > buf.len() {
        return None;
    }

    let mut out = buf.to_vec();
    let bytes = &mut out[offset..offset + len];

    match width {
        FatWidth::Fat12 => {
            let value = value & 0x0FFF;
            if is_high_nibble(cluster) {
                bytes[0] = (((value & 0x0F) << 4) as u8) | (bytes[0] & 0x0F);
                bytes[1] = ((value >> 4) & 0xFF) as u8;
            } else {
                bytes[0] = (value & 0xFF) as u8;
                bytes[1] = (bytes[1] & 0xF0) | ((value >> 8) & 0x0F) as u8;
            }
        }
        FatWidth::Fat16 => LittleEndian::write_u16(bytes, value as u16),
        FatWidth::Fat32 => {
            let existing = LittleEndian::read_u32(bytes);
            let merged = (existing & !FAT32_CLUSTER_MASK) | (value & FAT32_CLUSTER_MASK);
            LittleEndian::write_u32(bytes, merged);
        }
    }

    Some(out)
}
