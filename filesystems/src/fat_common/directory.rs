// Directory record handling for FAT12/16/32
// Classifies raw 32-byte records and decodes short entries

use super::constants::*;
use super::layout::VolumeLayout;
use super::timestamps::FatTimestamp;
use byteorder::{ByteOrder, LittleEndian};

/// Directory entry attributes common to all FAT variants
pub mod attributes {
    pub const ATTR_READ_ONLY: u8 = 0x01;
    pub const ATTR_HIDDEN: u8 = 0x02;
    pub const ATTR_SYSTEM: u8 = 0x04;
    pub const ATTR_VOLUME_ID: u8 = 0x08;
    pub const ATTR_DIRECTORY: u8 = 0x10;
    pub const ATTR_ARCHIVE: u8 = 0x20;
    pub const ATTR_LONG_NAME: u8 = 0x0F;
}

use attributes::*;

/// What a 32-byte directory record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Part of a long filename, consumed by the accumulator.
    LongNameFragment,
    /// Never-used slot (first byte 0x00).
    Unused,
    VolumeLabel,
    /// A short entry, live or erased.
    Entry,
}

pub fn classify_record(record: &[u8]) -> RecordKind {
    let attr = record[DIR_ATTRIBUTES];
    if attr == ATTR_LONG_NAME {
        RecordKind::LongNameFragment
    } else if record[0] == DIR_ENTRY_UNUSED {
        RecordKind::Unused
    } else if attr & !ATTR_ARCHIVE == ATTR_VOLUME_ID {
        RecordKind::VolumeLabel
    } else {
        RecordKind::Entry
    }
}

/// Renders an 8.3 name: base and extension joined by '.', padding removed.
/// A leading 0x05 stands for 0xE5 and an erased marker shows as '?'.
pub fn short_name_display(name: &[u8; DIR_NAME_LEN]) -> String {
    let decode = |bytes: &[u8], first: bool| -> String {
        let mut out = String::new();
        for (i, &byte) in bytes.iter().enumerate() {
            let c = match byte {
                DIR_ENTRY_ERASED if first && i == 0 => '?',
                DIR_ENTRY_KANJI_E5 if first && i == 0 => char::from(DIR_ENTRY_ERASED),
                b => char::from(b),
            };
            out.push(c);
        }
        out.trim_end_matches(&[' ', '\0'][..]).to_string()
    };

    let base = decode(&name[0..8], true);
    let ext = decode(&name[8..11], false);
    if ext.is_empty() {
        base
    } else {
        format!("{}.{}", base, ext)
    }
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

/// A decoded short directory entry with its reconstructed long name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub short_name: [u8; DIR_NAME_LEN],
    /// Empty when no long-name fragments preceded the record.
    pub long_name: String,
    pub attributes: u8,
    pub cluster: u32,
    pub size: u32,
    pub created: FatTimestamp,
    pub modified: FatTimestamp,
    /// Location of the record itself.
    pub sector: u64,
    pub offset: usize,
}

impl DirectoryEntry {
    /// Decodes a record classified as [`RecordKind::Entry`].
    pub fn parse(record: &[u8], long_name: String, sector: u64, offset: usize) -> Self {
        let mut short_name = [0u8; DIR_NAME_LEN];
        short_name.copy_from_slice(&record[0..DIR_NAME_LEN]);

        let high = LittleEndian::read_u16(&record[DIR_CLUSTER_HIGH..]) as u32;
        let low = LittleEndian::read_u16(&record[DIR_CLUSTER_LOW..]) as u32;

        Self {
            short_name,
            long_name,
            attributes: record[DIR_ATTRIBUTES],
            cluster: (high << 16) | low,
            size: LittleEndian::read_u32(&record[DIR_FILE_SIZE..]),
            created: FatTimestamp::new(
                LittleEndian::read_u16(&record[DIR_CREATION_DATE..]),
                LittleEndian::read_u16(&record[DIR_CREATION_TIME..]),
            ),
            modified: FatTimestamp::new(
                LittleEndian::read_u16(&record[DIR_CHANGE_DATE..]),
                LittleEndian::read_u16(&record[DIR_CHANGE_TIME..]),
            ),
            sector,
            offset,
        }
    }

    /// Synthetic entry standing for the root directory.
    pub fn root(cluster: u32) -> Self {
        Self {
            short_name: [b' '; DIR_NAME_LEN],
            long_name: "/".to_string(),
            attributes: ATTR_DIRECTORY,
            cluster,
            size: 0,
            created: FatTimestamp::default(),
            modified: FatTimestamp::default(),
            sector: 0,
            offset: 0,
        }
    }

    pub fn short_display(&self) -> String {
        short_name_display(&self.short_name)
    }

    /// Display name: the long name when present, the 8.3 name otherwise.
    pub fn name(&self) -> String {
        if self.long_name.is_empty() {
            self.short_display()
        } else {
            self.long_name.clone()
        }
    }

    /// Case-insensitive match against the long or the short name.
    pub fn matches(&self, name: &str) -> bool {
        (!self.long_name.is_empty() && self.long_name.eq_ignore_ascii_case(name))
            || self.short_display().eq_ignore_ascii_case(name)
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes & ATTR_HIDDEN != 0
    }

    pub fn is_erased(&self) -> bool {
        self.short_name[0] == DIR_ENTRY_ERASED
    }

    /// The "." self-reference of a subdirectory.
    pub fn is_dot(&self) -> bool {
        self.short_name == *b".          "
    }

    pub fn is_dot_dot(&self) -> bool {
        self.short_name == *b"..         "
    }

    /// Whether the record looks like a genuine directory entry rather than
    /// arbitrary data read from a cluster.
    pub fn is_plausible(&self, layout: &VolumeLayout) -> bool {
        let attr = self.attributes;
        if attr != 0 && attr & (ATTR_DIRECTORY | ATTR_ARCHIVE) == 0 {
            return false;
        }
        if self.is_directory() && self.cluster == 0 && !self.is_dot_dot() {
            return false;
        }
        if self.cluster != 0 && !layout.is_valid_cluster(self.cluster) {
            return false;
        }
        self.short_name[1..].iter().any(|&b| is_printable(b))
    }
}
