// Long filename (VFAT) reconstruction
// Fragments are stored last-part-first ahead of the short entry they decorate

use super::constants::DIR_ENTRY_SIZE;
use byteorder::{ByteOrder, LittleEndian};

/// Maximum filename length for FAT LFN.
pub const MAX_FAT_LFN_LENGTH: usize = 255;

/// Offsets of the UTF-16 code units inside a fragment record: 5 + 6 + 2.
const NAME_RANGES: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];

/// Code units carried by one fragment.
pub const CHARS_PER_FRAGMENT: usize = 13;

/// Stateful reducer assembling long-name fragments into one display name.
#[derive(Debug, Default)]
pub struct LongNameAccumulator {
    fragments: Vec<Vec<u16>>,
}

impl LongNameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers the name characters of one fragment record.
    pub fn append(&mut self, record: &[u8]) {
        if record.len() < DIR_ENTRY_SIZE {
            return;
        }

        let mut units = Vec::with_capacity(CHARS_PER_FRAGMENT);
        for &(start, count) in NAME_RANGES.iter() {
            for i in 0..count {
                let at = start + i * 2;
                units.push(LittleEndian::read_u16(&record[at..at + 2]));
            }
        }
        self.fragments.push(units);
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Joins the pending fragments in reverse arrival order, strips the
    /// terminator and padding, and resets the buffer. Yields an empty string
    /// when nothing was pending.
    pub fn consume(&mut self) -> String {
        let mut units: Vec<u16> = Vec::new();
        for fragment in self.fragments.drain(..).rev() {
            units.extend(fragment);
        }

        // 0x0000 terminates the name, 0xFFFF pads the last fragment
        if let Some(end) = units.iter().position(|&u| u == 0x0000) {
            units.truncate(end);
        }
        units.retain(|&u| u != 0xFFFF);
        units.truncate(MAX_FAT_LFN_LENGTH);

        String::from_utf16_lossy(&units)
    }
}
