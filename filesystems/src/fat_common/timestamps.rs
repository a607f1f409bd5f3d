// Timestamp handling for FAT directory records
// FAT uses the MS-DOS packed date/time format

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// Packed DOS date/time pair as stored in a directory record.
/// date: bits 15-9 year since 1980, bits 8-5 month, bits 4-0 day
/// time: bits 15-11 hours, bits 10-5 minutes, bits 4-0 seconds/2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FatTimestamp {
    pub date: u16,
    pub time: u16,
}

impl FatTimestamp {
    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    pub fn year(&self) -> i32 {
        ((self.date >> 9) & 0x7F) as i32 + 1980
    }

    pub fn month(&self) -> u32 {
        ((self.date >> 5) & 0x0F) as u32
    }

    pub fn day(&self) -> u32 {
        (self.date & 0x1F) as u32
    }

    pub fn hour(&self) -> u32 {
        ((self.time >> 11) & 0x1F) as u32
    }

    pub fn minute(&self) -> u32 {
        ((self.time >> 5) & 0x3F) as u32
    }

    pub fn second(&self) -> u32 {
        ((self.time & 0x1F) * 2) as u32
    }

    /// `None` when the packed fields do not form a real calendar date.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year(), self.month(), self.day())?
            .and_hms_opt(self.hour(), self.minute(), self.second())
    }
}

impl fmt::Display for FatTimestamp {
    // Damaged records carry arbitrary bits, so the raw fields are shown
    // rather than rejected.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}
