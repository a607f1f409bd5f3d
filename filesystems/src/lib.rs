// FAT12/16/32 reading, writing and recovery
pub mod diagnostics;
pub mod fat;
pub mod fat_common;

#[cfg(test)]
pub mod test_helpers;

pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink};
pub use fat::{Enumeration, FatVolume, FreeSpace, Listing, ScrubPattern, VolumeInfo, VolumeOptions};
pub use fat_common::{DirectoryEntry, FatTimestamp, FatWidth};
