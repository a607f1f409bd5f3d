// Common FAT building blocks shared by FAT12, FAT16 and FAT32
// Pure decoding over byte buffers; no device access happens here

pub mod constants;
pub mod boot_sector;
pub mod layout;
pub mod fat_table;
pub mod long_names;
pub mod directory;
pub mod timestamps;

pub use boot_sector::{BootSector, FatWidth, HeaderAnomaly};
pub use directory::{attributes, classify_record, short_name_display, DirectoryEntry, RecordKind};
pub use fat_table::{decode_entry, encode_entry, ClusterRef};
pub use layout::{FatEntryPosition, VolumeLayout};
pub use long_names::LongNameAccumulator;
pub use timestamps::FatTimestamp;
