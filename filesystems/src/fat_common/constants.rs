// FAT filesystem constants shared between FAT12, FAT16 and FAT32

// Boot sector offsets (common BPB)
pub const BS_OEM_NAME: usize = 0x03;
pub const BS_OEM_NAME_LEN: usize = 8;
pub const BPB_BYTES_PER_SEC: usize = 0x0B;
pub const BPB_SEC_PER_CLUS: usize = 0x0D;
pub const BPB_RSVD_SEC_CNT: usize = 0x0E;
pub const BPB_NUM_FATS: usize = 0x10;
pub const BPB_ROOT_ENT_CNT: usize = 0x11;
pub const BPB_TOT_SEC16: usize = 0x13;
pub const BPB_FAT_SZ16: usize = 0x16;
pub const BPB_TOT_SEC32: usize = 0x20;

// FAT12/16 extended BPB
pub const BS16_VOL_LAB: usize = 0x2B;
pub const BS16_FIL_SYS_TYPE: usize = 0x36;

// FAT32 extended BPB
pub const BPB_FAT_SZ32: usize = 0x24;
pub const BPB_ROOT_CLUS: usize = 0x2C;
pub const BS32_VOL_LAB: usize = 0x47;
pub const BS32_FIL_SYS_TYPE: usize = 0x52;

pub const VOLUME_LABEL_LEN: usize = 11;
pub const FS_TYPE_LEN: usize = 8;

/// Smallest buffer that holds every boot-sector field we decode.
pub const BOOT_SECTOR_MIN_LEN: usize = BS32_FIL_SYS_TYPE + FS_TYPE_LEN;

// FAT entry thresholds: decoded values at or above collapse to end-of-chain
pub const FAT12_EOC_THRESHOLD: u32 = 0xFF0;
pub const FAT16_EOC_THRESHOLD: u32 = 0xFFF0;
pub const FAT32_EOC_THRESHOLD: u32 = 0x0FFF_FFF0;

// Canonical end-of-chain values written back to disk
pub const FAT12_EOC: u32 = 0xFFF;
pub const FAT16_EOC: u32 = 0xFFFF;
pub const FAT32_EOC: u32 = 0x0FFF_FFFF;

/// The top 4 bits of a FAT32 entry are flags, not part of the cluster number.
pub const FAT32_CLUSTER_MASK: u32 = 0x0FFF_FFFF;

/// Below this many clusters a FAT12/16-family volume is FAT12.
pub const FAT12_CLUSTER_LIMIT: u64 = 0xFF4;

pub const FIRST_DATA_CLUSTER: u32 = 2;
pub const FAT32_ROOT_CLUSTER: u32 = 2;
pub const EXPECTED_FAT_COPIES: u8 = 2;
pub const MAX_SECTORS_PER_CLUSTER: u8 = 128;
pub const PLAUSIBLE_SECTOR_SIZES: [u16; 3] = [256, 512, 1024];

// Directory records
pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_NAME_LEN: usize = 11;
pub const DIR_ATTRIBUTES: usize = 0x0B;
pub const DIR_CREATION_TIME: usize = 0x0E;
pub const DIR_CREATION_DATE: usize = 0x10;
pub const DIR_CLUSTER_HIGH: usize = 0x14;
pub const DIR_CHANGE_TIME: usize = 0x16;
pub const DIR_CHANGE_DATE: usize = 0x18;
pub const DIR_CLUSTER_LOW: usize = 0x1A;
pub const DIR_FILE_SIZE: usize = 0x1C;

/// First name byte of a never-used record.
pub const DIR_ENTRY_UNUSED: u8 = 0x00;
/// First name byte of an erased record.
pub const DIR_ENTRY_ERASED: u8 = 0xE5;
/// A first name byte of 0x05 stands for a real 0xE5 character.
pub const DIR_ENTRY_KANJI_E5: u8 = 0x05;
