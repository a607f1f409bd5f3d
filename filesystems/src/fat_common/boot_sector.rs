// Boot sector decoding for FAT12/FAT16/FAT32
// Reads the BPB fields by offset and flags implausible values

use super::constants::*;
use byteorder::{ByteOrder, LittleEndian};
use salvage_core::SalvageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a FAT table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatWidth {
    Fat12,
    Fat16,
    Fat32,
}

impl FatWidth {
    pub fn bits(self) -> u32 {
        match self {
            FatWidth::Fat12 => 12,
            FatWidth::Fat16 => 16,
            FatWidth::Fat32 => 32,
        }
    }

    /// Raw values at or above this collapse to end-of-chain.
    pub fn eoc_threshold(self) -> u32 {
        match self {
            FatWidth::Fat12 => FAT12_EOC_THRESHOLD,
            FatWidth::Fat16 => FAT16_EOC_THRESHOLD,
            FatWidth::Fat32 => FAT32_EOC_THRESHOLD,
        }
    }

    /// Value written to disk to terminate a chain.
    pub fn eoc_marker(self) -> u32 {
        match self {
            FatWidth::Fat12 => FAT12_EOC,
            FatWidth::Fat16 => FAT16_EOC,
            FatWidth::Fat32 => FAT32_EOC,
        }
    }

    /// Largest value an entry can hold.
    pub fn value_mask(self) -> u32 {
        match self {
            FatWidth::Fat12 => 0xFFF,
            FatWidth::Fat16 => 0xFFFF,
            FatWidth::Fat32 => FAT32_CLUSTER_MASK,
        }
    }

    /// FAT12 entries may straddle a sector boundary, so two sectors are
    /// always read around them.
    pub fn sectors_per_access(self) -> u32 {
        match self {
            FatWidth::Fat12 => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for FatWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FAT{}", self.bits())
    }
}

/// A boot-sector value that is legal to decode but unusual enough that the
/// volume should not be trusted blindly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderAnomaly {
    UnusualSectorSize(u16),
    SectorSizeMismatch { header: u16, device: u32 },
    SectorsPerClusterHigh(u8),
    FatCopies(u8),
    RootCluster(u32),
}

impl fmt::Display for HeaderAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderAnomaly::UnusualSectorSize(size) => {
                write!(f, "Bytes per sector is not 256, 512 or 1024 ({})", size)
            }
            HeaderAnomaly::SectorSizeMismatch { header, device } => {
                write!(f, "Bytes per sector mismatch (header {}, device {})", header, device)
            }
            HeaderAnomaly::SectorsPerClusterHigh(spc) => {
                write!(f, "Sectors per cluster high ({})", spc)
            }
            HeaderAnomaly::FatCopies(count) => write!(f, "FAT copy count is not 2 ({})", count),
            HeaderAnomaly::RootCluster(cluster) => {
                write!(f, "Root directory cluster is not 2 ({})", cluster)
            }
        }
    }
}

/// Decoded boot sector fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    pub oem_name: String,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    /// Fixed root directory capacity (FAT12/16 only, 0 on FAT32).
    pub root_entries: u16,
    pub sectors_per_fat: u32,
    pub total_sectors: u32,
    /// Root directory cluster (FAT32 only, 0 on FAT12/16).
    pub root_cluster: u32,
    pub volume_label: String,
    pub fs_type: String,
    pub width: FatWidth,
}

fn field_string(buf: &[u8], offset: usize, len: usize) -> String {
    String::from_utf8_lossy(&buf[offset..offset + len])
        .trim_end_matches(&[' ', '\0'][..])
        .to_string()
}

impl BootSector {
    pub fn parse(buf: &[u8]) -> Result<Self, SalvageError> {
        if buf.len() < BOOT_SECTOR_MIN_LEN {
            return Err(SalvageError::InvalidBootSector(format!(
                "boot sector is {} bytes, need at least {}",
                buf.len(),
                BOOT_SECTOR_MIN_LEN
            )));
        }

        let bytes_per_sector = LittleEndian::read_u16(&buf[BPB_BYTES_PER_SEC..]);
        let sectors_per_cluster = buf[BPB_SEC_PER_CLUS];
        if bytes_per_sector == 0 || sectors_per_cluster == 0 {
            return Err(SalvageError::InvalidBootSector(format!(
                "bytes per sector {} / sectors per cluster {}",
                bytes_per_sector, sectors_per_cluster
            )));
        }

        let reserved_sectors = LittleEndian::read_u16(&buf[BPB_RSVD_SEC_CNT..]);
        let fat_count = buf[BPB_NUM_FATS];
        let oem_name = field_string(buf, BS_OEM_NAME, BS_OEM_NAME_LEN);

        let total_sectors = match LittleEndian::read_u16(&buf[BPB_TOT_SEC16..]) {
            0 => LittleEndian::read_u32(&buf[BPB_TOT_SEC32..]),
            small => small as u32,
        };

        let sectors_per_fat_16 = LittleEndian::read_u16(&buf[BPB_FAT_SZ16..]);

        if sectors_per_fat_16 != 0 {
            let fs_type = field_string(buf, BS16_FIL_SYS_TYPE, FS_TYPE_LEN);
            let clusters = total_sectors as u64 / sectors_per_cluster as u64;
            let width = if fs_type == "FAT12" || clusters < FAT12_CLUSTER_LIMIT {
                FatWidth::Fat12
            } else {
                FatWidth::Fat16
            };

            Ok(Self {
                oem_name,
                bytes_per_sector,
                sectors_per_cluster,
                reserved_sectors,
                fat_count,
                root_entries: LittleEndian::read_u16(&buf[BPB_ROOT_ENT_CNT..]),
                sectors_per_fat: sectors_per_fat_16 as u32,
                total_sectors,
                root_cluster: 0,
                volume_label: field_string(buf, BS16_VOL_LAB, VOLUME_LABEL_LEN),
                fs_type,
                width,
            })
        } else {
            Ok(Self {
                oem_name,
                bytes_per_sector,
                sectors_per_cluster,
                reserved_sectors,
                fat_count,
                root_entries: 0,
                sectors_per_fat: LittleEndian::read_u32(&buf[BPB_FAT_SZ32..]),
                total_sectors,
                root_cluster: LittleEndian::read_u32(&buf[BPB_ROOT_CLUS..]),
                volume_label: field_string(buf, BS32_VOL_LAB, VOLUME_LABEL_LEN),
                fs_type: field_string(buf, BS32_FIL_SYS_TYPE, FS_TYPE_LEN),
                width: FatWidth::Fat32,
            })
        }
    }

    /// Plausibility checks against the header itself and the device geometry.
    pub fn anomalies(&self, device_sector_size: u32) -> Vec<HeaderAnomaly> {
        let mut anomalies = Vec::new();

        if !PLAUSIBLE_SECTOR_SIZES.contains(&self.bytes_per_sector) {
            anomalies.push(HeaderAnomaly::UnusualSectorSize(self.bytes_per_sector));
        }
        if self.bytes_per_sector as u32 != device_sector_size {
            anomalies.push(HeaderAnomaly::SectorSizeMismatch {
                header: self.bytes_per_sector,
                device: device_sector_size,
            });
        }
        if self.sectors_per_cluster > MAX_SECTORS_PER_CLUSTER {
            anomalies.push(HeaderAnomaly::SectorsPerClusterHigh(self.sectors_per_cluster));
        }
        if self.fat_count != EXPECTED_FAT_COPIES {
            anomalies.push(HeaderAnomaly::FatCopies(self.fat_count));
        }
        if self.width == FatWidth::Fat32 && self.root_cluster != FAT32_ROOT_CLUSTER {
            anomalies.push(HeaderAnomaly::RootCluster(self.root_cluster));
        }

        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat32_sector() -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        buf[BS_OEM_NAME..BS_OEM_NAME + 8].copy_from_slice(b"MSWIN4.1");
        LittleEndian::write_u16(&mut buf[BPB_BYTES_PER_SEC..], 512);
        buf[BPB_SEC_PER_CLUS] = 4;
        LittleEndian::write_u16(&mut buf[BPB_RSVD_SEC_CNT..], 32);
        buf[BPB_NUM_FATS] = 2;
        LittleEndian::write_u32(&mut buf[BPB_TOT_SEC32..], 600_000);
        LittleEndian::write_u32(&mut buf[BPB_FAT_SZ32..], 1000);
        LittleEndian::write_u32(&mut buf[BPB_ROOT_CLUS..], 2);
        buf[BS32_VOL_LAB..BS32_VOL_LAB + 11].copy_from_slice(b"RESCUE     ");
        buf[BS32_FIL_SYS_TYPE..BS32_FIL_SYS_TYPE + 8].copy_from_slice(b"FAT32   ");
        buf
    }

    #[test]
    fn test_parse_fat32() {
        let boot = BootSector::parse(&fat32_sector()).unwrap();
        assert_eq!(boot.width, FatWidth::Fat32);
        assert_eq!(boot.sectors_per_fat, 1000);
        assert_eq!(boot.root_cluster, 2);
        assert_eq!(boot.total_sectors, 600_000);
        assert_eq!(boot.oem_name, "MSWIN4.1");
        assert_eq!(boot.volume_label, "RESCUE");
        assert_eq!(boot.fs_type, "FAT32");
        assert!(boot.anomalies(512).is_empty());
    }

    #[test]
    fn test_fat12_detected_by_cluster_count() {
        let mut buf = vec![0u8; 512];
        LittleEndian::write_u16(&mut buf[BPB_BYTES_PER_SEC..], 512);
        buf[BPB_SEC_PER_CLUS] = 1;
        LittleEndian::write_u16(&mut buf[BPB_RSVD_SEC_CNT..], 1);
        buf[BPB_NUM_FATS] = 2;
        LittleEndian::write_u16(&mut buf[BPB_ROOT_ENT_CNT..], 224);
        LittleEndian::write_u16(&mut buf[BPB_TOT_SEC16..], 2880);
        LittleEndian::write_u16(&mut buf[BPB_FAT_SZ16..], 9);
        buf[BS16_FIL_SYS_TYPE..BS16_FIL_SYS_TYPE + 8].copy_from_slice(b"FAT16   ");

        let boot = BootSector::parse(&buf).unwrap();
        assert_eq!(boot.width, FatWidth::Fat12);
        assert_eq!(boot.root_entries, 224);
        assert_eq!(boot.root_cluster, 0);
    }

    #[test]
    fn test_fat16_with_large_cluster_count() {
        let mut buf = vec![0u8; 512];
        LittleEndian::write_u16(&mut buf[BPB_BYTES_PER_SEC..], 512);
        buf[BPB_SEC_PER_CLUS] = 4;
        buf[BPB_NUM_FATS] = 2;
        LittleEndian::write_u32(&mut buf[BPB_TOT_SEC32..], 204_800);
        LittleEndian::write_u16(&mut buf[BPB_FAT_SZ16..], 200);

        let boot = BootSector::parse(&buf).unwrap();
        assert_eq!(boot.width, FatWidth::Fat16);
        assert_eq!(boot.total_sectors, 204_800);
    }

    #[test]
    fn test_anomalies_accumulate() {
        let mut buf = fat32_sector();
        LittleEndian::write_u16(&mut buf[BPB_BYTES_PER_SEC..], 4096);
        buf[BPB_NUM_FATS] = 1;
        LittleEndian::write_u32(&mut buf[BPB_ROOT_CLUS..], 7);

        let boot = BootSector::parse(&buf).unwrap();
        let anomalies = boot.anomalies(512);
        assert_eq!(
            anomalies,
            vec![
                HeaderAnomaly::UnusualSectorSize(4096),
                HeaderAnomaly::SectorSizeMismatch { header: 4096, device: 512 },
                HeaderAnomaly::FatCopies(1),
                HeaderAnomaly::RootCluster(7),
            ]
        );
    }

    #[test]
    fn test_zero_sector_size_is_rejected() {
        let mut buf = fat32_sector();
        LittleEndian::write_u16(&mut buf[BPB_BYTES_PER_SEC..], 0);
        assert!(matches!(
            BootSector::parse(&buf),
            Err(SalvageError::InvalidBootSector(_))
        ));
    }
}
