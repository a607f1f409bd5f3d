// Volume layout derived once from the boot sector
// Every cluster/sector translation is a pure function of this value

use super::boot_sector::{BootSector, FatWidth};
use super::constants::{DIR_ENTRY_SIZE, FAT32_CLUSTER_MASK, FIRST_DATA_CLUSTER};

/// Where a FAT entry lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatEntryPosition {
    /// First sector holding the entry.
    pub sector: u64,
    /// Byte offset of the entry inside that sector.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    pub width: FatWidth,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub fat_count: u32,
    pub sectors_per_fat: u32,
    pub total_sectors: u64,
    pub root_entries: u32,
    /// Size of the fixed root region (FAT12/16), 0 on FAT32.
    pub root_sectors: u32,
    /// Root directory cluster on FAT32, 0 for the fixed root region.
    pub root_cluster: u32,
    pub fat_start: u64,
    /// First sector after the FAT copies. On FAT12/16 the fixed root region
    /// starts here and cluster 2 follows it.
    pub data_start: u64,
    /// `(fat_size_bytes * 8) / bits`.
    pub total_clusters: u32,
}

impl VolumeLayout {
    pub fn from_boot_sector(boot: &BootSector) -> Self {
        let bytes_per_sector = boot.bytes_per_sector as u32;
        let fat_start = boot.reserved_sectors as u64;
        let data_start = fat_start + boot.fat_count as u64 * boot.sectors_per_fat as u64;

        let root_sectors = match boot.width {
            FatWidth::Fat32 => 0,
            _ => {
                let root_bytes = boot.root_entries as u32 * DIR_ENTRY_SIZE as u32;
                (root_bytes + bytes_per_sector - 1) / bytes_per_sector
            }
        };

        let fat_size_bytes = boot.sectors_per_fat as u64 * bytes_per_sector as u64;
        let total_clusters = ((fat_size_bytes * 8) / boot.width.bits() as u64)
            .min(FAT32_CLUSTER_MASK as u64) as u32;

        Self {
            width: boot.width,
            bytes_per_sector,
            sectors_per_cluster: boot.sectors_per_cluster as u32,
            reserved_sectors: boot.reserved_sectors as u32,
            fat_count: boot.fat_count as u32,
            sectors_per_fat: boot.sectors_per_fat,
            total_sectors: boot.total_sectors as u64,
            root_entries: boot.root_entries as u32,
            root_sectors,
            root_cluster: boot.root_cluster,
            fat_start,
            data_start,
            total_clusters,
        }
    }

    pub fn fat_size_bytes(&self) -> u64 {
        self.sectors_per_fat as u64 * self.bytes_per_sector as u64
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }

    /// Highest valid cluster number.
    pub fn max_cluster(&self) -> u32 {
        self.total_clusters.saturating_add(1)
    }

    pub fn is_valid_cluster(&self, cluster: u32) -> bool {
        cluster >= FIRST_DATA_CLUSTER && cluster <= self.max_cluster()
    }

    pub fn has_fixed_root(&self) -> bool {
        self.width != FatWidth::Fat32
    }

    /// True for the cluster number that designates the root directory
    /// (the root cluster on FAT32, 0 for the fixed region).
    pub fn is_root(&self, cluster: u32) -> bool {
        cluster == self.root_cluster
    }

    /// First sector of a data cluster.
    pub fn cluster_sector(&self, cluster: u32) -> u64 {
        let index = cluster.saturating_sub(FIRST_DATA_CLUSTER) as u64;
        self.data_start + self.root_sectors as u64 + index * self.sectors_per_cluster as u64
    }

    /// Start sector and length of the fixed FAT12/16 root region.
    pub fn root_region(&self) -> (u64, u32) {
        (self.data_start, self.root_sectors)
    }

    /// First sector of the given FAT copy.
    pub fn fat_copy_start(&self, fat_index: u32) -> u64 {
        self.fat_start + fat_index as u64 * self.sectors_per_fat as u64
    }

    /// Locates the FAT entry of `cluster` in FAT copy `fat_index`.
    pub fn fat_entry_position(&self, cluster: u32, fat_index: u32) -> FatEntryPosition {
        let entry_offset = cluster as u64 * self.width.bits() as u64 / 8;
        let absolute = fat_index as u64 * self.fat_size_bytes() + entry_offset;
        FatEntryPosition {
            sector: self.fat_start + absolute / self.bytes_per_sector as u64,
            offset: (absolute % self.bytes_per_sector as u64) as usize,
        }
    }

    pub fn data_size(&self) -> u64 {
        self.total_clusters as u64 * self.bytes_per_cluster() as u64
    }

    pub fn disk_size(&self) -> u64 {
        self.total_sectors * self.bytes_per_sector as u64
    }
}
