// Test helpers for building small FAT images in memory

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::fat_common::constants::*;
use crate::fat_common::{encode_entry, FatWidth};
use byteorder::{ByteOrder, LittleEndian};
use salvage_core::MemoryDevice;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

const SECTOR: usize = 512;

/// Builds a freshly formatted-looking FAT image with 512-byte sectors and
/// one sector per cluster. The image is exactly `total_sectors` long.
pub struct ImageBuilder {
    width: FatWidth,
    fat_count: u8,
    sectors_per_fat: u32,
    fat: BTreeMap<u32, u32>,
    root: Vec<[u8; 32]>,
    clusters: Vec<(u32, Vec<u8>)>,
}

impl ImageBuilder {
    pub const ROOT_ENTRIES: u16 = 16;

    fn new(width: FatWidth, sectors_per_fat: u32) -> Self {
        let mut fat = BTreeMap::new();
        if width == FatWidth::Fat32 {
            fat.insert(FAT32_ROOT_CLUSTER, width.eoc_marker());
        }
        Self {
            width,
            fat_count: 2,
            sectors_per_fat,
            fat,
            root: Vec::new(),
            clusters: Vec::new(),
        }
    }

    /// 341 clusters.
    pub fn fat12() -> Self {
        Self::new(FatWidth::Fat12, 1)
    }

    /// 4096 clusters, enough to be detected as FAT16.
    pub fn fat16() -> Self {
        Self::new(FatWidth::Fat16, 16)
    }

    /// 128 clusters, root directory in cluster 2.
    pub fn fat32() -> Self {
        Self::new(FatWidth::Fat32, 1)
    }

    pub fn fat_count(mut self, count: u8) -> Self {
        self.fat_count = count;
        self
    }

    pub fn sectors_per_fat(mut self, sectors: u32) -> Self {
        self.sectors_per_fat = sectors;
        self
    }

    /// Links the clusters in order and terminates the last one.
    pub fn chain(mut self, clusters: &[u32]) -> Self {
        for pair in clusters.windows(2) {
            self.fat.insert(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.fat.insert(last, self.width.eoc_marker());
        }
        self
    }

    pub fn fat_entry(mut self, cluster: u32, raw: u32) -> Self {
        self.fat.insert(cluster, raw);
        self
    }

    /// Root directory records: the fixed region on FAT12/16, cluster 2 on FAT32.
    pub fn root(mut self, records: &[[u8; 32]]) -> Self {
        if self.width == FatWidth::Fat32 {
            return self.cluster_records(FAT32_ROOT_CLUSTER, records);
        }
        self.root = records.to_vec();
        self
    }

    /// Directory cluster holding `dots` followed by `records`.
    pub fn directory(self, cluster: u32, dots: &[[u8; 32]], records: &[[u8; 32]]) -> Self {
        let all: Vec<[u8; 32]> = dots.iter().chain(records.iter()).copied().collect();
        self.cluster_records(cluster, &all)
    }

    pub fn cluster_records(self, cluster: u32, records: &[[u8; 32]]) -> Self {
        let bytes: Vec<u8> = records.iter().flatten().copied().collect();
        self.cluster_bytes(cluster, &bytes)
    }

    pub fn cluster_bytes(mut self, cluster: u32, bytes: &[u8]) -> Self {
        self.clusters.push((cluster, bytes.to_vec()));
        self
    }

    pub fn build(self) -> MemoryDevice {
        let fixed_root = self.width != FatWidth::Fat32;
        let root_sectors = if fixed_root {
            Self::ROOT_ENTRIES as usize * DIR_ENTRY_SIZE / SECTOR
        } else {
            0
        };
        let table_clusters = self.sectors_per_fat as usize * SECTOR * 8 / self.width.bits() as usize;
        let reserved = 1usize;
        let fat_start = reserved;
        let data_start = fat_start + self.fat_count as usize * self.sectors_per_fat as usize;
        let first_cluster_sector = data_start + root_sectors;
        let total_sectors = first_cluster_sector + table_clusters;

        let mut image = vec![0u8; total_sectors * SECTOR];
        self.write_boot_sector(&mut image[..SECTOR], total_sectors as u32);

        let fat_len = self.sectors_per_fat as usize * SECTOR;
        let mut table = vec![0u8; fat_len];
        let media = self.width.value_mask() & !0x7;
        let mut entries = vec![(0, media | 0x8), (1, self.width.eoc_marker())];
        entries.extend(self.fat.iter().map(|(&c, &v)| (c, v)));
        for (cluster, value) in entries {
            let offset = cluster as usize * self.width.bits() as usize / 8;
            table = encode_entry(&table, offset, cluster, value, self.width).expect("FAT entry outside table");
        }
        for copy in 0..self.fat_count as usize {
            let start = (fat_start + copy * self.sectors_per_fat as usize) * SECTOR;
            image[start..start + fat_len].copy_from_slice(&table);
        }

        let root_start = data_start * SECTOR;
        for (index, record) in self.root.iter().enumerate() {
            let at = root_start + index * DIR_ENTRY_SIZE;
            image[at..at + DIR_ENTRY_SIZE].copy_from_slice(record);
        }

        for (cluster, bytes) in &self.clusters {
            let at = (first_cluster_sector + (*cluster as usize - 2)) * SECTOR;
            image[at..at + bytes.len()].copy_from_slice(bytes);
        }

        MemoryDevice::new(image, SECTOR as u32)
    }

    fn write_boot_sector(&self, buf: &mut [u8], total_sectors: u32) {
        buf[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        buf[BS_OEM_NAME..BS_OEM_NAME + 8].copy_from_slice(b"SALVAGE ");
        LittleEndian::write_u16(&mut buf[BPB_BYTES_PER_SEC..], SECTOR as u16);
        buf[BPB_SEC_PER_CLUS] = 1;
        LittleEndian::write_u16(&mut buf[BPB_RSVD_SEC_CNT..], 1);
        buf[BPB_NUM_FATS] = self.fat_count;
        LittleEndian::write_u32(&mut buf[BPB_TOT_SEC32..], total_sectors);

        match self.width {
            FatWidth::Fat32 => {
                LittleEndian::write_u32(&mut buf[BPB_FAT_SZ32..], self.sectors_per_fat);
                LittleEndian::write_u32(&mut buf[BPB_ROOT_CLUS..], FAT32_ROOT_CLUSTER);
                buf[BS32_VOL_LAB..BS32_VOL_LAB + 11].copy_from_slice(b"TESTVOLUME ");
                buf[BS32_FIL_SYS_TYPE..BS32_FIL_SYS_TYPE + 8].copy_from_slice(b"FAT32   ");
            }
            width => {
                LittleEndian::write_u16(&mut buf[BPB_ROOT_ENT_CNT..], Self::ROOT_ENTRIES);
                LittleEndian::write_u16(&mut buf[BPB_FAT_SZ16..], self.sectors_per_fat as u16);
                buf[BS16_VOL_LAB..BS16_VOL_LAB + 11].copy_from_slice(b"TESTVOLUME ");
                let fs_type: &[u8; 8] = if width == FatWidth::Fat12 { b"FAT12   " } else { b"FAT16   " };
                buf[BS16_FIL_SYS_TYPE..BS16_FIL_SYS_TYPE + 8].copy_from_slice(fs_type);
            }
        }
        buf[510] = 0x55;
        buf[511] = 0xAA;
    }
}

/// Short directory record.
pub fn dir_entry(name: &[u8; 11], attr: u8, cluster: u32, size: u32) -> [u8; 32] {
    crate::fat_common::directory::tests::record(name, attr, cluster, size)
}

/// "." and ".." records of a subdirectory. A `parent` of 0 is the root.
pub fn dot_entries(cluster: u32, parent: u32) -> Vec<[u8; 32]> {
    use crate::fat_common::attributes::ATTR_DIRECTORY;
    vec![
        dir_entry(b".          ", ATTR_DIRECTORY, cluster, 0),
        dir_entry(b"..         ", ATTR_DIRECTORY, parent, 0),
    ]
}

/// Long name fragments for `name`, ready to precede its short record.
pub fn long_name_entries(name: &str) -> Vec<[u8; 32]> {
    crate::fat_common::long_names::tests::fragments_for(name)
}

/// A sink for a session plus a handle to read what it received.
pub fn shared_sink() -> (Box<dyn DiagnosticSink>, Rc<RefCell<Vec<Diagnostic>>>) {
    let events = Rc::new(RefCell::new(Vec::new()));
    (Box::new(events.clone()), events)
}

/// Deterministic file content, distinct per seed.
pub fn pattern(seed: u32, len: usize) -> Vec<u8> {
    (0..len as u32)
        .map(|i| (i.wrapping_mul(31).wrapping_add(seed.wrapping_mul(101)) as u8) ^ 0x5A)
        .collect()
}
