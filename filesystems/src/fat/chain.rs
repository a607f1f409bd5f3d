// Device-backed cluster chain codec and the optional FAT cache

use super::FatVolume;
use crate::fat_common::{decode_entry, encode_entry, ClusterRef};
use log::{debug, info};
use salvage_core::{SalvageError, SectorDevice};

impl<D: SectorDevice> FatVolume<D> {
    /// Decodes the FAT entry of `cluster` in FAT copy `fat_index`.
    ///
    /// Clusters outside the valid range, and numbers whose entry would lie
    /// past the end of the table, have nothing following them.
    pub fn next_cluster(&mut self, cluster: u32, fat_index: u32) -> ClusterRef {
        if !self.layout.is_valid_cluster(cluster) || !self.has_table_entry(cluster) {
            return ClusterRef::EndOfChain;
        }

        if fat_index == 0 {
            if let Some(&entry) = self.cache.as_ref().and_then(|cache| cache.get(cluster as usize)) {
                return entry;
            }
        }

        self.read_entry(cluster, fat_index)
    }

    /// Whether `cluster` is unallocated in the primary FAT.
    pub fn is_free(&mut self, cluster: u32) -> bool {
        self.next_cluster(cluster, 0).is_free()
    }

    /// Stores the raw `value` as the FAT entry of `cluster` in FAT copy
    /// `fat_index`. Only the sector(s) holding the entry are rewritten.
    pub fn write_next_cluster(&mut self, cluster: u32, value: u32, fat_index: u32) -> Result<(), SalvageError> {
        if !self.options.write_enabled {
            return Err(SalvageError::WriteDisabled);
        }
        if !self.layout.is_valid_cluster(cluster) || !self.has_table_entry(cluster) {
            return Err(SalvageError::ClusterOutOfBounds {
                cluster,
                max: self.layout.max_cluster(),
            });
        }

        let width = self.layout.width;
        let count = width.sectors_per_access();
        let position = self.layout.fat_entry_position(cluster, fat_index);

        // a failed read must not turn into a zeroed FAT sector on disk
        let sectors = self.read_volume_sectors(position.sector, count)?;
        let updated = encode_entry(&sectors, position.offset, cluster, value, width).ok_or_else(|| {
            SalvageError::Other(format!("FAT entry of cluster {} does not fit the sector buffer", cluster))
        })?;

        self.write_sectors(position.sector, &updated, count)?;
        debug!("FAT{} entry {} set to {:#x}", fat_index + 1, cluster, value);

        if fat_index == 0 {
            if let Some(slot) = self.cache.as_mut().and_then(|cache| cache.get_mut(cluster as usize)) {
                *slot = ClusterRef::classify(value & width.value_mask(), width);
            }
            self.free_space = None;
        }

        Ok(())
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Decodes FAT copy 0 once so that chain lookups no longer touch the device.
    pub fn enable_cache(&mut self) {
        if self.cache.is_some() {
            return;
        }

        info!("Computing FAT cache...");
        let width = self.layout.width;
        let len = self.cached_entries();
        let mut cache = Vec::with_capacity(len);
        let mut loaded: Option<(u64, Vec<u8>)> = None;

        for cluster in 0..len as u32 {
            if !self.layout.is_valid_cluster(cluster) {
                cache.push(ClusterRef::EndOfChain);
                continue;
            }

            let position = self.layout.fat_entry_position(cluster, 0);
            if loaded.as_ref().map(|(sector, _)| *sector) != Some(position.sector) {
                let sectors = self.read_sectors(position.sector, width.sectors_per_access());
                loaded = Some((position.sector, sectors));
            }

            let entry = loaded
                .as_ref()
                .and_then(|(_, sectors)| decode_entry(sectors, position.offset, cluster, width))
                .map(|raw| ClusterRef::classify(raw, width))
                .unwrap_or(ClusterRef::EndOfChain);
            cache.push(entry);
        }

        debug!("FAT cache holds {} entries", cache.len());
        self.cache = Some(cache);
    }

    /// Entries worth caching: every cluster, unless the table as declared
    /// runs past the end of the device. Lookups beyond it go to the device.
    fn cached_entries(&self) -> usize {
        let geometry = self.device.geometry();
        let device_bytes = geometry.total_sectors.saturating_mul(geometry.bytes_per_sector as u64);
        let fat_offset = self.layout.fat_start.saturating_mul(self.layout.bytes_per_sector as u64);
        let table_bytes = self.layout.fat_size_bytes().min(device_bytes.saturating_sub(fat_offset));
        let entries = table_bytes * 8 / self.layout.width.bits() as u64;

        entries.min(self.layout.max_cluster() as u64 + 1) as usize
    }

    fn has_table_entry(&self, cluster: u32) -> bool {
        let width = self.layout.width;
        let end = (cluster as u64 * width.bits() as u64) / 8 + if width.bits() == 32 { 4 } else { 2 };
        end <= self.layout.fat_size_bytes()
    }

    fn read_entry(&mut self, cluster: u32, fat_index: u32) -> ClusterRef {
        let width = self.layout.width;
        let position = self.layout.fat_entry_position(cluster, fat_index);
        let sectors = self.read_sectors(position.sector, width.sectors_per_access());

        decode_entry(&sectors, position.offset, cluster, width)
            .map(|raw| ClusterRef::classify(raw, width))
            .unwrap_or(ClusterRef::EndOfChain)
    }
}
