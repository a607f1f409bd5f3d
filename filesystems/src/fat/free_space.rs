// Free space accounting and scrubbing of unallocated clusters

use super::FatVolume;
use crate::diagnostics::Diagnostic;
use log::{debug, info};
use rand::Rng;
use salvage_core::{SalvageError, SectorDevice};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpace {
    pub free_clusters: u32,
    pub total_clusters: u32,
    pub bytes_per_cluster: u32,
}

impl FreeSpace {
    pub fn free_bytes(&self) -> u64 {
        self.free_clusters as u64 * self.bytes_per_cluster as u64
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_clusters.saturating_sub(self.free_clusters) as u64 * self.bytes_per_cluster as u64
    }
}

/// Content written over unallocated clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrubPattern {
    Zero,
    Random,
}

impl<D: SectorDevice> FatVolume<D> {
    /// Counts the free clusters of FAT copy 0. The result is kept until the
    /// next FAT update.
    pub fn compute_free_space(&mut self) -> FreeSpace {
        if let Some(free_space) = self.free_space {
            return free_space;
        }

        debug!("Computing free space over {} clusters", self.layout.total_clusters);
        let mut free_clusters = 0u32;
        for cluster in 2..=self.layout.max_cluster() {
            if self.is_free(cluster) {
                free_clusters += 1;
            }
        }

        let free_space = FreeSpace {
            free_clusters,
            total_clusters: self.layout.total_clusters,
            bytes_per_cluster: self.layout.bytes_per_cluster(),
        };
        self.free_space = Some(free_space);
        free_space
    }

    /// Overwrites every free cluster with `pattern`. Allocated clusters are
    /// never touched. Returns the number of clusters written.
    pub fn scrub_unallocated(&mut self, pattern: ScrubPattern) -> Result<u64, SalvageError> {
        if !self.options.write_enabled {
            return Err(SalvageError::WriteDisabled);
        }

        let sectors_per_cluster = self.layout.sectors_per_cluster;
        let mut buffer = vec![0u8; self.layout.bytes_per_cluster() as usize];
        let mut rng = rand::thread_rng();
        let mut scrubbed = 0u64;

        for cluster in 2..=self.layout.max_cluster() {
            if !self.is_free(cluster) {
                continue;
            }

            let sector = self.layout.cluster_sector(cluster);
            if sector + sectors_per_cluster as u64 > self.layout.total_sectors {
                continue;
            }

            if pattern == ScrubPattern::Random {
                rng.fill(&mut buffer[..]);
            }

            match self.write_sectors(sector, &buffer, sectors_per_cluster) {
                Ok(_) => scrubbed += 1,
                Err(e) => self.emit(Diagnostic::WriteFailed { lba: sector, reason: e.to_string() }),
            }
        }

        info!("Scrambled {} clusters", scrubbed);
        Ok(scrubbed)
    }
}
