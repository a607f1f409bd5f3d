// Directory enumeration with loop detection and contiguous recovery

use super::walk::{directory_step, is_implausible_directory, ClusterTally, WalkState};
use super::FatVolume;
use crate::diagnostics::Diagnostic;
use crate::fat_common::constants::DIR_ENTRY_SIZE;
use crate::fat_common::{classify_record, DirectoryEntry, LongNameAccumulator, RecordKind};
use log::{debug, trace};
use salvage_core::{SalvageError, SectorDevice};
use std::collections::HashSet;

/// Everything read from one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub entries: Vec<DirectoryEntry>,
    pub clusters_visited: u32,
    /// Part of the directory was read from free clusters, so the result may
    /// be approximate.
    pub has_free_gap: bool,
}

/// A directory listing as presented to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub cluster: u32,
    pub entries: Vec<DirectoryEntry>,
    pub clusters_visited: u32,
    pub has_free_gap: bool,
}

/// Per-directory scan state carried across clusters.
struct Scan {
    names: LongNameAccumulator,
    entries: Vec<DirectoryEntry>,
    good: u32,
    bad: u32,
}

impl<D: SectorDevice> FatVolume<D> {
    /// Reads every entry of the directory starting at `cluster`. Cluster 0
    /// designates the root directory.
    pub fn enumerate(&mut self, cluster: u32) -> Result<Enumeration, SalvageError> {
        let start = if cluster == 0 { self.layout.root_cluster } else { cluster };
        let mut scan = Scan {
            names: LongNameAccumulator::new(),
            entries: Vec::new(),
            good: 0,
            bad: 0,
        };

        if start == 0 && self.layout.has_fixed_root() {
            let (sector, count) = self.layout.root_region();
            debug!("Enumerating fixed root region: {} sectors at {}", count, sector);
            let data = self.read_sectors(sector, count);
            self.scan_records(&data, sector, &mut scan);
            return Ok(Enumeration {
                entries: scan.entries,
                clusters_visited: 1,
                has_free_gap: false,
            });
        }

        if !self.layout.is_valid_cluster(start) {
            self.emit(Diagnostic::ClusterOutOfRange { cluster: start });
            return Ok(Enumeration::default());
        }

        let layout = self.layout.clone();
        let mut validated = layout.is_root(start);
        let mut visited = HashSet::new();
        let mut clusters_visited = 0u32;
        let mut has_free_gap = false;
        let mut state = WalkState::Chained;
        let mut current = start;

        while state.is_running() {
            if !visited.insert(current) {
                self.emit(Diagnostic::DirectoryLoop { cluster: current });
                break;
            }

            let (good_before, bad_before) = (scan.good, scan.bad);
            let first_sector = layout.cluster_sector(current);
            let data = self.read_cluster(current);
            let dot_found = self.scan_records(&data, first_sector, &mut scan);
            if dot_found.contains(&current) {
                validated = true;
            }

            let tally = ClusterTally {
                good: scan.good - good_before,
                bad: scan.bad - bad_before,
            };
            trace!("Directory cluster {}: {} good, {} bad", current, tally.good, tally.bad);

            let mut outcome = directory_step(state, current, tally, &layout, |c| self.next_cluster(c, 0));

            clusters_visited += 1;
            if !outcome.counted {
                clusters_visited -= 1;
            }
            for diagnostic in outcome.step.diagnostics.drain(..) {
                self.emit(diagnostic);
            }
            if outcome.step.state == WalkState::ContiguousRecovery {
                has_free_gap = true;
            }

            if is_implausible_directory(validated, scan.good, scan.bad) {
                self.emit(Diagnostic::NotADirectory {
                    cluster: start,
                    good: scan.good,
                    bad: scan.bad,
                });
                return Err(SalvageError::NotADirectory(format!("cluster {}", start)));
            }

            state = outcome.step.state;
            if let Some(next) = outcome.step.next {
                current = next;
            }
        }

        Ok(Enumeration {
            entries: scan.entries,
            clusters_visited,
            has_free_gap,
        })
    }

    /// Lists the directory starting at `cluster`, hiding erased entries
    /// unless the session shows them.
    pub fn list_cluster(&mut self, cluster: u32) -> Result<Listing, SalvageError> {
        let enumeration = self.enumerate(cluster)?;
        let list_deleted = self.options.list_deleted;

        Ok(Listing {
            cluster,
            entries: enumeration
                .entries
                .into_iter()
                .filter(|entry| list_deleted || !entry.is_erased())
                .collect(),
            clusters_visited: enumeration.clusters_visited,
            has_free_gap: enumeration.has_free_gap,
        })
    }

    pub fn list_directory(&mut self, path: &str) -> Result<Listing, SalvageError> {
        let directory = self.resolve_directory(path)?;
        self.list_cluster(directory.cluster)
    }

    /// Scans raw directory records, returning the clusters named by "."
    /// entries found along the way.
    fn scan_records(&self, data: &[u8], first_sector: u64, scan: &mut Scan) -> Vec<u32> {
        let bytes_per_sector = self.layout.bytes_per_sector as usize;
        let mut dots = Vec::new();

        for (index, record) in data.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
            let position = index * DIR_ENTRY_SIZE;
            let sector = first_sector + (position / bytes_per_sector) as u64;
            let offset = position % bytes_per_sector;

            match classify_record(record) {
                RecordKind::LongNameFragment => scan.names.append(record),
                RecordKind::Unused | RecordKind::VolumeLabel => {
                    scan.names.consume();
                }
                RecordKind::Entry => {
                    let entry = DirectoryEntry::parse(record, scan.names.consume(), sector, offset);
                    if entry.is_plausible(&self.layout) {
                        if entry.is_dot() && entry.is_directory() {
                            dots.push(entry.cluster);
                        }
                        scan.good += 1;
                        scan.entries.push(entry);
                    } else {
                        trace!("Malformed record at sector {} offset {}", sector, offset);
                        scan.bad += 1;
                    }
                }
            }
        }

        dots
    }
}
