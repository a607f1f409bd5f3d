// File streaming with recovery for broken and deleted chains

use super::walk::{stream_step, WalkState};
use super::FatVolume;
use crate::diagnostics::Diagnostic;
use log::{debug, info};
use salvage_core::{SalvageError, SectorDevice};
use std::collections::HashSet;
use std::io::Write;

impl<D: SectorDevice> FatVolume<D> {
    /// Writes the data of the chain starting at `cluster` to `sink`, whole
    /// clusters at a time, up to `size` bytes (`None` reads until the chain
    /// ends). Returns the number of bytes written.
    ///
    /// In deleted mode the FAT chain is ignored and the file is assumed to
    /// occupy the following free clusters.
    pub fn stream_file<W: Write + ?Sized>(
        &mut self,
        cluster: u32,
        size: Option<u64>,
        sink: &mut W,
        deleted: bool,
    ) -> Result<u64, SalvageError> {
        if size == Some(0) {
            return Ok(0);
        }
        if !self.layout.is_valid_cluster(cluster) {
            self.emit(Diagnostic::ClusterOutOfRange { cluster });
            return Ok(0);
        }

        debug!(
            "Streaming from cluster {} ({:?} bytes, deleted: {})",
            cluster, size, deleted
        );

        let layout = self.layout.clone();
        let bytes_per_cluster = layout.bytes_per_cluster() as u64;
        let mut remaining = size;
        let mut written = 0u64;
        let mut visited = HashSet::new();
        let mut state = if deleted {
            WalkState::ContiguousRecovery
        } else {
            WalkState::Chained
        };
        let mut current = cluster;

        while state.is_running() {
            if !visited.insert(current) {
                self.emit(Diagnostic::ChainLoop { cluster: current });
                break;
            }

            let data = self.read_cluster(current);
            let chunk = remaining
                .map_or(bytes_per_cluster, |left| left.min(bytes_per_cluster))
                .min(data.len() as u64);
            sink.write_all(&data[..chunk as usize])?;
            written += chunk;

            if let Some(left) = remaining.as_mut() {
                *left -= chunk;
                if *left == 0 {
                    break;
                }
            }

            let step = stream_step(state, current, deleted, &layout, |c| self.next_cluster(c, 0));
            for diagnostic in step.diagnostics {
                self.emit(diagnostic);
            }

            state = step.state;
            if let Some(next) = step.next {
                current = next;
            }
        }

        sink.flush()?;
        Ok(written)
    }

    /// Streams the file at `path` to `sink`. An erased entry whose first
    /// cluster is free is read in deleted mode.
    pub fn read_file<W: Write + ?Sized>(&mut self, path: &str, sink: &mut W) -> Result<u64, SalvageError> {
        let entry = self.resolve_file(path)?;
        if entry.is_directory() {
            return Err(SalvageError::IsADirectory(path.to_string()));
        }

        let deleted = entry.is_erased() && self.is_free(entry.cluster);
        if deleted {
            info!("{} is deleted, reading following free clusters", path);
            self.emit(Diagnostic::DeletedModeEnabled { cluster: entry.cluster });
        }

        self.stream_file(entry.cluster, Some(entry.size as u64), sink, deleted)
    }
}
