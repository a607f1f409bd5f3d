// Path resolution from the root directory down
// Names match case-insensitively against long or short names

use super::FatVolume;
use crate::fat_common::DirectoryEntry;
use log::{debug, trace};
use salvage_core::{SalvageError, SectorDevice};

/// Splits a slash-separated path into its components. Backslashes count as
/// separators and empty components are dropped.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(|c: char| c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

impl<D: SectorDevice> FatVolume<D> {
    /// Resolves `path` to a directory entry. The root resolves to
    /// [`FatVolume::root_entry`].
    ///
    /// At each level a live directory wins over an erased one of the same
    /// name.
    pub fn resolve_directory(&mut self, path: &str) -> Result<DirectoryEntry, SalvageError> {
        debug!("Resolving directory: {}", path);
        let mut current = self.root_entry();

        for component in split_path(path) {
            trace!("Looking up '{}' in cluster {}", component, current.cluster);
            let entries = self.enumerate(current.cluster)?.entries;

            let mut candidates = entries
                .into_iter()
                .filter(|entry| entry.is_directory() && entry.matches(&component));
            let first = candidates.next();
            let live = match &first {
                Some(entry) if entry.is_erased() => candidates.find(|entry| !entry.is_erased()),
                _ => None,
            };

            current = live
                .or(first)
                .ok_or_else(|| SalvageError::NotFound(path.to_string()))?;
        }

        Ok(current)
    }

    /// Resolves `path` to the entry it names, file or directory.
    ///
    /// Among several entries with the same name (stale or erased copies),
    /// the first one with a non-zero size wins, otherwise the first match.
    pub fn resolve_file(&mut self, path: &str) -> Result<DirectoryEntry, SalvageError> {
        debug!("Resolving file: {}", path);
        let mut components = split_path(path);
        let name = match components.pop() {
            Some(name) => name,
            None => return Ok(self.root_entry()),
        };

        let parent = self.resolve_directory(&components.join("/"))?;
        let matches: Vec<DirectoryEntry> = self
            .enumerate(parent.cluster)?
            .entries
            .into_iter()
            .filter(|entry| entry.matches(&name))
            .collect();

        let chosen = match matches.iter().position(|entry| entry.size != 0) {
            Some(index) => matches.into_iter().nth(index),
            None => matches.into_iter().next(),
        };

        chosen.ok_or_else(|| SalvageError::NotFound(path.to_string()))
    }
}
