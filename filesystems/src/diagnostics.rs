// Structured diagnostics emitted by a volume session
// Recovery heuristics report here instead of failing the operation

use crate::fat_common::HeaderAnomaly;
use log::warn;
use std::fmt;

/// A non-fatal event observed while reading or writing a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Implausible boot-sector value; each one adds to the strangeness count.
    HeaderAnomaly(HeaderAnomaly),
    /// Device read failed; the caller received zero-filled data.
    ReadFailed { lba: u64, count: u32, reason: String },
    /// Read requested past the last sector of the volume.
    ReadOutsideVolume { lba: u64, total_sectors: u64 },
    WriteFailed { lba: u64, reason: String },
    /// A directory chain revisited one of its clusters.
    DirectoryLoop { cluster: u32 },
    /// A file chain revisited one of its clusters.
    ChainLoop { cluster: u32 },
    /// A directory was read past a free FAT entry using physically
    /// consecutive clusters.
    FreeClusterGap { cluster: u32 },
    /// Malformed records outnumber well-formed ones.
    NotADirectory { cluster: u32, good: u32, bad: u32 },
    /// A file chain hit a free entry mid-stream; switching to contiguous reads.
    ChainBroken { cluster: u32 },
    /// A contiguous read reached an allocated cluster; back to the FAT.
    AllocatedInContiguousRun { cluster: u32 },
    /// The target entry is erased and its start cluster is free.
    DeletedModeEnabled { cluster: u32 },
    /// A chain pointed outside the valid cluster range.
    ClusterOutOfRange { cluster: u32 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::HeaderAnomaly(anomaly) => write!(f, "{}", anomaly),
            Diagnostic::ReadFailed { lba, count, reason } => {
                write!(f, "Unable to read {} sector(s) at {}: {}", count, lba, reason)
            }
            Diagnostic::ReadOutsideVolume { lba, total_sectors } => {
                write!(f, "Reading sector {} outside the volume ({} sectors)", lba, total_sectors)
            }
            Diagnostic::WriteFailed { lba, reason } => {
                write!(f, "Unable to write sector {}: {}", lba, reason)
            }
            Diagnostic::DirectoryLoop { cluster } => {
                write!(f, "Looping directory at cluster {}", cluster)
            }
            Diagnostic::ChainLoop { cluster } => {
                write!(f, "Cluster chain loops back to cluster {}", cluster)
            }
            Diagnostic::FreeClusterGap { cluster } => write!(
                f,
                "Directory continues contiguously into free cluster {}",
                cluster
            ),
            Diagnostic::NotADirectory { cluster, good, bad } => write!(
                f,
                "Entries at cluster {} don't look good ({} good, {} bad), this is maybe not a directory",
                cluster, good, bad
            ),
            Diagnostic::ChainBroken { cluster } => write!(
                f,
                "Next cluster after {} is free (maybe the FAT is broken), enabling contiguous mode",
                cluster
            ),
            Diagnostic::AllocatedInContiguousRun { cluster } => write!(
                f,
                "Contiguous file reached allocated cluster {}, disabling contiguous mode",
                cluster
            ),
            Diagnostic::DeletedModeEnabled { cluster } => write!(
                f,
                "Reading a deleted file from cluster {}, enabling deleted mode",
                cluster
            ),
            Diagnostic::ClusterOutOfRange { cluster } => {
                write!(f, "Cluster {} is outside the volume", cluster)
            }
        }
    }
}

/// Receiver for session diagnostics.
pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to the `log` facade at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Collects into a shared buffer so the events stay readable after the
/// sink has been handed to a session.
impl DiagnosticSink for std::rc::Rc<std::cell::RefCell<Vec<Diagnostic>>> {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.borrow_mut().push(diagnostic);
    }
}
