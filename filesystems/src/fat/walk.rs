// Chain walk state machine shared by directory enumeration and file streaming
// Transitions are pure: the FAT is consulted through a lookup closure

use crate::diagnostics::Diagnostic;
use crate::fat_common::{ClusterRef, VolumeLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    /// Following next-cluster values from the FAT.
    Chained,
    /// Reading physically consecutive clusters because the FAT looked damaged.
    ContiguousRecovery,
    Terminated,
    /// The data read so far does not look like what was expected.
    Aborted,
}

impl WalkState {
    pub fn is_running(self) -> bool {
        matches!(self, WalkState::Chained | WalkState::ContiguousRecovery)
    }
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub state: WalkState,
    /// Cluster to read next, present while the walk is running.
    pub next: Option<u32>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Step {
    fn go(state: WalkState, next: u32) -> Self {
        Self { state, next: Some(next), diagnostics: Vec::new() }
    }

    fn stop() -> Self {
        Self { state: WalkState::Terminated, next: None, diagnostics: Vec::new() }
    }

    fn with(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Keeps the diagnostics gathered so far and continues as `next`.
    fn then(mut self, next: Step) -> Self {
        self.diagnostics.extend(next.diagnostics);
        Self { state: next.state, next: next.next, diagnostics: self.diagnostics }
    }

    fn idle(state: WalkState) -> Self {
        Self { state, next: None, diagnostics: Vec::new() }
    }
}

/// Record counts of one directory cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterTally {
    pub good: u32,
    pub bad: u32,
}

impl ClusterTally {
    /// A cluster holding mostly genuine entries suggests the directory
    /// goes on even though the FAT says otherwise.
    pub fn supports_recovery(&self) -> bool {
        self.good > 0 && self.bad < self.good
    }
}

/// Outcome of a directory transition. `counted` is false when the cluster
/// just read should not appear in the visited-cluster tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStep {
    pub step: Step,
    pub counted: bool,
}

fn follow(next: u32, layout: &VolumeLayout) -> Step {
    if layout.is_valid_cluster(next) {
        Step::go(WalkState::Chained, next)
    } else {
        Step::stop().with(Diagnostic::ClusterOutOfRange { cluster: next })
    }
}

/// Directory transition after scanning `current`.
///
/// A free FAT entry (or an ongoing recovery) continues into `current + 1`
/// only when the cluster just read supports recovery and that successor is
/// itself free. A stopping cluster with no entries is not counted.
pub fn directory_step<F>(
    state: WalkState,
    current: u32,
    tally: ClusterTally,
    layout: &VolumeLayout,
    mut fat: F,
) -> DirectoryStep
where
    F: FnMut(u32) -> ClusterRef,
{
    let recover = |fat: &mut F| {
        let candidate = current + 1;
        if tally.supports_recovery() && layout.is_valid_cluster(candidate) && (*fat)(candidate).is_free() {
            DirectoryStep {
                step: Step::go(WalkState::ContiguousRecovery, candidate)
                    .with(Diagnostic::FreeClusterGap { cluster: candidate }),
                counted: true,
            }
        } else {
            DirectoryStep { step: Step::stop(), counted: tally.good > 0 }
        }
    };

    match state {
        WalkState::Chained => match fat(current) {
            ClusterRef::Next(next) => DirectoryStep {
                step: follow(next, layout),
                counted: true,
            },
            ClusterRef::EndOfChain => DirectoryStep { step: Step::stop(), counted: true },
            ClusterRef::Free => recover(&mut fat),
        },
        WalkState::ContiguousRecovery => recover(&mut fat),
        WalkState::Terminated | WalkState::Aborted => DirectoryStep {
            step: Step::idle(state),
            counted: true,
        },
    }
}

/// Whether a directory should be rejected: more malformed than well-formed
/// records and nothing (root cluster or "." self-reference) vouching for it.
pub fn is_implausible_directory(validated: bool, good: u32, bad: u32) -> bool {
    !validated && bad > good
}

/// File stream transition after reading `current`.
///
/// * Chained: follow the FAT; a free entry switches to contiguous reads.
/// * Contiguous: read the next cluster; an allocated one hands control back
///   to the FAT from that cluster on.
/// * Deleted: the chain is gone, skip forward to the next free cluster.
pub fn stream_step<F>(
    state: WalkState,
    current: u32,
    deleted: bool,
    layout: &VolumeLayout,
    mut fat: F,
) -> Step
where
    F: FnMut(u32) -> ClusterRef,
{
    match state {
        WalkState::Chained => match fat(current) {
            ClusterRef::Next(next) => follow(next, layout),
            ClusterRef::EndOfChain => Step::stop(),
            ClusterRef::Free => Step::stop()
                .with(Diagnostic::ChainBroken { cluster: current })
                .then(contiguous_successor(current, layout, &mut fat)),
        },
        WalkState::ContiguousRecovery if deleted => {
            let mut candidate = current + 1;
            while layout.is_valid_cluster(candidate) {
                if fat(candidate).is_free() {
                    return Step::go(WalkState::ContiguousRecovery, candidate);
                }
                candidate += 1;
            }
            Step::stop()
        }
        WalkState::ContiguousRecovery => contiguous_successor(current, layout, &mut fat),
        WalkState::Terminated | WalkState::Aborted => Step::idle(state),
    }
}

/// Next physical cluster of a contiguous run; an allocated one hands the
/// walk back to the FAT.
fn contiguous_successor<F>(current: u32, layout: &VolumeLayout, fat: &mut F) -> Step
where
    F: FnMut(u32) -> ClusterRef,
{
    let candidate = current + 1;
    if !layout.is_valid_cluster(candidate) {
        Step::stop()
    } else if (*fat)(candidate).is_free() {
        Step::go(WalkState::ContiguousRecovery, candidate)
    } else {
        Step::go(WalkState::Chained, candidate)
            .with(Diagnostic::AllocatedInContiguousRun { cluster: candidate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat_common::FatWidth;
    use std::collections::HashMap;

    fn layout() -> VolumeLayout {
        VolumeLayout {
            width: FatWidth::Fat16,
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            fat_count: 2,
            sectors_per_fat: 1,
            total_sectors: 64,
            root_entries: 16,
            root_sectors: 1,
            root_cluster: 0,
            fat_start: 1,
            data_start: 3,
            total_clusters: 20,
        }
    }

    /// FAT lookup where unspecified clusters are free.
    fn fat(entries: &[(u32, ClusterRef)]) -> impl FnMut(u32) -> ClusterRef {
        let map: HashMap<u32, ClusterRef> = entries.iter().copied().collect();
        move |c| map.get(&c).copied().unwrap_or(ClusterRef::Free)
    }

    const GOOD: ClusterTally = ClusterTally { good: 3, bad: 1 };

    #[test]
    fn test_directory_follows_chain() {
        let l = layout();
        let s = directory_step(WalkState::Chained, 4, GOOD, &l, fat(&[(4, ClusterRef::Next(9))]));
        assert_eq!(s.step, Step::go(WalkState::Chained, 9));
        assert!(s.counted);

        let s = directory_step(WalkState::Chained, 9, GOOD, &l, fat(&[(9, ClusterRef::EndOfChain)]));
        assert_eq!(s.step.state, WalkState::Terminated);
    }

    #[test]
    fn test_directory_recovers_into_free_successor() {
        let l = layout();
        let s = directory_step(WalkState::Chained, 5, GOOD, &l, fat(&[]));
        assert_eq!(s.step.state, WalkState::ContiguousRecovery);
        assert_eq!(s.step.next, Some(6));
        assert_eq!(s.step.diagnostics, vec![Diagnostic::FreeClusterGap { cluster: 6 }]);
    }

    #[test]
    fn test_directory_recovery_needs_good_entries_and_free_successor() {
        let l = layout();
        let poor = ClusterTally { good: 1, bad: 1 };
        let s = directory_step(WalkState::Chained, 5, poor, &l, fat(&[]));
        assert_eq!(s.step.state, WalkState::Terminated);

        let s = directory_step(
            WalkState::Chained,
            5,
            GOOD,
            &l,
            fat(&[(6, ClusterRef::EndOfChain)]),
        );
        assert_eq!(s.step.state, WalkState::Terminated);
    }

    #[test]
    fn test_empty_recovered_cluster_is_not_counted() {
        let l = layout();
        let s = directory_step(WalkState::ContiguousRecovery, 6, ClusterTally::default(), &l, fat(&[]));
        assert_eq!(s.step.state, WalkState::Terminated);
        assert!(!s.counted);
    }

    #[test]
    fn test_directory_chain_out_of_range() {
        let l = layout();
        let s = directory_step(WalkState::Chained, 4, GOOD, &l, fat(&[(4, ClusterRef::Next(500))]));
        assert_eq!(s.step.state, WalkState::Terminated);
        assert_eq!(s.step.diagnostics, vec![Diagnostic::ClusterOutOfRange { cluster: 500 }]);
    }

    #[test]
    fn test_implausible_directory() {
        assert!(is_implausible_directory(false, 1, 2));
        assert!(!is_implausible_directory(true, 1, 2));
        assert!(!is_implausible_directory(false, 2, 2));
    }

    #[test]
    fn test_stream_switches_to_contiguous_on_free_entry() {
        let l = layout();
        let s = stream_step(WalkState::Chained, 7, false, &l, fat(&[]));
        assert_eq!(s.state, WalkState::ContiguousRecovery);
        assert_eq!(s.next, Some(8));
        assert_eq!(s.diagnostics, vec![Diagnostic::ChainBroken { cluster: 7 }]);
    }

    #[test]
    fn test_stream_broken_chain_into_allocated_cluster() {
        let l = layout();
        let s = stream_step(WalkState::Chained, 7, false, &l, fat(&[(8, ClusterRef::EndOfChain)]));
        assert_eq!(s.state, WalkState::Chained);
        assert_eq!(s.next, Some(8));
        assert_eq!(
            s.diagnostics,
            vec![
                Diagnostic::ChainBroken { cluster: 7 },
                Diagnostic::AllocatedInContiguousRun { cluster: 8 },
            ]
        );
    }

    #[test]
    fn test_stream_contiguous_returns_to_chain_on_allocated_cluster() {
        let l = layout();
        let s = stream_step(
            WalkState::ContiguousRecovery,
            8,
            false,
            &l,
            fat(&[(9, ClusterRef::Next(12))]),
        );
        assert_eq!(s.state, WalkState::Chained);
        assert_eq!(s.next, Some(9));
        assert_eq!(s.diagnostics, vec![Diagnostic::AllocatedInContiguousRun { cluster: 9 }]);
    }

    #[test]
    fn test_deleted_stream_skips_allocated_clusters() {
        let l = layout();
        let allocated = fat(&[(4, ClusterRef::EndOfChain), (5, ClusterRef::Next(6)), (6, ClusterRef::EndOfChain)]);
        let s = stream_step(WalkState::ContiguousRecovery, 3, true, &l, allocated);
        assert_eq!(s, Step::go(WalkState::ContiguousRecovery, 7));
    }

    #[test]
    fn test_deleted_stream_stops_at_volume_end() {
        let l = layout();
        let s = stream_step(WalkState::ContiguousRecovery, l.max_cluster(), true, &l, fat(&[]));
        assert_eq!(s.state, WalkState::Terminated);
        assert!(!s.state.is_running());
    }
}
