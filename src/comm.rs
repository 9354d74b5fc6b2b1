//! Distributed run information as seen by a single engine.
//!
//! The engine never talks to other processes itself. It only asks which rank it is, how many
//! ranks take part and, for the few metrics that need it, a max-reduction across them.

use std::num::NonZeroUsize;

/// The distributed predicate consumed by the engine.
pub trait Comm: Send + Sync {
    /// This process' rank, in `0..world_size`.
    fn rank(&self) -> usize;

    /// Amount of processes taking part in the run.
    fn world_size(&self) -> usize;

    /// Whether this process is the designated single writer.
    fn is_master(&self) -> bool {
        self.rank() == 0
    }

    /// Max-reduces `value` across all ranks onto the master.
    fn reduce_max(&self, value: u64) -> u64 {
        value
    }
}

/// A run without any inter-process collectives, one replica per rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalComm {
    rank: usize,
    world_size: NonZeroUsize,
}

impl LocalComm {
    /// Creates a new `LocalComm`.
    ///
    /// # Args
    /// * `rank` - This replica's rank.
    /// * `world_size` - Amount of replicas.
    ///
    /// # Returns
    /// `None` if `rank` is out of range.
    pub fn new(rank: usize, world_size: NonZeroUsize) -> Option<Self> {
        (rank < world_size.get()).then_some(Self { rank, world_size })
    }

    /// A single process run.
    pub fn single() -> Self {
        Self {
            rank: 0,
            world_size: NonZeroUsize::MIN,
        }
    }
}

impl Default for LocalComm {
    fn default() -> Self {
        Self::single()
    }
}

impl Comm for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size.get()
    }
}

/// Runs `f` only on the master rank.
///
/// # Returns
/// `Some` with `f`'s output on the master, `None` everywhere else.
pub fn master_only<T, F>(comm: &dyn Comm, f: F) -> Option<T>
where
    F: FnOnce() -> T,
{
    comm.is_master().then(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_must_be_in_range() {
        let four = NonZeroUsize::new(4).unwrap();
        assert!(LocalComm::new(3, four).is_some());
        assert!(LocalComm::new(4, four).is_none());
    }

    #[test]
    fn master_only_runs_once_across_ranks() {
        let four = NonZeroUsize::new(4).unwrap();
        let mut calls = 0;

        for rank in 0..4 {
            let comm = LocalComm::new(rank, four).unwrap();
            master_only(&comm, || calls += 1);
        }

        assert_eq!(calls, 1);
    }
}
