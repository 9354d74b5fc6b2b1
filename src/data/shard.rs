use std::{num::NonZeroUsize, ops::Range};

use crate::comm::Comm;

/// Splits `total` samples among `world_size` ranks and returns the range for `rank`.
///
/// Ranges are contiguous, disjoint and cover `0..total`, their sizes differ by at most 1.
pub fn shard_range(total: usize, rank: usize, world_size: usize) -> Range<usize> {
    let world_size = world_size.max(1);
    let rank = rank.min(world_size - 1);

    let base = total / world_size;
    let rem = total % world_size;

    let start = rank * base + rank.min(rem);
    let extra = usize::from(rank < rem);
    start..start + base + extra
}

/// Which part of a dataset a rank iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    pub rank: usize,
    pub world_size: NonZeroUsize,
}

impl ShardSpec {
    /// The whole dataset.
    pub fn full() -> Self {
        Self {
            rank: 0,
            world_size: NonZeroUsize::MIN,
        }
    }

    /// The shard owned by `comm`'s rank.
    pub fn from_comm(comm: &dyn Comm) -> Self {
        Self {
            rank: comm.rank(),
            world_size: NonZeroUsize::new(comm.world_size()).unwrap_or(NonZeroUsize::MIN),
        }
    }

    #[inline]
    pub fn range(self, total: usize) -> Range<usize> {
        shard_range(total, self.rank, self.world_size.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalComm;

    #[test]
    fn shard_range_balanced() {
        // total 10, ranks 3 => sizes 4,3,3
        assert_eq!(shard_range(10, 0, 3), 0..4);
        assert_eq!(shard_range(10, 1, 3), 4..7);
        assert_eq!(shard_range(10, 2, 3), 7..10);
    }

    #[test]
    fn shard_spec_follows_comm() {
        let comm = LocalComm::new(1, NonZeroUsize::new(3).unwrap()).unwrap();
        assert_eq!(ShardSpec::from_comm(&comm).range(10), 4..7);
        assert_eq!(ShardSpec::full().range(10), 0..10);
    }
}
