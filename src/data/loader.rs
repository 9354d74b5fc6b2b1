use std::num::NonZeroUsize;

use ndarray::{Array2, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::{DataLoader, ShardSpec};
use crate::{
    error::{EngineErr, Result},
    model::Batch,
};

/// Shard-aware loader over samples kept in memory, one row per sample.
#[derive(Debug, Clone)]
pub struct InMemoryLoader {
    inputs: Array2<f32>,
    targets: Array2<f32>,
    batch_size: NonZeroUsize,
    shuffle_seed: Option<u64>,
    order: Vec<usize>,
    cursor: usize,
}

impl InMemoryLoader {
    /// Creates a new `InMemoryLoader`.
    ///
    /// # Args
    /// * `inputs` - Model inputs, one row per sample.
    /// * `targets` - Expected outputs, one row per sample.
    /// * `shard` - The part of the samples this rank iterates.
    /// * `batch_size` - Max amount of samples per batch.
    ///
    /// # Errors
    /// `InvalidConfig` if `inputs` and `targets` have a different amount of rows.
    pub fn new(
        inputs: Array2<f32>,
        targets: Array2<f32>,
        shard: ShardSpec,
        batch_size: NonZeroUsize,
    ) -> Result<Self> {
        if inputs.nrows() != targets.nrows() {
            return Err(EngineErr::InvalidConfig(format!(
                "got {} input rows and {} target rows",
                inputs.nrows(),
                targets.nrows()
            )));
        }

        let order = shard.range(inputs.nrows()).collect();

        Ok(Self {
            inputs,
            targets,
            batch_size,
            shuffle_seed: None,
            order,
            cursor: 0,
        })
    }

    /// Shuffles the shard every epoch with a seed derived from `seed` and the epoch.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self.set_epoch(0);
        self
    }

    /// Amount of samples in this rank's shard.
    pub fn samples(&self) -> usize {
        self.order.len()
    }
}

impl DataLoader for InMemoryLoader {
    fn len(&self) -> usize {
        self.order.len().div_ceil(self.batch_size.get())
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size.get()).min(self.order.len());
        let rows = &self.order[self.cursor..end];
        self.cursor = end;

        Some(Batch::new(
            self.inputs.select(Axis(0), rows),
            self.targets.select(Axis(0), rows),
        ))
    }

    fn set_epoch(&mut self, epoch: usize) {
        let Some(seed) = self.shuffle_seed else {
            return;
        };

        self.order.sort_unstable();
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
        self.order.shuffle(&mut rng);
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;
    use crate::data::ShardSpec;

    fn column(range: std::ops::Range<usize>) -> Array2<f32> {
        Array::from_iter(range.map(|i| i as f32))
            .into_shape_with_order((10, 1))
            .unwrap()
    }

    #[test]
    fn batches_respect_shard_and_batch_size() {
        let shard = ShardSpec {
            rank: 1,
            world_size: NonZeroUsize::new(3).unwrap(),
        }; // 4..7
        let mut loader = InMemoryLoader::new(
            column(0..10),
            column(100..110),
            shard,
            NonZeroUsize::new(2).unwrap(),
        )
        .unwrap();

        assert_eq!(loader.len(), 2);

        let b1 = loader.next_batch().unwrap();
        assert_eq!(b1.inputs.column(0).to_vec(), [4.0, 5.0]);
        assert_eq!(b1.targets.column(0).to_vec(), [104.0, 105.0]);

        let b2 = loader.next_batch().unwrap();
        assert_eq!(b2.inputs.column(0).to_vec(), [6.0]);

        assert!(loader.next_batch().is_none());

        loader.reset();
        let b3 = loader.next_batch().unwrap();
        assert_eq!(b3.inputs.column(0).to_vec(), [4.0, 5.0]);
    }

    #[test]
    fn shuffling_is_deterministic_per_epoch() {
        let build = || {
            InMemoryLoader::new(
                column(0..10),
                column(0..10),
                ShardSpec::full(),
                NonZeroUsize::new(10).unwrap(),
            )
            .unwrap()
            .shuffled(7)
        };

        let mut a = build();
        let mut b = build();
        a.set_epoch(3);
        b.set_epoch(3);

        let a = a.next_batch().unwrap();
        let b = b.next_batch().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.inputs, a.targets);
    }

    #[test]
    fn mismatched_rows_fail() {
        let inputs = Array2::zeros((3, 1));
        let targets = Array2::zeros((2, 1));
        let res = InMemoryLoader::new(
            inputs,
            targets,
            ShardSpec::full(),
            NonZeroUsize::new(1).unwrap(),
        );
        assert!(res.is_err());
    }
}
