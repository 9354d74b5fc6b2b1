mod loader;
mod shard;

pub use loader::InMemoryLoader;
pub use shard::{shard_range, ShardSpec};

use crate::model::Batch;

/// The data loader contract consumed by the engine.
///
/// Loaders are pulled one batch at a time so hooks can still reach the engine, and through it
/// the loaders, between steps.
pub trait DataLoader: Send {
    /// Amount of batches produced per pass.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewinds to the first batch.
    fn reset(&mut self);

    /// Returns the next batch, or `None` once the pass is exhausted.
    fn next_batch(&mut self) -> Option<Batch>;

    /// Lets shuffling loaders reseed for a new epoch. Called before `reset`.
    fn set_epoch(&mut self, _epoch: usize) {}
}
