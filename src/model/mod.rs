mod linear;

use std::collections::BTreeMap;

use ndarray::Array2;
use serde_json::Value;

pub use linear::Linear;

use crate::{buffer::Record, error::Result};

/// A batch of supervised samples, one row per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Array2<f32>,
    pub targets: Array2<f32>,
}

impl Batch {
    pub fn new(inputs: Array2<f32>, targets: Array2<f32>) -> Self {
        Self { inputs, targets }
    }

    /// Amount of samples in the batch.
    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named values a forward pass reports, recorded into the engine's buffer as is.
pub type Output = BTreeMap<String, Record>;

/// The model contract consumed by the engine.
///
/// Parameters and gradients live in flat buffers so optimizers can update them without knowing
/// the model's layout.
pub trait Model: Send {
    /// Runs a forward pass over `batch`. While training it also leaves the gradients of the
    /// returned loss in the gradient buffer.
    fn forward(&mut self, batch: &Batch) -> Result<Output>;

    /// Switches the model to training mode.
    fn train(&mut self);

    /// Switches the model to evaluation mode.
    fn eval(&mut self);

    fn is_training(&self) -> bool;

    fn params(&self) -> &[f32];

    /// Mutable parameters alongside the last computed gradients.
    fn params_and_grads(&mut self) -> (&mut [f32], &[f32]);

    /// Overwrites the parameters, e.g. when resuming from a checkpoint.
    fn load_params(&mut self, params: &[f32]) -> Result<()>;

    /// A description of the model's graph for dashboards, traced with `sample`.
    fn graph(&self, _sample: &Batch) -> Option<Value> {
        None
    }

    /// Peak memory used by the model in MiB, if the backend tracks it.
    fn memory_mb(&self) -> Option<u64> {
        None
    }
}
