use serde::{Deserialize, Serialize};

use crate::error::{EngineErr, Result};

/// A set of parameters sharing a learning rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGroup {
    pub lr: f64,
    /// The learning rate the group was created with, schedules scale from it.
    pub initial_lr: f64,
}

impl ParamGroup {
    pub fn new(lr: f64) -> Self {
        Self { lr, initial_lr: lr }
    }
}

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer: Send {
    /// Updates the provided slice of parameters using the model's gradient.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;

    fn param_groups(&self) -> &[ParamGroup];

    fn param_groups_mut(&mut self) -> &mut [ParamGroup];

    /// The learning rate of every group, in order.
    fn lrs(&self) -> Vec<f64> {
        self.param_groups().iter().map(|group| group.lr).collect()
    }

    /// Running state kept between updates, like momentum buffers. Empty for stateless
    /// optimizers.
    fn state(&self) -> &[f32] {
        &[]
    }

    /// Restores a state previously returned by `state`.
    ///
    /// # Errors
    /// `SizeMismatch` if `state` doesn't fit this optimizer.
    fn load_state(&mut self, state: &[f32]) -> Result<()> {
        if state.is_empty() {
            return Ok(());
        }

        Err(EngineErr::SizeMismatch {
            what: "optimizer state",
            got: state.len(),
            expected: 0,
        })
    }
}
