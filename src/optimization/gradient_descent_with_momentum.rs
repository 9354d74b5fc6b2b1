use super::{Optimizer, ParamGroup};
use crate::error::{EngineErr, Result};

#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    groups: [ParamGroup; 1],
    momentum: f32,
    velocity: Box<[f32]>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` instance.
    pub fn new(len: usize, learning_rate: f64, momentum: f32) -> Self {
        Self {
            groups: [ParamGroup::new(learning_rate)],
            momentum,
            velocity: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        if grad.len() != params.len() || grad.len() != self.velocity.len() {
            return Err(EngineErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: self.velocity.len(),
            });
        }

        let lr = self.groups[0].lr as f32;
        let mu = self.momentum;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.velocity.iter_mut())
            .for_each(|((p, g), v)| {
                *v = (mu * *v) + g;
                *p -= lr * *v;
            });

        Ok(())
    }

    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn param_groups_mut(&mut self) -> &mut [ParamGroup] {
        &mut self.groups
    }

    fn state(&self) -> &[f32] {
        &self.velocity
    }

    fn load_state(&mut self, state: &[f32]) -> Result<()> {
        if state.len() != self.velocity.len() {
            return Err(EngineErr::SizeMismatch {
                what: "optimizer state",
                got: state.len(),
                expected: self.velocity.len(),
            });
        }

        self.velocity.copy_from_slice(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_accumulates() {
        let mut optimizer = GradientDescentWithMomentum::new(1, 1.0, 0.5);
        let mut params = [0.0];

        optimizer.update_params(&[1.0], &mut params).unwrap();
        assert_eq!(params, [-1.0]);

        optimizer.update_params(&[1.0], &mut params).unwrap();
        assert_eq!(params, [-2.5]);
    }

    #[test]
    fn restored_velocity_keeps_accumulating() {
        let mut trained = GradientDescentWithMomentum::new(1, 1.0, 0.5);
        trained.update_params(&[1.0], &mut [0.0]).unwrap();

        let mut restored = GradientDescentWithMomentum::new(1, 1.0, 0.5);
        restored.load_state(trained.state()).unwrap();

        let mut params = [-1.0];
        restored.update_params(&[1.0], &mut params).unwrap();
        assert_eq!(params, [-2.5]);

        assert!(restored.load_state(&[0.0, 0.0]).is_err());
    }
}
