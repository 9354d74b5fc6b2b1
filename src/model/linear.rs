use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde_json::json;

use super::{Batch, Model, Output};
use crate::{
    buffer::Record,
    error::{EngineErr, Result},
};

/// A single dense layer without activation trained against the mean squared error.
///
/// Parameters are laid out as the `(inputs, outputs)` weight matrix in row-major order
/// followed by the `outputs` biases.
#[derive(Debug, Clone)]
pub struct Linear {
    dim: (usize, usize),
    params: Vec<f32>,
    grads: Vec<f32>,
    training: bool,
}

impl Linear {
    /// Creates a new `Linear` model with every parameter set to `init`.
    ///
    /// # Args
    /// * `dim` - Amount of inputs and outputs.
    /// * `init` - Initial value of every parameter.
    pub fn new(dim: (usize, usize), init: f32) -> Self {
        let size = (dim.0 + 1) * dim.1;

        Self {
            dim,
            params: vec![init; size],
            grads: vec![0.0; size],
            training: true,
        }
    }

    pub fn size(&self) -> usize {
        self.params.len()
    }

    fn view_params(&self) -> Result<(ArrayView2<'_, f32>, ArrayView1<'_, f32>)> {
        let w_size = self.dim.0 * self.dim.1;
        let w = ArrayView2::from_shape(self.dim, &self.params[..w_size])
            .map_err(|e| EngineErr::Model(e.to_string()))?;
        let b = ArrayView1::from_shape(self.dim.1, &self.params[w_size..])
            .map_err(|e| EngineErr::Model(e.to_string()))?;
        Ok((w, b))
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        let (inputs, outputs) = self.dim;

        if batch.inputs.ncols() != inputs || batch.targets.ncols() != outputs {
            return Err(EngineErr::Model(format!(
                "batch shape mismatch: got ({}, {}) columns, expected ({inputs}, {outputs})",
                batch.inputs.ncols(),
                batch.targets.ncols()
            )));
        }

        if batch.inputs.nrows() != batch.targets.nrows() {
            return Err(EngineErr::Model(format!(
                "got {} inputs and {} targets",
                batch.inputs.nrows(),
                batch.targets.nrows()
            )));
        }

        Ok(())
    }

    fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let (w, b) = self.view_params()?;
        Ok(x.dot(&w) + &b)
    }
}

impl Model for Linear {
    fn forward(&mut self, batch: &Batch) -> Result<Output> {
        self.check_batch(batch)?;

        let y_pred = self.predict(batch.inputs.view())?;
        let diff = &y_pred - &batch.targets;
        let loss = diff.mapv(|x| x.powi(2)).mean().unwrap_or_default();

        if self.training && !batch.is_empty() {
            let d = diff * (2.0 / y_pred.len() as f32);
            let dw = batch.inputs.t().dot(&d);
            let db = d.sum_axis(Axis(0));

            let (grad_w, grad_b) = self.grads.split_at_mut(dw.len());
            grad_w.iter_mut().zip(dw.iter()).for_each(|(g, v)| *g = *v);
            grad_b.iter_mut().zip(db.iter()).for_each(|(g, v)| *g = *v);
        }

        Ok(Output::from([("loss".to_string(), Record::from(loss))]))
    }

    fn train(&mut self) {
        self.training = true;
    }

    fn eval(&mut self) {
        self.training = false;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_and_grads(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grads)
    }

    fn load_params(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(EngineErr::Model(format!(
                "parameter length mismatch: got {}, expected {}",
                params.len(),
                self.params.len()
            )));
        }

        self.params.copy_from_slice(params);
        Ok(())
    }

    fn graph(&self, sample: &Batch) -> Option<serde_json::Value> {
        Some(json!({
            "nodes": [
                {"name": "input", "op": "placeholder", "shape": [sample.len(), self.dim.0]},
                {"name": "dense", "op": "linear", "shape": [self.dim.0, self.dim.1]},
                {"name": "output", "op": "identity", "shape": [sample.len(), self.dim.1]},
            ],
            "edges": [["input", "dense"], ["dense", "output"]],
        }))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn forward_reports_mse_loss() {
        let mut model = Linear::new((1, 1), 0.0);
        let batch = Batch::new(array![[1.0], [2.0]], array![[2.0], [4.0]]);

        let output = model.forward(&batch).unwrap();
        assert_eq!(output["loss"], Record::Scalar(10.0));
    }

    #[test]
    fn gradients_point_downhill() {
        let mut model = Linear::new((1, 1), 0.0);
        let batch = Batch::new(array![[1.0], [2.0]], array![[2.0], [4.0]]);
        model.forward(&batch).unwrap();

        let (params, grads) = model.params_and_grads();
        assert_eq!(params.len(), 2);
        // dL/dw = 2/n * sum(x * (wx - y)) = -10, dL/db = 2/n * sum(wx - y) = -6
        assert_eq!(grads, &[-10.0, -6.0]);
    }

    #[test]
    fn eval_mode_leaves_gradients_alone() {
        let mut model = Linear::new((1, 1), 0.0);
        model.eval();
        let batch = Batch::new(array![[1.0]], array![[3.0]]);
        model.forward(&batch).unwrap();

        let (_, grads) = model.params_and_grads();
        assert_eq!(grads, &[0.0, 0.0]);
    }

    #[test]
    fn rejects_mismatched_batches() {
        let mut model = Linear::new((2, 1), 0.0);
        let batch = Batch::new(array![[1.0]], array![[3.0]]);
        assert!(model.forward(&batch).is_err());
    }

    #[test]
    fn load_params_checks_length() {
        let mut model = Linear::new((1, 1), 0.0);
        assert!(model.load_params(&[1.0]).is_err());
        model.load_params(&[1.0, 2.0]).unwrap();
        assert_eq!(model.params(), &[1.0, 2.0]);
    }
}
