mod gradient_descent;
mod gradient_descent_with_momentum;
mod optimizer;

use serde::Deserialize;

pub use gradient_descent::GradientDescent;
pub use gradient_descent_with_momentum::GradientDescentWithMomentum;
pub use optimizer::{Optimizer, ParamGroup};

use crate::{
    error::Result,
    registry::{ObjectSpec, Registry},
};

/// Builds optimizers given the amount of parameters they'll update.
pub type OptimizerRegistry = Registry<dyn Optimizer, usize>;

#[derive(Deserialize)]
struct GradientDescentParams {
    lr: f64,
}

#[derive(Deserialize)]
struct MomentumParams {
    lr: f64,
    momentum: f32,
}

impl Registry<dyn Optimizer, usize> {
    /// An optimizer registry holding `gradient_descent` and `gradient_descent_with_momentum`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("optimizer");
        registry.insert("gradient_descent", build_gradient_descent);
        registry.insert("gradient_descent_with_momentum", build_momentum);
        registry
    }
}

fn build_gradient_descent(spec: &ObjectSpec, _: &usize) -> Result<Box<dyn Optimizer>> {
    let params: GradientDescentParams = spec.params()?;
    Ok(Box::new(GradientDescent::new(params.lr)))
}

fn build_momentum(spec: &ObjectSpec, len: &usize) -> Result<Box<dyn Optimizer>> {
    let params: MomentumParams = spec.params()?;
    Ok(Box::new(GradientDescentWithMomentum::new(
        *len,
        params.lr,
        params.momentum,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_builtin_optimizers() {
        let registry = OptimizerRegistry::with_builtins();
        let spec = ObjectSpec::new("gradient_descent_with_momentum")
            .with("lr", 0.1)
            .with("momentum", 0.9);

        let optimizer = registry.build(&spec, &4).unwrap();
        assert_eq!(optimizer.lrs(), [0.1]);
    }
}
