use std::sync::Arc;

use candle_core::{DType, Tensor};
use log::debug;

use crate::config::InputDecl;
use crate::error::{Result, SamplerError};
use crate::noise::NormalSampler;
use crate::plan::UpdatePlan;

/// Differentiable scalar cost over the sampled parameters.
///
/// Implementations capture the parameters (e.g. clones of their `Var`s)
/// and receive the declared external inputs positionally.
pub trait CostFn {
    fn cost(&self, inputs: &[Tensor]) -> candle_core::Result<Tensor>;
}

impl<F> CostFn for F
where
    F: Fn(&[Tensor]) -> candle_core::Result<Tensor>,
{
    fn cost(&self, inputs: &[Tensor]) -> candle_core::Result<Tensor> {
        self(inputs)
    }
}

/// Inputs, cost, and update plan bound into one callable.
pub struct StepFunction {
    inputs: Vec<InputDecl>,
    cost: Arc<dyn CostFn>,
    plan: UpdatePlan,
}

impl StepFunction {
    pub fn compile(inputs: Vec<InputDecl>, cost: Arc<dyn CostFn>, plan: UpdatePlan) -> Self {
        Self { inputs, cost, plan }
    }

    pub fn plan(&self) -> &UpdatePlan {
        &self.plan
    }

    /// Advance every state variable of the plan by one step.
    ///
    /// Returns the cost evaluated at the state before the step. On error
    /// no variable has been written.
    pub fn call(&self, values: &[Tensor], noise: &mut dyn NormalSampler) -> Result<f64> {
        self.check_inputs(values)?;

        let cost = self.cost.cost(values)?;
        if cost.rank() != 0 {
            return Err(SamplerError::config(format!(
                "cost must be a scalar, got shape {:?}",
                cost.dims()
            )));
        }
        let cost_value = cost.to_dtype(DType::F64)?.to_scalar::<f64>()?;
        if !cost_value.is_finite() {
            return Err(SamplerError::NumericDivergence {
                name: "cost".into(),
                quantity: format!("value {}", cost_value),
            });
        }

        let grad_store = cost.backward()?;
        let grads = self
            .plan
            .params()
            .iter()
            .map(|p| match grad_store.get(p.as_tensor()) {
                Some(g) => Ok(g.clone()),
                None => p.as_tensor().zeros_like(),
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let next = self.plan.evaluate(&grads, noise)?;

        for v in next.iter() {
            if !all_finite(&v.value)? {
                let name = self.plan.params()[v.key.param].name().to_string();
                return Err(SamplerError::NumericDivergence {
                    name,
                    quantity: v.key.role.to_string(),
                });
            }
        }

        next.commit()?;
        debug!("step cost: {}", cost_value);
        Ok(cost_value)
    }

    fn check_inputs(&self, values: &[Tensor]) -> Result<()> {
        if values.len() != self.inputs.len() {
            return Err(SamplerError::config(format!(
                "expected {} input values, got {}",
                self.inputs.len(),
                values.len()
            )));
        }
        for (decl, x) in self.inputs.iter().zip(values) {
            if x.rank() != decl.rank {
                return Err(SamplerError::config(format!(
                    "input `{}` must have rank {}, got shape {:?}",
                    decl.name,
                    decl.rank,
                    x.dims()
                )));
            }
        }
        Ok(())
    }
}

/// `x - x` is zero for finite elements and NaN for `inf` or NaN ones.
fn all_finite(x: &Tensor) -> candle_core::Result<bool> {
    let total = (x - x)?.to_dtype(DType::F64)?.sum_all()?.to_scalar::<f64>()?;
    Ok(total == 0.0)
}
