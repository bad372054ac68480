use std::sync::Arc;

use candle_core::Tensor;

use crate::config::SamplerConfig;
use crate::dynamics::{Kinetics, SgldKinetics};
use crate::error::{Result, SamplerError};
use crate::noise::NormalSampler;
use crate::param::Param;
use crate::plan::UpdatePlan;
use crate::state::{AuxState, SamplerState};
use crate::step::CostFn;

/// Stochastic gradient Langevin dynamics.
///
/// First-order counterpart of [`crate::SghmcSampler`]: no momentum, the
/// parameter moves along the preconditioned gradient plus Gaussian noise.
pub struct SgldSampler {
    state: SamplerState,
}

impl SgldSampler {
    /// * `precondition` - rescale updates by the adaptive inverse mass
    pub fn new(precondition: bool) -> Self {
        Self {
            state: SamplerState::new(precondition),
        }
    }

    /// Replace the standard normal source (defaults to `DeviceNormal`).
    pub fn with_noise(mut self, noise: impl NormalSampler + 'static) -> Self {
        self.state.set_noise(Box::new(noise));
        self
    }

    /// Build the update plan for `params` under `cost`.
    ///
    /// `mdecay` has no meaning without momentum and is rejected.
    pub fn prepare_updates<C>(
        &mut self,
        cost: C,
        params: Vec<Param>,
        config: &SamplerConfig,
    ) -> Result<&UpdatePlan>
    where
        C: CostFn + 'static,
    {
        if config.mdecay.is_some() {
            return Err(SamplerError::config(
                "SGLD takes the friction coefficient directly; mdecay is not supported",
            ));
        }
        config.validate()?;
        let kinetics = Kinetics::Sgld(SgldKinetics::from_config(config, config.friction));
        self.state.prepare(Arc::new(cost), params, config, kinetics)
    }

    /// Advance all parameters and auxiliary variables by one step.
    ///
    /// Returns the prepared parameters and the cost at the pre-step state.
    pub fn step(&mut self, inputs: &[Tensor]) -> Result<(&[Param], f64)> {
        self.state.step(inputs)
    }

    pub fn plan(&self) -> Option<&UpdatePlan> {
        self.state.plan()
    }

    pub fn auxiliary(&self, name: &str) -> Option<&AuxState> {
        self.state.auxiliary(name)
    }

    pub fn precondition(&self) -> bool {
        self.state.precondition()
    }
}
