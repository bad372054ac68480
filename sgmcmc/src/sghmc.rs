use std::sync::Arc;

use candle_core::Tensor;
use log::info;

use crate::config::SamplerConfig;
use crate::dynamics::{Kinetics, SghmcKinetics};
use crate::error::Result;
use crate::noise::NormalSampler;
use crate::param::Param;
use crate::plan::UpdatePlan;
use crate::state::{AuxState, SamplerState};
use crate::step::CostFn;

/// Stochastic gradient Hamiltonian Monte Carlo.
///
/// Simulates underdamped Langevin dynamics with a momentum variable per
/// parameter and friction A that dissipates the energy injected by
/// minibatch gradient noise.
pub struct SghmcSampler {
    state: SamplerState,
}

impl SghmcSampler {
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
    /// If `config.mdecay` is set, the friction becomes
    /// `mdecay * sqrt(scale_grad) / epsilon`.
    pub fn prepare_updates<C>(
        &mut self,
        cost: C,
        params: Vec<Param>,
        config: &SamplerConfig,
    ) -> Result<&UpdatePlan>
    where
        C: CostFn + 'static,
    {
        config.validate()?;
        let friction = config.friction_coefficient()?;
        if let Some(mdecay) = config.mdecay {
            info!(
                "You specified mdecay of {} -> changing A to {}",
                mdecay, friction
            );
        }
        let kinetics = Kinetics::Sghmc(SghmcKinetics::from_config(config, friction));
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
