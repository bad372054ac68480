use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use candle_core::Var;
use log::info;

use crate::config::{InputDecl, SamplerConfig};
use crate::dynamics::Kinetics;
use crate::error::{Result, SamplerError};
use crate::noise::{DeviceNormal, NormalSampler};
use crate::param::Param;
use crate::plan::{ParamTerm, UpdatePlan};
use crate::precondition::PreconditionState;
use crate::step::{CostFn, StepFunction};

/// Auxiliary variables a sampler keeps for one parameter.
#[derive(Clone, Debug)]
pub struct AuxState {
    precondition: PreconditionState,
    momentum: Option<Var>,
}

impl AuxState {
    pub fn xi(&self) -> &Var {
        self.precondition.xi()
    }

    pub fn mean(&self) -> &Var {
        self.precondition.mean()
    }

    pub fn second_moment(&self) -> &Var {
        self.precondition.second_moment()
    }

    pub fn momentum(&self) -> Option<&Var> {
        self.momentum.as_ref()
    }

    pub fn dims(&self) -> &[usize] {
        self.precondition.shape().dims()
    }
}

/// Configuration, auxiliary state, and the cached step function shared by
/// both samplers.
pub struct SamplerState {
    precondition: bool,
    noise: Box<dyn NormalSampler>,
    aux: HashMap<Box<str>, AuxState>,
    plan: Option<UpdatePlan>,
    cost: Option<Arc<dyn CostFn>>,
    inputs: Vec<InputDecl>,
    step_fn: Option<StepFunction>,
}

impl SamplerState {
    pub fn new(precondition: bool) -> Self {
        Self {
            precondition,
            noise: Box::new(DeviceNormal),
            aux: HashMap::new(),
            plan: None,
            cost: None,
            inputs: vec![],
            step_fn: None,
        }
    }

    pub fn set_noise(&mut self, noise: Box<dyn NormalSampler>) {
        self.noise = noise;
    }

    pub fn precondition(&self) -> bool {
        self.precondition
    }

    pub fn plan(&self) -> Option<&UpdatePlan> {
        self.plan.as_ref()
    }

    pub fn auxiliary(&self, name: &str) -> Option<&AuxState> {
        self.aux.get(name)
    }

    pub fn is_compiled(&self) -> bool {
        self.step_fn.is_some()
    }

    /// Build and keep a new update plan, replacing any previous one.
    ///
    /// Auxiliary state is allocated the first time a parameter name is
    /// seen and reused afterwards.
    pub fn prepare(
        &mut self,
        cost: Arc<dyn CostFn>,
        params: Vec<Param>,
        config: &SamplerConfig,
        kinetics: Kinetics,
    ) -> Result<&UpdatePlan> {
        check_distinct(&params)?;

        let precondition = self.precondition;
        let mut terms = Vec::with_capacity(params.len());

        for param in params {
            let aux = self.aux_for(&param, kinetics.uses_momentum())?;
            terms.push(ParamTerm {
                precondition: precondition.then(|| aux.precondition.clone()),
                momentum: if kinetics.uses_momentum() {
                    aux.momentum.clone()
                } else {
                    None
                },
                param,
            });
        }

        let plan = UpdatePlan::build(terms, kinetics);

        info!(
            "{} update plan: {} parameters, {} assignments (precondition: {})",
            plan.kinetics().name(),
            plan.params().len(),
            plan.len(),
            self.precondition
        );

        self.cost = Some(cost);
        self.inputs = config.inputs.clone();
        self.step_fn = None;
        Ok(self.plan.insert(plan))
    }

    /// Run the compiled step function, compiling it on the first call.
    pub fn step(&mut self, values: &[candle_core::Tensor]) -> Result<(&[Param], f64)> {
        let Some(plan) = &self.plan else {
            return Err(SamplerError::InvalidState(
                "step() called without a prior call to prepare_updates()".into(),
            ));
        };

        if self.step_fn.is_none() {
            let cost = self
                .cost
                .clone()
                .ok_or_else(|| SamplerError::InvalidState("update plan has no cost".into()))?;
            info!("... compiling {} step function", plan.kinetics().name());
            self.step_fn = Some(StepFunction::compile(self.inputs.clone(), cost, plan.clone()));
        }

        let step_fn = self
            .step_fn
            .as_ref()
            .ok_or_else(|| SamplerError::InvalidState("step function missing".into()))?;
        let cost = step_fn.call(values, self.noise.as_mut())?;
        Ok((step_fn.plan().params(), cost))
    }

    fn aux_for(&mut self, param: &Param, with_momentum: bool) -> Result<&AuxState> {
        let tensor = param.as_tensor();

        if let Some(aux) = self.aux.get(param.name()) {
            if aux.dims() != param.dims() {
                return Err(SamplerError::ShapeMismatch {
                    name: param.name().to_string(),
                    expected: aux.dims().to_vec(),
                    actual: param.dims().to_vec(),
                });
            }
            if aux.xi().dtype() != tensor.dtype() {
                return Err(SamplerError::config(format!(
                    "`{}` changed dtype from {:?} to {:?}",
                    param.name(),
                    aux.xi().dtype(),
                    tensor.dtype()
                )));
            }
        }

        let aux = match self.aux.entry(param.name().into()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(AuxState {
                precondition: PreconditionState::new(tensor.shape(), tensor.dtype(), tensor.device())?,
                momentum: None,
            }),
        };

        if with_momentum && aux.momentum.is_none() {
            aux.momentum = Some(Var::zeros(tensor.shape().clone(), tensor.dtype(), tensor.device())?);
        }
        Ok(aux)
    }
}

fn check_distinct(params: &[Param]) -> Result<()> {
    if params.is_empty() {
        return Err(SamplerError::config("parameter list is empty"));
    }
    let mut names = HashSet::new();
    let mut ids = HashSet::new();
    for p in params {
        if !names.insert(p.name()) {
            return Err(SamplerError::config(format!(
                "parameter `{}` appears more than once",
                p.name()
            )));
        }
        if !ids.insert(p.as_tensor().id()) {
            return Err(SamplerError::config(format!(
                "parameter `{}` shares its variable with another parameter",
                p.name()
            )));
        }
    }
    Ok(())
}
