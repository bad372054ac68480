use crate::error::{Result, SamplerError};

/// One positional external input of the cost, e.g. a minibatch matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDecl {
    pub name: Box<str>,
    /// Expected tensor rank
    pub rank: usize,
}

impl InputDecl {
    pub fn new(name: &str, rank: usize) -> Self {
        Self {
            name: name.into(),
            rank,
        }
    }
}

/// Run-level settings for one `prepare_updates` call.
///
/// The preconditioning flag is fixed when the sampler is constructed and is
/// not part of this struct.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Step size ε (> 0)
    pub epsilon: f64,
    /// Friction coefficient A, ignored when `mdecay` is set
    pub friction: f64,
    /// Minibatch gradient noise scale, usually the number of data points
    pub scale_grad: f64,
    /// Momentum decay; replaces A by `mdecay * sqrt(scale_grad) / epsilon`
    pub mdecay: Option<f64>,
    /// Declared external inputs, matched positionally by `step`
    pub inputs: Vec<InputDecl>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-2,
            friction: 1.0,
            scale_grad: 1.0,
            mdecay: None,
            inputs: vec![],
        }
    }
}

impl SamplerConfig {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            ..Default::default()
        }
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_scale_grad(mut self, scale_grad: f64) -> Self {
        self.scale_grad = scale_grad;
        self
    }

    pub fn with_mdecay(mut self, mdecay: f64) -> Self {
        self.mdecay = Some(mdecay);
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<InputDecl>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Check every hyperparameter, including the derived friction.
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(SamplerError::config(format!(
                "epsilon must be finite and positive, got {}",
                self.epsilon
            )));
        }
        if !(self.scale_grad.is_finite() && self.scale_grad > 0.0) {
            return Err(SamplerError::config(format!(
                "scale_grad must be finite and positive, got {}",
                self.scale_grad
            )));
        }
        self.friction_coefficient().map(|_| ())
    }

    /// The friction coefficient A actually used by the dynamics.
    pub fn friction_coefficient(&self) -> Result<f64> {
        let a = match self.mdecay {
            Some(mdecay) => mdecay * self.scale_grad.sqrt() / self.epsilon,
            None => self.friction,
        };
        if !(a.is_finite() && a > 0.0) {
            return Err(SamplerError::config(format!(
                "friction coefficient must be finite and positive, got {} (mdecay: {:?})",
                a, self.mdecay
            )));
        }
        Ok(a)
    }
}
