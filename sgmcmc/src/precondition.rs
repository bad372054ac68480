//! Adaptive per-element preconditioner shared by both samplers.
//!
//! For each parameter we keep a decaying visit count `xi` and running
//! first and second moments `g`, `g2` of its gradient:
//!
//! ```text
//! r       = 1 / (xi + 1)
//! g'      = (1 - r) g  + r grad
//! g2'     = (1 - r) g2 + r grad²
//! xi'     = 1 + xi (1 - g² / (g2 + ε))
//! M⁻¹     = 1 / (sqrt(g2 + ε) + ε)
//! ```
//!
//! All right-hand sides read the values from before the step.

use candle_core::{DType, Device, Result, Shape, Tensor, Var};

/// Stabilizer keeping divisions and square roots finite.
pub const PRECONDITION_EPS: f64 = 1e-16;

/// Running gradient statistics of one parameter.
#[derive(Clone, Debug)]
pub struct PreconditionState {
    xi: Var,
    g: Var,
    g2: Var,
}

/// Next statistics and the inverse mass derived from the current ones.
pub struct PreconditionStep {
    pub xi: Tensor,
    pub g: Tensor,
    pub g2: Tensor,
    pub minv: InverseMass,
}

impl PreconditionState {
    /// All three statistics start at one.
    pub fn new(shape: &Shape, dtype: DType, device: &Device) -> Result<Self> {
        Ok(Self {
            xi: Var::ones(shape.clone(), dtype, device)?,
            g: Var::ones(shape.clone(), dtype, device)?,
            g2: Var::ones(shape.clone(), dtype, device)?,
        })
    }

    pub fn xi(&self) -> &Var {
        &self.xi
    }

    pub fn mean(&self) -> &Var {
        &self.g
    }

    pub fn second_moment(&self) -> &Var {
        &self.g2
    }

    pub fn shape(&self) -> &Shape {
        self.xi.shape()
    }

    /// Inverse mass from the current second moment.
    pub fn inverse_mass(&self) -> Result<InverseMass> {
        let minv = ((self.g2.as_tensor() + PRECONDITION_EPS)?.sqrt()? + PRECONDITION_EPS)?.recip()?;
        Ok(InverseMass::Elementwise(minv))
    }

    /// Evaluate one step of the recurrence. Nothing is written.
    pub fn advance(&self, grad: &Tensor) -> Result<PreconditionStep> {
        let xi = self.xi.as_tensor();
        let g = self.g.as_tensor();
        let g2 = self.g2.as_tensor();

        let r = (xi + 1.0)?.recip()?;
        let keep = r.affine(-1.0, 1.0)?;

        let g_next = ((&keep * g)? + (&r * grad)?)?;
        let g2_next = ((&keep * g2)? + (&r * grad.sqr()?)?)?;

        let ratio = (g.sqr()? / (g2 + PRECONDITION_EPS)?)?;
        let xi_next = ((xi * ratio.affine(-1.0, 1.0)?)? + 1.0)?;

        Ok(PreconditionStep {
            xi: xi_next,
            g: g_next,
            g2: g2_next,
            minv: self.inverse_mass()?,
        })
    }
}

/// Per-element rescaling of gradient and noise terms.
#[derive(Clone, Debug)]
pub enum InverseMass {
    Identity,
    Elementwise(Tensor),
}

impl InverseMass {
    /// `M⁻¹ · x`
    pub fn apply(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Self::Identity => Ok(x.clone()),
            Self::Elementwise(minv) => minv * x,
        }
    }

    /// `sqrt(M⁻¹) · x`
    pub fn apply_sqrt(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Self::Identity => Ok(x.clone()),
            Self::Elementwise(minv) => minv.sqrt()? * x,
        }
    }
}
