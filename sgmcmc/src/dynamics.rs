//! Discretized Langevin transitions.
//!
//! SGHMC (underdamped, with momentum `p`):
//!
//! ```text
//! ε_s    = ε / sqrt(scale_grad)
//! σ      = sqrt(2 ε_s³ M⁻² (A - noise))
//! p'     = p - ε² M⁻¹ grad - ε_s M⁻¹ A p + σ z
//! θ'     = θ + p'
//! ```
//!
//! SGLD (overdamped):
//!
//! ```text
//! σ      = sqrt(2 ε M⁻¹ (A - noise) / scale_grad)
//! θ'     = θ - ε M⁻¹ A grad + σ z
//! ```
//!
//! `noise` is a placeholder for an estimated gradient-noise correction and
//! is held at zero.

use candle_core::{Result, Tensor};

use crate::config::SamplerConfig;
use crate::precondition::InverseMass;

/// Coefficients of one SGHMC step.
#[derive(Clone, Debug, PartialEq)]
pub struct SghmcKinetics {
    pub epsilon: f64,
    pub epsilon_scaled: f64,
    pub friction: f64,
    pub noise_correction: f64,
}

impl SghmcKinetics {
    /// The config must have been validated.
    pub fn from_config(config: &SamplerConfig, friction: f64) -> Self {
        Self {
            epsilon: config.epsilon,
            epsilon_scaled: config.epsilon / config.scale_grad.sqrt(),
            friction,
            noise_correction: 0.0,
        }
    }

    /// sqrt(2 ε_s³ (A - noise)); multiplied by M⁻¹ per element
    fn noise_scale(&self) -> f64 {
        (2.0 * self.epsilon_scaled.powi(3) * (self.friction - self.noise_correction)).sqrt()
    }

    /// Returns `(p', θ')` given a standard normal draw `z`.
    pub fn transition(
        &self,
        theta: &Tensor,
        momentum: &Tensor,
        grad: &Tensor,
        minv: &InverseMass,
        z: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        let sample = minv.apply(&(z * self.noise_scale())?)?;
        let drift = minv.apply(&(grad * self.epsilon.powi(2))?)?;
        let friction = minv.apply(&(momentum * (self.epsilon_scaled * self.friction))?)?;

        let momentum_next = (((momentum - drift)? - friction)? + sample)?;
        let theta_next = (theta + &momentum_next)?;
        Ok((momentum_next, theta_next))
    }
}

/// Coefficients of one SGLD step.
#[derive(Clone, Debug, PartialEq)]
pub struct SgldKinetics {
    pub epsilon: f64,
    pub friction: f64,
    pub scale_grad: f64,
    pub noise_correction: f64,
}

impl SgldKinetics {
    /// The config must have been validated.
    pub fn from_config(config: &SamplerConfig, friction: f64) -> Self {
        Self {
            epsilon: config.epsilon,
            friction,
            scale_grad: config.scale_grad,
            noise_correction: 0.0,
        }
    }

    /// sqrt(2 ε (A - noise) / scale_grad); multiplied by sqrt(M⁻¹) per element
    fn noise_scale(&self) -> f64 {
        (2.0 * self.epsilon * (self.friction - self.noise_correction) / self.scale_grad).sqrt()
    }

    /// Returns `θ'` given a standard normal draw `z`.
    pub fn transition(
        &self,
        theta: &Tensor,
        grad: &Tensor,
        minv: &InverseMass,
        z: &Tensor,
    ) -> Result<Tensor> {
        let sample = minv.apply_sqrt(&(z * self.noise_scale())?)?;
        let drift = minv.apply(&(grad * (self.epsilon * self.friction))?)?;
        (theta - drift)? + sample
    }
}

/// Which dynamics an update plan simulates.
#[derive(Clone, Debug, PartialEq)]
pub enum Kinetics {
    Sghmc(SghmcKinetics),
    Sgld(SgldKinetics),
}

impl Kinetics {
    pub fn uses_momentum(&self) -> bool {
        matches!(self, Self::Sghmc(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sghmc(_) => "SGHMC",
            Self::Sgld(_) => "SGLD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::{DType, Device};

    fn scalar(t: &Tensor) -> Result<f64> {
        t.to_dtype(DType::F64)?.flatten_all()?.to_vec1::<f64>().map(|v| v[0])
    }

    #[test]
    fn test_sghmc_deterministic_step() -> Result<()> {
        let device = Device::Cpu;
        let kinetics = SghmcKinetics::from_config(&SamplerConfig::new(0.01), 1.0);
        assert_abs_diff_eq!(kinetics.epsilon_scaled, 0.01);

        let theta = Tensor::new(&[0.0f64], &device)?;
        let p = Tensor::new(&[0.0f64], &device)?;
        let grad = Tensor::new(&[1.0f64], &device)?;
        let z = Tensor::zeros(1, DType::F64, &device)?;

        let (p_next, theta_next) = kinetics.transition(&theta, &p, &grad, &InverseMass::Identity, &z)?;
        assert_abs_diff_eq!(scalar(&p_next)?, -1e-4, epsilon = 1e-15);
        assert_abs_diff_eq!(scalar(&theta_next)?, -1e-4, epsilon = 1e-15);
        Ok(())
    }

    #[test]
    fn test_sghmc_friction_and_noise_scale() -> Result<()> {
        let device = Device::Cpu;
        let config = SamplerConfig::new(0.1).with_scale_grad(4.0);
        let kinetics = SghmcKinetics::from_config(&config, 2.0);
        assert_abs_diff_eq!(kinetics.epsilon_scaled, 0.05, epsilon = 1e-15);

        let theta = Tensor::new(&[1.0f64], &device)?;
        let p = Tensor::new(&[0.5f64], &device)?;
        let grad = Tensor::new(&[0.0f64], &device)?;
        let z = Tensor::new(&[1.0f64], &device)?;
        let minv = InverseMass::Elementwise(Tensor::new(&[0.5f64], &device)?);

        let (p_next, theta_next) = kinetics.transition(&theta, &p, &grad, &minv, &z)?;

        // p - ε_s M⁻¹ A p + M⁻¹ sqrt(2 ε_s³ A)
        let expected = 0.5 - 0.05 * 0.5 * 2.0 * 0.5 + 0.5 * (2.0 * 0.05f64.powi(3) * 2.0).sqrt();
        assert_abs_diff_eq!(scalar(&p_next)?, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(scalar(&theta_next)?, 1.0 + expected, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_sgld_step() -> Result<()> {
        let device = Device::Cpu;
        let config = SamplerConfig::new(0.02).with_scale_grad(10.0);
        let kinetics = SgldKinetics::from_config(&config, 1.5);

        let theta = Tensor::new(&[1.0f64], &device)?;
        let grad = Tensor::new(&[3.0f64], &device)?;
        let z = Tensor::new(&[-1.0f64], &device)?;
        let minv = InverseMass::Elementwise(Tensor::new(&[0.25f64], &device)?);

        let theta_next = kinetics.transition(&theta, &grad, &minv, &z)?;

        let sigma = (2.0 * 0.02 * 0.25 * 1.5 / 10.0f64).sqrt();
        let expected = 1.0 - 0.02 * 0.25 * 1.5 * 3.0 - sigma;
        assert_abs_diff_eq!(scalar(&theta_next)?, expected, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_zero_gradient_keeps_mean() -> Result<()> {
        let device = Device::Cpu;
        let kinetics = SgldKinetics::from_config(&SamplerConfig::new(0.3), 1.0);
        let theta = Tensor::new(&[0.7f64, -2.0], &device)?;
        let grad = Tensor::zeros(2, DType::F64, &device)?;
        let z = Tensor::zeros(2, DType::F64, &device)?;

        let theta_next = kinetics.transition(&theta, &grad, &InverseMass::Identity, &z)?;
        assert_eq!(theta_next.to_vec1::<f64>()?, vec![0.7, -2.0]);
        assert!(!Kinetics::Sgld(kinetics).uses_momentum());
        Ok(())
    }
}
