use candle_core::{DType, Device, Result, Shape, Tensor};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Source of standard normal draws injected into the dynamics.
pub trait NormalSampler {
    /// Draw a tensor of i.i.d. N(0, 1) values.
    fn standard_normal(&mut self, shape: &Shape, dtype: DType, device: &Device) -> Result<Tensor>;
}

/// Draws on the parameter's device with `Tensor::randn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceNormal;

impl NormalSampler for DeviceNormal {
    fn standard_normal(&mut self, shape: &Shape, dtype: DType, device: &Device) -> Result<Tensor> {
        match dtype {
            DType::F64 => Tensor::randn(0f64, 1f64, shape.clone(), device),
            _ => Tensor::randn(0f32, 1f32, shape.clone(), device)?.to_dtype(dtype),
        }
    }
}

/// Reproducible host-side draws from a seeded `SmallRng`.
pub struct SeededNormal {
    rng: SmallRng,
}

impl SeededNormal {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl NormalSampler for SeededNormal {
    fn standard_normal(&mut self, shape: &Shape, dtype: DType, device: &Device) -> Result<Tensor> {
        let z = (0..shape.elem_count())
            .map(|_| StandardNormal.sample(&mut self.rng))
            .collect::<Vec<f32>>();
        Tensor::from_vec(z, shape.clone(), device)?.to_dtype(dtype)
    }
}

/// Always zero: turns both samplers into deterministic recurrences.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroNoise;

impl NormalSampler for ZeroNoise {
    fn standard_normal(&mut self, shape: &Shape, dtype: DType, device: &Device) -> Result<Tensor> {
        Tensor::zeros(shape.clone(), dtype, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_reproducible() -> Result<()> {
        let shape = Shape::from((4, 5));
        let a = SeededNormal::new(17).standard_normal(&shape, DType::F32, &Device::Cpu)?;
        let b = SeededNormal::new(17).standard_normal(&shape, DType::F32, &Device::Cpu)?;

        assert_eq!(a.dims(), &[4, 5]);
        assert_eq!(a.flatten_all()?.to_vec1::<f32>()?, b.flatten_all()?.to_vec1::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_seeded_moments() -> Result<()> {
        let shape = Shape::from(20_000);
        let z = SeededNormal::new(3).standard_normal(&shape, DType::F64, &Device::Cpu)?;
        let mean = z.mean_all()?.to_scalar::<f64>()?;
        let var = z.sqr()?.mean_all()?.to_scalar::<f64>()? - mean * mean;

        assert!(mean.abs() < 0.05, "mean: {}", mean);
        assert!((var - 1.0).abs() < 0.05, "var: {}", var);
        Ok(())
    }

    #[test]
    fn test_device_normal_keeps_f64_precision() -> Result<()> {
        let z = DeviceNormal.standard_normal(&Shape::from(64), DType::F64, &Device::Cpu)?;
        assert_eq!(z.dtype(), DType::F64);
        let z = z.to_vec1::<f64>()?;
        assert!(z.iter().any(|&v| v as f32 as f64 != v));
        Ok(())
    }

    #[test]
    fn test_zero_noise() -> Result<()> {
        let z = ZeroNoise.standard_normal(&Shape::from((2, 2)), DType::F32, &Device::Cpu)?;
        assert_eq!(z.sum_all()?.to_scalar::<f32>()?, 0.0);
        Ok(())
    }
}
