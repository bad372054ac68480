use candle_core::{DType, Result};

use crate::param::Param;

/// Draws of a set of parameters collected after sampler steps.
///
/// Each draw concatenates the flattened parameters in the order they were
/// recorded; `offsets` marks where each parameter starts.
#[derive(Debug, Default, Clone)]
pub struct SampleTrace {
    names: Vec<Box<str>>,
    offsets: Vec<usize>,
    draws: Vec<Vec<f32>>,
    costs: Vec<f64>,
}

impl SampleTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current parameter values and the step's cost.
    pub fn record(&mut self, params: &[Param], cost: f64) -> Result<()> {
        let mut draw = vec![];
        let mut offsets = Vec::with_capacity(params.len());

        for p in params {
            offsets.push(draw.len());
            let values = p
                .as_tensor()
                .flatten_all()?
                .to_dtype(DType::F32)?
                .to_vec1::<f32>()?;
            draw.extend(values);
        }

        if self.draws.is_empty() {
            self.names = params.iter().map(|p| p.name().into()).collect();
            self.offsets = offsets;
        } else if offsets != self.offsets || self.dim() != draw.len() {
            candle_core::bail!("recorded parameters changed layout");
        }

        self.draws.push(draw);
        self.costs.push(cost);
        Ok(())
    }

    pub fn n_samples(&self) -> usize {
        self.draws.len()
    }

    /// Total number of scalar elements per draw.
    pub fn dim(&self) -> usize {
        self.draws.first().map(|d| d.len()).unwrap_or(0)
    }

    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    /// Element range of the parameter called `name` within a draw.
    pub fn range(&self, name: &str) -> Option<std::ops::Range<usize>> {
        let i = self.names.iter().position(|n| n.as_ref() == name)?;
        let end = self.offsets.get(i + 1).copied().unwrap_or(self.dim());
        Some(self.offsets[i]..end)
    }

    /// Element-wise mean across draws.
    pub fn posterior_mean(&self) -> Vec<f32> {
        self.moments().into_iter().map(|(mean, _)| mean as f32).collect()
    }

    /// Element-wise unbiased variance across draws (empty with fewer than two).
    pub fn posterior_variance(&self) -> Vec<f32> {
        let n = self.n_samples();
        if n < 2 {
            return vec![];
        }
        self.moments()
            .into_iter()
            .map(|(_, m2)| (m2 / (n - 1) as f64) as f32)
            .collect()
    }

    /// Element-wise quantile `q` in [0, 1], linearly interpolated.
    pub fn quantile(&self, q: f32) -> Vec<f32> {
        let n = self.n_samples();
        if n == 0 {
            return vec![];
        }
        let pos = (q.clamp(0.0, 1.0) * (n - 1) as f32) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = (pos - lo as f64) as f32;

        (0..self.dim())
            .map(|j| {
                let mut column = self.draws.iter().map(|d| d[j]).collect::<Vec<_>>();
                column.sort_unstable_by(|a, b| a.total_cmp(b));
                column[lo] * (1.0 - frac) + column[hi] * frac
            })
            .collect()
    }

    /// Welford running (mean, sum of squared deviations) per element.
    fn moments(&self) -> Vec<(f64, f64)> {
        let mut acc = vec![(0.0f64, 0.0f64); self.dim()];
        for (k, draw) in self.draws.iter().enumerate() {
            let n = (k + 1) as f64;
            for ((mean, m2), &x) in acc.iter_mut().zip(draw) {
                let x = x as f64;
                let delta = x - *mean;
                *mean += delta / n;
                *m2 += delta * (x - *mean);
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::{Device, Tensor};

    #[test]
    fn test_record_and_summarize() -> Result<()> {
        let device = Device::Cpu;
        let a = Param::from_tensor("a", &Tensor::new(&[0.0f32, 10.0], &device)?)?;
        let b = Param::from_tensor("b", &Tensor::new(&[[1.0f32]], &device)?)?;
        let mut trace = SampleTrace::new();

        for k in 0..5 {
            let shift = k as f32;
            a.var().set(&Tensor::new(&[shift, 10.0 - shift], &device)?)?;
            b.var().set(&Tensor::new(&[[2.0 * shift]], &device)?)?;
            trace.record(&[a.clone(), b.clone()], -(k as f64))?;
        }

        assert_eq!(trace.n_samples(), 5);
        assert_eq!(trace.dim(), 3);
        assert_eq!(trace.range("b"), Some(2..3));
        assert_eq!(trace.costs()[4], -4.0);

        let mean = trace.posterior_mean();
        assert_abs_diff_eq!(mean[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(mean[1], 8.0, epsilon = 1e-6);
        assert_abs_diff_eq!(mean[2], 4.0, epsilon = 1e-6);

        let var = trace.posterior_variance();
        assert_abs_diff_eq!(var[0], 2.5, epsilon = 1e-6);
        assert_abs_diff_eq!(var[2], 10.0, epsilon = 1e-5);

        let median = trace.quantile(0.5);
        assert_abs_diff_eq!(median[1], 8.0, epsilon = 1e-6);
        let q = trace.quantile(0.125);
        assert_abs_diff_eq!(q[0], 0.5, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_layout_change_rejected() -> Result<()> {
        let device = Device::Cpu;
        let a = Param::from_tensor("a", &Tensor::zeros(2, DType::F32, &device)?)?;
        let b = Param::from_tensor("b", &Tensor::zeros(3, DType::F32, &device)?)?;
        let mut trace = SampleTrace::new();

        trace.record(&[a.clone()], 0.0)?;
        assert!(trace.record(&[b], 0.0).is_err());
        assert!(trace.posterior_variance().is_empty());
        Ok(())
    }
}
