use candle_core::{Result, Shape, Tensor, Var};
use candle_nn::VarMap;

/// A named tensor being sampled.
///
/// The underlying [`Var`] is reference counted, so a clone refers to the
/// same storage. Samplers write new values through this identity and
/// callers read them back through their own clone.
#[derive(Clone, Debug)]
pub struct Param {
    name: Box<str>,
    var: Var,
}

impl Param {
    pub fn new(name: &str, var: Var) -> Self {
        Self {
            name: name.into(),
            var,
        }
    }

    /// Copy `init` into a fresh variable.
    pub fn from_tensor(name: &str, init: &Tensor) -> Result<Self> {
        Ok(Self::new(name, Var::from_tensor(init)?))
    }

    /// Every variable registered in a `VarMap`, ordered by name.
    pub fn from_varmap(varmap: &VarMap) -> Vec<Self> {
        let data = varmap.data().lock().unwrap_or_else(|e| e.into_inner());
        let mut params = data
            .iter()
            .map(|(name, var)| Self::new(name, var.clone()))
            .collect::<Vec<_>>();
        params.sort_by(|a, b| a.name.cmp(&b.name));
        params
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var(&self) -> &Var {
        &self.var
    }

    pub fn as_tensor(&self) -> &Tensor {
        self.var.as_tensor()
    }

    pub fn shape(&self) -> &Shape {
        self.var.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.var.dims()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{Init, VarBuilder};

    #[test]
    fn test_clone_shares_storage() -> Result<()> {
        let theta = Param::from_tensor("theta", &Tensor::zeros((2, 3), DType::F32, &Device::Cpu)?)?;
        let alias = theta.clone();

        theta.var().set(&Tensor::ones((2, 3), DType::F32, &Device::Cpu)?)?;

        let total = alias.as_tensor().sum_all()?.to_scalar::<f32>()?;
        assert_eq!(total, 6.0);
        assert_eq!(alias.dims(), &[2, 3]);
        Ok(())
    }

    #[test]
    fn test_from_varmap_sorted() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        vb.get_with_hints((3, 1), "weight", Init::Const(0.0))?;
        vb.get_with_hints(1, "bias", Init::Const(0.0))?;

        let params = Param::from_varmap(&varmap);
        let names = params.iter().map(|p| p.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["bias", "weight"]);
        assert_eq!(params[1].dims(), &[3, 1]);
        Ok(())
    }
}
