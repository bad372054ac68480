//! Stochastic gradient MCMC samplers on candle tensors.
//!
//! Two samplers share one preconditioning recurrence:
//!
//! - [`SghmcSampler`]: underdamped (momentum) Langevin dynamics with friction
//! - [`SgldSampler`]: overdamped Langevin dynamics
//!
//! # Example
//!
//! ```ignore
//! use sgmcmc::{Param, SamplerConfig, SghmcSampler};
//!
//! let theta = Param::from_tensor("theta", &init)?;
//! let t = theta.clone();
//! let cost = move |inputs: &[Tensor]| {
//!     // per-datapoint negative log posterior over the minibatch in inputs[0]
//! };
//!
//! let mut sampler = SghmcSampler::new(true);
//! let config = SamplerConfig::new(1e-2).with_scale_grad(n as f64).with_inputs(decls);
//! sampler.prepare_updates(cost, vec![theta], &config)?;
//!
//! for batch in batches {
//!     let (params, nll) = sampler.step(&[batch])?;
//! }
//! ```

pub mod cli;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod noise;
pub mod param;
pub mod plan;
pub mod precondition;
pub mod sghmc;
pub mod sgld;
pub mod state;
pub mod step;
pub mod trace;

pub use config::{InputDecl, SamplerConfig};
pub use error::{Result, SamplerError};
pub use noise::{DeviceNormal, NormalSampler, SeededNormal, ZeroNoise};
pub use param::Param;
pub use plan::{StateKey, StateRole, UpdatePlan};
pub use sghmc::SghmcSampler;
pub use sgld::SgldSampler;
pub use step::CostFn;
pub use trace::SampleTrace;

pub use candle_core;
pub use candle_nn;
