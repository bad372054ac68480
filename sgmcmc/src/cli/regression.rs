use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::config::{InputDecl, SamplerConfig};
use crate::noise::SeededNormal;
use crate::param::Param;
use crate::sghmc::SghmcSampler;
use crate::sgld::SgldSampler;
use crate::trace::SampleTrace;

#[derive(Clone, Debug, ValueEnum)]
pub enum SamplerType {
    /// Stochastic gradient Hamiltonian Monte Carlo
    Sghmc,
    /// Stochastic gradient Langevin dynamics
    Sgld,
}

#[derive(Args, Debug)]
pub struct RegressionArgs {
    #[arg(short, long, default_value = "1000", help = "Number of simulated data points")]
    pub n: usize,

    #[arg(short, long, default_value = "5", help = "Number of features")]
    pub p: usize,

    #[arg(long, default_value = "0.5", help = "Observation noise standard deviation")]
    pub noise_sd: f64,

    #[arg(short, long, default_value = "sghmc")]
    pub sampler: SamplerType,

    #[arg(short, long, default_value = "0.01")]
    pub epsilon: f64,

    #[arg(long, help = "Friction coefficient A")]
    pub friction: Option<f64>,

    #[arg(long, help = "Momentum decay (SGHMC only); overrides --friction")]
    pub mdecay: Option<f64>,

    #[arg(long, help = "Adaptive preconditioning")]
    pub precondition: bool,

    #[arg(short, long, default_value = "50")]
    pub batch_size: usize,

    #[arg(long, default_value = "5000")]
    pub iters: usize,

    #[arg(long, default_value = "1000", help = "Steps before draws are recorded")]
    pub warmup: usize,

    #[arg(long, default_value = "5")]
    pub thin: usize,

    #[arg(long, default_value = "42")]
    pub seed: u64,

    #[arg(short, long)]
    pub verbose: bool,
}

/// Simulated regression data `y = X β + σ ε`.
struct Simulated {
    x_np: Tensor,
    y_n1: Tensor,
    beta: Vec<f32>,
}

fn simulate(args: &RegressionArgs, rng: &mut SmallRng, device: &Device) -> Result<Simulated> {
    let (n, p) = (args.n, args.p);
    let mut randn = |m: usize| -> Vec<f32> { (0..m).map(|_| StandardNormal.sample(&mut *rng)).collect() };

    let beta = randn(p);
    let x = randn(n * p);
    let eps = randn(n);

    let y = (0..n)
        .map(|i| {
            let eta = (0..p).map(|j| x[i * p + j] * beta[j]).sum::<f32>();
            eta + args.noise_sd as f32 * eps[i]
        })
        .collect::<Vec<_>>();

    Ok(Simulated {
        x_np: Tensor::from_vec(x, (n, p), device)?,
        y_n1: Tensor::from_vec(y, (n, 1), device)?,
        beta,
    })
}

enum Chain {
    Sghmc(SghmcSampler),
    Sgld(SgldSampler),
}

impl Chain {
    fn step(&mut self, inputs: &[Tensor]) -> crate::Result<(&[Param], f64)> {
        match self {
            Self::Sghmc(s) => s.step(inputs),
            Self::Sgld(s) => s.step(inputs),
        }
    }
}

/// Draw minibatch rows without replacement.
fn minibatch(data: &Simulated, batch_size: usize, rng: &mut SmallRng) -> Result<[Tensor; 2]> {
    let n = data.x_np.dim(0)?;
    let rows = rand::seq::index::sample(rng, n, batch_size.min(n))
        .into_iter()
        .map(|i| i as u32)
        .collect::<Vec<_>>();
    let rows = Tensor::from_vec(rows, batch_size.min(n), data.x_np.device())?;
    Ok([
        data.x_np.index_select(&rows, 0)?,
        data.y_n1.index_select(&rows, 0)?,
    ])
}

fn check_args(args: &RegressionArgs) -> Result<()> {
    if args.thin == 0 {
        anyhow::bail!("--thin must be positive");
    }
    if args.batch_size == 0 {
        anyhow::bail!("--batch-size must be positive");
    }
    Ok(())
}

pub fn run(args: &RegressionArgs) -> Result<()> {
    check_args(args)?;
    let device = Device::Cpu;
    let mut rng = SmallRng::seed_from_u64(args.seed);

    let data = simulate(args, &mut rng, &device)?;
    info!("Simulated {} x {} design, noise sd {}", args.n, args.p, args.noise_sd);

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let beta = vb.get_with_hints((args.p, 1), "beta", Init::Const(0.0))?;
    let params = Param::from_varmap(&varmap);

    // per-datapoint negative log posterior:
    // mean_i (y_i - x_i β)² / 2σ² + |β|² / 2n
    let (n, sigma_sq) = (args.n as f64, args.noise_sd * args.noise_sd);
    let cost = move |inputs: &[Tensor]| -> candle_core::Result<Tensor> {
        let (x_bp, y_b1) = (&inputs[0], &inputs[1]);
        let resid = (y_b1 - x_bp.matmul(&beta)?)?;
        let nll = (resid.sqr()?.mean_all()? / (2.0 * sigma_sq))?;
        let prior = (beta.sqr()?.sum_all()? / (2.0 * n))?;
        nll + prior
    };

    let config = SamplerConfig::new(args.epsilon)
        .with_scale_grad(n)
        .with_inputs(vec![InputDecl::new("x", 2), InputDecl::new("y", 2)]);
    let noise = SeededNormal::new(args.seed.wrapping_add(1));

    let mut chain = match args.sampler {
        SamplerType::Sghmc => {
            let config = match (args.friction, args.mdecay) {
                (_, Some(mdecay)) => config.with_mdecay(mdecay),
                (Some(a), None) => config.with_friction(a),
                (None, None) => config.with_mdecay(0.05),
            };
            let mut sampler = SghmcSampler::new(args.precondition).with_noise(noise);
            sampler.prepare_updates(cost, params, &config)?;
            Chain::Sghmc(sampler)
        }
        SamplerType::Sgld => {
            if args.mdecay.is_some() {
                anyhow::bail!("--mdecay applies to SGHMC only");
            }
            let config = config.with_friction(args.friction.unwrap_or(1.0));
            let mut sampler = SgldSampler::new(args.precondition).with_noise(noise);
            sampler.prepare_updates(cost, params, &config)?;
            Chain::Sgld(sampler)
        }
    };

    let pb = ProgressBar::new(args.iters as u64);
    if args.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut trace = SampleTrace::new();

    for iter in 0..args.iters {
        let batch = minibatch(&data, args.batch_size, &mut rng)?;
        let (params, cost_value) = chain.step(&batch)?;

        if iter >= args.warmup && (iter - args.warmup) % args.thin == 0 {
            trace.record(params, cost_value)?;
        }

        pb.inc(1);
        if args.verbose && (iter % 500 == 0 || iter == args.iters - 1) {
            info!("iter {:5}: cost = {:10.4}", iter, cost_value);
        }
    }
    pb.finish_and_clear();

    if trace.n_samples() < 2 {
        anyhow::bail!("too few recorded draws: increase --iters or lower --warmup");
    }

    let range = trace
        .range("beta")
        .ok_or_else(|| anyhow::anyhow!("beta missing from trace"))?;
    let mean = trace.posterior_mean();
    let var = trace.posterior_variance();
    let lo = trace.quantile(0.05);
    let hi = trace.quantile(0.95);

    info!("{} draws after {} warmup steps", trace.n_samples(), args.warmup);
    for (j, k) in range.enumerate() {
        info!(
            "beta[{}]: true = {:8.4}, mean = {:8.4}, sd = {:8.4}, 90% = [{:8.4}, {:8.4}]",
            j,
            data.beta[j],
            mean[k],
            var[k].sqrt(),
            lo[k],
            hi[k]
        );
    }
    Ok(())
}
