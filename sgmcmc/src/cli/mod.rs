pub mod regression;

use clap::{Parser, Subcommand};

pub use regression::{RegressionArgs, SamplerType};

#[derive(Parser)]
#[command(name = "sgmcmc")]
#[command(about = "Stochastic gradient MCMC (SGHMC, SGLD) on simulated models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample Bayesian linear regression coefficients
    Regression(RegressionArgs),
}
