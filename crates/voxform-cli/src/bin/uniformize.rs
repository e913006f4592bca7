//! Re-grid a volume to an isotropic step size.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use voxform_core::resample::uniformize;
use voxform_core::Order;
use voxform_io::{load_volume, save_volume};

#[derive(Parser)]
#[command(name = "uniformize")]
#[command(about = "Re-grid a volume to an isotropic step size")]
struct Cli {
    /// Input volume
    input: PathBuf,

    /// Output volume
    output: PathBuf,

    /// Target isotropic step
    #[arg(long, default_value_t = 1.0)]
    step: f64,

    /// Skip re-gridding when every axis step is already this close
    #[arg(long, default_value_t = 0.1)]
    tolerance: f64,

    /// Interpolation order (0, 1 or 3)
    #[arg(long, default_value_t = 1)]
    order: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let src = load_volume(&cli.input)
        .with_context(|| format!("loading {}", cli.input.display()))?;
    let order = Order::from_spline_order(cli.order)?;

    info!(shape = ?src.shape(), step = cli.step, "uniformizing");
    let out = uniformize(&src, cli.step, cli.tolerance, order, 0.0)?;

    save_volume(&cli.output, &out, Some(cli.input.as_path()))
        .with_context(|| format!("saving {}", cli.output.display()))?;
    Ok(())
}
