//! Apply a linear transform file to a volume.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use voxform_core::resample::resample_linear;
use voxform_core::{Order, Sampling};
use voxform_io::{load_volume, save_volume, xfm};

#[derive(Parser)]
#[command(name = "resample")]
#[command(about = "Resample a volume through a linear transform")]
struct Cli {
    /// Input volume
    input: PathBuf,

    /// Transform file (linear only)
    transform: PathBuf,

    /// Output volume
    output: PathBuf,

    /// Use this volume's sampling for the output
    #[arg(long)]
    like: Option<PathBuf>,

    /// Interpolation order (0, 1 or 3)
    #[arg(long, default_value_t = 1)]
    order: usize,

    /// Fill value outside the input
    #[arg(long, default_value_t = 0.0)]
    fill: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let src = load_volume(&cli.input)
        .with_context(|| format!("loading {}", cli.input.display()))?;
    let target = match &cli.like {
        Some(path) => {
            let like = load_volume(path)
                .with_context(|| format!("loading sampling volume {}", path.display()))?;
            Sampling::like(&like)
        }
        None => Sampling::like(&src),
    };

    let matrix = xfm::load_linear(&cli.transform)
        .with_context(|| format!("loading transform {}", cli.transform.display()))?;
    let order = Order::from_spline_order(cli.order)?;

    info!(shape = ?src.shape(), target = ?target.shape, "resampling");
    let out = resample_linear(&src, &target, &matrix, order, cli.fill)?;

    save_volume(&cli.output, &out, Some(cli.input.as_path()))
        .with_context(|| format!("saving {}", cli.output.display()))?;
    Ok(())
}
