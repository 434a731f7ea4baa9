use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use mosaic::{Accumulation, Config};

#[derive(Parser, Debug)]
#[command(
    name = "mosaic",
    version,
    about = "Gaussian blur of a bitmap, split across a fleet of workers"
)]
struct Cli {
    /// Source image (BMP or PNG).
    input: PathBuf,

    /// Destination image. Must not exist unless --overwrite is given.
    output: PathBuf,

    /// Standard deviation of the Gaussian, in pixels.
    stdev: u32,

    /// Number of workers. Defaults to the available parallelism.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Config file (.toml, .yaml, .yml or .json).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base log level; RUST_LOG takes precedence.
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, default_value = "log")]
    log_dir: PathBuf,

    /// Replace an existing output file.
    #[arg(long)]
    overwrite: bool,

    /// Channel accumulation mode: fresh or carry_blue.
    #[arg(long)]
    accumulation: Option<Accumulation>,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if self.workers.is_some() {
            config.workers = self.workers;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(accumulation) = self.accumulation {
            config.accumulation = accumulation;
        }
        config.overwrite_output |= self.overwrite;

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;

    common::log_setup::setup_logging(&config.log_level, &cli.log_dir, "mosaic")?;

    mosaic::blur_file(&cli.input, &cli.output, cli.stdev, &config).with_context(|| {
        format!(
            "Failed to blur {} into {}",
            cli.input.display(),
            cli.output.display()
        )
    })?;

    Ok(())
}
