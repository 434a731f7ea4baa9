//! One blur run: validate, launch a local fleet, run both protocol phases
//! and write the result.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::bitmap::{self, Bitmap};
use crate::config::Config;
use crate::coordinator;
use crate::error::{Error, Result};
use crate::transport::{ABORT_FAIL_CODE, COORDINATOR_RANK, LocalFabric, Rank};
use crate::worker::run_worker;

/// Blurs `input` into `output`. The output file is created before any work
/// starts and is left behind if the run fails.
pub fn blur_file(input: &Path, output: &Path, stdev: u32, config: &Config) -> Result<()> {
    config.validate_args(input, output, stdev)?;

    let format = bitmap::format_for_path(output)?;
    let file = create_output(output, config.overwrite_output)?;
    let source = Bitmap::read_file(input)?;
    info!(input = %input.display(), "loaded {}", source.desc());

    let blurred = blur(&source, stdev, config)?;

    let mut writer = BufWriter::new(file);
    blurred.write_to(&mut writer, format)?;
    writer.flush()?;
    info!(output = %output.display(), "saved result");

    Ok(())
}

/// Runs a fleet of one coordinator and `config.worker_count()` workers over
/// `source`. Any failure aborts the fleet; all worker threads are joined
/// before returning.
pub fn blur(source: &Bitmap, stdev: u32, config: &Config) -> Result<Bitmap> {
    config.protocol.validate()?;
    let workers = config.worker_count()?;
    let fabric = LocalFabric::new(workers + 1);

    let mut handles = Vec::with_capacity(workers);
    let mut result = spawn_workers(&fabric, workers, stdev, config, &mut handles)
        .and_then(|()| run_coordinator(&fabric, source, stdev, config));

    if result.is_err() {
        fabric.abort(ABORT_FAIL_CODE);
    }

    for (rank, handle) in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(rank, "worker stopped: {}", err),
            Err(_) => {
                error!(rank, "worker panicked");
                if result.is_ok() {
                    result = Err(Error::WorkerPanicked(rank));
                }
            }
        }
    }

    result
}

fn spawn_workers(
    fabric: &LocalFabric,
    workers: usize,
    stdev: u32,
    config: &Config,
    handles: &mut Vec<(Rank, JoinHandle<Result<()>>)>,
) -> Result<()> {
    for rank in 1..=workers {
        let endpoint = fabric.endpoint(rank)?;
        let accumulation = config.accumulation;
        let handle = thread::Builder::new()
            .name(format!("worker-{}", rank))
            .spawn(move || run_worker(&endpoint, stdev, accumulation))?;
        handles.push((rank, handle));
    }

    debug!(workers, "fleet started");
    Ok(())
}

fn run_coordinator(
    fabric: &LocalFabric,
    source: &Bitmap,
    stdev: u32,
    config: &Config,
) -> Result<Bitmap> {
    let endpoint = fabric.endpoint(COORDINATOR_RANK)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    runtime.block_on(coordinator::run(&endpoint, source, stdev, &config.protocol))
}

fn create_output(path: &Path, overwrite: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    options.open(path).map_err(|source| {
        error!(path = %path.display(), "cannot create output file: {}", source);
        Error::OutputFile {
            path: path.to_path_buf(),
            source,
        }
    })
}
