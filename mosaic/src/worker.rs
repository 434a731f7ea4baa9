use tracing::{debug, error, info};

use crate::bitmap::Bitmap;
use crate::convolution::{self, Accumulation};
use crate::error::Result;
use crate::kernel::Kernel;
use crate::transport::{ABORT_FAIL_CODE, BlockingTransport, COORDINATOR_RANK};
use crate::wire::{Tag, WorkUnit};

/// Processes exactly one tile: receive it from the coordinator, blur it and
/// send it back. Any failure aborts the whole fleet before it is returned.
pub fn run_worker<T: BlockingTransport>(
    transport: &T,
    stdev: u32,
    accumulation: Accumulation,
) -> Result<()> {
    let result = process_tile(transport, stdev, accumulation);
    if let Err(err) = &result {
        error!(rank = transport.rank(), "worker failed: {}", err);
        transport.abort(ABORT_FAIL_CODE);
    }
    result
}

fn process_tile<T: BlockingTransport>(
    transport: &T,
    stdev: u32,
    accumulation: Accumulation,
) -> Result<()> {
    let rank = transport.rank();
    let unit = WorkUnit::receive(transport, COORDINATOR_RANK)?;
    let desc = unit.desc()?;
    debug!(rank, %desc, "received tile");

    let kernel = Kernel::gaussian(stdev);
    let source = Bitmap::new_with_data(desc, unit.payload)?;
    let mut dest = Bitmap::new_empty(desc);
    convolution::convolve(&kernel, &source, &mut dest, accumulation);

    transport.send(COORDINATOR_RANK, Tag::Data, dest.take_bytes())?;
    info!(rank, "tile processed");

    Ok(())
}
