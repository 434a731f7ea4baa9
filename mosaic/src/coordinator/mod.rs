//! Coordinator side of the tile protocol.
//!
//! Both phases issue every transfer up front and then poll once per
//! interval until the work is done or the poll budget runs out. Nothing
//! here blocks on the transport, so a stalled worker can only cost the
//! configured timeout.

#[cfg(test)]
mod tests;

use tracing::{debug, error, info};

use crate::bitmap::Bitmap;
use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::partition::{self, Tile};
use crate::transport::PollingTransport;
use crate::wire::{PAYLOAD_FIELD_COUNT, Tag, WorkUnit};

/// Blurs `source` using every other rank of the transport as a worker.
/// Returns the reassembled image.
pub async fn run<T: PollingTransport>(
    transport: &T,
    source: &Bitmap,
    stdev: u32,
    protocol: &ProtocolConfig,
) -> Result<Bitmap> {
    let workers = transport.size().saturating_sub(1);
    let kernel_size = Kernel::dimension_for(stdev);

    let mut partition = partition::create_tiles(source, workers, kernel_size)?;
    info!(
        workers,
        kernel_size,
        overlap = partition.overlap,
        "distributing {}",
        source.desc()
    );

    distribute(transport, &mut partition.tiles, source.depth(), protocol).await?;

    let mut dest = Bitmap::new_empty(*source.desc());
    collect(
        transport,
        &partition.tiles,
        source.depth(),
        partition.max_payload,
        &mut dest,
        protocol,
    )
    .await?;

    Ok(dest)
}

/// Sends every tile to the worker with the tile's id and waits until all
/// sends have completed. Pixel buffers are moved out of `tiles`.
///
/// Returns the number of polls it took.
pub async fn distribute<T: PollingTransport>(
    transport: &T,
    tiles: &mut [Tile],
    depth: u16,
    protocol: &ProtocolConfig,
) -> Result<u64> {
    let mut requests = Vec::with_capacity(tiles.len() * PAYLOAD_FIELD_COUNT);
    for tile in tiles.iter_mut() {
        debug!(worker = tile.id, rows = ?tile.rows, "sending payload");

        let unit = WorkUnit {
            size: tile.size as u64,
            width: tile.width as u64,
            height: tile.height() as u64,
            depth,
            payload: tile.take_pixels(),
        };
        for (tag, bytes) in unit.into_messages() {
            requests.push(transport.send_async(tile.id, tag, bytes)?);
        }
    }

    let budget = protocol.distribution_timeout();
    let interval = protocol.poll_interval();
    let max_polls = protocol.max_polls(budget);

    for poll in 1..=max_polls {
        tokio::time::sleep(interval).await;
        if transport.poll_all(&mut requests)? {
            info!(polls = poll, "all workers took their payload");
            return Ok(poll);
        }
    }

    error!(polls = max_polls, ?budget, "sending payload to workers timed out");
    Err(Error::DistributionTimeout {
        polls: max_polls,
        budget,
    })
}

/// Receives one processed tile per worker and remaps each into `dest` as it
/// arrives. Completions may come in any order.
///
/// Returns the number of polls it took.
pub async fn collect<T: PollingTransport>(
    transport: &T,
    tiles: &[Tile],
    depth: u16,
    max_payload: usize,
    dest: &mut Bitmap,
    protocol: &ProtocolConfig,
) -> Result<u64> {
    let total = tiles.len();
    let mut requests = tiles
        .iter()
        .map(|tile| {
            transport
                .recv_async(tile.id, Tag::Data, vec![0; max_payload])
                .map(Some)
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let interval = protocol.poll_interval();
    let max_polls = protocol.max_polls(protocol.collection_timeout());
    let mut complete = 0;
    let mut polls = 0;

    while complete < total {
        if polls == max_polls {
            let outstanding = total - complete;
            error!("{}/{} workers unresponsive", outstanding, total);
            return Err(Error::CollectionTimeout { outstanding, total });
        }

        tokio::time::sleep(interval).await;
        polls += 1;

        let Some(completion) = transport.poll_any(&mut requests)? else {
            continue;
        };

        let worker = completion.index + 1;
        let Some(tile) = partition::tile_for(tiles, worker) else {
            error!(worker, "no tile for completed receive");
            return Err(Error::TileNotFound(worker));
        };
        if completion.len != tile.size {
            error!(
                worker,
                expected = tile.size,
                actual = completion.len,
                "processed tile has the wrong size"
            );
            return Err(Error::PayloadSizeMismatch {
                worker,
                expected: tile.size,
                actual: completion.len,
            });
        }

        let section = Bitmap::new_with_data(tile.desc(depth)?, completion.into_received())?;
        partition::remap(tile, &section, dest);

        complete += 1;
        info!("processed {}/{} workers", complete, total);
    }

    Ok(polls)
}
