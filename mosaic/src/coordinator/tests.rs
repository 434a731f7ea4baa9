use std::cell::{Cell, RefCell};
use std::time::Duration;

use tokio::time::Instant;

use super::*;
use crate::bitmap::{BitmapDesc, RGB_DEPTH};
use crate::partition::Partition;
use crate::transport::{Completion, Rank, TransportError};

type TransportResult<T> = std::result::Result<T, TransportError>;

struct Reply {
    at_poll: u64,
    slot: usize,
    bytes: Vec<u8>,
}

enum FakeRequest {
    Send,
    Recv,
}

/// Transport whose completions are driven by the poll count.
struct ScriptedTransport {
    size: usize,
    /// Sends complete on this poll. `None` never completes them.
    sends_ready_at: Option<u64>,
    replies: RefCell<Vec<Reply>>,
    polls: Cell<u64>,
    aborted: Cell<Option<i32>>,
    sent: RefCell<Vec<(Rank, Tag, usize)>>,
}

impl ScriptedTransport {
    fn new(workers: usize) -> Self {
        Self {
            size: workers + 1,
            sends_ready_at: None,
            replies: RefCell::new(Vec::new()),
            polls: Cell::new(0),
            aborted: Cell::new(None),
            sent: RefCell::new(Vec::new()),
        }
    }

    fn reply(&self, at_poll: u64, slot: usize, bytes: Vec<u8>) {
        self.replies.borrow_mut().push(Reply {
            at_poll,
            slot,
            bytes,
        });
    }

    fn tick(&self) -> TransportResult<u64> {
        if let Some(code) = self.aborted.get() {
            return Err(TransportError::Aborted { code });
        }
        let now = self.polls.get() + 1;
        self.polls.set(now);
        Ok(now)
    }
}

impl PollingTransport for ScriptedTransport {
    type Request = FakeRequest;

    fn rank(&self) -> Rank {
        0
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_async(
        &self,
        target: Rank,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> TransportResult<FakeRequest> {
        self.sent.borrow_mut().push((target, tag, bytes.len()));
        Ok(FakeRequest::Send)
    }

    fn recv_async(
        &self,
        _source: Rank,
        _tag: Tag,
        _buffer: Vec<u8>,
    ) -> TransportResult<FakeRequest> {
        Ok(FakeRequest::Recv)
    }

    fn poll_all(&self, _requests: &mut [FakeRequest]) -> TransportResult<bool> {
        let now = self.tick()?;
        Ok(self.sends_ready_at.is_some_and(|ready| now >= ready))
    }

    fn poll_any(
        &self,
        requests: &mut [Option<FakeRequest>],
    ) -> TransportResult<Option<Completion>> {
        let now = self.tick()?;
        let mut replies = self.replies.borrow_mut();
        let Some(position) = replies.iter().position(|reply| reply.at_poll <= now) else {
            return Ok(None);
        };

        let reply = replies.remove(position);
        if let Some(slot) = requests.get_mut(reply.slot) {
            assert!(matches!(slot.take(), Some(FakeRequest::Recv)));
        }
        let len = reply.bytes.len();
        Ok(Some(Completion {
            index: reply.slot,
            peer: reply.slot + 1,
            buffer: reply.bytes,
            len,
        }))
    }

    fn abort(&self, code: i32) {
        self.aborted.set(Some(code));
    }
}

fn source(width: u32, height: u32) -> Bitmap {
    let mut bitmap = Bitmap::new_empty(BitmapDesc::new(width, height, RGB_DEPTH).unwrap());
    for y in 0..height {
        for x in 0..width {
            bitmap.set_pixel(x, y, [x as u8, y as u8, 17]);
        }
    }
    bitmap
}

fn split(source: &Bitmap, workers: usize) -> Partition {
    partition::create_tiles(source, workers, Kernel::dimension_for(1)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn distribution_times_out_after_exact_poll_budget() {
    let image = source(8, 40);
    let mut partition = split(&image, 2);
    let transport = ScriptedTransport::new(2);
    let protocol = ProtocolConfig::default();

    let start = Instant::now();
    let result = distribute(&transport, &mut partition.tiles, RGB_DEPTH, &protocol).await;
    let elapsed = start.elapsed();

    assert!(matches!(
        result,
        Err(Error::DistributionTimeout { polls: 150, budget }) if budget == Duration::from_secs(15)
    ));
    assert_eq!(transport.polls.get(), 150);
    assert!(elapsed >= Duration::from_secs(15), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(15_100), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn distribution_sends_five_fields_per_tile() {
    let image = source(8, 40);
    let mut partition = split(&image, 2);
    let sizes: Vec<usize> = partition.tiles.iter().map(|t| t.size).collect();
    let mut transport = ScriptedTransport::new(2);
    transport.sends_ready_at = Some(3);

    let polls = distribute(
        &transport,
        &mut partition.tiles,
        RGB_DEPTH,
        &ProtocolConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(polls, 3);

    let sent = transport.sent.borrow();
    assert_eq!(sent.len(), 2 * PAYLOAD_FIELD_COUNT);
    for (index, chunk) in sent.chunks(PAYLOAD_FIELD_COUNT).enumerate() {
        let worker = index + 1;
        assert_eq!(
            chunk,
            [
                (worker, Tag::Size, 8),
                (worker, Tag::Width, 8),
                (worker, Tag::Height, 8),
                (worker, Tag::Depth, 2),
                (worker, Tag::Data, sizes[index]),
            ]
        );
    }

    assert!(partition.tiles.iter().all(|t| t.pixels().is_empty()));
    assert_eq!(
        partition.tiles.iter().map(|t| t.size).collect::<Vec<_>>(),
        sizes
    );
}

#[tokio::test(start_paused = true)]
async fn distribution_reports_abort() {
    let image = source(8, 40);
    let mut partition = split(&image, 2);
    let transport = ScriptedTransport::new(2);
    PollingTransport::abort(&transport, -1);

    let result = distribute(
        &transport,
        &mut partition.tiles,
        RGB_DEPTH,
        &ProtocolConfig::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(Error::Transport(TransportError::Aborted { code: -1 }))
    ));
}

#[tokio::test(start_paused = true)]
async fn collection_times_out_after_exact_poll_budget() {
    let image = source(8, 40);
    let partition = split(&image, 2);
    let transport = ScriptedTransport::new(2);
    transport.reply(10, 0, partition.tiles[0].pixels().to_vec());
    let mut dest = Bitmap::new_empty(*image.desc());
    let protocol = ProtocolConfig::default();

    let start = Instant::now();
    let result = collect(
        &transport,
        &partition.tiles,
        RGB_DEPTH,
        partition.max_payload,
        &mut dest,
        &protocol,
    )
    .await;
    let elapsed = start.elapsed();

    assert!(matches!(
        result,
        Err(Error::CollectionTimeout {
            outstanding: 1,
            total: 2
        })
    ));
    assert_eq!(transport.polls.get(), 600);
    assert!(elapsed >= Duration::from_secs(60), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(60_100), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn collection_remaps_out_of_order_arrivals() {
    let image = source(8, 60);
    let partition = split(&image, 3);
    let transport = ScriptedTransport::new(3);
    transport.reply(1, 2, partition.tiles[2].pixels().to_vec());
    transport.reply(2, 0, partition.tiles[0].pixels().to_vec());
    transport.reply(5, 1, partition.tiles[1].pixels().to_vec());
    let mut dest = Bitmap::new_empty(*image.desc());

    let polls = collect(
        &transport,
        &partition.tiles,
        RGB_DEPTH,
        partition.max_payload,
        &mut dest,
        &ProtocolConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(polls, 5);
    assert_eq!(dest, image);
}

#[tokio::test(start_paused = true)]
async fn collection_rejects_unknown_slot() {
    let image = source(8, 40);
    let partition = split(&image, 2);
    let transport = ScriptedTransport::new(2);
    transport.reply(1, 5, vec![0; 4]);
    let mut dest = Bitmap::new_empty(*image.desc());

    let result = collect(
        &transport,
        &partition.tiles,
        RGB_DEPTH,
        partition.max_payload,
        &mut dest,
        &ProtocolConfig::default(),
    )
    .await;
    assert!(matches!(result, Err(Error::TileNotFound(6))));
}

#[tokio::test(start_paused = true)]
async fn collection_rejects_wrong_payload_size() {
    let image = source(8, 40);
    let partition = split(&image, 2);
    let transport = ScriptedTransport::new(2);
    let expected = partition.tiles[1].size;
    transport.reply(1, 1, vec![0; expected - 3]);
    let mut dest = Bitmap::new_empty(*image.desc());

    let result = collect(
        &transport,
        &partition.tiles,
        RGB_DEPTH,
        partition.max_payload,
        &mut dest,
        &ProtocolConfig::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(Error::PayloadSizeMismatch { worker: 2, actual, .. }) if actual == expected - 3
    ));
}

#[tokio::test(start_paused = true)]
async fn run_without_workers_fails_before_sending() {
    let image = source(8, 40);
    let transport = ScriptedTransport::new(0);

    let result = run(&transport, &image, 1, &ProtocolConfig::default()).await;
    assert!(matches!(result, Err(Error::NoWorkers)));
    assert!(transport.sent.borrow().is_empty());
    assert_eq!(transport.polls.get(), 0);
}
