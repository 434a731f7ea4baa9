use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};

use super::{BlockingTransport, Completion, PollingTransport, Rank, TransportError};
use crate::wire::Tag;

/// (source, target, tag)
type Route = (Rank, Rank, Tag);

#[derive(Debug)]
struct Envelope {
    bytes: Vec<u8>,
    taken: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct Mailboxes {
    queues: HashMap<Route, VecDeque<Envelope>>,
    aborted: Option<i32>,
}

#[derive(Debug)]
struct FabricState {
    size: usize,
    mailboxes: Mutex<Mailboxes>,
    changed: Condvar,
}

/// In-process fleet. Every rank gets an endpoint; messages are matched by
/// source, target and tag in FIFO order.
#[derive(Debug, Clone)]
pub struct LocalFabric {
    state: Arc<FabricState>,
}

#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    rank: Rank,
    state: Arc<FabricState>,
}

#[derive(Debug)]
pub enum LocalRequest {
    Send {
        target: Rank,
        taken: Arc<AtomicBool>,
    },
    Recv {
        source: Rank,
        tag: Tag,
        buffer: Vec<u8>,
        len: Option<usize>,
    },
}

impl Mailboxes {
    fn check_aborted(&self) -> Result<(), TransportError> {
        match self.aborted {
            Some(code) => Err(TransportError::Aborted { code }),
            None => Ok(()),
        }
    }

    fn push(&mut self, route: Route, envelope: Envelope) {
        self.queues.entry(route).or_default().push_back(envelope);
    }

    /// Takes the oldest message on `route`, marking it as taken.
    fn take(&mut self, route: Route, capacity: usize) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(queue) = self.queues.get_mut(&route) else {
            return Ok(None);
        };
        let Some(envelope) = queue.pop_front() else {
            return Ok(None);
        };

        envelope.taken.store(true, Ordering::Release);
        if envelope.bytes.len() > capacity {
            return Err(TransportError::Truncated {
                capacity,
                len: envelope.bytes.len(),
            });
        }

        Ok(Some(envelope.bytes))
    }
}

impl FabricState {
    fn check_rank(&self, rank: Rank) -> Result<(), TransportError> {
        if rank < self.size {
            Ok(())
        } else {
            Err(TransportError::UnknownRank {
                rank,
                size: self.size,
            })
        }
    }

    fn abort(&self, code: i32) {
        let mut mailboxes = self.mailboxes.lock();
        if mailboxes.aborted.is_none() {
            tracing::warn!(code, "aborting fleet");
            mailboxes.aborted = Some(code);
        }
        self.changed.notify_all();
    }

    fn post(&self, route: Route, bytes: Vec<u8>) -> Result<Arc<AtomicBool>, TransportError> {
        let taken = Arc::new(AtomicBool::new(false));
        let mut mailboxes = self.mailboxes.lock();
        mailboxes.check_aborted()?;
        mailboxes.push(
            route,
            Envelope {
                bytes,
                taken: Arc::clone(&taken),
            },
        );
        self.changed.notify_all();

        Ok(taken)
    }
}

impl LocalFabric {
    pub fn new(size: usize) -> Self {
        Self {
            state: Arc::new(FabricState {
                size,
                mailboxes: Mutex::new(Mailboxes::default()),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.state.size
    }

    pub fn endpoint(&self, rank: Rank) -> Result<LocalEndpoint, TransportError> {
        self.state.check_rank(rank)?;
        Ok(LocalEndpoint {
            rank,
            state: Arc::clone(&self.state),
        })
    }

    pub fn abort(&self, code: i32) {
        self.state.abort(code);
    }

    pub fn abort_code(&self) -> Option<i32> {
        self.state.mailboxes.lock().aborted
    }
}

impl LocalEndpoint {
    /// Tries to finish one request. Returns true if it is complete.
    fn progress(
        &self,
        mailboxes: &mut Mailboxes,
        request: &mut LocalRequest,
    ) -> Result<bool, TransportError> {
        match request {
            LocalRequest::Send { taken, .. } => Ok(taken.load(Ordering::Acquire)),
            LocalRequest::Recv { len: Some(_), .. } => Ok(true),
            LocalRequest::Recv {
                source,
                tag,
                buffer,
                len,
            } => {
                let route = (*source, self.rank, *tag);
                match mailboxes.take(route, buffer.len())? {
                    Some(bytes) => {
                        buffer[..bytes.len()].copy_from_slice(&bytes);
                        *len = Some(bytes.len());
                        self.state.changed.notify_all();
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }
}

impl PollingTransport for LocalEndpoint {
    type Request = LocalRequest;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.state.size
    }

    fn send_async(
        &self,
        target: Rank,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<LocalRequest, TransportError> {
        self.state.check_rank(target)?;
        let taken = self.state.post((self.rank, target, tag), bytes)?;

        Ok(LocalRequest::Send { target, taken })
    }

    fn recv_async(
        &self,
        source: Rank,
        tag: Tag,
        buffer: Vec<u8>,
    ) -> Result<LocalRequest, TransportError> {
        self.state.check_rank(source)?;

        Ok(LocalRequest::Recv {
            source,
            tag,
            buffer,
            len: None,
        })
    }

    fn poll_all(&self, requests: &mut [LocalRequest]) -> Result<bool, TransportError> {
        let mut mailboxes = self.state.mailboxes.lock();
        mailboxes.check_aborted()?;

        let mut all_done = true;
        for request in requests.iter_mut() {
            all_done &= self.progress(&mut mailboxes, request)?;
        }

        Ok(all_done)
    }

    fn poll_any(
        &self,
        requests: &mut [Option<LocalRequest>],
    ) -> Result<Option<Completion>, TransportError> {
        let mut mailboxes = self.state.mailboxes.lock();
        mailboxes.check_aborted()?;

        for (index, slot) in requests.iter_mut().enumerate() {
            let Some(request) = slot.as_mut() else {
                continue;
            };
            if !self.progress(&mut mailboxes, request)? {
                continue;
            }

            let completion = match slot.take() {
                Some(LocalRequest::Recv {
                    source,
                    buffer,
                    len,
                    ..
                }) => Completion {
                    index,
                    peer: source,
                    buffer,
                    len: len.unwrap_or_default(),
                },
                Some(LocalRequest::Send { target, .. }) => Completion {
                    index,
                    peer: target,
                    buffer: Vec::new(),
                    len: 0,
                },
                None => continue,
            };

            return Ok(Some(completion));
        }

        Ok(None)
    }

    fn abort(&self, code: i32) {
        self.state.abort(code);
    }
}

impl BlockingTransport for LocalEndpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn send(&self, target: Rank, tag: Tag, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.state.check_rank(target)?;
        let taken = self.state.post((self.rank, target, tag), bytes)?;

        let mut mailboxes = self.state.mailboxes.lock();
        while !taken.load(Ordering::Acquire) {
            mailboxes.check_aborted()?;
            self.state.changed.wait(&mut mailboxes);
        }

        Ok(())
    }

    fn recv(&self, source: Rank, tag: Tag, capacity: usize) -> Result<Vec<u8>, TransportError> {
        self.state.check_rank(source)?;
        let route = (source, self.rank, tag);

        let mut mailboxes = self.state.mailboxes.lock();
        loop {
            mailboxes.check_aborted()?;
            if let Some(bytes) = mailboxes.take(route, capacity)? {
                self.state.changed.notify_all();
                return Ok(bytes);
            }
            self.state.changed.wait(&mut mailboxes);
        }
    }

    fn abort(&self, code: i32) {
        self.state.abort(code);
    }
}
