//! Rank-addressed message passing between the coordinator and its workers.
//!
//! Two contracts live here on purpose. The coordinator only ever issues
//! non-blocking operations and polls them ([`PollingTransport`]); a worker
//! receives, computes and sends with plain blocking calls
//! ([`BlockingTransport`]).

mod local;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::wire::Tag;

pub use local::{LocalEndpoint, LocalFabric, LocalRequest};

/// Process identity inside a fleet. The coordinator is rank 0; worker ranks
/// double as tile sequence ids.
pub type Rank = usize;

pub const COORDINATOR_RANK: Rank = 0;

/// Exit code carried by a coordinated abort.
pub const ABORT_FAIL_CODE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Job aborted with code {code}")]
    Aborted { code: i32 },

    #[error("Rank {rank} is not part of a fleet of {size}")]
    UnknownRank { rank: Rank, size: usize },

    #[error("Message of {len} bytes truncated by a {capacity} byte receive buffer")]
    Truncated { capacity: usize, len: usize },
}

/// A finished request returned by [`PollingTransport::poll_any`].
#[derive(Debug)]
pub struct Completion {
    /// Slot of the request in the polled array.
    pub index: usize,
    /// Source of a receive, target of a send.
    pub peer: Rank,
    /// The receive buffer handed to `recv_async`; empty for sends.
    pub buffer: Vec<u8>,
    /// Number of bytes actually received into `buffer`.
    pub len: usize,
}

impl Completion {
    pub fn received(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    pub fn into_received(mut self) -> Vec<u8> {
        self.buffer.truncate(self.len);
        self.buffer
    }
}

/// Non-blocking side used by the coordinator.
pub trait PollingTransport {
    type Request;

    fn rank(&self) -> Rank;

    /// Fleet size including the coordinator.
    fn size(&self) -> usize;

    /// Starts sending `bytes` to `target`. The request completes once the
    /// target has taken the message.
    fn send_async(
        &self,
        target: Rank,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<Self::Request, TransportError>;

    /// Posts a receive from `source` into `buffer`. The buffer's length is the
    /// receive capacity.
    fn recv_async(
        &self,
        source: Rank,
        tag: Tag,
        buffer: Vec<u8>,
    ) -> Result<Self::Request, TransportError>;

    /// Makes progress on every request; true once all of them are complete.
    fn poll_all(&self, requests: &mut [Self::Request]) -> Result<bool, TransportError>;

    /// Completes at most one request. The finished slot is set to `None`.
    fn poll_any(
        &self,
        requests: &mut [Option<Self::Request>],
    ) -> Result<Option<Completion>, TransportError>;

    /// Terminates the whole fleet.
    fn abort(&self, code: i32);
}

/// Blocking side used by workers.
pub trait BlockingTransport {
    fn rank(&self) -> Rank;

    /// Returns once `target` has taken the message.
    fn send(&self, target: Rank, tag: Tag, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Waits for a message from `source` no longer than `capacity` bytes.
    fn recv(&self, source: Rank, tag: Tag, capacity: usize) -> Result<Vec<u8>, TransportError>;

    /// Terminates the whole fleet.
    fn abort(&self, code: i32);
}
