//! Error types for the tile pipeline.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::transport::{Rank, TransportError};
use crate::wire::Tag;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Standard deviation {value} is outside the range {min}-{max} inclusive")]
    StdevOutOfRange { value: u32, min: u32, max: u32 },

    #[error("File name exceeded max file path of {limit}: {path}")]
    PathTooLong { path: PathBuf, limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Output file error for '{path}': {source}")]
    OutputFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Bitmap codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported bit depth {0}, expected 24 or 32")]
    UnsupportedDepth(u16),

    #[error("Pixel buffer of {actual} bytes does not match expected size {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Invalid config value {value} for {field}")]
    InvalidConfig { field: &'static str, value: f64 },

    #[error("At least one worker is required")]
    NoWorkers,

    #[error("Tile height {tile_height} is smaller than kernel size {kernel_size}")]
    TileTooSmall { tile_height: u32, kernel_size: u32 },

    #[error("Sending payload to workers timed out after {polls} polls ({budget:?})")]
    DistributionTimeout { polls: u64, budget: Duration },

    #[error("Receiving processed data timed out for {outstanding}/{total} workers")]
    CollectionTimeout { outstanding: usize, total: usize },

    #[error("Tile id {0} not found")]
    TileNotFound(usize),

    #[error("Worker {worker} returned {actual} bytes, expected {expected}")]
    PayloadSizeMismatch {
        worker: Rank,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed {tag} field: expected {expected} bytes, got {actual}")]
    MalformedField {
        tag: Tag,
        expected: usize,
        actual: usize,
    },

    #[error("{tag} field value {value} is out of range")]
    FieldOutOfRange { tag: Tag, value: u64 },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Worker {0} panicked")]
    WorkerPanicked(Rank),
}

pub type Result<T> = std::result::Result<T, Error>;
