//! Message tags and the field encoding of a [`WorkUnit`].
//!
//! A tile travels as five separate messages: size, width, height, depth and
//! pixel data. Wide fields are little-endian `u64`, depth is a little-endian
//! `u16`.

use crate::bitmap::BitmapDesc;
use crate::error::{Error, Result};
use crate::transport::{BlockingTransport, Rank};

/// Number of messages sent per tile.
pub const PAYLOAD_FIELD_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum_macros::Display)]
#[repr(u8)]
pub enum Tag {
    Data = 1,
    Size = 2,
    Height = 3,
    Width = 4,
    Depth = 5,
}

/// One tile as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub size: u64,
    pub width: u64,
    pub height: u64,
    pub depth: u16,
    pub payload: Vec<u8>,
}

pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn encode_u16(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_u64(tag: Tag, bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| Error::MalformedField {
        tag,
        expected: 8,
        actual: bytes.len(),
    })?;
    Ok(u64::from_le_bytes(raw))
}

pub fn decode_u16(tag: Tag, bytes: &[u8]) -> Result<u16> {
    let raw: [u8; 2] = bytes.try_into().map_err(|_| Error::MalformedField {
        tag,
        expected: 2,
        actual: bytes.len(),
    })?;
    Ok(u16::from_le_bytes(raw))
}

impl WorkUnit {
    /// Messages in send order.
    pub fn into_messages(self) -> [(Tag, Vec<u8>); PAYLOAD_FIELD_COUNT] {
        [
            (Tag::Size, encode_u64(self.size)),
            (Tag::Width, encode_u64(self.width)),
            (Tag::Height, encode_u64(self.height)),
            (Tag::Depth, encode_u16(self.depth)),
            (Tag::Data, self.payload),
        ]
    }

    /// Blocking receive of all five fields from `source`, in send order.
    pub fn receive<T: BlockingTransport>(transport: &T, source: Rank) -> Result<WorkUnit> {
        let size = decode_u64(Tag::Size, &transport.recv(source, Tag::Size, 8)?)?;
        let width = decode_u64(Tag::Width, &transport.recv(source, Tag::Width, 8)?)?;
        let height = decode_u64(Tag::Height, &transport.recv(source, Tag::Height, 8)?)?;
        let depth = decode_u16(Tag::Depth, &transport.recv(source, Tag::Depth, 2)?)?;

        let capacity = usize::try_from(size).map_err(|_| Error::FieldOutOfRange {
            tag: Tag::Size,
            value: size,
        })?;
        let payload = transport.recv(source, Tag::Data, capacity)?;

        Ok(WorkUnit {
            size,
            width,
            height,
            depth,
            payload,
        })
    }

    /// Bitmap descriptor described by the header fields. Checks that the
    /// announced size matches both the payload and the dimensions.
    pub fn desc(&self) -> Result<BitmapDesc> {
        let width = u32::try_from(self.width).map_err(|_| Error::FieldOutOfRange {
            tag: Tag::Width,
            value: self.width,
        })?;
        let height = u32::try_from(self.height).map_err(|_| Error::FieldOutOfRange {
            tag: Tag::Height,
            value: self.height,
        })?;
        let desc = BitmapDesc::new(width, height, self.depth)?;

        if self.payload.len() as u64 != self.size || desc.size_in_bytes() as u64 != self.size {
            return Err(Error::BufferSize {
                expected: desc.size_in_bytes(),
                actual: self.payload.len(),
            });
        }

        Ok(desc)
    }
}
