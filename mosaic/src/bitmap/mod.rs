//! Packed RGB/RGBA raster buffer and its file codec.
//!
//! The pipeline only ever looks at raw RGB triples; encoding and decoding is
//! delegated to the `image` crate.


use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::ops::Range;
use std::path::Path;

use image::{ExtendedColorType, ImageFormat, ImageReader};

use crate::error::{Error, Result};

pub const RGB_DEPTH: u16 = 24;
pub const RGBA_DEPTH: u16 = 32;

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct BitmapDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    desc: BitmapDesc,
    bytes: Vec<u8>,
}

impl BitmapDesc {
    pub fn new(width: u32, height: u32, depth: u16) -> Result<Self> {
        match depth {
            RGB_DEPTH | RGBA_DEPTH => Ok(Self {
                width,
                height,
                depth,
            }),
            _ => Err(Error::UnsupportedDepth(depth)),
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.depth as usize / 8
    }

    /// Bytes per row. Rows are tightly packed.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.height as usize * self.row_bytes()
    }

    fn color_type(&self) -> ExtendedColorType {
        if self.depth == RGBA_DEPTH {
            ExtendedColorType::Rgba8
        } else {
            ExtendedColorType::Rgb8
        }
    }
}

/// Output format implied by the extension of `path`.
pub fn format_for_path<P: AsRef<Path>>(path: P) -> Result<ImageFormat> {
    let format = ImageFormat::from_path(path)?;
    check_format(format)?;
    Ok(format)
}

fn check_format(format: ImageFormat) -> Result<()> {
    match format {
        ImageFormat::Bmp | ImageFormat::Png => Ok(()),
        _ => Err(Error::UnsupportedFormat(format!("{:?}", format))),
    }
}

impl std::fmt::Display for BitmapDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {}bpp", self.width, self.height, self.depth)
    }
}

impl Bitmap {
    pub fn new_empty(desc: BitmapDesc) -> Bitmap {
        let mut bytes = vec![0; desc.size_in_bytes()];
        if desc.depth == RGBA_DEPTH {
            bytes.chunks_exact_mut(4).for_each(|pixel| pixel[3] = u8::MAX);
        }

        Bitmap { desc, bytes }
    }

    pub fn new_with_data(desc: BitmapDesc, bytes: Vec<u8>) -> Result<Bitmap> {
        if bytes.len() != desc.size_in_bytes() {
            return Err(Error::BufferSize {
                expected: desc.size_in_bytes(),
                actual: bytes.len(),
            });
        }

        Ok(Bitmap { desc, bytes })
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Bitmap> {
        let decoded = ImageReader::open(path)?.with_guessed_format()?.decode()?;

        let (depth, width, height, bytes) = if decoded.color().has_alpha() {
            let rgba = decoded.to_rgba8();
            (RGBA_DEPTH, rgba.width(), rgba.height(), rgba.into_raw())
        } else {
            let rgb = decoded.to_rgb8();
            (RGB_DEPTH, rgb.width(), rgb.height(), rgb.into_raw())
        };

        Bitmap::new_with_data(BitmapDesc::new(width, height, depth)?, bytes)
    }

    /// Encodes into `writer`. BMP and PNG are the enabled formats.
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W, format: ImageFormat) -> Result<()> {
        check_format(format)?;

        image::write_buffer_with_format(
            writer,
            &self.bytes,
            self.desc.width,
            self.desc.height,
            self.desc.color_type(),
            format,
        )?;

        Ok(())
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let format = format_for_path(&path)?;
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer, format)?;
        writer.flush()?;

        Ok(())
    }

    pub fn desc(&self) -> &BitmapDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn depth(&self) -> u16 {
        self.desc.depth
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn take_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the red, green and blue channels at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = self.offset(x, y);
        [
            self.bytes[offset],
            self.bytes[offset + 1],
            self.bytes[offset + 2],
        ]
    }

    /// Writes the red, green and blue channels at `(x, y)`. Alpha is left as is.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let offset = self.offset(x, y);
        self.bytes[offset..offset + 3].copy_from_slice(&rgb);
    }

    pub fn row(&self, y: u32) -> &[u8] {
        self.rows(y..y + 1)
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let row_bytes = self.desc.row_bytes();
        let start = y as usize * row_bytes;
        &mut self.bytes[start..start + row_bytes]
    }

    /// Contiguous bytes of the rows in `range`.
    pub fn rows(&self, range: Range<u32>) -> &[u8] {
        assert!(range.end <= self.desc.height, "row range out of bounds");
        let row_bytes = self.desc.row_bytes();
        &self.bytes[range.start as usize * row_bytes..range.end as usize * row_bytes]
    }

    pub fn rows_mut(&mut self, range: Range<u32>) -> &mut [u8] {
        assert!(range.end <= self.desc.height, "row range out of bounds");
        let row_bytes = self.desc.row_bytes();
        &mut self.bytes[range.start as usize * row_bytes..range.end as usize * row_bytes]
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.desc.width && y < self.desc.height);
        y as usize * self.desc.row_bytes() + x as usize * self.desc.bytes_per_pixel()
    }
}
