//! Direct (non-separable) 2D convolution of an RGB bitmap.
//!
//! Pixels outside the image contribute nothing: the window is clipped to the
//! image instead of mirrored or clamped, so results darken towards the edges.
//! The sum over the clipped window is still divided by the full-kernel
//! normalization constant.


use serde::{Deserialize, Serialize};

use crate::bitmap::Bitmap;
use crate::kernel::{COLOUR_SCALE, Kernel};

/// How channel accumulators are initialised for each destination pixel.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Accumulation {
    /// Every channel starts from zero.
    #[default]
    Fresh,
    /// Red and green start from zero; blue is never reset and starts from
    /// the previous pixel's normalized value. Blue drifts upwards across the
    /// image; kept for output compatibility with older runs.
    CarryBlue,
}

/// Kernel cells `[start, end)` overlapping the image along one axis when the
/// kernel origin sits on `pos`, and the first image coordinate they cover.
#[inline]
fn window(pos: u32, extent: u32, origin: u32, dimension: u32) -> (u32, u32, u32) {
    let kernel_start = origin.saturating_sub(pos);
    let image_start = pos.saturating_sub(origin);
    let kernel_end = dimension.min(origin + (extent - pos));
    (kernel_start, kernel_end, image_start)
}

#[inline]
fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, u8::MAX as f32) as u8
}

/// Convolves `source` with `kernel` into `dest`, writing every pixel's RGB
/// channels. Alpha in `dest` is left untouched.
///
/// # Panics
/// Panics if the bitmaps differ in dimensions or depth.
pub fn convolve(kernel: &Kernel, source: &Bitmap, dest: &mut Bitmap, accumulation: Accumulation) {
    assert_eq!(source.desc(), dest.desc(), "bitmap descriptor mismatch");

    let width = source.width();
    let height = source.height();
    let dimension = kernel.dimension();
    let origin = kernel.origin();
    let normalization = kernel.normalization();
    let row_bytes = source.desc().row_bytes();
    let pixel_bytes = source.desc().bytes_per_pixel();
    let src = source.bytes();

    let mut blue_carry = 0.0f32;

    for x in 0..width {
        let (kx_start, kx_end, img_x_start) = window(x, width, origin, dimension);

        for y in 0..height {
            let (ky_start, ky_end, img_y_start) = window(y, height, origin, dimension);

            let mut r = 0.0f32;
            let mut g = 0.0f32;
            let mut b = match accumulation {
                Accumulation::Fresh => 0.0f32,
                Accumulation::CarryBlue => blue_carry,
            };

            for (kx, img_x) in (kx_start..kx_end).zip(img_x_start..) {
                let column = img_x as usize * pixel_bytes;
                for (ky, img_y) in (ky_start..ky_end).zip(img_y_start..) {
                    let weight = kernel.weight(kx, ky);
                    let offset = img_y as usize * row_bytes + column;
                    r += src[offset] as f32 * weight;
                    g += src[offset + 1] as f32 * weight;
                    b += src[offset + 2] as f32 * weight;
                }
            }

            r = r / normalization * COLOUR_SCALE as f32;
            g = g / normalization * COLOUR_SCALE as f32;
            b = b / normalization * COLOUR_SCALE as f32;
            blue_carry = b;

            dest.set_pixel(x, y, [to_channel(r), to_channel(g), to_channel(b)]);
        }
    }
}
