//! The convolution core: applying a kernel to image pixels.
//!
//! Neighbor lookups wrap toroidally: a pixel near the border reads from the
//! opposite edge, never from zero padding. The per-pixel routine is pure and
//! stateless, which is what lets the dispatcher run it from arbitrarily many
//! worker threads over disjoint output regions.

pub mod dispatch;

pub use dispatch::{dispatch, Strategy};

use crate::core::PlanarImage;
use crate::kernel::Kernel;

/// Wrap a possibly-negative coordinate into `[0, extent)`.
#[inline]
fn wrap(coord: isize, extent: usize) -> usize {
    coord.rem_euclid(extent as isize) as usize
}

/// Scale, truncate toward zero, clamp to the 8-bit range.
#[inline]
fn quantize(kernel: &Kernel, acc: f64) -> u8 {
    ((kernel.factor() * acc + kernel.bias()) as i64).clamp(0, 255) as u8
}

/// Convolve one output pixel on all three channels.
///
/// Accumulates in `f64`, then truncates toward zero and clamps to `[0, 255]`
/// per channel. Only reads the shared input image and kernel.
#[inline]
pub fn convolve_pixel(input: &PlanarImage, kernel: &Kernel, x: usize, y: usize) -> [u8; 3] {
    let width = input.width();
    let height = input.height();
    let half = (kernel.size() / 2) as isize;

    let mut red = 0.0f64;
    let mut green = 0.0f64;
    let mut blue = 0.0f64;

    for ky in 0..kernel.size() {
        let iy = wrap(y as isize - half + ky as isize, height);
        let row = iy * width;
        for kx in 0..kernel.size() {
            let ix = wrap(x as isize - half + kx as isize, width);
            let weight = kernel.weight(ky, kx);
            let idx = row + ix;

            red += input.red()[idx] as f64 * weight;
            green += input.green()[idx] as f64 * weight;
            blue += input.blue()[idx] as f64 * weight;
        }
    }

    [
        quantize(kernel, red),
        quantize(kernel, green),
        quantize(kernel, blue),
    ]
}

/// Apply a kernel over the whole image on the calling thread.
///
/// This is the correctness baseline every parallel strategy must match
/// byte for byte. `output` must have the same dimensions as `input`;
/// the dispatcher checks this before calling.
pub fn apply_sequential(input: &PlanarImage, output: &mut PlanarImage, kernel: &Kernel) {
    debug_assert_eq!(input.width(), output.width());
    debug_assert_eq!(input.height(), output.height());

    let width = input.width();
    let height = input.height();
    let (red, green, blue) = output.planes_mut();

    for y in 0..height {
        for x in 0..width {
            let [r, g, b] = convolve_pixel(input, kernel, x, y);
            let idx = y * width + x;
            red[idx] = r;
            green[idx] = g;
            blue[idx] = b;
        }
    }
}
