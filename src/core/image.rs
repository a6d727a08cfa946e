//! Planar RGB image buffers.
//!
//! Images are stored as three separate channel planes rather than an
//! interleaved buffer, so the convolution inner loop reads each channel
//! with unit stride. The interleaved form only exists at the codec boundary.

use crate::core::error::AllocationError;

/// An 8-bit-per-channel RGB image split into three planes.
///
/// Invariant: every plane has exactly `width * height` bytes. The
/// constructors enforce this; there is no way to build a `PlanarImage` with
/// mismatched planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarImage {
    width: usize,
    height: usize,
    red: Vec<u8>,
    green: Vec<u8>,
    blue: Vec<u8>,
}

/// Allocate a zeroed plane without aborting on out-of-memory.
fn alloc_plane(len: usize) -> Result<Vec<u8>, AllocationError> {
    let mut plane = Vec::new();
    plane
        .try_reserve_exact(len)
        .map_err(|_| AllocationError {
            what: "image plane",
            bytes: len,
        })?;
    plane.resize(len, 0);
    Ok(plane)
}

impl PlanarImage {
    /// Allocate a zeroed image of the given dimensions.
    ///
    /// All three planes are allocated or none are; a failed allocation
    /// returns [`AllocationError`] with nothing half-built.
    pub fn new(width: usize, height: usize) -> Result<Self, AllocationError> {
        let len = width * height;
        Ok(Self {
            width,
            height,
            red: alloc_plane(len)?,
            green: alloc_plane(len)?,
            blue: alloc_plane(len)?,
        })
    }

    /// Split an interleaved RGB buffer (`r g b r g b ...`) into planes.
    ///
    /// Returns `None` if the buffer length does not match the dimensions.
    pub fn from_interleaved(data: &[u8], width: usize, height: usize) -> Option<Self> {
        let len = width * height;
        if data.len() != len * 3 {
            return None;
        }

        let mut red = Vec::with_capacity(len);
        let mut green = Vec::with_capacity(len);
        let mut blue = Vec::with_capacity(len);
        for px in data.chunks_exact(3) {
            red.push(px[0]);
            green.push(px[1]);
            blue.push(px[2]);
        }

        Some(Self {
            width,
            height,
            red,
            green,
            blue,
        })
    }

    /// Reassemble the planes into an interleaved RGB buffer.
    pub fn to_interleaved(&self) -> Vec<u8> {
        let len = self.width * self.height;
        let mut out = Vec::with_capacity(len * 3);
        for i in 0..len {
            out.push(self.red[i]);
            out.push(self.green[i]);
            out.push(self.blue[i]);
        }
        out
    }

    /// Build an image from three existing planes.
    ///
    /// Returns `None` unless all planes are exactly `width * height` bytes.
    pub fn from_planes(
        width: usize,
        height: usize,
        red: Vec<u8>,
        green: Vec<u8>,
        blue: Vec<u8>,
    ) -> Option<Self> {
        let len = width * height;
        if red.len() != len || green.len() != len || blue.len() != len {
            return None;
        }
        Some(Self {
            width,
            height,
            red,
            green,
            blue,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels per plane.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Memory weight of this image: `width * height * 3` bytes.
    ///
    /// This is the unit the bounded queue accounts in.
    pub fn weight(&self) -> usize {
        self.width * self.height * 3
    }

    /// The red plane.
    pub fn red(&self) -> &[u8] {
        &self.red
    }

    /// The green plane.
    pub fn green(&self) -> &[u8] {
        &self.green
    }

    /// The blue plane.
    pub fn blue(&self) -> &[u8] {
        &self.blue
    }

    pub(crate) fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        (&mut self.red, &mut self.green, &mut self.blue)
    }
}
