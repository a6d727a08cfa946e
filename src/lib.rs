//! # Convpipe - Memory-bounded Parallel Convolution
//!
//! Convpipe applies square-kernel convolution filters to RGB images, either
//! one image at a time with a choice of thread partitioning strategies, or
//! as a batch pipeline whose peak memory stays under a configured budget no
//! matter how large the batch is.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use convpipe::prelude::*;
//!
//! // Look up a filter and load an image.
//! let kernel = presets::by_name("gaussian-blur").unwrap();
//! let input = codec::decode("photo.png".as_ref()).unwrap();
//!
//! // Convolve it across 8 threads, one band of rows per thread.
//! let mut output = PlanarImage::new(input.width(), input.height()).unwrap();
//! dispatch(&input, &mut output, &kernel, Strategy::Row, 8).unwrap();
//!
//! codec::encode(&output, "blurred.png".as_ref()).unwrap();
//! ```
//!
//! Batches go through [`pipeline::run_batch`]: reader threads decode, worker
//! threads convolve, writer threads encode, with two weight-bounded queues
//! in between so only a budget's worth of pixels is ever in flight.
//!
//! ## Architecture
//!
//! - [`core`]: planar image buffers and error types
//! - [`kernel`]: kernel construction, composition, and named presets
//! - [`convolve`]: the toroidal convolution core and the parallel dispatcher
//! - [`queue`]: the weight-bounded blocking queue
//! - [`pipeline`]: the reader/worker/writer batch coordinator
//! - [`codec`]: decode/encode and directory listing at the edges

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod convolve;
pub mod core;
pub mod kernel;
pub mod pipeline;
pub mod queue;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use convpipe::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::image::PlanarImage;

    // Errors
    pub use crate::core::error::{
        AllocationError, CodecError, DispatchError, Error, KernelError, PipelineError, Result,
    };

    // Kernels
    pub use crate::kernel::{presets, Kernel};

    // Convolution
    pub use crate::convolve::{apply_sequential, convolve_pixel, dispatch, Strategy};

    // Queueing
    pub use crate::queue::{BoundedQueue, Message, Weighted};

    // Pipeline
    pub use crate::pipeline::{run_batch, BatchReport, PipelineConfig, WorkItem};

    // Codec adapters
    pub use crate::codec;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "convpipe");
    }

    #[test]
    fn test_prelude_end_to_end() {
        let kernel = presets::by_name("fast-blur").unwrap();
        let input = PlanarImage::new(8, 8).unwrap();
        let mut output = PlanarImage::new(8, 8).unwrap();
        dispatch(&input, &mut output, &kernel, Strategy::Row, 2).unwrap();
        assert_eq!(output, input, "blurring black stays black");
    }
}
