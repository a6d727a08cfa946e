//! Core types for the convolution pipeline:
//! - Planar RGB image buffers
//! - Error types

pub mod error;
pub mod image;

// Re-export commonly used types
pub use error::{
    AllocationError, CodecError, DispatchError, Error, KernelError, PipelineError, Result,
};
pub use image::PlanarImage;
