//! Error types for convpipe.
//!
//! Uses thiserror for structured errors. Each area of the crate has its own
//! enum; the top-level [`Error`] ties them together for callers that cross
//! area boundaries (the pipeline, the CLI).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A buffer (image plane, kernel matrix) could not be allocated.
///
/// Construction is all-or-nothing: on failure nothing partially built is
/// handed back, only this error.
#[derive(Error, Debug)]
#[error("failed to allocate {bytes} bytes for {what}")]
pub struct AllocationError {
    /// What was being allocated.
    pub what: &'static str,
    /// Requested size in bytes.
    pub bytes: usize,
}

/// Errors from kernel construction and composition.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("kernel size must be odd and at least 1, got {0}")]
    InvalidSize(usize),

    #[error("kernel of size {size} needs {expected} weights, got {got}")]
    WeightCount {
        size: usize,
        expected: usize,
        got: usize,
    },

    #[error("unknown filter preset '{0}'")]
    UnknownPreset(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Errors from the parallel dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("thread count must be at least 1, got {0}")]
    InvalidThreadCount(usize),

    #[error("block dimensions must be at least 1x1, got {width}x{height}")]
    InvalidBlockSize { width: usize, height: usize },

    #[error("output image is {got_width}x{got_height}, input is {want_width}x{want_height}")]
    DimensionMismatch {
        want_width: usize,
        want_height: usize,
        got_width: usize,
        got_height: usize,
    },

    #[error("failed to start worker thread: {0}")]
    ThreadStart(#[source] io::Error),
}

/// Errors from the decode/encode adapters.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to encode '{path}': {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("interleaved buffer does not match {width}x{height} RGB layout")]
    PlaneLayout { width: usize, height: usize },
}

/// Errors from pipeline startup and configuration.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to start {stage} thread: {source}")]
    ThreadStart {
        stage: &'static str,
        source: io::Error,
    },

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Top-level error type for convpipe.
#[derive(Error, Debug)]
pub enum Error {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for convpipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for kernel operations.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Result type alias for dispatcher operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
