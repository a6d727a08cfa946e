//! Work partitioning across threads.
//!
//! Every parallel strategy is expressed as a grid of rectangular output
//! blocks plus a rule for handing block indexes to threads: a pixel is a 1x1
//! block, a row is a `width`x1 block, and so on. Workers write disjoint
//! blocks of the output, so they share raw plane pointers without locking
//! and the scope joins them all before the output is touched again.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use log::debug;

use crate::core::error::{DispatchError, DispatchResult};
use crate::core::PlanarImage;
use crate::kernel::Kernel;

use super::{apply_sequential, convolve_pixel};

/// How output pixels are divided among worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Whole image on the calling thread.
    Sequential,
    /// Contiguous runs of individual pixels per thread.
    Pixel,
    /// Contiguous bands of rows per thread.
    Row,
    /// Contiguous bands of columns per thread.
    Column,
    /// A threads-by-threads grid of rectangles, dealt round-robin.
    Block,
    /// Fixed-size tiles claimed from a shared counter as threads free up.
    DynamicBlock {
        block_width: usize,
        block_height: usize,
    },
}

impl Strategy {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Pixel => "pixel",
            Strategy::Row => "row",
            Strategy::Column => "column",
            Strategy::Block => "block",
            Strategy::DynamicBlock { .. } => "dynamic-block",
        }
    }
}

/// A rectangle of output pixels, half-open on both axes.
#[derive(Debug, Clone, Copy)]
struct BlockRect {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

/// The image cut into a grid of blocks, indexed left-to-right, top-to-bottom.
/// Edge blocks are clipped to the image bounds.
struct BlockGrid {
    width: usize,
    height: usize,
    block_width: usize,
    block_height: usize,
    cols: usize,
    rows: usize,
}

impl BlockGrid {
    fn new(width: usize, height: usize, block_width: usize, block_height: usize) -> Self {
        let cols = (width + block_width - 1) / block_width;
        let rows = (height + block_height - 1) / block_height;
        Self {
            width,
            height,
            block_width,
            block_height,
            cols,
            rows,
        }
    }

    fn len(&self) -> usize {
        self.cols * self.rows
    }

    fn rect(&self, index: usize) -> BlockRect {
        let x0 = (index % self.cols) * self.block_width;
        let y0 = (index / self.cols) * self.block_height;
        BlockRect {
            x0,
            y0,
            x1: (x0 + self.block_width).min(self.width),
            y1: (y0 + self.block_height).min(self.height),
        }
    }
}

/// Split `0..total` into `parts` contiguous ranges differing by at most one
/// in length. The first `total % parts` ranges get the extra element.
fn even_ranges(total: usize, parts: usize) -> Vec<Range<usize>> {
    let base = total / parts;
    let extra = total % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// How block indexes are assigned to threads.
enum WorkSource {
    /// Precomputed contiguous index range per thread.
    Bands(Vec<Range<usize>>),
    /// Thread `t` takes indexes `t, t + n, t + 2n, ...`.
    Strided,
    /// Threads claim the next index from a shared counter.
    Shared(AtomicUsize),
}

impl WorkSource {
    fn iter_for(&self, thread: usize, threads: usize, total: usize) -> WorkIter<'_> {
        match self {
            WorkSource::Bands(ranges) => WorkIter::Band(ranges[thread].clone()),
            WorkSource::Strided => WorkIter::Strided {
                next: thread,
                step: threads,
                total,
            },
            WorkSource::Shared(counter) => WorkIter::Shared { counter, total },
        }
    }
}

enum WorkIter<'a> {
    Band(Range<usize>),
    Strided {
        next: usize,
        step: usize,
        total: usize,
    },
    Shared {
        counter: &'a AtomicUsize,
        total: usize,
    },
}

impl Iterator for WorkIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            WorkIter::Band(range) => range.next(),
            WorkIter::Strided { next, step, total } => {
                if *next >= *total {
                    return None;
                }
                let index = *next;
                *next += *step;
                Some(index)
            }
            WorkIter::Shared { counter, total } => {
                let index = counter.fetch_add(1, Ordering::Relaxed);
                (index < *total).then_some(index)
            }
        }
    }
}

/// Raw pointers to the three output planes.
///
/// Shared across worker threads; each thread writes only the pixels of its
/// own blocks, and the spawning scope joins every worker before the planes
/// are read again.
#[derive(Clone, Copy)]
struct RawPlanes {
    red: *mut u8,
    green: *mut u8,
    blue: *mut u8,
}

unsafe impl Send for RawPlanes {}
unsafe impl Sync for RawPlanes {}

fn process_rect(input: &PlanarImage, kernel: &Kernel, rect: BlockRect, out: RawPlanes) {
    let width = input.width();
    for y in rect.y0..rect.y1 {
        for x in rect.x0..rect.x1 {
            let [r, g, b] = convolve_pixel(input, kernel, x, y);
            let idx = y * width + x;
            // Safety: (x, y) lies inside the image, so idx is in bounds, and
            // no other thread's blocks contain this pixel.
            unsafe {
                *out.red.add(idx) = r;
                *out.green.add(idx) = g;
                *out.blue.add(idx) = b;
            }
        }
    }
}

fn run_blocks(
    input: &PlanarImage,
    output: &mut PlanarImage,
    kernel: &Kernel,
    grid: &BlockGrid,
    source: &WorkSource,
    threads: usize,
) -> DispatchResult<()> {
    let (red, green, blue) = output.planes_mut();
    let out = RawPlanes {
        red: red.as_mut_ptr(),
        green: green.as_mut_ptr(),
        blue: blue.as_mut_ptr(),
    };

    let cancel = AtomicBool::new(false);
    let mut spawn_err = None;

    thread::scope(|s| {
        let mut handles = Vec::with_capacity(threads);
        for t in 0..threads {
            let cancel = &cancel;
            let result = thread::Builder::new()
                .name(format!("convolve-{t}"))
                .spawn_scoped(s, move || {
                    for index in source.iter_for(t, threads, grid.len()) {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        process_rect(input, kernel, grid.rect(index), out);
                    }
                });
            match result {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Stop the threads that did start; their partial output
                    // is discarded by the caller along with the error.
                    cancel.store(true, Ordering::Relaxed);
                    spawn_err = Some(err);
                    break;
                }
            }
        }
        for handle in handles {
            let _ = handle.join();
        }
    });

    match spawn_err {
        Some(err) => Err(DispatchError::ThreadStart(err)),
        None => Ok(()),
    }
}

/// Convolve `input` into `output` using the given strategy.
///
/// `threads` is ignored for [`Strategy::Sequential`] and must be at least 1
/// for every other strategy. The output must match the input's dimensions.
/// All strategies produce byte-identical results; they differ only in how
/// the work is carved up.
pub fn dispatch(
    input: &PlanarImage,
    output: &mut PlanarImage,
    kernel: &Kernel,
    strategy: Strategy,
    threads: usize,
) -> DispatchResult<()> {
    if input.width() != output.width() || input.height() != output.height() {
        return Err(DispatchError::DimensionMismatch {
            want_width: input.width(),
            want_height: input.height(),
            got_width: output.width(),
            got_height: output.height(),
        });
    }

    if matches!(strategy, Strategy::Sequential) {
        apply_sequential(input, output, kernel);
        return Ok(());
    }

    if threads == 0 {
        return Err(DispatchError::InvalidThreadCount(threads));
    }
    if let Strategy::DynamicBlock {
        block_width,
        block_height,
    } = strategy
    {
        if block_width == 0 || block_height == 0 {
            return Err(DispatchError::InvalidBlockSize {
                width: block_width,
                height: block_height,
            });
        }
    }
    if input.pixel_count() == 0 {
        return Ok(());
    }

    let width = input.width();
    let height = input.height();

    let (grid, source) = match strategy {
        Strategy::Sequential => unreachable!("handled above"),
        Strategy::Pixel => (
            BlockGrid::new(width, height, 1, 1),
            WorkSource::Bands(even_ranges(width * height, threads)),
        ),
        Strategy::Row => (
            BlockGrid::new(width, height, width, 1),
            WorkSource::Bands(even_ranges(height, threads)),
        ),
        Strategy::Column => (
            BlockGrid::new(width, height, 1, height),
            WorkSource::Bands(even_ranges(width, threads)),
        ),
        Strategy::Block => {
            // A grid of at most threads x threads rectangles, dealt
            // round-robin so every thread touches blocks from different
            // parts of the image.
            let block_width = (width + threads - 1) / threads;
            let block_height = (height + threads - 1) / threads;
            (
                BlockGrid::new(width, height, block_width, block_height),
                WorkSource::Strided,
            )
        }
        Strategy::DynamicBlock {
            block_width,
            block_height,
        } => (
            BlockGrid::new(width, height, block_width, block_height),
            WorkSource::Shared(AtomicUsize::new(0)),
        ),
    };

    debug!(
        "dispatching {}x{} image: strategy={} threads={} blocks={}",
        width,
        height,
        strategy.name(),
        threads,
        grid.len()
    );

    run_blocks(input, output, kernel, &grid, &source, threads)
}
