//! The batch pipeline: readers decode, workers convolve, writers encode.
//!
//! Stages are connected by two weight-bounded queues, so at any moment the
//! decoded-but-unwritten images pinned in memory stay under the configured
//! budget regardless of how many files the batch names.
//!
//! Termination cascades: the last reader to finish closes the input queue
//! with one sentinel per worker, and the output queue is closed with one
//! sentinel per writer as soon as every surviving image has been convolved.
//! "Surviving" matters: an image retired along the way (decode failure,
//! over-budget, worker-side failure) shrinks the target the convolved count
//! is compared against, so per-image failures never wedge the writers.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::codec;
use crate::convolve::{dispatch, Strategy};
use crate::core::error::PipelineError;
use crate::core::{PlanarImage, Result};
use crate::kernel::Kernel;
use crate::queue::{BoundedQueue, Message, Weighted};

/// An image in flight between stages, labeled with its source path.
#[derive(Debug)]
pub struct WorkItem {
    pub image: PlanarImage,
    pub path: PathBuf,
}

impl Weighted for WorkItem {
    fn weight(&self) -> usize {
        self.image.weight()
    }
}

/// Batch run configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Decoding threads.
    pub readers: usize,
    /// Convolving threads.
    pub workers: usize,
    /// Encoding threads.
    pub writers: usize,
    /// Weight budget in bytes for each of the two queues.
    pub queue_capacity: usize,
    /// How each worker partitions a single image.
    pub strategy: Strategy,
    /// Threads per dispatch; ignored for [`Strategy::Sequential`].
    pub dispatch_threads: usize,
    /// Where processed images are written.
    pub output_dir: PathBuf,
}

impl PipelineConfig {
    /// A config with workable defaults for the given output directory.
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            readers: 1,
            workers: 4,
            writers: 1,
            queue_capacity: 64 * 1024 * 1024,
            strategy: Strategy::Row,
            dispatch_threads: 4,
            output_dir,
        }
    }

    fn validate(&self) -> std::result::Result<(), PipelineError> {
        if self.readers == 0 || self.workers == 0 || self.writers == 0 {
            return Err(PipelineError::InvalidConfig(
                "each stage needs at least one thread".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue capacity must be at least 1 byte".into(),
            ));
        }
        match self.strategy {
            Strategy::Sequential => {}
            Strategy::DynamicBlock {
                block_width,
                block_height,
            } if block_width == 0 || block_height == 0 => {
                return Err(PipelineError::InvalidConfig(
                    "block dimensions must be at least 1x1".into(),
                ));
            }
            _ if self.dispatch_threads == 0 => {
                return Err(PipelineError::InvalidConfig(
                    "dispatch thread count must be at least 1".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

/// What happened to a batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Images named by the batch.
    pub total: usize,
    /// Images decoded, convolved, and encoded successfully.
    pub succeeded: usize,
    pub decode_failures: usize,
    pub encode_failures: usize,
    /// Images skipped because they alone exceed the queue budget.
    pub capacity_skips: usize,
    pub elapsed: Duration,
}

/// Shared counters for one batch run. Never global; each [`run_batch`] call
/// builds its own and hands references to its stage threads.
struct RunContext {
    /// Next path index to decode; readers claim from it.
    claimed: AtomicUsize,
    /// Readers that have finished claiming.
    readers_done: AtomicUsize,
    /// Images convolved and pushed to the output queue.
    written: AtomicUsize,
    /// Images the writers should still expect. Starts at the batch size and
    /// shrinks each time an image is retired before reaching them.
    target: AtomicUsize,
    /// One-shot: set by whoever sends the writer sentinels.
    output_closed: AtomicBool,
    /// Raised on startup failure; stages poll it and bail out.
    cancelled: AtomicBool,
    encoded: AtomicUsize,
    decode_failures: AtomicUsize,
    encode_failures: AtomicUsize,
    capacity_skips: AtomicUsize,
}

impl RunContext {
    fn new(total: usize) -> Self {
        Self {
            claimed: AtomicUsize::new(0),
            readers_done: AtomicUsize::new(0),
            written: AtomicUsize::new(0),
            target: AtomicUsize::new(total),
            output_closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            encoded: AtomicUsize::new(0),
            decode_failures: AtomicUsize::new(0),
            encode_failures: AtomicUsize::new(0),
            capacity_skips: AtomicUsize::new(0),
        }
    }

    /// Close the output queue once every surviving image has been convolved.
    ///
    /// `written` only grows and `target` only shrinks, and they can only meet
    /// when no image is still in flight, so the first caller to observe
    /// equality after the final change sends the writer sentinels. The
    /// one-shot flag keeps concurrent observers from sending twice.
    fn close_output_if_done(&self, results: &BoundedQueue<WorkItem>, writers: usize) {
        if self.written.load(Ordering::SeqCst) == self.target.load(Ordering::SeqCst)
            && !self.output_closed.swap(true, Ordering::SeqCst)
        {
            debug!("all surviving images convolved; closing output queue");
            for _ in 0..writers {
                results.push_shutdown();
            }
        }
    }

    /// Drop one image from the writers' expectations.
    fn retire(&self, results: &BoundedQueue<WorkItem>, writers: usize) {
        self.target.fetch_sub(1, Ordering::SeqCst);
        self.close_output_if_done(results, writers);
    }
}

fn reader_loop(
    ctx: &RunContext,
    paths: &[PathBuf],
    jobs: &BoundedQueue<WorkItem>,
    results: &BoundedQueue<WorkItem>,
    config: &PipelineConfig,
) {
    let started = Instant::now();
    let mut decoded = 0usize;

    while !ctx.cancelled.load(Ordering::SeqCst) {
        let index = ctx.claimed.fetch_add(1, Ordering::SeqCst);
        if index >= paths.len() {
            break;
        }
        let path = &paths[index];
        match codec::decode(path) {
            Ok(image) if image.weight() > jobs.capacity() => {
                warn!(
                    "skipping {}: {} bytes exceeds the {} byte queue budget",
                    path.display(),
                    image.weight(),
                    jobs.capacity()
                );
                ctx.capacity_skips.fetch_add(1, Ordering::SeqCst);
                ctx.retire(results, config.writers);
            }
            Ok(image) => {
                jobs.push(WorkItem {
                    image,
                    path: path.clone(),
                });
                decoded += 1;
            }
            Err(err) => {
                warn!("{err}");
                ctx.decode_failures.fetch_add(1, Ordering::SeqCst);
                ctx.retire(results, config.writers);
            }
        }
    }

    if ctx.readers_done.fetch_add(1, Ordering::SeqCst) + 1 == config.readers {
        debug!("last reader finished; closing input queue");
        for _ in 0..config.workers {
            jobs.push_shutdown();
        }
    }
    ctx.close_output_if_done(results, config.writers);
    debug!("reader decoded {decoded} images in {:?}", started.elapsed());
}

fn worker_loop(
    ctx: &RunContext,
    jobs: &BoundedQueue<WorkItem>,
    results: &BoundedQueue<WorkItem>,
    kernel: &Kernel,
    config: &PipelineConfig,
) {
    let started = Instant::now();
    let mut convolved = 0usize;

    loop {
        let item = match jobs.pop() {
            Message::Shutdown => break,
            Message::Job(item) => item,
        };

        let mut output = match PlanarImage::new(item.image.width(), item.image.height()) {
            Ok(output) => output,
            Err(err) => {
                error!("dropping {}: {err}", item.path.display());
                ctx.retire(results, config.writers);
                continue;
            }
        };
        if let Err(err) = dispatch(
            &item.image,
            &mut output,
            kernel,
            config.strategy,
            config.dispatch_threads,
        ) {
            error!("dropping {}: {err}", item.path.display());
            ctx.retire(results, config.writers);
            continue;
        }

        results.push(WorkItem {
            image: output,
            path: item.path,
        });
        ctx.written.fetch_add(1, Ordering::SeqCst);
        ctx.close_output_if_done(results, config.writers);
        convolved += 1;
    }

    // An exiting worker re-checks in case the batch finished with no image
    // ever reaching this stage (empty batch, everything retired upstream).
    ctx.close_output_if_done(results, config.writers);
    debug!(
        "worker convolved {convolved} images in {:?}",
        started.elapsed()
    );
}

fn writer_loop(ctx: &RunContext, results: &BoundedQueue<WorkItem>, config: &PipelineConfig) {
    let started = Instant::now();
    let mut written = 0usize;

    loop {
        let item = match results.pop() {
            Message::Shutdown => break,
            Message::Job(item) => item,
        };

        let Some(name) = item.path.file_name() else {
            error!("cannot name output for {}", item.path.display());
            ctx.encode_failures.fetch_add(1, Ordering::SeqCst);
            continue;
        };
        let dest = config.output_dir.join(name);
        match codec::encode(&item.image, &dest) {
            Ok(()) => {
                debug!("wrote {}", dest.display());
                ctx.encoded.fetch_add(1, Ordering::SeqCst);
                written += 1;
            }
            Err(err) => {
                error!("{err}");
                ctx.encode_failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    debug!("writer encoded {written} images in {:?}", started.elapsed());
}

/// Run a batch of images through the reader/worker/writer pipeline.
///
/// Per-image failures are logged, counted in the report, and never abort the
/// run; only invocation-level problems (bad config, output directory,
/// thread startup) return an error.
pub fn run_batch(paths: &[PathBuf], kernel: &Kernel, config: &PipelineConfig) -> Result<BatchReport> {
    config.validate()?;
    std::fs::create_dir_all(&config.output_dir)?;

    let started = Instant::now();
    let ctx = RunContext::new(paths.len());
    let jobs: BoundedQueue<WorkItem> = BoundedQueue::new(config.queue_capacity);
    let results: BoundedQueue<WorkItem> = BoundedQueue::new(config.queue_capacity);

    info!(
        "batch of {} images: {} readers / {} workers / {} writers, {} bytes per queue",
        paths.len(),
        config.readers,
        config.workers,
        config.writers,
        config.queue_capacity
    );

    let mut failed_stage: Option<(&'static str, io::Error)> = None;

    thread::scope(|s| {
        let mut writer_handles = Vec::with_capacity(config.writers);
        let mut worker_handles = Vec::with_capacity(config.workers);
        let mut reader_handles = Vec::with_capacity(config.readers);

        // Spawn downstream-first so every producer always has a live
        // consumer, even when a later group fails to start.
        for i in 0..config.writers {
            let spawned = thread::Builder::new()
                .name(format!("writer-{i}"))
                .spawn_scoped(s, || writer_loop(&ctx, &results, config));
            match spawned {
                Ok(handle) => writer_handles.push(handle),
                Err(err) => {
                    failed_stage = Some(("writer", err));
                    break;
                }
            }
        }
        if failed_stage.is_none() {
            for i in 0..config.workers {
                let spawned = thread::Builder::new()
                    .name(format!("worker-{i}"))
                    .spawn_scoped(s, || worker_loop(&ctx, &jobs, &results, kernel, config));
                match spawned {
                    Ok(handle) => worker_handles.push(handle),
                    Err(err) => {
                        failed_stage = Some(("worker", err));
                        break;
                    }
                }
            }
        }
        if failed_stage.is_none() {
            for i in 0..config.readers {
                let spawned = thread::Builder::new()
                    .name(format!("reader-{i}"))
                    .spawn_scoped(s, || reader_loop(&ctx, paths, &jobs, &results, config));
                match spawned {
                    Ok(handle) => reader_handles.push(handle),
                    Err(err) => {
                        failed_stage = Some(("reader", err));
                        break;
                    }
                }
            }
        }

        if failed_stage.is_some() {
            // Wind down whatever did start: stop the readers, then drain
            // each downstream group with one sentinel per started thread.
            ctx.cancelled.store(true, Ordering::SeqCst);
            for handle in reader_handles {
                let _ = handle.join();
            }
            for _ in 0..worker_handles.len() {
                jobs.push_shutdown();
            }
            for handle in worker_handles {
                let _ = handle.join();
            }
            for _ in 0..writer_handles.len() {
                results.push_shutdown();
            }
            for handle in writer_handles {
                let _ = handle.join();
            }
        } else {
            for handle in reader_handles {
                let _ = handle.join();
            }
            for handle in worker_handles {
                let _ = handle.join();
            }
            for handle in writer_handles {
                let _ = handle.join();
            }
        }
    });

    if let Some((stage, source)) = failed_stage {
        return Err(PipelineError::ThreadStart { stage, source }.into());
    }

    let report = BatchReport {
        total: paths.len(),
        succeeded: ctx.encoded.load(Ordering::SeqCst),
        decode_failures: ctx.decode_failures.load(Ordering::SeqCst),
        encode_failures: ctx.encode_failures.load(Ordering::SeqCst),
        capacity_skips: ctx.capacity_skips.load(Ordering::SeqCst),
        elapsed: started.elapsed(),
    };
    info!(
        "batch finished: {}/{} succeeded in {:?}",
        report.succeeded, report.total, report.elapsed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use std::fs;
    use std::path::Path;

    fn write_test_png(dir: &Path, name: &str, width: usize, height: usize, seed: u8) -> PathBuf {
        let data: Vec<u8> = (0..width * height * 3)
            .map(|i| (i as u8).wrapping_mul(29).wrapping_add(seed))
            .collect();
        let image = PlanarImage::from_interleaved(&data, width, height).unwrap();
        let path = dir.join(name);
        codec::encode(&image, &path).unwrap();
        path
    }

    fn test_config(output_dir: PathBuf) -> PipelineConfig {
        PipelineConfig {
            readers: 1,
            workers: 2,
            writers: 1,
            queue_capacity: 1 << 20,
            strategy: Strategy::Row,
            dispatch_threads: 2,
            output_dir,
        }
    }

    #[test]
    fn test_end_to_end_identity() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| write_test_png(dir.path(), &format!("img{i}.png"), 4, 4, i as u8))
            .collect();

        let kernel = Kernel::identity(3).unwrap();
        let report = run_batch(&paths, &kernel, &test_config(out.clone())).unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.decode_failures, 0);

        // The identity kernel must reproduce each input exactly.
        for path in &paths {
            let original = codec::decode(path).unwrap();
            let processed = codec::decode(&out.join(path.file_name().unwrap())).unwrap();
            assert_eq!(processed, original);
        }
    }

    #[test]
    fn test_empty_batch_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = Kernel::identity(3).unwrap();
        let report = run_batch(&[], &kernel, &test_config(dir.path().join("out"))).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.succeeded, 0);
    }

    #[test]
    fn test_decode_failure_is_retired() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_test_png(dir.path(), "good.png", 4, 4, 1);
        let bad = dir.path().join("bad.png");
        fs::write(&bad, b"not an image").unwrap();

        let kernel = Kernel::identity(3).unwrap();
        let report = run_batch(
            &[good, bad],
            &kernel,
            &test_config(dir.path().join("out")),
        )
        .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.decode_failures, 1);
    }

    #[test]
    fn test_all_images_failing_still_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..2)
            .map(|i| {
                let path = dir.path().join(format!("bad{i}.png"));
                fs::write(&path, b"garbage").unwrap();
                path
            })
            .collect();

        let kernel = Kernel::identity(3).unwrap();
        let report = run_batch(&paths, &kernel, &test_config(dir.path().join("out"))).unwrap();
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.decode_failures, 2);
    }

    #[test]
    fn test_over_budget_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_png(dir.path(), "big.png", 4, 4, 7);

        let mut config = test_config(dir.path().join("out"));
        config.queue_capacity = 10; // a 4x4 RGB image weighs 48 bytes

        let kernel = Kernel::identity(3).unwrap();
        let report = run_batch(&[path], &kernel, &config).unwrap();
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.capacity_skips, 1);
    }

    #[test]
    fn test_multiple_threads_per_stage() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| write_test_png(dir.path(), &format!("img{i}.png"), 6, 4, i as u8))
            .collect();

        let mut config = test_config(out.clone());
        config.readers = 2;
        config.workers = 3;
        config.writers = 2;

        let kernel = crate::kernel::presets::by_name("fast-blur").unwrap();
        let report = run_batch(&paths, &kernel, &config).unwrap();
        assert_eq!(report.succeeded, 5);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 5);
    }

    #[test]
    fn test_sentinel_counts_with_multiple_readers() {
        // Three readers with nothing to claim: the input queue must end up
        // with one sentinel per worker, not per reader, and the output queue
        // with one per writer.
        let ctx = RunContext::new(0);
        let jobs: BoundedQueue<WorkItem> = BoundedQueue::new(1024);
        let results: BoundedQueue<WorkItem> = BoundedQueue::new(1024);
        let mut config = test_config(PathBuf::from("unused"));
        config.readers = 3;
        config.workers = 2;
        config.writers = 2;

        thread::scope(|s| {
            for _ in 0..config.readers {
                s.spawn(|| reader_loop(&ctx, &[], &jobs, &results, &config));
            }
        });

        assert_eq!(jobs.len(), config.workers);
        assert_eq!(results.len(), config.writers);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = Kernel::identity(3).unwrap();

        let mut config = test_config(dir.path().join("out"));
        config.workers = 0;
        assert!(matches!(
            run_batch(&[], &kernel, &config),
            Err(Error::Pipeline(PipelineError::InvalidConfig(_)))
        ));

        let mut config = test_config(dir.path().join("out"));
        config.queue_capacity = 0;
        assert!(run_batch(&[], &kernel, &config).is_err());

        let mut config = test_config(dir.path().join("out"));
        config.strategy = Strategy::DynamicBlock {
            block_width: 0,
            block_height: 4,
        };
        assert!(run_batch(&[], &kernel, &config).is_err());
    }
}
