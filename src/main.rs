//! Convpipe CLI - Memory-bounded Parallel Convolution
//!
//! Applies a named filter to one image with a chosen partitioning strategy,
//! or batch-processes a directory through the bounded pipeline.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use convpipe::prelude::*;
use convpipe::kernel::presets::PRESETS;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || matches!(args[1].as_str(), "help" | "--help" | "-h") {
        print_usage(&args[0]);
        return;
    }

    if let Err(err) = run(&args[1..]) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

struct CliArgs {
    input: PathBuf,
    filter: String,
    mode: String,
    threads: usize,
    block: (usize, usize),
    limit: usize,
    readers: usize,
    workers: usize,
    writers: usize,
    mem_lim_mib: usize,
    out_dir: PathBuf,
}

impl CliArgs {
    fn parse(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            bail!("expected <image|directory> and <filter> arguments; see --help");
        }

        let mut cli = CliArgs {
            input: PathBuf::from(&args[0]),
            filter: args[1].clone(),
            mode: "seq".to_string(),
            threads: std::thread::available_parallelism().map_or(4, |n| n.get()),
            block: (64, 64),
            limit: 0,
            readers: 1,
            workers: 4,
            writers: 1,
            mem_lim_mib: 64,
            out_dir: PathBuf::from("."),
        };

        for arg in &args[2..] {
            let (key, value) = arg
                .split_once('=')
                .with_context(|| format!("expected --option=value, got '{arg}'"))?;
            match key {
                "--mode" => cli.mode = value.to_string(),
                "--threads" => cli.threads = parse_count(key, value)?,
                "--block" => cli.block = parse_block(value)?,
                "--num" => cli.limit = value.parse().with_context(|| bad_value(key, value))?,
                "--readers" => cli.readers = parse_count(key, value)?,
                "--workers" => cli.workers = parse_count(key, value)?,
                "--writers" => cli.writers = parse_count(key, value)?,
                "--mem-lim" => cli.mem_lim_mib = parse_count(key, value)?,
                "--out" => cli.out_dir = PathBuf::from(value),
                _ => bail!("unknown option '{key}'; see --help"),
            }
        }
        Ok(cli)
    }
}

fn bad_value(key: &str, value: &str) -> String {
    format!("invalid value '{value}' for {key}")
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    let count: usize = value.parse().with_context(|| bad_value(key, value))?;
    if count == 0 {
        bail!("{key} must be at least 1");
    }
    Ok(count)
}

fn parse_block(value: &str) -> Result<(usize, usize)> {
    let parsed: Option<(usize, usize)> = value
        .split_once('x')
        .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)));
    match parsed {
        Some((w, h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => bail!("--block expects WxH with both at least 1, got '{value}'"),
    }
}

fn run(args: &[String]) -> Result<()> {
    let cli = CliArgs::parse(args)?;
    let kernel = presets::by_name(&cli.filter)
        .with_context(|| format!("unknown or invalid filter '{}'", cli.filter))?;

    if cli.mode == "queue" {
        return run_batch_mode(&cli, &kernel);
    }

    let strategy = match cli.mode.as_str() {
        "seq" => Strategy::Sequential,
        "pixel" => Strategy::Pixel,
        "row" => Strategy::Row,
        "column" => Strategy::Column,
        "block" => Strategy::Block,
        "dynamic" => Strategy::DynamicBlock {
            block_width: cli.block.0,
            block_height: cli.block.1,
        },
        other => bail!("unknown mode '{other}'; see --help"),
    };
    run_single(&cli, &kernel, strategy)
}

fn run_single(cli: &CliArgs, kernel: &Kernel, strategy: Strategy) -> Result<()> {
    if cli.input.is_dir() {
        bail!(
            "'{}' is a directory; use --mode=queue to batch-process it",
            cli.input.display()
        );
    }

    let input = codec::decode(&cli.input)?;
    let mut output = PlanarImage::new(input.width(), input.height())?;
    dispatch(&input, &mut output, kernel, strategy, cli.threads)?;

    let name = cli
        .input
        .file_name()
        .with_context(|| format!("cannot name output for '{}'", cli.input.display()))?;
    let dest = cli.out_dir.join(format!(
        "{}_{}_{}",
        cli.filter,
        cli.mode,
        name.to_string_lossy()
    ));
    std::fs::create_dir_all(&cli.out_dir)?;
    codec::encode(&output, &dest)?;

    println!("wrote {}", dest.display());
    Ok(())
}

fn run_batch_mode(cli: &CliArgs, kernel: &Kernel) -> Result<()> {
    let paths = if cli.input.is_dir() {
        codec::list_images(&cli.input, cli.limit)
    } else {
        vec![cli.input.clone()]
    };
    if paths.is_empty() {
        bail!("no images found under '{}'", cli.input.display());
    }

    let config = PipelineConfig {
        readers: cli.readers,
        workers: cli.workers,
        writers: cli.writers,
        queue_capacity: cli.mem_lim_mib * 1024 * 1024,
        strategy: Strategy::Row,
        dispatch_threads: cli.threads,
        output_dir: cli.out_dir.clone(),
    };

    let report = run_batch(&paths, kernel, &config)?;
    println!(
        "processed {}/{} images in {:.2?}",
        report.succeeded, report.total, report.elapsed
    );
    if report.decode_failures + report.encode_failures + report.capacity_skips > 0 {
        eprintln!(
            "warning: {} failed to decode, {} failed to encode, {} skipped over the memory budget",
            report.decode_failures, report.encode_failures, report.capacity_skips
        );
    }
    Ok(())
}

fn print_usage(program: &str) {
    println!("Usage: {program} <image|directory> <filter> [options]");
    println!();
    println!("Filters (compose with '+', e.g. blur+emboss):");
    for preset in PRESETS {
        println!("  {:<15} {}", preset.name, preset.description);
    }
    println!();
    println!("Options:");
    println!("  --mode=<m>      seq | pixel | row | column | block | dynamic | queue");
    println!("                  (default: seq; queue batch-processes a directory)");
    println!("  --threads=N     Threads per convolution (default: CPU count)");
    println!("  --block=WxH     Tile size for dynamic mode (default: 64x64)");
    println!("  --out=DIR       Output directory (default: current directory)");
    println!();
    println!("Queue mode options:");
    println!("  --num=N         Process at most N images (default: all)");
    println!("  --readers=N     Decoder threads (default: 1)");
    println!("  --workers=N     Convolver threads (default: 4)");
    println!("  --writers=N     Encoder threads (default: 1)");
    println!("  --mem-lim=MiB   Memory budget per stage queue (default: 64)");
}
