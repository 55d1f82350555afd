use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use ouija_core::{load_filter_config, CutoffState, FilterConfig, Seed, SEED_SPACE};
use ouija_gpu::context::GpuContext;
use ouija_gpu::kernel_cache;
use ouija_gpu::pipeline::DispatchPipeline;
use ouija_gpu::sizer::Sizing;

/// Default sweep length, matching the upstream default search size.
const DEFAULT_SEED_COUNT: u64 = 2_318_107_019_761;

#[derive(Parser, Debug)]
#[command(name = "ouija", about = "GPU-accelerated brute-force seed search")]
struct Args {
    /// Filter template name; also the kernel cache key.
    #[arg(short = 'f', default_value = "ouija_template")]
    filter: String,

    /// Starting seed: an up-to-8-char literal, or "random". Defaults to the zero seed.
    #[arg(short = 's', default_value = "", value_parser = parse_seed_arg)]
    start: SeedArg,

    /// Number of seeds to scan. 0 means compile the kernel and exit without dispatching.
    #[arg(short = 'n', default_value_t = DEFAULT_SEED_COUNT)]
    count: u64,

    /// Static cutoff score, or "auto" for a self-raising dynamic cutoff.
    #[arg(short = 'c', default_value = "1", value_parser = parse_cutoff_arg)]
    cutoff: CutoffArg,

    /// OpenCL platform index.
    #[arg(short = 'p', default_value_t = 0)]
    platform: usize,

    /// OpenCL device index (within the selected platform).
    #[arg(short = 'd', default_value_t = 0)]
    device: usize,

    /// Work-group (local work) size. 0 selects a vendor-appropriate default.
    #[arg(short = 'g', default_value_t = 0)]
    work_group_size: usize,

    /// Batch multiplier applied to `work_group_size * compute_units`.
    #[arg(short = 'b', default_value_t = 100)]
    batch_multiplier: usize,

    /// Disable overlapped kernel/transfer double buffering.
    #[arg(long = "no-double-buffer", default_value_t = false)]
    no_double_buffer: bool,

    /// Path to a JSON filter config. Falls back to a minimal default on any
    /// read or parse failure, with a one-line notice.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Enumerate every OpenCL platform/device pair and exit.
    #[arg(long = "list_devices", default_value_t = false)]
    list_devices: bool,
}

#[derive(Clone, Debug)]
enum SeedArg {
    Literal(String),
    Random,
}

fn parse_seed_arg(raw: &str) -> Result<SeedArg, String> {
    if raw.eq_ignore_ascii_case("random") {
        return Ok(SeedArg::Random);
    }
    Seed::parse(raw).map_err(|e| e.to_string())?;
    Ok(SeedArg::Literal(raw.to_string()))
}

#[derive(Clone, Copy, Debug)]
enum CutoffArg {
    Fixed(u16),
    Auto,
}

fn parse_cutoff_arg(raw: &str) -> Result<CutoffArg, String> {
    if raw.eq_ignore_ascii_case("auto") {
        return Ok(CutoffArg::Auto);
    }
    raw.parse::<u16>()
        .map(CutoffArg::Fixed)
        .map_err(|_| format!("'{raw}' is neither an integer cutoff nor \"auto\""))
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if args.list_devices {
        match GpuContext::enumerate_devices() {
            Ok(devices) => {
                for info in &devices {
                    println!("{info}");
                }
            }
            Err(err) => {
                eprintln!("Error enumerating devices: {err}");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut config = resolve_config(args.config.as_deref());
    if let Err(err) = config.validate() {
        eprintln!("Error: invalid filter config: {err}");
        std::process::exit(1);
    }

    let ctx = match GpuContext::with_device(args.platform, args.device) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    log::info!("Selected device: {}", ctx.info());

    let sizing = Sizing::compute(ctx.info(), args.work_group_size, args.batch_multiplier);
    log::info!(
        "Work-group size: {}, batch capacity: {}",
        sizing.work_group_size,
        sizing.capacity
    );

    let compiled = match kernel_cache::load_or_build(&ctx, &config.filter_name) {
        Ok(compiled) => compiled,
        Err(err) => {
            eprintln!("Error: kernel build failed: {err}");
            std::process::exit(1);
        }
    };
    log::info!("Kernel ready (cache: {})", compiled.cache_path().display());

    if args.count == 0 {
        println!("$Search Complete! Found: 0 | Processed: 0.00 | Elapsed: 0 seconds");
        return;
    }

    println!("+{}", config.csv_header(|id| id.to_string()));

    let start_seed = resolve_start_seed(&args.start);
    let mut cutoff = match args.cutoff {
        CutoffArg::Fixed(value) => CutoffState::fixed(value),
        CutoffArg::Auto => CutoffState::auto(1),
    };

    let mut pipeline = match DispatchPipeline::new(&ctx, &compiled, sizing, &config, !args.no_double_buffer) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            eprintln!("Error: failed to set up dispatch pipeline: {err}");
            std::process::exit(1);
        }
    };

    let started_at = Instant::now();
    let outcome = pipeline.run(
        start_seed,
        args.count,
        &mut cutoff,
        |row| {
            println!("|{row}");
            std::io::stdout().flush().ok();
        },
        |reporter, found, processed, total| {
            println!("{}", reporter.line(Instant::now(), found, processed, total));
        },
    );

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("Error: dispatch setup failed: {err}");
            std::process::exit(1);
        }
    };

    let elapsed_secs = started_at.elapsed().as_secs();
    println!(
        "$Search Complete! Found: {} | Processed: {} | Elapsed: {} seconds",
        outcome.summary.total_found,
        ouija_gpu::format_count(outcome.summary.total_processed),
        elapsed_secs
    );

    if let Some(err) = outcome.error {
        eprintln!("Error: dispatch aborted: {err}");
        std::process::exit(1);
    }
}

fn resolve_config(path: Option<&std::path::Path>) -> FilterConfig {
    match path {
        None => FilterConfig::default_template(),
        Some(path) => match load_filter_config(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("Notice: could not load config ({err}); using the default template");
                FilterConfig::default_template()
            }
        },
    }
}

fn resolve_start_seed(arg: &SeedArg) -> Seed {
    match arg {
        SeedArg::Literal(literal) => Seed::parse(literal).unwrap_or(Seed::ZERO),
        SeedArg::Random => {
            use rand::Rng;
            let index = rand::thread_rng().gen_range(0..SEED_SPACE);
            Seed::from_index(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_seed_arg_accepts_random_case_insensitively() {
        assert!(matches!(parse_seed_arg("RANDOM"), Ok(SeedArg::Random)));
        assert!(matches!(parse_seed_arg("random"), Ok(SeedArg::Random)));
    }

    #[test]
    fn parse_seed_arg_rejects_overlong_literals() {
        assert!(parse_seed_arg("123456789").is_err());
    }

    #[test]
    fn parse_cutoff_arg_accepts_auto_and_integers() {
        assert!(matches!(parse_cutoff_arg("auto"), Ok(CutoffArg::Auto)));
        assert!(matches!(parse_cutoff_arg("42"), Ok(CutoffArg::Fixed(42))));
        assert!(parse_cutoff_arg("not-a-number").is_err());
    }

    #[test]
    fn resolve_start_seed_falls_back_to_zero_on_garbage_literal() {
        let seed = resolve_start_seed(&SeedArg::Literal("!!".to_string()));
        assert_eq!(seed, Seed::ZERO);
    }
}
