//! pmaxstatd - PowerMax metrics collector daemon.
//!
//! Runs one collection per interval against the array named by a data input
//! file and writes the records as JSON lines to a file or stdout.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Releases unused memory back to the operating system after a run.
#[cfg(not(target_env = "msvc"))]
fn release_memory_to_os() {
    // SAFETY: mallctl is called with a valid NUL-terminated name and no
    // input or output buffers.
    unsafe {
        tikv_jemalloc_sys::mallctl(
            c"arena.0.purge".as_ptr().cast(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            0,
        );
    }
}

#[cfg(target_env = "msvc")]
fn release_memory_to_os() {}

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pmaxstat::client::RestTransport;
use pmaxstat::config::{ConfigStore, InputConfig};
use pmaxstat::orchestrator::{Orchestrator, RunSummary};
use pmaxstat::sink::{DEFAULT_INDEX, DEFAULT_SOURCETYPE, JsonLinesSink};
use pmaxstat::validator::SAMPLE_GRANULARITY_SECS;

/// PowerMax metrics collector daemon.
#[derive(Parser)]
#[command(name = "pmaxstatd", about = "PowerMax metrics collector daemon", version)]
struct Args {
    /// Data input file (JSON object of settings).
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Append events to this file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Run a single collection and exit.
    #[arg(long)]
    once: bool,

    /// Index stamped on every event.
    #[arg(long, default_value = DEFAULT_INDEX)]
    index: String,

    /// Sourcetype stamped on every event.
    #[arg(long, default_value = DEFAULT_SOURCETYPE)]
    sourcetype: String,

    /// Unisphere password. Overrides `u4v_password` from the data input.
    #[arg(long, env = "PMAXSTAT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["pmaxstatd", "pmaxstat"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn open_output(output: Option<&PathBuf>) -> std::io::Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout())),
    }
}

/// Performs one collection run. Returns the summary of a completed run.
fn collect_once(args: &Args, input: &InputConfig) -> Result<RunSummary, String> {
    let mut orchestrator = Orchestrator::from_input(input).map_err(|e| e.to_string())?;
    let settings = input.connection().map_err(|e| e.to_string())?;
    let transport = RestTransport::connect(&settings).map_err(|e| e.to_string())?;

    let writer = open_output(args.output.as_ref())
        .map_err(|e| format!("cannot open event output: {}", e))?;
    let mut sink = JsonLinesSink::new(writer, &settings.host, &settings.array_id)
        .with_index(args.index.as_str())
        .with_sourcetype(args.sourcetype.as_str());
    debug!("Writing events for {}", sink.source());

    let summary = orchestrator
        .run(transport, &mut sink)
        .map_err(|e| e.to_string())?;
    debug!("{} events written", sink.written());
    Ok(summary)
}

fn load_input(args: &Args) -> Result<InputConfig, String> {
    let mut input = InputConfig::from_path(&args.config).map_err(|e| e.to_string())?;
    if let Some(password) = &args.password {
        input.set("u4v_password", password.as_str());
    }
    Ok(input)
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("pmaxstatd {} starting", env!("CARGO_PKG_VERSION"));

    let input = match load_input(&args) {
        Ok(input) => input,
        Err(e) => {
            error!("Failed to load data input: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Config: input={}, interval={}s, output={}",
        input.name(),
        input.interval(),
        args.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string())
    );

    if args.once {
        return match collect_once(&args, &input) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Collection run failed: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    // An invalid interval fails every run; still wait one sample between attempts.
    let interval = Duration::from_secs(input.interval().max(SAMPLE_GRANULARITY_SECS));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting collection loop");
    let mut run_count: u64 = 0;

    while running.load(Ordering::SeqCst) {
        run_count += 1;
        match collect_once(&args, &input) {
            Ok(summary) => {
                info!(
                    "Run #{}: {} records, {} failed assets, {} failed categories",
                    run_count,
                    summary.records,
                    summary.asset_failures,
                    summary.category_failures
                );
            }
            Err(e) => {
                error!("Run #{} failed: {}", run_count, e);
            }
        }

        release_memory_to_os();
        debug!("Memory released after run");

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutting down...");
    info!("Shutdown complete");
    ExitCode::SUCCESS
}
