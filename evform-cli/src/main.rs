//! evform CLI
//!
//! Receives, replays, generates and inspects detector hit data.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Args, Parser, Subcommand};

use evform_algorithms::{form_events, EventBuilder};
use evform_core::formation::FormationConfig;
use evform_core::{Hit, Traces};
use evform_io::readout::{encode_hits, records_per};
use log::LevelFilter;
use evform_io::{
    chunk_paths, generate_hits, read_dump, rx_channel, CsvEventWriter, DumpReader, DumpWriter,
    FixedHitParser, GeneratorConfig, Processor, Receiver, RxConfig, RxStats, ShutdownMode,
};
use std::fs;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    EvformIo(#[from] evform_io::Error),

    #[error("Slot buffer error: {0}")]
    Slot(#[from] evform_io::SlotError),

    #[error("Core error: {0}")]
    Core(#[from] evform_core::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] evform_core::ConfigError),

    #[error("Config file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} thread panicked")]
    Thread(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Streaming event formation for neutron detector readout.
#[derive(Parser)]
#[command(name = "evform")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log level of one component, e.g. `matcher=off` or `receiver=trace`
    #[arg(long = "log", global = true, value_name = "COMPONENT=LEVEL")]
    component_levels: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Logging contexts of the pipeline components.
    fn traces(&self) -> Result<Traces> {
        let mut traces = Traces::new().with_max_level(self.level());
        for spec in &self.component_levels {
            let invalid =
                |reason: String| CliError::InvalidArgument(format!("--log {spec}: {reason}"));
            let (component, level) = spec
                .split_once('=')
                .ok_or_else(|| invalid("expected COMPONENT=LEVEL".into()))?;
            let level: LevelFilter = level
                .parse()
                .map_err(|_| invalid(format!("unknown level {level}")))?;
            traces = traces
                .with_component_level(component, level)
                .ok_or_else(|| invalid(format!("unknown component {component}")))?;
        }
        Ok(traces)
    }
}

/// Installs `env_logger` with the component levels as target filters.
///
/// `RUST_LOG` still overrides them.
fn init_logging(level: LevelFilter, traces: &Traces) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    for trace in traces.all() {
        builder.filter_module(trace.target(), trace.max_level());
    }
    builder.parse_default_env().init();
}

/// Formation settings shared by the processing commands.
#[derive(Args, Debug)]
struct FormationArgs {
    /// JSON formation config; defaults are used for missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the tracked planes (comma separated)
    #[arg(long, value_delimiter = ',')]
    planes: Option<Vec<u8>>,

    /// Override the clusterer time gap (ticks)
    #[arg(long)]
    max_time_gap: Option<u64>,

    /// Override the clusterer coordinate gap
    #[arg(long)]
    max_coord_gap: Option<u16>,

    /// Override the matcher latency (ticks)
    #[arg(long)]
    latency: Option<u64>,
}

impl FormationArgs {
    fn load(&self) -> Result<FormationConfig> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => FormationConfig::default(),
        };
        if let Some(planes) = &self.planes {
            config.matcher.planes.clone_from(planes);
        }
        if let Some(gap) = self.max_time_gap {
            config.clusterer.max_time_gap = gap;
        }
        if let Some(gap) = self.max_coord_gap {
            config.clusterer.max_coord_gap = gap;
        }
        if let Some(latency) = self.latency {
            config.matcher.latency = latency;
        }
        config.validate()?;
        log::debug!("formation config: {:?}", config);
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Receive hits over UDP and form events
    Listen {
        #[command(flatten)]
        formation: FormationArgs,

        /// Address to bind
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: String,

        /// Number of receive slots
        #[arg(long, default_value = "2000")]
        slots: usize,

        /// Maximum datagram size (bytes)
        #[arg(long, default_value = "9000")]
        slot_size: usize,

        /// Receive timeout (milliseconds)
        #[arg(long, default_value = "100")]
        timeout_ms: u64,

        /// Seconds to run
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Drop queued datagrams on shutdown instead of processing them
        #[arg(long)]
        immediate: bool,

        /// CSV output of reduced events
        #[arg(short, long)]
        output: PathBuf,

        /// Also dump received hits under this stem
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Form events from a hit dump
    Replay {
        /// Dump stem (without the `_NNNNN.dump` suffix)
        input: PathBuf,

        #[command(flatten)]
        formation: FormationArgs,

        /// CSV output of reduced events
        #[arg(short, long)]
        output: PathBuf,

        /// Use the streaming pipeline instead of the batch helper
        #[arg(long)]
        streaming: bool,
    },

    /// Write synthetic tracks to a hit dump
    Generate {
        /// Dump stem (without the `_NNNNN.dump` suffix)
        output: PathBuf,

        /// Number of events
        #[arg(short, long, default_value = "1000")]
        events: usize,

        /// Planes to generate tracks on (comma separated)
        #[arg(long, value_delimiter = ',', default_value = "0,1")]
        planes: Vec<u8>,

        /// Ticks between events
        #[arg(long, default_value = "1000")]
        spacing: u64,

        /// Hits per track
        #[arg(long, default_value = "4")]
        track_length: u16,

        /// Random seed
        #[arg(long, default_value = "24301")]
        seed: u64,
    },

    /// Send a hit dump to a listener over UDP
    Send {
        /// Dump stem (without the `_NNNNN.dump` suffix)
        input: PathBuf,

        /// Listener address
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        target: String,

        /// Maximum datagram size (bytes)
        #[arg(long, default_value = "9000")]
        datagram_size: usize,

        /// Pause between datagrams (microseconds)
        #[arg(long, default_value = "0")]
        pause_us: u64,
    },

    /// Show information about a hit dump
    Info {
        /// Dump stem (without the `_NNNNN.dump` suffix)
        input: PathBuf,
    },
}

fn listen(
    formation: &FormationConfig,
    traces: &Traces,
    rx: &RxConfig,
    duration: Duration,
    output: &Path,
    dump: Option<&Path>,
) -> Result<()> {
    rx.validate()?;
    let stats = Arc::new(RxStats::new());
    let (producer, consumer) = rx_channel(rx.slots, rx.slot_size)?;
    let mut receiver =
        Receiver::bind(rx, producer, Arc::clone(&stats))?.with_trace(traces.receiver);
    println!("Listening on {}", receiver.local_addr()?);

    let mut processor = Processor::new(
        consumer,
        FixedHitParser::new(),
        EventBuilder::with_traces(formation, traces)?,
        CsvEventWriter::create(output)?,
        Arc::clone(&stats),
    )
    .with_trace(traces.processing);
    if let Some(stem) = dump {
        processor = processor.with_dump(DumpWriter::create(stem)?.with_trace(traces.dump));
    }

    let running = Arc::new(AtomicBool::new(true));
    let rx_running = Arc::clone(&running);
    let rx_thread = thread::Builder::new()
        .name("evform-rx".into())
        .spawn(move || receiver.run(&rx_running))?;
    let proc_running = Arc::clone(&running);
    let shutdown = rx.shutdown;
    let proc_thread = thread::Builder::new()
        .name("evform-processing".into())
        .spawn(move || -> evform_io::Result<CsvEventWriter> {
            processor.run(&proc_running, shutdown)?;
            processor.finish()
        })?;

    let start = Instant::now();
    while start.elapsed() < duration && !rx_thread.is_finished() {
        thread::sleep(Duration::from_millis(100));
    }
    running.store(false, Ordering::Release);

    let rx_result = rx_thread.join().map_err(|_| CliError::Thread("receiver"))?;
    let writer = proc_thread
        .join()
        .map_err(|_| CliError::Thread("processing"))??;
    rx_result?;

    println!("Wrote {} events to {}", writer.rows(), output.display());
    println!("{}", serde_json::to_string_pretty(&stats.snapshot())?);
    Ok(())
}

fn replay(
    input: &Path,
    formation: &FormationConfig,
    traces: &Traces,
    output: &Path,
    streaming: bool,
) -> Result<()> {
    let start = Instant::now();
    let hits = read_dump(input)?;

    let events = if streaming {
        let mut builder = EventBuilder::with_traces(formation, traces)?;
        let mut events = builder.push_hits(&hits);
        events.extend(builder.flush());
        println!(
            "{}",
            serde_json::to_string_pretty(&builder.statistics())?
        );
        events
    } else {
        form_events(&hits, formation)?
    };

    let mut writer = CsvEventWriter::create(output)?;
    writer.write_events(&events)?;
    writer.flush()?;

    let good = events.iter().filter(|event| event.good).count();
    println!(
        "Replayed {} hits in {:.2}s",
        hits.len(),
        start.elapsed().as_secs_f64()
    );
    println!("Events: {} ({} good)", events.len(), good);
    Ok(())
}

fn send(input: &Path, target: &str, datagram_size: usize, pause: Duration) -> Result<()> {
    let hits = read_dump(input)?;
    let per_datagram = records_per(datagram_size).max(1);
    let socket = UdpSocket::bind("0.0.0.0:0")?;

    let start = Instant::now();
    let mut datagrams = 0usize;
    for chunk in hits.chunks(per_datagram) {
        socket.send_to(&encode_hits(chunk), target)?;
        datagrams += 1;
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }
    println!(
        "Sent {} hits in {} datagrams to {} in {:.2}s",
        hits.len(),
        datagrams,
        target,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn info(input: &Path) -> Result<()> {
    let paths = chunk_paths(input);
    if paths.is_empty() {
        println!("No dump chunks found for {}", input.display());
        return Ok(());
    }

    let mut total = 0usize;
    let mut per_plane = [0usize; 256];
    let mut range: Option<(u64, u64)> = None;
    for path in &paths {
        let reader = DumpReader::open(path)?;
        println!("{}: {} hits", path.display(), reader.len());
        total += reader.len();
        for hit in reader.hits() {
            per_plane[usize::from(hit.plane)] += 1;
            range = Some(match range {
                Some((lo, hi)) => (lo.min(hit.time), hi.max(hit.time)),
                None => (hit.time, hit.time),
            });
        }
    }

    println!("Chunks: {}", paths.len());
    println!("Hits: {}", total);
    if let Some((lo, hi)) = range {
        println!("Time range: {} - {}", lo, hi);
    }
    for (plane, count) in per_plane.iter().enumerate().filter(|(_, count)| **count > 0) {
        println!("Plane {}: {} hits", plane, count);
    }
    Ok(())
}

fn generate(output: &Path, config: &GeneratorConfig, traces: &Traces) -> Result<()> {
    let hits: Vec<Hit> = generate_hits(config);
    let mut writer = DumpWriter::create(output)?.with_trace(traces.dump);
    writer.write_hits(&hits)?;
    let paths = writer.finish()?;
    println!(
        "Generated {} hits for {} events in {} chunk(s)",
        hits.len(),
        config.events,
        paths.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let traces = cli.traces()?;
    init_logging(cli.level(), &traces);

    match cli.command {
        Commands::Listen {
            formation,
            bind,
            slots,
            slot_size,
            timeout_ms,
            duration,
            immediate,
            output,
            dump,
        } => {
            let rx = RxConfig::new()
                .with_bind(bind)
                .with_slots(slots)
                .with_slot_size(slot_size)
                .with_timeout_ms(timeout_ms)
                .with_shutdown(if immediate {
                    ShutdownMode::Immediate
                } else {
                    ShutdownMode::Drain
                });
            listen(
                &formation.load()?,
                &traces,
                &rx,
                Duration::from_secs(duration),
                &output,
                dump.as_deref(),
            )?;
        }

        Commands::Replay {
            input,
            formation,
            output,
            streaming,
        } => replay(&input, &formation.load()?, &traces, &output, streaming)?,

        Commands::Generate {
            output,
            events,
            planes,
            spacing,
            track_length,
            seed,
        } => {
            let config = GeneratorConfig::new()
                .with_planes(&planes)
                .with_events(events)
                .with_spacing(spacing)
                .with_track_length(track_length)
                .with_seed(seed);
            generate(&output, &config, &traces)?;
        }

        Commands::Send {
            input,
            target,
            datagram_size,
            pause_us,
        } => send(
            &input,
            &target,
            datagram_size,
            Duration::from_micros(pause_us),
        )?,

        Commands::Info { input } => info(&input)?,
    }

    Ok(())
}
