use anyhow::{Context, Result, bail};
use clap::Parser;
use dotenvy::dotenv;
use itch_book::book::Side;
use itch_book::error::RecordError;
use itch_book::record::{CAPTURE_VERSION, FileHeader};
use itch_book::replay::{DEFAULT_DEPTH, ReplayConfig, Replayer, SnapshotPolicy};
use itch_book::sink::{CaptureSink, CsvSink, SnapshotSink};
use itch_book::snapshot::Snapshot;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    version,
    about = "Rebuild an L2 order book from an ITCH-style feed and record depth snapshots"
)]
struct Args {
    /// Length-prefixed ITCH message file
    #[arg(long, short = 'i', env = "ITCH_FILE")]
    input: PathBuf,

    /// Instrument to rebuild (e.g., AAPL)
    #[arg(long, short = 's', env = "SYMBOL")]
    symbol: String,

    /// Price levels per side in each snapshot
    #[arg(long, env = "DEPTH", default_value_t = DEFAULT_DEPTH)]
    depth: usize,

    /// Capture file path (.bin); defaults to snapshots/SYMBOL_YYYY_MM_DD.bin
    #[arg(long, env = "OUT_FILE")]
    out: Option<PathBuf>,

    /// Also write snapshots as CSV to this path
    #[arg(long, env = "CSV_FILE")]
    csv: Option<PathBuf>,

    /// Snapshot after every N decoded messages
    #[arg(long, env = "SNAPSHOT_EVERY")]
    every: Option<u64>,

    /// Snapshot whenever the feed clock advances this many units
    #[arg(long, env = "SNAPSHOT_INTERVAL")]
    interval: Option<u32>,
}

fn now_unix_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

fn default_out_path(symbol: &str) -> PathBuf {
    let today = time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .date();
    let fname = format!(
        "{}_{}_{:02}_{:02}.bin",
        symbol.to_uppercase(),
        today.year(),
        today.month() as u8,
        today.day()
    );
    let mut p = PathBuf::from("snapshots");
    p.push(fname);
    p
}

/// Sends each snapshot to the capture and, if configured, the CSV file.
struct Outputs {
    capture: CaptureSink,
    csv: Option<CsvSink<BufWriter<File>>>,
}

impl SnapshotSink for Outputs {
    fn push(&mut self, snap: Snapshot) -> Result<(), RecordError> {
        if let Some(csv) = &mut self.csv {
            csv.push(snap.clone())?;
        }
        self.capture.push(snap)
    }

    fn finish(&mut self) -> Result<(), RecordError> {
        if let Some(csv) = &mut self.csv {
            csv.finish()?;
        }
        self.capture.finish()
    }
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    if args.depth == 0 {
        bail!("--depth must be at least 1");
    }
    let policy = SnapshotPolicy {
        every_messages: args.every.filter(|&n| n > 0),
        every_ticks: args.interval.filter(|&n| n > 0),
    };
    let cfg = ReplayConfig::new(&args.symbol)
        .with_context(|| format!("invalid symbol {:?}", args.symbol))?
        .with_depth(args.depth)
        .with_policy(policy);

    let rdr = open_input(&args.input)?;
    let out_path = args.out.clone().unwrap_or_else(|| default_out_path(cfg.symbol.as_str()));
    let header = FileHeader {
        version: CAPTURE_VERSION,
        created_unix_ns: now_unix_ns(),
        symbol: cfg.symbol.to_string(),
        depth: cfg.depth as u32,
        source: Some(args.input.display().to_string()),
    };
    let mut outputs = Outputs {
        capture: CaptureSink::create(&out_path, header)
            .with_context(|| format!("create {:?}", out_path))?,
        csv: match &args.csv {
            Some(p) => {
                Some(CsvSink::create(p, cfg.depth).with_context(|| format!("create {:?}", p))?)
            }
            None => None,
        },
    };

    // Ctrl+C stops the replay between messages; the final snapshot is still written
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || stop_handler.store(true, Ordering::Relaxed)) {
        warn!("could not install Ctrl+C handler: {e}");
    }

    info!(
        symbol = %cfg.symbol,
        depth = cfg.depth,
        input = ?args.input,
        out = ?out_path,
        "replay starting"
    );
    let started = Instant::now();
    let mut replayer = Replayer::from(&cfg);
    let report = replayer
        .replay(rdr, cfg.policy, &mut outputs, Some(&*stop))
        .with_context(|| format!("replay {:?}", args.input))?;

    let book = replayer.book();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        bid_levels = book.level_count(Side::Bid),
        ask_levels = book.level_count(Side::Ask),
        "snapshots saved to {:?}",
        out_path
    );
    eprintln!(
        "Read {} frames ({} dropped). Wrote {} snapshots to {}.",
        report.frames,
        report.decode_errors,
        report.snapshots,
        out_path.display()
    );
    Ok(())
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    let f = File::open(path).with_context(|| format!("open {:?}", path))?;
    Ok(BufReader::with_capacity(1 << 20, f))
}
