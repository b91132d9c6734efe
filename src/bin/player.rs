use anyhow::{Context, Result, bail};
use clap::Parser;
use itch_book::book::format_price;
use itch_book::record::{CaptureReader, RecordFrame};
use itch_book::sink::{CsvSink, SnapshotSink};
use itch_book::snapshot::Snapshot;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Play a recorded snapshot capture and print or export the book ladders")]
struct Args {
    /// Capture file path to read (recorded .bin)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Print the ladder of every snapshot
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Number of levels to print when dumping
    #[arg(long, default_value_t = 5)]
    top: usize,

    /// Export all snapshots as CSV to this path
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn print_ladder(snap: &Snapshot, top: usize) {
    println!("ts={} | top{} bids / asks:", snap.ts, top);
    let rows = top.min(snap.bids.len().max(snap.asks.len()));
    for i in 0..rows {
        let b = snap
            .bids
            .get(i)
            .map(|l| format!("{:>3}: {:>12} x {:>8}", i, format_price(l.price), l.size))
            .unwrap_or_else(|| format!("{:>3}: -", i));
        let a = snap
            .asks
            .get(i)
            .map(|l| format!("{:>12} x {:>8}", format_price(l.price), l.size))
            .unwrap_or_else(|| "-".to_string());
        println!("{} | {}", b, a);
    }
    println!("---");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let f = File::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
    let mut rdr = CaptureReader::new(BufReader::new(f));

    let header = match rdr.next_frame().context("read capture header")? {
        Some(RecordFrame::Header(h)) => h,
        Some(RecordFrame::Snapshot(_)) => bail!("capture does not start with a header"),
        None => bail!("empty capture file"),
    };
    eprintln!(
        "Header: v{} {} depth={} source={} created={}ns",
        header.version,
        header.symbol,
        header.depth,
        header.source.as_deref().unwrap_or("-"),
        header.created_unix_ns
    );

    let mut csv = match &args.csv {
        Some(p) => Some(
            CsvSink::create(p, header.depth as usize)
                .with_context(|| format!("create {:?}", p))?,
        ),
        None => None,
    };
    let mut snapshots = 0usize;
    let mut last: Option<Snapshot> = None;
    while let Some(frame) = rdr.next_frame().with_context(|| format!("frame {}", rdr.frames()))? {
        match frame {
            RecordFrame::Snapshot(snap) => {
                snapshots += 1;
                if args.dump {
                    print_ladder(&snap, args.top);
                }
                if let Some(csv) = &mut csv {
                    csv.push(snap.clone())?;
                }
                last = Some(snap);
            }
            RecordFrame::Header(_) => bail!("unexpected second header at frame {}", rdr.frames()),
        }
    }
    if let Some(csv) = &mut csv {
        csv.finish()?;
    }

    match last {
        Some(s) => eprintln!(
            "Read {} snapshots. Final ts={}: {} bid levels, {} ask levels.",
            snapshots,
            s.ts,
            s.bids.len(),
            s.asks.len()
        ),
        None => eprintln!("Read 0 snapshots."),
    }
    Ok(())
}
