//! Streams the records of a series between two timestamps to stdout.
//!
//! ```text
//! tickvault-view usdjpy.tvf series1 20100101T000000 20100102T000000
//! ```
//!
//! Timestamps use the compact form `YYYYMMDDThhmmss` with optional
//! fractional seconds. Records print comma-separated, one per line, with
//! the record id of each 100-record stripe leading the stripe.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tickvault::{Database, OpenMode};
use tickvault_tools::parse_compact_timestamp;

/// Records fetched from the series per read.
const VIEW_BLOCK: u64 = 10_000;

/// Records per printed stripe.
const STRIPE: usize = 100;

#[derive(Parser)]
#[command(name = "tickvault-view", about = "Print a timestamp range of a series")]
struct Args {
    /// The tickvault file.
    file: PathBuf,
    /// Name of the series to read.
    series: String,
    /// Start timestamp, inclusive (YYYYMMDDThhmmss).
    start: String,
    /// End timestamp, inclusive (YYYYMMDDThhmmss).
    end: String,
}

fn run(args: Args) -> Result<()> {
    let start = parse_compact_timestamp(&args.start)?;
    let end = parse_compact_timestamp(&args.end)?;

    let db = Database::open(&args.file, OpenMode::Read)
        .with_context(|| format!("cannot open '{}'", args.file.display()))?;
    let series = db
        .series(&args.series)
        .with_context(|| format!("cannot open series '{}'", args.series))?;

    let Some(start_id) = series.record_id_ge(start)? else {
        return Ok(());
    };
    if series.record_id_le(end)?.is_none() {
        return Ok(());
    }
    let end_id = if end == i64::MAX {
        series.size()? - 1
    } else {
        match series.record_id_ge(end + 1)? {
            Some(gt_id) => gt_id - 1,
            None => series.size()? - 1,
        }
    };
    if end_id < start_id {
        return Ok(());
    }

    // Load one block of records at a time and print it in stripes.
    let mut block_first = start_id;
    while block_first <= end_id {
        let block_last = (block_first + VIEW_BLOCK - 1).min(end_id);
        let set = series.record_set_by_id(block_first, block_last)?;
        let mut stripe_first = 0usize;
        while stripe_first < set.len() {
            let stripe_len = STRIPE.min(set.len() - stripe_first);
            let stripe = set.tail(stripe_first).head(stripe_len);
            println!(
                "{}{}",
                block_first + stripe_first as u64,
                stripe.to_delimited(",", "\n")
            );
            stripe_first += stripe_len;
        }
        block_first = block_last + 1;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    if let Err(e) = run(Args::parse()) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
