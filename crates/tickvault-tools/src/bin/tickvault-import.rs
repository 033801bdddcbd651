//! Reads a delimited data file and appends its records to an existing
//! series, driven by an XML parser specification.
//!
//! ```text
//! tickvault-import usdjpy.xml testdata.csv usdjpy.tvf series1
//! ```
//!
//! Token filters in the specification drop unwanted lines before any
//! parsing effort is spent on them; field parsers map tokens onto the
//! series' fields. Records that overlap the series' last timestamp are
//! discarded with a warning.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::rc::Rc;
use tickvault::{Database, OpenMode};
use tickvault_tools::import::{import_lines, RecordParser};

#[derive(Parser)]
#[command(name = "tickvault-import", about = "Append a delimited file to a series")]
struct Args {
    /// XML parser specification.
    spec: PathBuf,
    /// Delimited input data file.
    input: PathBuf,
    /// The tickvault file.
    file: PathBuf,
    /// Name of the series to append to.
    series: String,
}

fn run(args: Args) -> Result<()> {
    let db = Database::open(&args.file, OpenMode::ReadWrite)
        .with_context(|| format!("cannot open '{}'", args.file.display()))?;
    let mut series = db
        .series(&args.series)
        .with_context(|| format!("cannot open series '{}'", args.series))?;

    let parser = RecordParser::from_xml_file(&args.spec, Rc::clone(series.structure()))
        .with_context(|| format!("cannot load parser from '{}'", args.spec.display()))?;

    let input = File::open(&args.input)
        .with_context(|| format!("cannot open input file '{}'", args.input.display()))?;
    let stats = import_lines(BufReader::new(input), &parser, &mut series)?;

    if stats.discarded > 0 {
        eprintln!(
            "{} record(s) discarded because they were misordered.",
            stats.discarded
        );
    }
    println!(
        "{} lines read: {} appended, {} filtered, {} unparseable.",
        stats.lines, stats.appended, stats.filtered, stats.failed
    );

    drop(series);
    db.close()?;
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
