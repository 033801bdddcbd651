//! Creates a new tickvault file and series, or a new series in an
//! existing file.
//!
//! Fields are listed as `<type> <name>` pairs; valid types are `timestamp`,
//! `date`, `int32`, `int8`, `double`, `char`, `record` and `string(<n>)`.
//! A timestamp field called `_TSDB_timestamp` is prepended automatically
//! and orders the records of the series.
//!
//! ```text
//! tickvault-create usdjpy.tvf series1 double price int32 amount int8 side
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use tickvault::structure::Structure;
use tickvault::timeseries::TIMESTAMP_FIELD_NAME;
use tickvault::{Database, Field, FieldKind, OpenMode, Timeseries};

#[derive(Parser)]
#[command(name = "tickvault-create", about = "Create a tickvault file and series")]
struct Args {
    /// The tickvault file; created when absent.
    file: PathBuf,
    /// Name of the series to create.
    series: String,
    /// Field declarations: <type> <name> pairs.
    #[arg(required = true, num_args = 2..)]
    fields: Vec<String>,
}

fn parse_field(type_text: &str, name: &str) -> Result<Field> {
    let lowered = type_text.to_ascii_lowercase();
    let kind = match lowered.as_str() {
        "timestamp" => FieldKind::Timestamp,
        "date" => FieldKind::Date,
        "int32" => FieldKind::Int32,
        "int8" => FieldKind::Int8,
        "double" => FieldKind::Double,
        "char" => FieldKind::Char,
        "record" => FieldKind::RecordId,
        other => {
            let Some(size_text) = other
                .strip_prefix("string(")
                .and_then(|rest| rest.strip_suffix(')'))
            else {
                bail!("incorrect field type '{}'", type_text);
            };
            let size: usize = size_text
                .parse()
                .with_context(|| format!("incorrect string size '{}'", size_text))?;
            if size < 1 {
                bail!("string size of {} is too small", size);
            }
            FieldKind::Str(size)
        }
    };
    Ok(Field::new(name, kind))
}

fn run(args: Args) -> Result<()> {
    if args.fields.len() % 2 != 0 {
        bail!("each field must have a type and name");
    }

    let mut fields = vec![Field::new(TIMESTAMP_FIELD_NAME, FieldKind::Timestamp)];
    for pair in args.fields.chunks(2) {
        fields.push(parse_field(&pair[0], &pair[1])?);
    }
    // Packed layout for better space utilization on disk.
    let structure = Rc::new(Structure::new(fields, 1)?);

    let db = if args.file.exists() {
        Database::open(&args.file, OpenMode::ReadWrite)
            .with_context(|| format!("cannot open '{}'", args.file.display()))?
    } else {
        Database::create(&args.file, false)
            .with_context(|| format!("cannot create '{}'", args.file.display()))?
    };

    Timeseries::create_with_structure(db.container(), None, &args.series, "", structure)
        .with_context(|| format!("cannot create series '{}'", args.series))?;
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
