//! Delimited-file import driven by an XML parser specification.
//!
//! The specification names a delimiter, a set of token filters and a set
//! of field parsers:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8" ?>
//! <dataimport>
//! <delimparser field_delim=",">
//!     <tokenfilter tokens="2" comparison="NE" value="USD/JPY" />
//!     <fieldparser name="_TSDB_timestamp" type="timestamp" tokens="0,1"
//!                  format_string="%Y/%m/%d %H:%M:%S%.f" />
//!     <fieldparser name="price" type="double" tokens="3" />
//!     <fieldparser name="amount" type="int32" tokens="4" />
//!     <fieldparser name="side" type="int8" tokens="5" />
//! </delimparser>
//! </dataimport>
//! ```
//!
//! Token filters run first, in specification order; a line matching any
//! filter is dropped before any parsing effort is spent on it. Field
//! parsers then take one or more tokens each and write one record field.
//! Timestamp and string parsers may consume several tokens, joined with a
//! single space; timestamp format strings use chrono's strftime syntax.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::io::BufRead;
use std::path::Path;
use std::rc::Rc;
use tickvault::structure::Structure;
use tickvault::{Record, RecordSet, Timeseries};
use tracing::{debug, warn};

/// Records accumulated before each append batch.
const IMPORT_BATCH_SIZE: usize = 10_000;

/// Comparison operator of a [`TokenFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Drop the line when the joined tokens equal the value.
    EqualTo,
    /// Drop the line when the joined tokens differ from the value.
    NotEqualTo,
}

/// A pre-parse line filter over raw tokens.
///
/// The selected tokens are joined with single spaces and compared against
/// a constant; a `true` evaluation drops the line.
#[derive(Debug, Clone)]
pub struct TokenFilter {
    tokens: Vec<usize>,
    comparison: Comparison,
    value: String,
}

impl TokenFilter {
    /// Creates a filter over `tokens` (zero-based indices).
    pub fn new(tokens: Vec<usize>, comparison: Comparison, value: impl Into<String>) -> Self {
        Self {
            tokens,
            comparison,
            value: value.into(),
        }
    }

    /// Evaluates the filter; `true` means the line is to be dropped.
    pub fn evaluate(&self, tokens: &[&str]) -> bool {
        let joined = self.join(tokens);
        match self.comparison {
            Comparison::EqualTo => joined == self.value,
            Comparison::NotEqualTo => joined != self.value,
        }
    }

    fn join(&self, tokens: &[&str]) -> String {
        let mut joined = String::new();
        for (i, &t) in self.tokens.iter().enumerate() {
            if i > 0 {
                joined.push(' ');
            }
            joined.push_str(tokens.get(t).copied().unwrap_or(""));
        }
        joined
    }
}

#[derive(Debug, Clone)]
enum FieldParserKind {
    Timestamp { format: String },
    Double,
    Int32,
    Int8,
    Char,
    Str,
}

/// Parses one or more tokens into one record field.
#[derive(Debug, Clone)]
pub struct FieldParser {
    field_index: usize,
    tokens: Vec<usize>,
    kind: FieldParserKind,
}

impl FieldParser {
    fn join(&self, tokens: &[&str]) -> Result<String> {
        let mut joined = String::new();
        for (i, &t) in self.tokens.iter().enumerate() {
            let token = tokens
                .get(t)
                .ok_or_else(|| anyhow!("line has no token {}", t))?;
            if i > 0 {
                joined.push(' ');
            }
            joined.push_str(token);
        }
        Ok(joined)
    }

    fn apply(&self, tokens: &[&str], record: &Record) -> Result<()> {
        let cell = record.cell(self.field_index);
        match &self.kind {
            FieldParserKind::Timestamp { format } => {
                let text = self.join(tokens)?;
                let parsed = NaiveDateTime::parse_from_str(&text, format)
                    .with_context(|| format!("cannot parse '{}' with format '{}'", text, format))?;
                cell.set_i64(parsed.and_utc().timestamp_millis())?;
            }
            FieldParserKind::Double
            | FieldParserKind::Int32
            | FieldParserKind::Int8
            | FieldParserKind::Char
            | FieldParserKind::Str => {
                cell.set_str(&self.join(tokens)?)?;
            }
        }
        Ok(())
    }
}

/// A line parser: a delimiter, token filters and field parsers bound to a
/// record structure.
#[derive(Debug)]
pub struct RecordParser {
    structure: Rc<Structure>,
    delimiter: char,
    filters: Vec<TokenFilter>,
    parsers: Vec<FieldParser>,
}

impl RecordParser {
    /// Builds a parser from an XML specification file, resolving field
    /// names against `structure`.
    pub fn from_xml_file(path: impl AsRef<Path>, structure: Rc<Structure>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("cannot read '{}'", path.as_ref().display()))?;
        Self::from_xml(&text, structure)
    }

    /// Builds a parser from XML text, resolving field names against
    /// `structure`.
    pub fn from_xml(text: &str, structure: Rc<Structure>) -> Result<Self> {
        let doc = roxmltree::Document::parse(text).context("malformed parser specification")?;
        let delimparser = doc
            .descendants()
            .find(|n| n.has_tag_name("delimparser"))
            .context("specification has no <delimparser> element")?;

        let delimiter = delimparser
            .attribute("field_delim")
            .and_then(|d| d.chars().next())
            .unwrap_or(',');

        let mut filters = Vec::new();
        let mut parsers = Vec::new();
        for child in delimparser.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "tokenfilter" => {
                    let tokens = parse_token_list(child.attribute("tokens").unwrap_or(""))?;
                    let value = child.attribute("value").unwrap_or("").to_string();
                    let comparison = match child.attribute("comparison") {
                        Some("EQ") => Comparison::EqualTo,
                        Some("NE") => Comparison::NotEqualTo,
                        other => bail!("unrecognized tokenfilter comparison {:?}", other),
                    };
                    filters.push(TokenFilter::new(tokens, comparison, value));
                }
                "fieldparser" => {
                    let name = child
                        .attribute("name")
                        .context("fieldparser without a name")?;
                    let tokens = parse_token_list(child.attribute("tokens").unwrap_or(""))?;
                    if tokens.is_empty() {
                        bail!("fieldparser '{}' consumes no tokens", name);
                    }
                    let kind = match child.attribute("type") {
                        Some("timestamp") => FieldParserKind::Timestamp {
                            format: child
                                .attribute("format_string")
                                .unwrap_or("%Y-%m-%dT%H:%M:%S%.f")
                                .to_string(),
                        },
                        Some("double") => FieldParserKind::Double,
                        Some("int32") => FieldParserKind::Int32,
                        Some("int8") => FieldParserKind::Int8,
                        Some("char") => FieldParserKind::Char,
                        Some("string") => FieldParserKind::Str,
                        other => bail!("unrecognized fieldparser type {:?}", other),
                    };
                    let field_index = structure
                        .field_index(name)
                        .with_context(|| format!("series has no field '{}'", name))?;
                    parsers.push(FieldParser {
                        field_index,
                        tokens,
                        kind,
                    });
                }
                other => bail!("unrecognized parser element <{}>", other),
            }
        }
        if parsers.is_empty() {
            bail!("specification defines no field parsers");
        }

        Ok(Self {
            structure,
            delimiter,
            filters,
            parsers,
        })
    }

    /// Returns the structure this parser writes into.
    pub fn structure(&self) -> &Rc<Structure> {
        &self.structure
    }

    /// Parses one line into `record`.
    ///
    /// Returns `Ok(false)` when a token filter dropped the line (the
    /// record is untouched), `Ok(true)` when every field parser wrote its
    /// field.
    pub fn parse_line(&self, line: &str, record: &Record) -> Result<bool> {
        let tokens: Vec<&str> = line.split(self.delimiter).map(str::trim).collect();
        if self.filters.iter().any(|f| f.evaluate(&tokens)) {
            return Ok(false);
        }
        for parser in &self.parsers {
            parser.apply(&tokens, record)?;
        }
        Ok(true)
    }
}

fn parse_token_list(text: &str) -> Result<Vec<usize>> {
    text.split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| {
            t.trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("invalid token index '{}'", t))
        })
        .collect()
}

/// Counters reported by [`import_lines`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    /// Lines read from the input.
    pub lines: u64,
    /// Lines dropped by token filters.
    pub filtered: u64,
    /// Lines that failed to parse and were skipped.
    pub failed: u64,
    /// Records discarded by the series for overlapping timestamps.
    pub discarded: u64,
    /// Records appended to the series.
    pub appended: u64,
}

/// Reads delimited lines, parses them and appends the records to
/// `series` in batches, discarding overlaps with a warning.
///
/// Unparseable lines are reported and skipped; blank lines are ignored.
pub fn import_lines(
    reader: impl BufRead,
    parser: &RecordParser,
    series: &mut Timeseries,
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    let mut pending: Vec<Record> = Vec::with_capacity(IMPORT_BATCH_SIZE);

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let record = Record::new(Rc::clone(parser.structure()));
        match parser.parse_line(&line, &record) {
            Ok(true) => pending.push(record),
            Ok(false) => stats.filtered += 1,
            Err(e) => {
                warn!(line = stats.lines, "skipping unparseable line: {:#}", e);
                stats.failed += 1;
            }
        }

        if pending.len() == IMPORT_BATCH_SIZE {
            flush_pending(&mut pending, parser, series, &mut stats)?;
        }
    }
    flush_pending(&mut pending, parser, series, &mut stats)?;
    Ok(stats)
}

fn flush_pending(
    pending: &mut Vec<Record>,
    parser: &RecordParser,
    series: &mut Timeseries,
    stats: &mut ImportStats,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let mut batch = RecordSet::with_capacity(pending.len(), Rc::clone(parser.structure()));
    for (i, record) in pending.iter().enumerate() {
        batch.record(i)?.copy_values(record)?;
    }
    let discarded = series.append_records(&mut batch, true)?;
    if discarded > 0 {
        warn!(discarded, "records discarded because they were misordered");
    }
    stats.discarded += discarded as u64;
    stats.appended += (pending.len() - discarded) as u64;
    debug!(appended = pending.len() - discarded, "appended batch");
    pending.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tickvault::Database;

    const SPEC: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<dataimport>
<delimparser field_delim=",">
    <tokenfilter tokens="2" comparison="NE" value="USD/JPY" />
    <fieldparser name="_TSDB_timestamp" type="timestamp" tokens="0,1" format_string="%Y/%m/%d %H:%M:%S%.f" />
    <fieldparser name="price" type="double" tokens="3" />
    <fieldparser name="amount" type="int32" tokens="4" />
    <fieldparser name="side" type="int8" tokens="5" />
</delimparser>
</dataimport>
"#;

    const DATA: &str = "\
2010/01/01,01:01:01.100,USD/JPY,87.56,5,0
2010/01/01,01:01:01.100,USD/JPY,87.58,6,1
2010/01/01,01:01:01.100,EUR/USD,1.56,1,0
2010/01/01,01:01:01.250,USD/JPY,87.59,25,0
2010/01/01,01:01:01.350,EUR/USD,1.54,1,0
2010/01/01,01:01:01.400,USD/JPY,not-a-price,5,0
2010/01/01,01:01:02.000,USD/JPY,87.61,4,1
";

    fn usdjpy_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path().join("i.tvf"), false).unwrap();
        db.create_series(
            "usdjpy",
            "",
            &[("price", "Double"), ("amount", "Int32"), ("side", "Int8")],
        )
        .unwrap();
        (dir, db)
    }

    #[test]
    fn test_token_filter_joins_with_spaces() {
        let filter = TokenFilter::new(vec![0, 2], Comparison::EqualTo, "a c");
        assert!(filter.evaluate(&["a", "b", "c"]));
        assert!(!filter.evaluate(&["a", "b", "d"]));
    }

    #[test]
    fn test_spec_rejects_unknown_field() {
        let (_dir, db) = usdjpy_db();
        let series = db.series("usdjpy").unwrap();
        let bad = SPEC.replace("name=\"price\"", "name=\"bid\"");
        assert!(RecordParser::from_xml(&bad, Rc::clone(series.structure())).is_err());
    }

    #[test]
    fn test_parse_line_filters_and_parses() {
        let (_dir, db) = usdjpy_db();
        let series = db.series("usdjpy").unwrap();
        let parser = RecordParser::from_xml(SPEC, Rc::clone(series.structure())).unwrap();

        let record = Record::new(Rc::clone(series.structure()));
        let kept = parser
            .parse_line("2010/01/01,01:01:01.100,USD/JPY,87.56,5,0", &record)
            .unwrap();
        assert!(kept);
        assert_eq!(record.cell(0).as_timestamp().unwrap(), 1_262_307_661_100);
        assert_eq!(record.cell(1).as_f64().unwrap(), 87.56);
        assert_eq!(record.cell(2).as_i32().unwrap(), 5);
        assert_eq!(record.cell(3).as_i8().unwrap(), 0);

        let filtered = parser
            .parse_line("2010/01/01,01:01:01.100,EUR/USD,1.56,1,0", &record)
            .unwrap();
        assert!(!filtered);
    }

    #[test]
    fn test_import_end_to_end() {
        let (_dir, db) = usdjpy_db();
        let mut series = db.series("usdjpy").unwrap();
        let parser = RecordParser::from_xml(SPEC, Rc::clone(series.structure())).unwrap();

        let stats = import_lines(Cursor::new(DATA), &parser, &mut series).unwrap();
        assert_eq!(stats.lines, 7);
        assert_eq!(stats.filtered, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.discarded, 0);
        assert_eq!(stats.appended, 4);

        assert_eq!(series.size().unwrap(), 4);
        let last = series.last_record().unwrap().unwrap();
        assert_eq!(last.cell(1).as_f64().unwrap(), 87.61);
        assert_eq!(
            last.cell(0).as_timestamp().unwrap(),
            1_262_307_662_000
        );
    }
}
