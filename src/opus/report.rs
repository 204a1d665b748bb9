//! Report blocks, e.g. the multi-evaluation test reports written by Opus.
//!
//! A report block starts with 12 unused bytes and a parameter block giving the report title
//! (`tit`) and the offset of the summary (`f00`). The summary and each subreport are laid out
//! the same way: a small parameter block describing a table, followed by the packed table
//! itself. The parameter block gives the number of columns (`nco`) and rows (`nln`), its own
//! size (`siz`), the bytes per row (`src`) and for each column its offset in the row
//! (`fXX`), type (`tXX`) and label (`sXX`).
use std::sync::OnceLock;

use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::{error::{OpusError, OpusResult}, utils::ByteReader};
use super::{constants::bruker::{ParamValue, SubreportNumeric, SUBREPORT_STRING_BASE}, params::parse_params};

const REPORT_RESERVED_LEN: usize = 12;

/// One cell of a report table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Int(i32),
    Float(f64),
    Text(String),
    /// Bytes of a column type that is not understood
    Raw(Vec<u8>),
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Raw(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// A subreport as stored: its describing parameters and the cells, indexed as `rows[row][column]`
#[derive(Debug, Clone, PartialEq)]
pub struct Subreport {
    pub info: IndexMap<String, ParamValue>,
    pub rows: Vec<Vec<CellValue>>,
}

fn indexed_key(prefix: char, idx: usize) -> String {
    format!("{prefix}{idx:02}")
}

fn get_int(info: &IndexMap<String, ParamValue>, key: &str) -> OpusResult<i32> {
    info.get(key)
        .ok_or_else(|| OpusError::MissingParameter(key.to_string()))?
        .as_integer()
        .map_err(|inner| OpusError::ParamType { key: key.to_string(), inner })
}

fn get_usize(info: &IndexMap<String, ParamValue>, key: &str) -> OpusResult<usize> {
    let value = get_int(info, key)?;
    usize::try_from(value)
        .map_err(|_| OpusError::InvalidReport(format!("{key} is negative ({value})")))
}

/// Parse a subreport that starts at the beginning of `bytes`. `bytes` may run past the end
/// of the subreport.
pub fn parse_subreport(bytes: &[u8]) -> OpusResult<Subreport> {
    let info = parse_params(bytes)?;
    let ncols = get_usize(&info, "nco")?;
    let nrows = get_usize(&info, "nln")?;
    let siz = get_usize(&info, "siz")?;
    let src = get_usize(&info, "src")?;

    // Counts come from the file, so nothing is pre-sized from them
    let mut col_offsets = Vec::new();
    let mut col_types = Vec::new();
    for c in 0..ncols {
        let offset = get_usize(&info, &indexed_key('f', c))?;
        if offset >= src {
            return Err(OpusError::InvalidReport(format!(
                "column {c} starts at byte {offset} of a {src}-byte row"
            )));
        }
        col_offsets.push(offset);
        col_types.push(get_int(&info, &indexed_key('t', c))?);
    }

    if nrows > 0 && src == 0 {
        return Err(OpusError::InvalidReport(format!("{nrows} rows of zero bytes each")));
    }
    let table_end = nrows.checked_mul(src).and_then(|n| n.checked_add(siz));
    match table_end {
        Some(end) if end <= bytes.len() => (),
        _ => return Err(OpusError::InvalidReport(format!(
            "table of {nrows} rows x {src} bytes after {siz} header bytes does not fit in {} bytes", bytes.len()
        ))),
    }

    let rdr = ByteReader::new(bytes);
    let mut rows = Vec::with_capacity(nrows);
    for r in 0..nrows {
        let row_start = siz + r * src;
        let mut row = Vec::with_capacity(col_offsets.len());
        for c in 0..ncols {
            // Room for this cell: up to the next column, or the end of the row for the last
            let next = col_offsets.get(c + 1).copied().unwrap_or(src);
            let room = next.saturating_sub(col_offsets[c]);
            let offset = row_start + col_offsets[c];
            let type_code = col_types[c];

            let cell = if type_code > SUBREPORT_STRING_BASE {
                let declared = (type_code - SUBREPORT_STRING_BASE) as usize;
                CellValue::Text(rdr.read_string(offset, declared.min(room)))
            } else {
                match SubreportNumeric::from_type_code(type_code) {
                    Some(SubreportNumeric::Int32) => CellValue::Int(rdr.read_i32(offset, "subreport cell")?),
                    Some(SubreportNumeric::Float32) => CellValue::Float(rdr.read_f32(offset, "subreport cell")? as f64),
                    Some(SubreportNumeric::Float64) => CellValue::Float(rdr.read_f64(offset, "subreport cell")?),
                    None => CellValue::Raw(rdr.read_bytes_clamped(offset, room).to_vec()),
                }
            };
            row.push(cell);
        }
        rows.push(row);
    }

    Ok(Subreport { info, rows })
}

/// A table from a report, presented with each stored column as a row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub title: String,
    /// Label of each row (the stored column labels)
    pub header: Vec<String>,
    pub values: Vec<Vec<CellValue>>,
}

impl ReportTable {
    pub fn from_subreport(title: String, subreport: &Subreport) -> Self {
        let ncols = subreport.rows.first().map(|r| r.len())
            .unwrap_or_else(|| get_usize(&subreport.info, "nco").unwrap_or(0));

        let header = (0..ncols)
            .map(|c| {
                subreport.info.get(&indexed_key('s', c))
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            }).collect();

        let values = (0..ncols)
            .map(|c| subreport.rows.iter().map(|row| row[c].clone()).collect())
            .collect();

        Self { title, header, values }
    }

    pub fn num_rows(&self) -> usize {
        self.values.len()
    }

    /// Number of values in each row
    pub fn num_cols(&self) -> usize {
        self.values.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn row(&self, idx: usize) -> Option<&[CellValue]> {
        self.values.get(idx).map(|r| r.as_slice())
    }

    /// Find a row by its header label, ignoring case
    pub fn row_by_label(&self, label: &str) -> Option<&[CellValue]> {
        let idx = self.header.iter().position(|h| h.eq_ignore_ascii_case(label))?;
        self.row(idx)
    }
}

/// A decoded report block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub title: String,
    /// Labelled values from the report summary, e.g. "Version"
    pub properties: IndexMap<String, String>,
    pub table: ReportTable,
    pub subreports: Vec<ReportTable>,
}

impl Report {
    /// Look up a property by label, ignoring case
    pub fn property(&self, label: &str) -> Option<&str> {
        self.properties.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
    }

    pub fn subreport(&self, idx: usize) -> Option<&ReportTable> {
        self.subreports.get(idx)
    }
}

fn property_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^h\d\d$").expect("property key regex should be valid"))
}

/// Parse a full report block: the summary table, its properties and all the subreports.
///
/// Only one report per block is supported; a block declaring more than one (`nrp` > 1) is
/// an error.
pub fn parse_report(block: &[u8]) -> OpusResult<Report> {
    let rdr = ByteReader::new(block);
    let header_bytes = rdr.read_bytes(REPORT_RESERVED_LEN, block.len().saturating_sub(REPORT_RESERVED_LEN), "report header")?;
    let header = parse_params(header_bytes)?;

    if let Some(nrp) = header.get("nrp").and_then(|v| v.as_integer().ok()) {
        if nrp > 1 {
            return Err(OpusError::Unsupported(format!("report block contains {nrp} reports, only one is supported")));
        }
    }

    let title = header.get("tit").map(|v| v.to_string()).unwrap_or_default();
    let summary_start = get_usize(&header, "f00")?;
    let summary_bytes = rdr.read_bytes(summary_start, block.len().saturating_sub(summary_start), "report summary")?;
    let summary = parse_subreport(summary_bytes)?;

    let mut properties = IndexMap::new();
    for (key, label) in summary.info.iter().filter(|(k, _)| property_key_re().is_match(k)) {
        let value_key = format!("v{}", &key[1..]);
        match summary.info.get(&value_key) {
            Some(value) => { properties.insert(label.to_string(), value.to_string()); },
            None => debug!("Report property '{label}' ({key}) has no value"),
        }
    }

    let table_title = header.get("e00")
        .map(|v| v.to_string())
        .unwrap_or_else(|| title.clone());
    let table = ReportTable::from_subreport(table_title, &summary);

    let nsub = match summary.info.get("sub") {
        Some(_) => get_usize(&summary.info, "sub")?,
        None => 0,
    };
    let mut subreports = Vec::with_capacity(nsub);
    for i in 0..nsub {
        let start = summary_start + get_usize(&summary.info, &indexed_key('g', i))?;
        let bytes = rdr.read_bytes(start, block.len().saturating_sub(start), "subreport")?;
        let sub_title = summary.info.get(&indexed_key('u', i))
            .map(|v| v.to_string())
            .unwrap_or_else(|| format!("Subreport {i}"));
        subreports.push(ReportTable::from_subreport(sub_title, &parse_subreport(bytes)?));
    }

    Ok(Report { title, properties, table, subreports })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use super::*;
    use crate::test_utils::{ParamBlockBuilder, ReportBuilder, SubreportBuilder};

    #[test]
    fn test_string_and_float_subreport() {
        // Declared string width (3) is narrower than the room before the next column (8)
        let bytes = SubreportBuilder::new()
            .string_column("Method", 1003, 8)
            .f64_column("Result", 8)
            .row(|cells| cells.string("abc").f64(1.25))
            .build();

        let sub = parse_subreport(&bytes).unwrap();
        assert_eq!(sub.rows.len(), 1);
        assert_eq!(sub.rows[0][0], CellValue::Text("abc".to_string()));
        match sub.rows[0][1] {
            CellValue::Float(v) => assert_abs_diff_eq!(v, 1.25),
            ref other => panic!("Expected a float cell, got {other:?}"),
        }
    }

    #[test]
    fn test_overlong_string_width_is_clamped() {
        // Declared string width (20) runs into the next column (4 bytes on), and the last
        // column declares more than the rest of the row
        let bytes = SubreportBuilder::new()
            .string_column("Name", 1020, 4)
            .string_column("Comment", 1050, 6)
            .row(|cells| cells.string("abcd").string("xyz"))
            .build();

        let sub = parse_subreport(&bytes).unwrap();
        assert_eq!(sub.rows[0], vec![CellValue::Text("abcd".to_string()), CellValue::Text("xyz".to_string())]);
    }

    #[test]
    fn test_numeric_and_raw_columns() {
        let bytes = SubreportBuilder::new()
            .int_column("Count", 4)
            .f32_column("Ratio", 4)
            .raw_column("Flags", 77, 4)
            .row(|cells| cells.int(-7).f32(0.5).raw(&[1, 2, 3, 4]))
            .row(|cells| cells.int(8).f32(1.5).raw(&[5, 6, 7, 8]))
            .build();

        let sub = parse_subreport(&bytes).unwrap();
        assert_eq!(sub.rows.len(), 2);
        assert_eq!(sub.rows[1][0], CellValue::Int(8));
        assert_eq!(sub.rows[0][1], CellValue::Float(0.5));
        assert_eq!(sub.rows[1][2], CellValue::Raw(vec![5, 6, 7, 8]));

        let table = ReportTable::from_subreport("t".to_string(), &sub);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_cols(), 2);
        assert_eq!(table.header, ["Count", "Ratio", "Flags"]);
        assert_eq!(table.row_by_label("count").unwrap(), &[CellValue::Int(-7), CellValue::Int(8)]);
        assert!(table.row_by_label("missing").is_none());
    }

    #[test]
    fn test_missing_column_type() {
        let bytes = ParamBlockBuilder::new()
            .int("NCO", 1)
            .int("NLN", 1)
            .int("SIZ", 64)
            .int("SRC", 4)
            .int("F00", 0)
            .finish();
        assert!(matches!(parse_subreport(&bytes), Err(OpusError::MissingParameter(k)) if k == "t00"));
    }

    #[rstest]
    #[case::huge_column_count(i32::MAX, 1, 4)]
    #[case::huge_row_count(1, i32::MAX, 4)]
    #[case::empty_rows(0, i32::MAX, 0)]
    #[case::rows_past_end(1, 5, 4)]
    fn test_implausible_table_size(#[case] ncols: i32, #[case] nrows: i32, #[case] src: i32) {
        let bytes = ParamBlockBuilder::new()
            .int("NCO", ncols)
            .int("NLN", nrows)
            .int("SIZ", 64)
            .int("SRC", src)
            .int("F00", 0)
            .int("T00", 0)
            .finish();
        match parse_subreport(&bytes) {
            Err(OpusError::InvalidReport(_)) | Err(OpusError::MissingParameter(_)) => (),
            other => panic!("Expected an invalid report error, got {other:?}"),
        }
    }

    #[test]
    fn test_column_outside_row() {
        let bytes = ParamBlockBuilder::new()
            .int("NCO", 1)
            .int("NLN", 1)
            .int("SIZ", 72)
            .int("SRC", 4)
            .int("F00", 4)
            .int("T00", 0)
            .finish();
        assert!(matches!(parse_subreport(&bytes), Err(OpusError::InvalidReport(_))));
    }

    #[test]
    fn test_full_report() {
        let summary = SubreportBuilder::new()
            .string_column("Method", 1010, 12)
            .f64_column("Score", 8)
            .row(|cells| cells.string("Check A").f64(0.9))
            .property("Version", "1.2")
            .property("Operator", "QA");
        let sub = SubreportBuilder::new()
            .int_column("Peak", 4)
            .row(|cells| cells.int(42))
            .build();

        let block = ReportBuilder::new("Multi-Evaluation Test Report")
            .table_title("Summary")
            .summary(summary)
            .subreport("Peak Check", sub)
            .build();

        let report = parse_report(&block).unwrap();
        assert_eq!(report.title, "Multi-Evaluation Test Report");
        assert_eq!(report.table.title, "Summary");
        assert_eq!(report.property("version"), Some("1.2"));
        assert_eq!(report.property("OPERATOR"), Some("QA"));
        assert_eq!(report.properties.len(), 2);
        assert_eq!(report.table.row_by_label("Method").unwrap(), &[CellValue::Text("Check A".to_string())]);

        let sub = report.subreport(0).unwrap();
        assert_eq!(sub.title, "Peak Check");
        assert_eq!(sub.row(0).unwrap(), &[CellValue::Int(42)]);
        assert!(report.subreport(1).is_none());
    }

    #[test]
    fn test_multi_report_unsupported() {
        let summary = SubreportBuilder::new()
            .int_column("Peak", 4)
            .row(|cells| cells.int(1));
        let block = ReportBuilder::new("Two reports")
            .num_reports(2)
            .summary(summary)
            .build();
        assert!(matches!(parse_report(&block), Err(OpusError::Unsupported(_))));
    }
}
