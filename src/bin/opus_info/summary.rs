//! Tables and JSON output describing decoded files
use std::fmt::Write;

use bruker_opus::opus::{param_label, Bucket, DecodedFile, FailedBlock, FileBlock, ParameterSet, Record, Report};
use chrono::NaiveDateTime;
use error_stack::ResultExt;
use indexmap::IndexMap;
use serde::Serialize;
use tabled::{settings::{Alignment, Style}, Table, Tabled};

use crate::CliError;

/// Lay out rows as a borderless, left-aligned table
pub(crate) fn render_table<T: Tabled, I: IntoIterator<Item = T>>(rows: I) -> String {
    let mut table = Table::new(rows);
    table.with(Style::blank())
        .with(Alignment::left());
    table.to_string()
}

#[derive(Debug, Tabled)]
pub(crate) struct BlockRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Type")]
    block_type: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Start")]
    start: usize,
    #[tabled(rename = "Bytes")]
    size: usize,
    #[tabled(rename = "Status")]
    status: String,
}

impl BlockRow {
    pub(crate) fn new(index: usize, parsed: Result<FileBlock, FailedBlock>) -> Self {
        let (descriptor, kind, status) = match parsed {
            Ok(block) => (block.descriptor, block.kind, "ok".to_string()),
            Err(failed) => (failed.descriptor, failed.kind, format!("error: {}", failed.error)),
        };
        Self {
            index,
            block_type: descriptor.block_type.to_string(),
            label: descriptor.label(),
            kind: kind.to_string(),
            start: descriptor.start,
            size: descriptor.size,
            status,
        }
    }
}

#[derive(Debug, Tabled)]
struct ParamRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub(crate) fn render_params(params: &ParameterSet) -> String {
    let rows = params.iter().map(|(key, value)| ParamRow {
        key: key.to_ascii_uppercase(),
        description: param_label(key),
        value: value.to_string(),
    });
    render_table(rows)
}

#[derive(Debug, Serialize)]
struct RecordSummary {
    key: String,
    label: String,
    series: bool,
    num_points: usize,
    num_spectra: Option<usize>,
    first_x: Option<f64>,
    last_x: Option<f64>,
    x_units: Option<String>,
    datetime: Option<NaiveDateTime>,
    velocity: Option<f64>,
}

impl From<&Record> for RecordSummary {
    fn from(rec: &Record) -> Self {
        Self {
            key: rec.key().to_string(),
            label: rec.label(),
            series: rec.is_series(),
            num_points: rec.num_points(),
            num_spectra: rec.as_series().map(|s| s.num_spectra()),
            first_x: rec.x().first().copied(),
            last_x: rec.x().last().copied(),
            x_units: rec.params().dxu().map(|s| s.to_string()),
            datetime: rec.datetime(),
            velocity: rec.vel(),
        }
    }
}

#[derive(Debug, Tabled)]
struct RecordRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Points")]
    points: String,
    #[tabled(rename = "X range")]
    x_range: String,
    #[tabled(rename = "Measured")]
    measured: String,
}

impl From<&RecordSummary> for RecordRow {
    fn from(s: &RecordSummary) -> Self {
        let points = match s.num_spectra {
            Some(n) => format!("{n} x {}", s.num_points),
            None => s.num_points.to_string(),
        };
        let x_range = match (s.first_x, s.last_x) {
            (Some(a), Some(b)) => format!("{a:.4} - {b:.4} {}", s.x_units.as_deref().unwrap_or("")),
            _ => "-".to_string(),
        };
        Self {
            key: s.key.clone(),
            label: s.label.clone(),
            points,
            x_range: x_range.trim_end().to_string(),
            measured: s.datetime.map(|dt| dt.to_string()).unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct FileSummary<'a> {
    version: f64,
    directory_truncated: bool,
    datetime: Option<NaiveDateTime>,
    sample_params: &'a ParameterSet,
    reference_params: &'a ParameterSet,
    records: Vec<RecordSummary>,
    reports: &'a [Report],
    history: Option<&'a str>,
    blocks: IndexMap<String, usize>,
}

impl<'a> From<&'a DecodedFile> for FileSummary<'a> {
    fn from(opus: &'a DecodedFile) -> Self {
        Self {
            version: opus.header.version,
            directory_truncated: opus.directory_truncated,
            datetime: opus.datetime(),
            sample_params: &opus.params,
            reference_params: &opus.rf_params,
            records: opus.records().map(RecordSummary::from).collect(),
            reports: &opus.reports,
            history: opus.history.as_deref(),
            blocks: bucket_counts(opus),
        }
    }
}

fn bucket_counts(opus: &DecodedFile) -> IndexMap<String, usize> {
    opus.block_buckets()
        .into_iter()
        .map(|(bucket, n): (Bucket, usize)| (bucket.to_string(), n))
        .collect()
}

/// Print the summaries of (name, file) pairs as one JSON object keyed by name
pub(crate) fn print_json(files: &[(String, DecodedFile)]) -> error_stack::Result<(), CliError> {
    let summaries: IndexMap<&str, FileSummary> = files.iter()
        .map(|(name, opus)| (name.as_str(), FileSummary::from(opus)))
        .collect();
    let s = serde_json::to_string_pretty(&summaries)
        .change_context_lazy(|| CliError::context("Error serializing file summary to JSON"))?;
    println!("{s}");
    Ok(())
}

pub(crate) fn render_summary(opus: &DecodedFile) -> Result<String, std::fmt::Error> {
    let summary = FileSummary::from(opus);
    let mut out = String::new();
    writeln!(out, "Opus file version {}", summary.version)?;
    if let Some(dt) = summary.datetime {
        writeln!(out, "Measured {dt}")?;
    }
    writeln!(out, "{} ({} values)", opus.params.label(), opus.params.len())?;
    if !opus.rf_params.is_empty() {
        writeln!(out, "{} ({} values)", opus.rf_params.label(), opus.rf_params.len())?;
    }

    writeln!(out, "\nData records:")?;
    if summary.records.is_empty() {
        writeln!(out, "  none")?;
    } else {
        writeln!(out, "{}", render_table(summary.records.iter().map(RecordRow::from)))?;
    }

    for report in summary.reports {
        writeln!(out, "\nReport: {} ({} subreports)", report.title, report.subreports.len())?;
        for (label, value) in report.properties.iter() {
            writeln!(out, "  {label}: {value}")?;
        }
    }

    writeln!(out, "\nBlocks:")?;
    for (bucket, n) in summary.blocks.iter().filter(|(_, &n)| n > 0) {
        writeln!(out, "  {bucket}: {n}")?;
    }
    if summary.directory_truncated {
        writeln!(out, "  (directory truncated)")?;
    }
    Ok(out)
}
