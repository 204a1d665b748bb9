//! Decoding whole Opus files.
//!
//! The entry points are [`read_opus`] for files on disk and [`DecodedFile::from_bytes`] for
//! a file already in memory. Decoding goes in three steps: the directory is read, every
//! block it lists is parsed on its own (see [`block`]), and then data blocks are paired with
//! their status blocks (see [`pairing`]) and decoded into [`Record`]s.
use std::{fs::File, io::{ErrorKind, Read}, path::Path};

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::{config::DecodeOptions, error::OpusResult};

pub mod block;
pub mod block_type;
pub mod constants;
pub mod data;
pub mod header;
pub mod pairing;
pub mod params;
pub mod report;

pub use block::{FailedBlock, FileBlock};
pub use block_type::{BlockKind, TypeCode};
pub use constants::bruker::{param_label, ParamValue};
pub use data::{DataRecord, DataSeriesRecord, Record, SeriesColumn};
pub use header::{is_opus, BlockDescriptor, Directory, OpusHeader};
pub use params::ParameterSet;
pub use report::{CellValue, Report, ReportTable};

use block::BlockContent;
use data::SeriesLayout;
use pairing::{DataCandidate, StatusCandidate};

/// Categories every block of a decoded file is sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum Bucket {
    #[strum(to_string = "directory")]
    Directory,
    #[strum(to_string = "sample parameters")]
    Params,
    #[strum(to_string = "reference parameters")]
    RfParams,
    #[strum(to_string = "data")]
    Data,
    #[strum(to_string = "data status")]
    DataStatus,
    #[strum(to_string = "reports")]
    Reports,
    #[strum(to_string = "history")]
    History,
    #[strum(to_string = "unmatched data")]
    UnmatchedData,
    #[strum(to_string = "unmatched status")]
    UnmatchedStatus,
    #[strum(to_string = "unknown")]
    Unknown,
    #[strum(to_string = "parse errors")]
    ParseErrors,
}

/// The decoded contents of an Opus file.
///
/// Every block listed in the directory ends up in exactly one place: the sample or reference
/// parameters, a data record (data block plus status block), a report, the history, or one
/// of the buckets of blocks that could not be used. [`DecodedFile::block_buckets`] counts
/// them.
#[derive(Debug)]
pub struct DecodedFile {
    pub header: OpusHeader,
    /// `true` if the directory could not be read to the end
    pub directory_truncated: bool,
    /// Sample parameters, merged from every non-status parameter block not for the reference channel
    pub params: ParameterSet,
    /// Reference channel parameters
    pub rf_params: ParameterSet,
    records: IndexMap<String, Record>,
    pub reports: Vec<Report>,
    /// Text of the history (file log) block(s), if any
    pub history: Option<String>,
    pub directory_blocks: Vec<BlockDescriptor>,
    pub history_blocks: Vec<BlockDescriptor>,
    /// Data blocks that could not be paired with exactly one status block
    pub unmatched_data: Vec<BlockDescriptor>,
    /// Data status blocks not paired with any data block
    pub unmatched_status: Vec<BlockDescriptor>,
    pub unknown_blocks: Vec<BlockDescriptor>,
    pub failed_blocks: Vec<FailedBlock>,
}

/// Read and decode an Opus file.
///
/// Returns `Ok(None)` if the file does not start with the Opus magic bytes (including if it
/// is shorter than that); only failures to read the file are errors.
pub fn read_opus(path: &Path) -> OpusResult<Option<DecodedFile>> {
    read_opus_with_options(path, &DecodeOptions::default())
}

pub fn read_opus_with_options(path: &Path, options: &DecodeOptions) -> OpusResult<Option<DecodedFile>> {
    let mut f = File::open(path)?;
    let mut magic = [0u8; 4];
    match f.read_exact(&mut magic) {
        Ok(()) => (),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    if !is_opus(&magic) {
        debug!("{} is not an Opus file", path.display());
        return Ok(None);
    }

    let mut buf = magic.to_vec();
    f.read_to_end(&mut buf)?;
    Ok(DecodedFile::from_bytes_with_options(&buf, options))
}

impl DecodedFile {
    /// Decode an Opus file held in memory, returning `None` if it is not an Opus file.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        Self::from_bytes_with_options(buf, &DecodeOptions::default())
    }

    pub fn from_bytes_with_options(buf: &[u8], options: &DecodeOptions) -> Option<Self> {
        if !is_opus(buf) {
            return None;
        }

        let directory = Directory::read(buf);
        let parsed: Vec<Result<FileBlock, FailedBlock>> = if options.parallel {
            directory.entries.par_iter()
                .map(|&d| FileBlock::parse(buf, d, options))
                .collect()
        } else {
            directory.entries.iter()
                .map(|&d| FileBlock::parse(buf, d, options))
                .collect()
        };

        Some(Self::assemble(buf, directory, parsed))
    }

    fn assemble(buf: &[u8], directory: Directory, parsed: Vec<Result<FileBlock, FailedBlock>>) -> Self {
        let mut me = Self {
            header: directory.header,
            directory_truncated: directory.truncated,
            params: ParameterSet::default(),
            rf_params: ParameterSet::default(),
            records: IndexMap::new(),
            reports: vec![],
            history: None,
            directory_blocks: vec![],
            history_blocks: vec![],
            unmatched_data: vec![],
            unmatched_status: vec![],
            unknown_blocks: vec![],
            failed_blocks: vec![],
        };

        let mut param_blocks = vec![];
        let mut rf_param_blocks = vec![];
        let mut status_blocks = vec![];
        let mut data_blocks: Vec<(BlockDescriptor, Option<SeriesLayout>)> = vec![];
        let mut history = vec![];

        for result in parsed {
            let block = match result {
                Ok(b) => b,
                Err(failed) => {
                    warn!("Could not parse {} block at {}: {}", failed.descriptor.label(), failed.descriptor.start, failed.error);
                    me.failed_blocks.push(failed);
                    continue;
                }
            };

            let block_type = block.descriptor.block_type;
            match block.content {
                BlockContent::Directory => me.directory_blocks.push(block.descriptor),
                BlockContent::History(text) => {
                    history.push(text);
                    me.history_blocks.push(block.descriptor);
                },
                BlockContent::Parameters(values) if block_type.is_data_status() => {
                    status_blocks.push((block.descriptor, ParameterSet::from_block(block_type, values)));
                },
                BlockContent::Parameters(values) if block_type.is_rf_param() => rf_param_blocks.push((block_type, values)),
                BlockContent::Parameters(values) => param_blocks.push((block_type, values)),
                BlockContent::Report(report) => me.reports.push(report),
                BlockContent::Data => data_blocks.push((block.descriptor, None)),
                BlockContent::DataSeries(layout) => data_blocks.push((block.descriptor, Some(layout))),
                BlockContent::Unknown => {
                    debug!("Unknown block type {} at {}", block_type, block.descriptor.start);
                    me.unknown_blocks.push(block.descriptor);
                },
            }
        }

        me.params = ParameterSet::merge(param_blocks);
        me.rf_params = ParameterSet::merge(rf_param_blocks);
        if !history.is_empty() {
            me.history = Some(history.join("\n"));
        }
        me.add_records(buf, data_blocks, status_blocks);
        me
    }

    fn add_records(&mut self, buf: &[u8], data_blocks: Vec<(BlockDescriptor, Option<SeriesLayout>)>, status_blocks: Vec<(BlockDescriptor, ParameterSet)>) {
        let mut data = Vec::with_capacity(data_blocks.len());
        for (descriptor, layout) in data_blocks.iter() {
            // already checked to be in bounds when the block was parsed
            let bytes = block::block_bytes(buf, descriptor).unwrap_or_default();
            data.push(DataCandidate { descriptor: *descriptor, bytes, is_series: layout.is_some() });
        }
        let status: Vec<StatusCandidate> = status_blocks.iter()
            .map(|(descriptor, params)| StatusCandidate { descriptor: *descriptor, params })
            .collect();

        let pairing = pairing::pair_blocks(&data, &status);
        self.unmatched_data.extend(pairing.unmatched_data.iter().map(|&i| data[i].descriptor));
        self.unmatched_status.extend(pairing.unmatched_status.iter().map(|&j| status[j].descriptor));
        drop(status);

        let status_descriptors: Vec<BlockDescriptor> = status_blocks.iter().map(|(d, _)| *d).collect();
        let mut status_params: Vec<Option<ParameterSet>> = status_blocks.into_iter().map(|(_, p)| Some(p)).collect();
        for (i, j) in pairing.pairs {
            let Some(params) = status_params[j].take() else {
                continue;
            };
            let candidate = &data[i];
            let block_type = candidate.descriptor.block_type;
            let key = self.unique_key(block_type.data_key());
            let vel = if block_type.channel_role == 2 { self.rf_params.vel() } else { self.params.vel() };

            let record = match &data_blocks[i].1 {
                None => DataRecord::new(key.clone(), candidate.descriptor, params, candidate.bytes, vel)
                    .map(Record::Single),
                Some(layout) => DataSeriesRecord::new(key.clone(), candidate.descriptor, params, candidate.bytes, layout, vel)
                    .map(Record::Series),
            };

            match record {
                Ok(rec) => {
                    debug!("Decoded '{key}' ({}) from block at {}", rec.label(), candidate.descriptor.start);
                    self.records.insert(key, rec);
                },
                Err(error) => {
                    warn!("Could not decode {} block at {}: {error}", candidate.descriptor.label(), candidate.descriptor.start);
                    self.unmatched_status.push(status_descriptors[j]);
                    self.failed_blocks.push(FailedBlock { descriptor: candidate.descriptor, kind: block_type.classify(), error });
                },
            }
        }
    }

    /// `key`, or if that is taken, `key` with the first free suffix of "_2", "_3", ...
    fn unique_key(&self, key: String) -> String {
        if !self.records.contains_key(&key) {
            return key;
        }
        (2..)
            .map(|n| format!("{key}_{n}"))
            .find(|k| !self.records.contains_key(k))
            .unwrap_or(key)
    }

    /// Look up a data record by key, e.g. "sm", "igrf" or "a"
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// All data records in the order they were decoded
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// All 1D data records
    pub fn iter_data(&self) -> impl Iterator<Item = &DataRecord> {
        self.records.values().filter_map(|r| r.as_single())
    }

    /// All data series records
    pub fn iter_series(&self) -> impl Iterator<Item = &DataSeriesRecord> {
        self.records.values().filter_map(|r| r.as_series())
    }

    pub fn data_keys(&self) -> Vec<&str> {
        self.iter_data().map(|r| r.key.as_str()).collect()
    }

    pub fn series_keys(&self) -> Vec<&str> {
        self.iter_series().map(|r| r.key.as_str()).collect()
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// Time of the most recent measurement among the data records
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        self.records.values().filter_map(|r| r.datetime()).max()
    }

    /// Number of directory blocks in each bucket
    pub fn block_buckets(&self) -> IndexMap<Bucket, usize> {
        let mut buckets = IndexMap::new();
        buckets.insert(Bucket::Directory, self.directory_blocks.len());
        buckets.insert(Bucket::Params, self.params.num_blocks());
        buckets.insert(Bucket::RfParams, self.rf_params.num_blocks());
        buckets.insert(Bucket::Data, self.records.len());
        buckets.insert(Bucket::DataStatus, self.records.len());
        buckets.insert(Bucket::Reports, self.reports.len());
        buckets.insert(Bucket::History, self.history_blocks.len());
        buckets.insert(Bucket::UnmatchedData, self.unmatched_data.len());
        buckets.insert(Bucket::UnmatchedStatus, self.unmatched_status.len());
        buckets.insert(Bucket::Unknown, self.unknown_blocks.len());
        buckets.insert(Bucket::ParseErrors, self.failed_blocks.len());
        buckets
    }

    /// Total number of blocks accounted for. This equals the number of directory entries read.
    pub fn block_count(&self) -> usize {
        self.block_buckets().values().sum()
    }
}
