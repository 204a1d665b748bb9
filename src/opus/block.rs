//! Parsing individual blocks according to their classified kind.
use indexmap::IndexMap;
use log::debug;

use crate::{config::DecodeOptions, error::{OpusError, OpusResult}, utils::{self, ByteReader}};
use super::{
    block_type::BlockKind,
    constants::bruker::ParamValue,
    data::SeriesLayout,
    header::BlockDescriptor,
    params::parse_params,
    report::{parse_report, Report},
};

/// The decoded content of a block.
///
/// Data blocks are only checked to lie within the file here: how their bytes are decoded
/// depends on the status block they are paired with, so that happens during assembly.
#[derive(Debug, Clone)]
pub enum BlockContent {
    Directory,
    History(String),
    Parameters(IndexMap<String, ParamValue>),
    Report(Report),
    Data,
    DataSeries(SeriesLayout),
    Unknown,
}

/// A block that was parsed successfully
#[derive(Debug, Clone)]
pub struct FileBlock {
    pub descriptor: BlockDescriptor,
    pub kind: BlockKind,
    pub content: BlockContent,
}

/// A block whose content could not be parsed, kept along with the reason
#[derive(Debug)]
pub struct FailedBlock {
    pub descriptor: BlockDescriptor,
    pub kind: BlockKind,
    pub error: OpusError,
}

impl FileBlock {
    /// Classify and parse the block described by `descriptor` from the full file buffer `buf`.
    pub fn parse(buf: &[u8], descriptor: BlockDescriptor, options: &DecodeOptions) -> Result<Self, FailedBlock> {
        let kind = descriptor.block_type.classify();
        debug!("Block {} at {} ({} bytes) is {kind}", descriptor.block_type, descriptor.start, descriptor.size);

        parse_content(buf, &descriptor, kind, options)
            .map(|content| Self { descriptor, kind, content })
            .map_err(|error| FailedBlock { descriptor, kind, error })
    }
}

fn parse_content(buf: &[u8], descriptor: &BlockDescriptor, kind: BlockKind, options: &DecodeOptions) -> OpusResult<BlockContent> {
    let content = match kind {
        BlockKind::Directory => BlockContent::Directory,
        BlockKind::Unknown => BlockContent::Unknown,
        BlockKind::History => BlockContent::History(parse_history(block_bytes(buf, descriptor)?, options.keep_raw_history)),
        BlockKind::Parameters => BlockContent::Parameters(parse_params(block_bytes(buf, descriptor)?)?),
        BlockKind::Report => BlockContent::Report(parse_report(block_bytes(buf, descriptor)?)?),
        BlockKind::DataSeries => BlockContent::DataSeries(SeriesLayout::parse(block_bytes(buf, descriptor)?)?),
        BlockKind::Data => {
            block_bytes(buf, descriptor)?;
            BlockContent::Data
        },
    };
    Ok(content)
}

/// The bytes of one block. Errors if the block runs past the end of the file.
pub fn block_bytes<'b>(buf: &'b [u8], descriptor: &BlockDescriptor) -> OpusResult<&'b [u8]> {
    ByteReader::new(buf).read_bytes(descriptor.start, descriptor.size, "block")
}

/// Decode a history (file log) block: NUL-separated Latin-1 strings joined by newlines.
/// Empty strings are dropped unless `keep_empty` is set.
pub fn parse_history(bytes: &[u8], keep_empty: bool) -> String {
    let lines: Vec<String> = bytes.split(|&b| b == 0)
        .filter(|seg| keep_empty || !seg.is_empty())
        .map(utils::decode_str)
        .collect();
    lines.join("\n")
}
