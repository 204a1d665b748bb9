//! Builders for synthetic Opus files and blocks used in the unit tests.
use encoding::{all::ISO_8859_1, EncoderTrap, Encoding};

use crate::opus::{block_type::TypeCode, constants::bruker};

pub(crate) fn latin1(s: &str) -> Vec<u8> {
    ISO_8859_1.encode(s, EncoderTrap::Replace).expect("replacement encoding should not fail")
}

pub(crate) fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Lay out a complete file: header, directory (with its own entry first), then the blocks.
pub(crate) struct OpusFileBuilder {
    blocks: Vec<(TypeCode, Vec<u8>)>,
    spare_slots: usize,
    version: f64,
}

impl OpusFileBuilder {
    pub(crate) fn new() -> Self {
        Self { blocks: vec![], spare_slots: 0, version: 920622.0 }
    }

    /// Leave this many empty slots at the end of the directory
    pub(crate) fn spare_slots(mut self, n: usize) -> Self {
        self.spare_slots = n;
        self
    }

    /// Add a block; it is zero-padded to a whole number of 4-byte words
    pub(crate) fn block(mut self, block_type: TypeCode, mut bytes: Vec<u8>) -> Self {
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        self.blocks.push((block_type, bytes));
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let num_blocks = self.blocks.len() + 1;
        let max_blocks = num_blocks + self.spare_slots;
        let dir_start = bruker::HEADER_LEN;
        let dir_len = max_blocks * bruker::DIR_ENTRY_LEN;

        let mut buf = bruker::MAGIC.to_vec();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&(dir_start as i32).to_le_bytes());
        buf.extend_from_slice(&(max_blocks as i32).to_le_bytes());
        buf.extend_from_slice(&(num_blocks as i32).to_le_bytes());
        assert_eq!(buf.len(), bruker::HEADER_LEN);

        let mut entries = vec![(TypeCode::DIRECTORY, dir_len, dir_start)];
        let mut next_start = dir_start + dir_len;
        for (block_type, bytes) in self.blocks.iter() {
            entries.push((*block_type, bytes.len(), next_start));
            next_start += bytes.len();
        }

        for (block_type, len, start) in entries {
            buf.extend_from_slice(&block_type.to_int().to_le_bytes());
            buf.extend_from_slice(&((len / 4) as i32).to_le_bytes());
            buf.extend_from_slice(&(start as i32).to_le_bytes());
        }
        buf.resize(dir_start + dir_len, 0);

        for (_, bytes) in self.blocks {
            buf.extend_from_slice(&bytes);
        }
        buf
    }
}

/// Write a parameter block record by record, finished with an END record.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParamBlockBuilder {
    bytes: Vec<u8>,
}

impl ParamBlockBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn record(mut self, key: &str, param_type: i16, value: &[u8]) -> Self {
        let mut key_bytes = key.as_bytes().to_vec();
        key_bytes.resize(4, 0);
        self.bytes.extend_from_slice(&key_bytes);
        self.bytes.extend_from_slice(&param_type.to_le_bytes());
        self.bytes.extend_from_slice(&((value.len() / 2) as i16).to_le_bytes());
        self.bytes.extend_from_slice(value);
        self
    }

    pub(crate) fn int(self, key: &str, value: i32) -> Self {
        self.record(key, bruker::TYPE_I4, &value.to_le_bytes())
    }

    pub(crate) fn float(self, key: &str, value: f64) -> Self {
        self.record(key, bruker::TYPE_R8, &value.to_le_bytes())
    }

    /// Strings are NUL terminated and padded to an even length
    pub(crate) fn string(self, key: &str, value: &str) -> Self {
        let mut bytes = latin1(value);
        bytes.push(0);
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        self.record(key, bruker::TYPE_STRING, &bytes)
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        self.bytes.extend_from_slice(b"END\0");
        self.bytes.extend_from_slice(&[0; 4]);
        self.bytes
    }
}

/// Write a data series block whose sub-blocks each hold `points_per_block` f32 values.
pub(crate) struct SeriesBlockBuilder {
    points_per_block: usize,
    store_table: Vec<(i32, i32)>,
    spectra: Vec<(Vec<f32>, i32, f64)>,
}

impl SeriesBlockBuilder {
    pub(crate) fn new(points_per_block: usize) -> Self {
        Self { points_per_block, store_table: vec![], spectra: vec![] }
    }

    pub(crate) fn store_run(mut self, first: i32, last: i32) -> Self {
        self.store_table.push((first, last));
        self
    }

    /// Add a spectrum with its spectrum number and end time. It is zero padded or cut to
    /// `points_per_block` values.
    pub(crate) fn spectrum(mut self, values: &[f32], nsn: i32, ert: f64) -> Self {
        let mut values = values.to_vec();
        values.resize(self.points_per_block, 0.0);
        self.spectra.push((values, nsn, ert));
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let info_size = bruker::series_info_len() as i32;
        let offset = 24 + 8 * self.store_table.len();
        let header = [
            0,
            self.spectra.len() as i32,
            offset as i32,
            (self.points_per_block * 4) as i32,
            info_size,
            self.store_table.len() as i32,
        ];

        let mut buf: Vec<u8> = header.iter().flat_map(|v| v.to_le_bytes()).collect();
        for (first, last) in self.store_table {
            buf.extend_from_slice(&first.to_le_bytes());
            buf.extend_from_slice(&last.to_le_bytes());
        }

        for (values, nsn, ert) in self.spectra {
            let mny = values.iter().copied().fold(f32::INFINITY, f32::min) as f64;
            let mxy = values.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
            buf.extend_from_slice(&f32_bytes(&values));
            buf.extend_from_slice(&nsn.to_le_bytes());
            buf.extend_from_slice(&(self.points_per_block as i32).to_le_bytes());
            buf.extend_from_slice(&mny.to_le_bytes());
            buf.extend_from_slice(&mxy.to_le_bytes());
            buf.extend_from_slice(&(ert - 1.0).to_le_bytes());
            buf.extend_from_slice(&ert.to_le_bytes());
        }
        buf
    }
}

/// Collects the cells of one subreport row
#[derive(Debug, Default)]
pub(crate) struct RowCells {
    cells: Vec<Vec<u8>>,
}

impl RowCells {
    pub(crate) fn string(mut self, value: &str) -> Self {
        self.cells.push(latin1(value));
        self
    }

    pub(crate) fn f64(mut self, value: f64) -> Self {
        self.cells.push(value.to_le_bytes().to_vec());
        self
    }

    pub(crate) fn f32(mut self, value: f32) -> Self {
        self.cells.push(value.to_le_bytes().to_vec());
        self
    }

    pub(crate) fn int(mut self, value: i32) -> Self {
        self.cells.push(value.to_le_bytes().to_vec());
        self
    }

    pub(crate) fn raw(mut self, value: &[u8]) -> Self {
        self.cells.push(value.to_vec());
        self
    }
}

/// Write a subreport: its describing parameters followed by the packed rows.
#[derive(Debug, Clone, Default)]
pub(crate) struct SubreportBuilder {
    columns: Vec<(String, i32, usize)>,
    rows: Vec<Vec<Vec<u8>>>,
    properties: Vec<(String, String)>,
    subreports: Vec<(String, usize)>,
}

impl SubreportBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn column(mut self, label: &str, type_code: i32, width: usize) -> Self {
        self.columns.push((label.to_string(), type_code, width));
        self
    }

    pub(crate) fn string_column(self, label: &str, type_code: i32, width: usize) -> Self {
        self.column(label, type_code, width)
    }

    pub(crate) fn f64_column(self, label: &str, width: usize) -> Self {
        self.column(label, 2, width)
    }

    pub(crate) fn f32_column(self, label: &str, width: usize) -> Self {
        self.column(label, 1, width)
    }

    pub(crate) fn int_column(self, label: &str, width: usize) -> Self {
        self.column(label, 0, width)
    }

    pub(crate) fn raw_column(self, label: &str, type_code: i32, width: usize) -> Self {
        self.column(label, type_code, width)
    }

    pub(crate) fn row<F: FnOnce(RowCells) -> RowCells>(mut self, f: F) -> Self {
        self.rows.push(f(RowCells::default()).cells);
        self
    }

    pub(crate) fn property(mut self, label: &str, value: &str) -> Self {
        self.properties.push((label.to_string(), value.to_string()));
        self
    }

    /// Declare subreports as (title, offset from the start of this subreport)
    fn with_subreports(mut self, subreports: Vec<(String, usize)>) -> Self {
        self.subreports = subreports;
        self
    }

    fn info_block(&self, siz: usize) -> Vec<u8> {
        let row_width: usize = self.columns.iter().map(|(_, _, w)| w).sum();
        let mut info = ParamBlockBuilder::new()
            .int("NCO", self.columns.len() as i32)
            .int("NLN", self.rows.len() as i32)
            .int("SIZ", siz as i32)
            .int("SRC", row_width as i32);

        let mut offset = 0;
        for (i, (label, type_code, width)) in self.columns.iter().enumerate() {
            info = info.int(&format!("F{i:02}"), offset as i32)
                .int(&format!("T{i:02}"), *type_code)
                .string(&format!("S{i:02}"), label);
            offset += width;
        }

        for (i, (label, value)) in self.properties.iter().enumerate() {
            info = info.string(&format!("H{i:02}"), label)
                .string(&format!("V{i:02}"), value);
        }

        if !self.subreports.is_empty() {
            info = info.int("SUB", self.subreports.len() as i32);
            for (i, (title, offset)) in self.subreports.iter().enumerate() {
                info = info.int(&format!("G{i:02}"), *offset as i32)
                    .string(&format!("U{i:02}"), title);
            }
        }
        info.finish()
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        // SIZ is a fixed-width integer, so a first pass gives the final length
        let siz = self.info_block(0).len();
        let mut buf = self.info_block(siz);

        for row in self.rows.iter() {
            for ((_, _, width), cell) in self.columns.iter().zip(row.iter()) {
                let mut cell = cell.clone();
                cell.resize(*width, 0);
                buf.extend_from_slice(&cell);
            }
        }
        buf
    }
}

/// Write a report block: reserved bytes, a header parameter block, the summary subreport,
/// then any further subreports.
pub(crate) struct ReportBuilder {
    title: String,
    table_title: Option<String>,
    num_reports: Option<i32>,
    summary: SubreportBuilder,
    subreports: Vec<(String, Vec<u8>)>,
}

impl ReportBuilder {
    pub(crate) fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            table_title: None,
            num_reports: None,
            summary: SubreportBuilder::new(),
            subreports: vec![],
        }
    }

    pub(crate) fn table_title(mut self, title: &str) -> Self {
        self.table_title = Some(title.to_string());
        self
    }

    pub(crate) fn num_reports(mut self, n: i32) -> Self {
        self.num_reports = Some(n);
        self
    }

    pub(crate) fn summary(mut self, summary: SubreportBuilder) -> Self {
        self.summary = summary;
        self
    }

    pub(crate) fn subreport(mut self, title: &str, bytes: Vec<u8>) -> Self {
        self.subreports.push((title.to_string(), bytes));
        self
    }

    fn header(&self, summary_start: usize) -> Vec<u8> {
        let mut header = ParamBlockBuilder::new().string("TIT", &self.title);
        if let Some(n) = self.num_reports {
            header = header.int("NRP", n);
        }
        header = header.int("F00", summary_start as i32);
        if let Some(t) = &self.table_title {
            header = header.string("E00", t);
        }
        header.finish()
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let summary_start = 12 + self.header(0).len();

        let placeholder: Vec<(String, usize)> = self.subreports.iter().map(|(t, _)| (t.clone(), 0)).collect();
        let summary_len = self.summary.clone().with_subreports(placeholder).build().len();
        let mut offset = summary_len;
        let mut offsets = vec![];
        for (title, bytes) in self.subreports.iter() {
            offsets.push((title.clone(), offset));
            offset += bytes.len();
        }
        let summary = self.summary.clone().with_subreports(offsets).build();

        let mut buf = vec![0u8; 12];
        buf.extend_from_slice(&self.header(summary_start));
        buf.extend_from_slice(&summary);
        for (_, bytes) in self.subreports {
            buf.extend_from_slice(&bytes);
        }
        buf
    }
}
