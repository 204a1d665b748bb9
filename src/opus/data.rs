//! Data blocks (1D arrays and 3D data series) and the records built by combining them with
//! their data status parameters.
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use ndarray::{s, Array1, Array2, ArrayView1};
use num_traits::AsPrimitive;

use crate::{error::{OpusError, OpusResult, UnitError}, utils::{self, ByteReader}};
use super::{
    block_type::TypeCode,
    constants::bruker::{self, SeriesFieldType, SERIES_INFO_FIELDS},
    header::BlockDescriptor,
    params::ParameterSet,
};

/// Length of the data series header: six 4-byte integers
const SERIES_HEADER_LEN: usize = 24;

/// Binary type of the values in a data block, selected by the DPF parameter of its status block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPointFormat {
    Float32,
    Int32,
}

impl DataPointFormat {
    pub fn from_dpf(dpf: i32) -> Self {
        if dpf == 2 { Self::Int32 } else { Self::Float32 }
    }
}

fn to_f64_array<T: AsPrimitive<f64>>(values: Vec<T>) -> Array1<f64> {
    values.into_iter().map(|v| v.as_()).collect()
}

/// Interpret the bytes of a data block as an array of `bytes.len() / 4` values.
pub fn parse_data(bytes: &[u8], format: DataPointFormat) -> Array1<f64> {
    match format {
        DataPointFormat::Float32 => to_f64_array(utils::le_f32s(bytes)),
        DataPointFormat::Int32 => to_f64_array(utils::le_i32s(bytes)),
    }
}

/// Trim a raw data array to the `npt` points given by its status block.
///
/// Most blocks store their points at the start of the array, but compact blocks store them
/// at the end. Arrays shorter than `npt` are returned whole.
pub fn trim_data(y: ArrayView1<'_, f64>, npt: usize, compact: bool) -> ArrayView1<'_, f64> {
    let n = y.len();
    if n <= npt {
        y
    } else if compact {
        y.slice_move(s![n - npt..])
    } else {
        y.slice_move(s![..npt])
    }
}

/// The layout of a data series (3D) block, read from its 24-byte header and store table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesLayout {
    pub version: i32,
    pub num_blocks: usize,
    /// Offset of the first sub-block from the start of the block
    pub offset: usize,
    /// Bytes of spectrum data in each sub-block
    pub data_size: usize,
    /// Bytes of per-spectrum information following each sub-block's data
    pub info_size: usize,
    /// Runs of (first, last) spectrum numbers that were kept
    pub store_table: Vec<(i32, i32)>,
}

impl SeriesLayout {
    /// Read and check the series header. The whole layout it describes must fit in `bytes`
    /// and each info record must be long enough for the known per-spectrum fields.
    pub fn parse(bytes: &[u8]) -> OpusResult<Self> {
        let rdr = ByteReader::new(bytes);
        let mut header = [0i32; 6];
        for (i, v) in header.iter_mut().enumerate() {
            *v = rdr.read_i32(i * 4, "data series header")?;
        }
        let [version, num_blocks, offset, data_size, info_size, store_count] = header;

        let non_negative = |value: i32, name: &str| -> OpusResult<usize> {
            usize::try_from(value)
                .map_err(|_| OpusError::InvalidSeries(format!("{name} is negative ({value})")))
        };
        let num_blocks = non_negative(num_blocks, "number of sub-blocks")?;
        let offset = non_negative(offset, "sub-block offset")?;
        let data_size = non_negative(data_size, "sub-block data size")?;
        let info_size = non_negative(info_size, "sub-block info size")?;
        let store_count = non_negative(store_count, "store table length")?;

        if info_size < bruker::series_info_len() {
            return Err(OpusError::InvalidSeries(format!(
                "sub-block info size ({info_size}) is smaller than the {} bytes of known fields", bruker::series_info_len()
            )));
        }

        let mut store_table = Vec::with_capacity(store_count.min(rdr.len() / 8));
        for i in 0..store_count {
            let pos = SERIES_HEADER_LEN + i * 8;
            let first = rdr.read_i32(pos, "data series store table")?;
            let last = rdr.read_i32(pos + 4, "data series store table")?;
            store_table.push((first, last));
        }

        let needed = num_blocks.checked_mul(data_size + info_size)
            .and_then(|n| n.checked_add(offset))
            .ok_or_else(|| OpusError::InvalidSeries("sub-block sizes overflow".to_string()))?;
        if needed > rdr.len() {
            return Err(OpusError::too_short("data series sub-blocks", needed, rdr.len()));
        }

        Ok(Self { version, num_blocks, offset, data_size, info_size, store_table })
    }

    /// Number of values in each sub-block's data array
    pub fn points_per_block(&self) -> usize {
        self.data_size / 4
    }
}

/// One per-spectrum field of a data series, with one value per sub-block
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesColumn {
    Int(Array1<i32>),
    Float(Array1<f64>),
}

impl SeriesColumn {
    pub fn len(&self) -> usize {
        match self {
            SeriesColumn::Int(a) => a.len(),
            SeriesColumn::Float(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f64(&self) -> Array1<f64> {
        match self {
            SeriesColumn::Int(a) => a.mapv(|v| v as f64),
            SeriesColumn::Float(a) => a.clone(),
        }
    }
}

/// The spectra and per-spectrum fields of a data series block
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesData {
    /// Spectrum index along the first axis, point index along the second
    pub y: Array2<f64>,
    pub fields: IndexMap<String, SeriesColumn>,
}

/// Read the spectra and per-spectrum info records of a data series block.
pub fn parse_data_series(bytes: &[u8], layout: &SeriesLayout, format: DataPointFormat) -> OpusResult<SeriesData> {
    let rdr = ByteReader::new(bytes);
    let npts = layout.points_per_block();
    let mut y = Array2::zeros((layout.num_blocks, npts));
    let mut ints: Vec<Vec<i32>> = vec![Vec::with_capacity(layout.num_blocks); SERIES_INFO_FIELDS.len()];
    let mut floats: Vec<Vec<f64>> = vec![Vec::with_capacity(layout.num_blocks); SERIES_INFO_FIELDS.len()];

    let mut offset = layout.offset;
    for mut row in y.rows_mut() {
        let data = rdr.read_bytes(offset, npts * 4, "data series spectrum")?;
        row.assign(&parse_data(data, format));
        offset += layout.data_size;

        let mut field_offset = offset;
        for (i, (_, field_type)) in SERIES_INFO_FIELDS.iter().enumerate() {
            match field_type {
                SeriesFieldType::Int32 => ints[i].push(rdr.read_i32(field_offset, "data series info")?),
                SeriesFieldType::Float64 => floats[i].push(rdr.read_f64(field_offset, "data series info")?),
            }
            field_offset += field_type.nbytes();
        }
        offset += layout.info_size;
    }

    let fields = SERIES_INFO_FIELDS.iter()
        .zip(ints.into_iter().zip(floats))
        .map(|((name, field_type), (i, f))| {
            let col = match field_type {
                SeriesFieldType::Int32 => SeriesColumn::Int(Array1::from(i)),
                SeriesFieldType::Float64 => SeriesColumn::Float(Array1::from(f)),
            };
            (name.to_string(), col)
        }).collect();

    Ok(SeriesData { y, fields })
}

/// Spectral x-axis units understood by the unit conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum XUnits {
    /// Wavenumbers (cm-1)
    #[strum(serialize = "WN")]
    Wavenumber,
    /// Wavelength (microns)
    #[strum(serialize = "MI")]
    Micron,
    /// Natural log of wavenumber
    #[strum(serialize = "LGW")]
    LogWavenumber,
}

impl XUnits {
    /// Determine the x units of a record, checking that it has a spectral x-axis at all
    fn for_record(block_type: &TypeCode, params: &ParameterSet) -> Result<Self, UnitError> {
        if matches!(block_type.base_content(), 2 | 3) {
            return Err(UnitError::NotSpectral(block_type.label()));
        }
        let dxu = params.dxu().ok_or(UnitError::MissingUnit)?;
        dxu.parse().map_err(|_| UnitError::UnknownUnit(dxu.to_string()))
    }

    fn to_wavenumber(&self, x: &Array1<f64>) -> Array1<f64> {
        match self {
            XUnits::Wavenumber => x.clone(),
            XUnits::Micron => x.mapv(|v| 10000.0 / v),
            XUnits::LogWavenumber => x.mapv(f64::exp),
        }
    }

    fn to_wavelength(&self, x: &Array1<f64>) -> Array1<f64> {
        match self {
            XUnits::Wavenumber => x.mapv(|v| 10000.0 / v),
            XUnits::Micron => x.clone(),
            XUnits::LogWavenumber => x.mapv(|v| 10000.0 / v.exp()),
        }
    }
}

/// A 1D data block combined with its data status parameters
#[derive(Debug, Clone)]
pub struct DataRecord {
    pub key: String,
    pub descriptor: BlockDescriptor,
    pub params: ParameterSet,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    /// Scanner velocity from the sample or reference parameters, whichever this data belongs to
    pub vel: Option<f64>,
}

impl DataRecord {
    /// Decode the data block `bytes` using its status parameters.
    ///
    /// The raw values are trimmed to NPT points and scaled by CSF (1 if absent); x runs
    /// linearly from FXV to LXV.
    pub fn new(key: String, descriptor: BlockDescriptor, params: ParameterSet, bytes: &[u8], vel: Option<f64>) -> OpusResult<Self> {
        let npt = params.npt()?;
        let csf = params.get_float("csf")?.unwrap_or(1.0);
        let x = Array1::linspace(params.fxv()?, params.lxv()?, npt);

        let raw = parse_data(bytes, DataPointFormat::from_dpf(params.dpf()));
        let y = trim_data(raw.view(), npt, descriptor.block_type.is_compact_data()).mapv(|v| v * csf);

        Ok(Self { key, descriptor, params, x, y, vel })
    }

    pub fn label(&self) -> String {
        self.descriptor.label()
    }

    pub fn wavenumbers(&self) -> Result<Array1<f64>, UnitError> {
        let units = XUnits::for_record(&self.descriptor.block_type, &self.params)?;
        Ok(units.to_wavenumber(&self.x))
    }

    pub fn wavelengths(&self) -> Result<Array1<f64>, UnitError> {
        let units = XUnits::for_record(&self.descriptor.block_type, &self.params)?;
        Ok(units.to_wavelength(&self.x))
    }

    /// The x-axis as modulation frequency (Hz), computed from wavenumber and scanner velocity
    pub fn modulation_frequency(&self) -> Result<Array1<f64>, UnitError> {
        modulation_frequency(self.wavenumbers()?, self.vel)
    }
}

fn modulation_frequency(wavenumbers: Array1<f64>, vel: Option<f64>) -> Result<Array1<f64>, UnitError> {
    let vel = vel.ok_or(UnitError::MissingVelocity)?;
    Ok(wavenumbers * (vel * bruker::VELOCITY_TO_CM_PER_S))
}

/// A data series (3D) block combined with its data status parameters.
///
/// The per-spectrum fields (npt, mny, mxy, ...) are kept in `fields`, separate from the
/// scalar values of the same name in `params`. As for single spectra, `y` holds the stored
/// values multiplied by CSF.
#[derive(Debug, Clone)]
pub struct DataSeriesRecord {
    pub key: String,
    pub descriptor: BlockDescriptor,
    pub params: ParameterSet,
    pub x: Array1<f64>,
    pub y: Array2<f64>,
    pub fields: IndexMap<String, SeriesColumn>,
    pub store_table: Vec<(i32, i32)>,
    pub version: i32,
    pub vel: Option<f64>,
}

impl DataSeriesRecord {
    pub fn new(key: String, descriptor: BlockDescriptor, params: ParameterSet, bytes: &[u8], layout: &SeriesLayout, vel: Option<f64>) -> OpusResult<Self> {
        let npt = params.npt()?;
        if layout.points_per_block() < npt {
            return Err(OpusError::InvalidSeries(format!(
                "sub-blocks hold {} points but NPT is {npt}", layout.points_per_block()
            )));
        }
        let csf = params.get_float("csf")?.unwrap_or(1.0);
        let x = Array1::linspace(params.fxv()?, params.lxv()?, npt);

        let data = parse_data_series(bytes, layout, DataPointFormat::from_dpf(params.dpf()))?;
        let y = data.y.slice(s![.., ..npt]).mapv(|v| v * csf);

        Ok(Self {
            key, descriptor, params, x, y,
            fields: data.fields,
            store_table: layout.store_table.clone(),
            version: layout.version,
            vel
        })
    }

    pub fn num_spectra(&self) -> usize {
        self.y.nrows()
    }

    /// A per-spectrum field, e.g. "ert" (end time of each spectrum)
    pub fn field(&self, name: &str) -> Option<&SeriesColumn> {
        self.fields.get(&name.to_ascii_lowercase())
    }

    pub fn label(&self) -> String {
        self.descriptor.label()
    }

    pub fn wavenumbers(&self) -> Result<Array1<f64>, UnitError> {
        let units = XUnits::for_record(&self.descriptor.block_type, &self.params)?;
        Ok(units.to_wavenumber(&self.x))
    }

    pub fn wavelengths(&self) -> Result<Array1<f64>, UnitError> {
        let units = XUnits::for_record(&self.descriptor.block_type, &self.params)?;
        Ok(units.to_wavelength(&self.x))
    }

    pub fn modulation_frequency(&self) -> Result<Array1<f64>, UnitError> {
        modulation_frequency(self.wavenumbers()?, self.vel)
    }
}

/// Either kind of data record
#[derive(Debug, Clone)]
pub enum Record {
    Single(DataRecord),
    Series(DataSeriesRecord),
}

impl Record {
    pub fn key(&self) -> &str {
        match self {
            Record::Single(r) => &r.key,
            Record::Series(r) => &r.key,
        }
    }

    pub fn descriptor(&self) -> &BlockDescriptor {
        match self {
            Record::Single(r) => &r.descriptor,
            Record::Series(r) => &r.descriptor,
        }
    }

    pub fn params(&self) -> &ParameterSet {
        match self {
            Record::Single(r) => &r.params,
            Record::Series(r) => &r.params,
        }
    }

    pub fn x(&self) -> &Array1<f64> {
        match self {
            Record::Single(r) => &r.x,
            Record::Series(r) => &r.x,
        }
    }

    pub fn vel(&self) -> Option<f64> {
        match self {
            Record::Single(r) => r.vel,
            Record::Series(r) => r.vel,
        }
    }

    pub fn label(&self) -> String {
        self.descriptor().label()
    }

    pub fn num_points(&self) -> usize {
        self.x().len()
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        self.params().datetime()
    }

    pub fn is_series(&self) -> bool {
        matches!(self, Record::Series(_))
    }

    pub fn as_single(&self) -> Option<&DataRecord> {
        if let Record::Single(r) = self { Some(r) } else { None }
    }

    pub fn as_series(&self) -> Option<&DataSeriesRecord> {
        if let Record::Series(r) = self { Some(r) } else { None }
    }

    pub fn wavenumbers(&self) -> Result<Array1<f64>, UnitError> {
        match self {
            Record::Single(r) => r.wavenumbers(),
            Record::Series(r) => r.wavenumbers(),
        }
    }

    pub fn wavelengths(&self) -> Result<Array1<f64>, UnitError> {
        match self {
            Record::Single(r) => r.wavelengths(),
            Record::Series(r) => r.wavelengths(),
        }
    }

    pub fn modulation_frequency(&self) -> Result<Array1<f64>, UnitError> {
        match self {
            Record::Single(r) => r.modulation_frequency(),
            Record::Series(r) => r.modulation_frequency(),
        }
    }
}
