//! Parameter blocks: parsing the key/type/size/value stream and the merged parameter sets
//! built from one or more such blocks.
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;

use crate::{error::{OpusError, OpusResult}, utils::{self, ByteReader}};
use super::{block_type::TypeCode, constants::bruker::{ParamType, ParamValue}};

/// Length of the fixed part of each parameter record: 3 key bytes, 1 pad byte, 2 type bytes, 2 size bytes
const PARAM_RECORD_HEADER_LEN: usize = 8;

const END_KEY: &str = "END";

const DATETIME_FORMATS: [&str; 2] = ["%d/%m/%Y-%H:%M:%S%.f", "%Y/%m/%d-%H:%M:%S%.f"];

/// Parse the parameters in a parameter block.
///
/// Keys are lower-cased. Scanning stops at the "END" key or when there is no room left in
/// `block` for another record header; bytes after that are ignored. If a key appears twice
/// in one block, the later value wins.
pub fn parse_params(block: &[u8]) -> OpusResult<IndexMap<String, ParamValue>> {
    let rdr = ByteReader::new(block);
    let mut params = IndexMap::new();
    let mut offset = 0;

    while offset + PARAM_RECORD_HEADER_LEN <= rdr.len() {
        let key = rdr.read_string(offset, 3);
        if key == END_KEY {
            break;
        }

        let param_type: ParamType = rdr.read_i16(offset + 4, "parameter type")?.into();
        let size_words = rdr.read_i16(offset + 6, "parameter size")?;
        if size_words < 0 {
            return Err(OpusError::NegativeParamSize { key, size: size_words });
        }

        let nbytes = size_words as usize * 2;
        let value_offset = offset + PARAM_RECORD_HEADER_LEN;
        param_type.check_par_length(&key, nbytes)?;
        let value = match param_type {
            ParamType::Integer => ParamValue::Integer(rdr.read_i32(value_offset, "integer parameter")?),
            ParamType::Float => ParamValue::Float(rdr.read_f64(value_offset, "float parameter")?),
            _ => ParamValue::String(rdr.read_string(value_offset, nbytes)),
        };

        params.insert(key.to_ascii_lowercase(), value);
        offset = value_offset + nbytes;
    }

    Ok(params)
}

/// A set of parameters merged from one or more parameter blocks.
///
/// Keys are stored lower case and looked up case-insensitively. Iteration follows the order
/// the parameters appeared in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSet {
    values: IndexMap<String, ParamValue>,
    block_labels: Vec<String>,
    shadowed: Vec<String>,
    datetime: Option<NaiveDateTime>,
}

impl ParameterSet {
    /// Build a parameter set from a single block's parameters
    pub fn from_block(block_type: TypeCode, values: IndexMap<String, ParamValue>) -> Self {
        Self::merge([(block_type, values)])
    }

    /// Merge several parameter blocks into one set.
    ///
    /// Where the same key is in more than one block, the value from the later block is kept,
    /// and the key is recorded in [`ParameterSet::shadowed_keys`].
    pub fn merge<I>(blocks: I) -> Self
    where I: IntoIterator<Item = (TypeCode, IndexMap<String, ParamValue>)>
    {
        let mut values = IndexMap::new();
        let mut block_labels = vec![];
        let mut shadowed = vec![];

        for (block_type, block_values) in blocks {
            let block_label = block_type.label();
            for (key, value) in block_values {
                if let Some(old) = values.insert(key.clone(), value) {
                    warn!("Parameter '{key}' (previous value {old}) is overwritten by block '{block_label}'");
                    if !shadowed.contains(&key) {
                        shadowed.push(key);
                    }
                }
            }
            block_labels.push(block_label);
        }

        let mut me = Self { values, block_labels, shadowed, datetime: None };
        me.datetime = me.parse_datetime();
        me
    }

    /// Look up a parameter by its (case-insensitive) key
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(&key.to_ascii_lowercase())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Look up an integer parameter. Returns `Ok(None)` if the key is missing and an error if
    /// the value is present but not an integer.
    pub fn get_int(&self, key: &str) -> OpusResult<Option<i32>> {
        self.get(key)
            .map(|v| v.as_integer())
            .transpose()
            .map_err(|inner| OpusError::ParamType { key: key.to_string(), inner })
    }

    /// Look up a numeric parameter as a float. Integer values are converted.
    pub fn get_float(&self, key: &str) -> OpusResult<Option<f64>> {
        self.get(key)
            .map(|v| v.to_f64())
            .transpose()
            .map_err(|inner| OpusError::ParamType { key: key.to_string(), inner })
    }

    pub fn get_str(&self, key: &str) -> OpusResult<Option<&str>> {
        self.get(key)
            .map(|v| v.as_str())
            .transpose()
            .map_err(|inner| OpusError::ParamType { key: key.to_string(), inner })
    }

    fn require_float(&self, key: &str) -> OpusResult<f64> {
        self.get_float(key)?.ok_or_else(|| OpusError::MissingParameter(key.to_string()))
    }

    /// Number of data points (NPT). Negative values are treated as zero.
    pub fn npt(&self) -> OpusResult<usize> {
        let npt = self.get_int("npt")?.ok_or_else(|| OpusError::MissingParameter("npt".to_string()))?;
        Ok(npt.max(0) as usize)
    }

    /// Y scaling factor (CSF)
    pub fn csf(&self) -> OpusResult<f64> {
        self.require_float("csf")
    }

    /// First x value (FXV)
    pub fn fxv(&self) -> OpusResult<f64> {
        self.require_float("fxv")
    }

    /// Last x value (LXV)
    pub fn lxv(&self) -> OpusResult<f64> {
        self.require_float("lxv")
    }

    pub fn mny(&self) -> OpusResult<f64> {
        self.require_float("mny")
    }

    pub fn mxy(&self) -> OpusResult<f64> {
        self.require_float("mxy")
    }

    /// Data point format (DPF); 2 means 32-bit integers, anything else 32-bit floats.
    /// Defaults to 1 if not present.
    pub fn dpf(&self) -> i32 {
        match self.get_int("dpf") {
            Ok(Some(dpf)) => dpf,
            Ok(None) => 1,
            Err(e) => {
                debug!("{e}, assuming float data");
                1
            }
        }
    }

    /// X units code (DXU), e.g. "WN", "MI" or "PNT"
    pub fn dxu(&self) -> Option<&str> {
        self.get_str("dxu").ok().flatten()
    }

    /// Scanner velocity (VEL), as a number. Some files store it as a string, which is parsed.
    pub fn vel(&self) -> Option<f64> {
        self.get_float("vel").ok().flatten()
    }

    /// Date and time of the measurement, if the DAT and TIM parameters were present and could be parsed
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        self.datetime
    }

    /// Keys whose values were overwritten by a later block when this set was merged
    pub fn shadowed_keys(&self) -> &[String] {
        &self.shadowed
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of blocks merged into this set
    pub fn num_blocks(&self) -> usize {
        self.block_labels.len()
    }

    /// Describe this set from the labels of the blocks that made it up, e.g.
    /// "Instrument Status, Optical Parameters" or "Instrument Status, Optical Reference Parameters".
    pub fn label(&self) -> String {
        let mut labels: Vec<String> = self.block_labels.iter()
            .map(|l| l.replace(" Parameters", ""))
            .collect();

        if labels.is_empty() {
            return "Parameters".to_string();
        }

        if labels.iter().all(|l| l.contains("Reference ")) {
            labels = labels.into_iter().map(|l| l.replace("Reference ", "")).collect();
            if let Some(last) = labels.last_mut() {
                last.push_str(" Reference");
            }
        }

        format!("{} Parameters", labels.join(", "))
    }

    fn parse_datetime(&self) -> Option<NaiveDateTime> {
        let date = self.get_str("dat").ok()??;
        let time = self.get_str("tim").ok()??;
        // Times usually carry a timezone note, e.g. "10:09:11.203 (GMT-5)"
        let time = time.split(" (").next().unwrap_or(time);
        let dt_str = format!("{date}-{time}");

        let dt = DATETIME_FORMATS.iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(&dt_str, fmt).ok());
        if dt.is_none() {
            warn!("Could not parse measurement date/time '{dt_str}'");
        }
        dt
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = indexmap::map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
