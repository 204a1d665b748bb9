//! Decoding and classification of the packed block type codes stored in an Opus directory.
use std::fmt::Display;

use itertools::Itertools;
use serde::Serialize;

use super::constants::bruker::{self, CHANNEL_DIVISOR, TYPE_FIELD_WIDTHS};

/// The six fields packed into a directory entry's type integer.
///
/// The integer is split from the least significant bit upwards into fields of 2, 2, 6, 7, 2
/// and 3 bits. Bits above the 22nd are not used by any known file and are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct TypeCode {
    /// Real/imaginary/amplitude part of complex data
    pub data_kind: u8,
    /// 0 = none, 1 = sample, 2 = reference, >3 = another channel
    pub channel_role: u8,
    /// 0 for data blocks, >0 for parameter blocks; 1 is the data status block
    pub status_level: u8,
    /// Physical quantity, plus `32 * (channels - 1)` for multi-channel blocks
    pub content_code: u8,
    /// Derivative order
    pub aux_a: u8,
    /// Extended block kinds: data series, reports, file log
    pub aux_b: u8,
}

/// The broad category of a block, which decides how its bytes are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum BlockKind {
    Directory,
    History,
    Parameters,
    Report,
    DataSeries,
    Data,
    Unknown,
}

impl TypeCode {
    pub const DIRECTORY: Self = Self::new(0, 0, 0, 13, 0, 0);
    pub const HISTORY: Self = Self::new(0, 0, 0, 0, 0, 5);
    pub const PARAM_SPECIAL: Self = Self::new(0, 0, 0, 0, 0, 1);

    pub const fn new(data_kind: u8, channel_role: u8, status_level: u8, content_code: u8, aux_a: u8, aux_b: u8) -> Self {
        Self { data_kind, channel_role, status_level, content_code, aux_a, aux_b }
    }

    pub fn from_array(fields: [u8; 6]) -> Self {
        let [a, b, c, d, e, f] = fields;
        Self::new(a, b, c, d, e, f)
    }

    pub fn as_array(&self) -> [u8; 6] {
        [self.data_kind, self.channel_role, self.status_level, self.content_code, self.aux_a, self.aux_b]
    }

    /// Pack the fields back into a type integer. Each field is masked to its bit width.
    pub fn to_int(&self) -> i32 {
        let mut value = 0u32;
        let mut shift = 0;
        for (field, width) in self.as_array().into_iter().zip(TYPE_FIELD_WIDTHS) {
            value |= (field as u32 & mask(width)) << shift;
            shift += width;
        }
        value as i32
    }

    /// Number of channels in a multi-channel block (0 for a regular single channel block)
    pub fn channels(&self) -> u8 {
        self.content_code / CHANNEL_DIVISOR
    }

    /// The content code with the channel multiplier removed
    pub fn base_content(&self) -> u8 {
        self.content_code % CHANNEL_DIVISOR
    }

    /// Label for the field at `position`, `None` if that field is zero.
    pub fn field_label(&self, position: usize) -> Option<String> {
        let code = *self.as_array().get(position)?;
        if code == 0 {
            return None;
        }

        let code = if position == 3 { self.base_content() } else { code };
        let label = bruker::type_code_label(position, code)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("Unknown {position} {code}"));
        Some(label)
    }

    /// A human readable description of this block type, e.g. "Sample Data Status Parameters Absorbance".
    ///
    /// Multi-channel content gets an extra "<n>-Channel" entry. A type with every field zero
    /// is "Undefined".
    pub fn label(&self) -> String {
        let mut parts = vec![];
        for position in 0..6 {
            if let Some(label) = self.field_label(position) {
                parts.push(label);
            }
            if position == 3 && self.channels() > 0 {
                parts.push(format!("{}-Channel", self.channels() + 1));
            }
        }

        if parts.is_empty() {
            "Undefined".to_string()
        } else {
            parts.into_iter().join(" ")
        }
    }

    /// Short symbolic key for a data block of this type, e.g. "sm", "igrf", "a" or "ph_2ch".
    pub fn data_key(&self) -> String {
        // Unknown contents are keyed by the full content code, channel count included
        let mut key = bruker::content_abbreviation(self.base_content())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("_{}", self.content_code));

        match self.channel_role {
            1 => key.push_str("sm"),
            2 => key.push_str("rf"),
            r if r > 3 => key.push_str(&format!("_{r}")),
            _ => (),
        }

        let channels = self.channels();
        if channels > 0 {
            key.push_str(&format!("_{}ch", channels + 1));
        }

        if self.is_compact_data() {
            key.push_str("_c");
        }
        key
    }

    pub fn is_directory(&self) -> bool {
        *self == Self::DIRECTORY
    }

    pub fn is_history(&self) -> bool {
        *self == Self::HISTORY
    }

    pub fn is_data_status(&self) -> bool {
        self.status_level == 1
    }

    /// Parameter blocks belonging to the reference channel
    pub fn is_rf_param(&self) -> bool {
        self.status_level > 1 && self.channel_role == 2
    }

    pub fn is_param(&self) -> bool {
        self.status_level > 0 || *self == Self::PARAM_SPECIAL
    }

    fn is_content_block(&self) -> bool {
        self.status_level == 0 && self.content_code != 0 && self.content_code != 13
    }

    pub fn is_report(&self) -> bool {
        let report_only = [2, 3, 4].into_iter()
            .any(|b| *self == Self::new(0, 0, 0, 0, 0, b));
        report_only || (self.is_content_block() && self.aux_b == 5)
    }

    pub fn is_data(&self) -> bool {
        self.is_content_block() && self.aux_b != 2 && self.aux_b != 5
    }

    pub fn is_data_series(&self) -> bool {
        self.is_content_block() && self.aux_b == 2
    }

    /// Data blocks that store their points at the end of an oversized array
    pub fn is_compact_data(&self) -> bool {
        self.is_data() && self.aux_b == 4
    }

    /// Whether `status` could be the data status block for a data block of this type,
    /// i.e. the two types are equal apart from the status level.
    pub fn matches_status(&self, status: &TypeCode) -> bool {
        let mut mine = *self;
        mine.status_level = status.status_level;
        status.is_data_status() && mine == *status
    }

    /// Decide how a block of this type should be parsed. Checks run in a fixed order, so
    /// the first matching kind wins.
    pub fn classify(&self) -> BlockKind {
        if self.is_directory() {
            BlockKind::Directory
        } else if self.is_history() {
            BlockKind::History
        } else if self.is_param() {
            BlockKind::Parameters
        } else if self.is_report() {
            BlockKind::Report
        } else if self.is_data_series() {
            BlockKind::DataSeries
        } else if self.is_data() {
            BlockKind::Data
        } else {
            BlockKind::Unknown
        }
    }
}

fn mask(width: u32) -> u32 {
    (1 << width) - 1
}

impl From<i32> for TypeCode {
    fn from(value: i32) -> Self {
        let value = value as u32;
        let mut fields = [0u8; 6];
        let mut shift = 0;
        for (field, width) in fields.iter_mut().zip(TYPE_FIELD_WIDTHS) {
            // widest field is 7 bits so this always fits
            *field = ((value >> shift) & mask(width)) as u8;
            shift += width;
        }
        Self::from_array(fields)
    }
}

impl From<TypeCode> for i32 {
    fn from(value: TypeCode) -> Self {
        value.to_int()
    }
}

impl Display for TypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}, {}, {}, {})",
            self.data_kind, self.channel_role, self.status_level,
            self.content_code, self.aux_a, self.aux_b
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(1031)]
    #[case(0x3F_FFFF)]
    #[case(0x2A_5A5A)]
    fn test_bit_round_trip(#[case] type_int: i32) {
        assert_eq!(TypeCode::from(type_int).to_int(), type_int);
    }

    #[test]
    fn test_round_trip_drops_high_bits() {
        let type_int = (1 << 30) | 1031;
        assert_eq!(TypeCode::from(type_int).to_int(), 1031);
    }

    #[test]
    fn test_field_split() {
        // sample data status for absorbance: role 1 (bits 2-3), status 1 (bits 4-9), content 4 (bits 10-16)
        let code = TypeCode::from((1 << 2) | (1 << 4) | (4 << 10));
        assert_eq!(code, TypeCode::new(0, 1, 1, 4, 0, 0));
        let series = TypeCode::from((1 << 10) | (2 << 19));
        assert_eq!(series, TypeCode::new(0, 0, 0, 1, 0, 2));
    }

    #[rstest]
    #[case(TypeCode::new(0, 1, 0, 1, 0, 0), "Sample Spectrum")]
    #[case(TypeCode::new(0, 2, 1, 2, 0, 0), "Reference Data Status Parameters Interferogram")]
    #[case(TypeCode::new(0, 1, 0, 34, 0, 0), "Sample Interferogram 2-Channel")]
    #[case(TypeCode::new(0, 0, 0, 0, 0, 0), "Undefined")]
    #[case(TypeCode::new(0, 0, 0, 13, 0, 0), "Directory")]
    #[case(TypeCode::new(0, 0, 0, 30, 0, 0), "Unknown 3 30")]
    fn test_labels(#[case] code: TypeCode, #[case] expected: &str) {
        assert_eq!(code.label(), expected);
    }

    #[rstest]
    #[case(TypeCode::new(0, 1, 0, 1, 0, 0), "sm")]
    #[case(TypeCode::new(0, 2, 0, 2, 0, 0), "igrf")]
    #[case(TypeCode::new(0, 0, 0, 4, 0, 0), "a")]
    #[case(TypeCode::new(0, 1, 0, 35, 0, 0), "phsm_2ch")]
    #[case(TypeCode::new(0, 1, 0, 1, 0, 4), "sm_c")]
    #[case(TypeCode::new(0, 0, 0, 25, 0, 0), "_25")]
    #[case(TypeCode::new(0, 1, 0, 57, 0, 0), "_57sm_2ch")]
    #[case(TypeCode::new(0, 3, 0, 4, 0, 0), "a")]
    fn test_data_keys(#[case] code: TypeCode, #[case] expected: &str) {
        assert_eq!(code.data_key(), expected);
    }

    #[rstest]
    #[case(TypeCode::DIRECTORY, BlockKind::Directory)]
    #[case(TypeCode::HISTORY, BlockKind::History)]
    #[case(TypeCode::PARAM_SPECIAL, BlockKind::Parameters)]
    #[case(TypeCode::new(0, 1, 1, 4, 0, 0), BlockKind::Parameters)]
    #[case(TypeCode::new(0, 0, 0, 0, 0, 2), BlockKind::Report)]
    #[case(TypeCode::new(0, 0, 0, 4, 0, 5), BlockKind::Report)]
    #[case(TypeCode::new(0, 1, 0, 1, 0, 2), BlockKind::DataSeries)]
    #[case(TypeCode::new(0, 1, 0, 1, 0, 0), BlockKind::Data)]
    #[case(TypeCode::new(0, 1, 0, 1, 0, 4), BlockKind::Data)]
    #[case(TypeCode::new(0, 0, 0, 0, 0, 0), BlockKind::Unknown)]
    fn test_classify(#[case] code: TypeCode, #[case] expected: BlockKind) {
        assert_eq!(code.classify(), expected);
    }

    #[test]
    fn test_status_match() {
        let data = TypeCode::new(0, 1, 0, 4, 0, 0);
        assert!(data.matches_status(&TypeCode::new(0, 1, 1, 4, 0, 0)));
        assert!(!data.matches_status(&TypeCode::new(0, 2, 1, 4, 0, 0)));
        assert!(!data.matches_status(&TypeCode::new(0, 1, 2, 4, 0, 0)));
        assert!(!data.matches_status(&TypeCode::new(0, 1, 1, 1, 0, 0)));

        let compact = TypeCode::new(0, 1, 0, 1, 0, 4);
        assert!(compact.matches_status(&TypeCode::new(0, 1, 1, 1, 0, 4)));
    }

    #[test]
    fn test_reference_params() {
        assert!(TypeCode::new(0, 2, 2, 0, 0, 0).is_rf_param());
        assert!(!TypeCode::new(0, 1, 2, 0, 0, 0).is_rf_param());
        assert!(!TypeCode::new(0, 2, 1, 2, 0, 0).is_rf_param());
    }
}
