pub mod bruker {
    use std::fmt::Display;

    use serde::Serialize;

    use crate::error::{OpusError, OpusResult, OpusTypeError};

    /// Magic bytes at the start of every Opus file
    pub const MAGIC: [u8; 4] = [0x0A, 0x0A, 0xFE, 0xFE];

    /// Length of the fixed file header in bytes
    pub const HEADER_LEN: usize = 24;

    /// Byte offset of the (f64) program version in the header
    pub const HEADER_VERSION_OFFSET: usize = 4;

    /// Byte offset of the (i32) directory pointer in the header
    pub const HEADER_DIR_OFFSET: usize = 12;

    /// Byte offset of the (i32) maximum number of directory entries in the header
    pub const HEADER_MAX_BLOCKS_OFFSET: usize = 16;

    /// Byte offset of the (i32) current number of directory entries in the header
    pub const HEADER_NUM_BLOCKS_OFFSET: usize = 20;

    /// Length of one directory entry (type, size in words, pointer) in bytes
    pub const DIR_ENTRY_LEN: usize = 12;

    /// Width in bits of each of the six type code fields, least significant first
    pub const TYPE_FIELD_WIDTHS: [u32; 6] = [2, 2, 6, 7, 2, 3];

    /// The content code packs the channel count above this divisor
    pub const CHANNEL_DIVISOR: u8 = 32;

    /// Parameter type of 4-byte integer
    pub const TYPE_I4: i16 = 0;

    /// Parameter type of 8-byte float
    pub const TYPE_R8: i16 = 1;

    /// Parameter type of string
    pub const TYPE_STRING: i16 = 2;

    /// Parameter type of string "enum"
    pub const TYPE_ENUM: i16 = 3;

    /// Parameter type of string "senum"
    pub const TYPE_SENUM: i16 = 4;

    /// Subreport column types above this are strings of (type - this) bytes
    pub const SUBREPORT_STRING_BASE: i32 = 1000;

    /// Conversion from mirror velocity setting (kHz of laser fringes) to cm/s
    pub const VELOCITY_TO_CM_PER_S: f64 = 1000.0 / 7900.0;

    const DATA_KIND_LABELS: &[(u8, &str)] = &[
        (1, "Real Part of Complex Data"),
        (2, "Imaginary Part of Complex Data"),
        (3, "Amplitude"),
    ];

    const CHANNEL_ROLE_LABELS: &[(u8, &str)] = &[
        (1, "Sample"),
        (2, "Reference"),
        (3, "Ratioed"),
    ];

    const STATUS_LEVEL_LABELS: &[(u8, &str)] = &[
        (1, "Data Status Parameters"),
        (2, "Instrument Status Parameters"),
        (3, "Acquisition Parameters"),
        (4, "Fourier Transform Parameters"),
        (5, "Plot and Display Parameters"),
        (6, "Optical Parameters"),
        (7, "GC Parameters"),
        (8, "Library Search Parameters"),
        (9, "Communication Parameters"),
        (10, "Sample Origin Parameters"),
        (11, "Lab and Process Parameters"),
    ];

    const CONTENT_LABELS: &[(u8, &str)] = &[
        (1, "Spectrum"),
        (2, "Interferogram"),
        (3, "Phase"),
        (4, "Absorbance"),
        (5, "Transmittance"),
        (6, "Kubelka-Munk"),
        (7, "Trace (Intensity over Time)"),
        (8, "gc File, Series of Interferograms"),
        (9, "gc File, Series of Spectra"),
        (10, "Raman"),
        (11, "Emission"),
        (12, "Reflectance"),
        (13, "Directory"),
        (14, "Power"),
        (15, "log Reflectance"),
        (16, "ATR"),
        (17, "Photoacoustic"),
        (18, "Result of Arithmetics, looks like Transmittance"),
        (19, "Result of Arithmetics, looks like Absorbance"),
    ];

    const AUX_A_LABELS: &[(u8, &str)] = &[
        (1, "First Derivative"),
        (2, "Second Derivative"),
        (3, "n-th Derivative"),
    ];

    const AUX_B_LABELS: &[(u8, &str)] = &[
        (1, "Compound Information"),
        (2, "Data Series"),
        (3, "Molecular Structure"),
        (4, "Macro"),
        (5, "File Log"),
    ];

    /// Labels for each position of the six-field type code, indexed by position
    pub const TYPE_CODE_LABELS: [&[(u8, &str)]; 6] = [
        DATA_KIND_LABELS,
        CHANNEL_ROLE_LABELS,
        STATUS_LEVEL_LABELS,
        CONTENT_LABELS,
        AUX_A_LABELS,
        AUX_B_LABELS,
    ];

    /// Look up the label for `code` at type code `position`, if known
    pub fn type_code_label(position: usize, code: u8) -> Option<&'static str> {
        TYPE_CODE_LABELS.get(position)?
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| *label)
    }

    /// Short key abbreviations for the base content code of data blocks.
    /// Spectra have an empty abbreviation so that their keys become "sm"/"rf".
    const CONTENT_ABBREVIATIONS: &[(u8, &str)] = &[
        (0, ""),
        (1, ""),
        (2, "ig"),
        (3, "ph"),
        (4, "a"),
        (5, "t"),
        (6, "km"),
        (7, "tr"),
        (8, "gcig"),
        (9, "gcsc"),
        (10, "ra"),
        (11, "e"),
        (12, "r"),
        (13, "dir"),
        (14, "p"),
        (15, "logr"),
        (16, "atr"),
        (17, "pas"),
        (18, "arit"),
        (19, "aria"),
    ];

    pub fn content_abbreviation(base_content: u8) -> Option<&'static str> {
        CONTENT_ABBREVIATIONS.iter()
            .find(|(c, _)| *c == base_content)
            .map(|(_, abbr)| *abbr)
    }

    const PARAM_LABELS: &[(&str, &str)] = &[
        // Optical
        ("ACC", "Accessory"),
        ("APR", "ATR Pressure"),
        ("APT", "Aperture Setting"),
        ("BMS", "Beamsplitter"),
        ("CHN", "Measurement Channel"),
        ("DTC", "Detector"),
        ("HPF", "High Pass Filter"),
        ("LPF", "Low Pass Filter"),
        ("LPV", "Variable Low Pass Filter (cm-1)"),
        ("OPF", "Optical Filter Setting"),
        ("PGN", "Preamplifier Gain"),
        ("PGR", "Reference Preamplifier Gain"),
        ("RCH", "Reference Measurement Channel"),
        ("RDX", "Extended Ready Check"),
        ("SRC", "Source"),
        ("VEL", "Scanner Velocity"),
        ("ADC", "External Analog Signals"),
        ("SON", "External Sync"),
        // Fourier transform
        ("APF", "Apodization Function"),
        ("HFQ", "End Frequency Limit for File"),
        ("LFQ", "Start Frequency Limit for File"),
        ("NLI", "Nonlinearity Correction"),
        ("PHR", "Phase Resolution"),
        ("PHZ", "Phase Correction Mode"),
        ("SPZ", "Stored Phase Mode"),
        ("ZFF", "Zero Filling Factor"),
        // Acquisition
        ("ADT", "Additional Data Treatment"),
        ("AQM", "Acquisition Mode"),
        ("CFE", "Low Intensity Power Mode with DTGS"),
        ("COR", "Correlation Test Mode"),
        ("DEL", "Delay Before Measurement"),
        ("DLY", "Stabilization Delay"),
        ("HFW", "Wanted High Freq Limit"),
        ("LFW", "Wanted Low Freq Limit"),
        ("NSS", "Number of Sample Scans"),
        ("NSR", "Number of Background Scans"),
        ("PLF", "Result Spectrum Type"),
        ("RES", "Resolution (cm-1)"),
        ("RGN", "Reference Signal Gain"),
        ("SGN", "Sample Signal Gain"),
        ("SOT", "Sample Scans or Time"),
        ("STR", "Scans or Time (Reference)"),
        ("TCL", "Command Line for Additional Data Treatment"),
        ("TDL", "To Do List"),
        // Sample origin
        ("BLD", "Building"),
        ("CNM", "Operator Name"),
        ("CPY", "Company"),
        ("DPM", "Department"),
        ("EXP", "Experiment"),
        ("LCT", "Location"),
        ("SFM", "Sample Form"),
        ("SNM", "Sample Name"),
        ("XPP", "Experiment Path"),
        ("IST", "Instrument Status"),
        ("CPG", "Character Encoding Code Page"),
        ("UID", "Universally Unique Identifier"),
        // Instrument status
        ("HFL", "High Folding Limit"),
        ("LFL", "Low Folding Limit"),
        ("LWN", "Laser Wavenumber"),
        ("ABP", "Absolute Peak Pos in Laser*2"),
        ("SSP", "Sample Spacing Divisor"),
        ("ASG", "Actual Signal Gain"),
        ("ARG", "Actual Reference Gain"),
        ("ASS", "Number of Sample Scans"),
        ("ARS", "Number of Reference Scans"),
        ("GFW", "Number of Good Forward Scans"),
        ("GBW", "Number of Good Backward Scans"),
        ("BFW", "Number of Bad Forward Scans"),
        ("BBW", "Number of Bad Backward Scans"),
        ("PKA", "Peak Amplitude"),
        ("PKL", "Peak Location"),
        ("PRA", "Backward Peak Amplitude"),
        ("PRL", "Backward Peak Location"),
        ("P2A", "Peak Amplitude Channel 2"),
        ("P2L", "Peak Location Channel 2"),
        ("P2R", "Backward Peak Amplitude Channel 2"),
        ("P2K", "Backward Peak Location Channel 2"),
        ("DAQ", "Data Acquisition Status"),
        ("AG2", "Actual Signal Gain Channel 2"),
        ("HUM", "Relative Humidity Interferometer"),
        ("SSM", "Sample Spacing Multiplier"),
        ("RSN", "Running Sample Number"),
        ("CRR", "Correlation Rejection Reason"),
        ("SRT", "Start Time (sec)"),
        ("ERT", "End Time (sec)"),
        ("DUR", "Duration (sec)"),
        ("TSC", "Scanner Temperature"),
        ("MVD", "Max Velocity Deviation"),
        ("PRS", "Pressure Interferometer (hPa)"),
        ("AN1", "Analog Signal 1"),
        ("AN2", "Analog Signal 2"),
        ("VSN", "Firmware Version"),
        ("SRN", "Instrument Serial Number"),
        ("CAM", "Coaddition Mode"),
        ("INS", "Instrument Type"),
        ("FOC", "Focal Length"),
        ("RDY", "Ready Check"),
        // Data status
        ("DPF", "Data Point Format"),
        ("NPT", "Number of Data Points"),
        ("FXV", "First X Value"),
        ("LXV", "Last X Value"),
        ("CSF", "Y Scaling Factor"),
        ("MXY", "Y Maximum"),
        ("MNY", "Y Minimum"),
        ("DXU", "X Units"),
        ("DYU", "Y Units"),
        ("DAT", "Date of Measurement"),
        ("TIM", "Time of Measurement"),
        ("DER", "Derivative"),
        ("NSN", "Scan Number"),
        ("XTX", "X Axis Label"),
        ("YTX", "Y Axis Label"),
    ];

    /// Human-readable label for a three-character parameter key (case insensitive)
    ///
    /// Unrecognized keys give "Unknown XXX", where XXX is the upper-cased key.
    pub fn param_label(key: &str) -> String {
        let key = key.to_ascii_uppercase();
        PARAM_LABELS.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, label)| label.to_string())
            .unwrap_or_else(|| format!("Unknown {key}"))
    }

    /// The binary type of one scalar in the per-spectrum info record of a data series block
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SeriesFieldType {
        Int32,
        Float64,
    }

    impl SeriesFieldType {
        pub fn nbytes(&self) -> usize {
            match self {
                Self::Int32 => 4,
                Self::Float64 => 8,
            }
        }
    }

    /// The fixed sequence of scalars at the start of each data series info record
    pub const SERIES_INFO_FIELDS: &[(&str, SeriesFieldType)] = &[
        ("nsn", SeriesFieldType::Int32),
        ("npt", SeriesFieldType::Int32),
        ("mny", SeriesFieldType::Float64),
        ("mxy", SeriesFieldType::Float64),
        ("srt", SeriesFieldType::Float64),
        ("ert", SeriesFieldType::Float64),
    ];

    /// Number of bytes needed to hold all of [`SERIES_INFO_FIELDS`]
    pub fn series_info_len() -> usize {
        SERIES_INFO_FIELDS.iter().map(|(_, t)| t.nbytes()).sum()
    }

    /// Binary layouts of the numeric subreport column types
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SubreportNumeric {
        Int32,
        Float32,
        Float64,
    }

    impl SubreportNumeric {
        pub fn from_type_code(code: i32) -> Option<Self> {
            match code {
                0 => Some(Self::Int32),
                1 => Some(Self::Float32),
                2 => Some(Self::Float64),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ParamType {
        Integer,
        Float,
        String,
        Enum,
        Senum,
        Unknown(i16)
    }

    impl ParamType {
        /// Check that a parameter of this type has enough bytes to hold its value.
        /// Strings and enums are read at whatever width the block gives.
        pub fn check_par_length(&self, key: &str, nbytes: usize) -> OpusResult<()> {
            let expected = match self {
                ParamType::Integer => 4,
                ParamType::Float => 8,
                _ => return Ok(()),
            };

            if nbytes < expected {
                Err(OpusError::ParamLengthMismatch { key: key.to_string(), expected, actual: nbytes })
            } else {
                Ok(())
            }
        }
    }

    impl From<i16> for ParamType {
        fn from(value: i16) -> Self {
            match value {
                TYPE_I4 => Self::Integer,
                TYPE_R8 => Self::Float,
                TYPE_STRING => Self::String,
                TYPE_ENUM => Self::Enum,
                TYPE_SENUM => Self::Senum,
                _ => Self::Unknown(value)
            }
        }
    }

    impl Display for ParamType {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                ParamType::Integer => write!(f, "integer"),
                ParamType::Float => write!(f, "float"),
                ParamType::String => write!(f, "string"),
                ParamType::Enum => write!(f, "enum"),
                ParamType::Senum => write!(f, "senum"),
                ParamType::Unknown(i) => write!(f, "unknown({i})"),
            }
        }
    }

    /// A single parameter value. Every parameter type other than integer and float
    /// is decoded as a string.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(untagged)]
    pub enum ParamValue {
        Integer(i32),
        Float(f64),
        String(String),
    }

    impl ParamValue {
        pub fn as_integer(&self) -> Result<i32, OpusTypeError> {
            if let Self::Integer(i) = self {
                Ok(*i)
            } else {
                Err(self.type_error("integer"))
            }
        }

        pub fn as_float(&self) -> Result<f64, OpusTypeError> {
            if let Self::Float(f) = self {
                Ok(*f)
            } else {
                Err(self.type_error("float"))
            }
        }

        /// Convert any numeric value (or a string holding a number) to an `f64`
        pub fn to_f64(&self) -> Result<f64, OpusTypeError> {
            match self {
                ParamValue::Integer(i) => Ok(*i as f64),
                ParamValue::Float(f) => Ok(*f),
                ParamValue::String(s) => s.trim().parse().map_err(|_| self.type_error("number")),
            }
        }

        pub fn as_str(&self) -> Result<&str, OpusTypeError> {
            if let Self::String(s) = self {
                Ok(s)
            } else {
                Err(self.type_error("string"))
            }
        }

        pub fn into_string(self) -> Result<String, OpusTypeError> {
            if let Self::String(s) = self {
                Ok(s)
            } else {
                Err(self.type_error("string"))
            }
        }

        pub fn type_name(&self) -> &'static str {
            match self {
                ParamValue::Integer(_) => "integer",
                ParamValue::Float(_) => "float",
                ParamValue::String(_) => "string",
            }
        }

        fn type_error(&self, expected: &str) -> OpusTypeError {
            OpusTypeError::ValueIntoError { expected: expected.to_string(), actual: self.type_name().to_string() }
        }
    }

    impl Display for ParamValue {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                ParamValue::Integer(i) => write!(f, "{i}"),
                ParamValue::Float(v) => write!(f, "{v}"),
                ParamValue::String(s) => write!(f, "{s}"),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_param_labels() {
            assert_eq!(param_label("bms"), "Beamsplitter");
            assert_eq!(param_label("NPT"), "Number of Data Points");
            assert_eq!(param_label("zzz"), "Unknown ZZZ");
        }

        #[test]
        fn test_value_conversions() {
            assert_eq!(ParamValue::Integer(3).to_f64().unwrap(), 3.0);
            assert_eq!(ParamValue::String(" 10.0".to_string()).to_f64().unwrap(), 10.0);
            assert!(ParamValue::Float(1.0).as_integer().is_err());
            assert!(ParamValue::String("MIR".to_string()).to_f64().is_err());
            assert_eq!(ParamValue::String("WN".to_string()).as_str().unwrap(), "WN");
        }

        #[test]
        fn test_param_length_check() {
            assert!(ParamType::Integer.check_par_length("npt", 4).is_ok());
            assert!(ParamType::Float.check_par_length("fxv", 4).is_err());
            assert!(ParamType::from(7).check_par_length("xyz", 0).is_ok());
        }
    }
}
