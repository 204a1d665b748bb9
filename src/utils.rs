//! General byte-level utilities, not particular to any one kind of Opus block.
use encoding::{all::ISO_8859_1, DecoderTrap, Encoding};

use crate::error::{OpusError, OpusResult};

/// A little-endian reader over a borrowed slice of an Opus file.
///
/// Every read takes an absolute offset into the slice and is bounds checked; reading
/// past the end gives [`OpusError::TooShort`] rather than panicking. `what` arguments
/// are short descriptions of the value being read, used only in error messages.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'b> {
    buf: &'b [u8],
}

impl<'b> ByteReader<'b> {
    pub fn new(buf: &'b [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Return `nbytes` starting at `offset` as a subslice of the underlying buffer.
    pub fn read_bytes(&self, offset: usize, nbytes: usize, what: &'static str) -> OpusResult<&'b [u8]> {
        let end = offset.checked_add(nbytes)
            .ok_or_else(|| OpusError::too_short(what, usize::MAX, self.buf.len()))?;
        self.buf.get(offset..end)
            .ok_or_else(|| OpusError::too_short(what, end, self.buf.len()))
    }

    /// Like `read_bytes`, but returns however many bytes are available (possibly
    /// none) when the requested range runs past the end of the buffer.
    pub fn read_bytes_clamped(&self, offset: usize, nbytes: usize) -> &'b [u8] {
        let start = offset.min(self.buf.len());
        let end = offset.saturating_add(nbytes).min(self.buf.len());
        &self.buf[start..end]
    }

    fn read_array<const N: usize>(&self, offset: usize, what: &'static str) -> OpusResult<[u8; N]> {
        let bytes = self.read_bytes(offset, N, what)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(bytes);
        Ok(arr)
    }

    /// Read two bytes and interpret them as an i16
    pub fn read_i16(&self, offset: usize, what: &'static str) -> OpusResult<i16> {
        self.read_array(offset, what).map(i16::from_le_bytes)
    }

    /// Read four bytes and intepret them as an i32
    pub fn read_i32(&self, offset: usize, what: &'static str) -> OpusResult<i32> {
        self.read_array(offset, what).map(i32::from_le_bytes)
    }

    /// Read four bytes and interpret them as an f32
    pub fn read_f32(&self, offset: usize, what: &'static str) -> OpusResult<f32> {
        self.read_array(offset, what).map(f32::from_le_bytes)
    }

    /// Read eight bytes and interpret them as an f64
    pub fn read_f64(&self, offset: usize, what: &'static str) -> OpusResult<f64> {
        self.read_array(offset, what).map(f64::from_le_bytes)
    }

    /// Read a fixed-width, null-terminated string.
    ///
    /// The width is clamped to the end of the buffer, so this never fails; see [`decode_str`]
    /// for how the bytes are turned into a string.
    pub fn read_string(&self, offset: usize, width: usize) -> String {
        decode_str(self.read_bytes_clamped(offset, width))
    }
}

/// Decode a fixed-width string field.
///
/// Strings in Opus files are usually stored in a field wider than the string itself, with
/// the end of the string marked by a null byte. This truncates at the first null (if any)
/// and decodes the rest as Latin-1. Should decoding ever fail, the returned string is a
/// visible placeholder describing the failure instead of an error.
pub fn decode_str(bytes: &[u8]) -> String {
    let inull = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    ISO_8859_1.decode(&bytes[..inull], DecoderTrap::Replace)
        .unwrap_or_else(|e| format!("<failed to decode: {e}>"))
}

/// Reinterpret a byte slice as little-endian `f32` values.
///
/// Any trailing bytes that do not make up a full value are ignored.
pub fn le_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Reinterpret a byte slice as little-endian `i32` values.
///
/// Any trailing bytes that do not make up a full value are ignored.
pub fn le_i32s(bytes: &[u8]) -> Vec<i32> {
    bytes.chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
