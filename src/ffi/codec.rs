//! Text Codec
//!
//! Stateless conversion between text values and the NUL-terminated UTF-8
//! byte layout native code reads and writes.
//!
//! Encoding never appends a terminator: the staging buffers are zero-filled
//! before every use, so the first unwritten byte already terminates the value.

use std::ffi::CStr;

use libc::c_char;

use super::error::{FfiError, FfiResult};

/// Encode a text value to its UTF-8 bytes.
///
/// Absent in, absent out, so callers can forward "no value" without branching.
pub fn encode(text: Option<&str>) -> Option<&[u8]> {
    text.map(str::as_bytes)
}

/// Encode a text value into a zeroed buffer.
///
/// Returns the number of bytes written, or `None` when `text` is absent (in
/// which case the buffer is left untouched). Fails without writing when the
/// encoding does not fit or contains a NUL byte a native reader would stop at.
pub fn encode_into(text: Option<&str>, buf: &mut [u8]) -> FfiResult<Option<usize>> {
    let Some(bytes) = encode(text) else {
        return Ok(None);
    };

    if bytes.len() > buf.len() {
        return Err(FfiError::CapacityExceeded {
            len: bytes.len(),
            capacity: buf.len(),
        });
    }
    if let Some(pos) = bytes.iter().position(|&b| b == 0) {
        return Err(FfiError::InvalidArgument(format!(
            "text contains a NUL byte at offset {}",
            pos
        )));
    }

    buf[..bytes.len()].copy_from_slice(bytes);
    if let Some(terminator) = buf.get_mut(bytes.len()) {
        *terminator = 0;
    }
    Ok(Some(bytes.len()))
}

/// Length of the value held in `bytes`: offset of the first NUL, or the
/// whole buffer if native code exhausted it.
pub fn terminated_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}

/// Decode the NUL-terminated prefix of `bytes`.
///
/// An all-zero buffer decodes to the empty string. Invalid UTF-8 sequences
/// are replaced with U+FFFD.
pub fn decode(bytes: &[u8]) -> String {
    let prefix = &bytes[..terminated_len(bytes)];
    String::from_utf8_lossy(prefix).into_owned()
}

/// Decode a NUL-terminated string owned by native code.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of this call.
pub unsafe fn decode_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Reject an absent value where the operation requires one
pub fn require<'a>(text: Option<&'a str>, what: &str) -> FfiResult<&'a str> {
    text.ok_or_else(|| FfiError::InvalidArgument(format!("{} is required", what)))
}
