//! String encoding functions.
//!
//! NTLM peers exchange strings either as UTF-16 in little-endian byte order or, if Unicode has not
//! been negotiated, in a single-byte "OEM" character set. We treat the OEM character set as
//! Latin-1: every byte is one character, and characters beyond U+00FF cannot be represented.


use crate::Flags;


/// The way strings are encoded within an NTLM message.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StringEncoding {
    /// One byte per character (Latin-1).
    Oem,

    /// UTF-16 in little-endian byte order, without a Byte Order Mark.
    Utf16Le,
}
impl StringEncoding {
    /// Derives the string encoding from the flags of a Challenge message.
    ///
    /// The OEM flag takes precedence; without it, strings are UTF-16.
    pub fn from_flags(flags: Flags) -> Self {
        if flags.contains(Flags::NEGOTIATE_OEM) {
            Self::Oem
        } else {
            Self::Utf16Le
        }
    }

    /// Encodes the given string into bytes.
    pub fn encode(self, string: &str) -> Vec<u8> {
        match self {
            Self::Oem => rust_string_to_oem(string),
            Self::Utf16Le => rust_string_to_utf16_le(string),
        }
    }

    /// Decodes the given bytes into a string.
    ///
    /// Decoding never fails: unpaired surrogates are replaced and a trailing odd byte of a UTF-16
    /// string is dropped.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Oem => oem_string_to_rust(bytes),
            Self::Utf16Le => utf16_le_string_to_rust(bytes),
        }
    }
}


/// Converts the given OEM string into a Rust string.
pub(crate) fn oem_string_to_rust(oem_string: &[u8]) -> String {
    oem_string.iter()
        .map(|&b| char::from(b))
        .collect()
}


/// Converts the given Rust string into an OEM string.
///
/// Characters that do not fit into a single byte are replaced by `?`.
pub(crate) fn rust_string_to_oem(rust_str: &str) -> Vec<u8> {
    rust_str.chars()
        .map(|c| u8::try_from(c).unwrap_or(b'?'))
        .collect()
}


/// Converts UTF-16 values stored as bytes in little-endian format into a string.
pub(crate) fn utf16_le_string_to_rust(bytes: &[u8]) -> String {
    let u16s: Vec<u16> = bytes.chunks_exact(2)
        .map(|chk| u16::from_le_bytes([chk[0], chk[1]]))
        .collect();
    String::from_utf16_lossy(&u16s)
}


/// Converts the given Rust string into UTF-16 values stored as bytes in little-endian format.
pub(crate) fn rust_string_to_utf16_le(rust_str: &str) -> Vec<u8> {
    rust_str.encode_utf16()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}
