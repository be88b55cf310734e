//! The client side of the NTLM challenge-response handshake.
//!
//! The handshake consists of three messages: the client sends a Negotiate message, the server
//! answers with a Challenge message and the client proves knowledge of the password with an
//! Authenticate message. This crate encodes the first and the last and decodes the second; carrying
//! the messages (usually in `Authorization` and `WWW-Authenticate` HTTP headers) is up to the
//! caller.
//!
//! Sample usage:
//! ```
//! use std::collections::HashMap;
//!
//! use ntlmhandshake::{Credentials, ParsingError, StoringError};
//!
//! #[derive(Debug)]
//! enum HandshakeError {
//!     Parsing(ParsingError),
//!     Storing(StoringError),
//! }
//!
//! /// Sends a request carrying the given `Authorization` header, returning the response headers.
//! fn send_request(authorization: &str) -> HashMap<String, String> {
//!     unimplemented!("transport goes here ({})", authorization)
//! }
//!
//! fn authenticate(username: &str, password: &str) -> Result<(), HandshakeError> {
//!     let creds = Credentials::from_qualified_username(username, password);
//!
//!     let negotiate = ntlmhandshake::negotiate_header(None, Some(creds.domain.as_str()))
//!         .map_err(HandshakeError::Storing)?;
//!     let response_headers = send_request(&negotiate);
//!
//!     let challenge = ntlmhandshake::decode_challenge_from_headers(&response_headers)
//!         .map_err(HandshakeError::Parsing)?;
//!     let authenticate = ntlmhandshake::authenticate_header(&challenge, &creds, None)
//!         .map_err(HandshakeError::Storing)?;
//!     let _final_headers = send_request(&authenticate);
//!
//!     Ok(())
//! }
//! ```


mod encoding;
mod host;
pub mod responses;


use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::prelude::{BASE64_STANDARD, Engine};
use bitflags::bitflags;
use log::{debug, trace};

pub use crate::encoding::StringEncoding;
pub use crate::host::{FixedHost, Host, SystemHost};
use crate::responses::{ChallengeResponse, respond_challenge_ntlm_v1, respond_challenge_ntlm_v2};


/// The magic value at the start of every NTLMSSP data packet.
const NTLMSSP_MAGIC: [u8; 8] = *b"NTLMSSP\0";

const MESSAGE_TYPE_NEGOTIATE: u32 = 0x0000_0001;
const MESSAGE_TYPE_CHALLENGE: u32 = 0x0000_0002;
const MESSAGE_TYPE_AUTHENTICATE: u32 = 0x0000_0003;

/// Length of the fixed part of a Challenge message up to and including the server challenge.
///
/// Security buffers may not point into this region.
const CHALLENGE_HEADER_LEN: usize = 32;

/// Length of a Challenge message that includes the target information security buffer.
const CHALLENGE_TARGET_INFO_HEADER_LEN: usize = 48;

/// The authentication scheme name used in HTTP headers.
const AUTH_SCHEME: &str = "NTLM";

/// The HTTP header in which servers send their challenges.
const WWW_AUTHENTICATE: &str = "www-authenticate";

/// Standard base64 that accepts challenge tokens with or without padding.
const CHALLENGE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);


/// Standard NTLM credentials, consisting of username, password and domain.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Credentials {
    /// The username part of the credentials.
    pub username: String,

    /// The password part of the credentials.
    pub password: String,

    /// The domain part of the credentials, which is the authentication target.
    ///
    /// In credentials without a domain, the domain is an empty string.
    pub domain: String,
}
impl Credentials {
    /// Creates credentials from a username that may be qualified with a domain, either as
    /// `<DOMAIN>\<USERNAME>` or as `<USERNAME>@<DOMAIN>`.
    pub fn from_qualified_username(qualified_username: &str, password: &str) -> Self {
        let (domain, username) = if let Some((domain, user)) = qualified_username.split_once('\\') {
            (domain, user)
        } else if let Some((user, domain)) = qualified_username.split_once('@') {
            (domain, user)
        } else {
            ("", qualified_username)
        };

        Self {
            username: username.to_owned(),
            password: password.to_owned(),
            domain: domain.to_owned(),
        }
    }
}


bitflags! {
    /// NTLM operation flags.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
    pub struct Flags: u32 {
        const NEGOTIATE_UNICODE = 0x0000_0001;
        const NEGOTIATE_OEM = 0x0000_0002;
        const REQUEST_TARGET = 0x0000_0004;
        const UNKNOWN_8 = 0x0000_0008;
        const NEGOTIATE_SIGN = 0x0000_0010;
        const NEGOTIATE_SEAL = 0x0000_0020;
        const NEGOTIATE_DATAGRAM = 0x0000_0040;
        const NEGOTIATE_LANMAN_KEY = 0x0000_0080;
        const NEGOTIATE_NETWARE = 0x0000_0100;
        const NEGOTIATE_NTLM = 0x0000_0200;
        const UNKNOWN_400 = 0x0000_0400;
        const NEGOTIATE_ANONYMOUS = 0x0000_0800;
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x0000_1000;
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x0000_2000;
        const NEGOTIATE_LOCAL_CALL = 0x0000_4000;
        const NEGOTIATE_ALWAYS_SIGN = 0x0000_8000;
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        const TARGET_TYPE_SERVER = 0x0002_0000;
        const TARGET_TYPE_SHARE = 0x0004_0000;
        const NEGOTIATE_NTLM2_KEY = 0x0008_0000;
        const REQUEST_INIT_RESPONSE = 0x0010_0000;
        const REQUEST_ACCEPT_RESPONSE = 0x0020_0000;
        const REQUEST_NON_NT_SESSION_KEY = 0x0040_0000;
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        const UNKNOWN_1000000 = 0x0100_0000;
        const NEGOTIATE_VERSION = 0x0200_0000;
        const UNKNOWN_4000000 = 0x0400_0000;
        const UNKNOWN_8000000 = 0x0800_0000;
        const UNKNOWN_10000000 = 0x1000_0000;
        const NEGOTIATE_128BIT = 0x2000_0000;
        const NEGOTIATE_KEY_EXCHANGE = 0x4000_0000;
        const NEGOTIATE_56BIT = 0x8000_0000;
    }
}
impl Flags {
    /// The flags sent in every Negotiate message.
    pub fn negotiate_default() -> Self {
        Self::NEGOTIATE_OEM
            | Self::REQUEST_TARGET
            | Self::NEGOTIATE_NTLM
            | Self::NEGOTIATE_NTLM2_KEY
            | Self::NEGOTIATE_ALWAYS_SIGN
    }
}


/// An error that may occur while parsing a Challenge message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ParsingError {
    /// No usable input was supplied.
    InvalidArgument { reason: &'static str },

    /// The message is shorter than its fixed fields.
    ShortMessage { expected_min_len: usize, obtained_len: usize },

    /// The magic value does not match the expected one.
    MagicMismatch { expected: [u8; 8], obtained: Vec<u8> },

    /// The message is not of the expected type.
    InvalidMessageType { expected: u32, obtained: u32 },

    /// A security buffer points outside the message or into its fixed header.
    BadChallenge { field: &'static str, offset: u32, length: u16, message_len: usize },

    /// The challenge token is not valid base64.
    InvalidBase64 { reason: String },

    /// A client nonce is not exactly 16 hexadecimal digits.
    InvalidNonce { value: String },
}
impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { reason }
                => write!(f, "invalid argument: {}", reason),
            Self::ShortMessage { expected_min_len, obtained_len }
                => write!(f, "message too short (expected at least {} bytes, obtained {})", expected_min_len, obtained_len),
            Self::MagicMismatch { expected, obtained }
                => write!(f, "mismatched magic (expected {:?}, obtained {:?})", expected, obtained),
            Self::InvalidMessageType { expected, obtained }
                => write!(f, "invalid message type (expected {}, obtained {})", expected, obtained),
            Self::BadChallenge { field, offset, length, message_len }
                => write!(f, "bad challenge message: {} ({} bytes at offset {}) is outside the data area of the {}-byte message", field, length, offset, message_len),
            Self::InvalidBase64 { reason }
                => write!(f, "failed to decode challenge as base64: {}", reason),
            Self::InvalidNonce { value }
                => write!(f, "client nonce {:?} is not 16 hexadecimal digits", value),
        }
    }
}
impl std::error::Error for ParsingError {
}

/// An error that may occur while writing an NTLM packet.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StoringError {
    /// A field is too long to be described by a security buffer.
    FieldTooLong { field: &'static str, length: usize },
}
impl fmt::Display for StoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldTooLong { field, length }
                => write!(f, "{} is too long for a security buffer ({} bytes)", field, length),
        }
    }
}
impl std::error::Error for StoringError {
}


/// The contents of an NTLM Negotiate message.
///
/// The Negotiate message is the first message in an NTLM challenge-response process and is sent by
/// the client to the server; the server is expected to respond with a Challenge message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NegotiateMessage {
    /// Stores which NTLM behavior should be negotiated.
    pub flags: Flags,

    /// The domain against which the client wishes to authenticate.
    pub supplied_domain: String,

    /// The NT hostname of the client.
    pub supplied_workstation: String,
}

/// The contents of an NTLM Challenge message.
///
/// The Challenge message is sent by the server in response to the client's Negotiate message; the
/// client is expected to respond with an Authenticate message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChallengeMessage {
    /// Stores which NTLM behavior has been accepted by the server from the client's request.
    pub flags: Flags,

    /// The encoding of strings, derived from the flags.
    pub encoding: StringEncoding,

    /// The challenge value.
    pub challenge: [u8; 8],

    /// The host against which the client is authenticating.
    pub target_name: String,

    /// Information about the targets of the authentication, if the server supplied any.
    pub target_info: Option<TargetInfo>,
}

/// A decoded Challenge message, tagged with the protocol version it calls for.
///
/// The version is 2 if the server has accepted the NTLM2 key flag and 1 otherwise; it decides the
/// responses and the layout of the Authenticate message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Challenge {
    V1(ChallengeMessage),
    V2(ChallengeMessage),
}
impl Challenge {
    /// Returns the NTLM protocol version called for by this challenge.
    pub fn version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    /// Returns the contents of the Challenge message.
    pub fn message(&self) -> &ChallengeMessage {
        match self {
            Self::V1(msg) => msg,
            Self::V2(msg) => msg,
        }
    }
}

/// The contents of an NTLM Authenticate message.
///
/// The Authenticate message is sent by the client in response to the server's Challenge message;
/// once it is accepted by the server, the authentication has succeeded.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AuthenticateMessage {
    pub lm_response: Vec<u8>,
    pub ntlm_response: Vec<u8>,
    pub domain_name: String,
    pub user_name: String,
    pub workstation_name: String,

    /// The encoding of the strings, taken over from the Challenge message.
    pub encoding: StringEncoding,

    /// The session key and flags, only sent in NTLMv2 Authenticate messages.
    pub session: Option<SessionSetup>,
}

/// The NTLMv2-only trailer of the Authenticate message header.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SessionSetup {
    pub session_key: [u8; 16],

    /// The flags of the Challenge message, echoed verbatim.
    pub flags: Flags,
}

/// An NTLM security buffer, pointing to data contained later in the message.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SecurityBuffer {
    pub length: u16,
    pub capacity: u16,
    pub offset: u32,
}

/// The type of a target information sub-block included in the Challenge message.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TargetInfoType {
    Terminator,
    Server,
    Domain,
    Fqdn,
    Dns,
    ParentDns,
    Unknown(u16),
}
impl TargetInfoType {
    /// Returns the name under which values of this type are recorded, if they are recorded at all.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Server => Some("SERVER"),
            Self::Domain => Some("DOMAIN"),
            Self::Fqdn => Some("FQDN"),
            Self::Dns => Some("DNS"),
            Self::ParentDns => Some("PARENT_DNS"),
            Self::Terminator|Self::Unknown(_) => None,
        }
    }
}
impl From<TargetInfoType> for u16 {
    fn from(t: TargetInfoType) -> Self {
        match t {
            TargetInfoType::Terminator => 0x0000,
            TargetInfoType::Server => 0x0001,
            TargetInfoType::Domain => 0x0002,
            TargetInfoType::Fqdn => 0x0003,
            TargetInfoType::Dns => 0x0004,
            TargetInfoType::ParentDns => 0x0005,
            TargetInfoType::Unknown(w) => w,
        }
    }
}
impl From<u16> for TargetInfoType {
    fn from(w: u16) -> Self {
        match w {
            0x0000 => TargetInfoType::Terminator,
            0x0001 => TargetInfoType::Server,
            0x0002 => TargetInfoType::Domain,
            0x0003 => TargetInfoType::Fqdn,
            0x0004 => TargetInfoType::Dns,
            0x0005 => TargetInfoType::ParentDns,
            other => TargetInfoType::Unknown(other),
        }
    }
}

/// Additional target information included in the Challenge message.
///
/// Only `raw` is relevant to the protocol: it is embedded verbatim in the NTLMv2 response. `entries`
/// holds the named values found in it, for inspection.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TargetInfo {
    pub entries: BTreeMap<TargetInfoType, String>,
    pub raw: Vec<u8>,
}
impl TargetInfo {
    /// Walks the sub-blocks of a target information block.
    ///
    /// The walk ends at the terminator sub-block or at the end of `raw`, whichever comes first.
    /// Values of unknown sub-blocks are skipped; a value running past the end of `raw` is cut
    /// short.
    pub fn parse(raw: &[u8]) -> Self {
        let mut entries = BTreeMap::new();
        let mut rest = raw;
        while rest.len() >= 4 {
            let entry_type = TargetInfoType::from(le_u16(rest, 0));
            let length = usize::from(le_u16(rest, 2));
            rest = &rest[4..];

            if entry_type == TargetInfoType::Terminator {
                break;
            }

            let value = &rest[..length.min(rest.len())];
            if entry_type.name().is_some() {
                let value_string = StringEncoding::Utf16Le.decode(value);
                trace!("target info {:?} = {:?}", entry_type, value_string);
                entries.insert(entry_type, value_string);
            } else {
                trace!("skipping target info sub-block {:?} ({} bytes)", entry_type, value.len());
            }
            rest = &rest[value.len()..];
        }

        Self {
            entries,
            raw: Vec::from(raw),
        }
    }

    /// Returns the value recorded for the given sub-block type.
    pub fn get(&self, entry_type: TargetInfoType) -> Option<&str> {
        self.entries.get(&entry_type)
            .map(|s| s.as_str())
    }
}


/// Access to the `WWW-Authenticate` headers of an HTTP response.
pub trait AuthenticateHeaders {
    /// Returns the values of all `WWW-Authenticate` headers, in order.
    fn www_authenticate_values(&self) -> Vec<&str>;
}
impl<S: BuildHasher> AuthenticateHeaders for HashMap<String, String, S> {
    fn www_authenticate_values(&self) -> Vec<&str> {
        map_www_authenticate_values(self.iter())
    }
}
impl AuthenticateHeaders for BTreeMap<String, String> {
    fn www_authenticate_values(&self) -> Vec<&str> {
        map_www_authenticate_values(self.iter())
    }
}
/// Collects the `WWW-Authenticate` values from the entries of a header map.
fn map_www_authenticate_values<'a, I: Iterator<Item = (&'a String, &'a String)>>(entries: I) -> Vec<&'a str> {
    entries
        .filter(|(name, _value)| name.eq_ignore_ascii_case(WWW_AUTHENTICATE))
        .map(|(_name, value)| value.as_str())
        .collect()
}
impl<N: AsRef<str>, V: AsRef<str>> AuthenticateHeaders for [(N, V)] {
    fn www_authenticate_values(&self) -> Vec<&str> {
        self.iter()
            .filter(|(name, _value)| name.as_ref().eq_ignore_ascii_case(WWW_AUTHENTICATE))
            .map(|(_name, value)| value.as_ref())
            .collect()
    }
}
impl<N: AsRef<str>, V: AsRef<str>> AuthenticateHeaders for Vec<(N, V)> {
    fn www_authenticate_values(&self) -> Vec<&str> {
        self.as_slice().www_authenticate_values()
    }
}


// serialization and deserialization code


/// Reads a little-endian 16-bit value at the given offset.
fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Reads a little-endian 32-bit value at the given offset.
fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

/// Starts a message with the magic value and the message type.
fn message_start(message_type: u32) -> Vec<u8> {
    let mut ret = Vec::new();
    ret.extend_from_slice(&NTLMSSP_MAGIC);
    ret.extend_from_slice(&message_type.to_le_bytes());
    ret
}

/// Appends a security buffer to the end of a message.
///
/// The security buffer is appended to `message_bytes` while the data itself is appended to
/// `data_block`. It is assumed that once `message_bytes` has been filled with all the required
/// information, the contents of `data_block` are appended to it. `sec_buffer_offset` takes care of
/// the next free offset in the message at which data of a security buffer can be appended.
fn append_sec_buffer(message_bytes: &mut Vec<u8>, data_block: &mut Vec<u8>, sec_buffer_offset: &mut u32, field: &'static str, data: &[u8]) -> Result<(), StoringError> {
    let mut sb = SecurityBuffer::for_slice(field, data)?;
    sb.offset = *sec_buffer_offset;

    data_block.extend_from_slice(data);
    message_bytes.extend_from_slice(&sb.to_bytes());
    *sec_buffer_offset += u32::from(sb.length);

    Ok(())
}

/// Appends a security buffer to the end of a message, pointing at offset 0 if the data is empty.
///
/// Functions similarly to [`append_sec_buffer`] otherwise.
fn append_optional_sec_buffer(message_bytes: &mut Vec<u8>, data_block: &mut Vec<u8>, sec_buffer_offset: &mut u32, field: &'static str, data: &[u8]) -> Result<(), StoringError> {
    if data.is_empty() {
        message_bytes.extend_from_slice(&SecurityBuffer::default().to_bytes());
        Ok(())
    } else {
        append_sec_buffer(message_bytes, data_block, sec_buffer_offset, field, data)
    }
}

impl NegotiateMessage {
    /// Creates a Negotiate message with the default flags.
    pub fn new(workstation: &str, domain: &str) -> Self {
        Self {
            flags: Flags::negotiate_default(),
            supplied_domain: domain.to_owned(),
            supplied_workstation: workstation.to_owned(),
        }
    }

    /// Serializes the Negotiate message into bytes.
    ///
    /// Domain and workstation are always encoded using the OEM encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut sec_buffer_offset: u32
            = 8 // magic
            + 4 // message type
            + 4 // flags
            + 8 // supplied domain secbuffer
            + 8 // supplied workstation secbuffer
            ;

        let mut ret = message_start(MESSAGE_TYPE_NEGOTIATE);
        let mut data_block = Vec::new();

        ret.extend_from_slice(&self.flags.bits().to_le_bytes());
        append_optional_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, "domain", &StringEncoding::Oem.encode(&self.supplied_domain))?;
        append_optional_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, "workstation", &StringEncoding::Oem.encode(&self.supplied_workstation))?;
        ret.append(&mut data_block);
        Ok(ret)
    }
}

impl TryFrom<&[u8]> for Challenge {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(ParsingError::InvalidArgument { reason: "empty challenge message" });
        }
        if value.len() < CHALLENGE_HEADER_LEN {
            return Err(ParsingError::ShortMessage { expected_min_len: CHALLENGE_HEADER_LEN, obtained_len: value.len() });
        }
        if value[0..8] != NTLMSSP_MAGIC {
            return Err(ParsingError::MagicMismatch { expected: NTLMSSP_MAGIC, obtained: Vec::from(&value[0..8]) });
        }
        let message_type = le_u32(value, 8);
        if message_type != MESSAGE_TYPE_CHALLENGE {
            return Err(ParsingError::InvalidMessageType { expected: MESSAGE_TYPE_CHALLENGE, obtained: message_type });
        }

        let target_name_secbuf = SecurityBuffer::try_from(&value[12..20])?;
        let flags = Flags::from_bits_retain(le_u32(value, 20));
        let encoding = StringEncoding::from_flags(flags);
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&value[24..32]);

        let target_name_bytes = target_name_secbuf.apply_to_message(value, "target name")?;
        let target_name = encoding.decode(target_name_bytes);

        let target_info = if flags.contains(Flags::NEGOTIATE_TARGET_INFO) {
            if value.len() < CHALLENGE_TARGET_INFO_HEADER_LEN {
                return Err(ParsingError::ShortMessage { expected_min_len: CHALLENGE_TARGET_INFO_HEADER_LEN, obtained_len: value.len() });
            }
            let target_info_secbuf = SecurityBuffer::try_from(&value[40..48])?;
            let target_info_bytes = target_info_secbuf.apply_to_message(value, "target info")?;
            Some(TargetInfo::parse(target_info_bytes))
        } else {
            None
        };

        let message = ChallengeMessage {
            flags,
            encoding,
            challenge,
            target_name,
            target_info,
        };
        let challenge = if flags.contains(Flags::NEGOTIATE_NTLM2_KEY) {
            Challenge::V2(message)
        } else {
            Challenge::V1(message)
        };
        debug!(
            "decoded NTLM challenge: version {}, flags {:?}, target name {:?}",
            challenge.version(), flags, challenge.message().target_name,
        );
        Ok(challenge)
    }
}

impl AuthenticateMessage {
    /// Serializes the Authenticate message into bytes.
    ///
    /// Without a session setup, the data block follows the five security buffers directly
    /// (offset 52); with one, the session key security buffer and the flags come first (offset 64).
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut sec_buffer_offset: u32
            = 8 // magic
            + 4 // message type
            + 8 // LM response secbuffer
            + 8 // NTLM response secbuffer
            + 8 // domain name secbuffer
            + 8 // user name secbuffer
            + 8 // workstation name secbuffer
            ;
        if self.session.is_some() {
            sec_buffer_offset
                += 8 // session key secbuffer
                + 4 // flags
                ;
        }

        let mut ret = message_start(MESSAGE_TYPE_AUTHENTICATE);
        let mut data_block = Vec::new();

        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, "LM response", &self.lm_response)?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, "NTLM response", &self.ntlm_response)?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, "domain name", &self.encoding.encode(&self.domain_name))?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, "user name", &self.encoding.encode(&self.user_name))?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, "workstation name", &self.encoding.encode(&self.workstation_name))?;
        if let Some(session) = &self.session {
            append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, "session key", &session.session_key)?;
            ret.extend_from_slice(&session.flags.bits().to_le_bytes());
        }
        ret.append(&mut data_block);
        Ok(ret)
    }
}

impl SecurityBuffer {
    /// Generates a security buffer for the given slice of bytes.
    ///
    /// The length and capacity are set to the length of the slice, while the offset is set to 0.
    pub fn for_slice(field: &'static str, slice: &[u8]) -> Result<Self, StoringError> {
        let len_u16: u16 = slice.len()
            .try_into()
            .or(Err(StoringError::FieldTooLong { field, length: slice.len() }))?;
        Ok(Self {
            length: len_u16,
            capacity: len_u16,
            offset: 0,
        })
    }

    /// Serializes the security buffer into bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut ret = Vec::with_capacity(8);
        ret.extend_from_slice(&self.length.to_le_bytes());
        ret.extend_from_slice(&self.capacity.to_le_bytes());
        ret.extend_from_slice(&self.offset.to_le_bytes());
        ret
    }

    /// Applies the security buffer to a Challenge message, extracting the data itself.
    ///
    /// An empty security buffer yields an empty slice regardless of its offset. Otherwise, the data
    /// must lie entirely within `message` and after the fixed Challenge header.
    pub fn apply_to_message<'a>(&self, message: &'a [u8], field: &'static str) -> Result<&'a [u8], ParsingError> {
        if self.length == 0 {
            // short-circuit
            return Ok(&message[0..0]);
        }

        let start = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(usize::from(self.length));
        if start < CHALLENGE_HEADER_LEN || end > message.len() {
            return Err(ParsingError::BadChallenge {
                field,
                offset: self.offset,
                length: self.length,
                message_len: message.len(),
            });
        }

        Ok(&message[start..end])
    }
}
impl TryFrom<&[u8]> for SecurityBuffer {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != 8 {
            return Err(ParsingError::ShortMessage { expected_min_len: 8, obtained_len: value.len() });
        }

        Ok(Self {
            length: le_u16(value, 0),
            capacity: le_u16(value, 2),
            offset: le_u32(value, 4),
        })
    }
}

impl ChallengeResponse {
    /// Converts this response to a challenge into a full-blown Authenticate message.
    ///
    /// Strings are encoded the way the challenge prescribes; the session key, if any, is sent along
    /// with the challenge's flags.
    pub fn to_message(&self, creds: &Credentials, workstation_name: &str, challenge: &Challenge) -> AuthenticateMessage {
        let challenge_message = challenge.message();
        AuthenticateMessage {
            lm_response: self.lm_response.clone(),
            ntlm_response: self.ntlm_response.clone(),
            domain_name: creds.domain.clone(),
            user_name: creds.username.clone(),
            workstation_name: workstation_name.to_owned(),
            encoding: challenge_message.encoding,
            session: self.session_key.map(|session_key| SessionSetup {
                session_key,
                flags: challenge_message.flags,
            }),
        }
    }
}


// handshake steps


/// Encodes a Negotiate message.
///
/// If no workstation is given, the hostname of the running system is sent; if no target is given,
/// none is sent.
pub fn encode_negotiate(workstation: Option<&str>, target: Option<&str>) -> Result<Vec<u8>, StoringError> {
    encode_negotiate_with(&SystemHost, workstation, target)
}

/// Encodes a Negotiate message, obtaining the default workstation name from `host`.
pub fn encode_negotiate_with<H: Host + ?Sized>(host: &H, workstation: Option<&str>, target: Option<&str>) -> Result<Vec<u8>, StoringError> {
    let workstation = match workstation {
        Some(w) => w.to_owned(),
        None => host.workstation_name(),
    };
    let message = NegotiateMessage::new(&workstation, target.unwrap_or(""));
    let bytes = message.to_bytes()?;
    debug!("encoded NTLM negotiate message ({} bytes)", bytes.len());
    Ok(bytes)
}

/// Decodes a Challenge message.
pub fn decode_challenge(bytes: &[u8]) -> Result<Challenge, ParsingError> {
    Challenge::try_from(bytes)
}

/// Finds the token following the `NTLM` scheme in any of the comma-separated challenges of a
/// `WWW-Authenticate` header value.
///
/// Returns an empty token if the scheme is present without one and `None` if it is absent.
fn scheme_token(header_value: &str) -> Option<&str> {
    for challenge in header_value.split(',') {
        let mut words = challenge.split_whitespace();
        let is_ntlm = words.next()
            .map(|scheme| scheme.eq_ignore_ascii_case(AUTH_SCHEME))
            .unwrap_or(false);
        if is_ntlm {
            return Some(words.next().unwrap_or(""));
        }
    }
    None
}

/// Decodes a Challenge message from a header value, either `NTLM <base64>` or the bare base64
/// token.
pub fn decode_challenge_header(header_value: &str) -> Result<Challenge, ParsingError> {
    let token = scheme_token(header_value)
        .unwrap_or_else(|| header_value.trim());
    if token.is_empty() {
        return Err(ParsingError::InvalidArgument { reason: "no NTLM challenge token in header" });
    }

    let bytes = CHALLENGE_BASE64.decode(token)
        .map_err(|e| ParsingError::InvalidBase64 { reason: e.to_string() })?;
    decode_challenge(&bytes)
}

/// Decodes a Challenge message from the `WWW-Authenticate` headers of an HTTP response.
///
/// A header carrying the `NTLM` scheme is preferred over other `WWW-Authenticate` headers.
pub fn decode_challenge_from_headers<H: AuthenticateHeaders + ?Sized>(headers: &H) -> Result<Challenge, ParsingError> {
    let values = headers.www_authenticate_values();
    let header_value = values.iter()
        .find(|value| scheme_token(value).map(|token| !token.is_empty()).unwrap_or(false))
        .or_else(|| values.first())
        .ok_or(ParsingError::InvalidArgument { reason: "no WWW-Authenticate header" })?;
    decode_challenge_header(header_value)
}

/// Encodes an Authenticate message answering the given challenge.
///
/// If no workstation is given, none is sent.
pub fn encode_authenticate(challenge: &Challenge, creds: &Credentials, workstation: Option<&str>) -> Result<Vec<u8>, StoringError> {
    encode_authenticate_with(&SystemHost, challenge, creds, workstation)
}

/// Encodes an Authenticate message answering the given challenge, obtaining client nonce and time
/// from `host`.
pub fn encode_authenticate_with<H: Host + ?Sized>(host: &H, challenge: &Challenge, creds: &Credentials, workstation: Option<&str>) -> Result<Vec<u8>, StoringError> {
    let response = match challenge {
        Challenge::V1(msg) => respond_challenge_ntlm_v1(msg.challenge, creds),
        Challenge::V2(msg) => {
            let target_info = msg.target_info
                .as_ref()
                .map(|ti| ti.raw.as_slice())
                .unwrap_or(&[]);
            respond_challenge_ntlm_v2(msg.challenge, target_info, host.ntlm_time(), host.client_nonce(), creds)
        },
    };

    let message = response.to_message(creds, workstation.unwrap_or(""), challenge);
    let bytes = message.to_bytes()?;
    debug!("encoded NTLMv{} authenticate message ({} bytes)", challenge.version(), bytes.len());
    Ok(bytes)
}

/// Wraps an encoded message into an `Authorization` header value.
pub fn to_header_value(message_bytes: &[u8]) -> String {
    format!("{} {}", AUTH_SCHEME, BASE64_STANDARD.encode(message_bytes))
}

/// Encodes a Negotiate message as an `Authorization` header value.
pub fn negotiate_header(workstation: Option<&str>, target: Option<&str>) -> Result<String, StoringError> {
    encode_negotiate(workstation, target)
        .map(|bytes| to_header_value(&bytes))
}

/// Encodes an Authenticate message as an `Authorization` header value.
pub fn authenticate_header(challenge: &Challenge, creds: &Credentials, workstation: Option<&str>) -> Result<String, StoringError> {
    encode_authenticate(challenge, creds, workstation)
        .map(|bytes| to_header_value(&bytes))
}


#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    /// Builds a Challenge message; the target information security buffer and the context are only
    /// included if target information is given.
    fn challenge_bytes(flags: Flags, challenge: [u8; 8], target_name: &[u8], target_info: Option<&[u8]>) -> Vec<u8> {
        let header_len: u32 = if target_info.is_some() { 48 } else { 32 };
        let name_len = u16::try_from(target_name.len()).unwrap();

        let mut msg = message_start(MESSAGE_TYPE_CHALLENGE);
        msg.extend_from_slice(&name_len.to_le_bytes());
        msg.extend_from_slice(&name_len.to_le_bytes());
        msg.extend_from_slice(&header_len.to_le_bytes());
        msg.extend_from_slice(&flags.bits().to_le_bytes());
        msg.extend_from_slice(&challenge);
        if let Some(ti) = target_info {
            let info_len = u16::try_from(ti.len()).unwrap();
            msg.extend_from_slice(&[0; 8]);
            msg.extend_from_slice(&info_len.to_le_bytes());
            msg.extend_from_slice(&info_len.to_le_bytes());
            msg.extend_from_slice(&(header_len + u32::from(name_len)).to_le_bytes());
        }
        msg.extend_from_slice(target_name);
        if let Some(ti) = target_info {
            msg.extend_from_slice(ti);
        }
        msg
    }

    #[test]
    fn negotiate_layout() {
        let host = FixedHost::new("UNUSED", [0; 8], 0);
        let bytes = encode_negotiate_with(&host, Some("WS"), Some("DOM")).unwrap();
        assert_eq!(bytes, [
            &b"NTLMSSP\0"[..],
            &hex!("01000000")[..],
            &hex!("06820800")[..],
            &hex!("0300" "0300" "20000000")[..],
            &hex!("0200" "0200" "23000000")[..],
            &b"DOMWS"[..],
        ].concat());
    }

    #[test]
    fn negotiate_empty_fields_point_nowhere() {
        let host = FixedHost::new("", [0; 8], 0);
        let bytes = encode_negotiate_with(&host, None, None).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[16..32], &[0u8; 16]);
    }

    #[test]
    fn negotiate_workstation_defaults_to_host() {
        let host = FixedHost::new("HOSTNAME", [0; 8], 0);
        let bytes = encode_negotiate_with(&host, None, None).unwrap();
        assert_eq!(&bytes[16..24], &hex!("0000" "0000" "00000000"));
        assert_eq!(&bytes[24..32], &hex!("0800" "0800" "20000000"));
        assert_eq!(&bytes[32..], b"HOSTNAME");
    }

    #[test]
    fn decode_oem_challenge() {
        let bytes = challenge_bytes(Flags::NEGOTIATE_OEM, hex!("0102030405060708"), b"DOMAIN", None);
        let challenge = decode_challenge(&bytes).unwrap();
        assert_eq!(challenge.version(), 1);
        assert_eq!(challenge, Challenge::V1(ChallengeMessage {
            flags: Flags::NEGOTIATE_OEM,
            encoding: StringEncoding::Oem,
            challenge: hex!("0102030405060708"),
            target_name: "DOMAIN".to_owned(),
            target_info: None,
        }));
    }

    #[test]
    fn decode_unicode_challenge_with_target_info() {
        let target_info = hex!(
            "0100" "0c00" "530045005200560045005200"
            "0700" "0800" "0090d336b734c301"
            "0300" "0600" "660071006400"
            "0000" "0000"
            "0200" "0400" "78007800"
        );
        let flags = Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM2_KEY | Flags::NEGOTIATE_TARGET_INFO;
        let bytes = challenge_bytes(flags, [0x11; 8], b"D\x00O\x00M\x00", Some(&target_info[..]));

        let challenge = decode_challenge(&bytes).unwrap();
        assert_eq!(challenge.version(), 2);
        let message = challenge.message();
        assert_eq!(message.encoding, StringEncoding::Utf16Le);
        assert_eq!(message.target_name, "DOM");

        let info = message.target_info.as_ref().unwrap();
        assert_eq!(info.raw, target_info.to_vec());
        assert_eq!(info.get(TargetInfoType::Server), Some("SERVER"));
        assert_eq!(info.get(TargetInfoType::Fqdn), Some("fqd"));
        // everything after the terminator is ignored
        assert_eq!(info.get(TargetInfoType::Domain), None);
        assert_eq!(info.entries.len(), 2);
    }

    #[test]
    fn empty_target_info_is_present_but_empty() {
        let bytes = challenge_bytes(Flags::NEGOTIATE_TARGET_INFO, [0; 8], b"", Some(&[][..]));
        let challenge = decode_challenge(&bytes).unwrap();
        assert_eq!(challenge.message().target_info, Some(TargetInfo::default()));
        assert_eq!(challenge.message().target_name, "");
    }

    #[test]
    fn target_info_value_is_cut_at_block_end() {
        let info = TargetInfo::parse(&hex!("0200" "1000" "41004200"));
        assert_eq!(info.get(TargetInfoType::Domain), Some("AB"));

        let info = TargetInfo::parse(&hex!("0900" "0200" "4100" "0100"));
        assert_eq!(info.entries.len(), 0);
        assert_eq!(TargetInfoType::from(9), TargetInfoType::Unknown(9));
        assert_eq!(u16::from(TargetInfoType::ParentDns), 5);
        assert_eq!(TargetInfoType::ParentDns.name(), Some("PARENT_DNS"));
    }

    #[test]
    fn target_name_inside_header_is_rejected() {
        let mut bytes = challenge_bytes(Flags::NEGOTIATE_OEM, [0; 8], b"DOMAIN", None);
        bytes[16..20].copy_from_slice(&4u32.to_le_bytes());
        assert_eq!(
            decode_challenge(&bytes),
            Err(ParsingError::BadChallenge { field: "target name", offset: 4, length: 6, message_len: 38 }),
        );
    }

    #[test]
    fn target_name_past_end_is_rejected() {
        let mut bytes = challenge_bytes(Flags::NEGOTIATE_OEM, [0; 8], b"DOMAIN", None);
        bytes[12..14].copy_from_slice(&7u16.to_le_bytes());
        assert!(matches!(decode_challenge(&bytes), Err(ParsingError::BadChallenge { .. })));

        bytes[12..14].copy_from_slice(&6u16.to_le_bytes());
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(decode_challenge(&bytes), Err(ParsingError::BadChallenge { .. })));
    }

    #[test]
    fn target_info_past_end_is_rejected() {
        let mut bytes = challenge_bytes(Flags::NEGOTIATE_TARGET_INFO, [0; 8], b"", Some(&hex!("00000000")[..]));
        bytes[40..42].copy_from_slice(&5u16.to_le_bytes());
        assert!(matches!(
            decode_challenge(&bytes),
            Err(ParsingError::BadChallenge { field: "target info", .. })
        ));
    }

    #[test]
    fn target_info_inside_header_is_rejected() {
        let mut bytes = challenge_bytes(Flags::NEGOTIATE_TARGET_INFO, [0; 8], b"", Some(&hex!("00000000")[..]));
        bytes[44..48].copy_from_slice(&8u32.to_le_bytes());
        assert_eq!(
            decode_challenge(&bytes),
            Err(ParsingError::BadChallenge { field: "target info", offset: 8, length: 4, message_len: 52 }),
        );
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert_eq!(
            decode_challenge(&[]),
            Err(ParsingError::InvalidArgument { reason: "empty challenge message" }),
        );
        assert_eq!(
            decode_challenge(b"NTLMSSP\0\x02\x00\x00\x00"),
            Err(ParsingError::ShortMessage { expected_min_len: 32, obtained_len: 12 }),
        );

        let mut bytes = challenge_bytes(Flags::NEGOTIATE_OEM, [0; 8], b"", None);
        bytes[8] = 3;
        assert_eq!(
            decode_challenge(&bytes),
            Err(ParsingError::InvalidMessageType { expected: 2, obtained: 3 }),
        );

        bytes[8] = 2;
        bytes[0] = b'X';
        assert!(matches!(decode_challenge(&bytes), Err(ParsingError::MagicMismatch { .. })));

        // the target info flag requires the target info security buffer
        let bytes = challenge_bytes(Flags::NEGOTIATE_TARGET_INFO, [0; 8], b"", None);
        assert!(matches!(decode_challenge(&bytes), Err(ParsingError::ShortMessage { expected_min_len: 48, .. })));
    }

    #[test]
    fn header_token_extraction() {
        assert_eq!(scheme_token("NTLM abc=="), Some("abc=="));
        assert_eq!(scheme_token("Negotiate, NTLM abc==, Basic realm=\"x\""), Some("abc=="));
        assert_eq!(scheme_token("ntlm  abc==,def"), Some("abc=="));
        assert_eq!(scheme_token("NTLM"), Some(""));
        assert_eq!(scheme_token("abc=="), None);
        assert_eq!(scheme_token("Negotiate"), None);
    }

    #[test]
    fn decode_from_header_forms() {
        let bytes = challenge_bytes(Flags::NEGOTIATE_OEM, hex!("0102030405060708"), b"DOMAIN", None);
        let token = BASE64_STANDARD.encode(&bytes);
        let expected = decode_challenge(&bytes).unwrap();

        assert_eq!(decode_challenge_header(&token).unwrap(), expected);
        assert_eq!(decode_challenge_header(&format!("NTLM {}", token)).unwrap(), expected);
        assert_eq!(decode_challenge_header(&format!("Negotiate, NTLM {}", token)).unwrap(), expected);
        assert_eq!(
            decode_challenge_header("NTLM"),
            Err(ParsingError::InvalidArgument { reason: "no NTLM challenge token in header" }),
        );
        assert!(matches!(decode_challenge_header("NTLM !!!"), Err(ParsingError::InvalidBase64 { .. })));
    }

    #[test]
    fn decode_unpadded_header_token() {
        let bytes = challenge_bytes(Flags::NEGOTIATE_OEM, hex!("0102030405060708"), b"DOMAIN", None);
        let padded = BASE64_STANDARD.encode(&bytes);
        let unpadded = padded.trim_end_matches('=');
        assert_ne!(padded.len(), unpadded.len());

        let expected = decode_challenge(&bytes).unwrap();
        assert_eq!(decode_challenge_header(&format!("NTLM {}", unpadded)).unwrap(), expected);
        assert_eq!(decode_challenge_header(unpadded).unwrap(), expected);
    }

    #[test]
    fn decode_from_response_headers() {
        let bytes = challenge_bytes(Flags::NEGOTIATE_OEM, hex!("0102030405060708"), b"DOMAIN", None);
        let header_value = to_header_value(&bytes);
        let expected = decode_challenge(&bytes).unwrap();

        let mut map = HashMap::new();
        map.insert("WWW-Authenticate".to_owned(), header_value.clone());
        assert_eq!(decode_challenge_from_headers(&map).unwrap(), expected);

        let mut tree = BTreeMap::new();
        tree.insert("www-authenticate".to_owned(), header_value.clone());
        assert_eq!(decode_challenge_from_headers(&tree).unwrap(), expected);

        let pairs = vec![
            ("Content-Length", "0".to_owned()),
            ("WWW-Authenticate", "Negotiate".to_owned()),
            ("WWW-Authenticate", header_value),
        ];
        assert_eq!(decode_challenge_from_headers(&pairs).unwrap(), expected);
        assert_eq!(decode_challenge_from_headers(pairs.as_slice()).unwrap(), expected);

        let no_challenge: Vec<(&str, &str)> = vec![("Content-Length", "0")];
        assert_eq!(
            decode_challenge_from_headers(&no_challenge),
            Err(ParsingError::InvalidArgument { reason: "no WWW-Authenticate header" }),
        );
    }

    #[test]
    fn authenticate_v1_layout() {
        let bytes = challenge_bytes(Flags::NEGOTIATE_OEM, hex!("0102030405060708"), b"DOMAIN", None);
        let challenge = decode_challenge(&bytes).unwrap();
        let creds = Credentials::from_qualified_username("DOMAIN\\user", "SecREt01");
        let host = FixedHost::new("UNUSED", [0; 8], 0);

        let auth = encode_authenticate_with(&host, &challenge, &creds, Some("WS")).unwrap();
        assert_eq!(&auth[0..12], &hex!("4e544c4d53535000" "03000000"));
        assert_eq!(&auth[12..20], &hex!("1800" "1800" "34000000"));
        assert_eq!(&auth[20..28], &hex!("1800" "1800" "4c000000"));
        assert_eq!(&auth[28..36], &hex!("0600" "0600" "64000000"));
        assert_eq!(&auth[36..44], &hex!("0400" "0400" "6a000000"));
        assert_eq!(&auth[44..52], &hex!("0200" "0200" "6e000000"));
        assert_eq!(auth.len(), 112);

        let server_challenge = hex!("0102030405060708");
        assert_eq!(&auth[52..76], &responses::lm_response(server_challenge, responses::lm_hash("SecREt01")));
        assert_eq!(&auth[76..100], &responses::ntlm_response(server_challenge, responses::ntlm_hash("SecREt01")));
        assert_eq!(&auth[100..], b"DOMAINuserWS");
    }

    #[test]
    fn authenticate_v2_layout() {
        let target_info = hex!("0200" "0400" "44004f00" "0000" "0000");
        let flags = Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM2_KEY | Flags::NEGOTIATE_TARGET_INFO;
        let bytes = challenge_bytes(flags, hex!("0123456789abcdef"), b"D\x00O\x00", Some(&target_info[..]));
        let challenge = decode_challenge(&bytes).unwrap();
        let creds = Credentials::from_qualified_username("user@DO", "SecREt01");
        let host = FixedHost::with_hex_nonce("UNUSED", "ffffff0011223344", 0x01c3_34b7_36d3_9000).unwrap();

        let auth = encode_authenticate_with(&host, &challenge, &creds, None).unwrap();
        let ntlmv2_len: usize = 48 + target_info.len();
        assert_eq!(auth.len(), 64 + 24 + ntlmv2_len + 4 + 8 + 16);

        assert_eq!(&auth[12..20], &hex!("1800" "1800" "40000000"));
        assert_eq!(&auth[20..22], &u16::try_from(ntlmv2_len).unwrap().to_le_bytes());
        assert_eq!(&auth[24..28], &88u32.to_le_bytes());
        // empty workstation still points into the data block
        assert_eq!(&auth[44..48], &hex!("0000" "0000"));
        assert_eq!(&auth[48..52], &u32::try_from(88 + ntlmv2_len + 12).unwrap().to_le_bytes());
        assert_eq!(&auth[52..56], &hex!("1000" "1000"));
        assert_eq!(&auth[60..64], &flags.bits().to_le_bytes());

        let lmv2 = &auth[64..88];
        assert_eq!(&lmv2[16..], &hex!("ffffff0011223344"));
        let ntlmv2 = &auth[88..88 + ntlmv2_len];
        assert_eq!(&ntlmv2[44..44 + target_info.len()], &target_info);
        assert_eq!(&ntlmv2[24..32], &hex!("0090d336b734c301"));

        // domain "DO" and user "user" in UTF-16, then the session key
        assert_eq!(&auth[88 + ntlmv2_len..88 + ntlmv2_len + 12], b"D\x00O\x00u\x00s\x00e\x00r\x00");
        assert_eq!(&auth[auth.len() - 16..], &ntlmv2[0..16]);
    }

    #[test]
    fn authenticate_v2_without_target_info() {
        let bytes = challenge_bytes(Flags::NEGOTIATE_NTLM2_KEY, [0; 8], b"", None);
        let challenge = decode_challenge(&bytes).unwrap();
        let creds = Credentials::from_qualified_username("user", "pass");
        let host = FixedHost::new("", [1; 8], 0);

        let auth = encode_authenticate_with(&host, &challenge, &creds, None).unwrap();
        assert_eq!(&auth[20..22], &48u16.to_le_bytes());
        assert_eq!(auth.len(), 64 + 24 + 48 + 8 + 16);
    }

    #[test]
    fn qualified_usernames() {
        let creds = Credentials::from_qualified_username("DOMAIN\\user", "pw");
        assert_eq!((creds.domain.as_str(), creds.username.as_str()), ("DOMAIN", "user"));
        let creds = Credentials::from_qualified_username("user@example.com", "pw");
        assert_eq!((creds.domain.as_str(), creds.username.as_str()), ("example.com", "user"));
        let creds = Credentials::from_qualified_username("user", "pw");
        assert_eq!((creds.domain.as_str(), creds.username.as_str()), ("", "user"));
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let bytes = challenge_bytes(Flags::NEGOTIATE_OEM, [0; 8], b"", None);
        let challenge = decode_challenge(&bytes).unwrap();
        let creds = Credentials::from_qualified_username(&"u".repeat(70_000), "pw");
        let host = FixedHost::new("", [0; 8], 0);
        assert_eq!(
            encode_authenticate_with(&host, &challenge, &creds, None),
            Err(StoringError::FieldTooLong { field: "user name", length: 70_000 }),
        );
    }

    #[test]
    fn header_values() {
        let host = FixedHost::new("WS", [0; 8], 0);
        let bytes = encode_negotiate_with(&host, None, None).unwrap();
        let header = to_header_value(&bytes);
        assert!(header.starts_with("NTLM TlRMTVNTUAAB"));
        assert_eq!(BASE64_STANDARD.decode(&header[5..]).unwrap(), bytes);
    }
}
