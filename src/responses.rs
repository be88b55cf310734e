//! Password hashes and challenge responses.
//!
//! The functions in this module are pure: they neither validate their inputs nor fail. Fixed-size
//! inputs are passed as arrays so that a wrongly sized challenge or hash cannot be supplied in the
//! first place.


use chrono::{DateTime, Utc};
use cipher::{BlockEncrypt, KeyInit};
use cipher::generic_array::GenericArray;
use cipher::generic_array::typenum::U8;
use des::Des;
use digest::Digest;
use hmac::{Hmac, Mac};
use log::warn;
use md4::Md4;
use md5::Md5;
use rand::RngCore;

use crate::{Credentials, ParsingError};
use crate::encoding::{rust_string_to_oem, rust_string_to_utf16_le};


/// The plaintext encrypted with both halves of the password to obtain the LM hash.
const LM_MAGIC: [u8; 8] = *b"KGS!@#$%";

/// Passwords longer than this many characters have no LM hash.
const LM_PASSWORD_MAX_LEN: usize = 14;

/// Milliseconds between 1601-01-01 (NT epoch) and 1970-01-01 (Unix epoch).
const NT_EPOCH_OFFSET_MILLIS: i64 = 11_644_473_600_000;

/// Response type and highest response type understood, followed by two reserved bytes.
const NTLMV2_BLOB_SIGNATURE: [u8; 4] = [0x01, 0x01, 0x00, 0x00];


/// The response to an NTLM challenge.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChallengeResponse {
    /// The LM (NTLMv1) or LMv2 (NTLMv2) response.
    pub lm_response: Vec<u8>,

    /// The NTLM (NTLMv1) or NTLMv2 response.
    pub ntlm_response: Vec<u8>,

    /// The session key; only NTLMv2 responses carry one.
    pub session_key: Option<[u8; 16]>,
}

/// The NTLMv2 response blob along with the session key derived while computing it.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Ntlmv2Response {
    /// The full response: 16 bytes of HMAC followed by the client blob.
    pub response: Vec<u8>,

    /// The 16-byte HMAC value which also starts `response`.
    pub session_key: [u8; 16],
}


/// Computes HMAC-MD5 over the concatenation of `parts`.
fn hmac_md5(key: &[u8; 16], parts: &[&[u8]]) -> [u8; 16] {
    let mut hmac_md5 = <Hmac<Md5> as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    for part in parts {
        hmac_md5.update(part);
    }

    let mut ret = [0; 16];
    ret.copy_from_slice(hmac_md5.finalize().into_bytes().as_slice());
    ret
}


/// Expands 56 bits of key material into a 64-bit DES key.
///
/// The seven input bytes are spread across eight output bytes, seven bits each; the lowest bit of
/// every output byte is then set such that the byte has odd parity.
pub fn des_key_from_7_bytes(key7: [u8; 7]) -> [u8; 8] {
    let mut key8 = [0u8; 8];
    key8[0] = key7[0];
    for i in 1..7 {
        key8[i] = (key7[i - 1] << (8 - i)) | (key7[i] >> i);
    }
    key8[7] = key7[6] << 1;

    for b in key8.iter_mut() {
        *b &= 0xFE;
        if (*b >> 1).count_ones() % 2 == 0 {
            *b |= 0x01;
        }
    }
    key8
}


/// Encrypts a single block using DES-ECB with the key expanded from seven bytes.
fn des_encrypt_block(key7: [u8; 7], block: [u8; 8]) -> [u8; 8] {
    let des_state = Des::new(&GenericArray::from(des_key_from_7_bytes(key7)));
    let mut buf: GenericArray<u8, U8> = GenericArray::from(block);
    des_state.encrypt_block(&mut buf);

    let mut ret = [0u8; 8];
    ret.copy_from_slice(buf.as_slice());
    ret
}


/// Splits the first seven bytes off a slice.
fn seven_bytes(bytes: &[u8]) -> [u8; 7] {
    let mut ret = [0u8; 7];
    ret.copy_from_slice(&bytes[0..7]);
    ret
}


/// Performs the NTLMv1 DES encryption to calculate the response value to the challenge.
///
/// The 16-byte key is zero-extended to 21 bytes and cut into three DES keys, each of which
/// encrypts `data`.
pub fn des_long(key: [u8; 16], data: [u8; 8]) -> [u8; 24] {
    let mut key21 = [0u8; 21];
    key21[0..16].copy_from_slice(&key);

    let mut ret = [0u8; 24];
    for (chunk, out) in key21.chunks_exact(7).zip(ret.chunks_exact_mut(8)) {
        out.copy_from_slice(&des_encrypt_block(seven_bytes(chunk), data));
    }
    ret
}


/// Derives the LM hash from a password.
///
/// The LM scheme consists of the following:
///
/// ```plain
///            ┌────────────┐  ┌───────────────┐  ┌─────────────┐
/// password ──┤ convert to ├──┤ encode using  ├──┤ truncate or ├──┐
///            │ uppercase  │  │ OEM charset   │  │ pad to 14 B │  │
///            └────────────┘  └───────────────┘  └─────────────┘  │
///           ┌────────────────────────────────────────────────────┘
///           │┌───────┐
///           └┤ split │           "KGS!@#$%"
///            └─┬───┬─┘               │ input
///         0..7 │   │ 7..14    key ┌──┴──┐ output
///              │   └──────────────┤ DES ├────────────┐
///              │                  └─────┘            │ 0..8
///              │                                  ┌──┴───┐
///              │                 "KGS!@#$%"       │ join ├──── hash
///              │                     │ input      └──┬───┘
///              │              key ┌──┴──┐ output     │ 8..16
///              └──────────────────┤ DES ├────────────┘
///                                 └─────┘
/// ```
///
/// Passwords longer than 14 characters have no LM hash; sixteen zero bytes are returned instead.
pub fn lm_hash(password: &str) -> [u8; 16] {
    if password.encode_utf16().count() > LM_PASSWORD_MAX_LEN {
        warn!("password exceeds {} characters; using an all-zero LM hash", LM_PASSWORD_MAX_LEN);
        return [0; 16];
    }

    let mut password_bytes = rust_string_to_oem(&password.to_uppercase());
    password_bytes.resize(LM_PASSWORD_MAX_LEN, 0x00);

    let mut output = [0; 16];
    let (half0, half1) = output.split_at_mut(8);
    half0.copy_from_slice(&des_encrypt_block(seven_bytes(&password_bytes[0..7]), LM_MAGIC));
    half1.copy_from_slice(&des_encrypt_block(seven_bytes(&password_bytes[7..14]), LM_MAGIC));
    output
}


/// Derives the NTLM hash from a password.
///
/// The password is encoded as UTF-16 in little-endian byte order (without the Byte Order Mark) and
/// hashed using MD4.
pub fn ntlm_hash(password: &str) -> [u8; 16] {
    let mut md4_state = <Md4 as Digest>::new();
    md4_state.update(rust_string_to_utf16_le(password));

    let mut ret = [0; 16];
    ret.copy_from_slice(md4_state.finalize().as_slice());
    ret
}


/// Derives the NTLMv2 hash from the NTLM hash and the identity of the user.
///
/// HMAC-MD5 keyed with the NTLM hash over the uppercase username followed by the unchanged-case
/// target name, each encoded as UTF-16 in little-endian byte order.
pub fn ntlmv2_hash(ntlm_hash: &[u8; 16], username: &str, target_name: &str) -> [u8; 16] {
    let upper_user_bytes = rust_string_to_utf16_le(&username.to_uppercase());
    let target_bytes = rust_string_to_utf16_le(target_name);
    hmac_md5(ntlm_hash, &[&upper_user_bytes[..], &target_bytes[..]])
}


/// Calculates the LM response to a server challenge.
pub fn lm_response(server_challenge: [u8; 8], lm_hash: [u8; 16]) -> [u8; 24] {
    des_long(lm_hash, server_challenge)
}


/// Calculates the NTLM response to a server challenge.
pub fn ntlm_response(server_challenge: [u8; 8], ntlm_hash: [u8; 16]) -> [u8; 24] {
    des_long(ntlm_hash, server_challenge)
}


/// Calculates the LMv2 response to a server challenge.
///
/// The response is the HMAC of server challenge and client nonce followed by the client nonce.
pub fn lmv2_response(server_challenge: [u8; 8], ntlmv2_hash: &[u8; 16], client_nonce: [u8; 8]) -> [u8; 24] {
    let mac = hmac_md5(ntlmv2_hash, &[&server_challenge[..], &client_nonce[..]]);

    let mut ret = [0u8; 24];
    ret[0..16].copy_from_slice(&mac);
    ret[16..24].copy_from_slice(&client_nonce);
    ret
}


/// Calculates the NTLMv2 response to a server challenge.
///
/// The client blob contains the timestamp, the client nonce and the target information block of
/// the Challenge message, which is embedded verbatim. The response is the HMAC of server challenge
/// and blob, followed by the blob; its length is always `48 + target_info.len()`.
pub fn ntlmv2_response(
    server_challenge: [u8; 8],
    ntlmv2_hash: &[u8; 16],
    client_nonce: [u8; 8],
    target_info: &[u8],
    timestamp: u64,
) -> Ntlmv2Response {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&NTLMV2_BLOB_SIGNATURE);
    blob.extend_from_slice(&[0x00; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(&client_nonce);
    blob.extend_from_slice(&[0x00; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0x00; 4]);

    let session_key = hmac_md5(ntlmv2_hash, &[&server_challenge[..], &blob[..]]);

    let mut response = Vec::with_capacity(16 + blob.len());
    response.extend_from_slice(&session_key);
    response.extend_from_slice(&blob);

    Ntlmv2Response {
        response,
        session_key,
    }
}


/// Converts a point in time into an NTLM timestamp.
///
/// NTLM timestamps count tenths of a microsecond since 1601-01-01; the value is derived from
/// millisecond precision. Times before 1601 are clamped to zero.
pub fn ntlm_time(time: DateTime<Utc>) -> u64 {
    let nt_millis = time.timestamp_millis().saturating_add(NT_EPOCH_OFFSET_MILLIS);
    u64::try_from(nt_millis)
        .unwrap_or(0)
        .saturating_mul(10_000)
}


/// Obtains the current NTLM timestamp.
pub fn get_ntlm_time() -> u64 {
    ntlm_time(Utc::now())
}


/// Generates a nonce of `hex_digits` lowercase hexadecimal digits.
///
/// The randomness is only as good as `rng`; callers who need specific nonces should supply them
/// directly instead.
pub fn random_nonce<R: RngCore + ?Sized>(rng: &mut R, hex_digits: usize) -> String {
    let mut bytes = vec![0u8; (hex_digits + 1) / 2];
    rng.fill_bytes(&mut bytes);

    let mut nonce = hex::encode(bytes);
    nonce.truncate(hex_digits);
    nonce
}


/// Parses a client nonce given as 16 hexadecimal digits.
pub fn parse_nonce(hex_nonce: &str) -> Result<[u8; 8], ParsingError> {
    let mut nonce = [0u8; 8];
    hex::decode_to_slice(hex_nonce, &mut nonce)
        .or(Err(ParsingError::InvalidNonce { value: hex_nonce.to_owned() }))?;
    Ok(nonce)
}


/// Calculates an NTLMv1 response to the given server challenge.
///
/// An LM response is also included.
pub fn respond_challenge_ntlm_v1(server_challenge: [u8; 8], creds: &Credentials) -> ChallengeResponse {
    let lm_response = lm_response(server_challenge, lm_hash(&creds.password));
    let ntlm_response = ntlm_response(server_challenge, ntlm_hash(&creds.password));

    ChallengeResponse {
        lm_response: Vec::from(lm_response),
        ntlm_response: Vec::from(ntlm_response),
        session_key: None,
    }
}


/// Calculates an NTLMv2 response to the given server challenge, including target info and time
/// value to protect against replay attacks.
///
/// The same client nonce enters both the LMv2 and the NTLMv2 response.
pub fn respond_challenge_ntlm_v2(
    server_challenge: [u8; 8],
    target_info: &[u8],
    time: u64,
    client_nonce: [u8; 8],
    creds: &Credentials,
) -> ChallengeResponse {
    let ntlmv2_key = ntlmv2_hash(&ntlm_hash(&creds.password), &creds.username, &creds.domain);

    let lm_response = lmv2_response(server_challenge, &ntlmv2_key, client_nonce);
    let ntlmv2 = ntlmv2_response(server_challenge, &ntlmv2_key, client_nonce, target_info, time);

    ChallengeResponse {
        lm_response: Vec::from(lm_response),
        ntlm_response: ntlmv2.response,
        session_key: Some(ntlmv2.session_key),
    }
}
