//! Host-specific inputs to message construction.
//!
//! Building NTLM messages needs three values that do not come from the caller's credentials: the
//! name of the local workstation, a client nonce and the current time. They are obtained through
//! the [`Host`] trait so that message construction can be reproduced exactly.


use log::warn;
use rand::rngs::OsRng;

use crate::ParsingError;
use crate::responses::{get_ntlm_time, parse_nonce, random_nonce};


/// A source of host-specific values.
pub trait Host {
    /// The NT hostname of the client, used when the caller does not supply a workstation name.
    fn workstation_name(&self) -> String;

    /// A fresh 8-byte client nonce for NTLMv2 responses.
    fn client_nonce(&self) -> [u8; 8];

    /// The current time as an NTLM timestamp (tenths of a microsecond since 1601-01-01).
    fn ntlm_time(&self) -> u64;
}


/// The running system: its hostname, the operating system's random number generator and the
/// system clock.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct SystemHost;
impl Host for SystemHost {
    fn workstation_name(&self) -> String {
        match whoami::fallible::hostname() {
            Ok(hostname) => hostname,
            Err(e) => {
                warn!("failed to obtain local hostname, sending none: {}", e);
                String::new()
            },
        }
    }

    fn client_nonce(&self) -> [u8; 8] {
        let hex_nonce = random_nonce(&mut OsRng, 16);
        parse_nonce(&hex_nonce)
            .expect("random_nonce yields 16 hexadecimal digits")
    }

    fn ntlm_time(&self) -> u64 {
        get_ntlm_time()
    }
}


/// A host returning the same values every time.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FixedHost {
    /// The workstation name.
    pub workstation: String,

    /// The client nonce.
    pub nonce: [u8; 8],

    /// The NTLM timestamp.
    pub time: u64,
}
impl FixedHost {
    pub fn new(workstation: &str, nonce: [u8; 8], time: u64) -> Self {
        Self {
            workstation: workstation.to_owned(),
            nonce,
            time,
        }
    }

    /// Creates a fixed host whose nonce is given as 16 hexadecimal digits.
    pub fn with_hex_nonce(workstation: &str, hex_nonce: &str, time: u64) -> Result<Self, ParsingError> {
        let nonce = parse_nonce(hex_nonce)?;
        Ok(Self::new(workstation, nonce, time))
    }
}
impl Host for FixedHost {
    fn workstation_name(&self) -> String {
        self.workstation.clone()
    }

    fn client_nonce(&self) -> [u8; 8] {
        self.nonce
    }

    fn ntlm_time(&self) -> u64 {
        self.time
    }
}
