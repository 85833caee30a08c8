use std::{fmt, io};

use crate::{Deserialize, Serialize};

const DUMP_REQUEST: u8 = 0b0000_0001;
const DUMP_RESPONSE: u8 = 0b0000_0011;

/// The command carried by a `Signal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Asks every member to deposit a snapshot of its local model.
    DumpRequest,
    /// Acknowledges that a member finished handling a `DumpRequest`.
    DumpResponse,
}

impl SignalKind {
    /// Returns the command byte used on the wire.
    pub fn byte(self) -> u8 {
        match self {
            SignalKind::DumpRequest => DUMP_REQUEST,
            SignalKind::DumpResponse => DUMP_RESPONSE,
        }
    }
}

impl TryFrom<u8> for SignalKind {
    type Error = io::Error;

    fn try_from(byte: u8) -> io::Result<Self> {
        match byte {
            DUMP_REQUEST => Ok(SignalKind::DumpRequest),
            DUMP_RESPONSE => Ok(SignalKind::DumpResponse),
            byte => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Received an invalid command byte {byte:#04x}"),
            )),
        }
    }
}

/// A cluster signal, one command byte followed by the UTF-8 domain it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal<'a> {
    pub kind: SignalKind,
    pub domain: &'a str,
}

impl<'a> Signal<'a> {
    /// Creates a new `DumpRequest` signal.
    ///
    /// # Arguments
    /// * `domain` - The domain whose snapshots are requested.
    pub fn dump_request(domain: &'a str) -> Self {
        Self {
            kind: SignalKind::DumpRequest,
            domain,
        }
    }

    /// Creates a new `DumpResponse` signal.
    ///
    /// # Arguments
    /// * `domain` - The domain whose snapshot was handled.
    pub fn dump_response(domain: &'a str) -> Self {
        Self {
            kind: SignalKind::DumpResponse,
            domain,
        }
    }
}

impl fmt::Display for Signal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.domain)
    }
}

impl<'a> Serialize<'a> for Signal<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        buf.push(self.kind.byte());
        Some(self.domain.as_bytes())
    }
}

impl<'a> Deserialize<'a> for Signal<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        let Some((&byte, rest)) = buf.split_first() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Received an empty signal frame",
            ));
        };

        let kind = SignalKind::try_from(byte)?;
        let domain = std::str::from_utf8(rest)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        Ok(Self { kind, domain })
    }
}
