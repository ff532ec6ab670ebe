//! MySQL client/server wire-protocol primitives.
//!
//! Packets are framed as a 3-byte little-endian payload length plus a
//! 1-byte sequence id. The greeting is the protocol-10 layout; integers
//! inside payloads use the length-encoded scheme.

use sha1::{Digest, Sha1};
use thiserror::Error;

pub const NATIVE_PASSWORD_PLUGIN: &str = "mysql_native_password";

/// Client capability flags sent in the handshake response.
pub const CLIENT_LONG_PASSWORD: u32 = 0x0000_0001;
pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
pub const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
pub const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;

pub const MAX_PACKET_SIZE: u32 = 1024;
pub const CHARSET_UTF8: u8 = 0x21;

pub const COM_QUIT: u8 = 0x01;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("truncated packet: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unsupported protocol version {0}")]
    UnsupportedProtocol(u8),

    #[error("malformed greeting: {0}")]
    MalformedGreeting(&'static str),

    #[error("invalid length-encoded integer prefix 0x{0:02x}")]
    InvalidLenc(u8),
}

/// Render the 4-byte packet header.
pub fn packet_header(len: usize, sequence: u8) -> [u8; 4] {
    let len = len as u32;
    [
        (len & 0xff) as u8,
        ((len >> 8) & 0xff) as u8,
        ((len >> 16) & 0xff) as u8,
        sequence,
    ]
}

/// Split a packet header into payload length and sequence id.
pub fn parse_packet_header(header: [u8; 4]) -> (usize, u8) {
    let len = header[0] as usize | (header[1] as usize) << 8 | (header[2] as usize) << 16;
    (len, header[3])
}

/// Decode a length-encoded integer starting at `offset`. Returns the value
/// and the offset of the first byte after it. The 0xfb (NULL) and 0xff
/// prefixes are not integers and are rejected.
pub fn read_lenc(buf: &[u8], offset: usize) -> Result<(u64, usize), ProtocolError> {
    let first = *buf.get(offset).ok_or(ProtocolError::Truncated {
        need: offset + 1,
        have: buf.len(),
    })?;
    let width = match first {
        0x00..=0xfa => return Ok((u64::from(first), offset + 1)),
        0xfc => 2,
        0xfd => 3,
        0xfe => 8,
        other => return Err(ProtocolError::InvalidLenc(other)),
    };
    let start = offset + 1;
    let end = start + width;
    let bytes = buf.get(start..end).ok_or(ProtocolError::Truncated {
        need: end,
        have: buf.len(),
    })?;
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate() {
        value |= u64::from(*byte) << (8 * i);
    }
    Ok((value, end))
}

/// Fields of the protocol-10 server greeting the probe cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub protocol: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// Full scramble nonce: the 8-byte first chunk plus the second chunk
    /// with its trailing NUL stripped.
    pub auth_data: Vec<u8>,
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin: Option<String>,
}

/// Parse a protocol-10 greeting payload.
pub fn parse_greeting(payload: &[u8]) -> Result<Greeting, ProtocolError> {
    let protocol = *payload.first().ok_or(ProtocolError::Truncated { need: 1, have: 0 })?;
    if protocol != 10 {
        return Err(ProtocolError::UnsupportedProtocol(protocol));
    }
    let nul = payload[1..]
        .iter()
        .position(|b| *b == 0)
        .ok_or(ProtocolError::MalformedGreeting("unterminated server version"))?;
    let server_version = String::from_utf8_lossy(&payload[1..1 + nul]).into_owned();
    let mut pos = 2 + nul;

    // connection id (4), first scramble chunk (8), filler (1),
    // capability flags low (2).
    let fixed = payload.get(pos..pos + 15).ok_or(ProtocolError::Truncated {
        need: pos + 15,
        have: payload.len(),
    })?;
    let connection_id = u32::from_le_bytes([fixed[0], fixed[1], fixed[2], fixed[3]]);
    let mut auth_data = fixed[4..12].to_vec();
    let mut capabilities = u32::from(u16::from_le_bytes([fixed[13], fixed[14]]));
    pos += 15;

    let mut charset = 0;
    let mut status_flags = 0;
    let mut auth_plugin = None;
    if payload.len() > pos {
        // charset (1), status flags (2), capability flags high (2),
        // scramble length (1), reserved (10).
        let tail = payload.get(pos..pos + 16).ok_or(ProtocolError::Truncated {
            need: pos + 16,
            have: payload.len(),
        })?;
        charset = tail[0];
        status_flags = u16::from_le_bytes([tail[1], tail[2]]);
        capabilities |= u32::from(u16::from_le_bytes([tail[3], tail[4]])) << 16;
        let scramble_len = tail[5] as usize;
        pos += 16;

        let second_len = 13.max(scramble_len.saturating_sub(8));
        let second = payload.get(pos..pos + second_len).ok_or(ProtocolError::Truncated {
            need: pos + second_len,
            have: payload.len(),
        })?;
        // The second chunk is NUL-terminated inside its field.
        let chunk = match second.iter().position(|b| *b == 0) {
            Some(i) => &second[..i],
            None => second,
        };
        auth_data.extend_from_slice(chunk);
        pos += second_len;

        if capabilities & CLIENT_PLUGIN_AUTH != 0 {
            let name = payload.get(pos..).unwrap_or_default();
            let name = match name.iter().position(|b| *b == 0) {
                Some(i) => &name[..i],
                None => name,
            };
            auth_plugin = Some(String::from_utf8_lossy(name).into_owned());
        }
    }

    Ok(Greeting {
        protocol,
        server_version,
        connection_id,
        auth_data,
        capabilities,
        charset,
        status_flags,
        auth_plugin,
    })
}

/// mysql_native_password scramble:
/// `SHA1(password) XOR SHA1(nonce + SHA1(SHA1(password)))`.
pub fn scramble_native_password(nonce: &[u8], password: &str) -> [u8; 20] {
    let hashed = Sha1::digest(password.as_bytes());
    let double_hashed = Sha1::digest(hashed);
    let mut salted = Sha1::new();
    salted.update(nonce);
    salted.update(double_hashed);
    let salted = salted.finalize();
    let mut out = [0u8; 20];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = hashed[i] ^ salted[i];
    }
    out
}

/// Server reply to the handshake response, classified by its first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerResponse {
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
        status_flags: u16,
        warnings: u16,
        info: String,
    },
    Eof {
        warnings: u16,
        status_flags: u16,
    },
    Err {
        code: u16,
        sql_state: Option<String>,
        message: String,
    },
    Unknown {
        header: u8,
    },
}

impl ServerResponse {
    /// Whether this reply admits the probe. Headers above 0xf0 that are not
    /// a well-formed OK are refusals; anything below is treated as fine.
    pub fn is_ok(&self) -> bool {
        match self {
            ServerResponse::Ok { .. } => true,
            ServerResponse::Eof { .. } | ServerResponse::Err { .. } => false,
            ServerResponse::Unknown { header } => *header <= 0xf0,
        }
    }

    /// Operator-facing description used in probe messages.
    pub fn describe(&self) -> String {
        match self {
            ServerResponse::Ok { .. } => "OK".to_string(),
            ServerResponse::Eof { .. } => "EOF".to_string(),
            ServerResponse::Err {
                code,
                sql_state: Some(state),
                message,
            } => format!("error {code} ({state}): {message}"),
            ServerResponse::Err {
                code,
                sql_state: None,
                message,
            } => format!("error {code}: {message}"),
            ServerResponse::Unknown { header } => format!("unexpected packet 0x{header:02x}"),
        }
    }
}

/// Classify and parse a response payload.
pub fn parse_response(payload: &[u8]) -> Result<ServerResponse, ProtocolError> {
    let header = *payload.first().ok_or(ProtocolError::Truncated { need: 1, have: 0 })?;
    match header {
        0x00 => {
            let (affected_rows, pos) = read_lenc(payload, 1)?;
            let (last_insert_id, pos) = read_lenc(payload, pos)?;
            let flags = payload.get(pos..pos + 4).ok_or(ProtocolError::Truncated {
                need: pos + 4,
                have: payload.len(),
            })?;
            let status_flags = u16::from_le_bytes([flags[0], flags[1]]);
            let warnings = u16::from_le_bytes([flags[2], flags[3]]);
            let info = String::from_utf8_lossy(&payload[pos + 4..]).into_owned();
            Ok(ServerResponse::Ok {
                affected_rows,
                last_insert_id,
                status_flags,
                warnings,
                info,
            })
        }
        // A short 0xfe packet is EOF; longer ones (auth switch requests,
        // row data) are not something the probe understands.
        0xfe if payload.len() < 9 => {
            let warnings = payload
                .get(1..3)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .unwrap_or(0);
            let status_flags = payload
                .get(3..5)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .unwrap_or(0);
            Ok(ServerResponse::Eof {
                warnings,
                status_flags,
            })
        }
        0xff => {
            let code_bytes = payload.get(1..3).ok_or(ProtocolError::Truncated {
                need: 3,
                have: payload.len(),
            })?;
            let code = u16::from_le_bytes([code_bytes[0], code_bytes[1]]);
            let (sql_state, message_start) = if payload.get(3) == Some(&b'#') {
                let state = payload.get(4..9).ok_or(ProtocolError::Truncated {
                    need: 9,
                    have: payload.len(),
                })?;
                (Some(String::from_utf8_lossy(state).into_owned()), 9)
            } else {
                (None, 3)
            };
            let message = String::from_utf8_lossy(&payload[message_start.min(payload.len())..]).into_owned();
            Ok(ServerResponse::Err {
                code,
                sql_state,
                message,
            })
        }
        other => Ok(ServerResponse::Unknown { header: other }),
    }
}
