//! Minimal async client for the MySQL handshake probe.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use thiserror::Error;

use crate::mysql::protocol::{
    self, Greeting, ProtocolError, ServerResponse, CHARSET_UTF8, CLIENT_LONG_PASSWORD,
    CLIENT_PLUGIN_AUTH, CLIENT_PROTOCOL_41, CLIENT_SECURE_CONNECTION, COM_QUIT, MAX_PACKET_SIZE,
    NATIVE_PASSWORD_PLUGIN,
};

/// Upper bound on a single packet read; a greeting or auth result is tiny.
const MAX_READ_BYTES: usize = 64 * 1024;

/// Failure modes of one probe connection.
#[derive(Debug, Error)]
pub enum MySqlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("oversized packet: {0} bytes")]
    Oversized(usize),
}

/// One handshake-probe connection. Tracks the packet sequence id across
/// the exchange: replies carry the server's sequence plus one, and the
/// quit exchange restarts at zero.
pub struct MySqlConnection {
    stream: TcpStream,
    sequence: u8,
}

impl MySqlConnection {
    pub async fn connect(host: &str, port: u16) -> Result<Self, MySqlError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            stream,
            sequence: 0,
        })
    }

    /// Read and parse the server greeting.
    pub async fn read_greeting(&mut self) -> Result<Greeting, MySqlError> {
        let payload = self.read_packet().await?;
        Ok(protocol::parse_greeting(&payload)?)
    }

    /// Send the HandshakeResponse41 and return the server's verdict.
    pub async fn authenticate(
        &mut self,
        greeting: &Greeting,
        username: &str,
        password: &str,
    ) -> Result<ServerResponse, MySqlError> {
        let payload = build_handshake_response(greeting, username, password);
        self.write_packet(&payload).await?;
        let reply = self.read_packet().await?;
        Ok(protocol::parse_response(&reply)?)
    }

    /// Send COM_QUIT and drop the connection.
    pub async fn quit(mut self) -> Result<(), MySqlError> {
        self.sequence = 0;
        self.write_packet(&[COM_QUIT]).await?;
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Vec<u8>, MySqlError> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).await?;
        let (len, sequence) = protocol::parse_packet_header(header);
        if len > MAX_READ_BYTES {
            return Err(MySqlError::Oversized(len));
        }
        self.sequence = sequence.wrapping_add(1);
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(payload)
    }

    async fn write_packet(&mut self, payload: &[u8]) -> Result<(), MySqlError> {
        let header = protocol::packet_header(payload.len(), self.sequence);
        self.stream.write_all(&header).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(())
    }
}

/// Build the HandshakeResponse41 payload for the native-password plugin.
fn build_handshake_response(greeting: &Greeting, username: &str, password: &str) -> Vec<u8> {
    let capabilities =
        CLIENT_LONG_PASSWORD | CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_PLUGIN_AUTH;
    let mut payload = Vec::with_capacity(64 + username.len());
    payload.extend_from_slice(&capabilities.to_le_bytes());
    payload.extend_from_slice(&MAX_PACKET_SIZE.to_le_bytes());
    payload.push(CHARSET_UTF8);
    payload.extend_from_slice(&[0u8; 23]);
    payload.extend_from_slice(username.as_bytes());
    payload.push(0);
    if password.is_empty() {
        payload.push(0);
    } else {
        let scramble = protocol::scramble_native_password(&greeting.auth_data, password);
        payload.push(scramble.len() as u8);
        payload.extend_from_slice(&scramble);
    }
    payload.extend_from_slice(NATIVE_PASSWORD_PLUGIN.as_bytes());
    payload.push(0);
    payload
}
