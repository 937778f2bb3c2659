//! Length-delimited TCP push protocol
//!
//! ```text
//! client -> {"file_name": "a.bin", "file_size": 5}
//! server -> ACK
//! client -> <exactly file_size raw bytes>
//! server -> SUCCESS | ERROR: <message>
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const ACK: &[u8] = b"ACK";
pub const SUCCESS: &[u8] = b"SUCCESS";
pub const ERROR_PREFIX: &str = "ERROR: ";

const READ_CHUNK: usize = 512;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("header exceeds {0} bytes")]
    HeaderTooLarge(usize),

    #[error("connection closed before header was complete")]
    IncompleteHeader,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("file_size must be a non-negative integer")]
    InvalidFileSize,

    #[error("invalid file_name '{0}'")]
    InvalidFileName(String),

    #[error("file_size {size} exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("received {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("no data for {0:?}")]
    IdleTimeout(Duration),

    #[error("relay rejected file: {0}")]
    Rejected(String),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// First message of every connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub file_name: String,
    pub file_size: u64,
}

impl FileHeader {
    /// Validate a decoded header document
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::MalformedHeader("expected a JSON object".into()))?;

        let file_name = object
            .get("file_name")
            .ok_or(ProtocolError::MissingField("file_name"))?
            .as_str()
            .ok_or_else(|| ProtocolError::MalformedHeader("file_name must be a string".into()))?;

        let file_size = object
            .get("file_size")
            .ok_or(ProtocolError::MissingField("file_size"))?
            .as_u64()
            .ok_or(ProtocolError::InvalidFileSize)?;

        validate_file_name(file_name)?;

        Ok(Self {
            file_name: file_name.to_string(),
            file_size,
        })
    }
}

/// A pushed file name must be one plain, visible path component
pub fn validate_file_name(name: &str) -> Result<(), ProtocolError> {
    let invalid = || ProtocolError::InvalidFileName(name.to_string());

    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Read one JSON header from `reader`
///
/// Bytes are consumed in small chunks until a complete JSON value has been
/// seen. The header itself must fit in `max_bytes`, and no more than
/// `max_bytes + 1` bytes are ever buffered. Anything read past the end of
/// the header is returned as the start of the payload.
pub async fn read_header<R>(
    reader: &mut R,
    max_bytes: usize,
    idle: Duration,
) -> Result<(FileHeader, Vec<u8>), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        // One byte past the bound is enough to tell an oversized header apart
        let room = (max_bytes.saturating_add(1) - buf.len()).min(READ_CHUNK);
        let n = read_with_idle(reader, &mut chunk[..room], idle).await?;
        if n == 0 {
            return Err(ProtocolError::IncompleteHeader);
        }
        buf.extend_from_slice(&chunk[..n]);

        let window = &buf[..buf.len().min(max_bytes)];
        if let Some((value, consumed)) = try_decode(window)? {
            let header = FileHeader::from_value(&value)?;
            return Ok((header, buf.split_off(consumed)));
        }
        if buf.len() > max_bytes {
            return Err(ProtocolError::HeaderTooLarge(max_bytes));
        }
    }
}

/// `Ok(None)` while the buffer holds only a prefix of a JSON value
fn try_decode(buf: &[u8]) -> Result<Option<(Value, usize)>, ProtocolError> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok(Some((value, stream.byte_offset()))),
        Some(Err(e)) if e.is_eof() => Ok(None),
        Some(Err(e)) => Err(ProtocolError::MalformedHeader(e.to_string())),
        None => Ok(None),
    }
}

pub(crate) async fn read_with_idle<R>(reader: &mut R, buf: &mut [u8], idle: Duration) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(idle, reader.read(buf)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProtocolError::IdleTimeout(idle)),
    }
}

pub fn error_reply(err: &ProtocolError) -> Vec<u8> {
    format!("{ERROR_PREFIX}{err}").into_bytes()
}
