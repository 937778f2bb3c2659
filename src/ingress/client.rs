use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

use super::protocol::{ACK, ERROR_PREFIX, FileHeader, ProtocolError, SUCCESS, validate_file_name};

const REPLY_LIMIT: u64 = 4096;

/// Push a local file to a relay's network receiver
///
/// Sends the header, waits for `ACK`, streams the payload and returns once
/// the receiver answers `SUCCESS`. An `ERROR: ...` reply becomes
/// [`ProtocolError::Rejected`].
pub async fn push_file(addr: SocketAddr, path: &Path, timeout: Duration) -> Result<u64, ProtocolError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ProtocolError::InvalidFileName(path.display().to_string()))?;
    validate_file_name(file_name)?;

    let mut file = File::open(path).await?;
    let file_size = file.metadata().await?.len();
    let header = FileHeader {
        file_name: file_name.to_string(),
        file_size,
    };

    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProtocolError::IdleTimeout(timeout))??;

    let header_bytes = serde_json::to_vec(&header).map_err(|e| ProtocolError::MalformedHeader(e.to_string()))?;
    stream.write_all(&header_bytes).await?;

    let first = read_reply(&mut stream, ACK.len(), timeout).await?;
    if first != ACK {
        return Err(classify(first, &mut stream, timeout).await);
    }

    tokio::io::copy(&mut file, &mut stream).await?;
    stream.flush().await?;

    let last = read_reply(&mut stream, REPLY_LIMIT as usize, timeout).await?;
    if last == SUCCESS {
        info!(file = %file_name, size = file_size, %addr, "File pushed");
        Ok(file_size)
    } else {
        Err(classify(last, &mut stream, timeout).await)
    }
}

/// Read until `want` bytes or EOF
async fn read_reply(stream: &mut TcpStream, want: usize, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
    let mut reply = Vec::with_capacity(want.min(64));
    let mut buf = [0u8; 256];
    while reply.len() < want {
        let n = tokio::time::timeout(timeout, stream.read(&mut buf))
            .await
            .map_err(|_| ProtocolError::IdleTimeout(timeout))??;
        if n == 0 {
            break;
        }
        reply.extend_from_slice(&buf[..n]);
        if reply.as_slice() == SUCCESS {
            break;
        }
    }
    Ok(reply)
}

async fn classify(mut reply: Vec<u8>, stream: &mut TcpStream, timeout: Duration) -> ProtocolError {
    // An error reply may be longer than what was read so far
    let mut rest = Vec::new();
    let _ = tokio::time::timeout(timeout, (&mut *stream).take(REPLY_LIMIT).read_to_end(&mut rest)).await;
    reply.extend_from_slice(&rest);

    let text = String::from_utf8_lossy(&reply).into_owned();
    match text.strip_prefix(ERROR_PREFIX) {
        Some(message) => ProtocolError::Rejected(message.to_string()),
        None => ProtocolError::UnexpectedReply(text),
    }
}
