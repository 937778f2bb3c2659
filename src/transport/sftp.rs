use async_trait::async_trait;
use ssh2::{Session, Sftp};
use std::fs::File;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::{SendOptions, TransferError, Transport, remote_file_name};
use crate::routing::Destination;

const COPY_BUFFER_BYTES: usize = 64 * 1024;
const REMOTE_DIR_MODE: i32 = 0o755;

/// SFTP over SSH (password authentication) using `ssh2`
///
/// `ssh2` is blocking, so each transfer runs on tokio's blocking pool. The
/// session carries a per-operation timeout and the whole transfer is also
/// bounded by [`SendOptions::timeout`].
#[derive(Debug, Clone, Default)]
pub struct SftpTransport;

impl SftpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for SftpTransport {
    async fn send(
        &self,
        local: &Path,
        destination: &Destination,
        options: &SendOptions,
    ) -> Result<String, TransferError> {
        let local = local.to_path_buf();
        let destination = destination.clone();
        let options = *options;

        let upload = tokio::task::spawn_blocking(move || upload_blocking(&local, &destination, &options));

        match tokio::time::timeout(options.timeout, upload).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(TransferError::Aborted(join_err.to_string())),
            Err(_) => Err(TransferError::Timeout(options.timeout)),
        }
    }
}

/// Session that says goodbye to the server however the transfer ends
struct ScopedSession(Session);

impl Drop for ScopedSession {
    fn drop(&mut self) {
        let _ = self.0.disconnect(None, "relay transfer finished", None);
    }
}

fn upload_blocking(
    local: &Path,
    destination: &Destination,
    options: &SendOptions,
) -> Result<String, TransferError> {
    let file_name = remote_file_name(local)?;
    let remote_path = destination.remote_path_for(file_name);

    // Open locally first so a vanished file never costs a connection
    let mut source = File::open(local).map_err(|source| TransferError::LocalRead {
        path: local.to_path_buf(),
        source,
    })?;

    let session = connect(destination, options)?;

    let password = destination.credential().resolve()?;
    session
        .0
        .userauth_password(&destination.user, &password)
        .map_err(|_| TransferError::Auth {
            user: destination.user.clone(),
        })?;
    drop(password);
    if !session.0.authenticated() {
        return Err(TransferError::Auth {
            user: destination.user.clone(),
        });
    }

    let sftp = session.0.sftp().map_err(|e| TransferError::Handshake {
        endpoint: destination.endpoint(),
        reason: format!("sftp subsystem unavailable: {e}"),
    })?;

    ensure_remote_dir(&sftp, &destination.remote_root)?;

    let mut remote = sftp
        .create(Path::new(&remote_path))
        .map_err(|e| TransferError::RemoteWrite {
            path: remote_path.clone(),
            reason: e.to_string(),
        })?;

    let bytes = copy_to_remote(&mut source, &mut remote, local, &remote_path)?;
    drop(remote);

    info!(
        destination = %destination.name,
        remote_path = %remote_path,
        bytes,
        "Upload completed"
    );

    Ok(remote_path)
}

fn connect(destination: &Destination, options: &SendOptions) -> Result<ScopedSession, TransferError> {
    let endpoint = destination.endpoint();
    let connect_err = |reason: String| TransferError::Connect {
        endpoint: endpoint.clone(),
        reason,
    };

    let addrs = (destination.host.as_str(), destination.port)
        .to_socket_addrs()
        .map_err(|e| connect_err(e.to_string()))?;

    let mut last_error = None;
    let mut tcp = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, options.connect_timeout) {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(e) => last_error = Some(e),
        }
    }
    let tcp = tcp.ok_or_else(|| {
        connect_err(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no address resolved".to_string()),
        )
    })?;
    debug!(endpoint = %endpoint, "TCP connected");

    let mut session = Session::new().map_err(|e| TransferError::Handshake {
        endpoint: endpoint.clone(),
        reason: e.to_string(),
    })?;
    session.set_tcp_stream(tcp);
    session.set_timeout(millis(options.timeout));
    session.handshake().map_err(|e| TransferError::Handshake {
        endpoint: endpoint.clone(),
        reason: e.to_string(),
    })?;

    Ok(ScopedSession(session))
}

/// `mkdir -p` over SFTP; existing directories are fine
fn ensure_remote_dir(sftp: &Sftp, root: &str) -> Result<(), TransferError> {
    let mut current = PathBuf::new();
    for component in Path::new(root).components() {
        match component {
            Component::RootDir => current.push("/"),
            Component::Normal(part) => current.push(part),
            _ => continue,
        }
        if current.as_os_str() == "/" {
            continue;
        }

        let exists = matches!(sftp.stat(&current), Ok(stat) if stat.is_dir());
        if exists {
            continue;
        }
        if let Err(e) = sftp.mkdir(&current, REMOTE_DIR_MODE) {
            // Another transfer may have created it in between
            if !matches!(sftp.stat(&current), Ok(stat) if stat.is_dir()) {
                return Err(TransferError::RemoteDir {
                    path: current.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn copy_to_remote(
    source: &mut impl Read,
    remote: &mut impl Write,
    local: &Path,
    remote_path: &str,
) -> Result<u64, TransferError> {
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    let mut total = 0u64;
    loop {
        let n = source.read(&mut buf).map_err(|source| TransferError::LocalRead {
            path: local.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        remote
            .write_all(&buf[..n])
            .map_err(|e| TransferError::RemoteWrite {
                path: remote_path.to_string(),
                reason: e.to_string(),
            })?;
        total += n as u64;
    }
    remote.flush().map_err(|e| TransferError::RemoteWrite {
        path: remote_path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(total)
}

fn millis(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}
