//! Anonymous FTP client for the exchange settle directory.

use std::net::ToSocketAddrs;
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::{debug, info};

use super::{TransferClient, TransferError};
use crate::config::RemoteConfig;

/// A logged-in FTP session positioned in the settle directory.
pub struct FtpClient {
    stream: FtpStream,
    label: String,
}

impl FtpClient {
    /// Connect, log in and change into `remote.path`.
    pub fn connect(remote: &RemoteConfig) -> Result<Self, TransferError> {
        let label = format!("ftp://{}:{}/{}", remote.host, remote.port, remote.path);
        let connect_err = |reason: String| TransferError::Connect {
            host: remote.host.clone(),
            reason,
        };

        let addr = (remote.host.as_str(), remote.port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?
            .next()
            .ok_or_else(|| connect_err("host resolved to no addresses".into()))?;
        let timeout = Duration::from_secs(remote.timeout_secs);

        let mut stream =
            FtpStream::connect_timeout(addr, timeout).map_err(|e| connect_err(e.to_string()))?;
        stream
            .get_ref()
            .set_read_timeout(Some(timeout))
            .map_err(|e| connect_err(e.to_string()))?;

        stream
            .login(remote.user.as_str(), remote.password.as_str())
            .map_err(|e| TransferError::Login {
                user: remote.user.clone(),
                reason: e.to_string(),
            })?;
        stream
            .cwd(remote.path.as_str())
            .map_err(|e| command_err(format!("CWD {}", remote.path), e))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| command_err("TYPE I".into(), e))?;

        info!(remote = %label, "connected");
        Ok(Self { stream, label })
    }
}

fn command_err(command: String, e: suppaftp::FtpError) -> TransferError {
    TransferError::Command {
        command,
        reason: e.to_string(),
    }
}

impl TransferClient for FtpClient {
    fn name(&self) -> &str {
        &self.label
    }

    fn list_remote_files(&mut self) -> Result<Vec<String>, TransferError> {
        let names = self
            .stream
            .nlst(None)
            .map_err(|e| command_err("NLST".into(), e))?;
        debug!(count = names.len(), "listed remote files");
        // some servers answer NLST with paths
        Ok(names
            .into_iter()
            .map(|n| n.rsplit('/').next().unwrap_or_default().to_string())
            .filter(|n| !n.is_empty())
            .collect())
    }

    fn download_file(&mut self, name: &str) -> Result<Vec<u8>, TransferError> {
        let cursor = self
            .stream
            .retr_as_buffer(name)
            .map_err(|e| TransferError::Download {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(cursor.into_inner())
    }
}

impl Drop for FtpClient {
    fn drop(&mut self) {
        let _ = self.stream.quit();
    }
}
