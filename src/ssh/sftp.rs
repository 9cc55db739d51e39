// ABOUTME: File operations over a short-lived sftp subsystem channel.
// ABOUTME: One channel per operation, closed before the result is returned.

use super::client::SshHandler;
use super::error::{Error, Result};
use russh::client::Handle;
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Three-way answer to "does this remote path exist?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existence {
    Present,
    Absent,
    /// The server answered with an error other than "no such file".
    Unknown(String),
}

impl Existence {
    /// Two-way view where an unknown answer counts as present.
    pub fn assume_present(&self) -> bool {
        !matches!(self, Existence::Absent)
    }
}

/// An sftp session living on its own channel.
pub(crate) struct RemoteFs {
    sftp: SftpSession,
}

impl RemoteFs {
    pub(crate) async fn open(handle: &Handle<SshHandler>) -> Result<Self> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| Error::ChannelOpen(e.to_string()))?;
        if let Err(e) = channel.request_subsystem(true, "sftp").await {
            if let Err(close_err) = channel.close().await {
                tracing::debug!("error closing refused sftp channel: {}", close_err);
            }
            return Err(Error::ChannelOpen(format!("sftp subsystem refused: {}", e)));
        }
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(Self { sftp })
    }

    pub(crate) async fn close(self) {
        if let Err(e) = self.sftp.close().await {
            tracing::debug!("error closing sftp channel: {}", e);
        }
    }

    pub(crate) async fn existence(&self, path: &str) -> Existence {
        match self.sftp.metadata(path).await {
            Ok(_) => Existence::Present,
            Err(e) if is_not_found(&e) => Existence::Absent,
            Err(e) => Existence::Unknown(e.to_string()),
        }
    }

    pub(crate) async fn list_dirs(&self, path: &str) -> Result<Vec<String>> {
        self.list_where(path, |entry| entry.file_type().is_dir()).await
    }

    pub(crate) async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        self.list_where(path, |entry| entry.file_type().is_file()).await
    }

    async fn list_where<F>(&self, path: &str, keep: F) -> Result<Vec<String>>
    where
        F: Fn(&russh_sftp::client::fs::DirEntry) -> bool,
    {
        let mut names: Vec<String> = self
            .sftp
            .read_dir(path)
            .await?
            .filter(|entry| entry.file_name() != "." && entry.file_name() != "..")
            .filter(|entry| keep(entry))
            .map(|entry| entry.file_name())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Copy a remote file to `local`. Returns bytes written.
    pub(crate) async fn get(&self, remote: &str, local: &Path) -> Result<u64> {
        let mut remote_file = self.sftp.open(remote).await?;
        let mut local_file = tokio::fs::File::create(local).await?;
        let copied = tokio::io::copy(&mut remote_file, &mut local_file).await?;
        local_file.flush().await?;
        Ok(copied)
    }

    /// Copy `local` to a remote file, replacing it. Returns bytes written.
    pub(crate) async fn put(&self, local: &Path, remote: &str) -> Result<u64> {
        let mut local_file = tokio::fs::File::open(local).await?;
        let mut remote_file = self.sftp.create(remote).await?;
        let copied = tokio::io::copy(&mut local_file, &mut remote_file).await?;
        remote_file.shutdown().await?;
        Ok(copied)
    }
}

fn is_not_found(err: &SftpError) -> bool {
    matches!(err, SftpError::Status(status) if matches!(status.status_code, StatusCode::NoSuchFile))
}
