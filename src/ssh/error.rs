// ABOUTME: SSH-specific error types.
// ABOUTME: Covers key decoding, connection setup, channel and sftp failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("unknown key type: {0} (expected rsa, dsa, ecdsa or ed25519)")]
    UnknownKeyFamily(String),

    #[error("SSH session is not ready")]
    SessionNotReady,

    #[error("failed to open channel: {0}")]
    ChannelOpen(String),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("sftp error: {0}")]
    Sftp(String),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<russh_sftp::client::error::Error> for Error {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        Error::Sftp(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
