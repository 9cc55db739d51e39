// ABOUTME: Application-wide error types for the sshctl binary.
// ABOUTME: Wraps the SSH library error and adds target and argument errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("could not connect to {0}")]
    ConnectFailed(String),

    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
