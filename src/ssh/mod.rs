// ABOUTME: SSH client module for remote command execution and file access.
// ABOUTME: Resolves credentials, authenticates, and opens one channel per operation.

mod auth;
mod channel;
mod client;
mod credentials;
mod error;
mod sftp;

pub use auth::{Authenticator, authenticate};
pub use client::{ConnectStatus, HostKeyPolicy, Session, SessionConfig, SessionState};
pub use credentials::{
    AuthPlan, Credential, KeyFamily, KeyProvider, SystemKeys, expand_home, resolve_plan,
};
pub use error::{Error, Result};
pub use sftp::Existence;
