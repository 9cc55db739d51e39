// ABOUTME: SSH session management using russh.
// ABOUTME: Handles connection, credential negotiation, command execution and file access.

use super::auth::{self, HandleAuthenticator};
use super::channel::SessionChannel;
use super::credentials::{self, KeyFamily, KeyProvider, SystemKeys};
use super::error::{Error, Result};
use super::sftp::{Existence, RemoteFs};
use crate::exec::{self, RunOptions, RunOutput};
use russh::Disconnect;
use russh::client::{self, Config, Handle};
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// How the server's host key is checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents.
    #[default]
    AcceptAny,
    /// Check against a known_hosts file (default `~/.ssh/known_hosts`).
    KnownHosts {
        path: Option<PathBuf>,
        /// Accept and record hosts that are not in the file yet.
        trust_on_first_use: bool,
    },
}

/// Configuration for establishing an SSH session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Private key to authenticate with. Takes precedence over `password`.
    /// If None, the agent and the default key for `key_family` are tried.
    pub key_path: Option<PathBuf>,
    /// Passphrase protecting the key.
    pub key_passphrase: Option<String>,
    /// Family of the explicit or default key (default: rsa).
    pub key_family: KeyFamily,
    /// Password used when no key path is given.
    pub password: Option<String>,
    pub host_key: HostKeyPolicy,
    /// Drop the connection after this long without traffic.
    pub inactivity_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            key_passphrase: None,
            key_family: KeyFamily::default(),
            password: None,
            host_key: HostKeyPolicy::default(),
            inactivity_timeout: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.key_passphrase = Some(passphrase.into());
        self
    }

    pub fn key_family(mut self, family: KeyFamily) -> Self {
        self.key_family = family;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn host_key(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key = policy;
        self
    }

    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "<redacted>");
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("key_path", &self.key_path)
            .field("key_passphrase", &redact(&self.key_passphrase))
            .field("key_family", &self.key_family)
            .field("password", &redact(&self.password))
            .field("host_key", &self.host_key)
            .field("inactivity_timeout", &self.inactivity_timeout)
            .finish()
    }
}

/// Outcome of `Session::connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    Connected,
    Failed,
}

impl ConnectStatus {
    /// Numeric status: 0 on success, 1 on failure.
    pub fn code(&self) -> i32 {
        match self {
            ConnectStatus::Connected => 0,
            ConnectStatus::Failed => 1,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectStatus::Connected)
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connecting,
    Authenticated,
    Failed,
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl SshHandler {
    fn new(host: String, port: u16, policy: HostKeyPolicy) -> Self {
        Self { host, port, policy }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let HostKeyPolicy::KnownHosts {
            path,
            trust_on_first_use,
        } = &self.policy
        else {
            return Ok(true);
        };

        let check_result = match path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => Ok(true),
            Ok(false) if *trust_on_first_use => {
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                let learn_result = match path {
                    Some(path) => {
                        learn_known_hosts_path(&self.host, self.port, server_public_key, path)
                    }
                    None => learn_known_hosts(&self.host, self.port, server_public_key),
                };
                if let Err(e) = learn_result {
                    tracing::warn!("Failed to save host key to known_hosts: {}", e);
                }
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                tracing::error!("host key for {}:{} rejected: {}", self.host, self.port, e);
                Ok(false)
            }
        }
    }
}

/// One SSH session to one host.
///
/// Created unconnected; `connect` negotiates, `disconnect` tears down. Commands
/// and file operations each open their own channel on the shared connection, so
/// `run` may be called concurrently from several tasks. Do not disconnect while
/// a command or file operation is still in flight.
pub struct Session {
    config: SessionConfig,
    keys: Box<dyn KeyProvider>,
    state: SessionState,
    handle: Option<Handle<SshHandler>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("handle", &self.handle.as_ref().map(|_| "<russh::Handle>"))
            .finish()
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_key_provider(config, Box::new(SystemKeys))
    }

    /// Use `keys` instead of the local filesystem and agent.
    pub fn with_key_provider(config: SessionConfig, keys: Box<dyn KeyProvider>) -> Self {
        Self {
            config,
            keys,
            state: SessionState::Unconnected,
            handle: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated && self.handle.is_some()
    }

    /// Connect to the remote host and authenticate.
    ///
    /// Connection and authentication failures are logged and reported as
    /// `ConnectStatus::Failed`. Only a key that cannot be loaded is an error,
    /// raised before any network activity. Calling this again renegotiates
    /// from scratch.
    pub async fn connect(&mut self) -> Result<ConnectStatus> {
        let plan = credentials::resolve_plan(&self.config, self.keys.as_mut()).await?;

        if self.handle.is_some() {
            self.disconnect().await;
        }
        self.state = SessionState::Connecting;

        let address = (self.config.host.as_str(), self.config.port);
        let stream = match TcpStream::connect(address).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Connection failed: {}", e);
                self.state = SessionState::Failed;
                return Ok(ConnectStatus::Failed);
            }
        };

        let russh_config = Config {
            inactivity_timeout: self.config.inactivity_timeout,
            ..Default::default()
        };
        let handler = SshHandler::new(
            self.config.host.clone(),
            self.config.port,
            self.config.host_key.clone(),
        );

        let mut handle = match client::connect_stream(Arc::new(russh_config), stream, handler).await
        {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("SSH negotiation failed: {}", e);
                self.state = SessionState::Failed;
                return Ok(ConnectStatus::Failed);
            }
        };

        let authenticated = {
            let mut authenticator = HandleAuthenticator::new(&mut handle);
            auth::authenticate(&mut authenticator, &self.config.user, &plan).await
        };

        if !authenticated {
            tracing::error!("SSH negotiation failed");
            if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
                tracing::debug!("error dropping unauthenticated connection: {}", e);
            }
            self.state = SessionState::Failed;
            return Ok(ConnectStatus::Failed);
        }

        tracing::info!(
            "Successfully connected to {}@{}",
            self.config.user,
            self.config.host
        );
        self.handle = Some(handle);
        self.state = SessionState::Authenticated;
        Ok(ConnectStatus::Connected)
    }

    /// Run `command`, writing displayed output to stdout.
    pub async fn run(&self, command: &str, options: &RunOptions) -> Result<RunOutput> {
        let mut stdout = std::io::stdout();
        self.run_with_output(command, options, &mut stdout).await
    }

    /// Run `command`, writing displayed output to `sink`.
    ///
    /// A command still running at its timeout yields exit code 1 with whatever
    /// was captured; an interrupted wait yields exit code 0. Neither is an error.
    pub async fn run_with_output<W>(
        &self,
        command: &str,
        options: &RunOptions,
        sink: &mut W,
    ) -> Result<RunOutput>
    where
        W: Write + Send + ?Sized,
    {
        let handle = self.ready_handle()?;
        tracing::debug!("running {:?}", command);
        let channel = SessionChannel::open(handle, command, options).await?;
        exec::run_on(channel, options, sink).await
    }

    /// Whether `path` exists. Errors other than "no such file" count as existing;
    /// use `existence` to tell them apart.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.existence(path).await?.assume_present())
    }

    pub async fn existence(&self, path: &str) -> Result<Existence> {
        let fs = self.open_fs().await?;
        let existence = fs.existence(path).await;
        fs.close().await;
        Ok(existence)
    }

    /// Names of the directories directly under `path`, sorted.
    pub async fn list_dirs(&self, path: &str) -> Result<Vec<String>> {
        let fs = self.open_fs().await?;
        let result = fs.list_dirs(path).await;
        fs.close().await;
        result
    }

    /// Names of the regular files directly under `path`, sorted.
    pub async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        let fs = self.open_fs().await?;
        let result = fs.list_files(path).await;
        fs.close().await;
        result
    }

    /// Download `remote` to `local`. Returns the number of bytes copied.
    pub async fn get(&self, remote: &str, local: impl AsRef<Path>) -> Result<u64> {
        let fs = self.open_fs().await?;
        let result = fs.get(remote, local.as_ref()).await;
        fs.close().await;
        result
    }

    /// Upload `local` to `remote`. Returns the number of bytes copied.
    pub async fn put(&self, local: impl AsRef<Path>, remote: &str) -> Result<u64> {
        let fs = self.open_fs().await?;
        let result = fs.put(local.as_ref(), remote).await;
        fs.close().await;
        result
    }

    /// Close the connection. A no-op when not connected.
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
                tracing::debug!("disconnect from {}: {}", self.config.host, e);
            }
        }
        self.state = SessionState::Unconnected;
    }

    fn ready_handle(&self) -> Result<&Handle<SshHandler>> {
        match (&self.handle, self.state) {
            (Some(handle), SessionState::Authenticated) => Ok(handle),
            _ => {
                tracing::error!("SSH session is not ready");
                Err(Error::SessionNotReady)
            }
        }
    }

    async fn open_fs(&self) -> Result<RemoteFs> {
        let handle = self.ready_handle()?;
        RemoteFs::open(handle).await
    }
}
