// ABOUTME: Configuration for the sshctl binary.
// ABOUTME: Turns a target string, key options and environment secrets into a SessionConfig.

mod env_value;
mod server;

pub use env_value::{EnvValue, KEY_PASSPHRASE_VAR, PASSWORD_VAR, Secrets};
pub use server::ServerConfig;

use crate::ssh::{HostKeyPolicy, KeyFamily, SessionConfig};
use std::path::PathBuf;

/// Everything needed to build a session besides the target itself.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub key_path: Option<PathBuf>,
    pub key_family: KeyFamily,
    /// Check the host key against `~/.ssh/known_hosts`, learning unknown hosts.
    pub known_hosts: bool,
    pub secrets: Secrets,
}

impl ConnectOptions {
    pub fn session_config(&self, server: &ServerConfig) -> SessionConfig {
        let mut config = SessionConfig::new(&server.host, server.user_or_default())
            .port(server.port)
            .key_family(self.key_family);

        if let Some(path) = &self.key_path {
            config = config.key_path(path);
        }
        if let Some(passphrase) = &self.secrets.key_passphrase {
            config = config.key_passphrase(passphrase);
        }
        if let Some(password) = &self.secrets.password {
            config = config.password(password);
        }
        if self.known_hosts {
            config = config.host_key(HostKeyPolicy::KnownHosts {
                path: None,
                trust_on_first_use: true,
            });
        }
        config
    }
}
