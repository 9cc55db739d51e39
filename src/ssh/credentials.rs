// ABOUTME: Builds the ordered set of credentials tried during authentication.
// ABOUTME: Key loading and agent access go through the injectable KeyProvider.

use super::client::SessionConfig;
use super::error::{Error, Result};
use async_trait::async_trait;
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key::{Algorithm, PrivateKey, PublicKey};
use russh::keys::load_secret_key;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Key families accepted for explicit and default key files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    #[default]
    Rsa,
    Dsa,
    Ecdsa,
    Ed25519,
}

impl KeyFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFamily::Rsa => "rsa",
            KeyFamily::Dsa => "dsa",
            KeyFamily::Ecdsa => "ecdsa",
            KeyFamily::Ed25519 => "ed25519",
        }
    }

    /// File name of the conventional per-user key, e.g. `id_ed25519`.
    pub fn default_file_name(&self) -> String {
        format!("id_{}", self.as_str())
    }

    /// Whether a decoded key belongs to this family.
    pub fn matches(&self, algorithm: &Algorithm) -> bool {
        match self {
            KeyFamily::Rsa => matches!(algorithm, Algorithm::Rsa { .. }),
            KeyFamily::Dsa => matches!(algorithm, Algorithm::Dsa),
            KeyFamily::Ecdsa => matches!(
                algorithm,
                Algorithm::Ecdsa { .. } | Algorithm::SkEcdsaSha2NistP256
            ),
            KeyFamily::Ed25519 => {
                matches!(algorithm, Algorithm::Ed25519 | Algorithm::SkEd25519)
            }
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rsa" => Ok(KeyFamily::Rsa),
            "dsa" => Ok(KeyFamily::Dsa),
            "ecdsa" => Ok(KeyFamily::Ecdsa),
            "ed25519" => Ok(KeyFamily::Ed25519),
            _ => Err(Error::UnknownKeyFamily(s.to_string())),
        }
    }
}

/// A single authentication candidate.
#[derive(Clone)]
pub enum Credential {
    /// Private key decoded locally.
    Key(Arc<PrivateKey>),
    /// Public half of a key held by the SSH agent, which does the signing.
    Agent(PublicKey),
}

impl Credential {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Credential::Key(key) => key.algorithm(),
            Credential::Agent(key) => key.algorithm(),
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, Credential::Agent(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Key(key) => write!(f, "Key({})", key.algorithm().as_str()),
            Credential::Agent(key) => write!(f, "Agent({})", key.algorithm().as_str()),
        }
    }
}

/// How the session will try to authenticate.
#[derive(Debug, Clone)]
pub enum AuthPlan {
    Password(String),
    /// Ordered candidates; the first one the server accepts wins.
    Keys(Vec<Credential>),
}

impl AuthPlan {
    pub fn is_password(&self) -> bool {
        matches!(self, AuthPlan::Password(_))
    }

    pub fn keys(&self) -> &[Credential] {
        match self {
            AuthPlan::Keys(keys) => keys,
            AuthPlan::Password(_) => &[],
        }
    }
}

/// Source of key material: key files, the default key and the agent.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Decode the private key stored at `path`.
    fn load_key(&self, path: &Path, passphrase: Option<&str>) -> Result<PrivateKey>;

    /// Location of the conventional key for `family`, if one can be derived.
    fn default_key_path(&self, family: KeyFamily) -> Option<PathBuf>;

    /// Keys currently offered by a running agent. Empty when no agent is reachable.
    async fn agent_keys(&mut self) -> Vec<PublicKey>;
}

/// Keys from the local filesystem and the agent behind `$SSH_AUTH_SOCK`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemKeys;

#[async_trait]
impl KeyProvider for SystemKeys {
    fn load_key(&self, path: &Path, passphrase: Option<&str>) -> Result<PrivateKey> {
        load_secret_key(path, passphrase).map_err(|e| Error::KeyLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn default_key_path(&self, family: KeyFamily) -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".ssh")
                .join(family.default_file_name()),
        )
    }

    async fn agent_keys(&mut self) -> Vec<PublicKey> {
        let mut agent = match AgentClient::connect_env().await {
            Ok(agent) => agent,
            Err(e) => {
                tracing::debug!("SSH agent not reachable: {}", e);
                return Vec::new();
            }
        };
        match agent.request_identities().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::debug!("failed to list agent keys: {}", e);
                Vec::new()
            }
        }
    }
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Resolve the authentication plan for `config`.
///
/// An explicit key path wins over a password and is the only candidate; failing
/// to decode it is an error. A password without a key selects password mode.
/// Otherwise the agent keys are collected and the default key for the configured
/// family is added: first when a passphrase was supplied, last when not. An empty
/// candidate list is logged but not an error; authentication will fail later.
pub async fn resolve_plan(config: &SessionConfig, keys: &mut dyn KeyProvider) -> Result<AuthPlan> {
    if let Some(key_path) = &config.key_path {
        if config.password.is_some() {
            tracing::debug!("explicit key given, ignoring password");
        }
        let path = expand_home(key_path);
        let key = keys.load_key(&path, config.key_passphrase.as_deref())?;
        if !config.key_family.matches(&key.algorithm()) {
            return Err(Error::KeyLoadFailed {
                path,
                reason: format!(
                    "expected a {} key, found {}",
                    config.key_family,
                    key.algorithm().as_str()
                ),
            });
        }
        return Ok(AuthPlan::Keys(vec![Credential::Key(Arc::new(key))]));
    }

    if let Some(password) = &config.password {
        return Ok(AuthPlan::Password(password.clone()));
    }

    let mut candidates: Vec<Credential> = keys
        .agent_keys()
        .await
        .into_iter()
        .map(Credential::Agent)
        .collect();
    tracing::debug!("{} key(s) offered by agent", candidates.len());

    if let Some(key) = load_default_key(config, keys) {
        let credential = Credential::Key(Arc::new(key));
        if config.key_passphrase.is_some() {
            candidates.insert(0, credential);
        } else {
            candidates.push(credential);
        }
    }

    if candidates.is_empty() {
        tracing::error!("No valid key found");
    }

    Ok(AuthPlan::Keys(candidates))
}

fn load_default_key(config: &SessionConfig, keys: &dyn KeyProvider) -> Option<PrivateKey> {
    let path = keys.default_key_path(config.key_family)?;
    match keys.load_key(&path, config.key_passphrase.as_deref()) {
        Ok(key) if config.key_family.matches(&key.algorithm()) => Some(key),
        Ok(key) => {
            tracing::debug!(
                "ignoring {}: expected a {} key, found {}",
                path.display(),
                config.key_family,
                key.algorithm().as_str()
            );
            None
        }
        Err(e) => {
            tracing::debug!("no usable default key: {}", e);
            None
        }
    }
}
