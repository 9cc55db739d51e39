// ABOUTME: Authentication negotiation over an established SSH transport.
// ABOUTME: Tries the resolved plan in order and stops at the first accepted credential.

use super::client::SshHandler;
use super::credentials::{AuthPlan, Credential};
use super::error::{Error, Result};
use async_trait::async_trait;
use russh::client::Handle;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::agent::client::AgentClient;
use tokio::net::UnixStream;

/// One authentication attempt per call against the remote server.
///
/// `Ok(false)` means the server rejected the credential; `Err` means the
/// attempt itself broke down. Both are treated as "try the next one".
#[async_trait]
pub trait Authenticator: Send {
    async fn password(&mut self, user: &str, password: &str) -> Result<bool>;

    async fn key(&mut self, user: &str, credential: &Credential) -> Result<bool>;
}

/// Run `plan` against `auth`. Returns whether the session ended up authenticated.
pub async fn authenticate<A>(auth: &mut A, user: &str, plan: &AuthPlan) -> bool
where
    A: Authenticator + ?Sized,
{
    match plan {
        AuthPlan::Password(password) => match auth.password(user, password).await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::debug!("password authentication error: {}", e);
                false
            }
        },
        AuthPlan::Keys(candidates) => {
            for (index, credential) in candidates.iter().enumerate() {
                match auth.key(user, credential).await {
                    Ok(true) => {
                        tracing::debug!("authenticated with candidate {} {:?}", index, credential);
                        return true;
                    }
                    Ok(false) => {
                        tracing::debug!("candidate {} {:?} rejected", index, credential);
                    }
                    Err(e) => {
                        tracing::debug!("candidate {} {:?} failed: {}", index, credential, e);
                    }
                }
            }
            false
        }
    }
}

/// Authenticator backed by a live russh handle.
///
/// The agent connection is opened the first time an agent credential is tried
/// and reused for the rest of the negotiation.
pub(crate) struct HandleAuthenticator<'a> {
    handle: &'a mut Handle<SshHandler>,
    agent: Option<AgentClient<UnixStream>>,
}

impl<'a> HandleAuthenticator<'a> {
    pub(crate) fn new(handle: &'a mut Handle<SshHandler>) -> Self {
        Self {
            handle,
            agent: None,
        }
    }

    async fn ensure_agent(&mut self) -> Result<()> {
        if self.agent.is_none() {
            let agent = AgentClient::connect_env()
                .await
                .map_err(|e| Error::AgentUnavailable(e.to_string()))?;
            self.agent = Some(agent);
        }
        Ok(())
    }
}

#[async_trait]
impl Authenticator for HandleAuthenticator<'_> {
    async fn password(&mut self, user: &str, password: &str) -> Result<bool> {
        let result = self.handle.authenticate_password(user, password).await?;
        Ok(result.success())
    }

    async fn key(&mut self, user: &str, credential: &Credential) -> Result<bool> {
        match credential {
            Credential::Key(key) => {
                let hash_alg = self.handle.best_supported_rsa_hash().await?.flatten();
                let result = self
                    .handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key.clone(), hash_alg))
                    .await?;
                Ok(result.success())
            }
            Credential::Agent(public_key) => {
                self.ensure_agent().await?;
                let Some(agent) = self.agent.as_mut() else {
                    return Ok(false);
                };
                let result = self
                    .handle
                    .authenticate_publickey_with(user, public_key.clone(), None, agent)
                    .await
                    .map_err(|e| Error::AgentUnavailable(e.to_string()))?;
                Ok(result.success())
            }
        }
    }
}
