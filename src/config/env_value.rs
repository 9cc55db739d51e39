// ABOUTME: Secrets read from environment variables.
// ABOUTME: Passwords and passphrases never come from argv.

/// Password used when no key is given.
pub const PASSWORD_VAR: &str = "SSHCTL_PASSWORD";

/// Passphrase for the explicit or default key.
pub const KEY_PASSPHRASE_VAR: &str = "SSHCTL_KEY_PASSPHRASE";

/// A value taken from the environment, optionally falling back to a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvValue {
    pub var: String,
    pub default: Option<String>,
}

impl EnvValue {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            default: None,
        }
    }

    pub fn or(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// The variable's value, or the default. A set but empty variable counts as unset.
    pub fn resolve(&self) -> Option<String> {
        match std::env::var(&self.var) {
            Ok(val) if !val.is_empty() => Some(val),
            _ => self.default.clone(),
        }
    }
}

/// Secrets the binary hands to the session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub password: Option<String>,
    pub key_passphrase: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            password: EnvValue::new(PASSWORD_VAR).resolve(),
            key_passphrase: EnvValue::new(KEY_PASSPHRASE_VAR).resolve(),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "key_passphrase",
                &self.key_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
