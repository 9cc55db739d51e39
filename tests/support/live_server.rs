// ABOUTME: Connection settings for tests that need a real SSH server.
// ABOUTME: Read from SSHCTL_TEST_* variables; tests skip when they are unset.

use sshctl::ssh::{KeyFamily, SessionConfig};

/// Session config for the live test server, or `None` when not configured.
///
/// `SSHCTL_TEST_HOST` is required. `SSHCTL_TEST_PORT` defaults to 22 and
/// `SSHCTL_TEST_USER` to `root`. `SSHCTL_TEST_KEY` (with an optional
/// `SSHCTL_TEST_KEY_TYPE`) or `SSHCTL_TEST_PASSWORD` selects the credential.
pub fn live_config() -> Option<SessionConfig> {
    let host = std::env::var("SSHCTL_TEST_HOST").ok()?;
    let port = std::env::var("SSHCTL_TEST_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(22);
    let user = std::env::var("SSHCTL_TEST_USER").unwrap_or_else(|_| "root".to_string());

    let mut config = SessionConfig::new(host, user).port(port);
    if let Ok(key) = std::env::var("SSHCTL_TEST_KEY") {
        let family = std::env::var("SSHCTL_TEST_KEY_TYPE")
            .ok()
            .and_then(|f| f.parse::<KeyFamily>().ok())
            .unwrap_or(KeyFamily::Ed25519);
        config = config.key_path(key).key_family(family);
    }
    if let Ok(password) = std::env::var("SSHCTL_TEST_PASSWORD") {
        config = config.password(password);
    }
    Some(config)
}

