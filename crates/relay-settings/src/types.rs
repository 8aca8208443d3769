//! Settings types. Every section deserializes with `#[serde(default)]`, so a
//! settings file only needs the keys it overrides.

use std::fmt;

use secrecy::SecretString;
use serde::Deserialize;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelaySettings {
    /// Listener and connection settings.
    pub server: ServerSettings,
    /// Credential settings.
    pub auth: AuthSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Listener and per-connection settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Seconds between keep-alive pings.
    pub heartbeat_interval_secs: u64,
    /// Identifier sent in the saas `welcome` message.
    pub server_name: String,
    /// Outbound queue capacity per connection.
    pub max_send_queue: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for connections to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            heartbeat_interval_secs: 30,
            server_name: "print-ws".into(),
            max_send_queue: 256,
            max_message_size: 100 * 1024 * 1024,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Credential settings.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthSettings {
    /// Master credential accepted for any tenant.
    pub shared_secret: Option<String>,
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.shared_secret.is_some() {
            "[REDACTED]"
        } else {
            "<unset>"
        };
        f.debug_struct("AuthSettings")
            .field("shared_secret", &secret)
            .finish()
    }
}

/// Log output settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    /// Default level directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl RelaySettings {
    /// Check invariants the relay cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.auth.shared_secret.as_deref().is_none_or(str::is_empty) {
            return Err(SettingsError::MissingSecret);
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat interval must be at least 1 second".into(),
            ));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "send queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The shared secret, wrapped so it is zeroized and never printed.
    ///
    /// Returns [`SettingsError::MissingSecret`] when unset or empty.
    pub fn shared_secret(&self) -> Result<SecretString> {
        match self.auth.shared_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(SecretString::from(secret)),
            _ => Err(SettingsError::MissingSecret),
        }
    }
}
