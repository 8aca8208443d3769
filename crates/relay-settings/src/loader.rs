//! Settings loading with a file layer and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If a settings file is given, deserialize it (missing keys keep defaults)
//! 3. Apply environment variable overrides (highest priority)
//!
//! Validation is left to the caller so command-line flags can be applied
//! before [`RelaySettings::validate`] runs.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::RelaySettings;

/// Env var naming the settings file.
pub const SETTINGS_PATH_VAR: &str = "RELAY_SETTINGS";

/// Settings file path from `RELAY_SETTINGS`, if set.
pub fn settings_path_from_env() -> Option<PathBuf> {
    read_env_string(SETTINGS_PATH_VAR).map(PathBuf::from)
}

/// Load settings from an optional file with process env overrides.
pub fn load_settings(path: Option<&Path>) -> Result<RelaySettings> {
    load_settings_from_path(path, read_env_string)
}

/// Load settings from an optional file, reading overrides through `env`.
///
/// An explicitly named file that does not exist is an error, as is a file
/// with invalid JSON.
pub fn load_settings_from_path(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<RelaySettings> {
    let mut settings = match path {
        Some(path) => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&content)?
        }
        None => {
            debug!("no settings file, using defaults");
            RelaySettings::default()
        }
    };
    apply_env_overrides(&mut settings, env);
    Ok(settings)
}

/// Apply environment variable overrides to loaded settings.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides(settings: &mut RelaySettings, env: impl Fn(&str) -> Option<String>) {
    let lookup = |name: &str| env(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = lookup("HOST") {
        settings.server.host = v;
    }
    if let Some(v) = checked("PORT", lookup("PORT"), |v| parse_u16_range(v, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = checked("HEARTBEAT_INTERVAL_SECS", lookup("HEARTBEAT_INTERVAL_SECS"), |v| {
        parse_u64_range(v, 1, 3600)
    }) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = lookup("RELAY_SERVER_NAME") {
        settings.server.server_name = v;
    }
    if let Some(v) = checked("RELAY_MAX_SEND_QUEUE", lookup("RELAY_MAX_SEND_QUEUE"), |v| {
        parse_usize_range(v, 1, 65_536)
    }) {
        settings.server.max_send_queue = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = lookup("WS_SECRET") {
        settings.auth.shared_secret = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = lookup("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = checked("RELAY_LOG_JSON", lookup("RELAY_LOG_JSON"), parse_bool) {
        settings.logging.json = v;
    }
}

fn checked<T>(name: &str, raw: Option<String>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = raw?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key = name, value = %raw, "invalid env var, ignoring");
    }
    parsed
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
