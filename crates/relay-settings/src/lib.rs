//! # relay-settings
//!
//! Configuration for the print relay, resolved from four layers (lowest
//! priority first):
//! 1. **Compiled defaults** — [`RelaySettings::default()`]
//! 2. **Settings file** — optional JSON file named by `RELAY_SETTINGS`
//! 3. **Environment variables** — `PORT`, `WS_SECRET`, `HEARTBEAT_INTERVAL_SECS`, ...
//! 4. **Command-line flags** — applied by the binary after loading
//!
//! The shared secret has no default: [`RelaySettings::validate`] fails
//! without one and the relay refuses to start.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, load_settings, load_settings_from_path, settings_path_from_env};
pub use types::*;
