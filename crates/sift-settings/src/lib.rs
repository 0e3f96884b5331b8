//! # sift-settings
//!
//! Typed configuration for sift, resolved once at startup.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SiftSettings::default()`]
//! 2. **User file**: `~/.sift/settings.json` or `--config` (deep-merged over defaults)
//! 3. **Environment variables**: `SIFT_*` overrides (highest priority)
//!
//! [`SiftSettings::validate`] fails fast on anything that would only surface
//! later at run time (missing channel credentials, unknown timezone, bad
//! cadence). Each pipeline component receives only its own section.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;
pub mod validate;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;
pub use validate::{parse_local_time, parse_timezone, parse_weekday};
