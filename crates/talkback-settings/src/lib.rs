//! # talkback-settings
//!
//! Configuration for talkback sessions, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`TalkbackSettings::default()`]
//! 2. **User file**: `~/.talkback/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TALKBACK_*` overrides (highest priority)
//!
//! Settings are loaded once by the caller and passed explicitly to the
//! session controller; there is no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;
