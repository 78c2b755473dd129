//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TalkbackSettings::default()`]
//! 2. If `~/.talkback/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TALKBACK_*` environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::TalkbackSettings;

/// Resolve the path to the settings file (`~/.talkback/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".talkback").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TalkbackSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value rejected by
/// [`validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TalkbackSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<TalkbackSettings> {
    let defaults = serde_json::to_value(TalkbackSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject values that would make a session unusable.
pub fn validate(settings: &TalkbackSettings) -> Result<()> {
    let checks: [(&str, bool); 7] = [
        ("relay.writeDeadlineMs", settings.relay.write_deadline_ms > 0),
        ("relay.readBufferBytes", settings.relay.read_buffer_bytes > 0),
        (
            "transcoder.outputChunkBytes",
            settings.transcoder.output_chunk_bytes > 0,
        ),
        ("feedback.intervalMs", settings.feedback.interval_ms > 0),
        ("discovery.timeoutMs", settings.discovery.timeout_ms > 0),
        (
            "signaling.connectTimeoutMs",
            settings.signaling.connect_timeout_ms > 0,
        ),
        (
            "session.shutdownTimeoutMs",
            settings.session.shutdown_timeout_ms > 0,
        ),
    ];
    if let Some((key, _)) = checks.iter().find(|(_, ok)| !ok) {
        return Err(SettingsError::InvalidValue(format!("{key} must be > 0")));
    }
    if settings.transcoder.ready_marker.trim().is_empty() {
        return Err(SettingsError::InvalidValue(
            "transcoder.readyMarker must not be empty".into(),
        ));
    }
    if settings.transcoder.ready_marker.contains(['\r', '\n']) {
        return Err(SettingsError::InvalidValue(
            "transcoder.readyMarker must be a single line".into(),
        ));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut TalkbackSettings) {
    if let Some(v) = read_env_string("TALKBACK_DISCOVERY_URL") {
        settings.discovery.base_url = v;
    }
    if let Some(v) = read_env_u64("TALKBACK_DISCOVERY_TIMEOUT_MS", 100, 600_000) {
        settings.discovery.timeout_ms = v;
    }
    if let Some(v) = read_env_bool("TALKBACK_ACCEPT_INVALID_CERTS") {
        settings.signaling.accept_invalid_certs = v;
    }
    if let Some(v) = read_env_string("TALKBACK_TRANSCODER") {
        settings.transcoder.program = v;
    }
    if let Some(v) = read_env_u64("TALKBACK_WRITE_DEADLINE_MS", 1, 60_000) {
        settings.relay.write_deadline_ms = v;
    }
    if let Some(v) = read_env_u64("TALKBACK_FEEDBACK_INTERVAL_MS", 100, 600_000) {
        settings.feedback.interval_ms = v;
    }
    if let Some(v) = read_env_string("TALKBACK_TWO_WAY_AUDIO") {
        match serde_json::from_value(Value::String(v.to_lowercase())) {
            Ok(mode) => settings.two_way_audio = mode,
            Err(_) => {
                tracing::warn!(
                    key = "TALKBACK_TWO_WAY_AUDIO",
                    value = %v,
                    "unknown vendor, ignoring"
                );
            }
        }
    }
    if let Some(v) = read_env_string("TALKBACK_LOG_LEVEL") {
        settings.logging.level = v;
    }
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

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
