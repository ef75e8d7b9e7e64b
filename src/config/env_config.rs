use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

use super::AppConfig;

/// Overlay environment variables onto `config`.
///
/// Unset variables leave the field alone; a set but unparseable variable is
/// an error rather than a silent default.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(pin) = lookup("STATIC_PIN") {
        config.static_pin = pin;
    }
    if let Some(path) = lookup("DATASET_PATH") {
        config.dataset_path = PathBuf::from(path);
    }
    if let Some(key) = lookup("SECRET_KEY") {
        config.secret_key = key;
    }
    if let Some(host) = lookup("HOST") {
        config.host = host;
    }
    if let Some(v) = parsed(&lookup, "FALLBACK_AMOUNT_THRESHOLD")? {
        config.fallback_amount_threshold = v;
    }
    if let Some(v) = parsed(&lookup, "PORT")? {
        config.port = v;
    }
    if let Some(raw) = lookup("DEBUG") {
        config.debug = parse_flag(&raw);
    }
    if let Some(v) = parsed(&lookup, "SESSION_TTL_SECS")? {
        config.session_ttl_secs = v;
    }
    if let Some(v) = parsed(&lookup, "MIN_TRAINING_ROWS")? {
        config.min_training_rows = v;
    }
    if let Some(v) = parsed(&lookup, "RETRAIN_COOLDOWN_SECS")? {
        config.retrain_cooldown_secs = v;
    }
    Ok(())
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(None),
    }
}

/// `1`, `true`, `yes`, `on` (any case) are true; anything else is false.
fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
