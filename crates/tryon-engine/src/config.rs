use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DESCRIPTION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
const MIN_REQUEST_TIMEOUT_S: f64 = 15.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

/// Runtime settings, read from the environment and overridden by CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct TryOnConfig {
    pub api_base: String,
    pub description_model: String,
    pub edit_model: String,
    pub request_timeout: Duration,
    pub credential_store_path: Option<PathBuf>,
    /// Continue with the generic label when the description call fails.
    pub describe_fallback: bool,
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            description_model: DEFAULT_DESCRIPTION_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
            credential_store_path: default_credential_store_path(),
            describe_fallback: false,
        }
    }
}

impl TryOnConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            description_model: non_empty_env("TRYON_DESCRIPTION_MODEL")
                .unwrap_or(defaults.description_model),
            edit_model: non_empty_env("TRYON_EDIT_MODEL").unwrap_or(defaults.edit_model),
            request_timeout: request_timeout_from(
                non_empty_env("TRYON_REQUEST_TIMEOUT").as_deref(),
            ),
            credential_store_path: non_empty_env("TRYON_CREDENTIAL_STORE")
                .map(PathBuf::from)
                .or(defaults.credential_store_path),
            describe_fallback: non_empty_env("TRYON_DESCRIBE_FALLBACK")
                .and_then(|value| parse_flag(&value))
                .unwrap_or(defaults.describe_fallback),
        }
    }
}

/// `$HOME/.config/tryon/credentials.json`, when a home directory is known.
pub fn default_credential_store_path() -> Option<PathBuf> {
    let home = non_empty_env("HOME").or_else(|| non_empty_env("USERPROFILE"))?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("tryon")
            .join("credentials.json"),
    )
}

pub(crate) fn request_timeout_from(raw: Option<&str>) -> Duration {
    let seconds = raw
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
        .clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S);
    Duration::from_secs_f64(seconds)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
