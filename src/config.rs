use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_image_model: String,
    pub gemini_request_timeout_seconds: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| parse_u64_or(&value, default))
        .unwrap_or(default)
}

fn parse_u64_or(value: &str, default: u64) -> Option<u64> {
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        _ => {
            warn!("Ignoring invalid numeric setting '{}'; using {}.", value, default);
            None
        }
    }
}

fn normalize_api_base(value: String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_GEMINI_API_BASE.to_string();
    }
    trimmed.to_string()
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.trim().to_string()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(non_empty_or(env_string("LOG_DIR", "logs"), "logs")),
            output_dir: PathBuf::from(non_empty_or(
                env_string("OUTPUT_DIR", "generated"),
                "generated",
            )),
            // A missing key is reported by the service on the first call.
            gemini_api_key: env_string("GEMINI_API_KEY", "").trim().to_string(),
            gemini_api_base: normalize_api_base(env_string(
                "GEMINI_API_BASE",
                DEFAULT_GEMINI_API_BASE,
            )),
            gemini_image_model: non_empty_or(
                env_string("GEMINI_IMAGE_MODEL", DEFAULT_GEMINI_IMAGE_MODEL),
                DEFAULT_GEMINI_IMAGE_MODEL,
            ),
            gemini_request_timeout_seconds: env_u64("GEMINI_REQUEST_TIMEOUT_SECONDS", 120),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_drops_trailing_slashes_and_falls_back_when_blank() {
        assert_eq!(
            normalize_api_base("https://example.test/v1beta//".to_string()),
            "https://example.test/v1beta"
        );
        assert_eq!(normalize_api_base("   ".to_string()), DEFAULT_GEMINI_API_BASE);
    }

    #[test]
    fn numeric_settings_reject_zero_and_garbage() {
        assert_eq!(parse_u64_or("45", 120), Some(45));
        assert_eq!(parse_u64_or("0", 120), None);
        assert_eq!(parse_u64_or("soon", 120), None);
    }

    #[test]
    fn blank_model_name_uses_default() {
        assert_eq!(
            non_empty_or(" ".to_string(), DEFAULT_GEMINI_IMAGE_MODEL),
            DEFAULT_GEMINI_IMAGE_MODEL
        );
        assert_eq!(non_empty_or(" custom ".to_string(), "x"), "custom");
    }
}
