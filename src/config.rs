//! Runtime settings loaded from `PRACTICUM_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{AppError, AppResult};

const DEV_SECRET: &str = "practicum-dev-secret-change-me-please-0000";
/// Upper bound for either token lifetime; keeps `exp` and revocation expiries in range.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http_port: u16,
    pub jwt_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Transcription-similarity pass mark for audio answers, in [0, 1].
    pub audio_threshold: f64,
    pub sweep_interval_secs: u64,
    pub seed_file: Option<PathBuf>,
    pub admin_password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: 7878,
            jwt_secret: DEV_SECRET.to_string(),
            access_ttl_secs: 60 * 60,
            refresh_ttl_secs: 14 * 24 * 60 * 60,
            audio_threshold: 0.7,
            sweep_interval_secs: 5,
            seed_file: None,
            admin_password: None,
        }
    }
}

fn env_parse<T: FromStr + Copy + std::fmt::Debug>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(target: "startup", "ignoring {}='{}', using default {:?}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let d = Settings::default();
        let jwt_secret = match std::env::var("PRACTICUM_JWT_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ => {
                warn!(target: "startup", "PRACTICUM_JWT_SECRET not set; using the built-in development secret");
                d.jwt_secret.clone()
            }
        };
        if jwt_secret.len() < 32 {
            warn!(target: "startup", "jwt secret is shorter than 32 bytes");
        }
        Self {
            http_port: env_parse("PRACTICUM_HTTP_PORT", d.http_port),
            jwt_secret,
            access_ttl_secs: env_parse("PRACTICUM_ACCESS_TTL_SECS", d.access_ttl_secs),
            refresh_ttl_secs: env_parse("PRACTICUM_REFRESH_TTL_SECS", d.refresh_ttl_secs),
            audio_threshold: env_parse("PRACTICUM_AUDIO_THRESHOLD", d.audio_threshold),
            sweep_interval_secs: env_parse("PRACTICUM_SWEEP_INTERVAL_SECS", d.sweep_interval_secs),
            seed_file: std::env::var("PRACTICUM_SEED_FILE").ok().filter(|s| !s.is_empty()).map(PathBuf::from),
            admin_password: std::env::var("PRACTICUM_ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=1.0).contains(&self.audio_threshold) {
            return Err(AppError::invalid(format!("audio_threshold {} outside [0, 1]", self.audio_threshold)));
        }
        if self.access_ttl_secs == 0 || self.refresh_ttl_secs == 0 {
            return Err(AppError::invalid("token lifetimes must be positive"));
        }
        if self.access_ttl_secs > MAX_TTL_SECS || self.refresh_ttl_secs > MAX_TTL_SECS {
            return Err(AppError::invalid(format!("token lifetimes must not exceed {} seconds", MAX_TTL_SECS)));
        }
        if self.jwt_secret.is_empty() {
            return Err(AppError::invalid("jwt secret must not be empty"));
        }
        Ok(())
    }

    pub fn access_ttl(&self) -> Duration { Duration::from_secs(self.access_ttl_secs) }
    pub fn refresh_ttl(&self) -> Duration { Duration::from_secs(self.refresh_ttl_secs) }
    pub fn sweep_interval(&self) -> Duration { Duration::from_secs(self.sweep_interval_secs.max(1)) }
}
