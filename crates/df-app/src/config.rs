use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use log::debug;
use crate::error::AppError;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    pub poll_interval: Duration,
    /// Unset means poll until the backend reports a terminal status.
    pub poll_timeout: Option<Duration>,
    pub output_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_timeout: None,
            output_dir: PathBuf::from("outputs"),
            viewport_width: 800,
            viewport_height: 600,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => return Err(e.into()),
        }

        Ok(Self::from_lookup(|key| env::var(key).ok())?)
    }

    /// Builds a config from a key lookup, falling back to defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend_url = lookup("DF_BACKEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.backend_url);

        let poll_interval = parse::<u64>(&lookup, "DF_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        if poll_interval.is_zero() {
            return Err(AppError::Config {
                key: "DF_POLL_INTERVAL_MS".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let poll_timeout = parse::<u64>(&lookup, "DF_POLL_TIMEOUT_SECS")?.map(Duration::from_secs);

        let output_dir = lookup("DF_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let viewport_width = parse(&lookup, "DF_VIEWPORT_WIDTH")?.unwrap_or(defaults.viewport_width);
        let viewport_height = parse(&lookup, "DF_VIEWPORT_HEIGHT")?.unwrap_or(defaults.viewport_height);

        Ok(Self {
            backend_url,
            poll_interval,
            poll_timeout,
            output_dir,
            viewport_width,
            viewport_height,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| AppError::Config {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
