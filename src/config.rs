use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://www.solarprognose.de/web/solarprediction/api/v1";

#[derive(Debug, Clone)]
pub struct Config {
    /// Fully resolved endpoint URL, query parameters included.
    pub api_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub http_bind: String,
    pub counter_state_path: Option<PathBuf>,
    pub timezone: Tz,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_url = match env_optional("SOLAR_API_URL") {
            Some(raw) => {
                Url::parse(&raw).context("invalid SOLAR_API_URL")?;
                raw
            }
            None => {
                let base = env_string("SOLAR_API_BASE_URL", Some(DEFAULT_API_BASE_URL.to_string()))?;
                let token = env_optional("SOLAR_API_TOKEN").ok_or_else(|| {
                    anyhow!("missing env var SOLAR_API_TOKEN (or a full SOLAR_API_URL override)")
                })?;
                build_api_url(&base, &token)?
            }
        };

        let poll_interval =
            Duration::from_secs(env_u64("SOLAR_POLL_INTERVAL_MINUTES", Some(150))? * 60);
        let request_timeout =
            Duration::from_secs(env_u64("SOLAR_HTTP_TIMEOUT_SECONDS", Some(20))?);
        let http_bind = env_string("SOLAR_HTTP_BIND", Some("127.0.0.1:9114".to_string()))?;
        let counter_state_path = env_optional("SOLAR_COUNTER_STATE_PATH").map(PathBuf::from);
        let timezone = resolve_timezone(env_optional("SOLAR_TIMEZONE"))?;

        Ok(Self {
            api_url,
            poll_interval,
            request_timeout,
            http_bind,
            counter_state_path,
            timezone,
        })
    }
}

pub fn build_api_url(base: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(base).context("invalid SOLAR_API_BASE_URL")?;
    url.query_pairs_mut()
        .append_pair("access-token", token)
        .append_pair("type", "hourly")
        .append_pair("_format", "json");
    Ok(url.to_string())
}

fn resolve_timezone(requested: Option<String>) -> Result<Tz> {
    if let Some(name) = requested {
        return name
            .parse::<Tz>()
            .map_err(|_| anyhow!("invalid SOLAR_TIMEZONE {name}"));
    }
    match iana_time_zone::get_timezone() {
        Ok(name) => match name.parse::<Tz>() {
            Ok(tz) => Ok(tz),
            Err(_) => {
                tracing::warn!(timezone = %name, "system timezone not recognized, falling back to UTC");
                Ok(Tz::UTC)
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "could not determine system timezone, falling back to UTC");
            Ok(Tz::UTC)
        }
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
