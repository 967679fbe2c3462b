use std::env;
use std::time::Duration;

use anyhow::Context;

use crate::models::ChannelLatencies;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub reminder_scan_interval: Duration,
    pub reminder_window_hours: i64,
    pub clinic_utc_offset_minutes: i32,
    pub latencies: ChannelLatencies,
    pub sender_name: String,
    pub api_token_sha256: Option<String>,
    pub seed_demo_data: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:7001".to_string());

        let scan_secs: u64 = parse_var("REMINDER_SCAN_INTERVAL_SECS", 1800)?;
        if scan_secs == 0 {
            anyhow::bail!("REMINDER_SCAN_INTERVAL_SECS must be greater than zero");
        }

        let reminder_window_hours: i64 = parse_var("REMINDER_WINDOW_HOURS", 24)?;
        if reminder_window_hours <= 0 {
            anyhow::bail!("REMINDER_WINDOW_HOURS must be greater than zero");
        }

        let clinic_utc_offset_minutes: i32 = parse_var("CLINIC_UTC_OFFSET_MINUTES", 0)?;
        if clinic_utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("CLINIC_UTC_OFFSET_MINUTES must be within one day");
        }

        let latencies = ChannelLatencies {
            whatsapp: Duration::from_millis(parse_var("WHATSAPP_LATENCY_MS", 1000)?),
            sms: Duration::from_millis(parse_var("SMS_LATENCY_MS", 500)?),
            email: Duration::from_millis(parse_var("EMAIL_LATENCY_MS", 800)?),
        };

        let sender_name = env::var("SENDER_NAME").unwrap_or_else(|_| "GrandPro HMSO".to_string());

        let api_token_sha256 = env::var("CRM_API_TOKEN_SHA256")
            .ok()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty());

        // Demo rows only make sense for the in-memory store.
        let seed_demo_data = database_url.is_none() && parse_bool(env::var("SEED_DEMO_DATA").ok(), true)?;

        Ok(Self {
            database_url,
            bind_addr,
            reminder_scan_interval: Duration::from_secs(scan_secs),
            reminder_window_hours,
            clinic_utc_offset_minutes,
            latencies,
            sender_name,
            api_token_sha256,
            seed_demo_data,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, default: bool) -> anyhow::Result<bool> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("invalid boolean value: {other:?}"),
    }
}
