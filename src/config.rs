use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, bail};
use chrono::NaiveTime;
use dotenvy::dotenv;
use strum_macros::{Display, EnumString};

use crate::engine::AttendanceSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StorageBackend {
    Mysql,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,

    pub api_prefix: String,
    pub rate_per_min: u32,

    pub dashboard_cache_ttl: Duration,
    pub dashboard_cache_capacity: u64,

    pub attendance: AttendanceSettings,

    pub log_dir: String,
    pub log_level: String,
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}")),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let storage_backend = var_or("STORAGE_BACKEND", StorageBackend::Mysql)?;
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if storage_backend == StorageBackend::Mysql && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORAGE_BACKEND=mysql");
        }

        let defaults = AttendanceSettings::default();
        let start_time = match env::var("ATTENDANCE_START_TIME") {
            Ok(raw) if !raw.trim().is_empty() => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .with_context(|| format!("ATTENDANCE_START_TIME={raw:?} is not HH:MM"))?,
            _ => defaults.start_time,
        };
        let half_day_hours: f64 = var_or("HALF_DAY_HOURS", defaults.half_day_hours)?;
        if !(half_day_hours > 0.0 && half_day_hours < 24.0) {
            bail!("HALF_DAY_HOURS must be between 0 and 24, got {half_day_hours}");
        }

        Ok(Self {
            server_addr: env::var("SERVER_ADDR").context("SERVER_ADDR must be set")?,
            storage_backend,
            database_url,
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout: Duration::from_secs(var_or("DB_ACQUIRE_TIMEOUT_SECS", 5)?),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            rate_per_min: var_or("RATE_PER_MIN", 1000)?,

            dashboard_cache_ttl: Duration::from_secs(var_or("DASHBOARD_CACHE_TTL_SECS", 300)?),
            dashboard_cache_capacity: var_or("DASHBOARD_CACHE_CAPACITY", 10_000)?,

            attendance: AttendanceSettings {
                start_time,
                grace_minutes: var_or("GRACE_PERIOD_MINUTES", defaults.grace_minutes)?,
                half_day_hours,
                ..defaults
            },

            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
