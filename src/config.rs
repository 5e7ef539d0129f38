use chrono::{FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use std::{env, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PORT '{0}'")]
    Port(String),

    #[error("invalid APP_UTC_OFFSET '{0}', expected +HH:MM or -HH:MM")]
    UtcOffset(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_path: PathBuf,
    pub utc_offset: FixedOffset,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(value) => value.parse::<u16>().map_err(|_| ConfigError::Port(value))?,
            Err(_) => 8080,
        };

        let data_path = env::var("APP_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/state.json"));

        let utc_offset = match env::var("APP_UTC_OFFSET") {
            Ok(value) => parse_offset(&value)?,
            Err(_) => utc(),
        };

        Ok(Self {
            port,
            data_path,
            utc_offset,
        })
    }
}

/// Calendar in the reference timezone all dates are bucketed by.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    offset: FixedOffset,
}

impl Clock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    pub fn time_now(&self) -> NaiveTime {
        Utc::now().with_timezone(&self.offset).time()
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

const MAX_OFFSET_SECS: i32 = 14 * 3600;

pub fn parse_offset(value: &str) -> Result<FixedOffset, ConfigError> {
    let offset = value
        .trim()
        .parse::<FixedOffset>()
        .map_err(|_| ConfigError::UtcOffset(value.to_string()))?;
    if offset.local_minus_utc().abs() > MAX_OFFSET_SECS {
        return Err(ConfigError::UtcOffset(value.to_string()));
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signed_offsets() {
        assert_eq!(parse_offset("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_offset("-08:00").unwrap().local_minus_utc(), -28_800);
        assert_eq!(parse_offset("+00:00").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn rejects_malformed_offsets() {
        assert!(parse_offset("05:00").is_err());
        assert!(parse_offset("+-05:00").is_err());
        assert!(parse_offset("+15:00").is_err());
        assert!(parse_offset("utc").is_err());
    }
}
