//! Runtime configuration.
//!
//! Values come from an optional JSON config file and are overridden by CLI
//! flags in the binary. Field names match the JSON keys the logger has
//! always accepted, so existing `config.json` files keep working.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::scale::registers::{DEFAULT_ADDR, DEFAULT_BUS};

/// I2C address as it appears in config: either a number or a string like
/// `"0x26"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Addr {
    Number(u8),
    Text(String),
}

impl Addr {
    pub fn resolve(&self) -> Result<u8> {
        match self {
            Addr::Number(n) => Ok(*n),
            Addr::Text(s) => parse_addr(s),
        }
    }
}

/// Parses a bus address given as hex (`0x26`) or decimal (`38`).
pub fn parse_addr(s: &str) -> Result<u8> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.with_context(|| format!("invalid i2c address: {s}"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for the daily CSV files.
    pub data_dir: PathBuf,
    /// Linux I2C bus number (`/dev/i2c-N`).
    pub bus: u8,
    pub addr: Addr,
    /// Seconds between samples.
    pub interval: f64,
    /// Optional name tag mixed into the file name.
    pub name: String,
    /// Echo each row to stdout.
    pub print: bool,
    /// Tare once on startup. Off by default: risky for services if a load
    /// is already present, and the button tare is always active anyway.
    pub tare_on_start: bool,
    /// If set, write this GAP (counts per gram) on startup.
    pub gap: Option<f32>,
    /// If true, apply the three filter values below on startup.
    pub set_filters: bool,
    pub lp_filter_enabled: u8,
    pub avg_filter_level: u8,
    pub ema_filter_alpha: u8,
    /// Multiplier for both weight encodings (-1.0 for inverted wiring).
    pub sign: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            bus: DEFAULT_BUS,
            addr: Addr::Number(DEFAULT_ADDR),
            interval: 1.0,
            name: String::new(),
            print: false,
            tare_on_start: false,
            gap: None,
            set_filters: false,
            lp_filter_enabled: 1,
            avg_filter_level: 10,
            ema_filter_alpha: 10,
            sign: 1.0,
        }
    }
}

impl Config {
    /// Loads the JSON config file, or defaults when no path is given.
    /// Missing keys fall back to their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn device_path(&self) -> String {
        format!("/dev/i2c-{}", self.bus)
    }

    pub fn address(&self) -> Result<u8> {
        self.addr.resolve()
    }

    pub fn sample_interval(&self) -> Result<Duration> {
        if !(self.interval > 0.0) {
            bail!("sample interval must be positive, got {}", self.interval);
        }
        Ok(Duration::from_secs_f64(self.interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_contract() {
        let config = Config::default();
        assert_eq!(config.address().unwrap(), 0x26);
        assert_eq!(config.device_path(), "/dev/i2c-1");
        assert_eq!(config.sample_interval().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn addr_accepts_hex_and_decimal() {
        assert_eq!(parse_addr("0x26").unwrap(), 0x26);
        assert_eq!(parse_addr("0X26").unwrap(), 0x26);
        assert_eq!(parse_addr("38").unwrap(), 38);
        assert!(parse_addr("zz").is_err());
        assert!(parse_addr("0x100").is_err());
    }

    #[test]
    fn json_addr_may_be_string_or_number() {
        let config: Config = serde_json::from_str(r#"{"addr": "0x27"}"#).unwrap();
        assert_eq!(config.address().unwrap(), 0x27);
        let config: Config = serde_json::from_str(r#"{"addr": 40}"#).unwrap();
        assert_eq!(config.address().unwrap(), 40);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_keys() {
        let config: Config =
            serde_json::from_str(r#"{"interval": 0.5, "name": "scaleA", "sign": -1.0}"#).unwrap();
        assert_eq!(config.interval, 0.5);
        assert_eq!(config.name, "scaleA");
        assert_eq!(config.sign, -1.0);
        assert_eq!(config.bus, DEFAULT_BUS);
        assert_eq!(config.avg_filter_level, 10);
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let mut config = Config::default();
        config.interval = 0.0;
        assert!(config.sample_interval().is_err());
        config.interval = -2.0;
        assert!(config.sample_interval().is_err());
    }
}
