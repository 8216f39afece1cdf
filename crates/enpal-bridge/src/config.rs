// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Enpal Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod validation;

pub use validation::ValidationResult;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use enpal_core::{BatterySetup, IpFamily, RegistryOptions};
use enpal_types::BatteryState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ADDON_OPTIONS_PATH: &str = "/data/options.json";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Bridge configuration. The gateway connection itself lives in the config
/// entry written by `setup`; this holds everything around it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub influx: InfluxConfig,
    #[serde(default)]
    pub home_assistant: HomeAssistantConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default = "default_org")]
    pub org: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// How far back discovery looks for series (seconds)
    #[serde(default = "default_discovery_window")]
    pub discovery_window_secs: u64,
    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            org: default_org(),
            bucket: default_bucket(),
            discovery_window_secs: default_discovery_window(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Home Assistant connection. Without a URL and token the client falls back
/// to the Supervisor API, then to `HA_BASE_URL` / `HA_TOKEN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    #[serde(default = "default_max_capacity")]
    pub max_capacity_kwh: f64,
    /// Charge assumed on the very first start, defaults to full
    #[serde(default)]
    pub initial_charge_kwh: Option<f64>,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            max_capacity_kwh: default_max_capacity(),
            initial_charge_kwh: None,
        }
    }
}

impl BatteryConfig {
    pub fn initial_charge(&self) -> f64 {
        self.initial_charge_kwh.unwrap_or(self.max_capacity_kwh)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIpConfig {
    #[serde(default = "default_true")]
    pub ipv4: bool,
    #[serde(default = "default_true")]
    pub ipv6: bool,
}

impl Default for PublicIpConfig {
    fn default() -> Self {
        Self {
            ipv4: true,
            ipv6: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_entry_path")]
    pub entry_path: PathBuf,
    #[serde(default)]
    pub public_ip: PublicIpConfig,
    /// Print entity states as JSON lines instead of pushing them to Home Assistant
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            log_level: default_log_level(),
            entry_path: default_entry_path(),
            public_ip: PublicIpConfig::default(),
            dry_run: false,
        }
    }
}

fn default_org() -> String {
    enpal_adapters::influx::DEFAULT_ORG.to_owned()
}

fn default_bucket() -> String {
    enpal_adapters::influx::DEFAULT_BUCKET.to_owned()
}

fn default_discovery_window() -> u64 {
    300
}

fn default_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_capacity() -> f64 {
    10.0
}

fn default_scan_interval() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_entry_path() -> PathBuf {
    PathBuf::from("/data/enpal_entry.json")
}

/// Where a configuration came from, reported once logging is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    AddonOptions,
    File(PathBuf),
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddonOptions => write!(f, "HA addon options"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Environment => write!(f, "defaults with environment overrides"),
        }
    }
}

impl AppConfig {
    /// Load from the add-on options, then `config.toml`, then `config.json`,
    /// falling back to defaults with environment overrides.
    pub fn load() -> Result<(Self, ConfigSource)> {
        if let Ok(options_str) = std::fs::read_to_string(ADDON_OPTIONS_PATH) {
            let config: AppConfig =
                serde_json::from_str(&options_str).context("Failed to parse HA addon options")?;
            config.validate()?;
            return Ok((config, ConfigSource::AddonOptions));
        }

        for candidate in ["config.toml", "config.json"] {
            let path = Path::new(candidate);
            if path.exists() {
                let config = Self::load_from(path)?;
                return Ok((config, ConfigSource::File(path.to_path_buf())));
            }
        }

        let config = Self::from_env();
        config.validate()?;
        Ok((config, ConfigSource::Environment))
    }

    /// Load an explicit file, TOML or JSON by extension
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: AppConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
        };
        config.validate()?;
        Ok(config)
    }

    fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` yields for the known variables
    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(org) = lookup("INFLUX_ORG") {
            config.influx.org = org;
        }
        if let Some(bucket) = lookup("INFLUX_BUCKET") {
            config.influx.bucket = bucket;
        }

        if let Some(url) = lookup("HA_BASE_URL") {
            config.home_assistant.base_url = Some(url);
        }
        if let Some(token) = lookup("HA_TOKEN") {
            config.home_assistant.token = Some(token);
        }

        if let Some(interval) = lookup("SCAN_INTERVAL_SECS")
            && let Ok(secs) = interval.parse::<u64>()
        {
            config.system.scan_interval_secs = secs;
        }

        if let Some(capacity) = lookup("BATTERY_MAX_CAPACITY_KWH")
            && let Ok(kwh) = capacity.parse::<f64>()
        {
            config.battery.max_capacity_kwh = kwh;
        }

        config
    }

    pub fn validate_detailed(&self) -> ValidationResult {
        let mut result = ValidationResult::success();

        if self.influx.org.trim().is_empty() {
            result.add_error("influx.org", "Organisation cannot be empty");
        }
        if self.influx.bucket.trim().is_empty() {
            result.add_error("influx.bucket", "Bucket cannot be empty");
        }
        if self.influx.timeout_secs == 0 {
            result.add_error("influx.timeout_secs", "Timeout must be at least 1 second");
        }
        if self.influx.discovery_window_secs == 0 {
            result.add_error(
                "influx.discovery_window_secs",
                "Discovery window must be at least 1 second",
            );
        }

        let max = self.battery.max_capacity_kwh;
        if !max.is_finite() || max <= 0.0 {
            result.add_error(
                "battery.max_capacity_kwh",
                format!("Must be a positive number of kWh, got {max}"),
            );
        } else if let Some(initial) = self.battery.initial_charge_kwh
            && !(0.0..=max).contains(&initial)
        {
            result.add_error(
                "battery.initial_charge_kwh",
                format!("Must be between 0 and {max} kWh, got {initial}"),
            );
        }

        if self.system.scan_interval_secs == 0 {
            result.add_error(
                "system.scan_interval_secs",
                "Scan interval must be at least 1 second",
            );
        } else if self.system.scan_interval_secs < 10 {
            result.add_warning(
                "system.scan_interval_secs",
                "Intervals below 10 seconds put noticeable load on the gateway",
            );
        }
        if self.influx.timeout_secs >= self.system.scan_interval_secs
            && self.system.scan_interval_secs > 0
        {
            result.add_warning(
                "influx.timeout_secs",
                "Timeout is not shorter than the scan interval, slow rounds will pile up",
            );
        }

        if !LOG_LEVELS.contains(&self.system.log_level.to_lowercase().as_str()) {
            result.add_error(
                "system.log_level",
                format!(
                    "Unknown log level '{}', expected one of {}",
                    self.system.log_level,
                    LOG_LEVELS.join(", ")
                ),
            );
        }
        if self.system.entry_path.as_os_str().is_empty() {
            result.add_error("system.entry_path", "Entry path cannot be empty");
        }

        if !self.home_assistant.enabled && !self.system.dry_run {
            result.add_warning(
                "home_assistant.enabled",
                "Home Assistant is disabled, states will be printed to stdout",
            );
        }

        result
    }

    /// Fails on the first error found by [`Self::validate_detailed`]
    pub fn validate(&self) -> Result<()> {
        let result = self.validate_detailed();
        if let Some(issue) = result.first_error() {
            anyhow::bail!("Invalid configuration: {issue}");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.system.scan_interval_secs)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_secs(self.influx.discovery_window_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.influx.timeout_secs)
    }

    pub fn public_ip_families(&self) -> Vec<IpFamily> {
        let mut families = Vec::new();
        if self.system.public_ip.ipv4 {
            families.push(IpFamily::V4);
        }
        if self.system.public_ip.ipv6 {
            families.push(IpFamily::V6);
        }
        families
    }

    /// Registry options, seeding the battery with `restored` when given
    pub fn registry_options(
        &self,
        restored: Option<BatteryState>,
        now: DateTime<Utc>,
    ) -> RegistryOptions {
        let initial = restored
            .unwrap_or_else(|| BatteryState::seeded(self.battery.initial_charge(), now));
        RegistryOptions {
            battery: BatterySetup {
                max_capacity_kwh: self.battery.max_capacity_kwh,
                initial,
            },
            public_ip: self.public_ip_families(),
        }
    }
}
