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

//! Setup and options steps: validate a candidate database connection before it is stored.

use crate::errors::FormError;
use crate::traits::ConnectionProber;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_HOST_IP: &str = "192.168.178.";
pub const DEFAULT_PORT: u32 = 8086;
pub const MIN_PORT: u32 = 300;
pub const MAX_PORT: u32 = 65_535;
/// A working token sees more series than this in the probe window
pub const MIN_PROBE_SERIES: usize = 10;
pub const ENTRY_TITLE: &str = "Enpal";

/// Four dot separated decimal octets, each 0..=255
pub fn validate_ipv4(s: &str) -> bool {
    let octets: Vec<&str> = s.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            !octet.is_empty()
                && octet.bytes().all(|b| b.is_ascii_digit())
                && octet.parse::<u32>().is_ok_and(|n| n <= 255)
        })
}

/// 5 to 8 colon separated groups of at most four hex digits, `::` at most once
pub fn validate_ipv6(s: &str) -> bool {
    let groups: Vec<&str> = s.split(':').collect();
    (5..=8).contains(&groups.len())
        && s.matches("::").count() <= 1
        && groups
            .iter()
            .all(|group| group.len() <= 4 && group.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Connection settings of one installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    #[serde(rename = "enpal_host_ip")]
    pub host_ip: String,
    #[serde(rename = "enpal_host_port")]
    pub host_port: u32,
    #[serde(rename = "enpal_token")]
    pub token: String,
}

impl Default for EntryData {
    fn default() -> Self {
        Self {
            host_ip: DEFAULT_HOST_IP.to_owned(),
            host_port: DEFAULT_PORT,
            token: String::new(),
        }
    }
}

/// Partial settings, as given to the options step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    #[serde(rename = "enpal_host_ip", skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(rename = "enpal_host_port", skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u32>,
    #[serde(rename = "enpal_token", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl EntryOptions {
    pub fn is_empty(&self) -> bool {
        self.host_ip.is_none() && self.host_port.is_none() && self.token.is_none()
    }

    /// `base` with every set option applied on top
    pub fn overlay(&self, base: &EntryData) -> EntryData {
        EntryData {
            host_ip: self.host_ip.clone().unwrap_or_else(|| base.host_ip.clone()),
            host_port: self.host_port.unwrap_or(base.host_port),
            token: self.token.clone().unwrap_or_else(|| base.token.clone()),
        }
    }
}

impl From<EntryData> for EntryOptions {
    fn from(data: EntryData) -> Self {
        Self {
            host_ip: Some(data.host_ip),
            host_port: Some(data.host_port),
            token: Some(data.token),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    User,
    Init,
}

/// Outcome of one flow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResult {
    CreateEntry { title: String, data: EntryData },
    ShowForm {
        step_id: StepId,
        defaults: EntryData,
        error: Option<FormError>,
    },
}

/// Offline form checks. All checks run; the last failing one is reported.
pub fn check_form(input: &EntryData) -> Option<FormError> {
    let mut error = None;
    if !validate_ipv4(&input.host_ip) {
        error = Some(FormError::InvalidIp);
    }
    if input.host_port < MIN_PORT {
        error = Some(FormError::PortTooLow);
    }
    if input.host_port > MAX_PORT {
        error = Some(FormError::PortTooHigh);
    }
    if input.token.is_empty() {
        error = Some(FormError::TokenEmpty);
    }
    error
}

/// Form checks followed by the two network probes
pub async fn validate(input: &EntryData, prober: &dyn ConnectionProber) -> Result<(), FormError> {
    if let Some(error) = check_form(input) {
        return Err(error);
    }

    match prober.health(&input.host_ip, input.host_port).await {
        Ok(true) => {}
        Ok(false) => return Err(FormError::DbNotFound),
        Err(e) => {
            warn!(
                "⚠️ [SETUP] Health check of {}:{} failed: {e:#}",
                input.host_ip, input.host_port
            );
            return Err(FormError::DbNotFound);
        }
    }

    match prober
        .probe_series_count(&input.host_ip, input.host_port, &input.token)
        .await
    {
        Ok(count) if count > MIN_PROBE_SERIES => Ok(()),
        Ok(count) => {
            warn!("⚠️ [SETUP] Probe query returned only {count} series");
            Err(FormError::TokenInvalid)
        }
        Err(e) => {
            warn!("⚠️ [SETUP] Probe query failed: {e:#}");
            Err(FormError::TokenInvalid)
        }
    }
}

pub struct ConfigFlow<'a> {
    prober: &'a dyn ConnectionProber,
}

impl<'a> ConfigFlow<'a> {
    pub fn new(prober: &'a dyn ConnectionProber) -> Self {
        Self { prober }
    }

    /// First-time setup. `None` shows the empty form.
    pub async fn step_user(&self, input: Option<EntryData>) -> FlowResult {
        let Some(input) = input else {
            return FlowResult::ShowForm {
                step_id: StepId::User,
                defaults: EntryData::default(),
                error: None,
            };
        };

        match validate(&input, self.prober).await {
            Ok(()) => {
                info!(
                    "✅ [SETUP] Database at {}:{} accepted",
                    input.host_ip, input.host_port
                );
                FlowResult::CreateEntry {
                    title: ENTRY_TITLE.to_owned(),
                    data: input,
                }
            }
            Err(error) => FlowResult::ShowForm {
                step_id: StepId::User,
                defaults: input,
                error: Some(error),
            },
        }
    }

    /// Reconfigure an existing entry. Form defaults are the entry's data with
    /// its options applied on top.
    pub async fn step_options(
        &self,
        data: &EntryData,
        options: &EntryOptions,
        input: Option<EntryData>,
    ) -> FlowResult {
        let Some(input) = input else {
            return FlowResult::ShowForm {
                step_id: StepId::Init,
                defaults: options.overlay(data),
                error: None,
            };
        };

        match validate(&input, self.prober).await {
            Ok(()) => FlowResult::CreateEntry {
                title: ENTRY_TITLE.to_owned(),
                data: input,
            },
            Err(error) => FlowResult::ShowForm {
                step_id: StepId::Init,
                defaults: input,
                error: Some(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProber {
        healthy: bool,
        series: usize,
        calls: AtomicUsize,
    }

    impl FakeProber {
        fn new(healthy: bool, series: usize) -> Self {
            Self {
                healthy,
                series,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ConnectionProber for FakeProber {
        async fn health(&self, _ip: &str, _port: u32) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.healthy)
        }

        async fn probe_series_count(
            &self,
            _ip: &str,
            _port: u32,
            _token: &str,
        ) -> anyhow::Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.series)
        }
    }

    fn input(ip: &str, port: u32, token: &str) -> EntryData {
        EntryData {
            host_ip: ip.to_owned(),
            host_port: port,
            token: token.to_owned(),
        }
    }

    #[test]
    fn test_validate_ipv4() {
        assert!(validate_ipv4("192.168.0.1"));
        assert!(validate_ipv4("123.123.123.123"));
        assert!(!validate_ipv4("300.0.0.1"));
        assert!(!validate_ipv4("300.0.0.-1"));
        assert!(!validate_ipv4("2001:0db8:85a3:0000:0000:8a2e:0370:7334"));
        assert!(!validate_ipv4("1.2.3"));
        assert!(!validate_ipv4("1.2.3.4.5"));
        assert!(!validate_ipv4("abc.def.ghi.jkl"));
        assert!(!validate_ipv4("192.168.abc.def"));
        assert!(!validate_ipv4("192.168.178."));
        assert!(!validate_ipv4(""));
    }

    #[test]
    fn test_validate_ipv6() {
        assert!(validate_ipv6("2001:db8::2:1"));
        assert!(!validate_ipv6("2001::2:1"));
        assert!(validate_ipv6("2001:0db8:85a3:0000:0000:8a2e:0370:7334"));
        assert!(!validate_ipv6("2001:0db8:85a3:00000:0000:8a2e:0370:7334"));
        assert!(!validate_ipv6("2001:0db8:85a3:0000:0000:8a2e:0370:ghij"));
        assert!(!validate_ipv6("2001:db8::1::2"));
        assert!(!validate_ipv6("300.0.0.1"));
        assert!(!validate_ipv6("192.168.0.1"));
        assert!(!validate_ipv6("1.2.3.4.5"));
        assert!(!validate_ipv6(""));
    }

    #[test]
    fn test_form_checks_report_last_failure() {
        assert_eq!(check_form(&input("192.168.178.50", 8086, "t")), None);
        assert_eq!(check_form(&input("nope", 8086, "t")), Some(FormError::InvalidIp));
        assert_eq!(check_form(&input("192.168.178.50", 299, "t")), Some(FormError::PortTooLow));
        assert_eq!(check_form(&input("192.168.178.50", 65_536, "t")), Some(FormError::PortTooHigh));
        assert_eq!(check_form(&input("192.168.178.50", 8086, "")), Some(FormError::TokenEmpty));
        // Several failures: the later check wins
        assert_eq!(check_form(&input("nope", 10, "")), Some(FormError::TokenEmpty));
        assert_eq!(check_form(&input("nope", 10, "t")), Some(FormError::PortTooLow));
    }

    #[tokio::test]
    async fn test_form_errors_skip_network_probes() {
        let prober = FakeProber::new(true, 50);
        let result = validate(&input("1.2.3", 8086, "t"), &prober).await;
        assert_eq!(result, Err(FormError::InvalidIp));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_database() {
        let prober = FakeProber::new(false, 50);
        let result = validate(&input("192.168.178.50", 8086, "t"), &prober).await;
        assert_eq!(result, Err(FormError::DbNotFound));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_needs_more_than_ten_series() {
        let prober = FakeProber::new(true, 10);
        let result = validate(&input("192.168.178.50", 8086, "t"), &prober).await;
        assert_eq!(result, Err(FormError::TokenInvalid));

        let prober = FakeProber::new(true, 11);
        assert_eq!(validate(&input("192.168.178.50", 8086, "t"), &prober).await, Ok(()));
    }

    #[tokio::test]
    async fn test_user_step_creates_entry() {
        let prober = FakeProber::new(true, 42);
        let flow = ConfigFlow::new(&prober);

        let FlowResult::ShowForm { step_id, defaults, error } = flow.step_user(None).await else {
            panic!("expected empty form");
        };
        assert_eq!(step_id, StepId::User);
        assert_eq!(defaults.host_ip, DEFAULT_HOST_IP);
        assert_eq!(defaults.host_port, DEFAULT_PORT);
        assert_eq!(error, None);

        let data = input("192.168.178.50", 8086, "secret");
        assert_eq!(
            flow.step_user(Some(data.clone())).await,
            FlowResult::CreateEntry {
                title: "Enpal".to_owned(),
                data
            }
        );
    }

    #[tokio::test]
    async fn test_options_step_defaults_prefer_options() {
        let prober = FakeProber::new(true, 42);
        let flow = ConfigFlow::new(&prober);
        let data = input("192.168.178.50", 8086, "old");
        let options = EntryOptions {
            token: Some("new".to_owned()),
            ..EntryOptions::default()
        };

        let FlowResult::ShowForm { step_id, defaults, .. } =
            flow.step_options(&data, &options, None).await
        else {
            panic!("expected form");
        };
        assert_eq!(step_id, StepId::Init);
        assert_eq!(defaults, input("192.168.178.50", 8086, "new"));

        let bad = input("192.168.178.50", 80, "new");
        let FlowResult::ShowForm { error, .. } =
            flow.step_options(&data, &options, Some(bad)).await
        else {
            panic!("expected form with error");
        };
        assert_eq!(error, Some(FormError::PortTooLow));
    }

    #[test]
    fn test_entry_data_uses_entry_keys() {
        let json = serde_json::to_value(input("10.0.0.2", 8086, "x")).unwrap();
        assert_eq!(json["enpal_host_ip"], "10.0.0.2");
        assert_eq!(json["enpal_host_port"], 8086);
        assert_eq!(json["enpal_token"], "x");
    }
}
