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

use crate::config_flow::{validate_ipv4, validate_ipv6};
use crate::errors::ReadingError;
use crate::traits::{IpFamily, PublicIpSource};
use chrono::{DateTime, Utc};
use enpal_types::{DeviceInfo, EntityState, NativeValue};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

/// Public addresses change rarely
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Text sensor holding the installation's public address
#[derive(Debug, Clone)]
pub struct PublicIpSensor {
    family: IpFamily,
    native_value: Option<String>,
    last_checked: Option<DateTime<Utc>>,
}

impl PublicIpSensor {
    pub fn new(family: IpFamily) -> Self {
        Self {
            family,
            native_value: None,
            last_checked: None,
        }
    }

    pub fn unique_id(&self) -> &'static str {
        match self.family {
            IpFamily::V4 => "enpal_public_ipv4",
            IpFamily::V6 => "enpal_public_ipv6",
        }
    }

    pub fn native_value(&self) -> Option<&str> {
        self.native_value.as_deref()
    }

    /// Due once the last check is within `tolerance` of [`DEFAULT_INTERVAL`]
    pub fn is_due(&self, now: DateTime<Utc>, tolerance: Duration) -> bool {
        self.last_checked.is_none_or(|last| {
            (now - last)
                .to_std()
                .is_ok_and(|elapsed| elapsed + tolerance >= DEFAULT_INTERVAL)
        })
    }

    pub async fn refresh(
        &mut self,
        source: &dyn PublicIpSource,
        now: DateTime<Utc>,
    ) -> Result<String, ReadingError> {
        self.last_checked = Some(now);
        let result = match source.lookup(self.family).await {
            Ok(address) => self.accept(address),
            Err(e) => Err(ReadingError::Transport {
                key: self.unique_id().to_owned(),
                message: format!("{e:#}"),
            }),
        };

        match &result {
            Ok(address) => self.native_value = Some(address.clone()),
            Err(_) => self.native_value = None,
        }
        result
    }

    /// A v6 lookup on a v4-only network answers with the v4 address; that is accepted
    fn accept(&self, address: String) -> Result<String, ReadingError> {
        let address = address.trim().to_owned();
        let valid = match self.family {
            IpFamily::V4 => validate_ipv4(&address),
            IpFamily::V6 => validate_ipv6(&address) || validate_ipv4(&address),
        };
        if valid {
            Ok(address)
        } else {
            Err(ReadingError::InvalidAddress(address))
        }
    }

    pub fn entity_state(&self) -> EntityState {
        let mut attributes = BTreeMap::new();
        if let Some(checked) = self.last_checked {
            attributes.insert("last_check".to_owned(), json!(checked.to_rfc3339()));
        }
        let (name, entity_id) = match self.family {
            IpFamily::V4 => ("Public IPv4", "sensor.public_ipv4"),
            IpFamily::V6 => ("Public IPv6", "sensor.public_ipv6"),
        };

        EntityState {
            unique_id: self.unique_id().to_owned(),
            entity_id: entity_id.to_owned(),
            name: name.to_owned(),
            icon: "mdi:ip-network".to_owned(),
            device_class: None,
            state_class: None,
            unit: None,
            native_value: self.native_value.clone().map(NativeValue::Text),
            attributes,
            device: DeviceInfo::default(),
        }
    }
}
