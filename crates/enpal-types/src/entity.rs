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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ============= Sensor Classification =============

/// Device class of a sensor entity, as understood by the host framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Power,
    Energy,
    Temperature,
    Frequency,
    Current,
    Voltage,
    Battery,
}

impl DeviceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Energy => "energy",
            Self::Temperature => "temperature",
            Self::Frequency => "frequency",
            Self::Current => "current",
            Self::Voltage => "voltage",
            Self::Battery => "battery",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State class of a sensor entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    #[default]
    Measurement,
    /// Counter that only grows, except at its reset boundary
    TotalIncreasing,
}

impl StateClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Measurement => "measurement",
            Self::TotalIncreasing => "total_increasing",
        }
    }
}

// ============= Entity State =============

/// Current native value of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Device every entity of the installation is grouped under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// (domain, id) pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub sw_version: String,
    /// Service devices have no physical hardware behind them
    pub entry_type: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            identifiers: vec![("enpal".to_owned(), "enpal".to_owned())],
            name: "Enpal Solar Installation".to_owned(),
            manufacturer: "Enpal".to_owned(),
            sw_version: crate::VERSION.to_owned(),
            entry_type: "service".to_owned(),
        }
    }
}

/// Snapshot of one entity as published to the host framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub unique_id: String,
    /// Host-side id, e.g. `sensor.solar_production`
    pub entity_id: String,
    pub name: String,
    pub icon: String,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub unit: Option<String>,
    /// `None` renders as "unavailable" on the host
    pub native_value: Option<NativeValue>,
    pub attributes: BTreeMap<String, Value>,
    pub device: DeviceInfo,
}

impl EntityState {
    /// State string as the host framework displays it
    pub fn state_string(&self) -> String {
        self.native_value
            .as_ref()
            .map_or_else(|| "unavailable".to_owned(), ToString::to_string)
    }
}

/// Derive a host entity id fragment from a display name
/// ("AC Power Phase 1" -> "ac_power_phase_1")
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}
