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

//! Declarative table of every (measurement, field) pair the bridge knows how to expose.
//!
//! Two firmware generations are covered: the legacy German names
//! (`Gesamtleistung/Produktion`, ...) and the newer dotted names under the
//! `inverter`, `system` and `wallbox` measurements. Discovery registers only
//! the entries whose series actually exist in the database.

use crate::plausibility::{Conversion, PlausibilityRule, Precision, Violation};
use enpal_types::{Aggregation, DeviceClass, MetricKey, MetricQuery, StateClass};
use std::time::Duration;

/// Role a reading plays as input of the battery estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Production,
    Consumption,
}

/// Query window of one catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub range_secs: u64,
    pub every_secs: u64,
    pub aggregation: Aggregation,
}

impl Window {
    /// Last value in the past 5 minutes, 2 minute buckets
    pub const LAST_5M: Self = Self {
        range_secs: 5 * 60,
        every_secs: 2 * 60,
        aggregation: Aggregation::Last,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub measurement: &'static str,
    pub field: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub device_class: DeviceClass,
    pub state_class: StateClass,
    pub unit: &'static str,
    pub rule: PlausibilityRule,
    pub conversion: Conversion,
    pub precision: Precision,
    /// Counter restarts at the UTC day boundary
    pub resets_daily: bool,
    pub window: Window,
    /// Own refresh interval, `None` follows the scan interval
    pub interval_secs: Option<u64>,
    pub role: Option<Role>,
}

impl CatalogEntry {
    const fn sensor(
        measurement: &'static str,
        field: &'static str,
        name: &'static str,
        icon: &'static str,
        device_class: DeviceClass,
        unit: &'static str,
    ) -> Self {
        Self {
            measurement,
            field,
            name,
            icon,
            device_class,
            state_class: StateClass::Measurement,
            unit,
            rule: PlausibilityRule::None,
            conversion: Conversion::Identity,
            precision: Precision::TwoDecimals,
            resets_daily: false,
            window: Window::LAST_5M,
            interval_secs: None,
            role: None,
        }
    }

    const fn rule(mut self, rule: PlausibilityRule) -> Self {
        self.rule = rule;
        self
    }

    const fn milli(mut self) -> Self {
        self.conversion = Conversion::Divide(1000.0);
        self
    }

    /// Day counter in kWh, reset at midnight UTC
    const fn daily(mut self) -> Self {
        self.state_class = StateClass::TotalIncreasing;
        self.resets_daily = true;
        self
    }

    /// Lifetime counter, exposed unrounded and guarded against zero readings
    const fn lifetime(mut self) -> Self {
        self.state_class = StateClass::TotalIncreasing;
        self.precision = Precision::Raw;
        self.rule = COUNTER_FLOOR;
        self
    }

    const fn mean_over(mut self, minutes: u64) -> Self {
        self.window = Window {
            range_secs: minutes * 60,
            every_secs: minutes * 60,
            aggregation: Aggregation::Mean,
        };
        self
    }

    const fn every(mut self, secs: u64) -> Self {
        self.interval_secs = Some(secs);
        self
    }

    const fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.measurement, self.field)
    }

    pub fn matches(&self, key: &MetricKey) -> bool {
        key.measurement == self.measurement && key.field == self.field
    }

    pub fn query(&self) -> MetricQuery {
        MetricQuery {
            key: self.key(),
            range: Duration::from_secs(self.window.range_secs),
            every: Duration::from_secs(self.window.every_secs),
            aggregation: self.window.aggregation,
        }
    }
}

const FREQUENCY_RANGE: PlausibilityRule = PlausibilityRule::Range {
    min: 0.0,
    max: 100.0,
    on_violation: Violation::Skip,
};

const TEMPERATURE_RANGE: PlausibilityRule = PlausibilityRule::Range {
    min: -100.0,
    max: 100.0,
    on_violation: Violation::Skip,
};

/// Single connector wallbox never draws more than this (W)
const WALLBOX_POWER_RANGE: PlausibilityRule = PlausibilityRule::Range {
    min: 0.0,
    max: 30_000.0,
    on_violation: Violation::Coerce(0.0),
};

/// Lifetime counters below 1 kWh are transient zero readings, not rollovers
const COUNTER_FLOOR: PlausibilityRule = PlausibilityRule::Floor {
    min: 1.0,
    on_violation: Violation::Skip,
};

use DeviceClass::{Battery, Current, Energy, Frequency, Power, Temperature, Voltage};

pub static CATALOG: &[CatalogEntry] = &[
    // ============= Legacy firmware =============
    CatalogEntry::sensor(
        "Gesamtleistung",
        "Produktion",
        "Solar Production",
        "mdi:solar-power",
        Power,
        "W",
    )
    .role(Role::Production),
    CatalogEntry::sensor(
        "Gesamtleistung",
        "Verbrauch",
        "Power Consumption",
        "mdi:lightning-bolt",
        Power,
        "W",
    )
    .role(Role::Consumption),
    CatalogEntry::sensor(
        "inverterTemperature",
        "Temperature",
        "Inverter Temperature",
        "mdi:thermometer",
        Temperature,
        "°C",
    )
    .rule(TEMPERATURE_RANGE),
    CatalogEntry::sensor(
        "gridFrequency",
        "Frequenz",
        "Grid Frequency",
        "mdi:lightning-bolt",
        Frequency,
        "Hz",
    )
    .rule(FREQUENCY_RANGE),
    CatalogEntry::sensor(
        "phasePowerAc",
        "Phase1",
        "AC Power Phase 1",
        "mdi:lightning-bolt",
        Power,
        "W",
    ),
    CatalogEntry::sensor(
        "phasePowerAc",
        "Phase2",
        "AC Power Phase 2",
        "mdi:lightning-bolt",
        Power,
        "W",
    ),
    CatalogEntry::sensor(
        "phasePowerAc",
        "Phase3",
        "AC Power Phase 3",
        "mdi:lightning-bolt",
        Power,
        "W",
    ),
    CatalogEntry::sensor(
        "productionCurrentDc",
        "String1",
        "DC Current String 1",
        "mdi:solar-power",
        Current,
        "A",
    )
    .milli(),
    CatalogEntry::sensor(
        "productionCurrentDc",
        "String2",
        "DC Current String 2",
        "mdi:solar-power",
        Current,
        "A",
    )
    .milli(),
    CatalogEntry::sensor(
        "productionVoltageDc",
        "String1",
        "DC Voltage String 1",
        "mdi:solar-power",
        Voltage,
        "V",
    ),
    CatalogEntry::sensor(
        "productionVoltageDc",
        "String2",
        "DC Voltage String 2",
        "mdi:solar-power",
        Voltage,
        "V",
    ),
    // ============= Current firmware: inverter =============
    CatalogEntry::sensor(
        "inverter",
        "Power.DC.Total",
        "Solar Power DC",
        "mdi:solar-power",
        Power,
        "W",
    )
    .role(Role::Production),
    CatalogEntry::sensor(
        "inverter",
        "Power.House.Total",
        "House Power",
        "mdi:home-lightning-bolt",
        Power,
        "W",
    )
    .role(Role::Consumption),
    CatalogEntry::sensor(
        "inverter",
        "Power.Grid.Export",
        "Grid Export Power",
        "mdi:transmission-tower-export",
        Power,
        "W",
    ),
    CatalogEntry::sensor(
        "inverter",
        "Power.Battery.Charge.Discharge",
        "Battery Power",
        "mdi:home-battery",
        Power,
        "W",
    ),
    CatalogEntry::sensor(
        "inverter",
        "Energy.Battery.Charge.Level",
        "Battery Level",
        "mdi:battery",
        Battery,
        "%",
    ),
    CatalogEntry::sensor(
        "inverter",
        "Frequency.Grid",
        "Inverter Grid Frequency",
        "mdi:sine-wave",
        Frequency,
        "Hz",
    )
    .rule(FREQUENCY_RANGE),
    CatalogEntry::sensor(
        "inverter",
        "Temperature.Housing.Inside",
        "Inverter Housing Temperature",
        "mdi:thermometer",
        Temperature,
        "°C",
    )
    .rule(TEMPERATURE_RANGE)
    .mean_over(15)
    .every(300),
    CatalogEntry::sensor(
        "inverter",
        "Voltage.Phase.A",
        "Voltage Phase A",
        "mdi:lightning-bolt",
        Voltage,
        "V",
    ),
    CatalogEntry::sensor(
        "inverter",
        "Voltage.Phase.B",
        "Voltage Phase B",
        "mdi:lightning-bolt",
        Voltage,
        "V",
    ),
    CatalogEntry::sensor(
        "inverter",
        "Voltage.Phase.C",
        "Voltage Phase C",
        "mdi:lightning-bolt",
        Voltage,
        "V",
    ),
    CatalogEntry::sensor(
        "inverter",
        "Energy.Production.Total.Day",
        "Solar Energy Today",
        "mdi:solar-power",
        Energy,
        "kWh",
    )
    .daily(),
    CatalogEntry::sensor(
        "inverter",
        "Energy.Consumption.Total.Day",
        "House Energy Today",
        "mdi:home-lightning-bolt",
        Energy,
        "kWh",
    )
    .daily(),
    CatalogEntry::sensor(
        "inverter",
        "Energy.Battery.Charge.Day",
        "Battery Charge Today",
        "mdi:battery-plus-variant",
        Energy,
        "kWh",
    )
    .daily(),
    CatalogEntry::sensor(
        "inverter",
        "Energy.Battery.Discharge.Day",
        "Battery Discharge Today",
        "mdi:battery-minus-variant",
        Energy,
        "kWh",
    )
    .daily(),
    CatalogEntry::sensor(
        "inverter",
        "Energy.Production.Total",
        "Solar Energy Total",
        "mdi:solar-power",
        Energy,
        "kWh",
    )
    .lifetime(),
    // ============= Current firmware: system and wallbox =============
    CatalogEntry::sensor(
        "system",
        "Power.External.Total",
        "Grid Power",
        "mdi:transmission-tower",
        Power,
        "W",
    ),
    CatalogEntry::sensor(
        "wallbox",
        "Power.Wallbox.Connector.1.Charging",
        "Wallbox Charging Power",
        "mdi:ev-station",
        Power,
        "W",
    )
    .rule(WALLBOX_POWER_RANGE)
    .every(20),
    CatalogEntry::sensor(
        "wallbox",
        "Energy.Wallbox.Connector.1.Charged.Total",
        "Wallbox Energy Total",
        "mdi:ev-station",
        Energy,
        "kWh",
    )
    .lifetime(),
];

/// Catalog entry for a series, if the bridge knows it
pub fn lookup(key: &MetricKey) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|entry| entry.matches(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use enpal_types::slugify;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_keys_are_unique() {
        let mut seen = HashSet::new();
        for entry in CATALOG {
            assert!(seen.insert(entry.key()), "duplicate key {}", entry.key());
        }
    }

    #[test]
    fn test_catalog_entity_ids_are_unique() {
        let mut seen = HashSet::new();
        for entry in CATALOG {
            assert!(seen.insert(slugify(entry.name)), "duplicate name {}", entry.name);
        }
    }

    #[test]
    fn test_lookup_legacy_and_current_names() {
        let legacy = lookup(&MetricKey::new("Gesamtleistung", "Produktion")).unwrap();
        assert_eq!(legacy.name, "Solar Production");
        assert_eq!(legacy.role, Some(Role::Production));

        let current = lookup(&MetricKey::new("inverter", "Power.House.Total")).unwrap();
        assert_eq!(current.role, Some(Role::Consumption));

        assert!(lookup(&MetricKey::new("inverter", "Unknown.Field")).is_none());
    }

    #[test]
    fn test_dc_current_is_scaled_from_milliamps() {
        let entry = lookup(&MetricKey::new("productionCurrentDc", "String1")).unwrap();
        assert_eq!(entry.conversion, Conversion::Divide(1000.0));
        assert_eq!(entry.unit, "A");
    }

    #[test]
    fn test_housing_temperature_uses_mean_window() {
        let entry = lookup(&MetricKey::new("inverter", "Temperature.Housing.Inside")).unwrap();
        let query = entry.query();
        assert_eq!(query.aggregation, Aggregation::Mean);
        assert_eq!(query.range, Duration::from_secs(900));
        assert_eq!(entry.interval_secs, Some(300));
    }

    #[test]
    fn test_daily_counters_are_marked() {
        let daily: Vec<_> = CATALOG.iter().filter(|e| e.resets_daily).collect();
        assert!(!daily.is_empty());
        for entry in daily {
            assert_eq!(entry.unit, "kWh");
            assert_eq!(entry.state_class, StateClass::TotalIncreasing);
        }
    }
}
