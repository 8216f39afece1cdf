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

//! Battery state-of-charge estimation from production and consumption power.
//!
//! The installation does not report its battery charge, so it is integrated
//! from the net power flow over wall-clock time.

use crate::errors::ReadingError;
use chrono::{DateTime, Utc};
use enpal_types::{BatteryState, DeviceClass, DeviceInfo, EntityState, NativeValue, StateClass};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

pub const ESTIMATE_UNIQUE_ID: &str = "enpal_battery_capacity_estimate";
pub const ENERGY_IN_UNIQUE_ID: &str = "enpal_battery_energy_in";
pub const ENERGY_OUT_UNIQUE_ID: &str = "enpal_battery_energy_out";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Inputs and intermediates of the last successful update, exposed as attributes
#[derive(Debug, Clone, Copy, PartialEq)]
struct LastComputation {
    production_w: f64,
    consumption_w: f64,
    change_kw: f64,
    change_kwh: f64,
}

/// Sole writer of the installation's [`BatteryState`]
#[derive(Debug, Clone)]
pub struct BatteryEstimator {
    max_capacity_kwh: f64,
    state: BatteryState,
    native_value: Option<f64>,
    last_checked: Option<DateTime<Utc>>,
    last_computation: Option<LastComputation>,
}

impl BatteryEstimator {
    /// `initial` is clamped into `[0, max_capacity_kwh]`
    pub fn new(max_capacity_kwh: f64, initial: BatteryState) -> Self {
        let max_capacity_kwh = max_capacity_kwh.max(0.0);
        let state = BatteryState {
            capacity_kwh: initial.capacity_kwh.clamp(0.0, max_capacity_kwh),
            ..initial
        };
        Self {
            max_capacity_kwh,
            state,
            native_value: Some(state.capacity_kwh),
            last_checked: None,
            last_computation: None,
        }
    }

    /// Last committed state
    pub fn state(&self) -> BatteryState {
        self.state
    }

    pub fn native_value(&self) -> Option<f64> {
        self.native_value
    }

    /// Integrate the net power flow since the last update.
    ///
    /// Fails without touching the committed state when either input is
    /// missing or not finite.
    pub fn refresh(
        &mut self,
        production_w: Option<f64>,
        consumption_w: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<BatteryState, ReadingError> {
        self.last_checked = Some(now);

        let (production_w, consumption_w) = match Self::inputs(production_w, consumption_w) {
            Ok(inputs) => inputs,
            Err(e) => {
                self.native_value = None;
                return Err(e);
            }
        };

        let rate_limit_kw = self.max_capacity_kwh / 2.0;
        let change_kw =
            ((production_w - consumption_w) / 1000.0).clamp(-rate_limit_kw, rate_limit_kw);

        // Backwards clock counts as no time passed
        let elapsed_ms = (now - self.state.last_update).num_milliseconds().max(0);
        #[expect(clippy::cast_precision_loss)]
        let change_kwh = change_kw * elapsed_ms as f64 / MILLIS_PER_HOUR;

        let old_capacity = self.state.capacity_kwh;
        let new_capacity = (old_capacity + change_kwh).clamp(0.0, self.max_capacity_kwh);
        let flow = new_capacity - old_capacity;
        let (energy_in_kwh, energy_out_kwh) = if flow > 0.0 { (flow, 0.0) } else { (0.0, flow) };

        self.state = BatteryState {
            capacity_kwh: new_capacity,
            last_update: now.max(self.state.last_update),
            energy_in_kwh,
            energy_out_kwh,
        };
        self.native_value = Some(new_capacity);
        self.last_computation = Some(LastComputation {
            production_w,
            consumption_w,
            change_kw,
            change_kwh,
        });

        debug!(
            "🔋 [BATTERY] {:.3} kWh -> {:.3} kWh ({:+.3} kW over {} ms)",
            old_capacity, new_capacity, change_kw, elapsed_ms
        );

        Ok(self.state)
    }

    fn inputs(
        production_w: Option<f64>,
        consumption_w: Option<f64>,
    ) -> Result<(f64, f64), ReadingError> {
        let production_w =
            production_w.ok_or_else(|| ReadingError::MissingInput("production".to_owned()))?;
        let consumption_w =
            consumption_w.ok_or_else(|| ReadingError::MissingInput("consumption".to_owned()))?;
        for (name, value) in [("production", production_w), ("consumption", consumption_w)] {
            if !value.is_finite() {
                return Err(ReadingError::NonFinite {
                    name: name.to_owned(),
                    value,
                });
            }
        }
        Ok((production_w, consumption_w))
    }

    pub fn entity_state(&self) -> EntityState {
        let mut attributes = BTreeMap::new();
        if let Some(checked) = self.last_checked {
            attributes.insert("last_check".to_owned(), json!(checked.to_rfc3339()));
        }
        if let Some(last) = self.last_computation {
            attributes.insert("power_production".to_owned(), json!(last.production_w));
            attributes.insert("power_consumption".to_owned(), json!(last.consumption_w));
            attributes.insert("battery_change_kw".to_owned(), json!(last.change_kw));
            attributes.insert("battery_change_kwh".to_owned(), json!(last.change_kwh));
        }
        attributes.insert("max_capacity".to_owned(), json!(self.max_capacity_kwh));

        EntityState {
            unique_id: ESTIMATE_UNIQUE_ID.to_owned(),
            entity_id: "sensor.battery_capacity_estimate".to_owned(),
            name: "Battery Capacity Estimate".to_owned(),
            icon: "mdi:home-battery".to_owned(),
            device_class: Some(DeviceClass::Energy),
            state_class: Some(StateClass::Measurement),
            unit: Some("kWh".to_owned()),
            native_value: self.native_value.map(NativeValue::Number),
            attributes,
            device: DeviceInfo::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowDirection {
    In,
    Out,
}

impl FlowDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// Exposes one half of the estimator's last split flow
#[derive(Debug, Clone)]
pub struct BatteryFlowSensor {
    direction: FlowDirection,
    native_value: Option<f64>,
}

impl BatteryFlowSensor {
    pub fn new(direction: FlowDirection) -> Self {
        Self {
            direction,
            native_value: None,
        }
    }

    pub fn unique_id(&self) -> &'static str {
        match self.direction {
            FlowDirection::In => ENERGY_IN_UNIQUE_ID,
            FlowDirection::Out => ENERGY_OUT_UNIQUE_ID,
        }
    }

    pub fn native_value(&self) -> Option<f64> {
        self.native_value
    }

    /// Read the estimator's last commit
    pub fn refresh(&mut self, state: &BatteryState) -> f64 {
        let value = match self.direction {
            FlowDirection::In => state.energy_in_kwh,
            FlowDirection::Out => state.energy_out_kwh,
        };
        self.native_value = Some(value);
        value
    }

    pub fn entity_state(&self) -> EntityState {
        let (name, entity_id, icon) = match self.direction {
            FlowDirection::In => (
                "Battery Energy In",
                "sensor.battery_energy_in",
                "mdi:battery-plus-variant",
            ),
            FlowDirection::Out => (
                "Battery Energy Out",
                "sensor.battery_energy_out",
                "mdi:battery-minus-variant",
            ),
        };

        EntityState {
            unique_id: self.unique_id().to_owned(),
            entity_id: entity_id.to_owned(),
            name: name.to_owned(),
            icon: icon.to_owned(),
            device_class: Some(DeviceClass::Energy),
            state_class: Some(StateClass::Measurement),
            unit: Some("kWh".to_owned()),
            native_value: self.native_value.map(NativeValue::Number),
            attributes: BTreeMap::from([("type".to_owned(), json!(self.direction.as_str()))]),
            device: DeviceInfo::default(),
        }
    }
}
