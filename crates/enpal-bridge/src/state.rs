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

//! Battery state kept in the config entry's `state` map between runs.

use chrono::{DateTime, Utc};
use enpal_types::BatteryState;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const CHARGE_KEY: &str = "enpal_battery_charge";
pub const LAST_UPDATE_KEY: &str = "enpal_battery_last_update";
pub const ENERGY_IN_KEY: &str = "enpal_battery_energy_in";
pub const ENERGY_OUT_KEY: &str = "enpal_battery_energy_out";

fn number(state: &BTreeMap<String, Value>, key: &str) -> Option<f64> {
    state
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

/// Rebuild the stored battery state, forced back inside its invariants.
///
/// Returns `None` when no charge was stored. A missing or future timestamp
/// becomes `now`, so no energy is integrated over unknown time.
pub fn restore(
    state: &BTreeMap<String, Value>,
    max_capacity_kwh: f64,
    now: DateTime<Utc>,
) -> Option<BatteryState> {
    let charge = number(state, CHARGE_KEY)?;
    let capacity_kwh = charge.clamp(0.0, max_capacity_kwh);
    if (capacity_kwh - charge).abs() > f64::EPSILON {
        warn!(
            "⚠️ [BATTERY] Stored charge {:.2} kWh outside 0..{} kWh, using {:.2}",
            charge, max_capacity_kwh, capacity_kwh
        );
    }

    let last_update = state
        .get(LAST_UPDATE_KEY)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| *t <= now)
        .unwrap_or(now);

    let mut energy_in_kwh = number(state, ENERGY_IN_KEY).unwrap_or(0.0).max(0.0);
    let mut energy_out_kwh = number(state, ENERGY_OUT_KEY).unwrap_or(0.0).min(0.0);
    if energy_in_kwh > 0.0 && energy_out_kwh < 0.0 {
        energy_in_kwh = 0.0;
        energy_out_kwh = 0.0;
    }

    debug!(
        "🔋 [BATTERY] Restored {:.2} kWh last updated {}",
        capacity_kwh, last_update
    );
    Some(BatteryState {
        capacity_kwh,
        last_update,
        energy_in_kwh,
        energy_out_kwh,
    })
}

pub fn store(state: &mut BTreeMap<String, Value>, battery: &BatteryState) {
    state.insert(CHARGE_KEY.to_owned(), json!(battery.capacity_kwh));
    state.insert(
        LAST_UPDATE_KEY.to_owned(),
        json!(battery.last_update.to_rfc3339()),
    );
    state.insert(ENERGY_IN_KEY.to_owned(), json!(battery.energy_in_kwh));
    state.insert(ENERGY_OUT_KEY.to_owned(), json!(battery.energy_out_kwh));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_store_then_restore() {
        let battery = BatteryState {
            capacity_kwh: 6.25,
            last_update: now() - Duration::minutes(2),
            energy_in_kwh: 0.0,
            energy_out_kwh: -0.05,
        };
        let mut state = BTreeMap::new();
        store(&mut state, &battery);

        assert_eq!(state.len(), 4);
        assert_eq!(restore(&state, 10.0, now()), Some(battery));
    }

    #[test]
    fn test_nothing_stored() {
        assert_eq!(restore(&BTreeMap::new(), 10.0, now()), None);
    }

    #[test]
    fn test_charge_clamped_to_capacity() {
        let state = BTreeMap::from([(CHARGE_KEY.to_owned(), json!(14.0))]);
        let battery = restore(&state, 10.0, now()).unwrap();
        assert_eq!(battery.capacity_kwh, 10.0);
        assert_eq!(battery.last_update, now());

        let state = BTreeMap::from([(CHARGE_KEY.to_owned(), json!(-3.0))]);
        assert_eq!(restore(&state, 10.0, now()).unwrap().capacity_kwh, 0.0);
    }

    #[test]
    fn test_future_timestamp_replaced_by_now() {
        let state = BTreeMap::from([
            (CHARGE_KEY.to_owned(), json!(5.0)),
            (
                LAST_UPDATE_KEY.to_owned(),
                json!((now() + Duration::hours(1)).to_rfc3339()),
            ),
        ]);
        assert_eq!(restore(&state, 10.0, now()).unwrap().last_update, now());
    }

    #[test]
    fn test_conflicting_flows_are_dropped() {
        let state = BTreeMap::from([
            (CHARGE_KEY.to_owned(), json!(5.0)),
            (ENERGY_IN_KEY.to_owned(), json!(0.2)),
            (ENERGY_OUT_KEY.to_owned(), json!(-0.1)),
        ]);
        let battery = restore(&state, 10.0, now()).unwrap();
        assert_eq!(battery.net_flow_kwh(), 0.0);
    }
}
