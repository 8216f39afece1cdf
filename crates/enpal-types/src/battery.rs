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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Estimated battery state of one installation
///
/// Invariants kept by the estimator:
/// - `0 <= capacity_kwh <= max_capacity`
/// - `energy_in_kwh >= 0`, `energy_out_kwh <= 0`, at most one of them nonzero
/// - `last_update` never moves backwards
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Energy currently stored (kWh)
    pub capacity_kwh: f64,
    pub last_update: DateTime<Utc>,
    /// Energy that entered the battery during the last update (kWh)
    pub energy_in_kwh: f64,
    /// Energy that left the battery during the last update (kWh, sign-bearing)
    pub energy_out_kwh: f64,
}

impl BatteryState {
    /// Fresh state seeded with `capacity_kwh` and no recorded flow
    pub fn seeded(capacity_kwh: f64, now: DateTime<Utc>) -> Self {
        Self {
            capacity_kwh,
            last_update: now,
            energy_in_kwh: 0.0,
            energy_out_kwh: 0.0,
        }
    }

    /// Net energy moved by the last update (kWh)
    pub fn net_flow_kwh(&self) -> f64 {
        self.energy_in_kwh + self.energy_out_kwh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_state_has_no_flow() {
        let now = Utc::now();
        let state = BatteryState::seeded(10.0, now);
        assert_eq!(state.capacity_kwh, 10.0);
        assert_eq!(state.last_update, now);
        assert_eq!(state.net_flow_kwh(), 0.0);
    }
}
