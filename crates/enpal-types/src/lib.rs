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

pub mod battery;
pub mod entity;
pub mod metric;

// Re-export common types for convenience
pub use battery::BatteryState;
pub use entity::{DeviceClass, DeviceInfo, EntityState, NativeValue, StateClass, slugify};
pub use metric::{Aggregation, MetricKey, MetricPoint, MetricQuery};

/// Version reported as `sw_version` on every exposed device
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
