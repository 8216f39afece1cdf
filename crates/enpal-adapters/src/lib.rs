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

//! Adapters between the core traits and the outside world: the InfluxDB
//! database on the gateway, Home Assistant, and a public IP lookup service.

pub mod errors;
pub mod ha;
pub mod influx;
pub mod public_ip;

pub use errors::{HaError, HaResult, InfluxError, InfluxResult, LookupError};
pub use ha::{HomeAssistantClient, HomeAssistantSink, JsonLinesSink};
pub use influx::{InfluxClient, InfluxProber};
pub use public_ip::PublicIpClient;
