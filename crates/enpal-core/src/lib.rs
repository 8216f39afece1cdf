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
pub mod catalog;
pub mod config_flow;
pub mod errors;
pub mod graph;
pub mod plausibility;
pub mod poller;
pub mod public_ip;
pub mod reading;
pub mod registry;
pub mod traits;

pub use battery::{BatteryEstimator, BatteryFlowSensor, FlowDirection};
pub use catalog::{CATALOG, CatalogEntry, Role};
pub use config_flow::{
    ConfigFlow, EntryData, EntryOptions, FlowResult, StepId, validate_ipv4, validate_ipv6,
};
pub use errors::{FormError, GraphError, ReadingError};
pub use graph::PollGraph;
pub use plausibility::{Conversion, PlausibilityRule, Precision, Verdict, Violation};
pub use poller::{Poller, RoundReport};
pub use public_ip::PublicIpSensor;
pub use reading::SensorReading;
pub use registry::{BatterySetup, Node, RegistryOptions, SensorRegistry};
pub use traits::{ConnectionProber, EntitySink, IpFamily, MetricSource, PublicIpSource};
