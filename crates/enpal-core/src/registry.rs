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

//! The set of sensors registered for one config entry, plus their refresh order.

use crate::battery::{BatteryEstimator, BatteryFlowSensor, ESTIMATE_UNIQUE_ID, FlowDirection};
use crate::catalog::{self, Role};
use crate::errors::GraphError;
use crate::graph::PollGraph;
use crate::public_ip::PublicIpSensor;
use crate::reading::SensorReading;
use crate::traits::IpFamily;
use enpal_types::{BatteryState, EntityState, MetricKey};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// One registered sensor
#[derive(Debug, Clone)]
pub enum Node {
    Metric(SensorReading),
    Estimator(BatteryEstimator),
    Flow(BatteryFlowSensor),
    PublicIp(PublicIpSensor),
}

impl Node {
    pub fn entity_state(&self) -> EntityState {
        match self {
            Self::Metric(reading) => reading.entity_state(),
            Self::Estimator(estimator) => estimator.entity_state(),
            Self::Flow(flow) => flow.entity_state(),
            Self::PublicIp(sensor) => sensor.entity_state(),
        }
    }

    /// Nodes that only derive from other nodes, no I/O
    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Estimator(_) | Self::Flow(_))
    }
}

/// Battery parameters used when the estimator gets registered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySetup {
    pub max_capacity_kwh: f64,
    pub initial: BatteryState,
}

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub battery: BatterySetup,
    pub public_ip: Vec<IpFamily>,
}

/// Unique ids of the two readings feeding the estimator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatorInputs {
    pub production: String,
    pub consumption: String,
}

#[derive(Debug, Clone)]
pub struct SensorRegistry {
    nodes: BTreeMap<String, Node>,
    layers: Vec<Vec<String>>,
    estimator_inputs: Option<EstimatorInputs>,
}

impl SensorRegistry {
    /// Register the catalog entries present in `available`, the public IP
    /// sensors asked for, and the battery estimator with its flow sensors
    /// when both a production and a consumption reading exist.
    pub fn discover(
        available: &[MetricKey],
        options: &RegistryOptions,
    ) -> Result<Self, GraphError> {
        let mut nodes = BTreeMap::new();
        let mut graph = PollGraph::new();
        let mut production = None;
        let mut consumption = None;

        // Catalog order decides which reading feeds the estimator
        for entry in catalog::CATALOG {
            if !available.iter().any(|key| entry.matches(key)) {
                continue;
            }
            let reading = SensorReading::new(entry);
            let id = reading.unique_id();
            match entry.role {
                Some(Role::Production) if production.is_none() => production = Some(id.clone()),
                Some(Role::Consumption) if consumption.is_none() => consumption = Some(id.clone()),
                _ => {}
            }
            graph.add_node(id.clone())?;
            nodes.insert(id, Node::Metric(reading));
        }

        for family in &options.public_ip {
            let sensor = PublicIpSensor::new(*family);
            let id = sensor.unique_id().to_owned();
            graph.add_node(id.clone())?;
            nodes.insert(id, Node::PublicIp(sensor));
        }

        let estimator_inputs = match (production, consumption) {
            (Some(production), Some(consumption)) => {
                let estimator = BatteryEstimator::new(
                    options.battery.max_capacity_kwh,
                    options.battery.initial,
                );
                graph.add_node(ESTIMATE_UNIQUE_ID)?;
                graph.add_edge(&production, ESTIMATE_UNIQUE_ID)?;
                graph.add_edge(&consumption, ESTIMATE_UNIQUE_ID)?;
                nodes.insert(ESTIMATE_UNIQUE_ID.to_owned(), Node::Estimator(estimator));

                for direction in [FlowDirection::In, FlowDirection::Out] {
                    let flow = BatteryFlowSensor::new(direction);
                    let id = flow.unique_id().to_owned();
                    graph.add_node(id.clone())?;
                    graph.add_edge(ESTIMATE_UNIQUE_ID, &id)?;
                    nodes.insert(id, Node::Flow(flow));
                }

                Some(EstimatorInputs {
                    production,
                    consumption,
                })
            }
            _ => None,
        };

        let layers = graph.layers()?;
        info!(
            "📋 [POLL] Registered {} sensors in {} layers (battery estimate: {})",
            nodes.len(),
            layers.len(),
            if estimator_inputs.is_some() { "yes" } else { "no" }
        );

        Ok(Self {
            nodes,
            layers,
            estimator_inputs,
        })
    }

    /// Same discovery again, carrying the committed battery state over
    pub fn rebuild(
        &self,
        available: &[MetricKey],
        options: &RegistryOptions,
    ) -> Result<Self, GraphError> {
        let mut options = options.clone();
        if let Some(state) = self.battery_state() {
            options.battery.initial = state;
        }
        Self::discover(available, &options)
    }

    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, unique_id: &str) -> Option<&Node> {
        self.nodes.get(unique_id)
    }

    pub fn get_mut(&mut self, unique_id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(unique_id)
    }

    pub fn unique_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = (&String, &mut Node)> {
        self.nodes.iter_mut()
    }

    pub fn estimator_inputs(&self) -> Option<&EstimatorInputs> {
        self.estimator_inputs.as_ref()
    }

    /// Current native value of a metric reading
    pub fn metric_value(&self, unique_id: &str) -> Option<f64> {
        match self.nodes.get(unique_id) {
            Some(Node::Metric(reading)) => reading.native_value(),
            _ => None,
        }
    }

    pub fn battery_state(&self) -> Option<BatteryState> {
        match self.nodes.get(ESTIMATE_UNIQUE_ID) {
            Some(Node::Estimator(estimator)) => Some(estimator.state()),
            _ => None,
        }
    }

    pub fn entity_states(&self) -> Vec<EntityState> {
        self.nodes.values().map(Node::entity_state).collect()
    }

    /// Shortest refresh interval of any registered metric, bounded by `default`
    pub fn tick_interval(&self, default: Duration) -> Duration {
        self.nodes
            .values()
            .filter_map(|node| match node {
                Node::Metric(reading) => reading.entry().interval_secs.map(Duration::from_secs),
                _ => None,
            })
            .fold(default, Duration::min)
    }
}
