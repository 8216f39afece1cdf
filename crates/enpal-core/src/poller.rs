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

//! One poll round: refresh every due sensor layer by layer, then publish.

use crate::battery::ESTIMATE_UNIQUE_ID;
use crate::errors::ReadingError;
use crate::registry::{Node, SensorRegistry};
use crate::traits::{EntitySink, MetricSource, PublicIpSource};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counters of one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub refreshed: usize,
    /// Kept their previous value
    pub skipped: usize,
    pub unavailable: usize,
    pub published: usize,
    pub publish_failures: usize,
}

impl RoundReport {
    fn record(&mut self, id: &str, outcome: &Result<(), ReadingError>) {
        match outcome {
            Ok(()) => self.refreshed += 1,
            Err(e) if e.is_skip() => {
                self.skipped += 1;
                debug!("⏭️ [POLL] {id}: {e}");
            }
            Err(e) => {
                self.unavailable += 1;
                warn!("⚠️ [POLL] {id} unavailable: {e}");
            }
        }
    }
}

impl fmt::Display for RoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} refreshed, {} skipped, {} unavailable, {} published ({} failed)",
            self.refreshed, self.skipped, self.unavailable, self.published, self.publish_failures
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Derived {
    Estimator,
    Flow,
}

pub struct Poller {
    source: Arc<dyn MetricSource>,
    sink: Arc<dyn EntitySink>,
    ip_source: Option<Arc<dyn PublicIpSource>>,
    scan_interval: Duration,
}

impl Poller {
    pub fn new(
        source: Arc<dyn MetricSource>,
        sink: Arc<dyn EntitySink>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            ip_source: None,
            scan_interval,
        }
    }

    pub fn with_public_ip(mut self, ip_source: Arc<dyn PublicIpSource>) -> Self {
        self.ip_source = Some(ip_source);
        self
    }

    /// Refresh every due node in topological order and publish what changed.
    ///
    /// I/O nodes of one layer are awaited together, so a slow query only
    /// delays its own sensor. Derived nodes run once their inputs were
    /// attempted in this round.
    pub async fn run_round(
        &self,
        registry: &mut SensorRegistry,
        now: DateTime<Utc>,
    ) -> RoundReport {
        let mut report = RoundReport::default();
        let mut touched = BTreeSet::new();
        let layers = registry.layers().to_vec();

        for layer in &layers {
            let outcomes = self.refresh_io_layer(registry, layer, now).await;
            for (id, outcome) in outcomes {
                report.record(&id, &outcome);
                touched.insert(id);
            }

            for id in layer {
                if let Some(outcome) = Self::refresh_derived(registry, id, &touched, now) {
                    report.record(id, &outcome);
                    touched.insert(id.clone());
                }
            }
        }

        let states: Vec<_> = touched
            .iter()
            .filter_map(|id| registry.get(id).map(Node::entity_state))
            .collect();
        let results = join_all(states.iter().map(|state| self.sink.publish(state))).await;
        for (state, result) in states.iter().zip(results) {
            match result {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.publish_failures += 1;
                    error!(
                        "❌ [POLL] Failed to publish {} to {}: {e:#}",
                        state.entity_id,
                        self.sink.name()
                    );
                }
            }
        }

        if touched.is_empty() {
            debug!("🔄 [POLL] Nothing due");
        } else {
            info!("🔄 [POLL] Round done: {report}");
        }
        report
    }

    async fn refresh_io_layer(
        &self,
        registry: &mut SensorRegistry,
        layer: &[String],
        now: DateTime<Utc>,
    ) -> Vec<(String, Result<(), ReadingError>)> {
        let source = self.source.as_ref();
        let ip_source = self.ip_source.as_deref();
        let scan_interval = self.scan_interval;
        let tolerance = registry.tick_interval(scan_interval) / 2;

        let futures: Vec<BoxFuture<'_, (String, Result<(), ReadingError>)>> = registry
            .nodes_mut()
            .filter_map(|(id, node)| {
                if !layer.contains(id) {
                    return None;
                }
                let id = id.clone();
                match node {
                    Node::Metric(reading) if reading.is_due(now, scan_interval, tolerance) => Some(
                        async move {
                            let outcome = reading.refresh(source, now).await.map(|_| ());
                            (id, outcome)
                        }
                        .boxed(),
                    ),
                    Node::PublicIp(sensor) if sensor.is_due(now, tolerance) => {
                        let ip_source = ip_source?;
                        Some(
                            async move {
                                let outcome = sensor.refresh(ip_source, now).await.map(|_| ());
                                (id, outcome)
                            }
                            .boxed(),
                        )
                    }
                    _ => None,
                }
            })
            .collect();

        join_all(futures).await
    }

    fn refresh_derived(
        registry: &mut SensorRegistry,
        id: &str,
        touched: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Option<Result<(), ReadingError>> {
        let kind = match registry.get(id) {
            Some(Node::Estimator(_)) => Derived::Estimator,
            Some(Node::Flow(_)) => Derived::Flow,
            _ => return None,
        };

        match kind {
            Derived::Estimator => {
                let inputs = registry.estimator_inputs()?.clone();
                if !touched.contains(&inputs.production) && !touched.contains(&inputs.consumption) {
                    return None;
                }
                let production = registry.metric_value(&inputs.production);
                let consumption = registry.metric_value(&inputs.consumption);
                let Some(Node::Estimator(estimator)) = registry.get_mut(id) else {
                    return None;
                };
                Some(estimator.refresh(production, consumption, now).map(|_| ()))
            }
            Derived::Flow => {
                if !touched.contains(ESTIMATE_UNIQUE_ID) {
                    return None;
                }
                let state = registry.battery_state()?;
                let Some(Node::Flow(flow)) = registry.get_mut(id) else {
                    return None;
                };
                flow.refresh(&state);
                Some(Ok(()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BatterySetup, RegistryOptions};
    use anyhow::bail;
    use async_trait::async_trait;
    use enpal_types::{BatteryState, EntityState, MetricKey, MetricPoint, MetricQuery};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapSource {
        values: HashMap<MetricKey, f64>,
    }

    #[async_trait]
    impl MetricSource for MapSource {
        async fn query(&self, query: &MetricQuery) -> anyhow::Result<Vec<MetricPoint>> {
            if query.key.field == "Frequenz" {
                bail!("connection reset");
            }
            Ok(self
                .values
                .get(&query.key)
                .map(|value| MetricPoint {
                    key: query.key.clone(),
                    value: *value,
                    timestamp: Utc::now(),
                })
                .into_iter()
                .collect())
        }

        async fn list_series(&self, _range: Duration) -> anyhow::Result<Vec<MetricKey>> {
            Ok(self.values.keys().cloned().collect())
        }

        async fn health_check(&self) -> anyhow::Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "map"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<EntityState>>,
    }

    #[async_trait]
    impl EntitySink for RecordingSink {
        async fn publish(&self, state: &EntityState) -> anyhow::Result<()> {
            self.published.lock().unwrap().push(state.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_failing_metric_does_not_block_others() {
        let mut values = HashMap::new();
        values.insert(MetricKey::new("phasePowerAc", "Phase1"), 230.0);
        values.insert(MetricKey::new("gridFrequency", "Frequenz"), 50.0);
        let source = Arc::new(MapSource { values });
        let sink = Arc::new(RecordingSink::default());

        let available = source.list_series(Duration::from_secs(300)).await.unwrap();
        let options = RegistryOptions {
            battery: BatterySetup {
                max_capacity_kwh: 10.0,
                initial: BatteryState::seeded(10.0, Utc::now()),
            },
            public_ip: vec![],
        };
        let mut registry = SensorRegistry::discover(&available, &options).unwrap();
        let poller = Poller::new(source, sink.clone(), Duration::from_secs(120));

        let report = poller.run_round(&mut registry, Utc::now()).await;
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.unavailable, 1);
        assert_eq!(report.published, 2);

        let published = sink.published.lock().unwrap();
        let frequency = published
            .iter()
            .find(|s| s.unique_id == "enpal_gridFrequency_Frequenz")
            .unwrap();
        assert_eq!(frequency.state_string(), "unavailable");
    }

    #[tokio::test]
    async fn test_nothing_due_publishes_nothing() {
        let mut values = HashMap::new();
        values.insert(MetricKey::new("phasePowerAc", "Phase1"), 230.0);
        let source = Arc::new(MapSource { values });
        let sink = Arc::new(RecordingSink::default());
        let available = source.list_series(Duration::from_secs(300)).await.unwrap();
        let options = RegistryOptions {
            battery: BatterySetup {
                max_capacity_kwh: 10.0,
                initial: BatteryState::seeded(10.0, Utc::now()),
            },
            public_ip: vec![],
        };
        let mut registry = SensorRegistry::discover(&available, &options).unwrap();
        let poller = Poller::new(source, sink.clone(), Duration::from_secs(120));

        let now = Utc::now();
        poller.run_round(&mut registry, now).await;
        let report = poller
            .run_round(&mut registry, now + chrono::Duration::seconds(30))
            .await;
        assert_eq!(report, RoundReport::default());
        assert_eq!(sink.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_early_tick_still_refreshes() {
        let mut values = HashMap::new();
        values.insert(MetricKey::new("phasePowerAc", "Phase1"), 230.0);
        let source = Arc::new(MapSource { values });
        let sink = Arc::new(RecordingSink::default());
        let available = source.list_series(Duration::from_secs(300)).await.unwrap();
        let options = RegistryOptions {
            battery: BatterySetup {
                max_capacity_kwh: 10.0,
                initial: BatteryState::seeded(10.0, Utc::now()),
            },
            public_ip: vec![],
        };
        let mut registry = SensorRegistry::discover(&available, &options).unwrap();
        let poller = Poller::new(source, sink.clone(), Duration::from_secs(120));

        let now = Utc::now();
        poller.run_round(&mut registry, now).await;
        let report = poller
            .run_round(
                &mut registry,
                now + chrono::Duration::seconds(120) - chrono::Duration::milliseconds(5),
            )
            .await;
        assert_eq!(report.refreshed, 1);
        assert_eq!(sink.published.lock().unwrap().len(), 2);
    }
}
