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

use crate::catalog::CatalogEntry;
use crate::errors::ReadingError;
use crate::plausibility::Verdict;
use crate::traits::MetricSource;
use chrono::{DateTime, NaiveTime, Utc};
use enpal_types::{
    DeviceInfo, EntityState, MetricKey, MetricPoint, MetricQuery, NativeValue, slugify,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Start of the UTC calendar day containing `now`
pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// One exposed database series.
///
/// `native_value` is cleared when a fetch fails, returns nothing, or is rejected;
/// a skipped update leaves it untouched.
#[derive(Debug, Clone)]
pub struct SensorReading {
    entry: &'static CatalogEntry,
    key: MetricKey,
    native_value: Option<f64>,
    last_checked: Option<DateTime<Utc>>,
    last_reset: Option<DateTime<Utc>>,
}

impl SensorReading {
    pub fn new(entry: &'static CatalogEntry) -> Self {
        Self {
            entry,
            key: entry.key(),
            native_value: None,
            last_checked: None,
            last_reset: None,
        }
    }

    pub fn entry(&self) -> &'static CatalogEntry {
        self.entry
    }

    pub fn key(&self) -> &MetricKey {
        &self.key
    }

    pub fn unique_id(&self) -> String {
        self.key.unique_id()
    }

    pub fn entity_id(&self) -> String {
        format!("sensor.{}", slugify(self.entry.name))
    }

    pub fn native_value(&self) -> Option<f64> {
        self.native_value
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn query(&self) -> MetricQuery {
        self.entry.query()
    }

    /// Whether the reading should be refreshed in a round starting at `now`.
    ///
    /// `tolerance` absorbs scheduler jitter: a reading counts as due once it
    /// is within `tolerance` of its interval.
    pub fn is_due(
        &self,
        now: DateTime<Utc>,
        default_interval: Duration,
        tolerance: Duration,
    ) -> bool {
        let interval = self
            .entry
            .interval_secs
            .map_or(default_interval, Duration::from_secs);
        match self.last_checked {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .is_ok_and(|elapsed| elapsed + tolerance >= interval),
        }
    }

    fn mark_checked(&mut self, now: DateTime<Utc>) {
        self.last_checked = Some(now);
        if self.entry.resets_daily {
            self.last_reset = Some(start_of_utc_day(now));
        }
    }

    /// Query the source and update the reading. Transport errors are folded
    /// into [`ReadingError::Transport`] and never propagate further.
    pub async fn refresh(
        &mut self,
        source: &dyn MetricSource,
        now: DateTime<Utc>,
    ) -> Result<f64, ReadingError> {
        let query = self.query();
        debug!(
            "🔍 [INFLUX] Querying {} ({} over {}s)",
            self.key,
            query.aggregation,
            query.range.as_secs()
        );

        match source.query(&query).await {
            Ok(rows) => self.apply(&rows, now),
            Err(e) => {
                self.mark_checked(now);
                self.native_value = None;
                Err(ReadingError::Transport {
                    key: self.key.to_string(),
                    message: format!("{e:#}"),
                })
            }
        }
    }

    /// Apply the rows of one query result
    pub fn apply(&mut self, rows: &[MetricPoint], now: DateTime<Utc>) -> Result<f64, ReadingError> {
        self.mark_checked(now);

        let Some(first) = rows.first() else {
            self.native_value = None;
            return Err(ReadingError::NoData(self.key.to_string()));
        };

        let raw = match self.entry.rule.check(first.value) {
            Verdict::Accept(value) => value,
            Verdict::Coerced { original, value } => {
                warn!(
                    "⚠️ [INFLUX] {} reported {original}, outside plausible range, using {value}",
                    self.key
                );
                value
            }
            Verdict::Skip => {
                return Err(ReadingError::Skipped {
                    key: self.key.to_string(),
                    value: first.value,
                });
            }
            Verdict::Reject => {
                self.native_value = None;
                return Err(ReadingError::Implausible {
                    key: self.key.to_string(),
                    value: first.value,
                });
            }
        };

        let value = self
            .entry
            .precision
            .apply(self.entry.conversion.apply(raw));
        self.native_value = Some(value);
        Ok(value)
    }

    pub fn entity_state(&self) -> EntityState {
        let mut attributes = BTreeMap::new();
        if let Some(checked) = self.last_checked {
            attributes.insert("last_check".to_owned(), json!(checked.to_rfc3339()));
        }
        attributes.insert("field".to_owned(), json!(self.entry.field));
        attributes.insert("measurement".to_owned(), json!(self.entry.measurement));
        if let Some(reset) = self.last_reset {
            attributes.insert("last_reset".to_owned(), json!(reset.to_rfc3339()));
        }

        EntityState {
            unique_id: self.unique_id(),
            entity_id: self.entity_id(),
            name: self.entry.name.to_owned(),
            icon: self.entry.icon.to_owned(),
            device_class: Some(self.entry.device_class),
            state_class: Some(self.entry.state_class),
            unit: Some(self.entry.unit.to_owned()),
            native_value: self.native_value.map(NativeValue::Number),
            attributes,
            device: DeviceInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use chrono::TimeZone;

    fn entry(measurement: &str, field: &str) -> &'static CatalogEntry {
        catalog::lookup(&MetricKey::new(measurement, field)).unwrap()
    }

    fn point(reading: &SensorReading, value: f64) -> MetricPoint {
        MetricPoint {
            key: reading.key().clone(),
            value,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_first_row_is_taken_and_rounded() {
        let mut reading = SensorReading::new(entry("phasePowerAc", "Phase1"));
        let rows = vec![point(&reading, 1234.5678), point(&reading, 99.0)];
        assert_eq!(reading.apply(&rows, Utc::now()).unwrap(), 1234.57);
        assert_eq!(reading.native_value(), Some(1234.57));
    }

    #[test]
    fn test_no_rows_clears_value() {
        let mut reading = SensorReading::new(entry("phasePowerAc", "Phase1"));
        let rows = vec![point(&reading, 10.0)];
        reading.apply(&rows, Utc::now()).unwrap();

        let err = reading.apply(&[], Utc::now()).unwrap_err();
        assert!(matches!(err, ReadingError::NoData(_)));
        assert_eq!(reading.native_value(), None);
        assert!(reading.last_checked().is_some());
    }

    #[test]
    fn test_grid_frequency_spike_keeps_previous_value() {
        let mut reading = SensorReading::new(entry("inverter", "Frequency.Grid"));
        reading
            .apply(&[point(&reading, 49.98)], Utc::now())
            .unwrap();

        let err = reading
            .apply(&[point(&reading, 150.0)], Utc::now())
            .unwrap_err();
        assert!(err.is_skip());
        assert_eq!(reading.native_value(), Some(49.98));
    }

    #[test]
    fn test_wallbox_spikes_coerced_to_zero() {
        let mut reading =
            SensorReading::new(entry("wallbox", "Power.Wallbox.Connector.1.Charging"));
        assert_eq!(reading.apply(&[point(&reading, -5.0)], Utc::now()).unwrap(), 0.0);
        assert_eq!(
            reading
                .apply(&[point(&reading, 35_000.0)], Utc::now())
                .unwrap(),
            0.0
        );
        assert_eq!(
            reading
                .apply(&[point(&reading, 7_400.0)], Utc::now())
                .unwrap(),
            7_400.0
        );
    }

    #[test]
    fn test_milliamps_are_scaled() {
        let mut reading = SensorReading::new(entry("productionCurrentDc", "String2"));
        assert_eq!(
            reading.apply(&[point(&reading, 8_456.0)], Utc::now()).unwrap(),
            8.46
        );
    }

    #[test]
    fn test_lifetime_counter_keeps_raw_precision_and_ignores_zero() {
        let mut reading = SensorReading::new(entry("inverter", "Energy.Production.Total"));
        assert_eq!(
            reading
                .apply(&[point(&reading, 12_345.678_9)], Utc::now())
                .unwrap(),
            12_345.678_9
        );
        assert!(
            reading
                .apply(&[point(&reading, 0.0)], Utc::now())
                .unwrap_err()
                .is_skip()
        );
        assert_eq!(reading.native_value(), Some(12_345.678_9));
    }

    #[test]
    fn test_non_finite_clears_value() {
        let mut reading = SensorReading::new(entry("phasePowerAc", "Phase2"));
        reading.apply(&[point(&reading, 5.0)], Utc::now()).unwrap();
        let err = reading
            .apply(&[point(&reading, f64::NAN)], Utc::now())
            .unwrap_err();
        assert!(matches!(err, ReadingError::Implausible { .. }));
        assert_eq!(reading.native_value(), None);
    }

    #[test]
    fn test_daily_counter_last_reset_is_start_of_utc_day() {
        let mut reading = SensorReading::new(entry("inverter", "Energy.Production.Total.Day"));
        let now = Utc.with_ymd_and_hms(2025, 6, 14, 17, 42, 5).unwrap();
        reading.apply(&[point(&reading, 23.4)], now).unwrap();

        let state = reading.entity_state();
        assert_eq!(
            state.attributes["last_reset"],
            json!("2025-06-14T00:00:00+00:00")
        );

        // Recomputed on every refresh, even when no data came back
        let next_day = Utc.with_ymd_and_hms(2025, 6, 15, 0, 1, 0).unwrap();
        let _ = reading.apply(&[], next_day);
        assert_eq!(
            reading.entity_state().attributes["last_reset"],
            json!("2025-06-15T00:00:00+00:00")
        );
    }

    #[test]
    fn test_entity_state_shape() {
        let mut reading = SensorReading::new(entry("Gesamtleistung", "Produktion"));
        let now = Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();
        reading.apply(&[point(&reading, 4200.0)], now).unwrap();

        let state = reading.entity_state();
        assert_eq!(state.unique_id, "enpal_Gesamtleistung_Produktion");
        assert_eq!(state.entity_id, "sensor.solar_production");
        assert_eq!(state.native_value, Some(NativeValue::Number(4200.0)));
        assert_eq!(state.attributes["field"], json!("Produktion"));
        assert_eq!(state.attributes["measurement"], json!("Gesamtleistung"));
        assert!(!state.attributes.contains_key("last_reset"));
    }

    #[test]
    fn test_due_schedule_follows_entry_interval() {
        let mut reading =
            SensorReading::new(entry("wallbox", "Power.Wallbox.Connector.1.Charging"));
        let now = Utc::now();
        let default = Duration::from_secs(120);
        assert!(reading.is_due(now, default, Duration::ZERO));

        reading.apply(&[point(&reading, 0.0)], now).unwrap();
        assert!(!reading.is_due(now + chrono::Duration::seconds(10), default, Duration::ZERO));
        assert!(reading.is_due(now + chrono::Duration::seconds(20), default, Duration::ZERO));
    }

    #[test]
    fn test_due_despite_early_wakeup() {
        let mut reading = SensorReading::new(entry("Gesamtleistung", "Produktion"));
        let t0 = Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();
        let scan = Duration::from_secs(120);
        let tick = Duration::from_secs(20);

        // Checked 2 ms after the first tick, next tick wakes only 1 ms late
        reading
            .apply(&[point(&reading, 4200.0)], t0 + chrono::Duration::milliseconds(2))
            .unwrap();
        let sixth_tick = t0 + chrono::Duration::seconds(120) + chrono::Duration::milliseconds(1);
        assert!(reading.is_due(sixth_tick, scan, tick / 2));

        let fifth_tick = t0 + chrono::Duration::seconds(100) + chrono::Duration::milliseconds(1);
        assert!(!reading.is_due(fifth_tick, scan, tick / 2));
    }

    #[tokio::test]
    async fn test_transport_error_still_moves_last_reset() {
        struct Offline;

        #[async_trait::async_trait]
        impl MetricSource for Offline {
            async fn query(&self, _query: &MetricQuery) -> anyhow::Result<Vec<MetricPoint>> {
                anyhow::bail!("connection refused")
            }

            async fn list_series(&self, _range: Duration) -> anyhow::Result<Vec<MetricKey>> {
                Ok(vec![])
            }

            async fn health_check(&self) -> anyhow::Result<bool> {
                Ok(false)
            }

            fn name(&self) -> &str {
                "offline"
            }
        }

        let mut reading = SensorReading::new(entry("inverter", "Energy.Production.Total.Day"));
        let day_one = Utc.with_ymd_and_hms(2025, 6, 14, 23, 58, 0).unwrap();
        reading.apply(&[point(&reading, 23.4)], day_one).unwrap();

        let day_two = Utc.with_ymd_and_hms(2025, 6, 15, 0, 2, 0).unwrap();
        let err = reading.refresh(&Offline, day_two).await.unwrap_err();
        assert!(matches!(err, ReadingError::Transport { .. }));
        assert_eq!(
            reading.entity_state().attributes["last_reset"],
            json!("2025-06-15T00:00:00+00:00")
        );
    }
}
