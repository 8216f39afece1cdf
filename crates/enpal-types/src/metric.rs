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
use std::fmt;
use std::time::Duration;

/// Two-level metric name used by the time-series database
/// (`_measurement` is the category, `_field` the specific quantity)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub measurement: String,
    pub field: String,
}

impl MetricKey {
    pub fn new(measurement: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            field: field.into(),
        }
    }

    /// Unique id used for the exposed entity, e.g. `enpal_Gesamtleistung_Produktion`
    pub fn unique_id(&self) -> String {
        format!("enpal_{}_{}", self.measurement, self.field)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.measurement, self.field)
    }
}

/// A single row returned by the time-series source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub key: MetricKey,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregation applied per window bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Last,
    Mean,
}

impl Aggregation {
    /// Name of the aggregate function as understood by the query language
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::Mean => "mean",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query for one (measurement, field) pair over a bounded recent window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub key: MetricKey,
    /// How far back to look, e.g. 5 minutes
    pub range: Duration,
    /// Width of each aggregation bucket
    pub every: Duration,
    pub aggregation: Aggregation,
}

impl MetricQuery {
    /// "last value in the past 5 minutes, 2 minute buckets"
    pub fn last(key: MetricKey) -> Self {
        Self {
            key,
            range: Duration::from_secs(5 * 60),
            every: Duration::from_secs(2 * 60),
            aggregation: Aggregation::Last,
        }
    }
}
