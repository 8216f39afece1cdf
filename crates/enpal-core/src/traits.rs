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

use anyhow::Result;
use async_trait::async_trait;
use enpal_types::{EntityState, MetricKey, MetricPoint, MetricQuery};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Address family of a public IP lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::V4 => "IPv4",
            Self::V6 => "IPv6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============= Data Source Traits =============

/// Time-series database the readings are pulled from.
/// Business logic uses this trait and never sees the query language.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Run one query; rows come back newest bucket last
    async fn query(&self, query: &MetricQuery) -> Result<Vec<MetricPoint>>;

    /// All (measurement, field) pairs that reported within `range`
    async fn list_series(&self, range: Duration) -> Result<Vec<MetricKey>>;

    async fn health_check(&self) -> Result<bool>;

    fn name(&self) -> &str;
}

/// Host framework the entity states are published to
#[async_trait]
pub trait EntitySink: Send + Sync {
    async fn publish(&self, state: &EntityState) -> Result<()>;

    fn name(&self) -> &str;
}

/// Public IP lookup service
#[async_trait]
pub trait PublicIpSource: Send + Sync {
    async fn lookup(&self, family: IpFamily) -> Result<String>;

    fn name(&self) -> &str;
}

/// Used by the setup flow to check a candidate connection before it is saved
#[async_trait]
pub trait ConnectionProber: Send + Sync {
    /// Is the database at `ip:port` answering its health endpoint?
    async fn health(&self, ip: &str, port: u32) -> Result<bool>;

    /// Number of series a probe query returns with `token`
    async fn probe_series_count(&self, ip: &str, port: u32, token: &str) -> Result<usize>;
}
