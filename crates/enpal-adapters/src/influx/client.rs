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

use super::flux;
use super::response::{FluxRecord, parse_records};
use crate::errors::{InfluxError, InfluxResult};
use async_trait::async_trait;
use enpal_core::traits::{ConnectionProber, MetricSource};
use enpal_types::{MetricKey, MetricPoint, MetricQuery};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_ORG: &str = "my-new-org";
pub const DEFAULT_BUCKET: &str = "my-new-bucket";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    version: Option<String>,
}

/// InfluxDB 2.x client speaking Flux over the HTTP query API
#[derive(Debug, Clone)]
pub struct InfluxClient {
    base_url: String,
    token: String,
    org: String,
    bucket: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl InfluxClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> InfluxResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InfluxError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            org: DEFAULT_ORG.to_owned(),
            bucket: DEFAULT_BUCKET.to_owned(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Client for the database on the installation's gateway
    pub fn for_host(
        ip: &str,
        port: u32,
        token: impl Into<String>,
        timeout: Duration,
    ) -> InfluxResult<Self> {
        Self::new(format!("http://{ip}:{port}"), token, timeout)
    }

    pub fn with_database(mut self, org: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.org = org.into();
        self.bucket = bucket.into();
        self
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Run a Flux query and return its data rows
    pub async fn query_records(&self, flux: &str) -> InfluxResult<Vec<FluxRecord>> {
        let url = format!(
            "{}/api/v2/query?org={}",
            self.base_url,
            urlencoding::encode(&self.org)
        );
        let body = json!({
            "query": flux,
            "type": "flux",
            "dialect": {
                "header": true,
                "delimiter": ",",
                "annotations": [],
            },
        });
        debug!("🔍 [INFLUX] POST {}", url);

        let response = self
            .retry_request(|| async {
                self.client
                    .post(&url)
                    .header("Authorization", format!("Token {}", self.token))
                    .header("Accept", "application/csv")
                    .json(&body)
                    .send()
                    .await
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let text = response.text().await?;
                parse_records(&text)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [INFLUX] Authentication failed for org {}", self.org);
                Err(InfluxError::AuthenticationFailed)
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                error!("❌ [INFLUX] Status {}: {}", status, message);
                Err(InfluxError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// `GET /health`, true when the database reports "pass"
    pub async fn health(&self) -> InfluxResult<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!("⚠️ [INFLUX] Health endpoint answered {}", response.status());
            return Ok(false);
        }
        let health = response
            .json::<HealthResponse>()
            .await
            .map_err(|e| InfluxError::ParseError(format!("health response: {e}")))?;
        debug!(
            "[INFLUX] Health: {} (version {})",
            health.status,
            health.version.as_deref().unwrap_or("unknown")
        );
        Ok(health.status == "pass")
    }

    /// Distinct (measurement, field) pairs seen within `range`, in response order
    pub async fn series(&self, range: Duration) -> InfluxResult<Vec<MetricKey>> {
        let records = self.query_records(&flux::series_query(&self.bucket, range)).await?;
        let mut seen = BTreeSet::new();
        let keys = records
            .into_iter()
            .filter_map(|r| Some(MetricKey::new(r.measurement?, r.field?)))
            .filter(|key| seen.insert(key.clone()))
            .collect();
        Ok(keys)
    }

    /// Number of result tables the series query returns within `range`
    pub async fn table_count(&self, range: Duration) -> InfluxResult<usize> {
        let records = self.query_records(&flux::series_query(&self.bucket, range)).await?;
        Ok(records.iter().map(|r| r.table).collect::<BTreeSet<_>>().len())
    }

    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> InfluxResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("❌ [INFLUX] Request failed after {} attempts: {}", attempts, e);
                    return Err(InfluxError::HttpError(e));
                }
                Err(e) => {
                    warn!(
                        "⚠️ [INFLUX] Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl MetricSource for InfluxClient {
    async fn query(&self, query: &MetricQuery) -> anyhow::Result<Vec<MetricPoint>> {
        let records = self
            .query_records(&flux::metric_query(&self.bucket, query))
            .await?;
        let points = records
            .into_iter()
            .filter_map(|record| {
                Some(MetricPoint {
                    key: query.key.clone(),
                    value: record.value?,
                    timestamp: record.time.unwrap_or_else(chrono::Utc::now),
                })
            })
            .collect();
        Ok(points)
    }

    async fn list_series(&self, range: Duration) -> anyhow::Result<Vec<MetricKey>> {
        let keys = self.series(range).await?;
        info!("📋 [INFLUX] {} series reported in the last {}s", keys.len(), range.as_secs());
        Ok(keys)
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        Ok(self.health().await?)
    }

    fn name(&self) -> &str {
        "InfluxDB"
    }
}

/// Probes candidate connections for the setup flow
#[derive(Debug, Clone)]
pub struct InfluxProber {
    org: String,
    bucket: String,
    timeout: Duration,
    probe_window: Duration,
}

impl InfluxProber {
    pub fn new(org: impl Into<String>, bucket: impl Into<String>, timeout: Duration) -> Self {
        Self {
            org: org.into(),
            bucket: bucket.into(),
            timeout,
            probe_window: Duration::from_secs(120),
        }
    }

    fn client(&self, ip: &str, port: u32, token: &str) -> InfluxResult<InfluxClient> {
        Ok(InfluxClient::for_host(ip, port, token, self.timeout)?
            .with_database(self.org.clone(), self.bucket.clone())
            .with_retry_config(1, Duration::ZERO))
    }
}

#[async_trait]
impl ConnectionProber for InfluxProber {
    async fn health(&self, ip: &str, port: u32) -> anyhow::Result<bool> {
        Ok(self.client(ip, port, "")?.health().await?)
    }

    async fn probe_series_count(&self, ip: &str, port: u32, token: &str) -> anyhow::Result<usize> {
        Ok(self
            .client(ip, port, token)?
            .table_count(self.probe_window)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const BODY: &str = ",result,table,_start,_stop,_time,_value,_field,_measurement\r\n\
,last,0,2025-06-14T09:55:00Z,2025-06-14T10:00:00Z,2025-06-14T10:00:00Z,4198,Produktion,Gesamtleistung\r\n\
,last,1,2025-06-14T09:55:00Z,2025-06-14T10:00:00Z,2025-06-14T10:00:00Z,1034,Verbrauch,Gesamtleistung\r\n\
,last,2,2025-06-14T09:55:00Z,2025-06-14T10:00:00Z,2025-06-14T09:58:00Z,1030,Verbrauch,Gesamtleistung\r\n";

    fn client(server: &Server) -> InfluxClient {
        InfluxClient::new(server.url(), "secret", DEFAULT_TIMEOUT)
            .unwrap()
            .with_retry_config(2, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_query_sends_flux_with_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/query")
            .match_query(Matcher::UrlEncoded("org".into(), "my-new-org".into()))
            .match_header("authorization", "Token secret")
            .match_body(Matcher::Regex(
                r#"r\[\\"_field\\"\] == \\"Produktion\\""#.to_owned(),
            ))
            .with_status(200)
            .with_header("content-type", "text/csv")
            .with_body(BODY)
            .create_async()
            .await;

        let query = MetricQuery::last(MetricKey::new("Gesamtleistung", "Produktion"));
        let points = client(&server).query(&query).await.unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].value, 4198.0);
        assert_eq!(points[0].key, query.key);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_series_deduplicates() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let keys = client(&server)
            .list_series(Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(
            keys,
            vec![
                MetricKey::new("Gesamtleistung", "Produktion"),
                MetricKey::new("Gesamtleistung", "Verbrauch"),
            ]
        );
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/query")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"code":"unauthorized","message":"unauthorized access"}"#)
            .create_async()
            .await;

        let result = client(&server).query_records("from(bucket: \"x\")").await;
        assert!(matches!(result, Err(InfluxError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/query")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let result = client(&server).query_records("x").await;
        match result {
            Err(InfluxError::ApiError { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "name": "influxdb",
                    "message": "ready for queries and writes",
                    "status": "pass",
                    "version": "v2.7.1",
                })
                .to_string(),
            )
            .create_async()
            .await;
        assert!(client(&server).health().await.unwrap());

        let mut failing = Server::new_async().await;
        let _mock = failing
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"fail"}"#)
            .create_async()
            .await;
        assert!(!client(&failing).health().await.unwrap());
    }

    #[tokio::test]
    async fn test_table_count() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;
        assert_eq!(
            client(&server)
                .table_count(Duration::from_secs(120))
                .await
                .unwrap(),
            3
        );
    }
}
