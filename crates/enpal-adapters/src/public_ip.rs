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

use crate::errors::LookupError;
use async_trait::async_trait;
use enpal_core::traits::{IpFamily, PublicIpSource};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const IPV4_URL: &str = "https://api.ipify.org?format=json";
/// Dual-stack endpoint, answers with v4 on networks without v6
pub const IPV6_URL: &str = "https://api64.ipify.org?format=json";

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// Client for an ipify-compatible service answering `{"ip": "..."}`
#[derive(Debug, Clone)]
pub struct PublicIpClient {
    client: Client,
    ipv4_url: String,
    ipv6_url: String,
}

impl PublicIpClient {
    pub fn new() -> Result<Self, LookupError> {
        Self::with_urls(IPV4_URL, IPV6_URL)
    }

    pub fn with_urls(
        ipv4_url: impl Into<String>,
        ipv6_url: impl Into<String>,
    ) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LookupError::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            ipv4_url: ipv4_url.into(),
            ipv6_url: ipv6_url.into(),
        })
    }

    pub async fn fetch(&self, family: IpFamily) -> Result<String, LookupError> {
        let url = match family {
            IpFamily::V4 => &self.ipv4_url,
            IpFamily::V6 => &self.ipv6_url,
        };
        debug!("🌐 [IP] Looking up public {} via {}", family, url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }
        Ok(response.json::<IpResponse>().await?.ip)
    }
}

#[async_trait]
impl PublicIpSource for PublicIpClient {
    async fn lookup(&self, family: IpFamily) -> anyhow::Result<String> {
        Ok(self.fetch(family).await?)
    }

    fn name(&self) -> &str {
        "ipify"
    }
}
