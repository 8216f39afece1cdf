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

use super::client::HomeAssistantClient;
use super::types::HaStateUpdate;
use async_trait::async_trait;
use enpal_core::traits::EntitySink;
use enpal_types::EntityState;
use parking_lot::Mutex;
use std::io::Write;

/// Publishes entity states through the Home Assistant REST API
#[derive(Debug, Clone)]
pub struct HomeAssistantSink {
    client: HomeAssistantClient,
}

impl HomeAssistantSink {
    pub fn new(client: HomeAssistantClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EntitySink for HomeAssistantSink {
    async fn publish(&self, state: &EntityState) -> anyhow::Result<()> {
        self.client
            .set_state(&state.entity_id, &HaStateUpdate::from(state))
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "Home Assistant"
    }
}

/// Writes one JSON object per published state, used for dry runs
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> EntitySink for JsonLinesSink<W> {
    async fn publish(&self, state: &EntityState) -> anyhow::Result<()> {
        let line = serde_json::to_string(state)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "JSON lines"
    }
}
