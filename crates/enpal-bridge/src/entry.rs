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

use anyhow::{Context, Result};
use chrono::Utc;
use enpal_core::{EntryData, EntryOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Persisted result of the setup flow for one installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub title: String,
    pub data: EntryData,
    #[serde(default, skip_serializing_if = "EntryOptions::is_empty")]
    pub options: EntryOptions,
    /// Opaque values other components keep across restarts
    #[serde(default)]
    pub state: BTreeMap<String, Value>,
}

impl ConfigEntry {
    pub fn new(title: impl Into<String>, data: EntryData) -> Self {
        Self {
            entry_id: format!("{:x}", Utc::now().timestamp_millis()),
            title: title.into(),
            data,
            options: EntryOptions::default(),
            state: BTreeMap::new(),
        }
    }

    /// Connection settings in force: options applied over data
    pub fn effective(&self) -> EntryData {
        self.options.overlay(&self.data)
    }

    /// Record the outcome of the options step
    pub fn set_options(&mut self, data: EntryData) {
        self.options = EntryOptions::from(data);
    }

    /// Read the entry, `None` when setup has not been run yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config entry {}", path.display()))?;
        let entry = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config entry {}", path.display()))?;
        Ok(Some(entry))
    }

    /// Write through a temporary file so a crash never leaves half an entry
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move entry into {}", path.display()))?;

        debug!("💾 [ENTRY] Saved {} to {}", self.entry_id, path.display());
        Ok(())
    }

    /// Apply `update` to the state map of the entry stored at `path` and save it.
    ///
    /// Data and options on disk are kept as they are, since `setup` or `options`
    /// may have rewritten them while this process was running. The in-memory
    /// copy only receives the new state map.
    pub fn save_state(
        &mut self,
        path: &Path,
        update: impl FnOnce(&mut BTreeMap<String, Value>),
    ) -> Result<()> {
        let mut on_disk = Self::load(path)?.unwrap_or_else(|| self.clone());
        update(&mut on_disk.state);
        on_disk.save(path)?;
        self.state = on_disk.state;
        Ok(())
    }
}
