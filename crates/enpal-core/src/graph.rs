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

//! Refresh order of the sensors within one poll round.
//!
//! Nodes are unique ids, edges read "`from` must finish before `to` starts".
//! [`PollGraph::layers`] groups nodes so that every node only depends on
//! nodes of earlier layers; nodes of one layer may refresh concurrently.

use crate::errors::GraphError;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct PollGraph {
    /// node -> nodes it depends on
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl PollGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>) -> Result<(), GraphError> {
        let id = id.into();
        if self.dependencies.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.dependencies.insert(id, BTreeSet::new());
        Ok(())
    }

    /// `to` refreshes only after `from`
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        if !self.dependencies.contains_key(from) {
            return Err(GraphError::UnknownNode(from.to_owned()));
        }
        let deps = self
            .dependencies
            .get_mut(to)
            .ok_or_else(|| GraphError::UnknownNode(to.to_owned()))?;
        deps.insert(from.to_owned());
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Topological layers (Kahn's algorithm). Ids within a layer are sorted.
    pub fn layers(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = self
            .dependencies
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.iter().map(String::as_str).collect()))
            .collect();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(id, _)| *id)
                .collect();

            if ready.is_empty() {
                // Every remaining node waits on another one
                let stuck = remaining.keys().next().map_or_else(String::new, |id| (*id).to_owned());
                return Err(GraphError::Cycle(stuck));
            }

            for id in &ready {
                remaining.remove(id);
            }
            for deps in remaining.values_mut() {
                for id in &ready {
                    deps.remove(id);
                }
            }
            layers.push(ready.into_iter().map(str::to_owned).collect());
        }

        Ok(layers)
    }
}
