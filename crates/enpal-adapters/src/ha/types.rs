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

use enpal_types::EntityState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Entity state as returned by the Home Assistant REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaEntityState {
    pub entity_id: String,
    pub state: String,
    pub attributes: Value,
    pub last_changed: String,
    pub last_updated: String,
}

/// Body of `POST /api/states/<entity_id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaStateUpdate {
    pub state: String,
    pub attributes: Map<String, Value>,
}

impl From<&EntityState> for HaStateUpdate {
    fn from(entity: &EntityState) -> Self {
        let mut attributes: Map<String, Value> = entity
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        attributes.insert("friendly_name".to_owned(), json!(entity.name));
        attributes.insert("icon".to_owned(), json!(entity.icon));
        attributes.insert("unique_id".to_owned(), json!(entity.unique_id));
        if let Some(class) = entity.device_class {
            attributes.insert("device_class".to_owned(), json!(class.as_str()));
        }
        if let Some(class) = entity.state_class {
            attributes.insert("state_class".to_owned(), json!(class.as_str()));
        }
        if let Some(unit) = &entity.unit {
            attributes.insert("unit_of_measurement".to_owned(), json!(unit));
        }
        attributes.insert(
            "device".to_owned(),
            json!({
                "name": entity.device.name,
                "manufacturer": entity.device.manufacturer,
                "sw_version": entity.device.sw_version,
                "entry_type": entity.device.entry_type,
            }),
        );

        Self {
            state: entity.state_string(),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enpal_types::{DeviceClass, DeviceInfo, NativeValue, StateClass};
    use std::collections::BTreeMap;

    #[test]
    fn test_update_carries_presentation_attributes() {
        let entity = EntityState {
            unique_id: "enpal_gridFrequency_Frequenz".to_owned(),
            entity_id: "sensor.grid_frequency".to_owned(),
            name: "Grid Frequency".to_owned(),
            icon: "mdi:lightning-bolt".to_owned(),
            device_class: Some(DeviceClass::Frequency),
            state_class: Some(StateClass::Measurement),
            unit: Some("Hz".to_owned()),
            native_value: Some(NativeValue::Number(49.98)),
            attributes: BTreeMap::from([("field".to_owned(), json!("Frequenz"))]),
            device: DeviceInfo::default(),
        };

        let update = HaStateUpdate::from(&entity);
        assert_eq!(update.state, "49.98");
        assert_eq!(update.attributes["friendly_name"], json!("Grid Frequency"));
        assert_eq!(update.attributes["device_class"], json!("frequency"));
        assert_eq!(update.attributes["unit_of_measurement"], json!("Hz"));
        assert_eq!(update.attributes["field"], json!("Frequenz"));
        assert_eq!(update.attributes["device"]["manufacturer"], json!("Enpal"));
    }
}
