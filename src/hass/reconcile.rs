//! Keeps one Home Assistant entity per (device, sensor key) and pushes the current values.

use super::{
    Attributes, DeviceRegistration, EntityRegistration, HomeAssistant, StatePayload, PLATFORM,
};
use crate::error::Error;
use crate::extract::DeviceMetadata;
use crate::model::{Device, ReconcileResult, SensorMap};
use crate::sensor::{self, SensorDescriptor};
use std::collections::{HashMap, HashSet};

/// Key read back after each batch when it was published.
pub const CANARY_KEY: &str = "battery_soc";

/// Deterministic entity id: `sensor.<prefix>_<serial>_<key>`, lowercased, with anything outside
/// `[a-z0-9_]` replaced by `_`.
pub fn entity_id(prefix: &str, device: &Device, key: &str) -> String {
    let object_id: String = format!("{}_{}_{}", prefix, device.serial, key)
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("sensor.{}", object_id)
}

pub fn payload(value: &str, descriptor: &SensorDescriptor) -> StatePayload {
    StatePayload {
        state: value.to_string(),
        attributes: Attributes {
            friendly_name: descriptor.name.to_string(),
            unit_of_measurement: descriptor.unit.as_ref().map(|unit| unit.to_string()),
            device_class: descriptor.device_class().map(String::from),
            state_class: descriptor.state_class().map(String::from),
        },
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    prefix: String,
    /// Entities confirmed to exist downstream during this process lifetime.
    known: HashSet<String>,
    /// Devices whose grouping was attempted, with the registry id when one came back.
    grouped: HashMap<String, Option<String>>,
}

impl Reconciler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Reconciler {
            prefix: prefix.into(),
            ..Reconciler::default()
        }
    }

    pub fn entity_id(&self, device: &Device, key: &str) -> String {
        entity_id(&self.prefix, device, key)
    }

    pub fn is_known(&self, entity_id: &str) -> bool {
        self.known.contains(entity_id)
    }

    /// Push every non-empty value in `sensors`. A failing key is counted and skipped; it never
    /// stops its siblings.
    pub async fn reconcile(
        &mut self,
        hass: &HomeAssistant,
        device: &Device,
        metadata: &DeviceMetadata,
        sensors: &SensorMap,
    ) -> ReconcileResult {
        let mut result = ReconcileResult::default();
        let mut created = Vec::new();

        for (key, value) in sensors {
            if value.trim().is_empty() {
                continue;
            }

            let entity_id = self.entity_id(device, key);
            match self.upsert(hass, device, metadata, key, value, &entity_id).await {
                Ok(true) => {
                    result.updated += 1;
                    created.push(entity_id);
                }
                Ok(false) => result.updated += 1,
                Err(e) => {
                    log::error!("Device {}: {} not updated: {}", device, key, e);
                    self.known.remove(&entity_id);
                    result.failed.insert(key.to_owned());
                }
            }
        }

        if !created.is_empty() {
            log::info!("Device {}: created {} new entities", device, created.len());
            if let Err(e) = hass.reload(&created).await {
                log::debug!("Refresh hint not accepted: {}", e);
            }
        }

        self.verify(hass, device, sensors, &result).await;

        log::info!(
            "Device {}: {} entities updated, {} failed",
            device,
            result.updated,
            result.failed.len()
        );
        result
    }

    /// Returns whether the entity was created by this call.
    async fn upsert(
        &mut self,
        hass: &HomeAssistant,
        device: &Device,
        metadata: &DeviceMetadata,
        key: &str,
        value: &str,
        entity_id: &str,
    ) -> Result<bool, Error> {
        let descriptor = sensor::describe(key);

        let create = if self.known.contains(entity_id) {
            false
        } else {
            hass.get_state(entity_id).await?.is_none()
        };

        if create {
            self.ensure_device(hass, device, metadata).await;
        }

        hass.set_state(entity_id, &payload(value, &descriptor)).await?;
        self.known.insert(entity_id.to_owned());

        if create {
            let registration = EntityRegistration {
                entity_id: entity_id.to_owned(),
                unique_id: entity_id.trim_start_matches("sensor.").to_owned(),
                platform: PLATFORM.to_string(),
                name: descriptor.name.to_string(),
                device_id: self.grouped.get(&device.serial).cloned().flatten(),
            };
            if let Err(e) = hass.register_entity(&registration).await {
                log::warn!(
                    "{} created but not registered, it may not survive a Home Assistant restart: {}",
                    entity_id,
                    e
                );
            }
        }

        Ok(create)
    }

    /// Register the device grouping once per process lifetime. Failures are only logged.
    async fn ensure_device(
        &mut self,
        hass: &HomeAssistant,
        device: &Device,
        metadata: &DeviceMetadata,
    ) {
        if self.grouped.contains_key(&device.serial) {
            return;
        }

        let registration = DeviceRegistration {
            identifiers: vec![[PLATFORM.to_string(), device.serial.clone()]],
            name: format!("{} {}", metadata.brand, device.serial),
            manufacturer: metadata.brand.clone(),
            model: metadata.model.clone(),
            sw_version: metadata.firmware.clone(),
        };

        let id = match hass.register_device(&registration).await {
            Ok(id) => {
                log::info!("Device {} registered", device);
                id
            }
            Err(e) => {
                log::warn!("Device {} grouping not registered: {}", device, e);
                None
            }
        };
        self.grouped.insert(device.serial.clone(), id);
    }

    /// Read one updated entity back. A mismatch only produces diagnostics.
    async fn verify(
        &self,
        hass: &HomeAssistant,
        device: &Device,
        sensors: &SensorMap,
        result: &ReconcileResult,
    ) {
        let updated =
            |key: &&String| !result.failed.contains(*key) && !sensors[*key].trim().is_empty();
        let canary = sensors
            .keys()
            .find(|key| key.as_str() == CANARY_KEY && updated(key))
            .or_else(|| sensors.keys().find(|key| updated(key)));

        let key = match canary {
            Some(key) => key,
            None => return,
        };
        let entity_id = self.entity_id(device, key);
        let expected = &sensors[key];

        match hass.get_state(&entity_id).await {
            Ok(Some(state)) if &state.state == expected => {
                log::debug!("Verified {} = {}", entity_id, state.state);
                return;
            }
            Ok(Some(state)) => log::warn!(
                "Verification of {}: expected '{}', Home Assistant shows '{}'",
                entity_id,
                expected,
                state.state
            ),
            Ok(None) => log::warn!("Verification of {}: entity not visible", entity_id),
            Err(e) => log::warn!("Verification of {} failed: {}", entity_id, e),
        }

        let prefix = self.entity_id(device, "");
        match hass.count_entities(&prefix).await {
            Ok(count) => log::warn!("{} entities visible with prefix {}", count, prefix),
            Err(e) => log::warn!("Unable to count entities: {}", e),
        }
        log::warn!(
            "If entities disappear after a restart, check that the access token may write to the entity registry"
        );
    }
}
