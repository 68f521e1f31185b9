//! One poll cycle: authenticate, find Home Assistant, then fetch, extract and reconcile each
//! configured inverter in turn.

use crate::api;
use crate::diagnostics::Diagnostics;
use crate::error::Error;
use crate::extract;
use crate::hass::{Addressing, HomeAssistant, Reconciler};
use crate::model::{self, Device, ReconcileResult, SensorMap};
use crate::retry::RetryPolicy;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Everything a cycle needs, resolved once from settings at startup.
#[derive(Debug, Clone)]
pub struct Context {
    pub api: model::Api,
    pub devices: Vec<Device>,
    /// Downstream routes in the order they are tried.
    pub routes: Vec<Addressing>,
    pub entity_prefix: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub device: Device,
    /// All upstream documents arrived.
    pub complete: bool,
    pub sensors: SensorMap,
    /// `None` when nothing could be fetched and reconciliation was skipped.
    pub result: Option<ReconcileResult>,
}

#[derive(Debug, Clone)]
pub enum Cycle {
    /// No credential; nothing was fetched or written.
    AuthFailed(Error),
    /// No downstream route answered the pre-flight check.
    Unreachable(Error),
    Completed(Vec<DeviceReport>),
}

pub struct Pipeline {
    context: Context,
    client: Client,
    reconciler: Reconciler,
    hass_retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(context: Context) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(context.timeout)
            .build()
            .map_err(|e| Error::InternalError(format!("HTTP client: {}", e)))?;

        Ok(Pipeline {
            reconciler: Reconciler::new(context.entity_prefix.clone()),
            context,
            client,
            hass_retry: RetryPolicy::DATA,
        })
    }

    pub fn with_hass_retry(mut self, retry: RetryPolicy) -> Self {
        self.hass_retry = retry;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run cycles forever, `interval` apart.
    pub async fn run(&mut self) {
        log::info!(
            "Polling {} inverter(s) every {} seconds",
            self.context.devices.len(),
            self.context.interval.as_secs()
        );

        loop {
            let today = chrono::Local::now().date_naive();
            match self.run_cycle(today).await {
                Cycle::Completed(reports) => {
                    let updated: usize = reports
                        .iter()
                        .filter_map(|report| report.result.as_ref())
                        .map(|result| result.updated)
                        .sum();
                    log::info!("Cycle finished, {} entities updated", updated);
                }
                Cycle::AuthFailed(_) | Cycle::Unreachable(_) => {
                    log::warn!("Cycle skipped, no values were updated")
                }
            }

            log::debug!("Sleeping {} seconds", self.context.interval.as_secs());
            tokio::time::sleep(self.context.interval).await;
        }
    }

    /// One full pass over every configured device. Per-device failures never stop the
    /// remaining devices.
    pub async fn run_cycle(&mut self, date: NaiveDate) -> Cycle {
        self.context.diagnostics.reset();

        let logged_in = match api::login(&self.context.api, &self.client).await {
            Ok(logged_in) => logged_in,
            Err(e) => {
                log::error!("{}", e);
                log::error!("Check the configured username and password and that the API is reachable");
                log::error!("The API may also be rate limiting this account; no values were updated");
                return Cycle::AuthFailed(e);
            }
        };

        let hass =
            match HomeAssistant::connect(&self.context.routes, &self.client, self.hass_retry).await
            {
                Ok(hass) => hass,
                Err(e) => {
                    log::error!("Home Assistant unreachable: {}", e);
                    return Cycle::Unreachable(e);
                }
            };

        let mut reports = Vec::with_capacity(self.context.devices.len());
        for device in &self.context.devices {
            log::info!("Device {}: polling", device);
            let (bundle, complete) =
                api::fetch(&logged_in, device, date, &self.context.diagnostics).await;

            if bundle.is_empty() {
                log::error!("Device {}: no data retrieved, skipping", device);
                reports.push(DeviceReport {
                    device: device.clone(),
                    complete,
                    sensors: SensorMap::new(),
                    result: None,
                });
                continue;
            }

            let sensors = extract::extract(&bundle);
            let metadata = extract::device_metadata(&bundle);
            let result = self
                .reconciler
                .reconcile(&hass, device, &metadata, &sensors)
                .await;

            reports.push(DeviceReport {
                device: device.clone(),
                complete,
                sensors,
                result: Some(result),
            });
        }

        Cycle::Completed(reports)
    }

    /// Log in and push `settings` to the inverter with serial `serial`.
    pub async fn apply_settings(&self, serial: &str, settings: &Value) -> Result<(), Error> {
        let logged_in = api::login(&self.context.api, &self.client).await?;
        api::write_settings(&logged_in, &Device::new(serial), settings).await
    }
}
