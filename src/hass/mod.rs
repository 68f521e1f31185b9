pub mod reconcile;

use crate::error::Error;
use crate::retry::{execute_once, retry, Request, Response, RetryPolicy};
use http::StatusCode;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use reconcile::Reconciler;

/// Base URL of Home Assistant core behind the add-on supervisor proxy.
pub const SUPERVISOR_URL: &str = "http://supervisor/core";

/// Legacy supervisor alias for the same proxy.
pub const ALTERNATE_PROXY_URL: &str = "http://hassio/homeassistant";

/// Registry platform and device identifier namespace.
pub const PLATFORM: &str = "sunsynk";

/// How Home Assistant is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    /// Configured scheme/host/port with a long-lived access token.
    Direct { base_url: String, token: String },
    /// Supervisor proxy with the platform-provided token.
    SupervisorProxy { token: String },
    /// Legacy `hassio` proxy alias, same token.
    AlternateProxy { token: String },
}

impl Addressing {
    pub fn base_url(&self) -> &str {
        match self {
            Addressing::Direct { base_url, .. } => base_url,
            Addressing::SupervisorProxy { .. } => SUPERVISOR_URL,
            Addressing::AlternateProxy { .. } => ALTERNATE_PROXY_URL,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Addressing::Direct { token, .. }
            | Addressing::SupervisorProxy { token }
            | Addressing::AlternateProxy { token } => token,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Addressing::Direct { base_url, .. } => format!("direct route {}", base_url),
            Addressing::SupervisorProxy { .. } => "supervisor proxy".to_string(),
            Addressing::AlternateProxy { .. } => "alternate proxy route".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attributes {
    pub friendly_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatePayload {
    pub state: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRegistration {
    pub entity_id: String,
    pub unique_id: String,
    pub platform: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRegistration {
    pub identifiers: Vec<[String; 2]>,
    pub name: String,
    pub manufacturer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

/// Home Assistant REST API client
#[derive(Debug, Clone)]
pub struct HomeAssistant {
    addressing: Addressing,
    client: Client,
    retry: RetryPolicy,
}

impl HomeAssistant {
    pub fn new(addressing: Addressing, client: Client, retry: RetryPolicy) -> Self {
        HomeAssistant {
            addressing,
            client,
            retry,
        }
    }

    /// Pre-flight: try each candidate in order and keep the first that answers.
    pub async fn connect(
        candidates: &[Addressing],
        client: &Client,
        retry: RetryPolicy,
    ) -> Result<HomeAssistant, Error> {
        for (index, addressing) in candidates.iter().enumerate() {
            let hass = HomeAssistant::new(addressing.clone(), client.clone(), retry);
            if hass.ping().await {
                if index > 0 {
                    log::warn!("Home Assistant reached through fallback {}", addressing.label());
                } else {
                    log::debug!("Home Assistant reachable through {}", addressing.label());
                }
                return Ok(hass);
            }
            log::warn!("Home Assistant not reachable through {}", addressing.label());
        }

        Err(Error::ConnectivityFailure(format!(
            "none of {} route(s) answered",
            candidates.len()
        )))
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.addressing.base_url(), path)
    }

    fn request(&self, request: Request) -> Request {
        request.bearer(self.addressing.token()).any_status()
    }

    /// Send with retries on transport errors and server-side failures; any other status is
    /// handed back to the caller.
    async fn send(&self, request: Request) -> Result<Response, Error> {
        let request = &self.request(request);
        let client = &self.client;
        let what = format!("{} {}", request.method, request.url);

        retry(&self.retry, &what, move |_| async move {
            let response = execute_once(client, request).await?;
            if response.status.is_server_error() {
                return Err(Error::RequestFailure(format!(
                    "{} {} returned {}: {}",
                    request.method, request.url, response.status, response.body
                )));
            }
            Ok(response)
        })
        .await
    }

    /// Health check, single attempt.
    pub async fn ping(&self) -> bool {
        let request = self.request(Request::get(self.url("/api/")));
        match execute_once(&self.client, &request).await {
            Ok(response) if response.status.is_success() => true,
            Ok(response) => {
                log::warn!("Health check failed: status {}", response.status);
                if response.status == StatusCode::UNAUTHORIZED {
                    log::warn!("Check the Home Assistant access token");
                }
                false
            }
            Err(e) => {
                log::warn!("Health check failed: {}", e);
                false
            }
        }
    }

    /// `Ok(None)` when the entity does not exist.
    pub async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>, Error> {
        let url = self.url(&format!("/api/states/{}", entity_id));
        let response = self.send(Request::get(url)).await?;

        match response.status {
            StatusCode::OK => serde_json::from_str(&response.body)
                .map(Some)
                .map_err(|e| Error::InvalidResponse(format!("{}: {}", entity_id, e))),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(failure(entity_id, status, response.body)),
        }
    }

    /// Create or overwrite the state of `entity_id`.
    pub async fn set_state(&self, entity_id: &str, payload: &StatePayload) -> Result<(), Error> {
        let url = self.url(&format!("/api/states/{}", entity_id));
        let body = serde_json::to_value(payload).map_err(|e| Error::InternalError(e.to_string()))?;
        let response = self.send(Request::post(url, body)).await?;

        if response.status.is_success() {
            Ok(())
        } else {
            Err(failure(entity_id, response.status, response.body))
        }
    }

    pub async fn register_entity(&self, registration: &EntityRegistration) -> Result<(), Error> {
        let url = self.url(&format!("/api/config/entity_registry/{}", registration.entity_id));
        let body =
            serde_json::to_value(registration).map_err(|e| Error::InternalError(e.to_string()))?;
        let response = self.send(Request::post(url, body)).await?;

        if response.status.is_success() {
            Ok(())
        } else {
            Err(failure(&registration.entity_id, response.status, response.body))
        }
    }

    /// Register or update a device grouping; returns the registry id when one is reported.
    pub async fn register_device(
        &self,
        device: &DeviceRegistration,
    ) -> Result<Option<String>, Error> {
        let url = self.url("/api/config/device_registry");
        let body = serde_json::to_value(device).map_err(|e| Error::InternalError(e.to_string()))?;
        let response = self.send(Request::post(url, body)).await?;

        if !response.status.is_success() {
            return Err(failure(&device.name, response.status, response.body));
        }
        Ok(serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(String::from)))
    }

    /// Ask Home Assistant to refresh `entity_ids`. Only a hint.
    pub async fn reload(&self, entity_ids: &[String]) -> Result<(), Error> {
        let url = self.url("/api/services/homeassistant/update_entity");
        let response = self
            .send(Request::post(url, json!({ "entity_id": entity_ids })))
            .await?;

        if response.status.is_success() {
            Ok(())
        } else {
            Err(failure("homeassistant.update_entity", response.status, response.body))
        }
    }

    /// Number of entities whose id starts with `prefix`.
    pub async fn count_entities(&self, prefix: &str) -> Result<usize, Error> {
        let response = self.send(Request::get(self.url("/api/states"))).await?;
        if !response.status.is_success() {
            return Err(failure("/api/states", response.status, response.body));
        }

        let states: Vec<EntityState> = serde_json::from_str(&response.body)
            .map_err(|e| Error::InvalidResponse(format!("/api/states: {}", e)))?;
        Ok(states
            .iter()
            .filter(|state| state.entity_id.starts_with(prefix))
            .count())
    }
}

fn failure(entity_id: &str, status: StatusCode, body: String) -> Error {
    Error::ReconcileFailure {
        entity_id: entity_id.to_string(),
        status: status.as_u16(),
        body,
    }
}
