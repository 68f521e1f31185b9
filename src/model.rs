use crate::api::endpoint::EndpointKind;
use crate::retry::RetryPolicy;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Sensor key to raw upstream scalar. Keys without a resolvable value are absent, never "0".
pub type SensorMap = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct Api {
    pub api_url: String,
    pub username: String,
    pub password: String,
    pub auth_retry: RetryPolicy,
    pub data_retry: RetryPolicy,
}

/// Upstream session for one poll cycle.
#[derive(Debug, Clone)]
pub struct LoggedInApi {
    pub api_url: String,
    pub credential: Credential,
    pub client: reqwest::Client,
    pub auth_retry: RetryPolicy,
    pub data_retry: RetryPolicy,
}

/// Bearer token for the upstream API. Only ever built from a successful token response and
/// never carried across a poll cycle.
#[derive(Clone)]
pub struct Credential {
    pub token: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &format!("<{} chars>", self.token.len()))
            .finish()
    }
}

/// One inverter, identified by its serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Device {
    pub serial: String,
}

impl Device {
    pub fn new(serial: impl Into<String>) -> Self {
        Device {
            serial: serial.into(),
        }
    }

    /// Parse a semicolon-separated serial list, keeping configuration order and dropping blanks.
    pub fn parse_list(serials: &str) -> Vec<Device> {
        serials
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Device::new)
            .collect()
    }

    /// Serials end up inside entity ids, where anything but letters and digits would be
    /// folded to `_`.
    pub fn has_valid_serial(&self) -> bool {
        !self.serial.is_empty() && self.serial.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serial)
    }
}

/// Raw documents fetched for one device in one cycle, one slot per endpoint kind.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    documents: [Option<Value>; EndpointKind::COUNT],
}

impl Bundle {
    pub fn insert(&mut self, kind: EndpointKind, document: Value) {
        self.documents[kind as usize] = Some(document);
    }

    pub fn get(&self, kind: EndpointKind) -> Option<&Value> {
        self.documents[kind as usize].as_ref()
    }

    pub fn present(&self) -> usize {
        self.documents.iter().filter(|d| d.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.present() == 0
    }

    pub fn missing(&self) -> Vec<EndpointKind> {
        EndpointKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.get(*kind).is_none())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub updated: usize,
    pub failed: BTreeSet<String>,
}
