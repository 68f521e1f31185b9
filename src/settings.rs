use crate::api;
use crate::diagnostics::Diagnostics;
use crate::error::Error;
use crate::hass::Addressing;
use crate::model::Device;
use crate::sync::Context;
use config::Config;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const API_URL: &str = "https://api.sunsynk.net";
pub const OPTIONS_FILE: &str = "/data/options.json";
pub const ENV_PREFIX: &str = "SUNSYNK";

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub username: String,
    pub password: String,
    /// Inverter serial numbers, separated by `;`.
    pub serials: String,
    pub api_url: String,
    pub ha_scheme: String,
    pub ha_host: String,
    pub ha_port: u16,
    /// Long-lived access token; the supervisor proxy is used when empty.
    pub ha_token: String,
    /// Seconds between poll cycles.
    pub interval: u64,
    pub verbose: bool,
    pub entity_prefix: String,
    /// Per-request transport timeout in seconds.
    pub timeout: u64,
    pub diagnostics_dir: String,
    #[serde(skip)]
    pub supervisor_token: Option<String>,
}

impl Settings {
    /// Defaults, then `file` when it exists, then `<env_prefix>_*` environment variables.
    pub fn load_from(file: Option<&Path>, env_prefix: &str) -> Result<Settings, Error> {
        let mut settings = Config::default();
        settings
            .set_default("username", "")?
            .set_default("password", "")?
            .set_default("serials", "")?
            .set_default("api_url", API_URL)?
            .set_default("ha_scheme", "http")?
            .set_default("ha_host", "homeassistant.local")?
            .set_default("ha_port", 8123i64)?
            .set_default("ha_token", "")?
            .set_default("interval", 300i64)?
            .set_default("verbose", false)?
            .set_default("entity_prefix", "sunsynk")?
            .set_default("timeout", 30i64)?
            .set_default("diagnostics_dir", "/tmp/sunsynk-rs")?;

        if let Some(file) = file {
            settings.merge(config::File::from(file).required(false))?;
        }
        settings.merge(config::Environment::with_prefix(env_prefix))?;

        let mut settings: Settings = settings.try_into()?;
        settings.supervisor_token = std::env::var("SUPERVISOR_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        Ok(settings)
    }

    /// Options file `file` plus `SUNSYNK_*` variables.
    pub fn load(file: &Path) -> Result<Settings, Error> {
        Settings::load_from(Some(file), ENV_PREFIX)
    }

    /// Enough to talk to the upstream API.
    pub fn validate_upstream(&self) -> Result<(), Error> {
        required(&[
            ("username", &self.username),
            ("password", &self.password),
            ("api_url", &self.api_url),
        ])?;
        if self.timeout == 0 {
            return Err(Error::ConfigError("timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Everything the polling service needs.
    pub fn validate(&self) -> Result<(), Error> {
        self.validate_upstream()?;
        required(&[
            ("serials", &self.serials),
            ("entity_prefix", &self.entity_prefix),
        ])?;

        let devices = self.devices();
        if devices.is_empty() {
            return Err(Error::ConfigError("no inverter serial configured".to_string()));
        }
        if let Some(device) = devices.iter().find(|device| !device.has_valid_serial()) {
            return Err(Error::ConfigError(format!(
                "inverter serial '{}' may only contain letters and digits",
                device
            )));
        }
        let mut seen = HashSet::new();
        if let Some(device) = devices
            .iter()
            .find(|device| !seen.insert(device.serial.to_lowercase()))
        {
            return Err(Error::ConfigError(format!(
                "inverter serial '{}' is listed more than once",
                device
            )));
        }
        if self.interval == 0 {
            return Err(Error::ConfigError("interval must be positive".to_string()));
        }
        if self.ha_scheme != "http" && self.ha_scheme != "https" {
            return Err(Error::ConfigError(format!(
                "unsupported Home Assistant scheme: {}",
                self.ha_scheme
            )));
        }
        if self.routes().is_empty() {
            return Err(Error::ConfigError(
                "no Home Assistant token: set ha_token or run under the supervisor".to_string(),
            ));
        }
        Ok(())
    }

    pub fn devices(&self) -> Vec<Device> {
        Device::parse_list(&self.serials)
    }

    pub fn ha_base_url(&self) -> String {
        format!("{}://{}:{}", self.ha_scheme, self.ha_host, self.ha_port)
    }

    /// Downstream routes in the order they are tried: the configured one, then the proxy
    /// routes, then the direct route with whichever token is available. No route appears twice.
    pub fn routes(&self) -> Vec<Addressing> {
        let ha_token = Some(self.ha_token.trim())
            .filter(|token| !token.is_empty())
            .map(String::from);
        let supervisor = self.supervisor_token.clone();

        let configured = match (&ha_token, &supervisor) {
            (Some(token), _) => Some(Addressing::Direct {
                base_url: self.ha_base_url(),
                token: token.clone(),
            }),
            (None, Some(token)) => Some(Addressing::SupervisorProxy {
                token: token.clone(),
            }),
            (None, None) => None,
        };
        let proxies = supervisor.iter().flat_map(|token| {
            vec![
                Addressing::SupervisorProxy {
                    token: token.clone(),
                },
                Addressing::AlternateProxy {
                    token: token.clone(),
                },
            ]
        });
        let direct = ha_token
            .clone()
            .or_else(|| supervisor.clone())
            .map(|token| Addressing::Direct {
                base_url: self.ha_base_url(),
                token,
            });

        let mut routes: Vec<Addressing> = Vec::new();
        for route in configured.into_iter().chain(proxies).chain(direct) {
            if !routes.contains(&route) {
                routes.push(route);
            }
        }
        routes
    }

    pub fn context(&self) -> Context {
        Context {
            api: api::api(
                self.api_url.trim_end_matches('/').to_string(),
                self.username.clone(),
                self.password.clone(),
            ),
            devices: self.devices(),
            routes: self.routes(),
            entity_prefix: self.entity_prefix.clone(),
            interval: Duration::from_secs(self.interval),
            timeout: Duration::from_secs(self.timeout),
            diagnostics: if self.verbose {
                Diagnostics::new(&self.diagnostics_dir)
            } else {
                Diagnostics::disabled()
            },
        }
    }
}

fn required(fields: &[(&str, &String)]) -> Result<(), Error> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "missing required setting(s): {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn options_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sunsynk-rs-{}-{}.json",
            name,
            std::process::id()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn options_file_over_defaults() {
        let path = options_file(
            "options",
            r#"{"username": "user@example.com", "password": "secret",
                "serials": "123456;789012", "ha_token": "ha-token", "interval": 60}"#,
        );
        let settings = Settings::load_from(Some(&path), "SUNSYNKTEST_FILE").unwrap();
        fs::remove_file(&path).unwrap();

        assert!(settings.validate().is_ok());
        assert_eq!(60, settings.interval);
        assert_eq!(API_URL, settings.api_url);
        assert_eq!("http://homeassistant.local:8123", settings.ha_base_url());
        assert_eq!(
            vec![Device::new("123456"), Device::new("789012")],
            settings.devices()
        );
    }

    #[test]
    fn environment_over_file() {
        let path = options_file(
            "env",
            r#"{"username": "file-user", "password": "secret", "serials": "123456"}"#,
        );
        std::env::set_var("SUNSYNKTEST_ENV_USERNAME", "env-user");
        std::env::set_var("SUNSYNKTEST_ENV_HA_PORT", "8443");
        std::env::set_var("SUNSYNKTEST_ENV_VERBOSE", "true");
        let settings = Settings::load_from(Some(&path), "SUNSYNKTEST_ENV").unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!("env-user", settings.username);
        assert_eq!(8443, settings.ha_port);
        assert!(settings.verbose);
        assert!(settings.context().diagnostics.dir().is_some());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let settings =
            Settings::load_from(Some(Path::new("/nonexistent/options.json")), "SUNSYNKTEST_NONE")
                .unwrap();
        match settings.validate() {
            Err(Error::ConfigError(msg)) => {
                assert!(msg.contains("username"));
                assert!(msg.contains("password"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn valid() -> Settings {
        let mut settings =
            Settings::load_from(None, "SUNSYNKTEST_VALID").unwrap();
        settings.username = "user".to_string();
        settings.password = "pass".to_string();
        settings.serials = "123456".to_string();
        settings.ha_token = "ha-token".to_string();
        settings.supervisor_token = None;
        settings
    }

    #[test]
    fn validation_rules() {
        assert!(valid().validate().is_ok());

        let mut settings = valid();
        settings.serials = " ; ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.ha_scheme = "ftp".to_string();
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.interval = 0;
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.serials = "123456;789012".to_string();
        assert!(settings.validate().is_ok());

        let mut settings = valid();
        settings.serials = String::new();
        settings.ha_token = String::new();
        assert!(settings.validate_upstream().is_ok());
        settings.password = String::new();
        assert!(settings.validate_upstream().is_err());

        let mut settings = valid();
        settings.ha_token = String::new();
        assert!(settings.validate().is_err());
        settings.supervisor_token = Some("supervisor".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn route_order() {
        let mut settings = valid();
        settings.supervisor_token = Some("supervisor".to_string());
        let routes = settings.routes();
        assert_eq!(3, routes.len());
        assert_eq!(
            Addressing::Direct {
                base_url: "http://homeassistant.local:8123".to_string(),
                token: "ha-token".to_string()
            },
            routes[0]
        );
        assert!(matches!(routes[1], Addressing::SupervisorProxy { .. }));
        assert!(matches!(routes[2], Addressing::AlternateProxy { .. }));

        settings.supervisor_token = None;
        assert_eq!(1, settings.routes().len());
    }

    #[test]
    fn supervisor_only_still_has_fallbacks() {
        let mut settings = valid();
        settings.ha_token = String::new();
        settings.supervisor_token = Some("supervisor".to_string());

        let token = "supervisor".to_string();
        assert_eq!(
            vec![
                Addressing::SupervisorProxy {
                    token: token.clone()
                },
                Addressing::AlternateProxy {
                    token: token.clone()
                },
                Addressing::Direct {
                    base_url: "http://homeassistant.local:8123".to_string(),
                    token
                },
            ],
            settings.routes()
        );
    }

    #[test]
    fn colliding_serials_are_rejected() {
        let mut settings = valid();
        settings.serials = "AB-12;AB_12".to_string();
        assert!(settings.validate().is_err());

        settings.serials = "ab12;AB12".to_string();
        match settings.validate() {
            Err(Error::ConfigError(msg)) => assert!(msg.contains("more than once")),
            other => panic!("unexpected {:?}", other),
        }

        settings.serials = "AB12;AB13".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn context_from_settings() {
        let mut settings = valid();
        settings.api_url = "https://api.sunsynk.net/".to_string();
        let context = settings.context();
        assert_eq!("https://api.sunsynk.net", context.api.api_url);
        assert_eq!(1, context.devices.len());
        assert_eq!(Duration::from_secs(300), context.interval);
        assert!(context.diagnostics.dir().is_none());
    }
}
