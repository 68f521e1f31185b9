use chrono::NaiveDate;
use std::fmt;

pub type Endpoint = str;

pub const TOKEN: &Endpoint = "/oauth/token";

/// Columns requested from the day chart; order fixes the `infos` array order of the response.
pub const TEMPERATURE_COLUMNS: &str = "dc_temp,igbt_temp";

/// The per-device documents fetched every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointKind {
    Input = 0,
    Grid,
    Load,
    Battery,
    Output,
    Temperature,
    DeviceInfo,
    Settings,
}

impl EndpointKind {
    pub const COUNT: usize = 8;

    pub const ALL: [EndpointKind; EndpointKind::COUNT] = [
        EndpointKind::Input,
        EndpointKind::Grid,
        EndpointKind::Load,
        EndpointKind::Battery,
        EndpointKind::Output,
        EndpointKind::Temperature,
        EndpointKind::DeviceInfo,
        EndpointKind::Settings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EndpointKind::Input => "input",
            EndpointKind::Grid => "grid",
            EndpointKind::Load => "load",
            EndpointKind::Battery => "battery",
            EndpointKind::Output => "output",
            EndpointKind::Temperature => "temperature",
            EndpointKind::DeviceInfo => "device-info",
            EndpointKind::Settings => "settings",
        }
    }

    /// Path and query of this endpoint for inverter `serial`. `date` scopes the day chart.
    pub fn path(self, serial: &str, date: NaiveDate) -> String {
        match self {
            EndpointKind::Input => format!("/api/v1/inverter/{}/realtime/input", serial),
            EndpointKind::Grid => format!("/api/v1/inverter/grid/{0}/realtime?sn={0}", serial),
            EndpointKind::Load => format!("/api/v1/inverter/load/{0}/realtime?sn={0}", serial),
            EndpointKind::Battery => {
                format!("/api/v1/inverter/battery/{0}/realtime?sn={0}&lan=en", serial)
            }
            EndpointKind::Output => format!("/api/v1/inverter/{}/realtime/output", serial),
            EndpointKind::Temperature => format!(
                "/api/v1/inverter/{}/output/day?lan=en&date={}&column={}",
                serial,
                date.format("%Y-%m-%d"),
                TEMPERATURE_COLUMNS
            ),
            EndpointKind::DeviceInfo => format!("/api/v1/inverter/{}", serial),
            EndpointKind::Settings => format!("/api/v1/common/setting/{}/read", serial),
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn settings_write(serial: &str) -> String {
    format!("/api/v1/common/setting/{}/set", serial)
}
