//! Display metadata for every published sensor key.
//!
//! Keys listed in the descriptor table get their name, unit and class from it. Anything else
//! goes through the ordered suffix rules, and failing those is published without unit or class.

use std::borrow::Cow;
use std::collections::HashMap;

type CowStr = Cow<'static, str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorClass {
    Power,
    Energy,
    Voltage,
    Current,
    Frequency,
    Temperature,
    Battery,
}

impl SensorClass {
    pub const fn device_class(self) -> &'static str {
        match self {
            SensorClass::Power => "power",
            SensorClass::Energy => "energy",
            SensorClass::Voltage => "voltage",
            SensorClass::Current => "current",
            SensorClass::Frequency => "frequency",
            SensorClass::Temperature => "temperature",
            SensorClass::Battery => "battery",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            SensorClass::Power => "W",
            SensorClass::Energy => "kWh",
            SensorClass::Voltage => "V",
            SensorClass::Current => "A",
            SensorClass::Frequency => "Hz",
            SensorClass::Temperature => "°C",
            SensorClass::Battery => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub name: CowStr,
    pub unit: Option<CowStr>,
    pub class: Option<SensorClass>,
    /// Cumulative counter (`total_increasing`), as opposed to an instantaneous measurement.
    pub monotonic: bool,
}

impl SensorDescriptor {
    pub fn device_class(&self) -> Option<&'static str> {
        self.class.map(SensorClass::device_class)
    }

    pub fn state_class(&self) -> Option<&'static str> {
        match (self.monotonic, self.class) {
            (true, _) => Some("total_increasing"),
            (false, Some(_)) => Some("measurement"),
            (false, None) => None,
        }
    }
}

struct Entry {
    key: &'static str,
    name: &'static str,
    unit: Option<&'static str>,
    class: Option<SensorClass>,
    monotonic: bool,
}

const fn measured(key: &'static str, name: &'static str, class: SensorClass) -> Entry {
    Entry {
        key,
        name,
        unit: Some(class.unit()),
        class: Some(class),
        monotonic: false,
    }
}

const fn counter(key: &'static str, name: &'static str) -> Entry {
    Entry {
        key,
        name,
        unit: Some("kWh"),
        class: Some(SensorClass::Energy),
        monotonic: true,
    }
}

const fn plain(key: &'static str, name: &'static str, unit: Option<&'static str>) -> Entry {
    Entry {
        key,
        name,
        unit,
        class: None,
        monotonic: false,
    }
}

use SensorClass::*;

const DESCRIPTORS: &[Entry] = &[
    /* PV input */
    measured("pv1_voltage", "PV1 Voltage", Voltage),
    measured("pv1_current", "PV1 Current", Current),
    measured("pv1_power", "PV1 Power", Power),
    measured("pv2_voltage", "PV2 Voltage", Voltage),
    measured("pv2_current", "PV2 Current", Current),
    measured("pv2_power", "PV2 Power", Power),
    measured("pv_power", "PV Power", Power),
    counter("day_pv_energy", "Daily PV Energy"),
    counter("total_pv_energy", "Total PV Energy"),
    /* grid */
    measured("grid_power", "Grid Power", Power),
    measured("grid_voltage", "Grid Voltage", Voltage),
    measured("grid_current", "Grid Current", Current),
    measured("grid_l2_power", "Grid L2 Power", Power),
    measured("grid_l2_voltage", "Grid L2 Voltage", Voltage),
    measured("grid_l2_current", "Grid L2 Current", Current),
    measured("grid_l3_power", "Grid L3 Power", Power),
    measured("grid_l3_voltage", "Grid L3 Voltage", Voltage),
    measured("grid_l3_current", "Grid L3 Current", Current),
    measured("grid_total_power", "Grid Total Power", Power),
    measured("grid_frequency", "Grid Frequency", Frequency),
    plain("grid_connected_status", "Grid Connected Status", None),
    counter("day_grid_import", "Daily Grid Import"),
    counter("day_grid_export", "Daily Grid Export"),
    counter("total_grid_import", "Total Grid Import"),
    counter("total_grid_export", "Total Grid Export"),
    /* load */
    measured("load_power", "Load Power", Power),
    measured("load_voltage", "Load Voltage", Voltage),
    measured("load_current", "Load Current", Current),
    measured("load_l1_power", "Load L1 Power", Power),
    measured("load_l2_power", "Load L2 Power", Power),
    measured("load_l3_power", "Load L3 Power", Power),
    measured("load_frequency", "Load Frequency", Frequency),
    measured("load_ups_power", "Load UPS Power", Power),
    counter("day_load_energy", "Daily Load Energy"),
    counter("total_load_energy", "Total Load Energy"),
    /* battery */
    measured("battery_soc", "Battery SOC", Battery),
    measured("battery_voltage", "Battery Voltage", Voltage),
    measured("battery_current", "Battery Current", Current),
    measured("battery_power", "Battery Power", Power),
    measured("battery_temperature", "Battery Temperature", Temperature),
    plain("battery_capacity", "Battery Capacity", Some("Ah")),
    plain("battery_type", "Battery Type", None),
    plain("battery_status", "Battery Status", None),
    measured("battery_charge_voltage", "Battery Charge Voltage", Voltage),
    measured("battery_discharge_voltage", "Battery Discharge Voltage", Voltage),
    counter("day_battery_charge", "Daily Battery Charge"),
    counter("day_battery_discharge", "Daily Battery Discharge"),
    counter("total_battery_charge", "Total Battery Charge"),
    counter("total_battery_discharge", "Total Battery Discharge"),
    /* inverter output */
    measured("inverter_power", "Inverter Power", Power),
    measured("inverter_voltage", "Inverter Voltage", Voltage),
    measured("inverter_current", "Inverter Current", Current),
    measured("inverter_frequency", "Inverter Frequency", Frequency),
    measured("inverter_output_power", "Inverter Output Power", Power),
    /* temperature */
    measured("dc_temperature", "Inverter DC Temperature", Temperature),
    measured("ac_temperature", "Inverter AC Temperature", Temperature),
    /* device info */
    plain("overall_state", "Inverter Overall State", None),
    plain("run_status", "Inverter Run Status", None),
    measured("rated_power", "Inverter Rated Power", Power),
    plain("master_firmware", "Inverter Master Firmware", None),
    plain("comm_firmware", "Inverter Comm Firmware", None),
    /* settings */
    plain("work_mode", "System Work Mode", None),
    plain("priority_load", "Priority Load", None),
    plain("use_timer", "Use Timer", None),
    plain("solar_export", "Solar Export", None),
    measured("battery_max_charge_current", "Battery Max Charge Current", Current),
    measured("battery_max_discharge_current", "Battery Max Discharge Current", Current),
    measured("battery_shutdown_capacity", "Battery Shutdown Capacity", Battery),
    measured("battery_restart_capacity", "Battery Restart Capacity", Battery),
    measured("battery_low_capacity", "Battery Low Capacity", Battery),
];

/// Fallback classification by key suffix, first match wins.
const SUFFIX_RULES: &[(&str, SensorClass)] = &[
    ("_power", Power),
    ("_energy", Energy),
    ("_voltage", Voltage),
    ("_current", Current),
    ("_frequency", Frequency),
    ("_temperature", Temperature),
    ("_temp", Temperature),
    ("_soc", Battery),
    ("_capacity", Battery),
];

lazy_static! {
    static ref INDEX: HashMap<&'static str, &'static Entry> =
        DESCRIPTORS.iter().map(|entry| (entry.key, entry)).collect();
}

/// Descriptor for `key`, from the table when listed, else inferred from its suffix.
pub fn describe(key: &str) -> SensorDescriptor {
    if let Some(entry) = INDEX.get(key) {
        return SensorDescriptor {
            name: Cow::Borrowed(entry.name),
            unit: entry.unit.map(Cow::Borrowed),
            class: entry.class,
            monotonic: entry.monotonic,
        };
    }

    let class = SUFFIX_RULES
        .iter()
        .find(|(suffix, _)| key.ends_with(suffix))
        .map(|(_, class)| *class);

    SensorDescriptor {
        name: Cow::Owned(title_case(key)),
        unit: class.map(|c| Cow::Borrowed(c.unit())),
        class,
        monotonic: class == Some(Energy),
    }
}

pub fn is_listed(key: &str) -> bool {
    INDEX.contains_key(key)
}

/* "prog1_power" -> "Prog1 Power" */
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
