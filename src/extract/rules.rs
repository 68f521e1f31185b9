use crate::api::endpoint::EndpointKind::{self, *};

/// Where a sensor value lives inside its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// JSON pointer to a scalar.
    Field(&'static str),
    /// JSON pointer to a time-series array; the `value` of its last record is taken.
    LastRecord(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub key: &'static str,
    pub source: EndpointKind,
    pub locator: Locator,
}

const fn field(key: &'static str, source: EndpointKind, pointer: &'static str) -> Rule {
    Rule {
        key,
        source,
        locator: Locator::Field(pointer),
    }
}

const fn last_record(key: &'static str, source: EndpointKind, pointer: &'static str) -> Rule {
    Rule {
        key,
        source,
        locator: Locator::LastRecord(pointer),
    }
}

pub const RULES: &[Rule] = &[
    field("pv1_voltage", Input, "/data/pvIV/0/vpv"),
    field("pv1_current", Input, "/data/pvIV/0/ipv"),
    field("pv1_power", Input, "/data/pvIV/0/ppv"),
    field("pv2_voltage", Input, "/data/pvIV/1/vpv"),
    field("pv2_current", Input, "/data/pvIV/1/ipv"),
    field("pv2_power", Input, "/data/pvIV/1/ppv"),
    field("pv_power", Input, "/data/pac"),
    field("day_pv_energy", Input, "/data/etoday"),
    field("total_pv_energy", Input, "/data/etotal"),
    /* three-phase tuples, L1 first */
    field("grid_power", Grid, "/data/vip/0/power"),
    field("grid_voltage", Grid, "/data/vip/0/volt"),
    field("grid_current", Grid, "/data/vip/0/current"),
    field("grid_l2_power", Grid, "/data/vip/1/power"),
    field("grid_l2_voltage", Grid, "/data/vip/1/volt"),
    field("grid_l2_current", Grid, "/data/vip/1/current"),
    field("grid_l3_power", Grid, "/data/vip/2/power"),
    field("grid_l3_voltage", Grid, "/data/vip/2/volt"),
    field("grid_l3_current", Grid, "/data/vip/2/current"),
    field("grid_total_power", Grid, "/data/pac"),
    field("grid_frequency", Grid, "/data/fac"),
    field("grid_connected_status", Grid, "/data/status"),
    field("day_grid_import", Grid, "/data/etodayFrom"),
    field("day_grid_export", Grid, "/data/etodayTo"),
    field("total_grid_import", Grid, "/data/etotalFrom"),
    field("total_grid_export", Grid, "/data/etotalTo"),
    field("load_power", Load, "/data/totalPower"),
    field("load_voltage", Load, "/data/vip/0/volt"),
    field("load_current", Load, "/data/vip/0/current"),
    field("load_l1_power", Load, "/data/vip/0/power"),
    field("load_l2_power", Load, "/data/vip/1/power"),
    field("load_l3_power", Load, "/data/vip/2/power"),
    field("load_frequency", Load, "/data/loadFac"),
    field("load_ups_power", Load, "/data/upsPowerTotal"),
    field("day_load_energy", Load, "/data/dailyUsed"),
    field("total_load_energy", Load, "/data/totalUsed"),
    field("battery_soc", Battery, "/data/soc"),
    field("battery_voltage", Battery, "/data/voltage"),
    field("battery_current", Battery, "/data/current"),
    field("battery_power", Battery, "/data/power"),
    field("battery_temperature", Battery, "/data/temp"),
    field("battery_capacity", Battery, "/data/capacity"),
    field("battery_type", Battery, "/data/type"),
    field("battery_status", Battery, "/data/status"),
    field("battery_charge_voltage", Battery, "/data/chargeVolt"),
    field("battery_discharge_voltage", Battery, "/data/dischargeVolt"),
    /* charge and discharge counters sit side by side in the battery document */
    field("day_battery_charge", Battery, "/data/etodayChg"),
    field("day_battery_discharge", Battery, "/data/etodayDischg"),
    field("total_battery_charge", Battery, "/data/etotalChg"),
    field("total_battery_discharge", Battery, "/data/etotalDischg"),
    field("inverter_power", Output, "/data/pInv"),
    field("inverter_voltage", Output, "/data/vip/0/volt"),
    field("inverter_current", Output, "/data/vip/0/current"),
    field("inverter_frequency", Output, "/data/fac"),
    field("inverter_output_power", Output, "/data/pac"),
    /* `infos` follows the requested column order: dc_temp, igbt_temp */
    last_record("dc_temperature", Temperature, "/data/infos/0/records"),
    last_record("ac_temperature", Temperature, "/data/infos/1/records"),
    field("overall_state", DeviceInfo, "/data/status"),
    field("run_status", DeviceInfo, "/data/runStatus"),
    field("rated_power", DeviceInfo, "/data/ratePower"),
    field("master_firmware", DeviceInfo, "/data/version/masterVer"),
    field("comm_firmware", DeviceInfo, "/data/version/softVer"),
    field("work_mode", Settings, "/data/sysWorkMode"),
    field("priority_load", Settings, "/data/energyMode"),
    field("use_timer", Settings, "/data/peakAndVallery"),
    field("solar_export", Settings, "/data/solarSell"),
    field("battery_max_charge_current", Settings, "/data/batteryMaxCurrentCharge"),
    field("battery_max_discharge_current", Settings, "/data/batteryMaxCurrentDischarge"),
    field("battery_shutdown_capacity", Settings, "/data/batteryShutdownCap"),
    field("battery_restart_capacity", Settings, "/data/batteryRestartCap"),
    field("battery_low_capacity", Settings, "/data/batteryLowCap"),
    /* time-of-use programs */
    field("prog1_time", Settings, "/data/sellTime1"),
    field("prog1_power", Settings, "/data/sellTime1Pac"),
    field("prog1_capacity", Settings, "/data/cap1"),
    field("prog1_grid_charge", Settings, "/data/time1on"),
    field("prog2_time", Settings, "/data/sellTime2"),
    field("prog2_power", Settings, "/data/sellTime2Pac"),
    field("prog2_capacity", Settings, "/data/cap2"),
    field("prog2_grid_charge", Settings, "/data/time2on"),
    field("prog3_time", Settings, "/data/sellTime3"),
    field("prog3_power", Settings, "/data/sellTime3Pac"),
    field("prog3_capacity", Settings, "/data/cap3"),
    field("prog3_grid_charge", Settings, "/data/time3on"),
    field("prog4_time", Settings, "/data/sellTime4"),
    field("prog4_power", Settings, "/data/sellTime4Pac"),
    field("prog4_capacity", Settings, "/data/cap4"),
    field("prog4_grid_charge", Settings, "/data/time4on"),
    field("prog5_time", Settings, "/data/sellTime5"),
    field("prog5_power", Settings, "/data/sellTime5Pac"),
    field("prog5_capacity", Settings, "/data/cap5"),
    field("prog5_grid_charge", Settings, "/data/time5on"),
    field("prog6_time", Settings, "/data/sellTime6"),
    field("prog6_power", Settings, "/data/sellTime6Pac"),
    field("prog6_capacity", Settings, "/data/cap6"),
    field("prog6_grid_charge", Settings, "/data/time6on"),
];

/// Keys sourced from documents of `kind`.
pub fn keys_from(kind: EndpointKind) -> impl Iterator<Item = &'static str> {
    RULES
        .iter()
        .filter(move |rule| rule.source == kind)
        .map(|rule| rule.key)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_unique() {
        let keys: HashSet<&str> = RULES.iter().map(|rule| rule.key).collect();
        assert_eq!(RULES.len(), keys.len());
    }

    #[test]
    fn every_endpoint_feeds_some_key() {
        for kind in EndpointKind::ALL.iter() {
            assert!(keys_from(*kind).next().is_some(), "{} unused", kind);
        }
    }

    #[test]
    fn pointers_are_absolute() {
        for rule in RULES {
            let pointer = match rule.locator {
                Locator::Field(p) | Locator::LastRecord(p) => p,
            };
            assert!(pointer.starts_with("/data/"), "{}", rule.key);
        }
    }
}
