use std::path::PathBuf;

use super::super::source::{MetricError, MetricResult};
use super::{PlatformExtensions, clean_cpu_model};

const IFF_UP: u32 = 0x1;

pub struct Platform;

impl PlatformExtensions for Platform {
    fn cpu_model() -> MetricResult<String> {
        let contents = std::fs::read_to_string("/proc/cpuinfo")?;
        parse_cpuinfo_model(&contents)
            .ok_or_else(|| MetricError::Unavailable("no `model name` in /proc/cpuinfo".into()))
    }

    fn cpu_temperature() -> MetricResult<f64> {
        // First readable thermal zone wins; zones are numbered in sysfs order.
        let mut zones: Vec<PathBuf> = std::fs::read_dir("/sys/class/thermal")?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("thermal_zone"))
            })
            .collect();
        zones.sort();

        for zone in zones {
            if let Ok(raw) = std::fs::read_to_string(zone.join("temp"))
                && let Some(celsius) = parse_millidegrees(&raw)
            {
                return Ok(celsius);
            }
        }
        Err(MetricError::Unavailable("no readable thermal zone".into()))
    }

    fn interface_is_up(name: &str) -> Option<bool> {
        // /sys/class/net/<if>/flags holds the IFF_* bitmask as hex, e.g. "0x1003".
        let path = format!("/sys/class/net/{name}/flags");
        let contents = std::fs::read_to_string(path).ok()?;
        let flags = u32::from_str_radix(contents.trim().trim_start_matches("0x"), 16).ok()?;
        Some(flags & IFF_UP != 0)
    }
}

fn parse_cpuinfo_model(contents: &str) -> Option<String> {
    contents
        .lines()
        .find(|line| line.trim_start().starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| clean_cpu_model(value.trim()))
        .filter(|model| !model.is_empty())
}

fn parse_millidegrees(raw: &str) -> Option<f64> {
    raw.trim().parse::<i64>().ok().map(|m| m as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_name_line() {
        let cpuinfo = "processor\t: 0\nvendor_id\t: GenuineIntel\nmodel name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz\n";
        assert_eq!(
            parse_cpuinfo_model(cpuinfo).as_deref(),
            Some("Intel Xeon CPU E5-2680 v4 @ 2.40GHz")
        );
    }

    #[test]
    fn missing_model_name_is_none() {
        assert!(parse_cpuinfo_model("processor\t: 0\nHardware\t: BCM2835\n").is_none());
    }

    #[test]
    fn millidegrees_convert_to_celsius() {
        assert_eq!(parse_millidegrees("45500\n"), Some(45.5));
        assert_eq!(parse_millidegrees("garbage"), None);
    }
}
