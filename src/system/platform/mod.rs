use super::source::MetricResult;

pub trait PlatformExtensions {
    fn cpu_model() -> MetricResult<String>;
    fn cpu_temperature() -> MetricResult<f64>;
    fn interface_is_up(name: &str) -> Option<bool>;
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod other;

#[cfg(target_os = "linux")]
use linux as platform_impl;
#[cfg(target_os = "macos")]
use macos as platform_impl;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
use other as platform_impl;

pub fn cpu_model() -> MetricResult<String> {
    platform_impl::Platform::cpu_model()
}

/// Degrees Celsius.
pub fn cpu_temperature() -> MetricResult<f64> {
    platform_impl::Platform::cpu_temperature()
}

pub fn interface_is_up(name: &str) -> Option<bool> {
    platform_impl::Platform::interface_is_up(name)
}

/// Strip the trademark noise vendors put into brand strings.
pub(crate) fn clean_cpu_model(raw: &str) -> String {
    raw.replace("(R)", "")
        .replace("(TM)", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers_do_not_panic() {
        let _ = cpu_model();
        let _ = cpu_temperature();
        let _ = interface_is_up("lo");
        let _ = interface_is_up("definitely-not-an-interface");
    }

    #[test]
    fn clean_cpu_model_removes_marks() {
        assert_eq!(
            clean_cpu_model("Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz"),
            "Intel Core i7-8700K CPU @ 3.70GHz"
        );
    }
}
