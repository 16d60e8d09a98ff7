use super::super::source::{MetricError, MetricResult};
use super::PlatformExtensions;

pub struct Platform;

impl PlatformExtensions for Platform {
    fn cpu_model() -> MetricResult<String> {
        Err(MetricError::Unsupported)
    }

    fn cpu_temperature() -> MetricResult<f64> {
        Err(MetricError::Unsupported)
    }

    fn interface_is_up(_name: &str) -> Option<bool> {
        None
    }
}
