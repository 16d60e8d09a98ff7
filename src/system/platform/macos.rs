use std::ffi::{CStr, CString};

use super::super::source::{MetricError, MetricResult};
use super::{PlatformExtensions, clean_cpu_model};

pub struct Platform;

impl PlatformExtensions for Platform {
    fn cpu_model() -> MetricResult<String> {
        let raw = sysctl_string("machdep.cpu.brand_string")?;
        let model = clean_cpu_model(&raw);
        if model.is_empty() {
            return Err(MetricError::Unavailable("empty cpu brand string".into()));
        }
        Ok(model)
    }

    fn cpu_temperature() -> MetricResult<f64> {
        // SMC sensors need private frameworks.
        Err(MetricError::Unsupported)
    }

    fn interface_is_up(name: &str) -> Option<bool> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return None;
        }

        let mut found = None;
        let mut cursor = head;
        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            if !entry.ifa_name.is_null() {
                let ifa_name = unsafe { CStr::from_ptr(entry.ifa_name) };
                if ifa_name.to_bytes() == name.as_bytes() {
                    found = Some(entry.ifa_flags & libc::IFF_UP as u32 != 0);
                    break;
                }
            }
            cursor = entry.ifa_next;
        }

        unsafe { libc::freeifaddrs(head) };
        found
    }
}

fn sysctl_string(key: &str) -> MetricResult<String> {
    let name = CString::new(key).map_err(|e| MetricError::Unavailable(e.to_string()))?;

    let mut len: libc::size_t = 0;
    let rc = unsafe {
        libc::sysctlbyname(
            name.as_ptr(),
            std::ptr::null_mut(),
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    let mut buf = vec![0u8; len];
    let rc = unsafe {
        libc::sysctlbyname(
            name.as_ptr(),
            buf.as_mut_ptr().cast(),
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    buf.truncate(len);
    let text = CStr::from_bytes_until_nul(&buf)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&buf).into_owned());
    Ok(text)
}
