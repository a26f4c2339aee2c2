//! Facts about the host the bridge runs on.
//!
//! None of these lookups fail: a fact that can't be read comes back empty (or zero), so that a
//! missing diagnostic never prevents building discovery metadata.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Access to hardware and operating system facts.
pub trait HardwareEnvironment: Send + Sync {
    /// Human readable CPU or board model.
    fn cpu_model(&self) -> String;
    /// Stable hardware identifier, lowercase hex without separators.
    fn object_id(&self) -> String;
    /// CPU temperature in degrees Celsius.
    fn cpu_temperature(&self) -> f64;
    fn os_pretty_name(&self) -> String;
    /// Time since the last restart, human readable.
    fn uptime(&self) -> String;
    /// Time of the last restart, as RFC 3339.
    fn last_restart(&self) -> String;
}

/// Reads facts from the usual Linux locations (`/proc`, `/sys`, `/etc`).
#[derive(Clone, Debug)]
pub struct LinuxEnvironment {
    root: PathBuf,
}

impl Default for LinuxEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxEnvironment {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Resolve all paths relative to `root` instead of `/`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, path: impl AsRef<Path>) -> Option<String> {
        let path = self.root.join(path);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(err) => {
                log::debug!("Unable to read {}: {err}", path.display());
                None
            }
        }
    }

    fn uptime_duration(&self) -> Option<Duration> {
        self.read("proc/uptime")
            .as_deref()
            .and_then(parse_uptime_seconds)
    }

    fn mac_address(&self, interface: &str) -> Option<String> {
        self.read(format!("sys/class/net/{interface}/address"))
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty() && address != "00:00:00:00:00:00")
    }

    fn any_interface(&self) -> Option<String> {
        let mut names: Vec<_> = std::fs::read_dir(self.root.join("sys/class/net"))
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name != "lo")
            .collect();
        names.sort();
        names.iter().find_map(|name| self.mac_address(name))
    }
}

impl HardwareEnvironment for LinuxEnvironment {
    fn cpu_model(&self) -> String {
        self.read("proc/cpuinfo")
            .as_deref()
            .and_then(parse_cpu_model)
            .unwrap_or_default()
    }

    fn object_id(&self) -> String {
        self.mac_address("eth0")
            .or_else(|| self.mac_address("wlan0"))
            .or_else(|| self.any_interface())
            .map(|mac| mac.replace(':', "").to_lowercase())
            .unwrap_or_default()
    }

    fn cpu_temperature(&self) -> f64 {
        self.read("sys/class/thermal/thermal_zone0/temp")
            .and_then(|value| value.trim().parse::<f64>().ok())
            .map(|millis| millis / 1000.0)
            .unwrap_or_default()
    }

    fn os_pretty_name(&self) -> String {
        self.read("etc/os-release")
            .as_deref()
            .and_then(|content| parse_os_release(content, "PRETTY_NAME"))
            .unwrap_or_default()
    }

    fn uptime(&self) -> String {
        self.uptime_duration()
            .map(format_uptime)
            .unwrap_or_default()
    }

    fn last_restart(&self) -> String {
        self.uptime_duration()
            .and_then(|uptime| SystemTime::now().checked_sub(uptime))
            .map(|restart| humantime::format_rfc3339_seconds(restart).to_string())
            .unwrap_or_default()
    }
}

/// The live facts published through the diagnostic sensors.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiagnosticFacts {
    pub status: String,
    pub cpu_temperature: f64,
    pub version: String,
    pub os: String,
    pub uptime: String,
    pub last_restart: String,
}

impl DiagnosticFacts {
    pub fn gather(environment: &dyn HardwareEnvironment, status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            cpu_temperature: environment.cpu_temperature(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            os: environment.os_pretty_name(),
            uptime: environment.uptime(),
            last_restart: environment.last_restart(),
        }
    }
}

/// Find the board model (Raspberry Pi style `Model`) or the first `model name` in `/proc/cpuinfo`.
fn parse_cpu_model(content: &str) -> Option<String> {
    let mut fallback = None;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Model" if !value.is_empty() => return Some(value.to_string()),
            "model name" if fallback.is_none() && !value.is_empty() => {
                fallback = Some(value.to_string())
            }
            _ => {}
        }
    }
    fallback
}

fn parse_os_release(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (name, value) = line.split_once('=')?;
        (name.trim() == key).then(|| value.trim().trim_matches('"').to_string())
    })
}

fn parse_uptime_seconds(content: &str) -> Option<Duration> {
    let seconds = content.split_whitespace().next()?.parse::<f64>().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs(seconds as u64))
}

/// Render an uptime with minute resolution, e.g. `2days 3h 4m`.
fn format_uptime(uptime: Duration) -> String {
    let minutes = Duration::from_secs(uptime.as_secs() / 60 * 60);
    if minutes.is_zero() {
        return "0m".to_string();
    }
    humantime::format_duration(minutes).to_string()
}
