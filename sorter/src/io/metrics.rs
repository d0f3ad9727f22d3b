//! Hardware health sampling.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sysinfo::{Disks, System};
use tracing::{debug, warn};

use crate::core::outcome::{BestEffort, Degradation};
use crate::core::types::MetricsSnapshot;
use crate::io::config::MetricsConfig;

/// Source of hardware metrics. Stateless from the coordinator's view.
pub trait MetricsProvider: Send + Sync {
    fn snapshot(&self) -> BestEffort<MetricsSnapshot>;
}

/// Samples the local machine via `sysinfo` and the Linux thermal zone.
pub struct SystemMetrics {
    system: Mutex<System>,
    disk_mount: PathBuf,
    thermal_zone: PathBuf,
}

impl SystemMetrics {
    pub fn new(cfg: &MetricsConfig) -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first sample.
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
            disk_mount: cfg.disk_mount.clone(),
            thermal_zone: cfg.thermal_zone.clone(),
        }
    }
}

impl MetricsProvider for SystemMetrics {
    fn snapshot(&self) -> BestEffort<MetricsSnapshot> {
        let mut result = BestEffort::healthy(MetricsSnapshot::default());

        match self.system.lock() {
            Ok(mut system) => {
                // Usage since the previous call, so this never blocks.
                system.refresh_cpu();
                system.refresh_memory();
                result.value.cpu_percent = round1(system.global_cpu_info().cpu_usage());
                result.value.mem_total = system.total_memory();
                result.value.mem_used = system.used_memory();
                result.value.mem_percent = percent(system.used_memory(), system.total_memory());
            }
            Err(_) => {
                warn!("system sampler poisoned, reporting zero cpu and memory");
                result.push(Degradation::MetricUnavailable {
                    metric: "cpu".to_string(),
                    reason: "sampler poisoned".to_string(),
                });
            }
        }

        let disks = Disks::new_with_refreshed_list();
        match disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == self.disk_mount.as_path())
        {
            Some(disk) => {
                let total = disk.total_space();
                let used = total.saturating_sub(disk.available_space());
                result.value.disk_total = total;
                result.value.disk_used = used;
                result.value.disk_percent = percent(used, total);
            }
            None => {
                warn!(mount = %self.disk_mount.display(), "disk mount not found");
                result.push(Degradation::MetricUnavailable {
                    metric: "storage".to_string(),
                    reason: format!("mount {} not found", self.disk_mount.display()),
                });
            }
        }

        match read_temperature(&self.thermal_zone) {
            Ok(temp) => result.value.cpu_temp_c = temp,
            Err(reason) => {
                debug!(path = %self.thermal_zone.display(), %reason, "cpu temperature unavailable");
                result.push(Degradation::MetricUnavailable {
                    metric: "temperature".to_string(),
                    reason,
                });
            }
        }

        result
    }
}

/// Read a thermal zone file (millidegrees Celsius) as °C with one decimal.
pub fn read_temperature(path: &Path) -> Result<f32, String> {
    let raw = fs::read_to_string(path).map_err(|err| format!("read {}: {err}", path.display()))?;
    let millis: f32 = raw
        .trim()
        .parse()
        .map_err(|err| format!("parse {}: {err}", path.display()))?;
    Ok(round1(millis / 1000.0))
}

fn percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    round1((used as f64 / total as f64 * 100.0) as f32)
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
