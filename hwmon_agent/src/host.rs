//! Sensor backend using sysinfo.

use async_trait::async_trait;
use std::time::Duration;
use sysinfo::{
    Components, CpuRefreshKind, MemoryRefreshKind, RefreshKind, System,
    MINIMUM_CPU_UPDATE_INTERVAL,
};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::SensorError;
use crate::sensors::{SensorBackend, TempProbe};

/// Persistent sysinfo handles, refreshed selectively per query.
pub struct SysinfoBackend {
    sys: System,
    components: Components,
}

impl SysinfoBackend {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        let sys = System::new_with_specifics(refresh_kind);
        let components = Components::new_with_refreshed_list();
        debug!(
            cpus = sys.cpus().len(),
            components = components.list().len(),
            "sysinfo handles ready"
        );
        Self { sys, components }
    }
}

impl Default for SysinfoBackend {
    fn default() -> Self {
        Self::new()
    }
}

// sysinfo labels hwmon probes as "<chip name> <probe label>".
fn belongs_to_chip(label: &str, chip: &str) -> bool {
    let label = label.to_ascii_lowercase();
    let chip = chip.to_ascii_lowercase();
    label == chip
        || label
            .strip_prefix(&chip)
            .is_some_and(|rest| rest.starts_with(' '))
}

#[async_trait]
impl SensorBackend for SysinfoBackend {
    async fn cpu_usage(&mut self, window: Duration) -> Result<f32, SensorError> {
        // Two refreshes are needed for a usage delta.
        self.sys.refresh_cpu_usage();
        sleep(window.max(MINIMUM_CPU_UPDATE_INTERVAL)).await;
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(SensorError::Unavailable("no CPUs reported".into()));
        }
        Ok(self.sys.global_cpu_usage())
    }

    fn used_memory_bytes(&mut self) -> Result<u64, SensorError> {
        self.sys.refresh_memory();
        if self.sys.total_memory() == 0 {
            return Err(SensorError::Unavailable("memory statistics".into()));
        }
        Ok(self.sys.used_memory())
    }

    fn physical_core_count(&mut self) -> Result<usize, SensorError> {
        System::physical_core_count()
            .ok_or_else(|| SensorError::Unavailable("physical core count".into()))
    }

    fn cpu_frequencies_mhz(&mut self) -> Result<Vec<u64>, SensorError> {
        self.sys.refresh_cpu_frequency();
        Ok(self.sys.cpus().iter().map(|c| c.frequency()).collect())
    }

    fn temperatures(&mut self, chip: &str) -> Result<Vec<TempProbe>, SensorError> {
        self.components.refresh(true);
        let probes: Vec<TempProbe> = self
            .components
            .list()
            .iter()
            .filter(|c| belongs_to_chip(c.label(), chip))
            .filter_map(|c| match c.temperature() {
                Some(t) => Some(TempProbe::new(c.label(), t)),
                None => {
                    warn!(label = c.label(), "probe returned no temperature");
                    None
                }
            })
            .collect();
        Ok(probes)
    }
}

/// Host name for the MQTT client id.
pub fn host_name() -> String {
    System::host_name().unwrap_or_else(|| "unknown".into())
}
