//! Sensor queries turned into rounded, named readings.
//!
//! `SensorBackend` is the raw OS surface (see `host.rs` for the sysinfo one);
//! `SensorReader` rounds and shapes what it returns and is the `SensorSource`
//! the poll loop consumes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SensorError;
use crate::types::{round_to, CoreReadings};

pub const BYTES_PER_GIB: f64 = 1_073_741_824.0;

/// Utilization is averaged over this window; the call blocks for its length.
pub const UTILIZATION_WINDOW: Duration = Duration::from_secs(1);

/// One temperature probe belonging to a hwmon chip.
#[derive(Debug, Clone, PartialEq)]
pub struct TempProbe {
    pub label: String,
    pub celsius: f32,
}

impl TempProbe {
    pub fn new(label: impl Into<String>, celsius: f32) -> Self {
        Self {
            label: label.into(),
            celsius,
        }
    }
}

/// Raw, unrounded sensor access.
#[async_trait]
pub trait SensorBackend: Send {
    /// Global CPU usage in percent, measured across `window`.
    async fn cpu_usage(&mut self, window: Duration) -> Result<f32, SensorError>;
    fn used_memory_bytes(&mut self) -> Result<u64, SensorError>;
    fn physical_core_count(&mut self) -> Result<usize, SensorError>;
    /// Current frequency of every CPU the OS reports, in MHz, by CPU index.
    fn cpu_frequencies_mhz(&mut self) -> Result<Vec<u64>, SensorError>;
    /// Probes of the chip called `chip`, in discovery order. Empty if absent.
    fn temperatures(&mut self, chip: &str) -> Result<Vec<TempProbe>, SensorError>;
}

/// The readings the poll loop needs, already rounded.
#[async_trait]
pub trait SensorSource: Send {
    async fn cpu_utilization(&mut self) -> Result<f64, SensorError>;
    fn ram_used_gib(&mut self) -> Result<f64, SensorError>;
    /// Mean frequency across all CPUs, plus the physical core count.
    fn average_frequency_mhz(&mut self) -> Result<(f64, usize), SensorError>;
    fn cpu_frequency_mhz(&mut self, cpu: usize) -> Result<f64, SensorError>;
    fn per_core_frequency_mhz(&mut self) -> Result<CoreReadings, SensorError>;
    fn cpu_temperature_c(&mut self) -> Result<f64, SensorError>;
    fn per_core_temperature_c(&mut self) -> Result<CoreReadings, SensorError>;
    /// First probe of each chip in `labels`. Fails on the first absent label.
    fn named_sensor_temperatures(
        &mut self,
        labels: &[&str],
    ) -> Result<BTreeMap<String, f64>, SensorError>;
}

pub fn bytes_to_gib(bytes: u64) -> f64 {
    round_to(bytes as f64 / BYTES_PER_GIB, 2)
}

fn missing(label: &str) -> SensorError {
    SensorError::MissingSensor {
        label: label.to_string(),
    }
}

fn is_aggregate(label: &str) -> bool {
    let l = label.to_ascii_lowercase();
    l.contains("package") || l.contains("tctl") || l.contains("tdie")
}

// "coretemp Core 3" -> Some(3)
fn core_number(label: &str) -> Option<usize> {
    let lower = label.to_ascii_lowercase();
    let (_, rest) = lower.rsplit_once("core ")?;
    rest.trim().parse().ok()
}

/// Drop package-level aggregates; order by "Core N" when every probe has one.
fn per_core_probes(probes: Vec<TempProbe>) -> Vec<TempProbe> {
    let mut cores: Vec<TempProbe> = probes
        .into_iter()
        .filter(|p| !is_aggregate(&p.label))
        .collect();
    if cores.iter().all(|p| core_number(&p.label).is_some()) {
        cores.sort_by_key(|p| core_number(&p.label));
    }
    cores
}

pub struct SensorReader<B> {
    backend: B,
    temp_chip: String,
    sample_window: Duration,
}

impl<B: SensorBackend> SensorReader<B> {
    /// `temp_chip` names the chip used for CPU temperatures (e.g. `coretemp`).
    pub fn new(backend: B, temp_chip: impl Into<String>) -> Self {
        Self {
            backend,
            temp_chip: temp_chip.into(),
            sample_window: UTILIZATION_WINDOW,
        }
    }

    pub fn with_sample_window(mut self, window: Duration) -> Self {
        self.sample_window = window;
        self
    }

    fn core_count(&mut self) -> Result<usize, SensorError> {
        match self.backend.physical_core_count()? {
            0 => Err(SensorError::Unavailable("no physical cores reported".into())),
            n => Ok(n),
        }
    }
}

#[async_trait]
impl<B: SensorBackend> SensorSource for SensorReader<B> {
    async fn cpu_utilization(&mut self) -> Result<f64, SensorError> {
        let pct = self.backend.cpu_usage(self.sample_window).await?;
        Ok(round_to(pct as f64, 1))
    }

    fn ram_used_gib(&mut self) -> Result<f64, SensorError> {
        Ok(bytes_to_gib(self.backend.used_memory_bytes()?))
    }

    fn average_frequency_mhz(&mut self) -> Result<(f64, usize), SensorError> {
        let freqs = self.backend.cpu_frequencies_mhz()?;
        if freqs.is_empty() {
            return Err(SensorError::Unavailable("no CPUs reported".into()));
        }
        let mean = freqs.iter().map(|&f| f as f64).sum::<f64>() / freqs.len() as f64;
        let cores = self.core_count()?;
        Ok((round_to(mean, 1), cores))
    }

    fn cpu_frequency_mhz(&mut self, cpu: usize) -> Result<f64, SensorError> {
        let freqs = self.backend.cpu_frequencies_mhz()?;
        freqs
            .get(cpu)
            .map(|&f| round_to(f as f64, 1))
            .ok_or(SensorError::CoreOutOfRange {
                index: cpu,
                count: freqs.len(),
            })
    }

    fn per_core_frequency_mhz(&mut self) -> Result<CoreReadings, SensorError> {
        let count = self.core_count()?;
        let freqs = self.backend.cpu_frequencies_mhz()?;
        (0..count)
            .map(|i| {
                freqs
                    .get(i)
                    .map(|&f| (i, round_to(f as f64, 1)))
                    .ok_or(SensorError::CoreOutOfRange {
                        index: i,
                        count: freqs.len(),
                    })
            })
            .collect()
    }

    fn cpu_temperature_c(&mut self) -> Result<f64, SensorError> {
        let probes = self.backend.temperatures(&self.temp_chip)?;
        probes
            .first()
            .map(|p| round_to(p.celsius as f64, 1))
            .ok_or_else(|| missing(&self.temp_chip))
    }

    fn per_core_temperature_c(&mut self) -> Result<CoreReadings, SensorError> {
        let count = self.core_count()?;
        let probes = self.backend.temperatures(&self.temp_chip)?;
        if probes.is_empty() {
            return Err(missing(&self.temp_chip));
        }
        // Single-probe boards report one reading for the whole CPU.
        if count == 1 {
            let first = round_to(probes[0].celsius as f64, 1);
            return Ok(std::iter::once((0, first)).collect());
        }
        let cores = per_core_probes(probes);
        (0..count)
            .map(|i| {
                cores
                    .get(i)
                    .map(|p| (i, round_to(p.celsius as f64, 1)))
                    .ok_or(SensorError::CoreOutOfRange {
                        index: i,
                        count: cores.len(),
                    })
            })
            .collect()
    }

    fn named_sensor_temperatures(
        &mut self,
        labels: &[&str],
    ) -> Result<BTreeMap<String, f64>, SensorError> {
        let mut out = BTreeMap::new();
        for &label in labels {
            let probes = self.backend.temperatures(label)?;
            let first = probes.first().ok_or_else(|| missing(label))?;
            out.insert(label.to_string(), round_to(first.celsius as f64, 1));
        }
        Ok(out)
    }
}
