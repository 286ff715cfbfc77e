//! The poll loop: read sensors, build payloads, publish, sleep, repeat.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::config::Profile;
use crate::error::{PollError, SensorError};
use crate::publish::PublishClient;
use crate::sensors::SensorSource;
use crate::types::{CpuPayload, Outbound, Rk3588Payload};

/// Thermal zones read for `Profile::Rk3588`, in payload order.
pub const RK3588_THERMAL_ZONES: [&str; 8] = [
    "soc_thermal",
    "bigcore0_thermal",
    "bigcore1_thermal",
    "littlecore_thermal",
    "center_thermal",
    "gpu_thermal",
    "npu_thermal",
    "nvme",
];

/// First CPU of each RK3588 cpufreq policy: little (0-3), big0 (4-5), big1 (6-7).
pub const RK3588_CLUSTER_CPUS: [usize; 3] = [0, 4, 6];

/// Outcome of a single cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub published: usize,
    pub dropped: usize,
}

fn subtopic(topic: &str, leaf: &str) -> String {
    format!("{}/{leaf}", topic.trim_end_matches('/'))
}

pub struct PollLoop<S, C> {
    sensors: S,
    client: C,
    topic: String,
    interval: Duration,
    profile: Profile,
}

impl<S: SensorSource, C: PublishClient> PollLoop<S, C> {
    pub fn new(sensors: S, client: C, topic: impl Into<String>, interval: Duration) -> Self {
        Self {
            sensors,
            client,
            topic: topic.into(),
            interval,
            profile: Profile::default(),
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    async fn read_cpu(&mut self) -> Result<CpuPayload, SensorError> {
        let cpu_use = self.sensors.cpu_utilization().await?;
        let ram_use = self.sensors.ram_used_gib()?;
        let (cpu_freq, cores) = self.sensors.average_frequency_mhz()?;
        let cpu_temp = self.sensors.cpu_temperature_c()?;
        trace!(cores, cpu_use, ram_use, cpu_freq, cpu_temp, "cpu readings");
        Ok(CpuPayload {
            cpu_temp,
            cpu_freq,
            cpu_use,
            ram_use,
        })
    }

    fn read_rk3588(&mut self, cpu: CpuPayload) -> Result<Rk3588Payload, SensorError> {
        let mut zones = self
            .sensors
            .named_sensor_temperatures(&RK3588_THERMAL_ZONES)?;
        let mut zone = |label: &str| {
            zones.remove(label).ok_or_else(|| SensorError::MissingSensor {
                label: label.to_string(),
            })
        };
        let [little, big0, big1] = RK3588_CLUSTER_CPUS;
        Ok(Rk3588Payload {
            cpu,
            soc_temp: zone("soc_thermal")?,
            big_core0_temp: zone("bigcore0_thermal")?,
            big_core1_temp: zone("bigcore1_thermal")?,
            little_core_temp: zone("littlecore_thermal")?,
            center_temp: zone("center_thermal")?,
            gpu_temp: zone("gpu_thermal")?,
            npu_temp: zone("npu_thermal")?,
            nvme_temp: zone("nvme")?,
            little_core_freq: self.sensors.cpu_frequency_mhz(little)?,
            big_core0_freq: self.sensors.cpu_frequency_mhz(big0)?,
            big_core1_freq: self.sensors.cpu_frequency_mhz(big1)?,
        })
    }

    /// Read every sensor the profile needs and serialize the payloads.
    pub async fn collect(&mut self) -> Result<Vec<Outbound>, PollError> {
        let cpu = self.read_cpu().await?;
        let outbound = match self.profile {
            Profile::Standard => vec![Outbound {
                topic: self.topic.clone(),
                body: serde_json::to_string(&cpu)?,
            }],
            Profile::PerCore => {
                let freqs = self.sensors.per_core_frequency_mhz()?;
                let temps = self.sensors.per_core_temperature_c()?;
                vec![
                    Outbound {
                        topic: self.topic.clone(),
                        body: serde_json::to_string(&cpu)?,
                    },
                    Outbound {
                        topic: subtopic(&self.topic, "freq"),
                        body: serde_json::to_string(&freqs)?,
                    },
                    Outbound {
                        topic: subtopic(&self.topic, "temp"),
                        body: serde_json::to_string(&temps)?,
                    },
                ]
            }
            Profile::Rk3588 => {
                let payload = self.read_rk3588(cpu)?;
                vec![Outbound {
                    topic: self.topic.clone(),
                    body: serde_json::to_string(&payload)?,
                }]
            }
        };
        Ok(outbound)
    }

    /// One sense → serialize → publish pass. Publish failures are logged and
    /// counted, never returned.
    pub async fn poll_once(&mut self) -> Result<CycleReport, PollError> {
        let outbound = self.collect().await?;
        let mut report = CycleReport::default();
        for out in &outbound {
            match self.client.publish(&out.topic, &out.body).await {
                Ok(receipt) => {
                    trace!(topic = %out.topic, message_id = receipt.message_id, "published");
                    report.published += 1;
                }
                Err(e) => {
                    warn!("Failed to send {} to: {}", out.body, out.topic);
                    debug!(topic = %out.topic, payload = %out.body, error = %e, "MQTT publishing failure");
                    report.dropped += 1;
                }
            }
        }
        Ok(report)
    }

    /// Poll until a sensor or encode fault, then shut the client down once and
    /// hand back the fault.
    pub async fn run(&mut self) -> PollError {
        info!(
            topic = %self.topic,
            interval_secs = self.interval.as_secs(),
            profile = ?self.profile,
            "polling started"
        );
        let fault = loop {
            if let Err(e) = self.poll_once().await {
                break e;
            }
            sleep(self.interval).await;
        };
        error!(error = %fault, "polling stopped");
        if let Err(e) = self.client.shutdown().await {
            warn!(error = %e, "publish client shutdown failed");
        }
        fault
    }
}
