//! Entry point for hwmon_agent. Resolves config, starts logging and the MQTT
//! client, then polls until a fault.

use anyhow::Context;
use std::env;

use hwmon_agent::config::{parse_args, AgentConfig, Invocation};
use hwmon_agent::host::{host_name, SysinfoBackend};
use hwmon_agent::logging;
use hwmon_agent::publish::MqttPublisher;
use hwmon_agent::sampler::PollLoop;
use hwmon_agent::sensors::SensorReader;
use tracing::{debug, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = match parse_args(env::args())? {
        Invocation::Run(args) => args,
        Invocation::Help(text) => {
            println!("{text}");
            return Ok(());
        }
    };
    // Config faults end the process here, before any log file or client exists.
    let config = AgentConfig::resolve(args, |k| env::var(k).ok())?;

    let log = logging::init(&config.log_file)?;
    info!(
        "Starting hwmon_agent version {}, logging to {}",
        env!("CARGO_PKG_VERSION"),
        log.path().display()
    );
    debug!(?config, "resolved configuration");

    let client_id = format!("hwmon-{}-{}", host_name(), std::process::id());
    let client = MqttPublisher::connect(&config.broker, client_id);
    let sensors = SensorReader::new(SysinfoBackend::new(), config.temp_chip.clone());

    let mut poll = PollLoop::new(sensors, client, config.topic.clone(), config.interval)
        .with_profile(config.profile);
    let fault = poll.run().await;

    log.flush();
    Err(fault).context("sensor polling stopped")
}
