//! hwmon_agent: poll CPU temperature, clock, load and RAM use on Linux boards
//! and publish them as JSON over MQTT at a fixed interval.

pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod publish;
pub mod sampler;
pub mod sensors;
pub mod types;
