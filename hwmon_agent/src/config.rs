//! Command line and environment configuration, resolved once at startup.

use rumqttc::QoS;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_BROKER: &str = "MQTT_BROKER";
pub const ENV_PORT: &str = "MQTT_PORT";
pub const ENV_USER: &str = "MQTT_USER";
pub const ENV_SECRET: &str = "MQTT_SECRET";
pub const ENV_TEMP_SENSOR: &str = "HWMON_TEMP_SENSOR";
pub const ENV_LOG_FILE: &str = "HWMON_LOG_FILE";
pub const ENV_QOS: &str = "HWMON_MQTT_QOS";

pub const DEFAULT_LOG_FILE: &str = "hwmon_agent.log";

/// Which payloads a cycle produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// `{cpuTemp, cpuFreq, cpuUse, ramUse}` to the topic.
    #[default]
    Standard,
    /// Standard payload plus per-core frequency and temperature maps on
    /// `<topic>/freq` and `<topic>/temp`.
    PerCore,
    /// Standard readings plus SoC thermal zones and cluster clocks.
    Rk3588,
}

impl Profile {
    pub fn default_temp_chip(self) -> &'static str {
        match self {
            Profile::Standard | Profile::PerCore => "coretemp",
            Profile::Rk3588 => "soc_thermal",
        }
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Profile::Standard),
            "per-core" | "percore" => Ok(Profile::PerCore),
            "rk3588" => Ok(Profile::Rk3588),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentArgs {
    pub topic: String,
    pub interval: Duration,
    pub profile: Profile,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Run(AgentArgs),
    Help(String),
}

pub fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--profile NAME|-P NAME] [--log-file PATH|-l PATH] <TOPIC> <INTERVAL_SECS>\n\
         \n\
         Profiles: standard (default), per-core, rk3588\n\
         Environment: {ENV_BROKER}, {ENV_PORT}, {ENV_USER}, {ENV_SECRET} (required); \
         {ENV_TEMP_SENSOR}, {ENV_LOG_FILE}, {ENV_QOS}, RUST_LOG (optional)"
    )
}

fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidInterval(raw.to_string())),
    }
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Invocation, ConfigError> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "hwmon_agent".into());
    let mut profile: Option<String> = None;
    let mut log_file: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help(usage(&prog))),
            "--profile" | "-P" => {
                profile = Some(it.next().ok_or_else(|| ConfigError::Usage(usage(&prog)))?);
            }
            "--log-file" | "-l" => {
                let path = it.next().ok_or_else(|| ConfigError::Usage(usage(&prog)))?;
                log_file = Some(PathBuf::from(path));
            }
            _ if arg.starts_with("--profile=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    profile = Some(v.to_string());
                }
            }
            _ if arg.starts_with("--log-file=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    log_file = Some(PathBuf::from(v));
                }
            }
            _ => positional.push(arg),
        }
    }

    let (topic, interval) = match positional.as_slice() {
        [topic, interval] => (topic.clone(), parse_interval(interval)?),
        _ => return Err(ConfigError::Usage(usage(&prog))),
    };
    if topic.is_empty() {
        return Err(ConfigError::Usage(usage(&prog)));
    }
    let profile = match profile {
        Some(p) => p.parse()?,
        None => Profile::default(),
    };

    Ok(Invocation::Run(AgentArgs {
        topic,
        interval,
        profile,
        log_file,
    }))
}

#[derive(Clone, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: String,
    pub qos: QoS,
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .field("qos", &self.qos)
            .finish()
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::MissingEnv(name))
}

fn parse_qos(raw: &str) -> Result<QoS, ConfigError> {
    match raw.trim() {
        "0" => Ok(QoS::AtMostOnce),
        "1" => Ok(QoS::AtLeastOnce),
        "2" => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidEnv {
            name: ENV_QOS,
            value: other.to_string(),
            reason: "expected 0, 1 or 2".into(),
        }),
    }
}

impl BrokerConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = required(&lookup, ENV_BROKER)?;
        let port_raw = required(&lookup, ENV_PORT)?;
        let user = required(&lookup, ENV_USER)?;
        let secret = required(&lookup, ENV_SECRET)?;

        if host.trim().is_empty() {
            return Err(ConfigError::InvalidEnv {
                name: ENV_BROKER,
                value: host,
                reason: "empty host".into(),
            });
        }
        let port = match port_raw.trim().parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => {
                return Err(ConfigError::InvalidEnv {
                    name: ENV_PORT,
                    value: port_raw,
                    reason: "expected a port number between 1 and 65535".into(),
                })
            }
        };
        let qos = match lookup(ENV_QOS) {
            Some(raw) => parse_qos(&raw)?,
            None => QoS::AtMostOnce,
        };

        Ok(Self {
            host,
            port,
            user,
            secret,
            qos,
        })
    }
}

/// Everything the agent needs, validated before any client exists.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub topic: String,
    pub interval: Duration,
    pub profile: Profile,
    pub temp_chip: String,
    pub log_file: PathBuf,
    pub broker: BrokerConfig,
}

impl AgentConfig {
    pub fn resolve<F>(args: AgentArgs, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let broker = BrokerConfig::from_lookup(&lookup)?;
        let temp_chip = lookup(ENV_TEMP_SENSOR)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| args.profile.default_temp_chip().to_string());
        let log_file = args
            .log_file
            .or_else(|| lookup(ENV_LOG_FILE).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        Ok(Self {
            topic: args.topic,
            interval: args.interval,
            profile: args.profile,
            temp_chip,
            log_file,
            broker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn argv(items: &[&str]) -> Vec<String> {
        std::iter::once("hwmon_agent")
            .chain(items.iter().copied())
            .map(String::from)
            .collect()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    const FULL_ENV: &[(&str, &str)] = &[
        ("MQTT_BROKER", "192.168.1.10"),
        ("MQTT_PORT", "1883"),
        ("MQTT_USER", "sensors"),
        ("MQTT_SECRET", "hunter2"),
    ];

    fn run_args(items: &[&str]) -> AgentArgs {
        match parse_args(argv(items)).unwrap() {
            Invocation::Run(a) => a,
            Invocation::Help(h) => panic!("unexpected help: {h}"),
        }
    }

    #[test]
    fn positional_topic_and_interval() {
        let a = run_args(&["sensors/cpu", "5"]);
        assert_eq!(a.topic, "sensors/cpu");
        assert_eq!(a.interval, Duration::from_secs(5));
        assert_eq!(a.profile, Profile::Standard);
        assert_eq!(a.log_file, None);
    }

    #[test]
    fn flags_short_long_and_assign() {
        let a = run_args(&["-P", "rk3588", "t", "10"]);
        assert_eq!(a.profile, Profile::Rk3588);
        let a = run_args(&["t", "10", "--profile=per-core", "--log-file", "/tmp/x.log"]);
        assert_eq!(a.profile, Profile::PerCore);
        assert_eq!(a.log_file, Some(PathBuf::from("/tmp/x.log")));
        let a = run_args(&["-l", "a.log", "t", "1"]);
        assert_eq!(a.log_file, Some(PathBuf::from("a.log")));
    }

    #[test]
    fn help_wins() {
        assert!(matches!(
            parse_args(argv(&["t", "5", "--help"])).unwrap(),
            Invocation::Help(h) if h.contains("Usage:")
        ));
    }

    #[test]
    fn bad_interval_and_arity() {
        for bad in ["0", "-3", "five", "2.5", ""] {
            assert_eq!(
                parse_args(argv(&["t", bad])).unwrap_err(),
                ConfigError::InvalidInterval(bad.to_string())
            );
        }
        assert!(matches!(
            parse_args(argv(&["only-topic"])).unwrap_err(),
            ConfigError::Usage(_)
        ));
        assert!(matches!(
            parse_args(argv(&["a", "1", "extra"])).unwrap_err(),
            ConfigError::Usage(_)
        ));
        assert_eq!(
            parse_args(argv(&["-P", "x86", "t", "1"])).unwrap_err(),
            ConfigError::UnknownProfile("x86".into())
        );
    }

    #[test]
    fn trailing_flag_without_value_is_usage_error() {
        for tail in ["-P", "--profile", "-l", "--log-file"] {
            assert!(
                matches!(
                    parse_args(argv(&["t", "5", tail])).unwrap_err(),
                    ConfigError::Usage(u) if u.contains("Usage:")
                ),
                "{tail}"
            );
        }
    }

    #[test]
    fn broker_from_lookup() {
        let b = BrokerConfig::from_lookup(env(FULL_ENV)).unwrap();
        assert_eq!(b.host, "192.168.1.10");
        assert_eq!(b.port, 1883);
        assert_eq!(b.qos, QoS::AtMostOnce);
        assert!(!format!("{b:?}").contains("hunter2"));
    }

    #[test]
    fn each_required_variable_is_checked() {
        for skip in [ENV_BROKER, ENV_PORT, ENV_USER, ENV_SECRET] {
            let partial: Vec<(&str, &str)> =
                FULL_ENV.iter().copied().filter(|(k, _)| *k != skip).collect();
            assert_eq!(
                BrokerConfig::from_lookup(env(&partial)).unwrap_err(),
                ConfigError::MissingEnv(skip)
            );
        }
    }

    #[test]
    fn bad_port_and_qos() {
        let mut pairs = FULL_ENV.to_vec();
        pairs[1] = ("MQTT_PORT", "70000");
        assert!(matches!(
            BrokerConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::InvalidEnv { name: ENV_PORT, .. }
        ));

        let mut pairs = FULL_ENV.to_vec();
        pairs.push(("HWMON_MQTT_QOS", "1"));
        assert_eq!(
            BrokerConfig::from_lookup(env(&pairs)).unwrap().qos,
            QoS::AtLeastOnce
        );
        pairs.pop();
        pairs.push(("HWMON_MQTT_QOS", "3"));
        assert!(matches!(
            BrokerConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::InvalidEnv { name: ENV_QOS, .. }
        ));
    }

    #[test]
    fn resolve_defaults_and_overrides() {
        let cfg = AgentConfig::resolve(run_args(&["-P", "rk3588", "t", "5"]), env(FULL_ENV)).unwrap();
        assert_eq!(cfg.temp_chip, "soc_thermal");
        assert_eq!(cfg.log_file, PathBuf::from(DEFAULT_LOG_FILE));

        let mut pairs = FULL_ENV.to_vec();
        pairs.push(("HWMON_TEMP_SENSOR", "cpu_thermal"));
        pairs.push(("HWMON_LOG_FILE", "/var/log/hwmon.log"));
        let cfg = AgentConfig::resolve(run_args(&["t", "5"]), env(&pairs)).unwrap();
        assert_eq!(cfg.temp_chip, "cpu_thermal");
        assert_eq!(cfg.log_file, PathBuf::from("/var/log/hwmon.log"));

        // command line beats environment
        let cfg = AgentConfig::resolve(run_args(&["-l", "cli.log", "t", "5"]), env(&pairs)).unwrap();
        assert_eq!(cfg.log_file, PathBuf::from("cli.log"));
    }
}
