//! Payloads published to the broker.
//! Keep this module minimal and stable; it defines the wire format.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Round to `digits` decimal places. Applying it twice yields the same value.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Primary payload, one per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuPayload {
    pub cpu_temp: f64,
    pub cpu_freq: f64,
    pub cpu_use: f64,
    pub ram_use: f64,
}

/// RK3588 boards: primary readings plus the SoC thermal zones and the
/// three cpufreq cluster clocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rk3588Payload {
    #[serde(flatten)]
    pub cpu: CpuPayload,
    pub soc_temp: f64,
    pub big_core0_temp: f64,
    pub big_core1_temp: f64,
    pub little_core_temp: f64,
    pub center_temp: f64,
    pub gpu_temp: f64,
    pub npu_temp: f64,
    pub nvme_temp: f64,
    pub little_core_freq: f64,
    pub big_core0_freq: f64,
    pub big_core1_freq: f64,
}

/// Per-core readings keyed by zero-based core index.
/// On the wire: `{"core 0": 41.0, "core 1": 42.5, ...}` in index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreReadings(BTreeMap<usize, f64>);

impl CoreReadings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, core: usize, value: f64) {
        self.0.insert(core, value);
    }

    pub fn get(&self, core: usize) -> Option<f64> {
        self.0.get(&core).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cores(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }
}

impl FromIterator<(usize, f64)> for CoreReadings {
    fn from_iter<T: IntoIterator<Item = (usize, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn core_key(core: usize) -> String {
    format!("core {core}")
}

impl Serialize for CoreReadings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (core, value) in &self.0 {
            map.serialize_entry(&core_key(*core), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CoreReadings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CoreVisitor;

        impl<'de> Visitor<'de> for CoreVisitor {
            type Value = CoreReadings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of \"core <index>\" to number")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<CoreReadings, A::Error> {
                let mut out = CoreReadings::new();
                while let Some((key, value)) = access.next_entry::<String, f64>()? {
                    let core = key
                        .strip_prefix("core ")
                        .and_then(|n| n.parse::<usize>().ok())
                        .ok_or_else(|| de::Error::custom(format!("bad core key '{key}'")))?;
                    out.insert(core, value);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(CoreVisitor)
    }
}

/// One serialized payload bound for a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub topic: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_idempotent() {
        for v in [0.0, 23.449, 1.005, 1799.96, 55.0, 0.123456, 12345.678] {
            for d in [1, 2] {
                let once = round_to(v, d);
                assert_eq!(round_to(once, d), once, "value {v} digits {d}");
            }
        }
    }

    #[test]
    fn core_keys_follow_numeric_order() {
        let readings: CoreReadings = (0..12).map(|i| (i, i as f64)).collect();
        let json = serde_json::to_string(&readings).unwrap();
        assert!(json.starts_with(r#"{"core 0":0.0,"core 1":1.0,"core 2":2.0"#));
        assert!(json.ends_with(r#""core 10":10.0,"core 11":11.0}"#));
    }

    #[test]
    fn rejects_foreign_keys() {
        let err = serde_json::from_str::<CoreReadings>(r#"{"cpu0": 1.0}"#).unwrap_err();
        assert!(err.to_string().contains("bad core key"));
    }
}
