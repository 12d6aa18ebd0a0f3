//! Band power results for one analysed window
//!
//! Serializes as
//! `{"channels": {"ch1": {"delta": .., ..}, ..}, "average": {"delta": .., ..}}`
//! with keys emitted in channel order and band order, so identical snapshots
//! always produce identical bytes.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

/// Ordered band name → power mapping
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BandPowers {
    entries: Vec<(String, f64)>,
}

impl BandPowers {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, band: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == band)
            .map(|(_, power)| *power)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, power)| (name.as_str(), *power))
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for BandPowers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, power) in &self.entries {
            map.serialize_entry(name, power)?;
        }
        map.end()
    }
}

/// Per-channel and channel-averaged band powers of one window
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    channels: Vec<(String, BandPowers)>,
    average: BandPowers,
}

impl MetricsSnapshot {
    pub fn new(channels: Vec<(String, BandPowers)>, average: BandPowers) -> Self {
        Self { channels, average }
    }

    /// Channel identifier for a zero-based channel index: `ch1`, `ch2`, ...
    pub fn channel_id(idx: usize) -> String {
        format!("ch{}", idx + 1)
    }

    pub fn channel(&self, id: &str) -> Option<&BandPowers> {
        self.channels
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, powers)| powers)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, &BandPowers)> {
        self.channels.iter().map(|(id, powers)| (id.as_str(), powers))
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn average(&self) -> &BandPowers {
        &self.average
    }
}

struct ChannelMap<'a>(&'a [(String, BandPowers)]);

impl Serialize for ChannelMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, powers) in self.0 {
            map.serialize_entry(id, powers)?;
        }
        map.end()
    }
}

impl Serialize for MetricsSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("MetricsSnapshot", 2)?;
        state.serialize_field("channels", &ChannelMap(&self.channels))?;
        state.serialize_field("average", &self.average)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powers(values: &[(&str, f64)]) -> BandPowers {
        BandPowers::new(values.iter().map(|(n, p)| (n.to_string(), *p)).collect())
    }

    #[test]
    fn test_serializes_in_band_and_channel_order() {
        let snapshot = MetricsSnapshot::new(
            vec![
                ("ch1".to_string(), powers(&[("theta", 2.0), ("alpha", 1.5)])),
                ("ch2".to_string(), powers(&[("theta", 4.0), ("alpha", 0.5)])),
            ],
            powers(&[("theta", 3.0), ("alpha", 1.0)]),
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(
            json,
            r#"{"channels":{"ch1":{"theta":2.0,"alpha":1.5},"ch2":{"theta":4.0,"alpha":0.5}},"average":{"theta":3.0,"alpha":1.0}}"#
        );
    }

    #[test]
    fn test_lookup() {
        let snapshot = MetricsSnapshot::new(
            vec![("ch1".to_string(), powers(&[("beta", 7.0)]))],
            powers(&[("beta", 7.0)]),
        );

        assert_eq!(snapshot.channel("ch1").and_then(|p| p.get("beta")), Some(7.0));
        assert!(snapshot.channel("ch2").is_none());
        assert_eq!(snapshot.average().get("gamma"), None);
        assert_eq!(MetricsSnapshot::channel_id(0), "ch1");
    }
}
