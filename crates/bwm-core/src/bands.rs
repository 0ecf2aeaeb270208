//! EEG frequency bands and band-power results

use crate::error::{BwmError, BwmResult};
use serde::{Deserialize, Serialize};

/// Closed frequency interval `[low_freq, high_freq]` in Hz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub name: String,
    pub low_freq: f64,
    pub high_freq: f64,
}

impl FrequencyBand {
    /// Create a band, rejecting empty or inverted intervals
    pub fn new(name: impl Into<String>, low_freq: f64, high_freq: f64) -> BwmResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(BwmError::InvalidConfig {
                reason: "band name must not be empty".to_string(),
            });
        }

        if !(low_freq >= 0.0 && high_freq >= low_freq) {
            return Err(BwmError::InvalidConfig {
                reason: format!("band {} has invalid range [{}, {}] Hz", name, low_freq, high_freq),
            });
        }

        Ok(FrequencyBand {
            name,
            low_freq,
            high_freq,
        })
    }

    /// Both ends are inclusive
    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.low_freq && frequency <= self.high_freq
    }
}

impl std::fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}-{} Hz)", self.name, self.low_freq, self.high_freq)
    }
}

/// Fixed, ordered set of bands used for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FrequencyBand>", into = "Vec<FrequencyBand>")]
pub struct BandSet {
    bands: Vec<FrequencyBand>,
}

impl BandSet {
    /// Create a band set; names must be unique
    pub fn new(bands: Vec<FrequencyBand>) -> BwmResult<Self> {
        if bands.is_empty() {
            return Err(BwmError::InvalidConfig {
                reason: "band set must contain at least one band".to_string(),
            });
        }

        for (i, band) in bands.iter().enumerate() {
            if bands[..i].iter().any(|b| b.name == band.name) {
                return Err(BwmError::InvalidConfig {
                    reason: format!("duplicate band name {}", band.name),
                });
            }
        }

        Ok(BandSet { bands })
    }

    /// Canonical EEG bands: Delta, Theta, Alpha, Beta, Gamma
    pub fn eeg() -> Self {
        let band = |name: &str, low_freq: f64, high_freq: f64| FrequencyBand {
            name: name.to_string(),
            low_freq,
            high_freq,
        };

        BandSet {
            bands: vec![
                band("Delta", 0.5, 4.0),
                band("Theta", 4.0, 8.0),
                band("Alpha", 8.0, 13.0),
                band("Beta", 13.0, 30.0),
                band("Gamma", 30.0, 100.0),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrequencyBand> {
        self.bands.iter()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Band names in order
    pub fn names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }
}

impl Default for BandSet {
    fn default() -> Self {
        Self::eeg()
    }
}

impl TryFrom<Vec<FrequencyBand>> for BandSet {
    type Error = BwmError;

    fn try_from(bands: Vec<FrequencyBand>) -> BwmResult<Self> {
        BandSet::new(bands)
    }
}

impl From<BandSet> for Vec<FrequencyBand> {
    fn from(set: BandSet) -> Self {
        set.bands
    }
}

/// Power of one named band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPower {
    pub name: String,
    pub power: f64,
}

/// Band powers for one window, in band-set order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPowerResult {
    /// Timestamp of the newest sample in the window
    pub timestamp: f64,
    pub bands: Vec<BandPower>,
}

impl BandPowerResult {
    /// Look up a band's power by name
    pub fn power(&self, name: &str) -> Option<f64> {
        self.bands.iter().find(|b| b.name == name).map(|b| b.power)
    }

    /// Powers in band order
    pub fn powers(&self) -> impl Iterator<Item = f64> + '_ {
        self.bands.iter().map(|b| b.power)
    }

    /// Name of the band with the largest power, if any is non-zero
    pub fn dominant_band(&self) -> Option<&str> {
        self.bands
            .iter()
            .filter(|b| b.power > 0.0)
            .max_by(|a, b| a.power.total_cmp(&b.power))
            .map(|b| b.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eeg_bands_order() {
        let bands = BandSet::eeg();
        assert_eq!(bands.names(), vec!["Delta", "Theta", "Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_band_boundaries_inclusive() {
        let bands = BandSet::eeg();
        let theta = bands.iter().find(|b| b.name == "Theta").unwrap();
        let alpha = bands.iter().find(|b| b.name == "Alpha").unwrap();

        // 8 Hz sits on both edges
        assert!(theta.contains(8.0));
        assert!(alpha.contains(8.0));
        assert!(!alpha.contains(13.5));
    }

    #[test]
    fn test_invalid_band_rejected() {
        assert!(FrequencyBand::new("Bad", 10.0, 5.0).is_err());
        assert!(FrequencyBand::new("", 1.0, 5.0).is_err());
        assert!(FrequencyBand::new("Ok", 1.0, 1.0).is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let bands = vec![
            FrequencyBand::new("Alpha", 8.0, 13.0).unwrap(),
            FrequencyBand::new("Alpha", 13.0, 30.0).unwrap(),
        ];
        assert!(BandSet::new(bands).is_err());
    }

    #[test]
    fn test_band_set_serde() {
        let json = serde_json::to_string(&BandSet::eeg()).unwrap();
        let back: BandSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BandSet::eeg());

        let empty: Result<BandSet, _> = serde_json::from_str("[]");
        assert!(empty.is_err());
    }

    #[test]
    fn test_result_lookup() {
        let result = BandPowerResult {
            timestamp: 1.5,
            bands: vec![
                BandPower { name: "Alpha".to_string(), power: 2.0 },
                BandPower { name: "Beta".to_string(), power: 0.5 },
            ],
        };

        assert_eq!(result.power("Alpha"), Some(2.0));
        assert_eq!(result.power("Gamma"), None);
        assert_eq!(result.dominant_band(), Some("Alpha"));
    }
}
