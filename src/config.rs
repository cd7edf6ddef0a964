//! Acquisition configuration record.
//!
//! Produced by an external loader and treated as already validated; the
//! session still bounds-checks channel numbers against the discovered
//! count when the record is applied.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One run's worth of board settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Sampling rate in hertz.
    pub sampling: u32,
    /// Per-channel settings, in channel order starting at channel 1.
    #[serde(rename = "ADC")]
    pub adc: Vec<ChannelSetting>,
    /// Acquisition duration in seconds.
    pub time_acquire: u32,
}

/// Raw per-channel codes as the firmware commands expect them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSetting {
    pub gain: u16,
    /// Polarity code: 1 unipolar, 2 bipolar.
    pub polarity: u8,
    /// Buffering code: `b` buffered, `u` unbuffered.
    pub buffer: char,
}

/// Load a configuration record from a JSON file.
pub fn load(path: &Path) -> Result<AcquisitionConfig> {
    let file =
        File::open(path).with_context(|| format!("failed to open config at {}", path.display()))?;
    let config: AcquisitionConfig = serde_json::from_reader(file)
        .with_context(|| format!("invalid config at {}", path.display()))?;
    Ok(config)
}
