use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the 12 measurement bands reported by the AS7341: 11 wavelength
/// bands plus the unfiltered clear channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    #[serde(rename = "410nm")]
    Band410,
    #[serde(rename = "440nm")]
    Band440,
    #[serde(rename = "470nm")]
    Band470,
    #[serde(rename = "510nm")]
    Band510,
    #[serde(rename = "550nm")]
    Band550,
    #[serde(rename = "580nm")]
    Band580,
    #[serde(rename = "610nm")]
    Band610,
    #[serde(rename = "680nm")]
    Band680,
    #[serde(rename = "730nm")]
    Band730,
    #[serde(rename = "810nm")]
    Band810,
    #[serde(rename = "860nm")]
    Band860,
    #[serde(rename = "clear")]
    Clear,
}

impl ChannelId {
    /// All channels in fixed wire order. Feature vectors and chart series
    /// are aligned to this ordering.
    pub const ALL: [ChannelId; 12] = [
        ChannelId::Band410,
        ChannelId::Band440,
        ChannelId::Band470,
        ChannelId::Band510,
        ChannelId::Band550,
        ChannelId::Band580,
        ChannelId::Band610,
        ChannelId::Band680,
        ChannelId::Band730,
        ChannelId::Band810,
        ChannelId::Band860,
        ChannelId::Clear,
    ];

    /// The label used on the serial wire, e.g. `"410nm"` or `"clear"`.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelId::Band410 => "410nm",
            ChannelId::Band440 => "440nm",
            ChannelId::Band470 => "470nm",
            ChannelId::Band510 => "510nm",
            ChannelId::Band550 => "550nm",
            ChannelId::Band580 => "580nm",
            ChannelId::Band610 => "610nm",
            ChannelId::Band680 => "680nm",
            ChannelId::Band730 => "730nm",
            ChannelId::Band810 => "810nm",
            ChannelId::Band860 => "860nm",
            ChannelId::Clear => "clear",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.label() == label)
    }

    /// Center wavelength in nanometers, `None` for the clear channel.
    pub fn wavelength_nm(&self) -> Option<u16> {
        match self {
            ChannelId::Band410 => Some(410),
            ChannelId::Band440 => Some(440),
            ChannelId::Band470 => Some(470),
            ChannelId::Band510 => Some(510),
            ChannelId::Band550 => Some(550),
            ChannelId::Band580 => Some(580),
            ChannelId::Band610 => Some(610),
            ChannelId::Band680 => Some(680),
            ChannelId::Band730 => Some(730),
            ChannelId::Band810 => Some(810),
            ChannelId::Band860 => Some(860),
            ChannelId::Clear => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Channel-value mapping for one sample. A subset of the 12 channels is
/// tolerated; consumers treat missing channels as zero where required.
pub type ChannelReadings = BTreeMap<ChannelId, f64>;
