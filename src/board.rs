//! Board variants, frame geometry and per-channel configuration state.

use log::warn;

use crate::response::Response;

/// Bit in a header flags byte marking a bipolar channel.
pub const BIPOLAR_MASK: u8 = 0x02;

/// One LSB of a 24-bit code as a fraction of full scale.
pub const SCALE_24: f64 = 1.0 / (1u64 << 24) as f64;

/// Reference voltage, including the 2% correction factor.
pub const VREF: f64 = 2.5 * 1.02;

/// Input polarity, numbered as the firmware numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Unipolar = 1,
    Bipolar = 2,
}

impl Polarity {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Polarity::Unipolar),
            2 => Some(Polarity::Bipolar),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Whether the input buffer amplifier is in the signal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffering {
    Buffered,
    Unbuffered,
}

impl Buffering {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'b' => Some(Buffering::Buffered),
            'u' => Some(Buffering::Unbuffered),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Buffering::Buffered => 'b',
            Buffering::Unbuffered => 'u',
        }
    }
}

/// Board variant, resolved once per session from the identification string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardType {
    #[default]
    Unknown,
    Adc8,
    Adc8x,
}

impl BoardType {
    pub fn from_id(id: &str) -> Self {
        if id.starts_with("ADC-8x") {
            BoardType::Adc8x
        } else if id.starts_with("ADC-8") {
            BoardType::Adc8
        } else {
            BoardType::Unknown
        }
    }

    /// Frame geometry and conversion constants, fixed for the lifetime of
    /// a session. `None` until the board is resolved.
    pub fn profile(self, channel_count: usize) -> Option<BoardProfile> {
        let layout = match self {
            BoardType::Adc8 => HeaderLayout::Legacy,
            BoardType::Adc8x => HeaderLayout::Extended,
            BoardType::Unknown => return None,
        };
        let header_len = match layout {
            HeaderLayout::Legacy => 16,
            HeaderLayout::Extended => 10 + 2 * channel_count,
        };
        Some(BoardProfile {
            layout,
            header_len,
            bipolar_mask: BIPOLAR_MASK,
            scale: SCALE_24,
            vref: VREF,
        })
    }
}

/// The two incompatible binary header layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// 4-byte `ADC8` signature followed by a 4-byte preamble.
    Legacy,
    /// 8-byte `ADC8x-1.` signature followed by a 2-byte preamble.
    Extended,
}

impl HeaderLayout {
    pub fn signature(self) -> &'static [u8] {
        match self {
            HeaderLayout::Legacy => b"ADC8",
            HeaderLayout::Extended => b"ADC8x-1.",
        }
    }

    pub fn preamble_len(self) -> usize {
        match self {
            HeaderLayout::Legacy => 4,
            HeaderLayout::Extended => 2,
        }
    }
}

/// Per-session acquisition geometry derived from the board type.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardProfile {
    pub layout: HeaderLayout,
    pub header_len: usize,
    pub bipolar_mask: u8,
    pub scale: f64,
    pub vref: f64,
}

/// Last-acknowledged configuration of one input channel. Each field keeps
/// its previous value until the firmware confirms a change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub label: String,
    /// Amplification factor; `Some(0)` marks the channel disabled.
    pub gain: Option<u16>,
    pub polarity: Option<Polarity>,
    pub buffering: Option<Buffering>,
    /// Single-character impedance setting, when the board reports one.
    pub impedance: Option<char>,
}

impl ChannelConfig {
    fn new(number: usize) -> Self {
        Self {
            label: format!("Ch {number}"),
            gain: None,
            polarity: None,
            buffering: None,
            impedance: None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.gain == Some(0)
    }
}

/// Channel configurations addressed by 1-based channel number, sized to
/// the discovered channel count. Updates outside that range are rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelTable {
    channels: Vec<ChannelConfig>,
}

impl ChannelTable {
    pub fn new(count: usize) -> Self {
        Self {
            channels: (1..=count).map(ChannelConfig::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, channel: u8) -> Option<&ChannelConfig> {
        self.index(channel).map(|i| &self.channels[i])
    }

    fn get_mut(&mut self, channel: u8) -> Option<&mut ChannelConfig> {
        self.index(channel).map(|i| &mut self.channels[i])
    }

    fn index(&self, channel: u8) -> Option<usize> {
        let channel = channel as usize;
        (1..=self.channels.len())
            .contains(&channel)
            .then(|| channel - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter()
    }
}

/// Sampling rate plus the channel table, mutated only by acknowledged
/// firmware responses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoardState {
    pub sampling: f64,
    pub channels: ChannelTable,
}

impl BoardState {
    pub fn new(channel_count: usize) -> Self {
        Self {
            sampling: 0.0,
            channels: ChannelTable::new(channel_count),
        }
    }

    /// Fold one classified response into the state. Unparsed responses and
    /// out-of-range channel numbers leave everything untouched.
    pub fn apply(&mut self, response: &Response) {
        match response {
            Response::SamplingRate(rate) => self.sampling = *rate,
            Response::ChannelDisabled(channel) => match self.channels.get_mut(*channel) {
                Some(cfg) => cfg.gain = Some(0),
                None => warn!("channel {channel} outside discovered range, ignoring"),
            },
            Response::ChannelConfigured {
                channel,
                gain,
                polarity,
                buffering,
            } => match self.channels.get_mut(*channel) {
                Some(cfg) => {
                    cfg.gain = Some(*gain);
                    if polarity.is_some() {
                        cfg.polarity = *polarity;
                    }
                    if buffering.is_some() {
                        cfg.buffering = *buffering;
                    }
                }
                None => warn!("channel {channel} outside discovered range, ignoring"),
            },
            Response::AllDisabled => {
                for cfg in &mut self.channels.channels {
                    cfg.gain = Some(0);
                }
            }
            Response::AllConfigured {
                gain,
                polarity,
                buffering,
            } => {
                for cfg in &mut self.channels.channels {
                    cfg.gain = Some(*gain);
                    if polarity.is_some() {
                        cfg.polarity = *polarity;
                    }
                    if buffering.is_some() {
                        cfg.buffering = *buffering;
                    }
                }
            }
            Response::Impedances(codes) => {
                if codes.len() < self.channels.len() {
                    warn!(
                        "impedance report covers {} of {} channels",
                        codes.len(),
                        self.channels.len()
                    );
                }
                for (cfg, code) in self.channels.channels.iter_mut().zip(codes) {
                    cfg.impedance = Some(*code);
                }
            }
            Response::Status(report) => {
                if let Some(rate) = report.sampling {
                    self.sampling = rate;
                }
                for line in &report.channels {
                    let Some(cfg) = self.channels.get_mut(line.channel) else {
                        warn!(
                            "channel {} outside discovered range, ignoring",
                            line.channel
                        );
                        continue;
                    };
                    match &line.config {
                        None => cfg.gain = Some(0),
                        Some(c) => {
                            cfg.gain = Some(c.gain);
                            cfg.polarity = Some(c.polarity);
                            cfg.buffering = Some(c.buffering);
                            cfg.impedance = c.impedance;
                        }
                    }
                }
            }
            Response::Unparsed(_) => {}
        }
    }
}
