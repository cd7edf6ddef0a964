//! Board session lifecycle: identification, channel-count discovery,
//! board-type resolution and per-channel configuration.

use std::time::Duration;

use log::{debug, info, warn};

use crate::acquisition::{self, Acquisition};
use crate::board::{BoardProfile, BoardState, BoardType, Buffering, Polarity};
use crate::command::{self, SETTLE_INTERVAL};
use crate::config::AcquisitionConfig;
use crate::errors::{DriverError, Result};
use crate::response::{classify, Response};
use crate::transport::{SerialTransport, Transport, DEFAULT_BAUD_RATE};

/// Identification prefix common to the board family.
const FAMILY_PREFIX: &str = "ADC-8";

/// Longest identification response the firmware emits.
const ID_LIMIT: usize = 80;

/// An open connection to one board.
///
/// Created by a successful [`Session::connect`]; torn down by
/// [`Session::close`] or drop. The transport is exclusively owned: the
/// protocol is strictly request/response plus a single streaming read
/// loop, so nothing here is shared or locked.
pub struct Session {
    transport: Option<Box<dyn Transport>>,
    settle: Duration,
    id: String,
    serial_number: String,
    board_type: BoardType,
    profile: Option<BoardProfile>,
    channel_count: usize,
    state: BoardState,
    impedance_probe: bool,
}

impl Session {
    /// Open `path` and run the identification handshake.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let transport = SerialTransport::open(path, baud_rate)?;
        Self::connect(Box::new(transport))
    }

    /// [`Session::open`] with the family default baud rate.
    pub fn open_default(path: &str) -> Result<Self> {
        Self::open(path, DEFAULT_BAUD_RATE)
    }

    /// Take ownership of an already-open transport and establish a
    /// session. The transport is released again on any failure.
    pub fn connect(transport: Box<dyn Transport>) -> Result<Self> {
        Self::connect_with_settle(transport, SETTLE_INTERVAL)
    }

    /// [`Session::connect`] with a non-default command settle interval.
    pub fn connect_with_settle(transport: Box<dyn Transport>, settle: Duration) -> Result<Self> {
        let mut session = Session {
            transport: Some(transport),
            settle,
            id: String::new(),
            serial_number: String::new(),
            board_type: BoardType::Unknown,
            profile: None,
            channel_count: 0,
            state: BoardState::default(),
            impedance_probe: false,
        };
        session.initialize()?;
        Ok(session)
    }

    fn initialize(&mut self) -> Result<()> {
        let id = self.identify()?;
        info!("connected to {id} (serial {:?})", self.serial_number);
        self.channel_count = self.discover_channel_count()?;
        debug!("{} channels discovered", self.channel_count);
        self.resolve_board_type(&id)?;
        self.id = id;
        self.state = BoardState::new(self.channel_count);
        self.transport()?.write_all(b"\n")?;
        self.refresh_status()?;
        Ok(())
    }

    /// Ask the board for its identification string. The serial number
    /// after the last three-space run is stored on the session.
    pub fn identify(&mut self) -> Result<String> {
        let transport = self.transport()?;
        transport.write_all(b"\n")?;
        let _ = transport.read_available()?;
        let _ = transport.read_up_to(1000)?; // wait out the timeout
        transport.write_all(b"*\n")?;
        let raw = transport.read_until(b'\n', ID_LIMIT)?;
        let text = String::from_utf8(raw)?;
        let (id, serial) = match text.rfind("   ") {
            Some(n) => (&text[..n], text[n + 3..].trim_end_matches('\n')),
            None => (text.trim_end_matches('\n'), ""),
        };
        if !id.starts_with(FAMILY_PREFIX) {
            return Err(DriverError::Identification(format!(
                "unexpected identification response: {id:?}"
            )));
        }
        self.serial_number = serial.to_string();
        Ok(id.to_string())
    }

    /// Count the `ADC n` lines of the channel report.
    pub fn discover_channel_count(&mut self) -> Result<usize> {
        let transport = self.transport()?;
        transport.write_all(b"c\n")?;
        let raw = transport.read_up_to(1000)?;
        let text = String::from_utf8(raw)?;
        Ok(text.lines().filter(|l| l.starts_with("ADC ")).count())
    }

    fn resolve_board_type(&mut self, id: &str) -> Result<()> {
        self.board_type = BoardType::from_id(id);
        self.profile = self.board_type.profile(self.channel_count);
        self.impedance_probe = self.board_type == BoardType::Adc8x && self.probe_impedance()?;
        debug!(
            "board type {:?}, impedance probe {}",
            self.board_type,
            if self.impedance_probe {
                "supported"
            } else {
                "unsupported"
            }
        );
        Ok(())
    }

    /// Extended firmware answers `i` with an `Impedance` report; older
    /// firmware does not know the command.
    fn probe_impedance(&mut self) -> Result<bool> {
        let transport = self.transport()?;
        let _ = transport.read_up_to(1000)?;
        transport.write_all(b"i\n")?;
        let raw = transport.read_up_to(1000)?;
        let supported = raw.starts_with(b"Impedance");
        let _ = transport.read_up_to(1000)?;
        Ok(supported)
    }

    /// Send one textual command and return the raw response text.
    pub fn query(&mut self, command_text: &str) -> Result<String> {
        let settle = self.settle;
        command::send(self.transport()?, command_text, settle)
    }

    fn command(&mut self, command_text: &str) -> Result<()> {
        let msg = self.query(command_text)?;
        self.apply_response(&msg);
        Ok(())
    }

    fn apply_response(&mut self, msg: &str) {
        let response = classify(msg);
        if let Response::Unparsed(text) = &response {
            warn!("unparsed device response: {text:?}");
        }
        self.state.apply(&response);
    }

    pub fn set_sampling(&mut self, rate: u32) -> Result<()> {
        self.command(&format!("s {rate}"))
    }

    pub fn set_channel(
        &mut self,
        channel: u8,
        gain: u16,
        polarity: Polarity,
        buffering: Buffering,
    ) -> Result<()> {
        self.check_channel(channel)?;
        self.command(&format!(
            "g {channel} {gain} {} {}",
            polarity.code(),
            buffering.code()
        ))
    }

    /// No-op on boards whose capability probe failed.
    pub fn set_impedance(&mut self, channel: u8, code: char) -> Result<()> {
        if !self.impedance_probe {
            return Ok(());
        }
        self.check_channel(channel)?;
        self.command(&format!("i {channel}{code}"))
    }

    fn check_channel(&self, channel: u8) -> Result<()> {
        if self.state.channels.get(channel).is_none() {
            return Err(DriverError::Configuration(format!(
                "channel {channel} outside discovered range 1..={}",
                self.channel_count
            )));
        }
        Ok(())
    }

    /// Apply a full configuration record: sampling rate first, then every
    /// channel in order. All-or-nothing — any failure closes the
    /// connection before propagating.
    pub fn configure(&mut self, config: &AcquisitionConfig) -> Result<()> {
        match self.try_configure(config) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn try_configure(&mut self, config: &AcquisitionConfig) -> Result<()> {
        self.set_sampling(config.sampling)?;
        for (i, setting) in config.adc.iter().enumerate() {
            let channel = (i + 1) as u8;
            let polarity = Polarity::from_code(setting.polarity).ok_or_else(|| {
                DriverError::Configuration(format!(
                    "channel {channel}: unknown polarity code {}",
                    setting.polarity
                ))
            })?;
            let buffering = Buffering::from_code(setting.buffer).ok_or_else(|| {
                DriverError::Configuration(format!(
                    "channel {channel}: unknown buffering code {:?}",
                    setting.buffer
                ))
            })?;
            self.set_channel(channel, setting.gain, polarity, buffering)?;
        }
        Ok(())
    }

    /// Re-read the board status dump and fold it into the state.
    pub fn refresh_status(&mut self) -> Result<String> {
        let msg = self.query("c")?;
        self.apply_response(&msg);
        Ok(msg)
    }

    /// Run one acquisition of `seconds` seconds and decode the stream.
    /// Acquisition errors leave the session usable; the device is reset
    /// to listening mode on every exit path.
    pub fn acquire(&mut self, seconds: u32) -> Result<Acquisition> {
        let profile = self
            .profile
            .clone()
            .ok_or_else(|| DriverError::NotReady("board type unresolved".into()))?;
        let channel_count = self.channel_count;
        acquisition::run(self.transport()?, &profile, channel_count, seconds)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn board_type(&self) -> BoardType {
        self.board_type
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn impedance_supported(&self) -> bool {
        self.impedance_probe
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn transport(&mut self) -> Result<&mut dyn Transport> {
        match self.transport.as_mut() {
            Some(t) => Ok(t.as_mut()),
            None => Err(DriverError::NotReady("connection closed".into())),
        }
    }

    /// Release the transport. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("connection closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
