//! Driver for ADC-8 family multi-channel acquisition boards.
//!
//! The board speaks a textual command protocol for configuration and a
//! length-framed binary protocol for sample streaming, both over one
//! serial link. A [`Session`] owns the link: it identifies the board,
//! discovers its channel count, resolves the frame geometry for the
//! variant it found, and applies per-channel gain/polarity/buffering
//! settings. [`Session::acquire`] then decodes the binary stream into
//! calibrated voltage vectors ready for storage.
//!
//! # Timing
//!
//! The firmware needs a fixed settle interval (100 ms by default) between
//! receiving a command and having its full response queued; the command
//! channel sleeps that long before draining the reply. During streaming,
//! the read timeout is the natural end-of-run signal for fixed-duration
//! acquisitions, not an error.

pub mod acquisition;
pub mod board;
pub mod command;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod logging;
pub mod response;
pub mod session;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use acquisition::{Acquisition, AcquisitionHeader, SampleVector};
pub use board::{
    BoardProfile, BoardState, BoardType, Buffering, ChannelConfig, ChannelTable, HeaderLayout,
    Polarity,
};
pub use config::{AcquisitionConfig, ChannelSetting};
pub use errors::{AcquisitionError, DriverError, Result};
pub use response::{classify, Response};
pub use session::Session;
pub use transport::{SerialTransport, Transport};
