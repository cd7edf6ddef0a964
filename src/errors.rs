use std::io;
use thiserror::Error;

/// Errors that end the current session. The serial link is no longer
/// trustworthy (or was never a recognized board); the caller may retry
/// with a fresh connect.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("response is not valid utf-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
    #[error("identification failed: {0}")]
    Identification(String),
    #[error("configuration rejected: {0}")]
    Configuration(String),
    #[error("device not ready: {0}")]
    NotReady(String),
    #[error("acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),
}

/// Errors fatal to one acquisition run only. The device is returned to
/// listening mode on the way out, so the session stays usable.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid header signature: {0:02X?}")]
    InvalidHeader(Vec<u8>),
    #[error("short header: expected {expected} bytes, got {got}")]
    ShortHeader { expected: usize, got: usize },
    #[error("header shows no active channels")]
    NoActiveChannels,
    #[error("short data buffer: expected {expected} bytes, got {got}")]
    ShortBlock { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, DriverError>;
