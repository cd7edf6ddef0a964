//! Serial-port discovery and auto-connect.

use log::{debug, info};
use serialport::SerialPortType;

use crate::session::Session;

/// Candidate ports for a board: USB serial devices only.
pub fn candidate_ports() -> Vec<String> {
    serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .filter(|p| matches!(p.port_type, SerialPortType::UsbPort(_)))
        .map(|p| p.port_name)
        .collect()
}

/// Try each candidate port in turn, returning the first session that
/// identifies as a board. Ports that fail to identify are skipped.
pub fn auto_connect(baud_rate: u32) -> Option<Session> {
    for port in candidate_ports() {
        debug!("probing {port}");
        match Session::open(&port, baud_rate) {
            Ok(session) => {
                info!("found {} on {port}", session.id());
                return Some(session);
            }
            Err(e) => debug!("{port}: {e}"),
        }
    }
    None
}
