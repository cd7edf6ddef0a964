//! Textual command channel.

use std::thread;
use std::time::Duration;

use log::debug;

use crate::errors::Result;
use crate::transport::Transport;

/// Fixed delay between writing a command and reading its response. The
/// firmware needs this long to queue the full reply; reading earlier
/// returns only a prefix. This is protocol timing, not a retry interval.
pub const SETTLE_INTERVAL: Duration = Duration::from_millis(100);

/// Send one newline-terminated command and return the accumulated
/// response text. Whatever has arrived after the settle interval is the
/// response; a slower device simply yields a shorter one.
pub fn send(transport: &mut dyn Transport, command: &str, settle: Duration) -> Result<String> {
    debug!("sending: {command}");
    transport.write_all(command.as_bytes())?;
    transport.write_all(b"\n")?;
    thread::sleep(settle);
    let raw = transport.read_available()?;
    let text = String::from_utf8(raw)?;
    debug!("received: {text:?}");
    Ok(text)
}
