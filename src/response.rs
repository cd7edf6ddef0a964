//! Classifier for the firmware's textual response dialects.
//!
//! The firmware emits fixed templates, so classification is prefix and
//! token matching rather than a grammar. Anything that fails to match a
//! template wholesale becomes [`Response::Unparsed`]: the caller logs it
//! and existing configuration state stays untouched.

use crate::board::{Buffering, Polarity};

/// One classified firmware response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `Sampling rate set to <rate> ...`
    SamplingRate(f64),
    /// `ADC <n> ... disabled`
    ChannelDisabled(u8),
    /// `ADC <n> gain set to <g>, <polarity>, <buffering>`
    ChannelConfigured {
        channel: u8,
        gain: u16,
        /// `None` when the polarity fragment did not match; the field is
        /// left at its previous value.
        polarity: Option<Polarity>,
        buffering: Option<Buffering>,
    },
    /// `All ADCs ... disabled`
    AllDisabled,
    /// `All ADCs gain set to <g>, <polarity>, <buffering>`
    AllConfigured {
        gain: u16,
        polarity: Option<Polarity>,
        buffering: Option<Buffering>,
    },
    /// `Impedance settings ...`, one code per channel.
    Impedances(Vec<char>),
    /// Multi-line `Current settings` board status dump.
    Status(StatusReport),
    /// Unknown text; never applied to state.
    Unparsed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub sampling: Option<f64>,
    pub channels: Vec<StatusLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub channel: u8,
    /// `None` for a disabled channel.
    pub config: Option<StatusConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusConfig {
    pub gain: u16,
    pub polarity: Polarity,
    pub buffering: Buffering,
    pub impedance: Option<char>,
}

/// Classify one raw response into exactly one variant.
pub fn classify(msg: &str) -> Response {
    let parsed = if msg.starts_with("Sampling rate set to ") {
        parse_sampling(msg).map(Response::SamplingRate)
    } else if msg.starts_with("ADC ") {
        parse_channel(msg)
    } else if msg.starts_with("All ADCs ") {
        parse_all(msg)
    } else if msg.starts_with("Impedance settings") {
        parse_impedances(msg)
    } else if msg.trim_start().starts_with("Current settings") {
        parse_status(msg)
    } else {
        None
    };
    parsed.unwrap_or_else(|| Response::Unparsed(msg.to_string()))
}

fn parse_sampling(msg: &str) -> Option<f64> {
    msg.split(' ').nth(4)?.trim().parse().ok()
}

fn parse_channel(msg: &str) -> Option<Response> {
    let channel = msg.chars().nth(4)?.to_digit(10)? as u8;
    if msg.trim_end().ends_with("disabled") {
        return Some(Response::ChannelDisabled(channel));
    }
    let (gain, polarity, buffering) = parse_triple(msg)?;
    Some(Response::ChannelConfigured {
        channel,
        gain,
        polarity,
        buffering,
    })
}

fn parse_all(msg: &str) -> Option<Response> {
    if msg.trim_end().ends_with("disabled") {
        return Some(Response::AllDisabled);
    }
    let (gain, polarity, buffering) = parse_triple(msg)?;
    Some(Response::AllConfigured {
        gain,
        polarity,
        buffering,
    })
}

/// Shared `<gain clause>, <polarity clause>, <buffering clause>` layout of
/// the single-channel and all-channel acknowledgements. The gain is the
/// 6th whitespace token of the first comma clause.
fn parse_triple(msg: &str) -> Option<(u16, Option<Polarity>, Option<Buffering>)> {
    let mut clauses = msg.split(',');
    let gain = clauses.next()?.split(' ').nth(5)?.trim().parse().ok()?;
    let polarity = match clauses.next()?.split(' ').next_back()?.trim() {
        "(unipolar)" => Some(Polarity::Unipolar),
        "(bipolar)" => Some(Polarity::Bipolar),
        _ => None,
    };
    let buffer_token = clauses.next()?.split(' ').next_back()?.trim();
    let buffering = if buffer_token.starts_with("unbuffered") {
        Some(Buffering::Unbuffered)
    } else if buffer_token.starts_with("buffered") {
        Some(Buffering::Buffered)
    } else {
        None
    };
    Some((gain, polarity, buffering))
}

/// Impedance codes are the second character of each whitespace token from
/// the 4th onward.
fn parse_impedances(msg: &str) -> Option<Response> {
    let codes = msg
        .split_whitespace()
        .skip(3)
        .map(|tok| tok.chars().nth(1))
        .collect::<Option<Vec<char>>>()?;
    Some(Response::Impedances(codes))
}

fn parse_status(msg: &str) -> Option<Response> {
    let mut report = StatusReport {
        sampling: None,
        channels: Vec::new(),
    };
    for line in msg.lines() {
        if line.starts_with("Current settings:") {
            report.sampling = Some(line.rsplit(' ').next()?.trim().parse().ok()?);
        } else if line.starts_with("ADC ") {
            report.channels.push(parse_status_line(line)?);
        }
    }
    Some(Response::Status(report))
}

fn parse_status_line(line: &str) -> Option<StatusLine> {
    let (head, rest) = line.split_once(": ")?;
    let channel = head.chars().next_back()?.to_digit(10)? as u8;
    if rest.starts_with("disabled") {
        return Some(StatusLine {
            channel,
            config: None,
        });
    }
    let clauses: Vec<&str> = rest.split(", ").collect();
    if clauses.len() < 3 {
        return None;
    }
    let gain = clauses[0].split(' ').nth(1)?.trim().parse().ok()?;
    let polarity = if clauses[1] == "bipolar" {
        Polarity::Bipolar
    } else {
        Polarity::Unipolar
    };
    let buffering = if clauses[2] == "unbuffered" {
        Buffering::Unbuffered
    } else {
        Buffering::Buffered
    };
    // A 4th clause ends with the impedance code; a 3-clause line clears it.
    let impedance = if clauses.len() == 4 {
        clauses[3].chars().next_back()
    } else {
        None
    };
    Some(StatusLine {
        channel,
        config: Some(StatusConfig {
            gain,
            polarity,
            buffering,
            impedance,
        }),
    })
}
