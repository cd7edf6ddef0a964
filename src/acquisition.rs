//! Binary streaming decoder for the acquisition sub-protocol.
//!
//! Drives the `b<seconds>` command: discards the textual preamble up to
//! the `+` marker, validates the header against the layout chosen at
//! board resolution, extracts the per-channel gain/polarity table, then
//! decodes length-prefixed sample blocks until the stream drains. Every
//! exit path sends a newline so the device falls back to listening mode,
//! and restores the link's original read timeout.

use std::time::Duration;

use log::{debug, warn};

use crate::board::{BoardProfile, HeaderLayout};
use crate::errors::{AcquisitionError, Result};
use crate::transport::Transport;

/// Read timeout while the device is streaming.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(6);

/// Longest textual preamble tolerated before the `+` marker.
const PREAMBLE_LIMIT: usize = 1024;

/// Voltages for one sample instant, one entry per active channel.
pub type SampleVector = Vec<f64>;

/// Per-channel gain and polarity extracted from a validated header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionHeader {
    pub gains: Vec<u8>,
    pub bipolar: Vec<bool>,
}

impl AcquisitionHeader {
    /// Decode `raw` against the given layout. The signature must match
    /// the layout's byte pattern exactly.
    pub fn parse(
        raw: &[u8],
        layout: HeaderLayout,
        channel_count: usize,
        bipolar_mask: u8,
    ) -> std::result::Result<Self, AcquisitionError> {
        let sig = layout.signature();
        if raw.len() < sig.len() {
            return Err(AcquisitionError::ShortHeader {
                expected: sig.len(),
                got: raw.len(),
            });
        }
        if &raw[..sig.len()] != sig {
            return Err(AcquisitionError::InvalidHeader(raw[..sig.len()].to_vec()));
        }
        let pairs = sig.len() + layout.preamble_len();
        let needed = pairs + 2 * channel_count;
        if raw.len() < needed {
            return Err(AcquisitionError::ShortHeader {
                expected: needed,
                got: raw.len(),
            });
        }
        let mut gains = Vec::with_capacity(channel_count);
        let mut bipolar = Vec::with_capacity(channel_count);
        for ch in 0..channel_count {
            gains.push(raw[pairs + 2 * ch]);
            bipolar.push(raw[pairs + 2 * ch + 1] & bipolar_mask != 0);
        }
        Ok(Self { gains, bipolar })
    }

    pub fn active_channels(&self) -> usize {
        self.gains.iter().filter(|&&g| g > 0).count()
    }
}

/// Decoded output of one acquisition run.
#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    /// Sample vectors in arrival order, inactive channels omitted.
    pub samples: Vec<SampleVector>,
    /// Set when the run ended on a read timeout rather than an explicit
    /// zero-length block. The normal end for fixed-duration acquisitions.
    pub timed_out: bool,
}

/// Run one acquisition of `acquire_secs` seconds and decode the stream.
pub fn run(
    transport: &mut dyn Transport,
    profile: &BoardProfile,
    channel_count: usize,
    acquire_secs: u32,
) -> Result<Acquisition> {
    let original_timeout = transport.timeout();
    transport.write_all(format!("b{acquire_secs}\n").as_bytes())?;
    transport.set_timeout(STREAM_TIMEOUT)?;

    let outcome = stream(transport, profile, channel_count);

    // Return the device to listening mode and the link to its previous
    // timeout, then swallow whatever is still in flight.
    let _ = transport.write_all(b"\n");
    let _ = transport.set_timeout(original_timeout);
    let _ = transport.read_up_to(1000);

    outcome
}

fn stream(
    transport: &mut dyn Transport,
    profile: &BoardProfile,
    channel_count: usize,
) -> Result<Acquisition> {
    transport.read_until(b'+', PREAMBLE_LIMIT)?;

    let raw = transport.read_up_to(profile.header_len)?;
    if raw.len() < profile.header_len {
        return Err(AcquisitionError::ShortHeader {
            expected: profile.header_len,
            got: raw.len(),
        }
        .into());
    }
    let header =
        AcquisitionHeader::parse(&raw, profile.layout, channel_count, profile.bipolar_mask)?;
    let active = header.active_channels();
    if active == 0 {
        return Err(AcquisitionError::NoActiveChannels.into());
    }
    let block_size = active * 3;
    debug!("streaming {active} active channels, block size {block_size}");

    // The 4-channel extended board emits 8 junk bytes between the header
    // and the first block.
    if profile.layout == HeaderLayout::Extended && channel_count == 4 {
        let _ = transport.read_up_to(8)?;
    }

    let mut acquisition = Acquisition::default();
    let mut warned = false;
    loop {
        let len_byte = transport.read_up_to(1)?;
        let Some(&first) = len_byte.first() else {
            debug!("read timeout, stream drained");
            acquisition.timed_out = true;
            break;
        };
        let mut len = first as usize;
        if len == 0 {
            debug!("end of data");
            break;
        }
        let block = transport.read_up_to(len)?;
        if block.len() < len {
            return Err(AcquisitionError::ShortBlock {
                expected: len,
                got: block.len(),
            }
            .into());
        }
        if len % block_size != 0 {
            // Salvage the whole blocks, drop the trailing partial one.
            if !warned {
                warn!("invalid buffer length {len}, truncating to whole blocks");
                warned = true;
            }
            len -= len % block_size;
        }
        for chunk in block[..len].chunks_exact(block_size) {
            acquisition.samples.push(convert_block(chunk, &header, profile));
        }
    }
    Ok(acquisition)
}

/// Convert one block of 3-byte little-endian magnitudes to calibrated
/// volts, skipping inactive channels.
pub fn convert_block(
    block: &[u8],
    header: &AcquisitionHeader,
    profile: &BoardProfile,
) -> SampleVector {
    let mut volts = Vec::with_capacity(header.active_channels());
    let mut offset = 0;
    for (i, &gain) in header.gains.iter().enumerate() {
        if gain == 0 {
            continue;
        }
        let magnitude = u32::from(block[offset])
            | u32::from(block[offset + 1]) << 8
            | u32::from(block[offset + 2]) << 16;
        let mut x = f64::from(magnitude) * profile.scale;
        if header.bipolar[i] {
            x = 2.0 * x - 1.0;
        }
        volts.push(round9(x * profile.vref / f64::from(gain)));
        offset += 3;
    }
    volts
}

/// Round to 9 decimal places, the precision of the output format.
fn round9(v: f64) -> f64 {
    (v * 1e9).round() / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardType, BIPOLAR_MASK, SCALE_24, VREF};
    use crate::testutil::MockTransport;
    use crate::transport::DEFAULT_TIMEOUT;

    fn extended_profile(channels: usize) -> BoardProfile {
        BoardType::Adc8x.profile(channels).unwrap()
    }

    /// Extended header for 4 channels: signature, 2-byte preamble, then
    /// (gain, flags) pairs.
    fn extended_header(pairs: &[(u8, u8)]) -> Vec<u8> {
        let mut h = b"ADC8x-1.".to_vec();
        h.extend_from_slice(&[0, 0]);
        for &(gain, flags) in pairs {
            h.push(gain);
            h.push(flags);
        }
        h
    }

    #[test]
    fn parses_legacy_and_extended_headers() {
        let mut legacy = b"ADC8".to_vec();
        legacy.extend_from_slice(&[0, 0, 0, 0]);
        legacy.extend_from_slice(&[1, 0, 2, 2, 0, 0, 4, 0]);
        let header =
            AcquisitionHeader::parse(&legacy, HeaderLayout::Legacy, 4, BIPOLAR_MASK).unwrap();
        assert_eq!(header.gains, vec![1, 2, 0, 4]);
        assert_eq!(header.bipolar, vec![false, true, false, false]);
        assert_eq!(header.active_channels(), 3);

        let extended = extended_header(&[(4, 0), (4, 0), (4, 0), (4, 0)]);
        let header =
            AcquisitionHeader::parse(&extended, HeaderLayout::Extended, 4, BIPOLAR_MASK).unwrap();
        assert_eq!(header.gains, vec![4, 4, 4, 4]);
        assert_eq!(header.active_channels(), 4);
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut raw = b"BOGUS-9.".to_vec();
        raw.extend_from_slice(&[0; 10]);
        let err = AcquisitionHeader::parse(&raw, HeaderLayout::Extended, 4, BIPOLAR_MASK)
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::InvalidHeader(_)));
    }

    #[test]
    fn bipolar_flag_uses_only_the_mask_bit() {
        let raw = extended_header(&[(1, 0x01), (1, 0x03)]);
        let header =
            AcquisitionHeader::parse(&raw, HeaderLayout::Extended, 2, BIPOLAR_MASK).unwrap();
        assert_eq!(header.bipolar, vec![false, true]);
    }

    #[test]
    fn converts_zero_magnitudes_to_zero_volts() {
        let header = AcquisitionHeader {
            gains: vec![4, 4, 4, 4],
            bipolar: vec![false; 4],
        };
        let volts = convert_block(&[0u8; 12], &header, &extended_profile(4));
        assert_eq!(volts, vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn bipolar_half_scale_maps_to_zero_volts() {
        let header = AcquisitionHeader {
            gains: vec![1],
            bipolar: vec![true],
        };
        // 0x800000 little-endian: half full scale, remapped to 0.
        let volts = convert_block(&[0x00, 0x00, 0x80], &header, &extended_profile(1));
        assert_eq!(volts, vec![0.0]);
    }

    #[test]
    fn inactive_channels_are_omitted_from_the_vector() {
        let header = AcquisitionHeader {
            gains: vec![2, 0, 1],
            bipolar: vec![false, false, false],
        };
        let block = [0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x80];
        let volts = convert_block(&block, &header, &extended_profile(3));
        assert_eq!(volts.len(), 2);
        // Second entry is channel 3's half-scale magnitude at gain 1.
        assert!((volts[1] - 0.5 * VREF).abs() < 1e-8);
    }

    #[test]
    fn magnitudes_survive_a_round_trip_within_rounding() {
        let header = AcquisitionHeader {
            gains: vec![1, 2, 4],
            bipolar: vec![false, true, false],
        };
        let magnitudes: [u32; 3] = [0x123456, 0x800000, 0xABCDEF];
        let mut block = Vec::new();
        for m in magnitudes {
            block.extend_from_slice(&m.to_le_bytes()[..3]);
        }
        let volts = convert_block(&block, &header, &extended_profile(3));
        for (i, (&m, &v)) in magnitudes.iter().zip(&volts).enumerate() {
            let mut x = v * f64::from(header.gains[i]) / VREF;
            if header.bipolar[i] {
                x = (x + 1.0) / 2.0;
            }
            let reconstructed = x / SCALE_24;
            assert!(
                (reconstructed - f64::from(m)).abs() < 0.5,
                "channel {i}: {reconstructed} vs {m}"
            );
        }
    }

    fn scripted_stream(mock: &MockTransport, header: &[u8], body: &[u8]) {
        let mut stream = b"ADC-8x ready+".to_vec();
        stream.extend_from_slice(header);
        stream.extend_from_slice(&[0u8; 8]); // 4-channel extended junk bytes
        stream.extend_from_slice(body);
        mock.push_data(&stream);
    }

    #[test]
    fn decodes_one_block_of_zeros() {
        let mut mock = MockTransport::new();
        let header = extended_header(&[(4, 0), (4, 0), (4, 0), (4, 0)]);
        let mut body = vec![12u8];
        body.extend_from_slice(&[0u8; 12]);
        body.push(0); // end of data
        scripted_stream(&mock, &header, &body);

        let acq = run(&mut mock, &extended_profile(4), 4, 2).unwrap();
        assert_eq!(acq.samples, vec![vec![0.0, 0.0, 0.0, 0.0]]);
        assert_eq!(
            crate::storage::format_line(&acq.samples[0]),
            "0.0,0.0,0.0,0.0"
        );
        assert!(!acq.timed_out);

        let written = mock.written();
        assert!(written.starts_with(b"b2\n"));
        assert!(written.ends_with(b"\n"));
        assert_eq!(mock.timeouts_set(), vec![STREAM_TIMEOUT, DEFAULT_TIMEOUT]);
    }

    #[test]
    fn read_timeout_ends_the_run_without_error() {
        let mut mock = MockTransport::new();
        let header = extended_header(&[(4, 0), (4, 0), (4, 0), (4, 0)]);
        let mut body = vec![12u8];
        body.extend_from_slice(&[0u8; 12]);
        scripted_stream(&mock, &header, &body);
        mock.push_gap(); // no length byte arrives

        let acq = run(&mut mock, &extended_profile(4), 4, 2).unwrap();
        assert_eq!(acq.samples.len(), 1);
        assert!(acq.timed_out);
    }

    #[test]
    fn zero_length_byte_first_yields_an_empty_run() {
        let mut mock = MockTransport::new();
        let header = extended_header(&[(4, 0), (4, 0), (4, 0), (4, 0)]);
        scripted_stream(&mock, &header, &[0u8]);

        let acq = run(&mut mock, &extended_profile(4), 4, 1).unwrap();
        assert!(acq.samples.is_empty());
        assert!(!acq.timed_out);
    }

    #[test]
    fn odd_block_lengths_are_truncated_to_whole_blocks() {
        let mut mock = MockTransport::new();
        // One active channel: block size 3.
        let header = extended_header(&[(4, 0), (0, 0), (0, 0), (0, 0)]);
        let mut body = vec![8u8]; // 8 = 2 whole blocks + 2 stray bytes
        body.extend_from_slice(&[0u8; 8]);
        body.push(0);
        scripted_stream(&mock, &header, &body);

        let acq = run(&mut mock, &extended_profile(4), 4, 1).unwrap();
        assert_eq!(acq.samples.len(), 2);
        assert_eq!(acq.samples[0], vec![0.0]);
    }

    #[test]
    fn short_block_aborts_the_run() {
        let mut mock = MockTransport::new();
        let header = extended_header(&[(4, 0), (4, 0), (4, 0), (4, 0)]);
        let mut stream = b"+".to_vec();
        stream.extend_from_slice(&header);
        stream.extend_from_slice(&[0u8; 8]);
        stream.push(12);
        stream.extend_from_slice(&[0u8; 5]); // block cut short
        mock.push_data(&stream);
        mock.push_gap();

        let err = run(&mut mock, &extended_profile(4), 4, 1).unwrap_err();
        assert!(matches!(
            err,
            crate::errors::DriverError::Acquisition(AcquisitionError::ShortBlock {
                expected: 12,
                got: 5
            })
        ));
        // The device is still reset to listening mode.
        assert!(mock.written().ends_with(b"\n"));
        assert_eq!(mock.timeouts_set(), vec![STREAM_TIMEOUT, DEFAULT_TIMEOUT]);
    }

    #[test]
    fn all_gains_zero_aborts_before_any_block_read() {
        let mut mock = MockTransport::new();
        let header = extended_header(&[(0, 0), (0, 0), (0, 0), (0, 0)]);
        let mut stream = b"+".to_vec();
        stream.extend_from_slice(&header);
        mock.push_data(&stream);
        mock.push_gap();

        let err = run(&mut mock, &extended_profile(4), 4, 1).unwrap_err();
        assert!(matches!(
            err,
            crate::errors::DriverError::Acquisition(AcquisitionError::NoActiveChannels)
        ));
    }

    #[test]
    fn short_header_aborts_the_run() {
        let mut mock = MockTransport::new();
        mock.push_data(b"+ADC8x-1.");
        mock.push_gap();

        let err = run(&mut mock, &extended_profile(4), 4, 1).unwrap_err();
        assert!(matches!(
            err,
            crate::errors::DriverError::Acquisition(AcquisitionError::ShortHeader { .. })
        ));
    }

    #[test]
    fn legacy_board_streams_without_the_junk_discard() {
        let mut mock = MockTransport::new();
        let profile = BoardType::Adc8.profile(4).unwrap();
        let mut stream = b"+ADC8".to_vec();
        stream.extend_from_slice(&[0, 0, 0, 0]);
        stream.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]); // one active channel
        stream.push(3);
        stream.extend_from_slice(&[0x00, 0x00, 0x80]);
        stream.push(0);
        mock.push_data(&stream);

        let acq = run(&mut mock, &profile, 4, 1).unwrap();
        assert_eq!(acq.samples.len(), 1);
        assert!((acq.samples[0][0] - 0.5 * VREF).abs() < 1e-8);
    }
}
