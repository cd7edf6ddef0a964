//! CSV persistence helpers for decoded sample vectors.
//!
//! The decoder only produces [`SampleVector`]s; opening and closing the
//! destination is the caller's job.

use std::io::{self, Write};

use crate::acquisition::SampleVector;

/// Render one voltage: shortest decimal form, whole numbers keeping a
/// trailing `.0`.
pub fn format_voltage(v: f64) -> String {
    let s = format!("{v}");
    if s.contains('.') {
        s
    } else {
        format!("{s}.0")
    }
}

/// One comma-separated line for one sample vector.
pub fn format_line(volts: &[f64]) -> String {
    volts
        .iter()
        .map(|v| format_voltage(*v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Write one newline-terminated line per sample vector, no header row.
pub fn write_samples<W: Write>(mut out: W, samples: &[SampleVector]) -> io::Result<()> {
    for volts in samples {
        writeln!(out, "{}", format_line(volts))?;
    }
    Ok(())
}
