//! Plain-text dump of the last acquisition.
//!
//! ```text
//! # DeviceId=Rigol Technologies,DS1052E,DS1ET0000,00.04.01
//! # Fri Mar 14 09:26:53 2025
//! # Chan1: 8e-2 V/count, offset 1.04e1 V
//! # Horiz: 2e-8 sec/sample, Trigger: -6e-6 sec
//! # Time (sec)	Channel 1 (V)
//! -6.0000e-6	0.000e0
//! ```
//!
//! Lines starting with `#` are comments; each remaining line holds the
//! sample time followed by one tab-separated voltage per grabbed channel.

use crate::scope::Scope;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

impl<T, D> Scope<T, D> {
    /// Write the last acquisition to `out`. `header` is copied verbatim in
    /// front of the generated comment lines.
    pub fn write_waveforms(&self, mut out: impl Write, header: &str) -> io::Result<()> {
        let channels: Vec<_> = self.grabbed_channels().collect();
        let traces: Vec<Vec<f64>> = channels.iter().map(|c| c.scaled_waveform()).collect();

        out.write_all(header.as_bytes())?;
        writeln!(out, "# DeviceId={}", self.name().trim())?;
        match self.acquired_at() {
            Some(stamp) => writeln!(out, "# {}", stamp.format(CTIME_FORMAT))?,
            None => writeln!(out, "# never acquired")?,
        }
        for channel in &channels {
            writeln!(
                out,
                "# Chan{}: {:e} V/count, offset {:e} V",
                channel.index(),
                channel.vertical_gain(),
                channel.vertical_offset()
            )?;
        }
        writeln!(
            out,
            "# Horiz: {:e} sec/sample, Trigger: {:e} sec",
            self.sample_interval(),
            self.time_origin()
        )?;

        write!(out, "# Time (sec)")?;
        for channel in &channels {
            write!(out, "\tChannel {} (V)", channel.index())?;
        }
        writeln!(out)?;

        for (i, time) in self.time_axis().iter().enumerate() {
            write!(out, "{time:.4e}")?;
            for trace in &traces {
                match trace.get(i) {
                    Some(volts) => write!(out, "\t{volts:.3e}")?,
                    None => write!(out, "\t")?,
                }
            }
            writeln!(out)?;
        }

        out.flush()
    }

    /// [`write_waveforms`](Self::write_waveforms) into a new file at `path`.
    pub fn save_waveforms(&self, path: impl AsRef<Path>, header: &str) -> io::Result<()> {
        let path = path.as_ref();
        log::info!("Writing waveforms to {}", path.display());
        self.write_waveforms(BufWriter::new(File::create(path)?), header)
    }
}
