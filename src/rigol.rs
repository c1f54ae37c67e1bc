//! Rigol DS1000-series scopes, normally attached through the USBTMC driver.
//!
//! A channel grab is six blocking round trips: the screen trace itself
//! followed by the vertical scale and offset of the channel and the
//! horizontal scale and offset of the timebase.

use crate::scope::{Scope, ScopeError};
use crate::transport::Transport;
use crate::usbtmc::UsbtmcDevice;
use crate::waveform::{parse_number, DecodedWaveform, Timebase, WaveformDecoder, WaveformError};
use std::path::Path;

/// Length of the block header (`#8` plus eight length digits) in front of the
/// trace bytes.
pub const PREAMBLE_LEN: usize = 10;
/// Read budget for `:WAV:DATA?`.
pub const RAW_DATA_LEN: usize = 9000;
pub const HORIZONTAL_DIVISIONS: f64 = 12.0;

// The two constants below were measured on a DS1052E, not taken from vendor
// documentation; other models or firmware may place the trace differently.

/// Raw counts per vertical division (200 counts across 8 divisions).
pub const COUNTS_PER_DIVISION: f64 = 25.0;
/// Raw count at the vertical centre of the screen, where the channel offset
/// voltage sits.
pub const SCREEN_CENTER_COUNT: f64 = 130.0;

/// Averaging depths accepted by `:ACQuire:AVERages`.
pub const AVERAGE_COUNTS: [u32; 8] = [2, 4, 8, 16, 32, 64, 128, 256];

const SCALAR_REPLY_LEN: usize = 20;

/// Front panel settings that turn trace bytes into volts and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PanelScales {
    /// Volts per division.
    pub volt_scale: f64,
    /// Channel offset in volts.
    pub volt_offset: f64,
    /// Seconds per division.
    pub time_scale: f64,
    /// Time at the horizontal centre of the screen.
    pub time_offset: f64,
}

/// Decode a `:WAV:DATA?` reply.
///
/// Trace bytes count down from the top of the screen, so they are inverted
/// to make larger values mean higher voltages.
pub fn decode(buf: &[u8], scales: &PanelScales) -> Result<DecodedWaveform, WaveformError> {
    let trace = buf.get(PREAMBLE_LEN..).ok_or(WaveformError::TooShort {
        needed: PREAMBLE_LEN + 1,
        actual: buf.len(),
    })?;
    if trace.is_empty() {
        return Err(WaveformError::NoSamples);
    }

    let samples: Vec<i16> = trace.iter().map(|&b| 255 - i16::from(b)).collect();

    let vertical_gain = scales.volt_scale / COUNTS_PER_DIVISION;
    let vertical_offset = SCREEN_CENTER_COUNT.mul_add(vertical_gain, scales.volt_offset);

    let horizontal_span = HORIZONTAL_DIVISIONS * scales.time_scale;
    let timebase = Timebase {
        sample_interval: horizontal_span / samples.len() as f64,
        time_origin: scales.time_offset - horizontal_span / 2.0,
        sample_count: samples.len(),
    };

    Ok(DecodedWaveform {
        samples,
        vertical_gain,
        vertical_offset,
        timebase,
    })
}

fn query_number<T: Transport + ?Sized>(transport: &mut T, command: &str) -> Result<f64, ScopeError> {
    let reply = transport.query(command, SCALAR_REPLY_LEN)?;
    parse_number(command, &reply)
}

/// Two-channel Rigol DS1000 decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rigol;

impl Rigol {
    pub const CHANNELS: usize = 2;
}

impl WaveformDecoder for Rigol {
    fn channel_count(&self) -> usize {
        Self::CHANNELS
    }

    fn read_waveform<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        channel: usize,
    ) -> Result<DecodedWaveform, ScopeError> {
        let buf = transport.query(&format!(":WAV:DATA? CHAN{channel}"), RAW_DATA_LEN)?;

        let scales = PanelScales {
            volt_scale: query_number(transport, &format!(":CHAN{channel}:SCAL?"))?,
            volt_offset: query_number(transport, &format!(":CHAN{channel}:OFFS?"))?,
            time_scale: query_number(transport, ":TIM:SCAL?")?,
            time_offset: query_number(transport, ":TIM:OFFS?")?,
        };
        log::debug!("CH{} panel scales: {:?}", channel, scales);

        Ok(decode(&buf, &scales)?)
    }

    /// Forcing a trigger also returns the panel to local control.
    fn release<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<(), ScopeError> {
        transport.write(":KEY:FORC")?;
        Ok(())
    }
}

pub type RigolScope<T = UsbtmcDevice> = Scope<T, Rigol>;

impl Scope<UsbtmcDevice, Rigol> {
    /// Open a scope exposed by the kernel driver, e.g. `/dev/usbtmc0`.
    pub fn open(device: impl AsRef<Path>) -> Result<Self, ScopeError> {
        Self::new(UsbtmcDevice::open(device)?, Rigol)
    }
}

impl<T: Transport> Scope<T, Rigol> {
    pub fn stop(&mut self) -> Result<(), ScopeError> {
        self.write(":STOP")
    }

    pub fn run(&mut self) -> Result<(), ScopeError> {
        self.write(":RUN")
    }

    /// Trigger now and return the panel to local control.
    pub fn force_trigger(&mut self) -> Result<(), ScopeError> {
        self.write(":KEY:FORC")
    }

    /// Unlock the front panel keys.
    pub fn unlock(&mut self) -> Result<(), ScopeError> {
        self.write(":KEY:LOCK DIS")
    }

    pub fn enable_averaging(&mut self, on: bool) -> Result<(), ScopeError> {
        if on {
            self.write(":ACQuire:TYPE AVERage")
        } else {
            self.write(":ACQuire:TYPE NORMal")
        }
    }

    pub fn set_averages(&mut self, averages: u32) -> Result<(), ScopeError> {
        if !AVERAGE_COUNTS.contains(&averages) {
            return Err(ScopeError::InvalidSetting(format!(
                "{averages} averages, expected one of {AVERAGE_COUNTS:?}"
            )));
        }
        self.write(&format!(":ACQuire:AVERages {averages}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    fn trace_reply(bytes: &[u8]) -> Vec<u8> {
        let mut reply = format!("#8{:08}", bytes.len()).into_bytes();
        reply.extend_from_slice(bytes);
        reply
    }

    fn rigol_transport(ch1: &[u8], ch2: &[u8]) -> LoopbackTransport {
        LoopbackTransport::new()
            .respond("*IDN?", "Rigol Technologies,DS1052E,DS1ET0000,00.04.01\n")
            .respond(":WAV:DATA? CHAN1", trace_reply(ch1))
            .respond(":WAV:DATA? CHAN2", trace_reply(ch2))
            .respond(":CHAN1:SCAL?", "2.000e+00\n")
            .respond(":CHAN1:OFFS?", "0.000e+00\n")
            .respond(":CHAN2:SCAL?", "5.000e-01\n")
            .respond(":CHAN2:OFFS?", "-1.000e+00\n")
            .respond(":TIM:SCAL?", "1.000e-06\n")
            .respond(":TIM:OFFS?", "0.000e+00\n")
    }

    fn center_scales() -> PanelScales {
        PanelScales {
            volt_scale: 2.0,
            volt_offset: 0.0,
            time_scale: 1e-6,
            time_offset: 0.0,
        }
    }

    #[test]
    fn test_screen_center_is_zero_volts() {
        // byte 125 inverts to raw count 130
        let decoded = decode(&trace_reply(&[125; 600]), &center_scales()).unwrap();
        assert_eq!(decoded.samples[0], 130);
        assert!((decoded.vertical_gain - 0.08).abs() < 1e-12);
        assert!((decoded.vertical_offset - 10.4).abs() < 1e-12);
        assert!(decoded.scaled().iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_bytes_are_inverted() {
        let decoded = decode(&trace_reply(&[0, 255, 100]), &center_scales()).unwrap();
        assert_eq!(decoded.samples, [255, 0, 155]);
    }

    #[test]
    fn test_timebase_from_panel() {
        let decoded = decode(&trace_reply(&[128; 600]), &center_scales()).unwrap();
        let timebase = decoded.timebase;
        assert_eq!(timebase.sample_count, 600);
        assert!((timebase.sample_interval - 2e-8).abs() < 1e-20);
        assert!((timebase.time_origin + 6e-6).abs() < 1e-18);
    }

    #[test]
    fn test_time_offset_shifts_origin() {
        let scales = PanelScales {
            time_offset: 1e-3,
            ..center_scales()
        };
        let decoded = decode(&trace_reply(&[128; 600]), &scales).unwrap();
        assert!((decoded.timebase.time_origin - (1e-3 - 6e-6)).abs() < 1e-15);
    }

    #[test]
    fn test_short_reply_is_malformed() {
        assert_eq!(
            decode(b"#80000", &center_scales()),
            Err(WaveformError::TooShort {
                needed: 11,
                actual: 6
            })
        );
        assert_eq!(
            decode(b"#800000000", &center_scales()),
            Err(WaveformError::NoSamples)
        );
    }

    #[test]
    fn test_read_waveform_issues_six_queries_in_order() {
        let mut transport = rigol_transport(&[125; 600], &[125; 600]);
        let decoded = Rigol.read_waveform(&mut transport, 2).unwrap();
        assert_eq!(
            transport.writes(),
            [
                ":WAV:DATA? CHAN2",
                ":CHAN2:SCAL?",
                ":CHAN2:OFFS?",
                ":TIM:SCAL?",
                ":TIM:OFFS?",
            ]
        );
        // 0.5 V/div, -1 V offset
        assert!((decoded.vertical_gain - 0.02).abs() < 1e-12);
        assert!((decoded.vertical_offset - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_read_waveform_propagates_timeout() {
        let mut transport = rigol_transport(&[125; 600], &[125; 600]);
        transport.fail_on(":TIM:OFFS?", 1);
        let err = Rigol.read_waveform(&mut transport, 1).unwrap_err();
        assert!(matches!(err, ScopeError::Transport(ref e) if e.is_timeout()));
    }

    #[test]
    fn test_read_waveform_rejects_unparsable_scale() {
        let mut transport = rigol_transport(&[125; 600], &[125; 600]).respond(":CHAN1:SCAL?", "?\n");
        let err = Rigol.read_waveform(&mut transport, 1).unwrap_err();
        assert!(matches!(err, ScopeError::InvalidResponse { .. }));
    }

    #[test]
    fn test_grab_both_channels() {
        let mut ch1 = vec![125u8; 600];
        ch1[0] = 100;
        let mut scope = Scope::new(rigol_transport(&ch1, &[150; 600]), Rigol).unwrap();
        assert_eq!(scope.name(), "Rigol Technologies,DS1052E,DS1ET0000,00.04.01");

        scope.grab_data().unwrap();

        let ch1 = scope.scaled_waveform(1).unwrap();
        assert_eq!(ch1.len(), 600);
        assert!((ch1[0] - 2.0).abs() < 1e-9);
        assert!(ch1[1].abs() < 1e-9);

        let ch2 = scope.scaled_waveform(2).unwrap();
        assert_eq!(ch2.len(), 600);
        assert!(ch2.iter().all(|v| v.is_finite()));
        assert_eq!(scope.time_axis().len(), 600);
    }

    #[test]
    fn test_panel_controls() {
        let mut scope = Scope::new(rigol_transport(&[], &[]), Rigol).unwrap();
        scope.stop().unwrap();
        scope.run().unwrap();
        scope.force_trigger().unwrap();
        scope.unlock().unwrap();
        scope.enable_averaging(true).unwrap();
        scope.set_averages(16).unwrap();
        scope.enable_averaging(false).unwrap();

        assert_eq!(
            &scope.transport().writes()[1..],
            [
                ":STOP",
                ":RUN",
                ":KEY:FORC",
                ":KEY:LOCK DIS",
                ":ACQuire:TYPE AVERage",
                ":ACQuire:AVERages 16",
                ":ACQuire:TYPE NORMal",
            ]
        );
    }

    #[test]
    fn test_invalid_average_count_rejected() {
        let mut scope = Scope::new(rigol_transport(&[], &[]), Rigol).unwrap();
        assert!(matches!(
            scope.set_averages(10),
            Err(ScopeError::InvalidSetting(_))
        ));
        assert_eq!(scope.transport().writes().len(), 1);
    }

    #[test]
    fn test_close_returns_panel_to_local() {
        let scope = Scope::new(rigol_transport(&[], &[]), Rigol).unwrap();
        let transport = scope.close().unwrap();
        assert_eq!(transport.writes().last().map(String::as_str), Some(":KEY:FORC"));
    }
}
