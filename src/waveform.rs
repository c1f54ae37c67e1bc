use crate::scope::ScopeError;
use crate::transport::Transport;

/// A reply that cannot be a waveform of the expected format.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WaveformError {
    #[error("Waveform buffer too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("Waveform header field {field} holds an impossible length ({value})")]
    InvalidLength { field: &'static str, value: i64 },

    #[error("Unsupported waveform descriptor template '{0}'")]
    UnsupportedTemplate(String),

    #[error("Unsupported sample width code {0} (expected 16-bit words)")]
    UnsupportedSampleWidth(i16),

    #[error("Unsupported byte order code {0} (expected big-endian)")]
    UnsupportedByteOrder(i16),

    #[error("Waveform contains no samples")]
    NoSamples,
}

/// Horizontal scale of one trace: sample `i` was taken at
/// `time_origin + i * sample_interval` seconds relative to the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timebase {
    pub sample_interval: f64,
    pub time_origin: f64,
    pub sample_count: usize,
}

impl Timebase {
    pub fn time_axis(&self) -> Vec<f64> {
        (0..self.sample_count)
            .map(|i| (i as f64).mul_add(self.sample_interval, self.time_origin))
            .collect()
    }
}

/// Everything one channel grab produces.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedWaveform {
    pub samples: Vec<i16>,
    /// Volts per raw count.
    pub vertical_gain: f64,
    /// Volts subtracted after applying the gain.
    pub vertical_offset: f64,
    pub timebase: Timebase,
}

impl DecodedWaveform {
    pub fn scaled(&self) -> Vec<f64> {
        scale(&self.samples, self.vertical_gain, self.vertical_offset)
    }
}

pub(crate) fn scale(samples: &[i16], gain: f64, offset: f64) -> Vec<f64> {
    samples
        .iter()
        .map(|&raw| f64::from(raw).mul_add(gain, -offset))
        .collect()
}

/// Per-instrument strategy for pulling one channel's trace over a transport.
///
/// Decoders hold configuration only; every grab is a fresh exchange with
/// the instrument.
pub trait WaveformDecoder {
    /// Number of input channels on the instrument.
    fn channel_count(&self) -> usize;

    /// Fetch and decode the trace of `channel` (1-based).
    fn read_waveform<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        channel: usize,
    ) -> Result<DecodedWaveform, ScopeError>;

    /// Hand the instrument back before the connection is dropped.
    fn release<T: Transport + ?Sized>(&self, _transport: &mut T) -> Result<(), ScopeError> {
        Ok(())
    }
}

/// Parse a numeric SCPI reply such as `2.000e+00\n`.
pub(crate) fn parse_number(command: &str, reply: &[u8]) -> Result<f64, ScopeError> {
    let text = String::from_utf8_lossy(reply);
    text.trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .parse::<f64>()
        .map_err(|_| ScopeError::InvalidResponse {
            command: command.to_string(),
            response: text.trim().to_string(),
        })
}
