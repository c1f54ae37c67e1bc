//! LeCroy Waverunner scopes on a GPIB bus.
//!
//! `C<n>:WAVEFORM? ALL` returns a short ASCII prefix, the binary `WAVEDESC`
//! descriptor, the sample block and a terminating newline. The descriptor is
//! read at the fixed offsets of template `LECROY_2_3`; a reply built from any
//! other template is rejected rather than misread.

use crate::gpib_bridge::{GpibBridge, GpibBridgeBuilder};
use crate::scope::{Scope, ScopeError};
use crate::transport::Transport;
use crate::waveform::{DecodedWaveform, Timebase, WaveformDecoder, WaveformError};

/// Byte offsets into the `WAVEDESC` block, template `LECROY_2_3`.
///
/// All numbers are big-endian.
///
/// | offset | width | type | field |
/// |---|---|---|---|
/// | 0   | 16 | ASCII | descriptor name, `WAVEDESC` |
/// | 16  | 16 | ASCII | template name |
/// | 32  | 2  | i16   | sample width, 0 = byte, 1 = word |
/// | 34  | 2  | i16   | byte order, 0 = big-endian |
/// | 36  | 4  | i32   | descriptor length |
/// | 60  | 4  | i32   | sample block length in bytes |
/// | 76  | 16 | ASCII | trace name |
/// | 116 | 4  | i32   | point count, including two trailer values |
/// | 156 | 4  | f32   | vertical gain, volts per count |
/// | 160 | 4  | f32   | vertical offset, volts |
/// | 176 | 4  | f32   | sample interval, seconds |
/// | 180 | 8  | f64   | horizontal offset, seconds |
pub mod wavedesc {
    pub const TEMPLATE: &str = "LECROY_2_3";
    pub const STRING_LEN: usize = 16;

    pub const TEMPLATE_NAME: usize = 16;
    pub const COMM_TYPE: usize = 32;
    pub const COMM_ORDER: usize = 34;
    pub const WAVE_DESCRIPTOR: usize = 36;
    pub const WAVE_ARRAY_1: usize = 60;
    pub const TRACE_NAME: usize = 76;
    pub const WAVE_ARRAY_COUNT: usize = 116;
    pub const VERTICAL_GAIN: usize = 156;
    pub const VERTICAL_OFFSET: usize = 160;
    pub const HORIZ_INTERVAL: usize = 176;
    pub const HORIZ_OFFSET: usize = 180;

    /// Bytes needed to read every field above.
    pub const HEADER_LEN: usize = HORIZ_OFFSET + 8;

    pub const COMM_TYPE_WORD: i16 = 1;
    pub const COMM_ORDER_HIFIRST: i16 = 0;
    /// Values at the end of the point count that are not samples.
    pub const TRAILER_POINTS: usize = 2;
}

/// Bytes of ASCII prefix (`C1:WF ALL,#9nnnnnnnnn`) in front of the descriptor.
pub const REPLY_PREFIX_LEN: usize = 21;
/// Trailing newline after the sample block.
pub const REPLY_SUFFIX_LEN: usize = 1;
/// Read budget on top of two bytes per sample.
pub const RESPONSE_HEADROOM: usize = 4096;

/// Acquisition depths accepted by `MEMORY_SIZE`.
pub const MEMORY_SIZES: [usize; 10] = [
    500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000,
];

fn field<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], WaveformError> {
    buf.get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(WaveformError::TooShort {
            needed: offset + N,
            actual: buf.len(),
        })
}

fn read_i16(buf: &[u8], offset: usize) -> Result<i16, WaveformError> {
    field(buf, offset).map(i16::from_be_bytes)
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32, WaveformError> {
    field(buf, offset).map(i32::from_be_bytes)
}

fn read_f32(buf: &[u8], offset: usize) -> Result<f32, WaveformError> {
    field(buf, offset).map(f32::from_be_bytes)
}

fn read_f64(buf: &[u8], offset: usize) -> Result<f64, WaveformError> {
    field(buf, offset).map(f64::from_be_bytes)
}

fn read_string(buf: &[u8], offset: usize) -> Result<String, WaveformError> {
    let raw: [u8; wavedesc::STRING_LEN] = field(buf, offset)?;
    Ok(String::from_utf8_lossy(&raw)
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string())
}

fn read_length(buf: &[u8], offset: usize, name: &'static str) -> Result<usize, WaveformError> {
    let value = read_i32(buf, offset)?;
    usize::try_from(value).map_err(|_| WaveformError::InvalidLength {
        field: name,
        value: i64::from(value),
    })
}

/// The fixed part of a `WAVEDESC` block.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveDescriptor {
    pub template: String,
    pub descriptor_len: usize,
    pub data_block_len: usize,
    pub trace_name: String,
    /// Point count as reported, trailer values included.
    pub point_count: usize,
    pub vertical_gain: f32,
    pub vertical_offset: f32,
    pub horizontal_interval: f32,
    pub horizontal_offset: f64,
}

impl WaveDescriptor {
    pub fn parse(buf: &[u8]) -> Result<Self, WaveformError> {
        if buf.len() < wavedesc::HEADER_LEN {
            return Err(WaveformError::TooShort {
                needed: wavedesc::HEADER_LEN,
                actual: buf.len(),
            });
        }

        let template = read_string(buf, wavedesc::TEMPLATE_NAME)?;
        if !template.starts_with(wavedesc::TEMPLATE) {
            return Err(WaveformError::UnsupportedTemplate(template));
        }

        let comm_type = read_i16(buf, wavedesc::COMM_TYPE)?;
        if comm_type != wavedesc::COMM_TYPE_WORD {
            return Err(WaveformError::UnsupportedSampleWidth(comm_type));
        }
        let comm_order = read_i16(buf, wavedesc::COMM_ORDER)?;
        if comm_order != wavedesc::COMM_ORDER_HIFIRST {
            return Err(WaveformError::UnsupportedByteOrder(comm_order));
        }

        let descriptor_len = read_length(buf, wavedesc::WAVE_DESCRIPTOR, "WAVE_DESCRIPTOR")?;
        if descriptor_len < wavedesc::HEADER_LEN {
            return Err(WaveformError::InvalidLength {
                field: "WAVE_DESCRIPTOR",
                value: descriptor_len as i64,
            });
        }

        Ok(Self {
            template,
            descriptor_len,
            data_block_len: read_length(buf, wavedesc::WAVE_ARRAY_1, "WAVE_ARRAY_1")?,
            trace_name: read_string(buf, wavedesc::TRACE_NAME)?,
            point_count: read_length(buf, wavedesc::WAVE_ARRAY_COUNT, "WAVE_ARRAY_COUNT")?,
            vertical_gain: read_f32(buf, wavedesc::VERTICAL_GAIN)?,
            vertical_offset: read_f32(buf, wavedesc::VERTICAL_OFFSET)?,
            horizontal_interval: read_f32(buf, wavedesc::HORIZ_INTERVAL)?,
            horizontal_offset: read_f64(buf, wavedesc::HORIZ_OFFSET)?,
        })
    }

    /// Samples in the trace, trailer values excluded.
    pub fn sample_count(&self) -> usize {
        self.point_count.saturating_sub(wavedesc::TRAILER_POINTS)
    }
}

/// Cut the ASCII prefix and the trailing newline off a `WAVEFORM?` reply.
pub fn strip_reply(reply: &[u8]) -> Result<&[u8], WaveformError> {
    let needed = REPLY_PREFIX_LEN + REPLY_SUFFIX_LEN;
    if reply.len() < needed {
        return Err(WaveformError::TooShort {
            needed,
            actual: reply.len(),
        });
    }
    Ok(&reply[REPLY_PREFIX_LEN..reply.len() - REPLY_SUFFIX_LEN])
}

/// Decode a stripped descriptor and sample block.
pub fn decode(buf: &[u8]) -> Result<(WaveDescriptor, DecodedWaveform), WaveformError> {
    let descriptor = WaveDescriptor::parse(buf)?;
    let count = descriptor.sample_count();
    if count == 0 {
        return Err(WaveformError::NoSamples);
    }

    let block_len = count * 2;
    if descriptor.data_block_len < block_len {
        return Err(WaveformError::InvalidLength {
            field: "WAVE_ARRAY_1",
            value: descriptor.data_block_len as i64,
        });
    }

    let end = descriptor.descriptor_len + block_len;
    let block = buf
        .get(descriptor.descriptor_len..end)
        .ok_or(WaveformError::TooShort {
            needed: end,
            actual: buf.len(),
        })?;

    let samples = block
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    let decoded = DecodedWaveform {
        samples,
        vertical_gain: f64::from(descriptor.vertical_gain),
        vertical_offset: f64::from(descriptor.vertical_offset),
        timebase: Timebase {
            sample_interval: f64::from(descriptor.horizontal_interval),
            time_origin: descriptor.horizontal_offset,
            sample_count: count,
        },
    };
    Ok((descriptor, decoded))
}

/// Resolve a sample count with an optional SI suffix, as in `10K`, `1MA`
/// or `10.0E+3`.
fn parse_sample_count(token: &str) -> Option<usize> {
    let token = token.trim().to_ascii_uppercase();
    let (number, multiplier) = if let Some(n) = token.strip_suffix("MA") {
        (n, 1e6)
    } else if let Some(n) = token.strip_suffix('K') {
        (n, 1e3)
    } else if let Some(n) = token.strip_suffix('M') {
        (n, 1e6)
    } else {
        (token.as_str(), 1.0)
    };

    let value = number.parse::<f64>().ok()? * multiplier;
    (value.is_finite() && value >= 0.0).then(|| value.round() as usize)
}

fn check_memory_size(samples: usize) -> Result<(), ScopeError> {
    if MEMORY_SIZES.contains(&samples) {
        Ok(())
    } else {
        Err(ScopeError::InvalidSetting(format!(
            "memory size {samples}, expected one of {MEMORY_SIZES:?}"
        )))
    }
}

/// Four-channel Waverunner decoder.
#[derive(Debug, Clone, Copy)]
pub struct Waverunner {
    memory_size: usize,
}

impl Default for Waverunner {
    fn default() -> Self {
        Self {
            memory_size: Self::DEFAULT_MEMORY_SIZE,
        }
    }
}

impl Waverunner {
    pub const CHANNELS: usize = 4;
    pub const DEFAULT_MEMORY_SIZE: usize = 5_000;

    pub fn new(memory_size: usize) -> Result<Self, ScopeError> {
        check_memory_size(memory_size)?;
        Ok(Self { memory_size })
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// Most bytes a `WAVEFORM? ALL` reply can take at the configured depth.
    pub fn read_budget(&self) -> usize {
        self.memory_size * 2 + RESPONSE_HEADROOM
    }
}

impl WaveformDecoder for Waverunner {
    fn channel_count(&self) -> usize {
        Self::CHANNELS
    }

    fn read_waveform<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        channel: usize,
    ) -> Result<DecodedWaveform, ScopeError> {
        let reply = transport.query(&format!("C{channel}:WAVEFORM? ALL"), self.read_budget())?;
        let (descriptor, decoded) = decode(strip_reply(&reply)?)?;
        log::debug!(
            "C{}: trace '{}', {} samples, descriptor {} bytes",
            channel,
            descriptor.trace_name,
            decoded.timebase.sample_count,
            descriptor.descriptor_len
        );
        Ok(decoded)
    }
}

pub type WaverunnerScope<T = GpibBridge> = Scope<T, Waverunner>;

impl Scope<GpibBridge, Waverunner> {
    /// Connect through a GPIB bridge and set the acquisition depth.
    pub fn connect(bridge: GpibBridgeBuilder, memory_size: usize) -> Result<Self, ScopeError> {
        let decoder = Waverunner::new(memory_size)?;
        let mut scope = Self::new(bridge.open()?, decoder)?;
        // The first capture after this may still use the previous depth.
        scope.set_memory_size(memory_size)?;
        Ok(scope)
    }
}

impl<T: Transport> Scope<T, Waverunner> {
    pub fn set_memory_size(&mut self, samples: usize) -> Result<(), ScopeError> {
        check_memory_size(samples)?;
        self.write(&format!("MEMORY_SIZE {samples}"))?;
        self.decoder_mut().memory_size = samples;
        Ok(())
    }

    /// Acquisition depth reported by the instrument.
    pub fn memory_size(&mut self) -> Result<usize, ScopeError> {
        const COMMAND: &str = "MEMORY_SIZE?";
        let reply = self.query(COMMAND, 256)?;
        let text = String::from_utf8_lossy(&reply);
        let mut tokens = text.split_whitespace();
        let token = match (tokens.next(), tokens.next()) {
            (Some(_), Some(value)) | (Some(value), None) => value,
            _ => "",
        };
        parse_sample_count(token).ok_or_else(|| ScopeError::InvalidResponse {
            command: COMMAND.to_string(),
            response: text.trim().to_string(),
        })
    }
}
