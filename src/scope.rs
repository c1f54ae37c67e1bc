use crate::channel_mask::{ChannelMask, MAX_CHANNELS};
use crate::listener::{ListenerId, ListenerRegistry};
use crate::transport::{Transport, TransportError};
use crate::waveform::{scale, DecodedWaveform, Timebase, WaveformDecoder, WaveformError};
use chrono::{DateTime, Local};

const IDENTITY_REPLY_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed waveform: {0}")]
    MalformedWaveform(#[from] WaveformError),

    #[error("Invalid channel {channel} (scope has channels 1 to {available})")]
    InvalidChannel { channel: usize, available: usize },

    #[error("Unexpected reply to '{command}': '{response}'")]
    InvalidResponse { command: String, response: String },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

/// One input channel and the trace it produced in its most recent grab.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeChannel {
    index: usize,
    raw_samples: Vec<i16>,
    vertical_gain: f64,
    vertical_offset: f64,
}

impl ScopeChannel {
    fn new(index: usize) -> Self {
        Self {
            index,
            raw_samples: Vec::new(),
            vertical_gain: 0.0,
            vertical_offset: 0.0,
        }
    }

    fn store(&mut self, decoded: DecodedWaveform) {
        self.raw_samples = decoded.samples;
        self.vertical_gain = decoded.vertical_gain;
        self.vertical_offset = decoded.vertical_offset;
    }

    /// 1-based channel number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Samples as the instrument sent them. Empty until the channel has been
    /// grabbed.
    pub fn raw_samples(&self) -> &[i16] {
        &self.raw_samples
    }

    pub fn vertical_gain(&self) -> f64 {
        self.vertical_gain
    }

    pub fn vertical_offset(&self) -> f64 {
        self.vertical_offset
    }

    /// Samples in volts: `raw * vertical_gain - vertical_offset`.
    pub fn scaled_waveform(&self) -> Vec<f64> {
        scale(&self.raw_samples, self.vertical_gain, self.vertical_offset)
    }
}

/// A connected oscilloscope.
///
/// `T` moves bytes to and from the instrument, `D` knows how that
/// instrument encodes its traces. Vendor-specific controls live in
/// `impl Scope<T, Rigol>` and `impl Scope<T, Waverunner>` blocks.
///
/// An acquisition either updates every channel it touched together with the
/// shared timebase, or fails and leaves the scope exactly as it was.
#[derive(Debug)]
pub struct Scope<T, D> {
    transport: T,
    decoder: D,
    name: String,
    channels: Vec<ScopeChannel>,
    active: ChannelMask,
    last_grabbed: ChannelMask,
    timebase: Timebase,
    time_axis: Vec<f64>,
    acquired_at: Option<DateTime<Local>>,
    listeners: ListenerRegistry<Scope<T, D>>,
}

impl<T: Transport, D: WaveformDecoder> Scope<T, D> {
    /// Wrap an open transport. The instrument is asked for its identity
    /// once, which also verifies that it answers.
    pub fn new(mut transport: T, decoder: D) -> Result<Self, ScopeError> {
        let channel_count = decoder.channel_count();
        if channel_count == 0 || channel_count > MAX_CHANNELS {
            return Err(ScopeError::InvalidSetting(format!(
                "{channel_count} channels, expected 1 to {MAX_CHANNELS}"
            )));
        }

        let name = identify_on(&mut transport)?;
        log::info!("Connected to {} ({} channels)", name, channel_count);

        Ok(Self {
            transport,
            decoder,
            name,
            channels: (1..=channel_count).map(ScopeChannel::new).collect(),
            active: ChannelMask::all(channel_count),
            last_grabbed: ChannelMask::none(channel_count),
            timebase: Timebase::default(),
            time_axis: Vec::new(),
            acquired_at: None,
            listeners: ListenerRegistry::new(),
        })
    }

    /// Hand the instrument back to local control and return the transport.
    pub fn close(mut self) -> Result<T, ScopeError> {
        log::debug!("Closing {}", self.name);
        self.decoder.release(&mut self.transport)?;
        Ok(self.transport)
    }

    pub fn write(&mut self, command: &str) -> Result<(), ScopeError> {
        log::trace!("-> {}", command);
        Ok(self.transport.write(command)?)
    }

    pub fn read(&mut self, max_len: usize) -> Result<Vec<u8>, ScopeError> {
        Ok(self.transport.read(max_len)?)
    }

    pub fn query(&mut self, command: &str, max_len: usize) -> Result<Vec<u8>, ScopeError> {
        log::trace!("-> {}", command);
        Ok(self.transport.query(command, max_len)?)
    }

    /// Ask the instrument for its `*IDN?` string.
    pub fn identify(&mut self) -> Result<String, ScopeError> {
        identify_on(&mut self.transport)
    }

    pub fn reset(&mut self) -> Result<(), ScopeError> {
        self.write("*RST")
    }

    pub(crate) fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    pub fn set_active_channels(&mut self, mask: ChannelMask) -> Result<(), ScopeError> {
        if mask.channel_count() != self.channel_count() {
            return Err(ScopeError::InvalidSetting(format!(
                "channel mask for {} channels on a {}-channel scope",
                mask.channel_count(),
                self.channel_count()
            )));
        }
        log::debug!("Active channels: {}", mask);
        self.active = mask;
        Ok(())
    }

    /// Read every active channel, then notify listeners.
    ///
    /// Does nothing when no channel is active. If any channel fails, the
    /// error is returned and no channel, timebase or listener sees the
    /// partial result.
    #[tracing::instrument(level = "debug", skip(self), fields(active = %self.active))]
    pub fn grab_data(&mut self) -> Result<(), ScopeError> {
        let mask = self.active;
        if mask.is_empty() {
            log::debug!("No active channels, skipping acquisition");
            return Ok(());
        }

        let mut staged = Vec::with_capacity(mask.len());
        for channel in mask.channels() {
            let decoded = self.decoder.read_waveform(&mut self.transport, channel)?;
            staged.push((channel, decoded));
        }

        self.commit(staged, mask);
        self.acquired_at = Some(Local::now());
        self.notify_listeners();
        Ok(())
    }

    /// Read a single channel regardless of the active mask. Neither the
    /// listeners nor [`acquired_at`](Self::acquired_at) see this read.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn grab_channel_data(&mut self, channel: usize) -> Result<(), ScopeError> {
        let mask = ChannelMask::none(self.channel_count()).with(channel)?;
        let decoded = self.decoder.read_waveform(&mut self.transport, channel)?;
        self.commit(vec![(channel, decoded)], mask);
        Ok(())
    }

    fn commit(&mut self, staged: Vec<(usize, DecodedWaveform)>, grabbed: ChannelMask) {
        let mut shared: Option<Timebase> = None;
        for (channel, decoded) in staged {
            if let Some(previous) = shared {
                if previous != decoded.timebase {
                    log::warn!(
                        "CH{} timebase {:?} differs from {:?}, keeping the later one",
                        channel,
                        decoded.timebase,
                        previous
                    );
                }
            }
            shared = Some(decoded.timebase);
            self.channels[channel - 1].store(decoded);
        }

        if let Some(timebase) = shared {
            self.timebase = timebase;
            self.time_axis = timebase.time_axis();
        }
        self.last_grabbed = grabbed;
        log::debug!(
            "Acquired {} ({} samples, {:e} s/sample)",
            grabbed,
            self.timebase.sample_count,
            self.timebase.sample_interval
        );
    }

    fn notify_listeners(&mut self) {
        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.notify(self);
        self.listeners = listeners;
    }

    /// Run `listener` after every successful [`grab_data`](Self::grab_data).
    pub fn add_listener(&mut self, listener: impl FnMut(&Self) + Send + 'static) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Returns `false` if `id` was already removed.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl<T, D> Scope<T, D> {
    /// Identity reported when the scope was opened.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Channels read by the next [`grab_data`](Self::grab_data).
    pub fn active_channels(&self) -> ChannelMask {
        self.active
    }

    /// Channels updated by the most recent successful acquisition.
    pub fn last_grabbed(&self) -> ChannelMask {
        self.last_grabbed
    }

    pub fn channel(&self, channel: usize) -> Result<&ScopeChannel, ScopeError> {
        channel
            .checked_sub(1)
            .and_then(|slot| self.channels.get(slot))
            .ok_or(ScopeError::InvalidChannel {
                channel,
                available: self.channels.len(),
            })
    }

    pub fn scaled_waveform(&self, channel: usize) -> Result<Vec<f64>, ScopeError> {
        Ok(self.channel(channel)?.scaled_waveform())
    }

    pub fn raw_waveform(&self, channel: usize) -> Result<&[i16], ScopeError> {
        Ok(self.channel(channel)?.raw_samples())
    }

    pub fn vertical_gain(&self, channel: usize) -> Result<f64, ScopeError> {
        Ok(self.channel(channel)?.vertical_gain())
    }

    pub fn vertical_offset(&self, channel: usize) -> Result<f64, ScopeError> {
        Ok(self.channel(channel)?.vertical_offset())
    }

    /// Channels of the last acquisition in ascending order.
    pub(crate) fn grabbed_channels(&self) -> impl Iterator<Item = &ScopeChannel> + '_ {
        let mask = self.last_grabbed;
        self.channels
            .iter()
            .filter(move |channel| mask.contains(channel.index))
    }

    /// Sample times in seconds relative to the trigger. Empty before the
    /// first acquisition.
    pub fn time_axis(&self) -> &[f64] {
        &self.time_axis
    }

    pub fn timebase(&self) -> Timebase {
        self.timebase
    }

    pub fn sample_count(&self) -> usize {
        self.timebase.sample_count
    }

    pub fn sample_interval(&self) -> f64 {
        self.timebase.sample_interval
    }

    pub fn time_origin(&self) -> f64 {
        self.timebase.time_origin
    }

    /// Wall-clock time of the last successful [`grab_data`](Self::grab_data).
    pub fn acquired_at(&self) -> Option<DateTime<Local>> {
        self.acquired_at
    }
}

fn identify_on<T: Transport + ?Sized>(transport: &mut T) -> Result<String, ScopeError> {
    let reply = transport.query("*IDN?", IDENTITY_REPLY_LEN)?;
    Ok(String::from_utf8_lossy(&reply)
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string())
}
