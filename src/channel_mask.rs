use crate::scope::ScopeError;
use std::fmt;

/// Widest instrument a mask can describe.
pub const MAX_CHANNELS: usize = 8;

/// Which channels of a scope take part in the next acquisition.
///
/// Channels are numbered from 1, as on the instrument front panel. A mask
/// always knows how many channels its scope has, so a channel number outside
/// `1..=channel_count` is rejected instead of silently landing on an unused
/// bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMask {
    enabled: [bool; MAX_CHANNELS],
    channel_count: usize,
}

impl ChannelMask {
    /// Every channel enabled. `channel_count` is capped at [`MAX_CHANNELS`].
    pub fn all(channel_count: usize) -> Self {
        let channel_count = channel_count.min(MAX_CHANNELS);
        let mut enabled = [false; MAX_CHANNELS];
        enabled[..channel_count].fill(true);
        Self {
            enabled,
            channel_count,
        }
    }

    pub fn none(channel_count: usize) -> Self {
        Self {
            enabled: [false; MAX_CHANNELS],
            channel_count: channel_count.min(MAX_CHANNELS),
        }
    }

    /// Bit `i` of `bits` enables channel `i + 1`; bits beyond the channel
    /// count are ignored.
    pub fn from_bits(channel_count: usize, bits: u32) -> Self {
        let mut mask = Self::none(channel_count);
        for i in 0..mask.channel_count {
            mask.enabled[i] = bits & (1 << i) != 0;
        }
        mask
    }

    pub fn bits(&self) -> u32 {
        self.enabled[..self.channel_count]
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .fold(0, |bits, (i, _)| bits | (1 << i))
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn slot(&self, channel: usize) -> Result<usize, ScopeError> {
        if (1..=self.channel_count).contains(&channel) {
            Ok(channel - 1)
        } else {
            Err(ScopeError::InvalidChannel {
                channel,
                available: self.channel_count,
            })
        }
    }

    pub fn set(&mut self, channel: usize, on: bool) -> Result<(), ScopeError> {
        let slot = self.slot(channel)?;
        self.enabled[slot] = on;
        Ok(())
    }

    pub fn with(mut self, channel: usize) -> Result<Self, ScopeError> {
        self.set(channel, true)?;
        Ok(self)
    }

    pub fn without(mut self, channel: usize) -> Result<Self, ScopeError> {
        self.set(channel, false)?;
        Ok(self)
    }

    /// `false` for channel numbers the scope does not have.
    pub fn contains(&self, channel: usize) -> bool {
        self.slot(channel).is_ok_and(|slot| self.enabled[slot])
    }

    pub fn is_empty(&self) -> bool {
        self.channels().next().is_none()
    }

    /// Number of enabled channels.
    pub fn len(&self) -> usize {
        self.channels().count()
    }

    /// Enabled channel numbers in ascending order.
    pub fn channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.enabled[..self.channel_count]
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| i + 1)
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        for (n, channel) in self.channels().enumerate() {
            if n > 0 {
                write!(f, "|")?;
            }
            write!(f, "CH{channel}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_and_none() {
        let all = ChannelMask::all(4);
        assert_eq!(all.channels().collect::<Vec<_>>(), [1, 2, 3, 4]);
        assert_eq!(all.bits(), 0b1111);

        let none = ChannelMask::none(2);
        assert!(none.is_empty());
        assert_eq!(none.bits(), 0);
    }

    #[test]
    fn test_with_and_without() {
        let mask = ChannelMask::none(4).with(1).unwrap().with(3).unwrap();
        assert!(mask.contains(1));
        assert!(!mask.contains(2));
        assert!(mask.contains(3));
        assert_eq!(mask.len(), 2);

        let mask = mask.without(1).unwrap();
        assert_eq!(mask.channels().collect::<Vec<_>>(), [3]);
    }

    #[test]
    fn test_channel_one_and_two_both_selected() {
        let mask = ChannelMask::from_bits(2, 1 | 2);
        assert!(mask.contains(1));
        assert!(mask.contains(2));
    }

    #[test]
    fn test_out_of_range_channel_rejected() {
        let mut mask = ChannelMask::all(2);
        assert!(matches!(
            mask.set(0, true),
            Err(ScopeError::InvalidChannel {
                channel: 0,
                available: 2
            })
        ));
        assert!(matches!(
            mask.set(3, true),
            Err(ScopeError::InvalidChannel { channel: 3, .. })
        ));
        assert!(!mask.contains(0));
        assert!(!mask.contains(3));
    }

    #[test]
    fn test_from_bits_ignores_extra_bits() {
        let mask = ChannelMask::from_bits(2, 0b1110);
        assert_eq!(mask.channels().collect::<Vec<_>>(), [2]);
        assert_eq!(mask.bits(), 0b10);
    }

    #[test]
    fn test_channel_count_is_capped() {
        assert_eq!(ChannelMask::all(20).channel_count(), MAX_CHANNELS);
    }

    #[test]
    fn test_display() {
        assert_eq!(ChannelMask::from_bits(4, 0b0101).to_string(), "CH1|CH3");
        assert_eq!(ChannelMask::none(4).to_string(), "none");
    }
}
