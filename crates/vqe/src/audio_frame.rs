//! Interleaved 10 ms PCM frames exchanged with the engine.

use crate::Error;

/// One 10 ms block of interleaved 16-bit PCM.
///
/// The payload always holds exactly `num_channels * samples_per_channel`
/// samples. The engine checks rate, channel count and length against its
/// configuration before touching a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    sample_rate_hz: u32,
    num_channels: usize,
    samples_per_channel: usize,
    data: Vec<i16>,
}

impl AudioFrame {
    /// Creates a zero-filled frame.
    pub fn new(sample_rate_hz: u32, num_channels: usize, samples_per_channel: usize) -> Self {
        Self {
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            data: vec![0; num_channels * samples_per_channel],
        }
    }

    /// Wraps an interleaved payload.
    ///
    /// Returns [`Error::BadNumberChannels`] for zero channels and
    /// [`Error::BadDataLength`] when the payload does not divide evenly.
    pub fn from_interleaved(
        sample_rate_hz: u32,
        num_channels: usize,
        data: Vec<i16>,
    ) -> Result<Self, Error> {
        if num_channels == 0 {
            return Err(Error::BadNumberChannels);
        }
        if data.len() % num_channels != 0 {
            return Err(Error::BadDataLength);
        }
        Ok(Self {
            sample_rate_hz,
            num_channels,
            samples_per_channel: data.len() / num_channels,
            data,
        })
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Number of interleaved channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Samples per channel.
    #[inline]
    pub fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    /// Interleaved payload.
    #[inline]
    pub fn data(&self) -> &[i16] {
        &self.data
    }

    /// Mutable interleaved payload.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [i16] {
        &mut self.data
    }

    /// Consumes the frame, returning the payload.
    pub fn into_data(self) -> Vec<i16> {
        self.data
    }

    /// Samples of one channel, de-interleaved.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = i16> + '_ {
        self.data
            .iter()
            .skip(channel)
            .step_by(self.num_channels.max(1))
            .copied()
    }

    /// Rewrites the channel count after a downmix, resizing the payload.
    pub(crate) fn set_num_channels(&mut self, num_channels: usize) {
        self.num_channels = num_channels;
        self.data.resize(num_channels * self.samples_per_channel, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_frame_is_silent() {
        let frame = AudioFrame::new(32_000, 2, 320);
        assert_eq!(frame.data().len(), 640);
        assert!(frame.data().iter().all(|&s| s == 0));
    }

    #[test]
    fn from_interleaved_derives_length() {
        let frame = AudioFrame::from_interleaved(8_000, 2, vec![1, -1, 2, -2]).unwrap();
        assert_eq!(frame.samples_per_channel(), 2);
        assert_eq!(frame.channel(0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(frame.channel(1).collect::<Vec<_>>(), vec![-1, -2]);
    }

    #[test]
    fn from_interleaved_rejects_ragged_payload() {
        assert_eq!(
            AudioFrame::from_interleaved(8_000, 2, vec![1, 2, 3]),
            Err(Error::BadDataLength)
        );
        assert_eq!(
            AudioFrame::from_interleaved(8_000, 0, vec![]),
            Err(Error::BadNumberChannels)
        );
    }

    #[test]
    fn downmix_shrinks_payload() {
        let mut frame = AudioFrame::new(16_000, 2, 160);
        frame.set_num_channels(1);
        assert_eq!(frame.num_channels(), 1);
        assert_eq!(frame.data().len(), 160);
    }
}
