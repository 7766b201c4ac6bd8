//! Per-stream working storage.
//!
//! Holds one frame de-interleaved by channel. At 32 kHz each channel also
//! carries its low/high sub-bands and the splitting filter states, which
//! persist across frames until the engine reinitializes.

use vqe_common_audio::splitting_filter::{self, FilterState};

use crate::audio_frame::AudioFrame;

#[derive(Debug, Clone, Default)]
struct SplitChannel {
    low: Vec<i16>,
    high: Vec<i16>,
    analysis_state1: FilterState,
    analysis_state2: FilterState,
    synthesis_state1: FilterState,
    synthesis_state2: FilterState,
}

impl SplitChannel {
    fn new(samples_per_split_channel: usize) -> Self {
        Self {
            low: vec![0; samples_per_split_channel],
            high: vec![0; samples_per_split_channel],
            ..Default::default()
        }
    }
}

/// De-interleaved frame storage for one stream direction.
#[derive(Debug)]
pub(crate) struct AudioBuffer {
    num_channels: usize,
    samples_per_channel: usize,
    samples_per_split_channel: usize,
    channels: Vec<Vec<i16>>,
    /// Empty unless the stream runs at 32 kHz.
    split: Vec<SplitChannel>,
    reference: Vec<Vec<i16>>,
    reference_copied: bool,
}

impl AudioBuffer {
    pub(crate) fn new(max_num_channels: usize, samples_per_channel: usize, is_split: bool) -> Self {
        let samples_per_split_channel = if is_split {
            samples_per_channel / 2
        } else {
            samples_per_channel
        };
        let split = if is_split {
            vec![SplitChannel::new(samples_per_split_channel); max_num_channels]
        } else {
            Vec::new()
        };
        Self {
            num_channels: max_num_channels,
            samples_per_channel,
            samples_per_split_channel,
            channels: vec![vec![0; samples_per_channel]; max_num_channels],
            split,
            reference: vec![vec![0; samples_per_split_channel]; max_num_channels],
            reference_copied: false,
        }
    }

    #[inline]
    pub(crate) fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[inline]
    pub(crate) fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    #[inline]
    pub(crate) fn samples_per_split_channel(&self) -> usize {
        self.samples_per_split_channel
    }

    #[inline]
    pub(crate) fn is_split(&self) -> bool {
        !self.split.is_empty()
    }

    pub(crate) fn data(&self, channel: usize) -> &[i16] {
        &self.channels[channel]
    }

    /// Low band at 32 kHz, the full-band channel otherwise.
    pub(crate) fn low_pass_split_data(&self, channel: usize) -> &[i16] {
        match self.split.get(channel) {
            Some(split) => &split.low,
            None => &self.channels[channel],
        }
    }

    pub(crate) fn low_pass_split_data_mut(&mut self, channel: usize) -> &mut [i16] {
        match self.split.get_mut(channel) {
            Some(split) => &mut split.low,
            None => &mut self.channels[channel],
        }
    }

    /// High band; `None` below 32 kHz.
    pub(crate) fn high_pass_split_data(&self, channel: usize) -> Option<&[i16]> {
        self.split.get(channel).map(|split| split.high.as_slice())
    }

    pub(crate) fn high_pass_split_data_mut(&mut self, channel: usize) -> Option<&mut [i16]> {
        self.split.get_mut(channel).map(|split| split.high.as_mut_slice())
    }

    /// Low-band snapshot taken during the current pass, if any.
    pub(crate) fn low_pass_reference(&self, channel: usize) -> Option<&[i16]> {
        self.reference_copied
            .then(|| self.reference[channel].as_slice())
    }

    /// Mutable low band together with the current-pass snapshot.
    pub(crate) fn low_pass_split_data_with_reference(
        &mut self,
        channel: usize,
    ) -> (&mut [i16], Option<&[i16]>) {
        let low = match self.split.get_mut(channel) {
            Some(split) => split.low.as_mut_slice(),
            None => self.channels[channel].as_mut_slice(),
        };
        let reference = self
            .reference_copied
            .then(|| self.reference[channel].as_slice());
        (low, reference)
    }

    /// Loads an interleaved frame and starts a new pass.
    pub(crate) fn deinterleave_from(&mut self, frame: &AudioFrame) {
        debug_assert!(frame.num_channels() <= self.channels.len());
        debug_assert_eq!(frame.samples_per_channel(), self.samples_per_channel);
        self.num_channels = frame.num_channels();
        self.reference_copied = false;

        let stride = self.num_channels;
        for (ch, channel) in self.channels[..stride].iter_mut().enumerate() {
            for (dst, &src) in channel
                .iter_mut()
                .zip(frame.data().iter().skip(ch).step_by(stride))
            {
                *dst = src;
            }
        }
    }

    /// Writes the current channels back, rewriting the frame's channel count.
    pub(crate) fn interleave_to(&self, frame: &mut AudioFrame) {
        debug_assert_eq!(frame.samples_per_channel(), self.samples_per_channel);
        if frame.num_channels() != self.num_channels {
            frame.set_num_channels(self.num_channels);
        }
        let stride = self.num_channels;
        let data = frame.data_mut();
        for (ch, channel) in self.channels[..stride].iter().enumerate() {
            for (dst, &src) in data.iter_mut().skip(ch).step_by(stride).zip(channel) {
                *dst = src;
            }
        }
    }

    /// Averages all channels down to `num_mixed_channels`.
    ///
    /// Only reduction to mono is supported. Each output sample is the mean
    /// of the inputs rounded toward negative infinity. A no-op when the
    /// buffer already has no more than `num_mixed_channels` channels.
    pub(crate) fn mix(&mut self, num_mixed_channels: usize) {
        if num_mixed_channels >= self.num_channels {
            return;
        }
        debug_assert_eq!(num_mixed_channels, 1);

        let n = self.num_channels as i32;
        let (first, rest) = self.channels.split_at_mut(1);
        let rest = &rest[..self.num_channels - 1];
        for (i, out) in first[0].iter_mut().enumerate() {
            let sum = rest
                .iter()
                .fold(i32::from(*out), |acc, channel| acc + i32::from(channel[i]));
            *out = sum.div_euclid(n) as i16;
        }
        self.num_channels = num_mixed_channels;
    }

    /// Snapshots the current low band of every channel.
    pub(crate) fn copy_low_pass_to_reference(&mut self) {
        self.reference_copied = true;
        for ch in 0..self.num_channels {
            let low = match self.split.get(ch) {
                Some(split) => &split.low,
                None => &self.channels[ch],
            };
            self.reference[ch].copy_from_slice(low);
        }
    }

    /// Splits one full-band channel into its sub-bands. No-op below 32 kHz.
    pub(crate) fn split_channel(&mut self, channel: usize) {
        let Some(split) = self.split.get_mut(channel) else {
            return;
        };
        splitting_filter::analysis(
            &self.channels[channel],
            &mut split.low,
            &mut split.high,
            &mut split.analysis_state1,
            &mut split.analysis_state2,
        );
    }

    /// Recombines one channel's sub-bands. No-op below 32 kHz.
    pub(crate) fn merge_channel(&mut self, channel: usize) {
        let Some(split) = self.split.get_mut(channel) else {
            return;
        };
        splitting_filter::synthesis(
            &split.low,
            &split.high,
            &mut self.channels[channel],
            &mut split.synthesis_state1,
            &mut split.synthesis_state2,
        );
    }
}
