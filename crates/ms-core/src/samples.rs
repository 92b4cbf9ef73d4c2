use crate::error::{Result, SpectError};

/// Fully materialized input signal.
///
/// Either a 1-D mono buffer, or a 2-D `channels × samples` buffer stored
/// row-major (one contiguous row per channel). A 2-D buffer keeps its channel
/// axis even with a single channel.
///
/// # Example
/// ```
/// use ms_core::samples::SampleBuffer;
/// let stereo = SampleBuffer::from_shape(&[2, 3], vec![1.0, 2.0, 3.0, -1.0, -2.0, -3.0]).unwrap();
/// assert_eq!(stereo.num_channels(), 2);
/// assert_eq!(stereo.channel(1), &[-1.0, -2.0, -3.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    data: Vec<f32>,
    channels: usize,
    len: usize,
    has_channel_axis: bool,
}

impl SampleBuffer {
    /// 1-D mono buffer.
    #[must_use]
    pub fn mono(samples: Vec<f32>) -> Self {
        let len = samples.len();
        Self {
            data: samples,
            channels: 1,
            len,
            has_channel_axis: false,
        }
    }

    /// Build from an explicit shape: `[samples]` or `[channels, samples]`.
    ///
    /// # Errors
    /// `UnsupportedRank` for any other rank, `ShapeMismatch` if the data
    /// length disagrees with the shape.
    pub fn from_shape(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let (channels, len, has_channel_axis) = match *shape {
            [len] => (1, len, false),
            [channels, len] => (channels, len, true),
            _ => return Err(SpectError::UnsupportedRank(shape.len())),
        };
        if channels * len != data.len() {
            return Err(SpectError::ShapeMismatch {
                expected: channels * len,
                actual: data.len(),
            });
        }
        if channels == 0 {
            return Err(SpectError::UnsupportedChannelCount(0));
        }
        Ok(Self {
            data,
            channels,
            len,
            has_channel_axis,
        })
    }

    /// Build a 2-D buffer from one vector per channel.
    ///
    /// # Errors
    /// `ShapeMismatch` if channels differ in length, `UnsupportedChannelCount`
    /// if no channel is given.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Result<Self> {
        let Some(len) = channels.first().map(Vec::len) else {
            return Err(SpectError::UnsupportedChannelCount(0));
        };
        if let Some(bad) = channels.iter().find(|c| c.len() != len) {
            return Err(SpectError::ShapeMismatch {
                expected: len,
                actual: bad.len(),
            });
        }
        let count = channels.len();
        Ok(Self {
            data: channels.concat(),
            channels: count,
            len,
            has_channel_axis: true,
        })
    }

    /// De-interleave `[l0, r0, l1, r1, ...]` into a 2-D buffer.
    ///
    /// A trailing incomplete sample frame is dropped.
    ///
    /// # Errors
    /// `UnsupportedChannelCount` if `channels` is zero.
    ///
    /// # Example
    /// ```
    /// use ms_core::samples::SampleBuffer;
    /// let buf = SampleBuffer::from_interleaved(&[0.0, 1.0, 0.5, 1.5], 2).unwrap();
    /// assert_eq!(buf.channel(0), &[0.0, 0.5]);
    /// assert_eq!(buf.channel(1), &[1.0, 1.5]);
    /// ```
    pub fn from_interleaved(interleaved: &[f32], channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(SpectError::UnsupportedChannelCount(0));
        }
        let len = interleaved.len() / channels;
        let mut data = vec![0.0; channels * len];
        for (i, frame) in interleaved.chunks_exact(channels).enumerate() {
            for (c, &s) in frame.iter().enumerate() {
                data[c * len + i] = s;
            }
        }
        Ok(Self {
            data,
            channels,
            len,
            has_channel_axis: true,
        })
    }

    /// Number of axes: 1 for mono buffers, 2 when a channel axis is present.
    #[must_use]
    pub fn ndim(&self) -> usize {
        if self.has_channel_axis { 2 } else { 1 }
    }

    /// `true` when the buffer carries a channel axis.
    #[must_use]
    pub fn has_channel_axis(&self) -> bool {
        self.has_channel_axis
    }

    /// Number of channels (1 for mono buffers).
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel.
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.len
    }

    /// Samples of one channel.
    ///
    /// # Panics
    /// Panics if `index >= num_channels()`.
    #[must_use]
    pub fn channel(&self, index: usize) -> &[f32] {
        assert!(index < self.channels, "channel index out of range");
        &self.data[index * self.len..(index + 1) * self.len]
    }

    /// Iterate over channel rows.
    pub fn channel_rows(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.channels).map(move |c| self.channel(c))
    }

    /// Drop the channel axis, keeping the samples of channel 0.
    #[must_use]
    pub fn into_mono(mut self) -> Self {
        self.data.truncate(self.len);
        Self::mono(self.data)
    }

    /// Give a mono buffer an explicit channel axis of length 1.
    ///
    /// Buffers that already have a channel axis are returned unchanged.
    #[must_use]
    pub fn with_channel_axis(mut self) -> Self {
        self.has_channel_axis = true;
        self
    }
}
