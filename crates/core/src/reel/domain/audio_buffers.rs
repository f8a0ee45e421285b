/// One video frame's worth of decoded audio, stored channel by channel.
///
/// Samples are normalized to [-1.0, 1.0].
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffers {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffers {
    /// Silent buffers of `channels` x `frames` samples.
    pub fn silent(channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    /// Builds buffers from per-channel sample vectors, which must all be the same length.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.first().map_or(0, Vec::len);
        debug_assert!(
            channels.iter().all(|c| c.len() == frames),
            "all channels must hold the same number of samples"
        );
        Self { channels, frames }
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn data(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    pub fn data_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.channels[channel]
    }

    /// Interleaved 24-bit little-endian PCM for `out_channels` channels.
    ///
    /// Channels this buffer lacks are written as silence; extra channels are dropped.
    pub fn to_pcm24(&self, out_channels: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.frames * out_channels * 3);
        for i in 0..self.frames {
            for c in 0..out_channels {
                let sample = self.channels.get(c).map_or(0.0, |ch| ch[i]);
                let scaled = (sample.clamp(-1.0, 1.0) * 8_388_607.0).round() as i32;
                out.extend_from_slice(&scaled.to_le_bytes()[..3]);
            }
        }
        out
    }
}
