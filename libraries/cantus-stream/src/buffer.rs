//! PCM buffer value type
//!
//! The unit of exchange between a data source and the audio queue: one
//! chunk of interleaved PCM plus the format needed to interpret it.

/// A single buffer of interleaved PCM
#[derive(Debug, Clone, Default)]
pub struct PcmBuffer {
    /// Raw sample bytes, interleaved, little-endian
    pub data: Vec<u8>,

    /// Frames per second
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Bits per single sample (16 for i16 PCM)
    pub bits_per_sample: u16,
}

impl PcmBuffer {
    /// Create an empty buffer with the given format
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            data: Vec::new(),
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Number of frames held, computed from byte size, bit depth and
    /// channel count
    pub fn frame_count(&self) -> u64 {
        let bytes_per_sample = (self.bits_per_sample / 8) as usize;
        if bytes_per_sample == 0 || self.channels == 0 {
            return 0;
        }
        (self.data.len() / bytes_per_sample / self.channels as usize) as u64
    }

    /// Playable duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }

    /// Discard contents, keeping format and capacity
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
