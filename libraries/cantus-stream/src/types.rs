//! Core value types for the stream engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback state of a stream engine
///
/// Mutated only through the engine's public operations, with one
/// exception: `Playing` lazily downgrades to `Stopped` once the source
/// has been exhausted and the hardware queue has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// No data source bound
    Closed,

    /// Data source bound, not producing
    Stopped,

    /// Production thread active, hardware queue playing or buffering
    Playing,

    /// Production suspended, resumable without re-decoding
    Paused,
}

/// Loop behavior for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopMode {
    /// Play through once and stop
    Once,

    /// Wrap around to the source's loop-start frame at end of content
    Looped,
}

/// Configuration for a stream engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Number of hardware buffers in the pool (default: 3)
    pub buffer_count: usize,

    /// Decoded bytes per buffer (default: 32 KiB)
    pub buffer_size: usize,

    /// Sleep between production-loop iterations (default: 10ms)
    pub sleep_interval: Duration,

    /// Loop behavior (default: Once)
    pub loop_mode: LoopMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: 3,
            buffer_size: 32768,
            sleep_interval: Duration::from_millis(10),
            loop_mode: LoopMode::Once,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.buffer_count, 3);
        assert_eq!(config.buffer_size, 32768);
        assert_eq!(config.sleep_interval, Duration::from_millis(10));
        assert_eq!(config.loop_mode, LoopMode::Once);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = StreamConfig {
            buffer_count: 4,
            buffer_size: 16384,
            sleep_interval: Duration::from_millis(5),
            loop_mode: LoopMode::Looped,
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: StreamConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.buffer_count, 4);
        assert_eq!(back.loop_mode, LoopMode::Looped);
    }
}
