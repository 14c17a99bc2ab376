//! Data source abstraction
//!
//! Abstracts incremental decoding for the stream engine. One variant
//! exists per codec backend; the engine is agnostic to which.

use crate::buffer::PcmBuffer;
use crate::error::Result;

/// Outcome of a successful buffer fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// Buffer filled, more content follows
    Continue,

    /// Buffer filled and the decode cursor wrapped to the loop-start
    /// frame inside it
    WrapAround,

    /// Content ended inside (or before) this buffer; it may be partial
    /// or empty
    EndOfStream,
}

/// Incremental decoder feeding the stream engine
///
/// Implementors decode one buffer's worth of PCM per call and maintain
/// their own decode cursor. After returning [`FillStatus::WrapAround`]
/// the source must be safe to fill again from the loop-start frame.
pub trait StreamSource: Send {
    /// Decode the next chunk into `buf`
    ///
    /// The source sets the buffer's format fields and replaces its data.
    /// A hard decode failure is returned as `Err` and ends the session.
    fn fill_buffer(&mut self, buf: &mut PcmBuffer) -> Result<FillStatus>;

    /// Reposition the decode cursor to an absolute frame offset
    fn seek_to_frame(&mut self, frame: u64) -> Result<()>;

    /// Frames per second of the decoded output
    fn sample_rate(&self) -> u32;

    /// Frame the decode cursor wraps to on loop wraparound
    fn loop_start_frame(&self) -> u64 {
        0
    }

    /// Apply pitch natively, if supported
    ///
    /// Returns `true` when the source handles pitch itself, in which
    /// case the engine leaves the hardware pitch at unity.
    fn set_pitch(&mut self, _pitch: f32) -> bool {
        false
    }
}

impl std::fmt::Debug for dyn StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamSource")
    }
}
