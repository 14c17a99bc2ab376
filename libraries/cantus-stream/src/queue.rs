//! Hardware buffer queue abstraction
//!
//! The narrow surface the engine consumes from the audio hardware layer:
//! a pool of buffer handles plus one source/voice that plays them in
//! queue order. Individual calls are assumed thread-safe; the engine
//! calls into the queue from both its owning thread and the production
//! thread without additional locking.

use crate::buffer::PcmBuffer;

/// Opaque handle to one hardware buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Hardware playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Consuming queued buffers
    Playing,

    /// Suspended, queue retained
    Paused,

    /// Not playing; also reached spontaneously on underrun
    Stopped,
}

/// Hardware buffer queue
pub trait AudioQueue: Send + Sync {
    /// Allocate a new buffer handle
    fn create_buffer(&self) -> BufferId;

    /// Release a buffer handle
    fn destroy_buffer(&self, id: BufferId);

    /// Replace the contents of `id` with `pcm`
    fn upload(&self, id: BufferId, pcm: &PcmBuffer);

    /// Frame count of the data last uploaded to `id`
    fn buffer_frames(&self, id: BufferId) -> u64;

    /// Append `id` to the playback queue
    fn queue_buffer(&self, id: BufferId);

    /// Remove the oldest fully-consumed buffer from the queue
    ///
    /// `None` signals a transient failure; callers retry on their next
    /// iteration rather than escalating.
    fn unqueue_buffer(&self) -> Option<BufferId>;

    /// Number of fully-consumed buffers awaiting unqueue
    fn processed_buffer_count(&self) -> usize;

    /// Drop all queued buffers and rewind playback progress
    fn clear(&self);

    /// Start or restart consumption
    fn play(&self);

    /// Suspend consumption, keeping the queue
    fn pause(&self);

    /// Stop consumption
    fn stop(&self);

    /// Current hardware playback state
    fn state(&self) -> QueueState;

    /// Elapsed seconds within the not-yet-unqueued portion of the queue
    fn sec_offset(&self) -> f64;

    /// Set playback volume (1.0 = unity)
    fn set_volume(&self, volume: f32);

    /// Set playback pitch (1.0 = unity)
    fn set_pitch(&self, pitch: f32);
}
