//! cpal-backed hardware queue
//!
//! A real [`AudioQueue`] over the default cpal output device, compiled in
//! with the `desktop` feature. Queued buffers are rendered in order by
//! the device callback with nearest-neighbor resampling; pitch and volume
//! apply at render time. Running out of queued data flips the queue to
//! `Stopped`, which is exactly the underrun signal the stream engine
//! watches for.

use crate::buffer::PcmBuffer;
use crate::error::{Result, StreamError};
use crate::queue::{AudioQueue, BufferId, QueueState};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Stream;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// State shared between the API surface and the device callback
struct QueueInner {
    next_id: u32,
    buffers: HashMap<u32, PcmBuffer>,

    /// Queue order; the first `consumed` entries are fully rendered and
    /// await unqueue
    queued: VecDeque<u32>,
    consumed: usize,

    /// Frame cursor within the first unconsumed buffer
    cursor: f64,

    state: QueueState,
    volume: f32,
    pitch: f32,
}

impl QueueInner {
    fn new() -> Self {
        Self {
            next_id: 1,
            buffers: HashMap::new(),
            queued: VecDeque::new(),
            consumed: 0,
            cursor: 0.0,
            state: QueueState::Stopped,
            volume: 1.0,
            pitch: 1.0,
        }
    }
}

/// cpal output stream driving an [`AudioQueue`]
pub struct CpalQueue {
    inner: Arc<Mutex<QueueInner>>,
    _stream: Stream,
}

// SAFETY: CpalQueue is safe to share between threads because:
// - inner is Arc<Mutex<>>, which is Send + Sync
// - _stream is cpal's Stream, which internally uses thread-safe
//   primitives (the PhantomData<*mut ()> is just a marker); it is only
//   dropped here, never otherwise touched after construction
#[allow(unsafe_code)]
unsafe impl Send for CpalQueue {}

#[allow(unsafe_code)]
unsafe impl Sync for CpalQueue {}

impl CpalQueue {
    /// Open the default output device and start its stream
    ///
    /// # Returns
    /// * `Ok(queue)` - Stream running, initially silent
    /// * `Err(_)` - No usable output device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| StreamError::Output("no default output device".into()))?;

        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| StreamError::Output(format!("query output config: {e}")))?
            .into();

        let device_rate = config.sample_rate.0;
        let device_channels = config.channels as usize;

        let inner = Arc::new(Mutex::new(QueueInner::new()));
        let render_inner = Arc::clone(&inner);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(&render_inner, data, device_rate, device_channels);
                },
                |err| warn!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| StreamError::Output(format!("build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| StreamError::Output(format!("start output stream: {e}")))?;

        Ok(Self {
            inner,
            _stream: stream,
        })
    }
}

/// What the render loop decided for one output frame
enum Advance {
    /// Samples written; move the cursor forward
    Step(f64),

    /// Current buffer drained; mark it consumed and retry
    NextBuffer,

    /// No unconsumed buffer left; spontaneous stop
    Drained,
}

/// Device callback body: render queued buffers into `data`
fn render(
    inner: &Mutex<QueueInner>,
    data: &mut [f32],
    device_rate: u32,
    device_channels: usize,
) {
    let mut inner = inner.lock().unwrap();

    'frame: for out in data.chunks_mut(device_channels) {
        loop {
            if inner.state != QueueState::Playing {
                out.fill(0.0);
                continue 'frame;
            }

            let current = inner.queued.get(inner.consumed).copied();
            let action = match current.and_then(|id| inner.buffers.get(&id)) {
                None if current.is_some() => Advance::NextBuffer,
                None => Advance::Drained,
                Some(buf) => {
                    let frame_idx = inner.cursor as u64;
                    if frame_idx >= buf.frame_count() {
                        Advance::NextBuffer
                    } else {
                        for (ch, slot) in out.iter_mut().enumerate() {
                            *slot = sample_at(buf, frame_idx, ch) * inner.volume;
                        }
                        let step = f64::from(inner.pitch.max(0.01))
                            * f64::from(buf.sample_rate)
                            / f64::from(device_rate.max(1));
                        Advance::Step(step)
                    }
                }
            };

            match action {
                Advance::Step(step) => {
                    inner.cursor += step;
                    continue 'frame;
                }
                Advance::NextBuffer => {
                    inner.consumed += 1;
                    inner.cursor = 0.0;
                }
                Advance::Drained => {
                    inner.state = QueueState::Stopped;
                    out.fill(0.0);
                    continue 'frame;
                }
            }
        }
    }
}

/// One sample of `buf` as f32, with channel fold-down for narrower
/// sources
fn sample_at(buf: &PcmBuffer, frame: u64, out_channel: usize) -> f32 {
    let channels = usize::from(buf.channels.max(1));
    let ch = out_channel.min(channels - 1);

    match buf.bits_per_sample {
        16 => {
            let idx = (frame as usize * channels + ch) * 2;
            if idx + 1 >= buf.data.len() {
                return 0.0;
            }
            let raw = i16::from_le_bytes([buf.data[idx], buf.data[idx + 1]]);
            f32::from(raw) / f32::from(i16::MAX)
        }
        8 => {
            let idx = frame as usize * channels + ch;
            buf.data
                .get(idx)
                .map_or(0.0, |&b| (f32::from(b) - 128.0) / 128.0)
        }
        _ => 0.0,
    }
}

impl AudioQueue for CpalQueue {
    fn create_buffer(&self) -> BufferId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.buffers.insert(id, PcmBuffer::default());
        BufferId(id)
    }

    fn destroy_buffer(&self, id: BufferId) {
        self.inner.lock().unwrap().buffers.remove(&id.0);
    }

    fn upload(&self, id: BufferId, pcm: &PcmBuffer) {
        self.inner.lock().unwrap().buffers.insert(id.0, pcm.clone());
    }

    fn buffer_frames(&self, id: BufferId) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .buffers
            .get(&id.0)
            .map_or(0, PcmBuffer::frame_count)
    }

    fn queue_buffer(&self, id: BufferId) {
        self.inner.lock().unwrap().queued.push_back(id.0);
    }

    fn unqueue_buffer(&self) -> Option<BufferId> {
        let mut inner = self.inner.lock().unwrap();
        if inner.consumed == 0 {
            return None;
        }
        inner.consumed -= 1;
        inner.queued.pop_front().map(BufferId)
    }

    fn processed_buffer_count(&self) -> usize {
        self.inner.lock().unwrap().consumed
    }

    fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.queued.clear();
        inner.consumed = 0;
        inner.cursor = 0.0;
    }

    fn play(&self) {
        self.inner.lock().unwrap().state = QueueState::Playing;
    }

    fn pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == QueueState::Playing {
            inner.state = QueueState::Paused;
        }
    }

    fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = QueueState::Stopped;
        // Stopping renders the whole queue consumed, like hardware
        // voices that flush on stop
        inner.consumed = inner.queued.len();
        inner.cursor = 0.0;
    }

    fn state(&self) -> QueueState {
        self.inner.lock().unwrap().state
    }

    fn sec_offset(&self) -> f64 {
        let inner = self.inner.lock().unwrap();

        // A stopped voice reports no progress, same as hardware offset
        // registers that reset on stop
        if inner.state == QueueState::Stopped {
            return 0.0;
        }

        let mut secs: f64 = inner
            .queued
            .iter()
            .take(inner.consumed)
            .filter_map(|id| inner.buffers.get(id))
            .map(PcmBuffer::duration_secs)
            .sum();

        if let Some(buf) = inner
            .queued
            .get(inner.consumed)
            .and_then(|id| inner.buffers.get(id))
        {
            if buf.sample_rate > 0 {
                secs += inner.cursor / f64::from(buf.sample_rate);
            }
        }

        secs
    }

    fn set_volume(&self, volume: f32) {
        self.inner.lock().unwrap().volume = volume.clamp(0.0, 2.0);
    }

    fn set_pitch(&self, pitch: f32) {
        self.inner.lock().unwrap().pitch = pitch.clamp(0.1, 4.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_buffer(frames: usize, rate: u32) -> PcmBuffer {
        let mut buf = PcmBuffer::new(rate, 2, 16);
        for i in 0..frames {
            let sample = ((i % 100) as i16 * 300).to_le_bytes();
            buf.data.extend_from_slice(&sample);
            buf.data.extend_from_slice(&sample);
        }
        buf
    }

    fn queue_with_one_buffer(frames: usize) -> Mutex<QueueInner> {
        let mut inner = QueueInner::new();
        inner.buffers.insert(1, stereo_buffer(frames, 48000));
        inner.queued.push_back(1);
        inner.state = QueueState::Playing;
        Mutex::new(inner)
    }

    #[test]
    fn render_consumes_queued_buffers_in_order() {
        let inner = queue_with_one_buffer(64);

        // 64 frames of stereo at matching rates drain in exactly 64
        // output frames
        let mut out = vec![0.0f32; 64 * 2];
        render(&inner, &mut out, 48000, 2);

        let guard = inner.lock().unwrap();
        assert_eq!(guard.consumed, 0);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn drained_queue_stops_spontaneously() {
        let inner = queue_with_one_buffer(16);

        let mut out = vec![0.0f32; 64 * 2];
        render(&inner, &mut out, 48000, 2);

        let guard = inner.lock().unwrap();
        assert_eq!(guard.state, QueueState::Stopped);
        assert_eq!(guard.consumed, 1);
        // Tail past the drain point is silence
        assert!(out[40..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn paused_queue_renders_silence_without_consuming() {
        let inner = queue_with_one_buffer(64);
        inner.lock().unwrap().state = QueueState::Paused;

        let mut out = vec![1.0f32; 32];
        render(&inner, &mut out, 48000, 2);

        let guard = inner.lock().unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(guard.consumed, 0);
        assert_eq!(guard.cursor, 0.0);
    }

    #[test]
    fn mono_source_folds_to_both_output_channels() {
        let mut buf = PcmBuffer::new(48000, 1, 16);
        buf.data.extend_from_slice(&1000i16.to_le_bytes());

        assert_eq!(sample_at(&buf, 0, 0), sample_at(&buf, 0, 1));
        assert!(sample_at(&buf, 0, 0) > 0.0);
    }

    #[test]
    fn create_queue_against_real_device() {
        // May fail if no audio device is available in the environment
        match CpalQueue::new() {
            Ok(queue) => {
                let id = queue.create_buffer();
                queue.upload(id, &stereo_buffer(32, 48000));
                assert_eq!(queue.buffer_frames(id), 32);
                queue.destroy_buffer(id);
            }
            Err(e) => {
                eprintln!("Note: audio device not available in test environment: {e}");
            }
        }
    }
}
