//! Shared test doubles for the engine integration tests
//!
//! `MockQueue` models a hardware buffer queue entirely in memory; tests
//! drive consumption explicitly with `drain_one`/`finish`. `MockSource`
//! produces scripted fill results so loop and end-of-stream paths can be
//! exercised deterministically.

#![allow(dead_code)]

use cantus_stream::{AudioQueue, BufferId, FillStatus, PcmBuffer, QueueState, StreamSource};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct MockQueueInner {
    next_id: u32,
    buffers: HashMap<u32, PcmBuffer>,
    queued: VecDeque<u32>,
    consumed: usize,
    state: QueueState,
    volume: f32,
    pitch: f32,
}

/// In-memory hardware queue driven explicitly by the test
pub struct MockQueue {
    inner: Mutex<MockQueueInner>,
    play_calls: AtomicUsize,
}

impl MockQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockQueueInner {
                next_id: 1,
                buffers: HashMap::new(),
                queued: VecDeque::new(),
                consumed: 0,
                state: QueueState::Stopped,
                volume: 1.0,
                pitch: 1.0,
            }),
            play_calls: AtomicUsize::new(0),
        })
    }

    /// Mark the oldest unconsumed buffer as fully played
    pub fn drain_one(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.consumed < inner.queued.len() {
            inner.consumed += 1;
            true
        } else {
            false
        }
    }

    /// Consume the whole queue and stop, as hardware does on underrun
    pub fn finish(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consumed = inner.queued.len();
        inner.state = QueueState::Stopped;
    }

    /// Number of `play` calls issued so far
    pub fn play_calls(&self) -> usize {
        self.play_calls.load(Ordering::SeqCst)
    }

    pub fn queued_len(&self) -> usize {
        self.inner.lock().unwrap().queued.len()
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().unwrap().volume
    }

    pub fn pitch(&self) -> f32 {
        self.inner.lock().unwrap().pitch
    }
}

impl AudioQueue for MockQueue {
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
    }

    fn play(&self) {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
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
        inner.consumed = inner.queued.len();
    }

    fn state(&self) -> QueueState {
        self.inner.lock().unwrap().state
    }

    fn sec_offset(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        if inner.state == QueueState::Stopped {
            return 0.0;
        }
        inner
            .queued
            .iter()
            .take(inner.consumed)
            .filter_map(|id| inner.buffers.get(id))
            .map(PcmBuffer::duration_secs)
            .sum()
    }

    fn set_volume(&self, volume: f32) {
        self.inner.lock().unwrap().volume = volume;
    }

    fn set_pitch(&self, pitch: f32) {
        self.inner.lock().unwrap().pitch = pitch;
    }
}

/// Observable side of a [`MockSource`], shared with the test
pub struct SourceProbe {
    pub fills: AtomicUsize,
    pub in_fill: AtomicBool,
    pub seeks: Mutex<Vec<u64>>,
}

/// Scripted data source
///
/// Each fill pops the next status from the script; an exhausted script
/// falls back to `default_status`.
pub struct MockSource {
    script: VecDeque<FillStatus>,
    default_status: FillStatus,
    frames_per_fill: u64,
    rate: u32,
    loop_start: u64,
    fill_delay: Duration,
    native_pitch: bool,
    probe: Arc<SourceProbe>,
}

impl MockSource {
    pub fn new(rate: u32, frames_per_fill: u64) -> Self {
        Self {
            script: VecDeque::new(),
            default_status: FillStatus::EndOfStream,
            frames_per_fill,
            rate,
            loop_start: 0,
            fill_delay: Duration::ZERO,
            native_pitch: false,
            probe: Arc::new(SourceProbe {
                fills: AtomicUsize::new(0),
                in_fill: AtomicBool::new(false),
                seeks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_script(mut self, script: &[FillStatus]) -> Self {
        self.script = script.iter().copied().collect();
        self
    }

    pub fn with_default(mut self, status: FillStatus) -> Self {
        self.default_status = status;
        self
    }

    pub fn with_loop_start(mut self, frame: u64) -> Self {
        self.loop_start = frame;
        self
    }

    pub fn with_fill_delay(mut self, delay: Duration) -> Self {
        self.fill_delay = delay;
        self
    }

    pub fn with_native_pitch(mut self) -> Self {
        self.native_pitch = true;
        self
    }

    pub fn probe(&self) -> Arc<SourceProbe> {
        Arc::clone(&self.probe)
    }
}

impl StreamSource for MockSource {
    fn fill_buffer(&mut self, buf: &mut PcmBuffer) -> cantus_stream::Result<FillStatus> {
        self.probe.in_fill.store(true, Ordering::SeqCst);
        if !self.fill_delay.is_zero() {
            std::thread::sleep(self.fill_delay);
        }

        buf.sample_rate = self.rate;
        buf.channels = 2;
        buf.bits_per_sample = 16;
        buf.data = vec![0; self.frames_per_fill as usize * 4];

        let status = self.script.pop_front().unwrap_or(self.default_status);
        self.probe.fills.fetch_add(1, Ordering::SeqCst);
        self.probe.in_fill.store(false, Ordering::SeqCst);
        Ok(status)
    }

    fn seek_to_frame(&mut self, frame: u64) -> cantus_stream::Result<()> {
        self.probe.seeks.lock().unwrap().push(frame);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn loop_start_frame(&self) -> u64 {
        self.loop_start
    }

    fn set_pitch(&mut self, _pitch: f32) -> bool {
        self.native_pitch
    }
}

/// Route engine diagnostics to the test writer, honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `cond` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// A short stereo WAV, for tests exercising the real codec path
pub fn tone_wav(frames: u32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut bytes, spec).unwrap();
        for i in 0..frames {
            let sample = (i % 440) as i16 * 70;
            writer.write_sample(sample).unwrap();
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes.into_inner()
}
