//! Stream engine - state machine and production thread
//!
//! One `StreamEngine` owns one optional data source, one hardware queue
//! and, while playing, one background production thread. The public
//! operations run on the owning thread; the production thread decodes
//! the source into the fixed buffer pool and keeps the hardware queue
//! fed.
//!
//! Cross-thread state is deliberately light: the termination request and
//! the production-started / source-exhausted markers are monotonic
//! booleans per play session, so plain atomics carry them. Only the
//! pause/resume pair needs a mutex, because pausing can race with the
//! production thread's initial resume before the hardware has actually
//! started playing.

use crate::buffer::PcmBuffer;
use crate::error::Result;
use crate::open::open_source;
use crate::queue::{AudioQueue, BufferId, QueueState};
use crate::source::{FillStatus, StreamSource};
use crate::types::{StreamConfig, StreamState};
use cantus_core::FileSystem;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// State shared between the owning thread and the production thread
struct Shared {
    queue: Arc<dyn AudioQueue>,
    source: Mutex<Option<Box<dyn StreamSource>>>,

    /// Owning thread requests production stop; polled at checkpoints
    term_req: AtomicBool,

    /// Production thread has queued its first buffer
    inited: AtomicBool,

    /// Production thread has observed end-of-content (or a fatal decode
    /// error, which is treated the same)
    exhausted: AtomicBool,

    /// Decoded frames since the last loop-start reset
    proc_frames: AtomicU64,

    /// Sample rate of the bound source, cached so offset queries never
    /// contend with a fill in progress (0 = no source)
    sample_rate: AtomicU32,

    /// Pause requested before the hardware actually started playing.
    /// Guards the two-sided race between `pause()` and the production
    /// thread's initial resume.
    preempt_pause: Mutex<bool>,
}

impl Shared {
    /// Pause the hardware queue, or record a preempt if it has not
    /// started playing yet
    fn pause_queue(&self) {
        let mut preempt = self.preempt_pause.lock().unwrap();
        if self.queue.state() == QueueState::Playing {
            self.queue.pause();
        } else {
            *preempt = true;
        }
    }

    /// Resume the hardware queue, consuming a pending preempt instead of
    /// issuing a redundant play
    fn resume_queue(&self) {
        let mut preempt = self.preempt_pause.lock().unwrap();
        if *preempt {
            *preempt = false;
        } else {
            self.queue.play();
        }
    }
}

/// Double-buffered streaming playback engine
///
/// See the crate docs for the state machine. One instance manages
/// exactly one logical stream.
pub struct StreamEngine {
    shared: Arc<Shared>,
    fs: Arc<dyn FileSystem>,
    config: StreamConfig,
    buffers: Vec<BufferId>,
    worker: Option<JoinHandle<()>>,
    state: StreamState,
}

impl StreamEngine {
    /// Create an engine over the given hardware queue and filesystem
    ///
    /// The buffer pool is sized once here and lives for the engine's
    /// whole lifetime.
    pub fn new(
        queue: Arc<dyn AudioQueue>,
        fs: Arc<dyn FileSystem>,
        config: StreamConfig,
    ) -> Self {
        queue.set_volume(1.0);
        queue.set_pitch(1.0);
        queue.clear();

        let buffers = (0..config.buffer_count)
            .map(|_| queue.create_buffer())
            .collect();

        Self {
            shared: Arc::new(Shared {
                queue,
                source: Mutex::new(None),
                term_req: AtomicBool::new(false),
                inited: AtomicBool::new(false),
                exhausted: AtomicBool::new(false),
                proc_frames: AtomicU64::new(0),
                sample_rate: AtomicU32::new(0),
                preempt_pause: Mutex::new(false),
            }),
            fs,
            config,
            buffers,
            worker: None,
            state: StreamState::Closed,
        }
    }

    /// Bind a new data source by resource name
    ///
    /// On a lookup miss the current binding (if any) is left untouched
    /// and the error is returned. Any other failure releases the current
    /// binding, logs a diagnostic and leaves the engine `Closed`;
    /// subsequent `play` calls are safe no-ops.
    pub fn open(&mut self, name: &str) -> Result<()> {
        self.check_stopped();

        match open_source(self.fs.as_ref(), name, &self.config) {
            Ok(source) => {
                self.bind_source(source);
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => {
                self.close();
                warn!("unable to decode audio stream: {name}: {e}");
                Ok(())
            }
        }
    }

    /// Bind an already-constructed data source
    ///
    /// Useful for sources that do not come from the filesystem, such as
    /// procedural audio. Any previous binding is released first.
    pub fn bind_source(&mut self, source: Box<dyn StreamSource>) {
        self.close();
        self.shared
            .sample_rate
            .store(source.sample_rate(), Ordering::SeqCst);
        *self.shared.source.lock().unwrap() = Some(source);
        self.state = StreamState::Stopped;
    }

    /// Release the bound source, stopping production first if needed
    pub fn close(&mut self) {
        self.check_stopped();

        match self.state {
            StreamState::Playing | StreamState::Paused => {
                self.stop_stream();
                self.release_source();
                self.state = StreamState::Closed;
            }
            StreamState::Stopped => {
                self.release_source();
                self.state = StreamState::Closed;
            }
            StreamState::Closed => {}
        }
    }

    /// Start playback at `offset` seconds, or resume if paused
    pub fn play(&mut self, offset: f64) {
        if !self.has_source() {
            return;
        }

        self.check_stopped();

        match self.state {
            StreamState::Closed | StreamState::Playing => return,
            StreamState::Stopped => self.start_stream(offset),
            StreamState::Paused => self.shared.resume_queue(),
        }

        self.state = StreamState::Playing;
    }

    /// Stop playback, terminating the production thread
    pub fn stop(&mut self) {
        self.check_stopped();

        match self.state {
            StreamState::Closed | StreamState::Stopped => return,
            StreamState::Playing | StreamState::Paused => self.stop_stream(),
        }

        self.state = StreamState::Stopped;
    }

    /// Pause playback; production keeps the queue primed for resume
    pub fn pause(&mut self) {
        self.check_stopped();

        match self.state {
            StreamState::Closed | StreamState::Stopped | StreamState::Paused => return,
            StreamState::Playing => self.shared.pause_queue(),
        }

        self.state = StreamState::Paused;
    }

    /// Set playback volume (1.0 = unity), effective in any state
    pub fn set_volume(&self, volume: f32) {
        self.shared.queue.set_volume(volume);
    }

    /// Set playback pitch (1.0 = unity), effective in any state
    ///
    /// If the bound source handles pitch natively the hardware pitch is
    /// left at unity. Re-evaluated on every call since `open` may have
    /// replaced the source.
    pub fn set_pitch(&self, pitch: f32) {
        let mut source = self.shared.source.lock().unwrap();
        let native = source.as_mut().is_some_and(|s| s.set_pitch(pitch));
        if native {
            self.shared.queue.set_pitch(1.0);
        } else {
            self.shared.queue.set_pitch(pitch);
        }
    }

    /// Current state, after the lazy organic-stop check
    pub fn query_state(&mut self) -> StreamState {
        self.check_stopped();
        self.state
    }

    /// Current playback offset in seconds
    ///
    /// Sum of decoded frames since the last loop-start reset and the
    /// hardware's own sub-buffer offset. Returns 0 with no source bound.
    pub fn query_offset(&self) -> f64 {
        if self.state == StreamState::Closed {
            return 0.0;
        }

        let rate = self.shared.sample_rate.load(Ordering::SeqCst);
        if rate == 0 {
            return 0.0;
        }

        let proc = self.shared.proc_frames.load(Ordering::SeqCst) as f64 / f64::from(rate);
        proc + self.shared.queue.sec_offset()
    }

    /// Lazy organic-stop check
    ///
    /// Runs at the top of every public operation: a stream that ended on
    /// its own (end of content or decode error) is only folded into the
    /// state machine here, so transitions act on the effective state.
    fn check_stopped(&mut self) {
        if self.state != StreamState::Playing {
            return;
        }

        // Production has not queued anything yet; the hardware state
        // means nothing during startup
        if !self.shared.inited.load(Ordering::SeqCst) {
            return;
        }

        // Hardware idle without exhaustion is just an underrun; the
        // production thread heals it on its own
        if !self.shared.exhausted.load(Ordering::SeqCst) {
            return;
        }

        if self.shared.queue.state() == QueueState::Playing {
            return;
        }

        self.stop_stream();
        self.state = StreamState::Stopped;
    }

    fn has_source(&self) -> bool {
        self.shared.source.lock().unwrap().is_some()
    }

    fn release_source(&mut self) {
        *self.shared.source.lock().unwrap() = None;
        self.shared.sample_rate.store(0, Ordering::SeqCst);
    }

    /// Terminate the production thread and silence the hardware
    fn stop_stream(&mut self) {
        self.shared.term_req.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("production thread panicked");
            }
        }

        // Stop the hardware only after the join: the thread may have
        // reissued play right before seeing the termination request
        self.shared.queue.stop();
        self.shared.proc_frames.store(0, Ordering::SeqCst);
    }

    /// Spawn a fresh production session from `Stopped`
    fn start_stream(&mut self, offset: f64) {
        self.shared.queue.clear();

        *self.shared.preempt_pause.lock().unwrap() = false;
        self.shared.inited.store(false, Ordering::SeqCst);
        self.shared.exhausted.store(false, Ordering::SeqCst);
        self.shared.term_req.store(false, Ordering::SeqCst);

        let rate = self.shared.sample_rate.load(Ordering::SeqCst);
        let start_frame = (offset * f64::from(rate)) as u64;
        self.shared.proc_frames.store(start_frame, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let buffers = self.buffers.clone();
        let sleep_interval = self.config.sleep_interval;

        let spawned = thread::Builder::new()
            .name("cantus-stream".into())
            .spawn(move || stream_data(&shared, &buffers, start_frame, sleep_interval));

        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => warn!("failed to spawn production thread: {e}"),
        }
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.close();

        self.shared.queue.clear();
        for id in self.buffers.drain(..) {
            self.shared.queue.destroy_buffer(id);
        }
    }
}

/// Production thread body: prime the buffer pool, then refill buffers as
/// the hardware consumes them
fn stream_data(
    shared: &Shared,
    buffers: &[BufferId],
    start_frame: u64,
    sleep_interval: Duration,
) {
    let queue = shared.queue.as_ref();
    let mut staging = PcmBuffer::default();
    let mut last_buf: Option<BufferId> = None;
    let mut first_buffer = true;

    debug!(start_frame, "production thread started");

    if shared.term_req.load(Ordering::SeqCst) {
        return;
    }

    // Priming phase: seek, then fill and queue every slot in order
    for (i, &buf) in buffers.iter().enumerate() {
        if shared.term_req.load(Ordering::SeqCst) {
            return;
        }

        let filled = {
            let mut guard = shared.source.lock().unwrap();
            let Some(source) = guard.as_mut() else {
                return;
            };

            if i == 0 {
                if let Err(e) = source.seek_to_frame(start_frame) {
                    debug!("seek to start offset failed: {e}");
                }
            }

            source.fill_buffer(&mut staging)
        };

        let status = match filled {
            Ok(status) => status,
            Err(e) => {
                debug!("decode error while priming: {e}");
                return;
            }
        };

        queue.upload(buf, &staging);
        queue.queue_buffer(buf);

        if first_buffer {
            // Same protocol as resuming from pause; a still-stopped
            // hardware source gets an actual play here
            shared.resume_queue();

            first_buffer = false;
            shared.inited.store(true, Ordering::SeqCst);
        }

        if shared.term_req.load(Ordering::SeqCst) {
            return;
        }

        if status == FillStatus::EndOfStream {
            shared.exhausted.store(true, Ordering::SeqCst);
            break;
        }
    }

    // Steady state: wait for buffers to be consumed, then refill and
    // requeue them
    loop {
        // Cooperative checkpoint for schedulers that throttle audio work
        // against other subsystems
        thread::yield_now();

        let mut proc_bufs = queue.processed_buffer_count();

        while proc_bufs > 0 {
            proc_bufs -= 1;

            if shared.term_req.load(Ordering::SeqCst) {
                break;
            }

            let Some(buf) = queue.unqueue_buffer() else {
                // Transient failure; try again next iteration
                debug!("unqueue failed, retrying next iteration");
                break;
            };

            if last_buf == Some(buf) {
                // The buffer before the loop boundary has drained; the
                // offset accounting restarts at the loop point so offset
                // queries read near-zero again
                let loop_start = {
                    let guard = shared.source.lock().unwrap();
                    guard.as_ref().map_or(0, |s| s.loop_start_frame())
                };
                shared.proc_frames.store(loop_start, Ordering::SeqCst);
                last_buf = None;
            } else {
                shared
                    .proc_frames
                    .fetch_add(queue.buffer_frames(buf), Ordering::SeqCst);
            }

            if shared.exhausted.load(Ordering::SeqCst) {
                // Nothing left to decode; let the remaining queue drain
                continue;
            }

            let filled = {
                let mut guard = shared.source.lock().unwrap();
                let Some(source) = guard.as_mut() else {
                    return;
                };
                source.fill_buffer(&mut staging)
            };

            let status = match filled {
                Ok(status) => status,
                Err(e) => {
                    debug!("decode error mid-stream: {e}");
                    shared.exhausted.store(true, Ordering::SeqCst);
                    return;
                }
            };

            queue.upload(buf, &staging);
            queue.queue_buffer(buf);

            // Underrun: the hardware ran dry and stopped on its own;
            // restart it now that data is queued again
            if queue.state() == QueueState::Stopped {
                queue.play();
            }

            // Mark the last buffer before the source wrapped so its
            // drain resets the processed-frame count above
            if status == FillStatus::WrapAround {
                last_buf = Some(buf);
            }

            if status == FillStatus::EndOfStream {
                shared.exhausted.store(true, Ordering::SeqCst);
            }
        }

        if shared.term_req.load(Ordering::SeqCst) {
            break;
        }

        thread::sleep(sleep_interval);
    }

    debug!("production thread exiting");
}
