//! Cantus - Streaming Playback Engine
//!
//! A double-buffered streaming engine for one logical audio stream. A
//! background thread decodes the bound data source incrementally into a
//! small fixed pool of hardware buffers, keeping the audio queue fed just
//! fast enough to avoid underruns, while the owning thread drives a
//! play/pause/stop state machine and queries exact playback offsets.
//!
//! This crate provides:
//! - [`StreamEngine`] - the state machine plus production thread
//! - [`StreamSource`] - trait for incremental decoders (seek, fill, loop
//!   points, optional native pitch)
//! - [`AudioQueue`] - trait over the hardware buffer queue (enqueue,
//!   unqueue, play/pause/stop, processed-buffer and offset queries)
//! - [`open_source`] - signature-sniffing source selection over a
//!   [`cantus_core::FileSystem`]
//! - [`SymphoniaSource`] - symphonia-backed [`StreamSource`] for the
//!   common container formats
//! - `CpalQueue` (feature `desktop`) - a real [`AudioQueue`] over a cpal
//!   output stream
//!
//! # Architecture
//!
//! `cantus-stream` is platform-agnostic: the hardware queue and the
//! filesystem are both traits, so the engine runs unchanged against a
//! desktop audio device, an embedded DMA queue, or the scripted test
//! doubles in this repository's test suite.
//!
//! One engine instance manages exactly one stream; mixing several streams
//! is a caller-level concern.

mod buffer;
mod codec;
mod engine;
mod error;
mod open;
#[cfg(feature = "desktop")]
mod output;
mod queue;
mod source;
pub mod types;

// Public exports
pub use buffer::PcmBuffer;
pub use codec::SymphoniaSource;
pub use engine::StreamEngine;
pub use error::{Result, StreamError};
pub use open::open_source;
#[cfg(feature = "desktop")]
pub use output::CpalQueue;
pub use queue::{AudioQueue, BufferId, QueueState};
pub use source::{FillStatus, StreamSource};
pub use types::{LoopMode, StreamConfig, StreamState};
