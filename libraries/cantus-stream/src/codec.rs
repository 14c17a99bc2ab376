//! Symphonia-backed data source
//!
//! The generic decoder variant: anything symphonia can probe (ogg/vorbis,
//! mp3, flac, wav, aac, mp4) is decoded incrementally to interleaved i16
//! PCM. Loop points come from `LOOPSTART`/`LOOPLENGTH` metadata tags
//! (frame offsets, the convention used by game audio toolchains); a
//! looped source without tags wraps to frame zero.

use crate::buffer::PcmBuffer;
use crate::error::{Result, StreamError};
use crate::source::{FillStatus, StreamSource};
use crate::types::{LoopMode, StreamConfig};
use cantus_core::ReadSeek;
use std::io::{Read, Seek, SeekFrom};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::{MetadataOptions, MetadataRevision};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::debug;

/// Adapter presenting a `ReadSeek` stream as a symphonia media source
struct MediaSourceAdapter {
    inner: Box<dyn ReadSeek>,
    byte_len: Option<u64>,
}

impl MediaSourceAdapter {
    fn new(mut inner: Box<dyn ReadSeek>) -> Self {
        let byte_len = Self::measure(&mut inner);
        Self { inner, byte_len }
    }

    fn measure(inner: &mut Box<dyn ReadSeek>) -> Option<u64> {
        let len = inner.seek(SeekFrom::End(0)).ok()?;
        inner.seek(SeekFrom::Start(0)).ok()?;
        Some(len)
    }
}

impl Read for MediaSourceAdapter {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for MediaSourceAdapter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl MediaSource for MediaSourceAdapter {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}

/// Streaming decoder over any symphonia-probed container
pub struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,

    /// Decoded bytes per fill
    chunk_size: usize,

    looped: bool,
    loop_start: u64,
    /// Absolute frame at which a looped stream wraps (from LOOPLENGTH)
    loop_end: Option<u64>,

    /// Absolute decode cursor in frames
    frames_decoded: u64,
    /// Decoded bytes carried over between fills
    leftover: Vec<u8>,
    eof: bool,
}

impl SymphoniaSource {
    /// Probe `reader` and prepare a decoder for its default track
    ///
    /// `extension` is a detection hint only. On failure the reader is
    /// dropped here; callers get a decode error, never a half-open
    /// source.
    pub fn new(
        reader: Box<dyn ReadSeek>,
        extension: Option<&str>,
        config: &StreamConfig,
    ) -> Result<Self> {
        let mss = MediaSourceStream::new(
            Box::new(MediaSourceAdapter::new(reader)),
            Default::default(),
        );

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| StreamError::decode(format!("probe failed: {e}")))?;

        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| StreamError::decode("no audio tracks found"))?;

        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| StreamError::decode(format!("no decoder for track: {e}")))?;

        let (loop_start, loop_length) = format
            .metadata()
            .skip_to_latest()
            .map_or((None, None), Self::read_loop_tags);

        let looped = config.loop_mode == LoopMode::Looped;
        let loop_start = loop_start.unwrap_or(0);
        let loop_end = if looped {
            loop_length.map(|len| loop_start + len)
        } else {
            None
        };

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            chunk_size: config.buffer_size,
            looped,
            loop_start,
            loop_end,
            frames_decoded: 0,
            leftover: Vec::new(),
            eof: false,
        })
    }

    /// Parse LOOPSTART/LOOPLENGTH tags (frame offsets) from a metadata
    /// revision
    fn read_loop_tags(rev: &MetadataRevision) -> (Option<u64>, Option<u64>) {
        let mut start = None;
        let mut length = None;

        for tag in rev.tags() {
            match tag.key.to_ascii_uppercase().as_str() {
                "LOOPSTART" => start = tag.value.to_string().trim().parse().ok(),
                "LOOPLENGTH" => length = tag.value.to_string().trim().parse().ok(),
                _ => {}
            }
        }

        (start, length)
    }

    /// Decode the next packet of our track into i16 bytes
    ///
    /// `Ok(None)` means end of content: a real EOF, or the configured
    /// loop-end frame for tagged loops.
    fn decode_next_packet(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(end) = self.loop_end {
                if self.frames_decoded >= end {
                    return Ok(None);
                }
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(StreamError::decode(format!("packet read: {e}"))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| StreamError::decode(format!("decode: {e}")))?;

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            let samples = sample_buf.samples();

            let chans = spec.channels.count().max(1);
            let mut frames = (samples.len() / chans) as u64;
            let mut keep = samples.len();

            // Truncate the packet crossing the loop-end boundary
            if let Some(end) = self.loop_end {
                if self.frames_decoded + frames > end {
                    frames = end - self.frames_decoded;
                    keep = frames as usize * chans;
                }
            }

            self.frames_decoded += frames;

            let mut bytes = Vec::with_capacity(keep * 2);
            for sample in &samples[..keep] {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            return Ok(Some(bytes));
        }
    }
}

impl StreamSource for SymphoniaSource {
    fn fill_buffer(&mut self, buf: &mut PcmBuffer) -> Result<FillStatus> {
        buf.sample_rate = self.sample_rate;
        buf.channels = self.channels;
        buf.bits_per_sample = 16;
        buf.clear();

        if self.eof {
            return Ok(FillStatus::EndOfStream);
        }

        let mut status = FillStatus::Continue;
        let mut starved_after_wrap = false;

        while buf.data.len() < self.chunk_size {
            if !self.leftover.is_empty() {
                let need = self.chunk_size - buf.data.len();
                let take = need.min(self.leftover.len());
                buf.data.extend(self.leftover.drain(..take));
                continue;
            }

            match self.decode_next_packet()? {
                Some(bytes) => {
                    self.leftover = bytes;
                    starved_after_wrap = false;
                }
                None => {
                    if self.looped && !starved_after_wrap {
                        self.seek_to_frame(self.loop_start)?;
                        status = FillStatus::WrapAround;
                        starved_after_wrap = true;
                    } else {
                        // Non-looped end, or a loop that produces no
                        // data at all
                        debug!(frames = self.frames_decoded, "source exhausted");
                        self.eof = true;
                        if !self.looped {
                            status = FillStatus::EndOfStream;
                        }
                        break;
                    }
                }
            }
        }

        Ok(status)
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        let time = Time::from(frame as f64 / f64::from(self.sample_rate));
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| StreamError::decode(format!("seek failed: {e}")))?;

        self.decoder.reset();
        self.leftover.clear();
        self.frames_decoded = frame;
        self.eof = false;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn loop_start_frame(&self) -> u64 {
        self.loop_start
    }
}
