//! Source selection by content sniffing
//!
//! Reads the first four bytes of the resource to pick a decoder variant,
//! then rewinds and hands the stream to the chosen constructor. On
//! construction failure the stream is dropped by the constructor; only a
//! filesystem lookup miss is worth distinguishing for callers.

use crate::codec::SymphoniaSource;
use crate::error::{Result, StreamError};
use crate::source::StreamSource;
use crate::types::StreamConfig;
use cantus_core::FileSystem;
use std::io::{Read, Seek, SeekFrom};

/// Ogg container signature
const OGG_MAGIC: [u8; 4] = *b"OggS";

/// Standard MIDI file signature
const MIDI_MAGIC: [u8; 4] = *b"MThd";

/// Locate `name` and construct a matching data source
///
/// # Returns
/// * `Ok(source)` - A decoder variant bound to the resource
/// * `Err(e)` where `e.is_not_found()` - No resource matches `name`
/// * `Err(_)` - Found, but unreadable or undecodable
pub fn open_source(
    fs: &dyn FileSystem,
    name: &str,
    config: &StreamConfig,
) -> Result<Box<dyn StreamSource>> {
    let mut handle = fs.open_read(name)?;

    let mut sig = [0u8; 4];
    let _ = handle
        .reader
        .read(&mut sig)
        .map_err(|e| StreamError::decode(format!("signature read: {e}")))?;
    handle
        .reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| StreamError::decode(format!("signature rewind: {e}")))?;

    if sig == OGG_MAGIC {
        let source = SymphoniaSource::new(handle.reader, Some("ogg"), config)?;
        return Ok(Box::new(source));
    }

    if sig == MIDI_MAGIC {
        // Recognized, but no synthesizer backend is compiled in
        return Err(StreamError::Unsupported("MIDI (no synthesizer backend)".into()));
    }

    let source = SymphoniaSource::new(handle.reader, handle.extension.as_deref(), config)?;
    Ok(Box::new(source))
}
