//! Per-stream context
//!
//! An `AudioStream` owns everything one open output stream needs: the native
//! device and buffer, the chunk layout, the last known playing chunk and the
//! currently locked chunk. Every engine operation takes the stream it acts on,
//! so independent streams never share state.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{EngineOptions, WaitStrategy};
use crate::format::AudioFormat;
use crate::native::{BufferKind, LockedSpans, SoundBuffer, SoundDevice};

/// Timing bounds copied out of [`EngineOptions`] at open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timing {
    pub poll_interval: Duration,
    pub max_poll_iterations: Option<u32>,
    pub event_timeout: Option<Duration>,
    pub max_stop_polls: u32,
}

impl From<&EngineOptions> for Timing {
    fn from(options: &EngineOptions) -> Self {
        Self {
            poll_interval: options.poll_interval(),
            max_poll_iterations: options.max_poll_iterations,
            event_timeout: options.event_timeout(),
            max_stop_polls: options.max_stop_polls,
        }
    }
}

/// The chunk currently held by the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LockedRegion {
    pub chunk: usize,
    pub spans: LockedSpans,
}

/// Serializable summary of a negotiated stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub id: Uuid,
    pub format: AudioFormat,
    pub chunk_size: u32,
    pub num_chunks: usize,
    pub total_bytes: u32,
    pub silence: u8,
    pub buffer_kind: BufferKind,
    pub wait_strategy: WaitStrategy,
}

/// One open output stream
pub struct AudioStream {
    pub(crate) id: Uuid,
    pub(crate) format: AudioFormat,
    pub(crate) chunk_size: u32,
    pub(crate) num_chunks: usize,
    pub(crate) silence: u8,
    pub(crate) buffer_kind: BufferKind,
    pub(crate) wait_strategy: WaitStrategy,
    /// Chunk the hardware was playing at the last acquire
    pub(crate) playing: usize,
    pub(crate) locked: Option<LockedRegion>,
    pub(crate) buffer: Option<Box<dyn SoundBuffer>>,
    pub(crate) device: Option<Box<dyn SoundDevice>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) timing: Timing,
}

impl AudioStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn silence(&self) -> u8 {
        self.silence
    }

    pub fn buffer_kind(&self) -> BufferKind {
        self.buffer_kind
    }

    /// The wait strategy in effect, after any fallback at open
    pub fn wait_strategy(&self) -> WaitStrategy {
        self.wait_strategy
    }

    /// Chunk recorded as playing by the most recent acquire
    pub fn now_playing(&self) -> usize {
        self.playing
    }

    pub fn locked_chunk(&self) -> Option<usize> {
        self.locked.map(|region| region.chunk)
    }

    pub fn is_open(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            id: self.id,
            format: self.format,
            chunk_size: self.chunk_size,
            num_chunks: self.num_chunks,
            total_bytes: self.chunk_size * self.num_chunks as u32,
            silence: self.silence,
            buffer_kind: self.buffer_kind,
            wait_strategy: self.wait_strategy,
        }
    }

    /// Release the native buffer, then the device
    ///
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        let had_buffer = self.buffer.take().is_some();
        self.locked = None;
        let had_device = self.device.take().is_some();
        if had_buffer || had_device {
            info!("[STREAM {}] Closed", self.id);
        }
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("chunk_size", &self.chunk_size)
            .field("num_chunks", &self.num_chunks)
            .field("buffer_kind", &self.buffer_kind)
            .field("wait_strategy", &self.wait_strategy)
            .field("playing", &self.playing)
            .field("locked", &self.locked_chunk())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Writable view of the chunk handed to the producer
///
/// Borrows the stream, so the stream cannot be used again until the view is
/// dropped; commit it with [`AudioStream::commit_chunk`].
#[derive(Debug)]
pub struct LockedChunk<'a> {
    index: usize,
    bytes: &'a mut [u8],
}

impl<'a> LockedChunk<'a> {
    pub(crate) fn new(index: usize, bytes: &'a mut [u8]) -> Self {
        Self { index, bytes }
    }

    /// Ring index of the locked chunk
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn into_slice(self) -> &'a mut [u8] {
        self.bytes
    }
}

impl Deref for LockedChunk<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl DerefMut for LockedChunk<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}
