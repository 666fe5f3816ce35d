//! Native Sound Resource Interfaces
//!
//! The output engine talks to the platform sound API only through these
//! traits:
//! - `SoundSystem` creates devices and tunes the calling thread
//! - `SoundDevice` creates primary and secondary buffers
//! - `SoundBuffer` exposes lock/unlock, cursor, play/stop and status
//!
//! `SimulatedHardware` implements all three against a shared [`Clock`](crate::clock::Clock).

mod error;
mod sim;

pub use error::{NativeError, NativeResult};
pub use sim::{CommitRecord, SimStats, SimulatedHardware};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::WaveFormat;

/// Smallest secondary buffer the native API will create
pub const MIN_BUFFER_BYTES: u32 = 4;

/// Largest secondary buffer the native API will create
pub const MAX_BUFFER_BYTES: u32 = 0x0FFF_FFFF;

/// Full volume (attenuation of zero hundredths of a decibel)
pub const VOLUME_MAX: i32 = 0;

/// Access level requested from the sound device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooperativeLevel {
    #[default]
    Normal,
    /// Required before a primary buffer can be written directly
    WritePrimary,
}

/// Where a buffer lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    /// Hardware-resident mixing buffer, sized by the hardware
    Primary,
    /// Software buffer of a caller-chosen size
    Secondary,
}

/// Creation parameters for a sound buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub kind: BufferKind,
    /// Requested size in bytes; ignored for primary buffers
    pub bytes: u32,
    pub format: Option<WaveFormat>,
    /// Request support for position notifications
    pub position_notify: bool,
}

impl BufferDesc {
    pub fn primary(position_notify: bool) -> Self {
        Self {
            kind: BufferKind::Primary,
            bytes: 0,
            format: None,
            position_notify,
        }
    }

    pub fn secondary(bytes: u32, format: WaveFormat, position_notify: bool) -> Self {
        Self {
            kind: BufferKind::Secondary,
            bytes,
            format: Some(format),
            position_notify,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCaps {
    pub buffer_bytes: u32,
}

/// Contiguous byte range within a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: u32,
    pub len: u32,
}

/// Byte range to lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRange {
    Range { offset: u32, len: u32 },
    EntireBuffer,
}

/// Spans granted by a lock
///
/// A range that runs past the end of the buffer wraps to offset zero and is
/// returned as two spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedSpans {
    pub first: Span,
    pub second: Option<Span>,
}

impl LockedSpans {
    pub fn iter(&self) -> impl Iterator<Item = Span> {
        std::iter::once(self.first).chain(self.second)
    }

    pub fn total_len(&self) -> u32 {
        self.iter().map(|span| span.len).sum()
    }
}

/// Byte offsets reported by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    /// Offset currently being played
    pub play: u32,
    /// Offset ahead of which it is safe to write
    pub write: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStatus {
    pub playing: bool,
    pub looping: bool,
}

/// Entry point to a platform sound API
pub trait SoundSystem {
    /// Create a sound output device
    fn create_device(&self) -> NativeResult<Box<dyn SoundDevice>>;

    /// Ask for the highest scheduling priority for the calling thread
    fn raise_thread_priority(&self) {}
}

/// An open sound output device; dropping it releases the device
pub trait SoundDevice: Send {
    fn set_cooperative_level(&mut self, level: CooperativeLevel) -> NativeResult<()>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> NativeResult<Box<dyn SoundBuffer>>;
}

/// A playable byte buffer; dropping it releases the buffer
pub trait SoundBuffer: Send {
    fn caps(&self) -> NativeResult<BufferCaps>;

    fn set_format(&mut self, format: &WaveFormat) -> NativeResult<()>;

    fn set_volume(&mut self, volume: i32) -> NativeResult<()>;

    /// Lock a byte range for writing
    fn lock(&mut self, range: LockRange) -> NativeResult<LockedSpans>;

    /// Writable view of a span granted by the current lock
    ///
    /// Returns an empty slice if `span` is not part of the current lock.
    fn span_mut(&mut self, span: Span) -> &mut [u8];

    /// Commit the spans returned by [`SoundBuffer::lock`]
    fn unlock(&mut self, spans: LockedSpans) -> NativeResult<()>;

    fn current_position(&mut self) -> NativeResult<CursorPosition>;

    fn play(&mut self, looping: bool) -> NativeResult<()>;

    fn stop(&mut self) -> NativeResult<()>;

    fn status(&mut self) -> NativeResult<BufferStatus>;

    /// Arm a notification for every offset in `offsets`
    fn set_notification_positions(&mut self, _offsets: &[u32]) -> NativeResult<()> {
        Err(NativeError::Unsupported)
    }

    /// Block until playback crosses an armed offset
    ///
    /// Returns `Ok(false)` if `timeout` elapsed first.
    fn wait_notification(&mut self, _timeout: Option<Duration>) -> NativeResult<bool> {
        Err(NativeError::Unsupported)
    }
}
