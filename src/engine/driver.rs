//! Playback Driver
//!
//! Owns the wait/fill/play cycle. The stream is either IDLE (no chunk locked)
//! or LOCKED (one chunk held by the producer):
//!
//! ```text
//! IDLE --wait_for_slot--> IDLE --acquire_next_chunk--> LOCKED --commit_chunk--> IDLE
//! ```
//!
//! Steady-state failures never tear the stream down. Waits report a
//! [`WaitOutcome`]; acquire and commit return errors the caller may skip.

use std::fmt;

use log::{debug, warn};

use super::stream::{AudioStream, LockedChunk, LockedRegion};
use crate::config::WaitStrategy;
use crate::error::{Result, StreamError};
use crate::native::{LockRange, NativeError, SoundBuffer};

/// How a call to [`AudioStream::wait_for_slot`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Playback moved into the next chunk; one chunk is free to fill
    SlotReady,
    /// Playback had stopped and could not be restarted
    PlaybackRestartFailed,
    /// The hardware cursor could not be read or waited on
    PositionUnavailable,
    /// The configured wait bound ran out first
    TimedOut,
    /// The stream has been closed
    NotOpen,
}

impl WaitOutcome {
    pub fn is_ready(self) -> bool {
        self == WaitOutcome::SlotReady
    }
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitOutcome::SlotReady => write!(f, "slot ready"),
            WaitOutcome::PlaybackRestartFailed => write!(f, "playback restart failed"),
            WaitOutcome::PositionUnavailable => write!(f, "position unavailable"),
            WaitOutcome::TimedOut => write!(f, "timed out"),
            WaitOutcome::NotOpen => write!(f, "stream not open"),
        }
    }
}

/// Chunk index under the hardware play cursor
fn playing_chunk(
    buffer: &mut dyn SoundBuffer,
    chunk_size: u32,
    num_chunks: usize,
) -> std::result::Result<usize, NativeError> {
    let position = buffer.current_position()?;
    Ok((position.play / chunk_size) as usize % num_chunks)
}

impl AudioStream {
    /// Block until playback leaves the chunk recorded as playing
    pub fn wait_for_slot(&mut self) -> WaitOutcome {
        match self.wait_strategy {
            WaitStrategy::Polling => self.wait_polling(),
            WaitStrategy::Event => self.wait_event(),
        }
    }

    fn wait_polling(&mut self) -> WaitOutcome {
        let Some(buffer) = self.buffer.as_deref_mut() else {
            return WaitOutcome::NotOpen;
        };

        let mut cursor = match playing_chunk(buffer, self.chunk_size, self.num_chunks) {
            Ok(cursor) => cursor,
            Err(e) => {
                debug!("[STREAM {}] GetCurrentPosition failed: {}", self.id, e);
                return WaitOutcome::PositionUnavailable;
            }
        };

        let mut iterations = 0u32;
        while cursor == self.playing {
            if let Some(max) = self.timing.max_poll_iterations {
                if iterations >= max {
                    warn!(
                        "[STREAM {}] Cursor stuck in chunk {} after {} polls",
                        self.id, cursor, iterations
                    );
                    return WaitOutcome::TimedOut;
                }
            }
            iterations += 1;

            self.clock.sleep(self.timing.poll_interval);

            // Restart a buffer that stopped on its own (e.g. after an underrun)
            if let Ok(status) = buffer.status() {
                if !status.playing {
                    match buffer.play(true) {
                        Ok(()) => {
                            debug!("[STREAM {}] Looping playback (re)started", self.id);
                            continue;
                        }
                        Err(source) => {
                            warn!(
                                "[STREAM {}] {}",
                                self.id,
                                StreamError::PlayFailed { source }
                            );
                            return WaitOutcome::PlaybackRestartFailed;
                        }
                    }
                }
            }

            cursor = match playing_chunk(buffer, self.chunk_size, self.num_chunks) {
                Ok(cursor) => cursor,
                Err(e) => {
                    warn!("[STREAM {}] GetCurrentPosition failed: {}", self.id, e);
                    return WaitOutcome::PositionUnavailable;
                }
            };
        }

        WaitOutcome::SlotReady
    }

    fn wait_event(&mut self) -> WaitOutcome {
        let Some(buffer) = self.buffer.as_deref_mut() else {
            return WaitOutcome::NotOpen;
        };

        if let Ok(status) = buffer.status() {
            if !status.playing {
                if let Err(source) = buffer.play(true) {
                    warn!("[STREAM {}] {}", self.id, StreamError::PlayFailed { source });
                    return WaitOutcome::PlaybackRestartFailed;
                }
                debug!("[STREAM {}] Looping playback (re)started", self.id);
            }
        }

        match buffer.wait_notification(self.timing.event_timeout) {
            Ok(true) => WaitOutcome::SlotReady,
            Ok(false) => {
                debug!("[STREAM {}] Position notification timed out", self.id);
                WaitOutcome::TimedOut
            }
            Err(e) => {
                warn!("[STREAM {}] Notification wait failed: {}", self.id, e);
                WaitOutcome::PositionUnavailable
            }
        }
    }

    /// Lock the chunk one ahead of the play cursor for writing
    ///
    /// Records the chunk under the cursor as the new "now playing" index.
    pub fn acquire_next_chunk(&mut self) -> Result<LockedChunk<'_>> {
        if let Some(region) = self.locked {
            return Err(StreamError::LockOutstanding {
                chunk: region.chunk,
            });
        }
        let buffer = self.buffer.as_deref_mut().ok_or(StreamError::NotOpen)?;

        let playing = playing_chunk(buffer, self.chunk_size, self.num_chunks).map_err(
            |source| StreamError::LockFailed {
                chunk: (self.playing + 1) % self.num_chunks,
                source,
            },
        )?;
        self.playing = playing;

        let next = (playing + 1) % self.num_chunks;
        let spans = buffer
            .lock(LockRange::Range {
                offset: next as u32 * self.chunk_size,
                len: self.chunk_size,
            })
            .map_err(|source| StreamError::LockFailed {
                chunk: next,
                source,
            })?;

        if spans.first.len != self.chunk_size {
            // Chunks never straddle the end of the ring
            if let Err(e) = buffer.unlock(spans) {
                debug!("[STREAM {}] Unlock after bad lock failed: {}", self.id, e);
            }
            return Err(StreamError::LockFailed {
                chunk: next,
                source: NativeError::InvalidCall,
            });
        }

        self.locked = Some(LockedRegion { chunk: next, spans });
        let bytes = buffer.span_mut(spans.first);
        Ok(LockedChunk::new(next, bytes))
    }

    /// Hand the locked chunk back to the hardware; no-op when nothing is locked
    pub fn commit_chunk(&mut self) -> Result<()> {
        let Some(region) = self.locked.take() else {
            return Ok(());
        };
        let Some(buffer) = self.buffer.as_deref_mut() else {
            return Ok(());
        };
        buffer
            .unlock(region.spans)
            .map_err(|e| StreamError::native("Unlock", e))
    }
}
