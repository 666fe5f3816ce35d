//! Shutdown Sequencer
//!
//! Ends a stream on silence: the chunk after the cursor is overwritten with
//! the format's silence value, allowed to play, and only then is the
//! hardware stopped.

use log::{debug, info, warn};

use super::stream::AudioStream;
use crate::error::{Result, StreamError};

impl AudioStream {
    /// Play out a final silent chunk and stop the hardware
    ///
    /// Native resources are not released here; follow with
    /// [`AudioStream::close`] (or drop the stream).
    pub fn drain(&mut self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }

        // An outstanding lock would block the silent chunk
        if let Some(chunk) = self.locked_chunk() {
            debug!("[STREAM {}] Committing chunk {} before drain", self.id, chunk);
            if let Err(e) = self.commit_chunk() {
                warn!("[STREAM {}] Could not commit chunk {}: {}", self.id, chunk, e);
            }
        }

        let silence = self.silence;
        match self.acquire_next_chunk() {
            Ok(mut chunk) => {
                chunk.fill(silence);
                let index = chunk.index();
                drop(chunk);
                match self.commit_chunk() {
                    Ok(()) => debug!("[STREAM {}] Silenced chunk {}", self.id, index),
                    Err(e) => warn!("[STREAM {}] Could not commit silence: {}", self.id, e),
                }
            }
            Err(e) => warn!("[STREAM {}] Could not silence final chunk: {}", self.id, e),
        }

        let outcome = self.wait_for_slot();
        if !outcome.is_ready() {
            debug!("[STREAM {}] Final wait ended early: {}", self.id, outcome);
        }

        let max_polls = self.timing.max_stop_polls;
        let buffer = self.buffer.as_deref_mut().ok_or(StreamError::NotOpen)?;
        buffer
            .stop()
            .map_err(|e| StreamError::native("Stop", e))?;

        let mut polls = 0u32;
        loop {
            match buffer.status() {
                Ok(status) if !status.playing => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("[STREAM {}] GetStatus failed during stop: {}", self.id, e);
                    break;
                }
            }
            polls += 1;
            if polls >= max_polls {
                warn!(
                    "[STREAM {}] Hardware still playing after {} status polls",
                    self.id, polls
                );
                return Err(StreamError::StopTimedOut { polls });
            }
            std::hint::spin_loop();
        }

        info!("[STREAM {}] Drained after {} status polls", self.id, polls);
        Ok(())
    }
}
