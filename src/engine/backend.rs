//! Device Backend
//!
//! Opens a native output device, negotiates the buffer and lays it out as a
//! ring of equally sized chunks.
//!
//! Buffer selection:
//! - Primary: hardware-resident, usable only when its capacity splits evenly
//!   into at least two chunks of the requested size
//! - Secondary: exactly two chunks, pre-filled with silence

use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use super::stream::{AudioStream, Timing};
use crate::clock::Clock;
use crate::config::{EngineOptions, WaitStrategy};
use crate::error::{Result, StreamError};
use crate::format::{AudioFormat, WaveFormat};
use crate::native::{
    BufferDesc, BufferKind, CooperativeLevel, LockRange, SoundBuffer, SoundDevice, SoundSystem,
    MAX_BUFFER_BYTES, MIN_BUFFER_BYTES, VOLUME_MAX,
};

/// Chunk count of a secondary buffer
pub const SECONDARY_CHUNKS: usize = 2;

/// Try to claim the hardware primary buffer; returns it with its chunk count
fn create_primary(
    device: &mut dyn SoundDevice,
    wave: &WaveFormat,
    chunk_size: u32,
    position_notify: bool,
) -> Result<(Box<dyn SoundBuffer>, usize)> {
    device
        .set_cooperative_level(CooperativeLevel::WritePrimary)
        .map_err(|e| StreamError::native("SetCooperativeLevel", e))?;

    let mut buffer = device
        .create_buffer(&BufferDesc::primary(position_notify))
        .map_err(|e| StreamError::native("CreateSoundBuffer", e))?;

    let capacity = buffer
        .caps()
        .map_err(|e| StreamError::native("GetCaps", e))?
        .buffer_bytes;
    if chunk_size > capacity || capacity % chunk_size != 0 {
        return Err(StreamError::BufferSizeInvalid {
            reason: format!(
                "primary buffer size is {}, cannot break it into chunks of {} bytes",
                capacity, chunk_size
            ),
        });
    }
    let num_chunks = (capacity / chunk_size) as usize;
    if num_chunks < SECONDARY_CHUNKS {
        return Err(StreamError::BufferSizeInvalid {
            reason: format!(
                "primary buffer of {} bytes holds fewer than {} chunks",
                capacity, SECONDARY_CHUNKS
            ),
        });
    }

    buffer
        .set_format(wave)
        .map_err(|e| StreamError::native("SetFormat", e))?;

    Ok((buffer, num_chunks))
}

/// Create a two-chunk software buffer filled with silence
fn create_secondary(
    device: &mut dyn SoundDevice,
    wave: &WaveFormat,
    chunk_size: u32,
    silence: u8,
    position_notify: bool,
) -> Result<(Box<dyn SoundBuffer>, usize)> {
    let chunks = SECONDARY_CHUNKS as u32;
    let total = chunk_size
        .checked_mul(chunks)
        .filter(|total| (MIN_BUFFER_BYTES..=MAX_BUFFER_BYTES).contains(total))
        .ok_or_else(|| StreamError::BufferSizeInvalid {
            reason: format!(
                "sound buffer size must be between {} and {} bytes per chunk",
                MIN_BUFFER_BYTES / chunks,
                MAX_BUFFER_BYTES / chunks
            ),
        })?;

    let mut buffer = device
        .create_buffer(&BufferDesc::secondary(total, *wave, position_notify))
        .map_err(|e| StreamError::native("CreateSoundBuffer", e))?;

    if let Err(e) = buffer.set_volume(VOLUME_MAX) {
        debug!("SetVolume failed: {}", e);
    }
    if let Err(e) = buffer.set_format(wave) {
        debug!("SetFormat failed: {}", e);
    }

    match buffer.lock(LockRange::EntireBuffer) {
        Ok(spans) => {
            for span in spans.iter() {
                buffer.span_mut(span).fill(silence);
            }
            if let Err(e) = buffer.unlock(spans) {
                warn!("Could not commit initial silence: {}", e);
            }
        }
        Err(e) => warn!("Could not lock buffer to silence it: {}", e),
    }

    Ok((buffer, SECONDARY_CHUNKS))
}

impl AudioStream {
    /// Open an output stream of `chunk_size`-byte fragments
    ///
    /// On error every native resource created along the way has already been
    /// released.
    pub fn open(
        system: &dyn SoundSystem,
        format: AudioFormat,
        chunk_size: u32,
        options: &EngineOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StreamError::BufferSizeInvalid {
                reason: "fragment size must be non-zero".to_string(),
            });
        }

        let mut device = system
            .create_device()
            .map_err(|source| StreamError::DeviceUnavailable { source })?;

        let wave = format.wave_format();
        let want_notify = options.wait_strategy == WaitStrategy::Event;

        let primary = if options.prefer_primary {
            match create_primary(device.as_mut(), &wave, chunk_size, want_notify) {
                Ok(primary) => Some(primary),
                Err(e) => {
                    debug!("Primary buffer unavailable: {}", e);
                    if let Err(e) = device.set_cooperative_level(CooperativeLevel::Normal) {
                        debug!("Could not restore normal cooperative level: {}", e);
                    }
                    None
                }
            }
        } else {
            None
        };

        let (mut buffer, num_chunks, buffer_kind) = match primary {
            Some((buffer, num_chunks)) => (buffer, num_chunks, BufferKind::Primary),
            None => {
                let (buffer, num_chunks) = create_secondary(
                    device.as_mut(),
                    &wave,
                    chunk_size,
                    format.silence(),
                    want_notify,
                )?;
                (buffer, num_chunks, BufferKind::Secondary)
            }
        };

        let wait_strategy = match options.wait_strategy {
            WaitStrategy::Polling => WaitStrategy::Polling,
            WaitStrategy::Event => {
                let offsets: Vec<u32> = (0..num_chunks as u32).map(|i| i * chunk_size).collect();
                match buffer.set_notification_positions(&offsets) {
                    Ok(()) => WaitStrategy::Event,
                    Err(e) => {
                        info!("Position notification unavailable ({}), polling instead", e);
                        WaitStrategy::Polling
                    }
                }
            }
        };

        let stream = AudioStream {
            id: Uuid::new_v4(),
            format,
            chunk_size,
            num_chunks,
            silence: format.silence(),
            buffer_kind,
            wait_strategy,
            playing: 0,
            locked: None,
            buffer: Some(buffer),
            device: Some(device),
            clock,
            timing: Timing::from(options),
        };

        info!(
            "[STREAM {}] Opened {} with {:?} buffer: {} chunks of {} bytes, {} wait",
            stream.id, format, buffer_kind, num_chunks, chunk_size, wait_strategy
        );

        Ok(stream)
    }
}
