//! Audio Device Callback Table
//!
//! [`AudioDevice`] is the small set of hooks a generic audio layer drives to
//! feed a backend, and [`run_audio`] is that producer loop. [`DirectOutput`]
//! implements the hooks on top of the chunked output engine.
//!
//! The hooks never fail mid-stream: steady-state errors are logged and the
//! affected chunk is skipped, so audio may glitch but never stops the caller.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::EngineOptions;
use crate::engine::{AudioStream, StreamInfo};
use crate::error::Result;
use crate::format::AudioSpec;
use crate::native::SoundSystem;

/// Consecutive unavailable buffers after which [`run_audio`] gives up
pub const MAX_CONSECUTIVE_SKIPS: u32 = 100;

/// Backend hooks driven by the producer loop
pub trait AudioDevice: Send {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Open the device for `spec`, filling in its derived fields
    fn open_audio(&mut self, spec: &mut AudioSpec) -> Result<()>;

    /// Called once on the producer thread before the first wait
    fn thread_init(&mut self) {}

    /// Block until a fragment can be written
    fn wait_audio(&mut self);

    /// The fragment to fill next, if one could be obtained
    fn get_audio_buf(&mut self) -> Option<&mut [u8]>;

    /// Hand the filled fragment to the hardware
    fn play_audio(&mut self);

    /// Let queued audio finish playing
    fn wait_done(&mut self);

    fn close_audio(&mut self);
}

/// Totals reported by [`run_audio`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub chunks_played: u64,
    pub chunks_skipped: u64,
}

/// Drive `device` until `fill` returns `false`, then drain it
///
/// `fill` receives each fragment to write and returns whether more audio
/// follows. The device must already be open.
pub fn run_audio<F>(device: &mut dyn AudioDevice, mut fill: F) -> RunStats
where
    F: FnMut(&mut [u8]) -> bool,
{
    let mut stats = RunStats::default();
    let mut consecutive_skips = 0u32;

    device.thread_init();
    loop {
        device.wait_audio();
        match device.get_audio_buf() {
            Some(buf) => {
                let more = fill(buf);
                device.play_audio();
                stats.chunks_played += 1;
                consecutive_skips = 0;
                if !more {
                    break;
                }
            }
            None => {
                stats.chunks_skipped += 1;
                consecutive_skips += 1;
                if consecutive_skips >= MAX_CONSECUTIVE_SKIPS {
                    warn!(
                        "{}: no buffer for {} consecutive cycles, stopping",
                        device.name(),
                        consecutive_skips
                    );
                    break;
                }
            }
        }
    }
    device.wait_done();

    info!(
        "{}: played {} chunks, skipped {}",
        device.name(),
        stats.chunks_played,
        stats.chunks_skipped
    );
    stats
}

/// Chunked output straight into a native sound buffer
pub struct DirectOutput<S: SoundSystem + Send> {
    system: S,
    options: EngineOptions,
    clock: Arc<dyn Clock>,
    stream: Option<AudioStream>,
}

impl<S: SoundSystem + Send> DirectOutput<S> {
    pub fn new(system: S, options: EngineOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            system,
            options,
            clock,
            stream: None,
        }
    }

    pub fn stream(&self) -> Option<&AudioStream> {
        self.stream.as_ref()
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.stream.as_ref().map(AudioStream::info)
    }
}

impl<S: SoundSystem + Send> AudioDevice for DirectOutput<S> {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn description(&self) -> &'static str {
        "Chunked output to a looping native sound buffer"
    }

    fn open_audio(&mut self, spec: &mut AudioSpec) -> Result<()> {
        self.close_audio();

        let format = spec.calculate()?;
        let stream = AudioStream::open(
            &self.system,
            format,
            spec.size,
            &self.options,
            Arc::clone(&self.clock),
        )?;
        self.stream = Some(stream);
        Ok(())
    }

    fn thread_init(&mut self) {
        self.system.raise_thread_priority();
    }

    fn wait_audio(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            let outcome = stream.wait_for_slot();
            if !outcome.is_ready() {
                debug!("[STREAM {}] Wait ended: {}", stream.id(), outcome);
            }
        }
    }

    fn get_audio_buf(&mut self) -> Option<&mut [u8]> {
        let stream = self.stream.as_mut()?;
        match stream.acquire_next_chunk() {
            Ok(chunk) => Some(chunk.into_slice()),
            Err(e) => {
                warn!("Skipping chunk: {}", e);
                None
            }
        }
    }

    fn play_audio(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.commit_chunk() {
                warn!("[STREAM {}] Commit failed: {}", stream.id(), e);
            }
        }
    }

    fn wait_done(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.drain() {
                warn!("[STREAM {}] Drain failed: {}", stream.id(), e);
            }
        }
    }

    fn close_audio(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }
}

impl<S: SoundSystem + Send> Drop for DirectOutput<S> {
    fn drop(&mut self) {
        self.close_audio();
    }
}
