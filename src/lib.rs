//! streamout - Chunked Audio Output Engine
//!
//! Streams PCM audio into a looping native sound buffer laid out as a ring of
//! equally sized chunks. The producer waits for the hardware play cursor to
//! leave a chunk, fills the chunk after it, and commits it back.
//!
//! # Architecture
//!
//! - `native`: traits over the platform sound API, plus simulated hardware
//! - `engine`: open / wait / acquire / commit / drain on an [`AudioStream`]
//! - `device`: the generic device callback table and its producer loop
//!
//! ```no_run
//! use streamout::{AudioDevice, AudioSpec, DirectOutput, EngineOptions, ManualClock, SimulatedHardware};
//!
//! let hw = SimulatedHardware::new(ManualClock::new());
//! let mut out = DirectOutput::new(hw.clone(), EngineOptions::default(), hw.clock());
//! let mut spec = AudioSpec::new(16, 2, 48000, 1024);
//! out.open_audio(&mut spec).unwrap();
//! let stats = streamout::run_audio(&mut out, |buf| {
//!     buf.fill(0);
//!     false
//! });
//! assert_eq!(stats.chunks_played, 1);
//! ```

pub mod cli;
pub mod clock;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod format;
pub mod native;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineOptions, StreamConfig, WaitStrategy};
pub use device::{run_audio, AudioDevice, DirectOutput, RunStats};
pub use engine::{AudioStream, LockedChunk, StreamInfo, WaitOutcome};
pub use error::{Result, StreamError};
pub use format::{AudioFormat, AudioSpec, SampleFormat};
pub use native::{BufferKind, NativeError, SimulatedHardware};
