//! Output Engine
//!
//! Streams fixed-size chunks into a looping native buffer:
//! - `backend`: device and buffer negotiation (open)
//! - `driver`: the wait / acquire / commit cycle
//! - `shutdown`: drain on silence and stop
//! - `stream`: the per-stream context every operation acts on

mod backend;
mod driver;
mod shutdown;
mod stream;

pub use backend::SECONDARY_CHUNKS;
pub use driver::WaitOutcome;
pub use stream::{AudioStream, LockedChunk, StreamInfo};
