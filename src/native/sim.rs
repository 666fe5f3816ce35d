//! Simulated sound hardware
//!
//! A deterministic stand-in for a platform sound API. The play cursor is
//! derived from a shared [`Clock`], so with a [`ManualClock`](crate::clock::ManualClock)
//! every sleep taken by the engine moves playback forward by exactly that
//! much. Written chunks only reach "hardware memory" on unlock, which is what
//! the inspection methods report.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::debug;
use serde::Serialize;

use super::{
    BufferCaps, BufferDesc, BufferKind, BufferStatus, CooperativeLevel, CursorPosition,
    LockRange, LockedSpans, NativeError, NativeResult, SoundBuffer, SoundDevice, SoundSystem,
    Span, MAX_BUFFER_BYTES, MIN_BUFFER_BYTES,
};
use crate::clock::Clock;
use crate::format::WaveFormat;

/// Fill pattern for freshly allocated buffer memory
const UNINITIALIZED: u8 = 0x5A;

/// Playback rate used before any format has been applied (16-bit stereo 44.1kHz)
const DEFAULT_RATE: u64 = 176_400;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Resource and call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimStats {
    pub devices_created: u32,
    pub devices_released: u32,
    pub buffers_created: u32,
    pub buffers_released: u32,
    pub primary_buffers_created: u32,
    pub play_calls: u32,
    pub stop_calls: u32,
    pub status_polls: u64,
    pub locks: u64,
    pub unlocks: u64,
    pub thread_priority_requests: u32,
}

impl SimStats {
    pub fn live_devices(&self) -> u32 {
        self.devices_created - self.devices_released
    }

    pub fn live_buffers(&self) -> u32 {
        self.buffers_created - self.buffers_released
    }
}

/// One unlock that reached hardware memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitRecord {
    pub buffer: u64,
    pub offset: u32,
    pub len: u32,
    pub at: Duration,
}

#[derive(Debug)]
struct Settings {
    primary_capacity: Option<u32>,
    playback_rate: Option<u32>,
    stop_latency: u32,
    position_notify: bool,
}

#[derive(Debug, Default)]
struct Faults {
    device_creation: bool,
    buffer_creation: bool,
    failing_locks: u32,
    failing_plays: u32,
    failing_positions: u32,
    failing_unlocks: u32,
    unresponsive_stop: bool,
    /// Buffers with a pending interrupt
    interrupted: HashSet<u64>,
}

#[derive(Debug)]
struct HwState {
    settings: Settings,
    faults: Faults,
    stats: SimStats,
    next_buffer_id: u64,
    memory: HashMap<u64, Vec<u8>>,
    latest_buffer: Option<u64>,
    live_buffers: HashSet<u64>,
    commits: Vec<CommitRecord>,
}

/// Consume one pending failure from a countdown
fn take_fault(remaining: &mut u32) -> bool {
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

/// Simulated sound system; clones share the same hardware
#[derive(Clone)]
pub struct SimulatedHardware {
    state: Arc<Mutex<HwState>>,
    clock: Arc<dyn Clock>,
}

impl SimulatedHardware {
    /// Hardware with no primary buffer, driven by `clock`
    pub fn new<C: Clock + 'static>(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(HwState {
                settings: Settings {
                    primary_capacity: None,
                    playback_rate: None,
                    stop_latency: 0,
                    position_notify: true,
                },
                faults: Faults::default(),
                stats: SimStats::default(),
                next_buffer_id: 1,
                memory: HashMap::new(),
                latest_buffer: None,
                live_buffers: HashSet::new(),
                commits: Vec::new(),
            })),
            clock: Arc::new(clock),
        }
    }

    fn state(&self) -> MutexGuard<'_, HwState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer a primary buffer of `bytes` bytes
    pub fn with_primary_capacity(self, bytes: u32) -> Self {
        self.state().settings.primary_capacity = Some(bytes);
        self
    }

    /// Consume buffer bytes at a fixed rate instead of the format's rate
    pub fn with_playback_rate(self, bytes_per_sec: u32) -> Self {
        self.state().settings.playback_rate = Some(bytes_per_sec);
        self
    }

    /// Keep reporting "playing" for `polls` status queries after a stop
    pub fn with_stop_latency(self, polls: u32) -> Self {
        self.state().settings.stop_latency = polls;
        self
    }

    /// Refuse to arm position notifications on any buffer
    pub fn without_position_notify(self) -> Self {
        self.state().settings.position_notify = false;
        self
    }

    pub fn fail_device_creation(&self, fail: bool) {
        self.state().faults.device_creation = fail;
    }

    pub fn fail_buffer_creation(&self, fail: bool) {
        self.state().faults.buffer_creation = fail;
    }

    pub fn fail_next_locks(&self, count: u32) {
        self.state().faults.failing_locks = count;
    }

    pub fn fail_next_plays(&self, count: u32) {
        self.state().faults.failing_plays = count;
    }

    pub fn fail_next_positions(&self, count: u32) {
        self.state().faults.failing_positions = count;
    }

    /// Make stop requests a no-op so the buffer never reports stopped
    pub fn set_unresponsive_stop(&self, unresponsive: bool) {
        self.state().faults.unresponsive_stop = unresponsive;
    }

    pub fn fail_next_unlocks(&self, count: u32) {
        self.state().faults.failing_unlocks = count;
    }

    /// Halt every live buffer as an underrun would
    pub fn interrupt_playback(&self) {
        let mut state = self.state();
        let live: Vec<u64> = state.live_buffers.iter().copied().collect();
        state.faults.interrupted.extend(live);
    }

    pub fn stats(&self) -> SimStats {
        self.state().stats
    }

    /// Hardware memory of the most recently created buffer
    ///
    /// Contents stay readable after the buffer is released.
    pub fn buffer_contents(&self) -> Option<Vec<u8>> {
        let state = self.state();
        state
            .latest_buffer
            .and_then(|id| state.memory.get(&id).cloned())
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.state().commits.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

impl SoundSystem for SimulatedHardware {
    fn create_device(&self) -> NativeResult<Box<dyn SoundDevice>> {
        let mut state = self.state();
        if state.faults.device_creation {
            return Err(NativeError::NoDriver);
        }
        state.stats.devices_created += 1;
        drop(state);

        Ok(Box::new(SimulatedDevice {
            hw: self.clone(),
            level: CooperativeLevel::Normal,
        }))
    }

    fn raise_thread_priority(&self) {
        self.state().stats.thread_priority_requests += 1;
    }
}

struct SimulatedDevice {
    hw: SimulatedHardware,
    level: CooperativeLevel,
}

impl SoundDevice for SimulatedDevice {
    fn set_cooperative_level(&mut self, level: CooperativeLevel) -> NativeResult<()> {
        self.level = level;
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> NativeResult<Box<dyn SoundBuffer>> {
        let mut state = self.hw.state();
        if state.faults.buffer_creation {
            return Err(NativeError::OutOfMemory);
        }

        let size = match desc.kind {
            BufferKind::Primary => {
                let capacity = state
                    .settings
                    .primary_capacity
                    .ok_or(NativeError::Unsupported)?;
                if self.level != CooperativeLevel::WritePrimary {
                    return Err(NativeError::InvalidCall);
                }
                capacity
            }
            BufferKind::Secondary => {
                if !(MIN_BUFFER_BYTES..=MAX_BUFFER_BYTES).contains(&desc.bytes) {
                    return Err(NativeError::InvalidCall);
                }
                desc.bytes
            }
        };

        let id = state.next_buffer_id;
        state.next_buffer_id += 1;
        state.memory.insert(id, vec![UNINITIALIZED; size as usize]);
        state.latest_buffer = Some(id);
        state.live_buffers.insert(id);
        state.stats.buffers_created += 1;
        if desc.kind == BufferKind::Primary {
            state.stats.primary_buffers_created += 1;
        }
        let rate_override = state.settings.playback_rate;
        let notify_capable = desc.position_notify && state.settings.position_notify;
        drop(state);

        debug!("sim: created {:?} buffer #{} ({} bytes)", desc.kind, id, size);

        Ok(Box::new(SimulatedBuffer {
            hw: self.hw.clone(),
            id,
            size,
            staging: vec![UNINITIALIZED; size as usize],
            format: desc.format,
            rate_override,
            volume: 0,
            notify_capable,
            notify: Vec::new(),
            locked: None,
            playing: false,
            looping: false,
            started_at: Duration::ZERO,
            base: 0,
            stop_pending: 0,
        }))
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.hw.state().stats.devices_released += 1;
    }
}

struct SimulatedBuffer {
    hw: SimulatedHardware,
    id: u64,
    size: u32,
    staging: Vec<u8>,
    format: Option<WaveFormat>,
    rate_override: Option<u32>,
    volume: i32,
    notify_capable: bool,
    notify: Vec<u32>,
    locked: Option<LockedSpans>,
    playing: bool,
    looping: bool,
    /// Clock reading when playback last (re)started
    started_at: Duration,
    /// Absolute bytes played before `started_at`
    base: u64,
    /// Status polls left that still report "playing" after a stop
    stop_pending: u32,
}

impl SimulatedBuffer {
    fn rate(&self) -> u64 {
        self.rate_override
            .map(u64::from)
            .or_else(|| self.format.map(|f| u64::from(f.avg_bytes_per_sec)))
            .filter(|rate| *rate > 0)
            .unwrap_or(DEFAULT_RATE)
    }

    /// Total bytes consumed since the buffer was created
    fn played_bytes(&self) -> u64 {
        if !self.playing {
            return self.base;
        }
        let elapsed = self.hw.clock.now().saturating_sub(self.started_at);
        let advanced = elapsed.as_nanos() * u128::from(self.rate()) / NANOS_PER_SEC;
        let played = self.base + advanced as u64;
        if self.looping {
            played
        } else {
            played.min(u64::from(self.size))
        }
    }

    fn is_audible(&self) -> bool {
        self.playing && (self.looping || self.played_bytes() < u64::from(self.size))
    }

    fn halt(&mut self) {
        self.base = self.played_bytes();
        self.playing = false;
    }

    fn check_interrupt(&mut self) {
        let interrupted = self.hw.state().faults.interrupted.remove(&self.id);
        if interrupted && self.playing {
            debug!("sim: buffer #{} playback interrupted", self.id);
            self.halt();
        }
    }
}

impl SoundBuffer for SimulatedBuffer {
    fn caps(&self) -> NativeResult<BufferCaps> {
        Ok(BufferCaps {
            buffer_bytes: self.size,
        })
    }

    fn set_format(&mut self, format: &WaveFormat) -> NativeResult<()> {
        self.format = Some(*format);
        Ok(())
    }

    fn set_volume(&mut self, volume: i32) -> NativeResult<()> {
        self.volume = volume;
        Ok(())
    }

    fn lock(&mut self, range: LockRange) -> NativeResult<LockedSpans> {
        {
            let mut state = self.hw.state();
            state.stats.locks += 1;
            if take_fault(&mut state.faults.failing_locks) {
                return Err(NativeError::BufferLost);
            }
        }
        if self.locked.is_some() {
            return Err(NativeError::InvalidCall);
        }

        let (offset, len) = match range {
            LockRange::EntireBuffer => (0, self.size),
            LockRange::Range { offset, len } => (offset, len),
        };
        if len == 0 || len > self.size || offset >= self.size {
            return Err(NativeError::InvalidCall);
        }

        let first_len = len.min(self.size - offset);
        let spans = LockedSpans {
            first: Span {
                offset,
                len: first_len,
            },
            second: (first_len < len).then(|| Span {
                offset: 0,
                len: len - first_len,
            }),
        };
        self.locked = Some(spans);
        Ok(spans)
    }

    fn span_mut(&mut self, span: Span) -> &mut [u8] {
        let granted = self
            .locked
            .map(|spans| spans.iter().any(|s| s == span))
            .unwrap_or(false);
        if !granted {
            return &mut [];
        }
        let start = span.offset as usize;
        &mut self.staging[start..start + span.len as usize]
    }

    fn unlock(&mut self, spans: LockedSpans) -> NativeResult<()> {
        if self.locked != Some(spans) {
            return Err(NativeError::InvalidCall);
        }
        self.locked = None;

        let at = self.hw.clock.now();
        let mut state = self.hw.state();
        state.stats.unlocks += 1;
        // A lost buffer drops the staged data
        if take_fault(&mut state.faults.failing_unlocks) {
            return Err(NativeError::BufferLost);
        }
        for span in spans.iter() {
            let range = span.offset as usize..(span.offset + span.len) as usize;
            if let Some(memory) = state.memory.get_mut(&self.id) {
                memory[range.clone()].copy_from_slice(&self.staging[range]);
            }
            state.commits.push(CommitRecord {
                buffer: self.id,
                offset: span.offset,
                len: span.len,
                at,
            });
        }
        Ok(())
    }

    fn current_position(&mut self) -> NativeResult<CursorPosition> {
        self.check_interrupt();
        if take_fault(&mut self.hw.state().faults.failing_positions) {
            return Err(NativeError::BufferLost);
        }
        let play = (self.played_bytes() % u64::from(self.size)) as u32;
        Ok(CursorPosition { play, write: play })
    }

    fn play(&mut self, looping: bool) -> NativeResult<()> {
        {
            let mut state = self.hw.state();
            state.stats.play_calls += 1;
            if take_fault(&mut state.faults.failing_plays) {
                return Err(NativeError::BufferLost);
            }
        }
        if self.playing {
            self.base = self.played_bytes();
        } else if !looping {
            self.base %= u64::from(self.size);
        }
        self.started_at = self.hw.clock.now();
        self.playing = true;
        self.looping = looping;
        self.stop_pending = 0;
        Ok(())
    }

    fn stop(&mut self) -> NativeResult<()> {
        let (unresponsive, latency) = {
            let mut state = self.hw.state();
            state.stats.stop_calls += 1;
            (state.faults.unresponsive_stop, state.settings.stop_latency)
        };
        if unresponsive {
            return Ok(());
        }
        if self.playing {
            self.halt();
            self.stop_pending = latency;
        }
        Ok(())
    }

    fn status(&mut self) -> NativeResult<BufferStatus> {
        self.check_interrupt();
        self.hw.state().stats.status_polls += 1;
        if self.stop_pending > 0 {
            self.stop_pending -= 1;
            return Ok(BufferStatus {
                playing: true,
                looping: self.looping,
            });
        }
        Ok(BufferStatus {
            playing: self.is_audible(),
            looping: self.looping,
        })
    }

    fn set_notification_positions(&mut self, offsets: &[u32]) -> NativeResult<()> {
        if !self.notify_capable {
            return Err(NativeError::ControlUnavailable);
        }
        if offsets.iter().any(|&offset| offset >= self.size) {
            return Err(NativeError::InvalidCall);
        }
        let mut offsets = offsets.to_vec();
        offsets.sort_unstable();
        offsets.dedup();
        self.notify = offsets;
        Ok(())
    }

    fn wait_notification(&mut self, timeout: Option<Duration>) -> NativeResult<bool> {
        self.check_interrupt();
        if !self.is_audible() {
            if let Some(timeout) = timeout {
                self.hw.clock.sleep(timeout);
            }
            return Ok(false);
        }

        let size = u64::from(self.size);
        let played = self.played_bytes();
        let next = self
            .notify
            .iter()
            .map(|&offset| {
                let offset = u64::from(offset);
                if played < offset {
                    offset
                } else {
                    ((played - offset) / size + 1) * size + offset
                }
            })
            .min();
        let Some(next) = next else {
            return Err(NativeError::InvalidCall);
        };

        let rate = u128::from(self.rate());
        let nanos = (u128::from(next - played) * NANOS_PER_SEC + rate - 1) / rate;
        let wait = Duration::from_nanos(nanos as u64);

        match timeout {
            Some(timeout) if wait > timeout => {
                self.hw.clock.sleep(timeout);
                Ok(false)
            }
            _ => {
                self.hw.clock.sleep(wait);
                Ok(true)
            }
        }
    }
}

impl Drop for SimulatedBuffer {
    fn drop(&mut self) {
        let mut state = self.hw.state();
        state.stats.buffers_released += 1;
        state.live_buffers.remove(&self.id);
        state.faults.interrupted.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::format::AudioFormat;

    fn secondary(hw: &SimulatedHardware, bytes: u32) -> (Box<dyn SoundDevice>, Box<dyn SoundBuffer>) {
        let mut device = hw.create_device().unwrap();
        let format = AudioFormat::new(16, 2, 48000).unwrap().wave_format();
        let buffer = device
            .create_buffer(&BufferDesc::secondary(bytes, format, true))
            .unwrap();
        (device, buffer)
    }

    #[test]
    fn test_cursor_follows_clock() {
        let clock = ManualClock::new();
        let hw = SimulatedHardware::new(clock.clone()).with_playback_rate(1000);
        let (_device, mut buffer) = secondary(&hw, 100);

        assert_eq!(buffer.current_position().unwrap().play, 0);
        clock.advance(Duration::from_millis(50));
        // Not playing yet
        assert_eq!(buffer.current_position().unwrap().play, 0);

        buffer.play(true).unwrap();
        clock.advance(Duration::from_millis(30));
        assert_eq!(buffer.current_position().unwrap().play, 30);
        clock.advance(Duration::from_millis(90));
        assert_eq!(buffer.current_position().unwrap().play, 20);
    }

    #[test]
    fn test_lock_wraps_into_two_spans() {
        let hw = SimulatedHardware::new(ManualClock::new());
        let (_device, mut buffer) = secondary(&hw, 100);

        let spans = buffer
            .lock(LockRange::Range {
                offset: 80,
                len: 40,
            })
            .unwrap();
        assert_eq!(spans.first, Span { offset: 80, len: 20 });
        assert_eq!(spans.second, Some(Span { offset: 0, len: 20 }));
        assert_eq!(spans.total_len(), 40);
    }

    #[test]
    fn test_second_lock_rejected() {
        let hw = SimulatedHardware::new(ManualClock::new());
        let (_device, mut buffer) = secondary(&hw, 100);

        let spans = buffer.lock(LockRange::EntireBuffer).unwrap();
        assert_eq!(
            buffer.lock(LockRange::EntireBuffer),
            Err(NativeError::InvalidCall)
        );
        buffer.unlock(spans).unwrap();
        assert!(buffer.lock(LockRange::EntireBuffer).is_ok());
    }

    #[test]
    fn test_unlock_commits_to_memory() {
        let hw = SimulatedHardware::new(ManualClock::new());
        let (_device, mut buffer) = secondary(&hw, 8);

        let spans = buffer
            .lock(LockRange::Range { offset: 4, len: 4 })
            .unwrap();
        buffer.span_mut(spans.first).fill(0x11);
        // Not visible until unlocked
        assert_eq!(hw.buffer_contents().unwrap(), vec![UNINITIALIZED; 8]);

        buffer.unlock(spans).unwrap();
        let contents = hw.buffer_contents().unwrap();
        assert_eq!(&contents[..4], &[UNINITIALIZED; 4]);
        assert_eq!(&contents[4..], &[0x11; 4]);
        assert_eq!(hw.commits().len(), 1);
    }

    #[test]
    fn test_span_outside_lock_is_empty() {
        let hw = SimulatedHardware::new(ManualClock::new());
        let (_device, mut buffer) = secondary(&hw, 8);
        assert!(buffer.span_mut(Span { offset: 0, len: 4 }).is_empty());
    }

    #[test]
    fn test_stop_latency() {
        let hw = SimulatedHardware::new(ManualClock::new()).with_stop_latency(2);
        let (_device, mut buffer) = secondary(&hw, 100);

        buffer.play(true).unwrap();
        buffer.stop().unwrap();
        assert!(buffer.status().unwrap().playing);
        assert!(buffer.status().unwrap().playing);
        assert!(!buffer.status().unwrap().playing);
    }

    #[test]
    fn test_interrupt_halts_playback() {
        let hw = SimulatedHardware::new(ManualClock::new());
        let (_device, mut buffer) = secondary(&hw, 100);

        buffer.play(true).unwrap();
        assert!(buffer.status().unwrap().playing);
        hw.interrupt_playback();
        assert!(!buffer.status().unwrap().playing);
    }

    #[test]
    fn test_interrupt_reaches_every_live_buffer() {
        let hw = SimulatedHardware::new(ManualClock::new());
        let (_device_a, mut a) = secondary(&hw, 100);
        let (_device_b, mut b) = secondary(&hw, 100);

        a.play(true).unwrap();
        b.play(true).unwrap();
        hw.interrupt_playback();

        // The first buffer to poll does not swallow the other's interrupt
        assert!(!a.status().unwrap().playing);
        assert!(!b.status().unwrap().playing);

        a.play(true).unwrap();
        assert!(a.status().unwrap().playing);
    }

    #[test]
    fn test_interrupt_skips_released_buffers() {
        let hw = SimulatedHardware::new(ManualClock::new());
        let (_old_device, old) = secondary(&hw, 100);
        drop(old);
        hw.interrupt_playback();

        let (_device, mut buffer) = secondary(&hw, 100);
        buffer.play(true).unwrap();
        assert!(buffer.status().unwrap().playing);
    }

    #[test]
    fn test_failed_unlock_discards_data() {
        let hw = SimulatedHardware::new(ManualClock::new());
        let (_device, mut buffer) = secondary(&hw, 100);

        let spans = buffer.lock(LockRange::EntireBuffer).unwrap();
        buffer.span_mut(spans.first).fill(0x33);
        hw.fail_next_unlocks(1);
        assert_eq!(buffer.unlock(spans), Err(NativeError::BufferLost));

        assert!(hw.buffer_contents().unwrap().iter().all(|&b| b != 0x33));
        // The lock is gone either way
        assert!(buffer.lock(LockRange::EntireBuffer).is_ok());
    }

    #[test]
    fn test_notification_wait_sleeps_to_next_offset() {
        let clock = ManualClock::new();
        let hw = SimulatedHardware::new(clock.clone()).with_playback_rate(1000);
        let (_device, mut buffer) = secondary(&hw, 100);

        buffer.set_notification_positions(&[0, 50]).unwrap();
        buffer.play(true).unwrap();

        assert!(buffer.wait_notification(None).unwrap());
        assert_eq!(clock.now(), Duration::from_millis(50));
        assert!(buffer.wait_notification(None).unwrap());
        assert_eq!(clock.now(), Duration::from_millis(100));
        assert_eq!(buffer.current_position().unwrap().play, 0);

        assert!(!buffer
            .wait_notification(Some(Duration::from_millis(10)))
            .unwrap());
        assert_eq!(clock.now(), Duration::from_millis(110));
    }

    #[test]
    fn test_resource_counters() {
        let hw = SimulatedHardware::new(ManualClock::new());
        {
            let _pair = secondary(&hw, 100);
            let stats = hw.stats();
            assert_eq!(stats.live_devices(), 1);
            assert_eq!(stats.live_buffers(), 1);
        }
        let stats = hw.stats();
        assert_eq!(stats.devices_released, 1);
        assert_eq!(stats.buffers_released, 1);
    }

    #[test]
    fn test_primary_requires_write_primary_level() {
        let hw = SimulatedHardware::new(ManualClock::new()).with_primary_capacity(4096);
        let mut device = hw.create_device().unwrap();

        assert_eq!(
            device.create_buffer(&BufferDesc::primary(false)).err(),
            Some(NativeError::InvalidCall)
        );
        device
            .set_cooperative_level(CooperativeLevel::WritePrimary)
            .unwrap();
        let buffer = device.create_buffer(&BufferDesc::primary(false)).unwrap();
        assert_eq!(buffer.caps().unwrap().buffer_bytes, 4096);
    }
}
