//! Playback Scenario Tests
//!
//! 16-bit stereo at 48kHz in 4096-byte fragments, with the simulated cursor
//! crossing one chunk every 20ms of simulated time.

use std::time::Duration;

use streamout::{
    run_audio, AudioDevice, AudioFormat, AudioSpec, AudioStream, Clock, DirectOutput,
    EngineOptions, ManualClock, SimulatedHardware, WaitOutcome, WaitStrategy,
};

const CHUNK: u32 = 4096;
const CHUNK_PERIOD: Duration = Duration::from_millis(20);
/// Bytes per second that move the cursor one chunk per period
const RATE: u32 = CHUNK * 50;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn hardware(clock: &ManualClock) -> SimulatedHardware {
    SimulatedHardware::new(clock.clone()).with_playback_rate(RATE)
}

fn open(hw: &SimulatedHardware, options: &EngineOptions) -> AudioStream {
    let format = AudioFormat::new(16, 2, 48000).unwrap();
    AudioStream::open(hw, format, CHUNK, options, hw.clock()).unwrap()
}

/// Time since the most recent chunk crossing, for playback started at `start`
fn since_crossing(now: Duration, start: Duration) -> Duration {
    let elapsed = now - start;
    let period = CHUNK_PERIOD.as_nanos();
    Duration::from_nanos((elapsed.as_nanos() % period) as u64)
}

// === Polling ===

#[test]
fn test_wait_returns_within_one_poll_of_crossing() {
    for producer_cost_ms in [0, 3, 7, 9] {
        let clock = ManualClock::new();
        let hw = hardware(&clock);
        let mut stream = open(&hw, &EngineOptions::default());

        // Playback is started by the first poll of the first wait
        let start = POLL_INTERVAL;

        for cycle in 0..25 {
            assert_eq!(stream.wait_for_slot(), WaitOutcome::SlotReady);
            let late = since_crossing(clock.now(), start);
            assert!(
                late <= POLL_INTERVAL,
                "cycle {}: returned {:?} after the crossing",
                cycle,
                late
            );

            let mut chunk = stream.acquire_next_chunk().unwrap();
            let index = chunk.index();
            chunk.fill(0x40 + cycle as u8);
            drop(chunk);
            assert_eq!(index, (stream.now_playing() + 1) % stream.num_chunks());
            stream.commit_chunk().unwrap();

            clock.advance(Duration::from_millis(producer_cost_ms));
        }
        assert_eq!(hw.stats().play_calls, 1);
    }
}

#[test]
fn test_drain_ends_on_silence() {
    let clock = ManualClock::new();
    let hw = hardware(&clock);
    let mut stream = open(&hw, &EngineOptions::default());

    for _ in 0..10 {
        assert!(stream.wait_for_slot().is_ready());
        stream.acquire_next_chunk().unwrap().fill(0x7F);
        stream.commit_chunk().unwrap();
    }
    stream.drain().unwrap();

    let last = *hw.commits().last().unwrap();
    assert_eq!(last.len, CHUNK);
    let contents = hw.buffer_contents().unwrap();
    let final_chunk = &contents[last.offset as usize..(last.offset + CHUNK) as usize];
    assert!(final_chunk.iter().all(|&b| b == 0x00));

    // The other chunk still holds the last audio written
    let other = if last.offset == 0 { CHUNK as usize } else { 0 };
    assert!(contents[other..other + CHUNK as usize].iter().all(|&b| b == 0x7F));

    stream.close();
    assert_eq!(hw.stats().live_buffers(), 0);
}

#[test]
fn test_recovers_from_underrun() {
    let clock = ManualClock::new();
    let hw = hardware(&clock);
    let mut stream = open(&hw, &EngineOptions::default());

    for cycle in 0..6 {
        if cycle == 3 {
            hw.interrupt_playback();
        }
        assert!(stream.wait_for_slot().is_ready());
        stream.acquire_next_chunk().unwrap().fill(0x11);
        stream.commit_chunk().unwrap();
    }
    assert_eq!(hw.stats().play_calls, 2);
}

// === Event Notifications ===

#[test]
fn test_event_wait_returns_at_crossing() {
    let clock = ManualClock::new();
    let hw = hardware(&clock);
    let options = EngineOptions {
        wait_strategy: WaitStrategy::Event,
        ..EngineOptions::default()
    };
    let mut stream = open(&hw, &options);
    assert_eq!(stream.wait_strategy(), WaitStrategy::Event);

    for cycle in 1..=8u32 {
        assert_eq!(stream.wait_for_slot(), WaitOutcome::SlotReady);
        assert_eq!(clock.now(), CHUNK_PERIOD * cycle);

        stream.acquire_next_chunk().unwrap().fill(0x22);
        stream.commit_chunk().unwrap();
    }
    stream.drain().unwrap();
}

// === Callback Table ===

#[test]
fn test_callback_table_streams_source() {
    let clock = ManualClock::new();
    let hw = hardware(&clock);
    let mut device = DirectOutput::new(hw.clone(), EngineOptions::default(), hw.clock());

    let mut spec = AudioSpec::new(16, 2, 48000, 1024);
    device.open_audio(&mut spec).unwrap();
    assert_eq!(spec.size, CHUNK);

    let source: Vec<u8> = (0..CHUNK * 5).map(|i| (i % 251) as u8 + 1).collect();
    let mut offset = 0usize;
    let stats = run_audio(&mut device, |buf| {
        buf.copy_from_slice(&source[offset..offset + buf.len()]);
        offset += buf.len();
        offset < source.len()
    });
    assert_eq!(stats.chunks_played, 5);

    // Every source chunk was committed, in order, after the initial silence
    let commits = hw.commits();
    assert_eq!(commits.len(), 7);
    for pair in commits[1..6].windows(2) {
        assert_ne!(pair[0].offset, pair[1].offset);
        assert!(pair[0].at <= pair[1].at);
    }

    device.close_audio();
    assert_eq!(hw.stats().live_devices(), 0);
}
