//! CLI Command Implementations
//!
//! Every command runs against simulated hardware, so they work on any host.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::clock::{ManualClock, SystemClock};
use crate::config::StreamConfig;
use crate::device::{run_audio, AudioDevice, DirectOutput};
use crate::format::AudioSpec;
use crate::native::SimulatedHardware;

/// Load `path`, or the defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<StreamConfig> {
    match path {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(StreamConfig::default()),
    }
}

fn simulated(hw: SimulatedHardware, primary_capacity: Option<u32>) -> SimulatedHardware {
    match primary_capacity {
        Some(bytes) => hw.with_primary_capacity(bytes),
        None => hw,
    }
}

/// Open a stream with the configured spec and print its negotiated layout.
pub fn probe(config: &StreamConfig, primary_capacity: Option<u32>) -> Result<()> {
    let mut spec = config.audio;
    let format = spec.calculate()?;
    info!("Probing {} with {}-byte fragments", format, spec.size);

    let hw = simulated(SimulatedHardware::new(ManualClock::new()), primary_capacity);
    let mut device = DirectOutput::new(hw.clone(), config.engine.clone(), hw.clock());
    device
        .open_audio(&mut spec)
        .context("Failed to open output device")?;

    println!("Device: {} ({})", device.name(), device.description());
    if let Some(info) = device.stream_info() {
        println!("{}", serde_json::to_string_pretty(&info)?);
    }
    device.close_audio();
    Ok(())
}

/// Encode interleaved samples in the engine's byte layout
fn encode_pcm(samples: &[i16], bits: u16) -> Vec<u8> {
    match bits {
        8 => samples.iter().map(|&s| (s + 128) as u8).collect(),
        _ => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
    }
}

/// Stream a WAV file through the engine and print a summary.
pub fn play(
    config: &StreamConfig,
    input: &Path,
    realtime: bool,
    primary_capacity: Option<u32>,
) -> Result<()> {
    info!("Playing: {}", input.display());

    let mut reader = hound::WavReader::open(input)
        .with_context(|| format!("Failed to open WAV file: {}", input.display()))?;
    let wav = reader.spec();
    if wav.sample_format != hound::SampleFormat::Int || !matches!(wav.bits_per_sample, 8 | 16) {
        bail!(
            "Only 8-bit or 16-bit integer PCM is supported, got {}-bit {:?}",
            wav.bits_per_sample,
            wav.sample_format
        );
    }

    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to read samples")?;
    let pcm = encode_pcm(&samples, wav.bits_per_sample);

    let mut spec = AudioSpec::new(
        wav.bits_per_sample,
        wav.channels,
        wav.sample_rate,
        config.audio.samples,
    );

    let hw = if realtime {
        SimulatedHardware::new(SystemClock::new())
    } else {
        SimulatedHardware::new(ManualClock::new())
    };
    let hw = simulated(hw, primary_capacity);
    let clock = hw.clock();
    let started = clock.now();

    let mut device = DirectOutput::new(hw.clone(), config.engine.clone(), hw.clock());
    device
        .open_audio(&mut spec)
        .context("Failed to open output device")?;
    if let Some(info) = device.stream_info() {
        info!(
            "{:?} buffer, {} chunks of {} bytes",
            info.buffer_kind, info.num_chunks, info.chunk_size
        );
    }

    let silence = spec.silence;
    let mut offset = 0usize;
    let stats = run_audio(&mut device, |buf| {
        let n = buf.len().min(pcm.len() - offset);
        buf[..n].copy_from_slice(&pcm[offset..offset + n]);
        buf[n..].fill(silence);
        offset += n;
        offset < pcm.len()
    });
    device.close_audio();

    if stats.chunks_skipped > 0 {
        warn!("{} chunks were skipped", stats.chunks_skipped);
    }

    let frames = samples.len() / usize::from(wav.channels.max(1));
    let audio_secs = frames as f64 / f64::from(wav.sample_rate);
    let elapsed: Duration = clock.now().saturating_sub(started);

    println!("Played: {}", input.display());
    println!(
        "Format: {}-bit, {} ch, {} Hz",
        wav.bits_per_sample, wav.channels, wav.sample_rate
    );
    println!("Audio duration: {:.3}s", audio_secs);
    let timeline = if realtime { "wall" } else { "simulated" };
    println!("Elapsed ({}): {:.3}s", timeline, elapsed.as_secs_f64());
    println!(
        "Chunks: {} played, {} skipped",
        stats.chunks_played, stats.chunks_skipped
    );

    Ok(())
}

/// Write the default configuration to `path`.
pub fn init_config(path: &Path) -> Result<()> {
    info!("Writing default config: {}", path.display());
    StreamConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    println!("Config written: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, bits: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            if bits == 8 {
                writer.write_sample(s as i8).unwrap();
            } else {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_encode_pcm() {
        assert_eq!(encode_pcm(&[-128, 0, 127], 8), vec![0x00, 0x80, 0xFF]);
        assert_eq!(encode_pcm(&[1, -1], 16), vec![0x01, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_play_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..9600).map(|i| ((i % 200) * 100 - 10000) as i16).collect();
        write_wav(&path, 16, &samples);

        play(&StreamConfig::default(), &path, false, None).unwrap();
    }

    #[test]
    fn test_play_8bit_wav_on_primary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone8.wav");
        let samples: Vec<i16> = (0..4000).map(|i| (i % 100) as i16 - 50).collect();
        write_wav(&path, 8, &samples);

        play(&StreamConfig::default(), &path, false, Some(2048 * 8)).unwrap();
    }

    #[test]
    fn test_play_rejects_float_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.0f32).unwrap();
        writer.finalize().unwrap();

        assert!(play(&StreamConfig::default(), &path, false, None).is_err());
    }

    #[test]
    fn test_init_config_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.json");

        init_config(&path).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn test_probe_defaults() {
        probe(&StreamConfig::default(), Some(4096 * 4)).unwrap();
    }
}
