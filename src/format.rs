//! PCM Format Negotiation
//!
//! Translates a requested sample width, channel count and rate into the
//! wave format handed to the native buffer, and sizes fragments in bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Silence value for unsigned 8-bit samples
pub const SILENCE_U8: u8 = 0x80;

/// Silence value for signed 16-bit samples
pub const SILENCE_S16: u8 = 0x00;

/// Sample encodings the output engine accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Unsigned 8-bit
    U8,
    /// Signed 16-bit little-endian
    S16,
}

impl SampleFormat {
    /// Map a requested bit depth onto a sample format
    ///
    /// Only the low byte of `bits` is significant, so packed format tags
    /// (e.g. a signed-8 or unsigned-16 tag) resolve by width alone.
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits & 0xFF {
            8 => Ok(SampleFormat::U8),
            16 => Ok(SampleFormat::S16),
            other => Err(StreamError::UnsupportedFormat {
                reason: format!("{}-bit samples are not supported", other),
            }),
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::S16 => 16,
        }
    }

    pub fn bytes_per_sample(self) -> u16 {
        self.bits() / 8
    }

    /// Byte value that produces silence when repeated across a buffer
    pub fn silence(self) -> u8 {
        match self {
            SampleFormat::U8 => SILENCE_U8,
            SampleFormat::S16 => SILENCE_S16,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::U8 => write!(f, "U8"),
            SampleFormat::S16 => write!(f, "S16"),
        }
    }
}

/// Negotiated stream format, fixed for the lifetime of an open stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Validate and build a format from a requested bit depth
    pub fn new(bits: u16, channels: u16, sample_rate: u32) -> Result<Self> {
        let sample_format = SampleFormat::from_bits(bits)?;
        if channels == 0 {
            return Err(StreamError::UnsupportedFormat {
                reason: "channel count must be non-zero".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(StreamError::UnsupportedFormat {
                reason: "sample rate must be non-zero".to_string(),
            });
        }

        // Derived fields must fit the wave format descriptor
        let fits = channels
            .checked_mul(sample_format.bytes_per_sample())
            .and_then(|block_align| sample_rate.checked_mul(u32::from(block_align)))
            .is_some();
        if !fits {
            return Err(StreamError::UnsupportedFormat {
                reason: format!(
                    "{} channels at {} Hz overflows the byte rate",
                    channels, sample_rate
                ),
            });
        }

        Ok(Self {
            sample_format,
            channels,
            sample_rate,
        })
    }

    pub fn silence(&self) -> u8 {
        self.sample_format.silence()
    }

    /// Bytes occupied by one frame (one sample for every channel)
    pub fn block_align(&self) -> u16 {
        self.channels * self.sample_format.bytes_per_sample()
    }

    pub fn avg_bytes_per_sec(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }

    /// The wave format descriptor handed to the native buffer
    pub fn wave_format(&self) -> WaveFormat {
        WaveFormat {
            bits_per_sample: self.sample_format.bits(),
            channels: self.channels,
            samples_per_sec: self.sample_rate,
            block_align: self.block_align(),
            avg_bytes_per_sec: self.avg_bytes_per_sec(),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}ch {}Hz",
            self.sample_format, self.channels, self.sample_rate
        )
    }
}

/// PCM wave format with derived fields filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveFormat {
    pub bits_per_sample: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub block_align: u16,
    pub avg_bytes_per_sec: u32,
}

/// Audio parameters requested by the application
///
/// `size` and `silence` are outputs: they are filled in by [`AudioSpec::calculate`]
/// when the device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioSpec {
    /// Requested bit depth (8 or 16)
    pub bits: u16,
    pub channels: u16,
    pub freq: u32,
    /// Sample frames per fragment
    pub samples: u16,
    /// Fragment size in bytes
    pub size: u32,
    pub silence: u8,
}

impl AudioSpec {
    pub fn new(bits: u16, channels: u16, freq: u32, samples: u16) -> Self {
        Self {
            bits,
            channels,
            freq,
            samples,
            size: 0,
            silence: 0,
        }
    }

    /// Validate the request and fill in the fragment size and silence value
    pub fn calculate(&mut self) -> Result<AudioFormat> {
        let format = AudioFormat::new(self.bits, self.channels, self.freq)?;
        self.bits = format.sample_format.bits();
        self.silence = format.silence();
        self.size = u32::from(self.samples) * u32::from(format.block_align());
        Ok(format)
    }
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self::new(16, 2, 48000, 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bits() {
        assert_eq!(SampleFormat::from_bits(8).unwrap(), SampleFormat::U8);
        assert_eq!(SampleFormat::from_bits(16).unwrap(), SampleFormat::S16);
        // Signed 8-bit and unsigned 16-bit tags resolve by width
        assert_eq!(SampleFormat::from_bits(0x8008).unwrap(), SampleFormat::U8);
        assert_eq!(SampleFormat::from_bits(0x0010).unwrap(), SampleFormat::S16);
    }

    #[test]
    fn test_unsupported_widths() {
        for bits in [0, 4, 12, 24, 32] {
            let err = SampleFormat::from_bits(bits).unwrap_err();
            assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
        }
    }

    #[test]
    fn test_silence_values() {
        assert_eq!(SampleFormat::U8.silence(), 0x80);
        assert_eq!(SampleFormat::S16.silence(), 0x00);
    }

    #[test]
    fn test_derived_fields() {
        let format = AudioFormat::new(16, 2, 48000).unwrap();
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.avg_bytes_per_sec(), 192_000);

        let wave = format.wave_format();
        assert_eq!(wave.bits_per_sample, 16);
        assert_eq!(wave.block_align, 4);
        assert_eq!(wave.avg_bytes_per_sec, 192_000);

        let mono8 = AudioFormat::new(8, 1, 22050).unwrap();
        assert_eq!(mono8.block_align(), 1);
        assert_eq!(mono8.avg_bytes_per_sec(), 22050);
    }

    #[test]
    fn test_zero_channels_or_rate_rejected() {
        assert!(AudioFormat::new(16, 0, 48000).is_err());
        assert!(AudioFormat::new(16, 2, 0).is_err());
    }

    #[test]
    fn test_wide_formats_accepted() {
        let fast = AudioFormat::new(16, 2, 768_000).unwrap();
        assert_eq!(fast.avg_bytes_per_sec(), 3_072_000);

        let many = AudioFormat::new(16, 300, 48000).unwrap();
        assert_eq!(many.block_align(), 600);
        assert_eq!(many.wave_format().channels, 300);
    }

    #[test]
    fn test_byte_rate_overflow_rejected() {
        // Block align overflows u16
        let err = AudioFormat::new(16, u16::MAX, 48000).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");

        // Byte rate overflows u32
        let err = AudioFormat::new(16, 2, u32::MAX).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");

        assert!(AudioFormat::new(8, u16::MAX, 65536).is_ok());
    }

    #[test]
    fn test_spec_calculate() {
        let mut spec = AudioSpec::new(16, 2, 48000, 1024);
        let format = spec.calculate().unwrap();
        assert_eq!(spec.size, 4096);
        assert_eq!(spec.silence, 0x00);
        assert_eq!(format.sample_format, SampleFormat::S16);

        let mut spec = AudioSpec::new(8, 1, 11025, 512);
        spec.calculate().unwrap();
        assert_eq!(spec.size, 512);
        assert_eq!(spec.silence, 0x80);
    }

    #[test]
    fn test_display() {
        let format = AudioFormat::new(16, 2, 44100).unwrap();
        assert_eq!(format.to_string(), "S16 2ch 44100Hz");
    }
}
