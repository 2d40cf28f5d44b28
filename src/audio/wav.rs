//! Utterance payload encoder: 16-bit signed mono PCM in a RIFF/WAVE container.
//!
//! The output is byte-for-byte reproducible for identical input: a 44-byte
//! little-endian header followed by `2 * sample_count` bytes of PCM.

use super::error::EncodeError;
use super::resample::resample_linear;
use super::TARGET_RATE;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// Size of the canonical PCM header.
pub const WAV_HEADER_LEN: usize = 44;

/// Concatenate chunks in capture order, resample to 16 kHz, and wrap as WAV.
pub fn encode_wav(chunks: &[Vec<f32>], source_rate: u32) -> Result<Vec<u8>, EncodeError> {
    WavEncoder::default().encode(chunks, source_rate)
}

/// Encoder with a configurable output rate; the game payload always uses 16 kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavEncoder {
    target_rate: u32,
}

impl Default for WavEncoder {
    fn default() -> Self {
        Self {
            target_rate: TARGET_RATE,
        }
    }
}

impl WavEncoder {
    pub fn with_target_rate(target_rate: u32) -> Self {
        Self { target_rate }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn encode(&self, chunks: &[Vec<f32>], source_rate: u32) -> Result<Vec<u8>, EncodeError> {
        if source_rate == 0 || self.target_rate == 0 {
            return Err(EncodeError::InvalidSourceRate);
        }

        let total: usize = chunks.iter().map(Vec::len).sum();
        let mut merged = Vec::with_capacity(total);
        for chunk in chunks {
            merged.extend_from_slice(chunk);
        }

        let samples = if source_rate == self.target_rate {
            merged
        } else {
            resample_linear(&merged, source_rate, self.target_rate)
        };

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.target_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for &sample in &samples {
                writer.write_sample(float_to_pcm16(sample))?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}

/// Clamp to [-1, 1] and scale asymmetrically: negatives by 32768, the rest by 32767.
pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

/// Text-safe form of the payload for JSON transports.
pub fn wav_to_base64(wav: &[u8]) -> String {
    BASE64_STANDARD.encode(wav)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_u16(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn le_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn header_describes_16k_mono_pcm16() {
        let wav = encode_wav(&[vec![0.0; 10]], TARGET_RATE).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_LEN + 20);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(le_u32(&wav, 4), (wav.len() - 8) as u32);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(le_u32(&wav, 16), 16);
        assert_eq!(le_u16(&wav, 20), 1);
        assert_eq!(le_u16(&wav, 22), 1);
        assert_eq!(le_u32(&wav, 24), 16_000);
        assert_eq!(le_u32(&wav, 28), 32_000);
        assert_eq!(le_u16(&wav, 32), 2);
        assert_eq!(le_u16(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(le_u32(&wav, 40), 20);
    }

    #[test]
    fn pcm_scaling_is_asymmetric() {
        assert_eq!(float_to_pcm16(1.0), 32_767);
        assert_eq!(float_to_pcm16(-1.0), -32_768);
        assert_eq!(float_to_pcm16(0.0), 0);
        assert_eq!(float_to_pcm16(0.5), 16_383);
        assert_eq!(float_to_pcm16(-0.5), -16_384);
        assert_eq!(float_to_pcm16(3.0), 32_767);
        assert_eq!(float_to_pcm16(-3.0), -32_768);
    }

    #[test]
    fn chunks_are_concatenated_in_order() {
        let wav = encode_wav(&[vec![1.0], vec![-1.0, 0.0]], TARGET_RATE).unwrap();
        let pcm: Vec<i16> = wav[WAV_HEADER_LEN..]
            .chunks(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(pcm, vec![32_767, -32_768, 0]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let chunks: Vec<Vec<f32>> = (0..4)
            .map(|c| (0..480).map(|i| ((c * 480 + i) as f32 * 0.01).sin()).collect())
            .collect();
        let first = encode_wav(&chunks, 48_000).unwrap();
        let second = encode_wav(&chunks, 48_000).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), WAV_HEADER_LEN + 2 * 640);
    }

    #[test]
    fn same_rate_keeps_sample_count() {
        let chunks = vec![vec![0.25f32; 700], vec![-0.25f32; 300]];
        let wav = encode_wav(&chunks, TARGET_RATE).unwrap();
        assert_eq!((wav.len() - WAV_HEADER_LEN) / 2, 1000);
    }

    #[test]
    fn empty_input_is_header_only() {
        let wav = encode_wav(&[], 44_100).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_LEN);
        assert_eq!(le_u32(&wav, 40), 0);
    }

    #[test]
    fn zero_source_rate_is_rejected() {
        assert!(matches!(
            encode_wav(&[vec![0.0]], 0),
            Err(EncodeError::InvalidSourceRate)
        ));
    }

    #[test]
    fn base64_round_trips_header_magic() {
        let wav = encode_wav(&[vec![0.0; 2]], TARGET_RATE).unwrap();
        let text = wav_to_base64(&wav);
        assert!(text.starts_with("UklGR"));
    }
}
