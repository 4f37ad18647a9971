//! # Binary Frame Classification and PCM Decoding
//!
//! Incoming binary WebSocket frames carry raw PCM with no header, so the
//! format is inferred from the byte length alone:
//! - length divisible by 4: little-endian float32 samples in [-1, 1]
//! - otherwise, length divisible by 2: little-endian int16 samples
//! - anything else is rejected
//!
//! Int16 input is normalized to float by dividing by 32768 so the session
//! core only ever sees float samples.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// PCM sample encoding detected from a binary frame's byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    /// 32-bit little-endian float samples
    Float32,
    /// 16-bit little-endian signed integer samples
    Int16,
}

/// Classify a binary frame by byte-length alignment.
///
/// ## Returns:
/// - **Some(PcmFormat)**: the frame can be parsed as PCM
/// - **None**: the length fits neither encoding and the frame must be rejected
///
/// Float32 takes precedence: a length divisible by 4 is always treated as
/// float32 even though it is also divisible by 2.
pub fn classify(byte_len: usize) -> Option<PcmFormat> {
    if byte_len % 4 == 0 {
        Some(PcmFormat::Float32)
    } else if byte_len % 2 == 0 {
        Some(PcmFormat::Int16)
    } else {
        None
    }
}

/// Decode a binary frame into normalized float samples.
///
/// ## Parameters:
/// - **data**: raw frame bytes from the WebSocket
///
/// ## Returns:
/// - **Ok(Vec<f32>)**: decoded samples, int16 input scaled to [-1, 1)
/// - **Err(String)**: the frame length fits neither PCM encoding
pub fn decode_samples(data: &[u8]) -> Result<Vec<f32>, String> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    match classify(data.len()) {
        Some(PcmFormat::Float32) => {
            let mut cursor = Cursor::new(data);
            let mut samples = Vec::with_capacity(data.len() / 4);
            while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
                samples.push(sample);
            }
            Ok(samples)
        }
        Some(PcmFormat::Int16) => {
            let mut cursor = Cursor::new(data);
            let mut samples = Vec::with_capacity(data.len() / 2);
            while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
                samples.push(sample as f32 / 32768.0);
            }
            Ok(samples)
        }
        None => Err("Invalid audio data size".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_alignment() {
        // Multiples of 4 are always float32
        assert_eq!(classify(4000), Some(PcmFormat::Float32));
        assert_eq!(classify(4), Some(PcmFormat::Float32));
        // Even but not a multiple of 4 is int16
        assert_eq!(classify(6), Some(PcmFormat::Int16));
        assert_eq!(classify(4002), Some(PcmFormat::Int16));
        // Odd lengths fit neither encoding
        assert_eq!(classify(5), None);
        assert_eq!(classify(4001), None);
    }

    #[test]
    fn test_float32_decoding() {
        let mut data = Vec::new();
        for value in [0.0f32, 0.5, -0.5, 1.0] {
            data.extend_from_slice(&value.to_le_bytes());
        }

        let samples = decode_samples(&data).unwrap();
        assert_eq!(samples, vec![0.0, 0.5, -0.5, 1.0]);
    }

    #[test]
    fn test_int16_normalization() {
        // 3 samples (6 bytes) forces the int16 path: 6 % 4 != 0
        let mut data = Vec::new();
        for value in [0i16, 16384, -32768] {
            data.extend_from_slice(&value.to_le_bytes());
        }

        let samples = decode_samples(&data).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 0.5);
        assert_eq!(samples[2], -1.0);
        for sample in &samples {
            assert!(*sample >= -1.0 && *sample < 1.0);
        }
    }

    #[test]
    fn test_int16_silence_stays_in_range() {
        // 3,000 int16 samples of silence: 6,000 bytes, 6000 % 4 == 0 would be
        // float32, so use 2,999 samples (5,998 bytes) to stay on the int16 path
        let data = vec![0u8; 5998];
        let samples = decode_samples(&data).unwrap();
        assert_eq!(samples.len(), 2999);
        assert!(samples.iter().all(|s| *s >= -1.0 && *s < 1.0));
    }

    #[test]
    fn test_odd_length_rejected() {
        let data = vec![0u8; 7];
        assert!(decode_samples(&data).is_err());
    }

    #[test]
    fn test_empty_frame_decodes_to_nothing() {
        assert_eq!(decode_samples(&[]).unwrap(), Vec::<f32>::new());
    }
}
