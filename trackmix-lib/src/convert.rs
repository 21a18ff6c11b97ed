//! Sample representation conversion helpers.
//!
//! Integer formats map to float by dividing by their full-scale value, and
//! float maps back with rounding and saturation so that a 16-bit sample
//! survives a float round trip unchanged.

use crate::provider::Samples;

const PCM16_SCALE: f32 = 32_768.0;
const PCM24_SCALE: f32 = 8_388_608.0;
const PCM32_SCALE: f32 = 2_147_483_648.0;

/// Convert a signed 16-bit sample to `f32`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / PCM16_SCALE
}

/// Convert an `f32` sample to signed 16-bit, rounding and saturating.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let scaled = (sample * PCM16_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert a signed 32-bit sample to `f32`.
#[inline]
pub fn i32_to_f32(sample: i32) -> f32 {
    sample as f32 / PCM32_SCALE
}

/// Convert a signed 24-bit sample packed into three little-endian bytes to `f32`.
#[inline]
pub fn packed24_to_f32(bytes: &[u8]) -> f32 {
    let raw = i32::from(bytes[0]) | (i32::from(bytes[1]) << 8) | (i32::from(bytes[2]) << 16);
    // sign-extend from bit 23
    let value = (raw << 8) >> 8;
    value as f32 / PCM24_SCALE
}

/// Convert an `f32` sample to packed signed 24-bit little-endian bytes.
pub fn f32_to_packed24(sample: f32) -> [u8; 3] {
    let scaled = (sample * PCM24_SCALE).round();
    let value = scaled.clamp(-PCM24_SCALE, PCM24_SCALE - 1.0) as i32;
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

/// Convert an `f32` sample to signed 32-bit, rounding and saturating.
pub fn f32_to_i32(sample: f32) -> i32 {
    let scaled = f64::from(sample) * f64::from(PCM32_SCALE);
    scaled.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Decode every sample of `input` into `output` as `f32`.
///
/// `output` must hold at least as many samples as `input`.
pub fn samples_to_f32(input: &Samples<'_>, output: &mut [f32]) {
    match input {
        Samples::Pcm16(data) => {
            for (dst, &src) in output.iter_mut().zip(data.iter()) {
                *dst = i16_to_f32(src);
            }
        }
        Samples::Pcm24Packed(data) => {
            for (dst, src) in output.iter_mut().zip(data.chunks_exact(3)) {
                *dst = packed24_to_f32(src);
            }
        }
        Samples::Pcm32(data) => {
            for (dst, &src) in output.iter_mut().zip(data.iter()) {
                *dst = i32_to_f32(src);
            }
        }
        Samples::Float(data) => {
            let len = data.len().min(output.len());
            output[..len].copy_from_slice(&data[..len]);
        }
    }
}

/// Decode every sample of `input` into `output` as signed 16-bit.
///
/// Wider integer formats keep their 16 most significant bits.
pub fn samples_to_i16(input: &Samples<'_>, output: &mut [i16]) {
    match input {
        Samples::Pcm16(data) => {
            let len = data.len().min(output.len());
            output[..len].copy_from_slice(&data[..len]);
        }
        Samples::Pcm24Packed(data) => {
            for (dst, src) in output.iter_mut().zip(data.chunks_exact(3)) {
                *dst = i16::from_le_bytes([src[1], src[2]]);
            }
        }
        Samples::Pcm32(data) => {
            for (dst, &src) in output.iter_mut().zip(data.iter()) {
                *dst = (src >> 16) as i16;
            }
        }
        Samples::Float(data) => {
            for (dst, &src) in output.iter_mut().zip(data.iter()) {
                *dst = f32_to_i16(src);
            }
        }
    }
}
