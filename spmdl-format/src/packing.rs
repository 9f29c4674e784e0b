//! Attribute quantization
//!
//! Converts canonical f32 attribute values into their target encodings:
//! - f32 → unorm n (`round(clamp(x, 0, 1) * (2^n - 1))`)
//! - f32 → snorm n (`round(clamp(x, -1, 1) * (2^(n-1) - 1))`)
//! - f32 → uint n / sint n (clamp and cast)
//! - f32 → f16 / f32 (width conversion)
//! - f32x3 → 10-10-10-2 packed u32
//!
//! All multi-byte values are written little-endian.

use half::f16;

use crate::vertex_format::{Encoding, Format};

// ============================================================================
// Scalar Conversions
// ============================================================================

/// Largest value representable by an unsigned integer of `bits` bits
#[inline]
pub fn unsigned_max(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// Convert f32 to an unsigned normalized integer of `bits` bits
#[inline]
pub fn quantize_unorm(value: f32, bits: u32) -> u32 {
    let scale = unsigned_max(bits) as f64;
    (value.clamp(0.0, 1.0) as f64 * scale + 0.5) as u32
}

/// Convert f32 to a signed normalized integer of `bits` bits
///
/// Maps [-1.0, 1.0] to [-(2^(n-1) - 1), 2^(n-1) - 1], rounding half away from zero.
#[inline]
pub fn quantize_snorm(value: f32, bits: u32) -> i32 {
    let scale = (unsigned_max(bits - 1)) as f64;
    (value.clamp(-1.0, 1.0) as f64 * scale).round() as i32
}

/// Clamp f32 into the unsigned range of `bits` bits and truncate
#[inline]
pub fn quantize_uint(value: f32, bits: u32) -> u32 {
    (value as f64).clamp(0.0, unsigned_max(bits) as f64) as u32
}

/// Clamp f32 into the signed range of `bits` bits and truncate
#[inline]
pub fn quantize_sint(value: f32, bits: u32) -> i32 {
    let max = unsigned_max(bits - 1) as f64;
    (value as f64).clamp(-max - 1.0, max) as i32
}

#[inline]
pub fn dequantize_unorm(value: u32, bits: u32) -> f32 {
    (value as f64 / unsigned_max(bits) as f64) as f32
}

#[inline]
pub fn dequantize_snorm(value: i32, bits: u32) -> f32 {
    (value as f64 / unsigned_max(bits - 1) as f64).max(-1.0) as f32
}

// ============================================================================
// Packed 10-10-10-2
// ============================================================================

/// Pack three 10-bit values: c0 in bits 20-29, c1 in bits 10-19, c2 in bits 0-9
#[inline]
pub fn pack_10_10_10(c: [u32; 3]) -> u32 {
    ((c[0] & 0x3FF) << 20) | ((c[1] & 0x3FF) << 10) | (c[2] & 0x3FF)
}

#[inline]
pub fn unpack_10_10_10(packed: u32) -> [u32; 3] {
    [(packed >> 20) & 0x3FF, (packed >> 10) & 0x3FF, packed & 0x3FF]
}

fn packed_components(format: Format, values: &[f32]) -> [u32; 3] {
    let mut c = [0u32; 3];
    for (dst, &v) in c.iter_mut().zip(values) {
        *dst = match format {
            Format::Rgb10a2Uint => quantize_uint(v, 10),
            _ => quantize_unorm(v, 10),
        };
    }
    c
}

// ============================================================================
// Attribute Encoding
// ============================================================================

fn write_component(out: &mut [u8], index: usize, bits: u8, encoding: Encoding, value: f32) {
    let size = bits as usize / 8;
    let dst = &mut out[index * size..(index + 1) * size];
    let b = bits as u32;
    match (encoding, bits) {
        (Encoding::Float, 16) => dst.copy_from_slice(&f16::from_f32(value).to_le_bytes()),
        (Encoding::Float, _) => dst.copy_from_slice(&value.to_le_bytes()),
        (Encoding::Unorm, _) => dst.copy_from_slice(&quantize_unorm(value, b).to_le_bytes()[..size]),
        (Encoding::Uint, _) => dst.copy_from_slice(&quantize_uint(value, b).to_le_bytes()[..size]),
        (Encoding::Snorm, _) => dst.copy_from_slice(&quantize_snorm(value, b).to_le_bytes()[..size]),
        (Encoding::Sint, _) => dst.copy_from_slice(&quantize_sint(value, b).to_le_bytes()[..size]),
    }
}

/// Encode one attribute into `out` (which must be `format.byte_size()` bytes).
///
/// Only `min(values.len(), format.components())` components are written;
/// the remaining bytes are left untouched.
pub fn encode_attribute(format: Format, values: &[f32], out: &mut [u8]) {
    match format {
        Format::Plain {
            channels,
            bits,
            encoding,
        } => {
            for (i, &v) in values.iter().take(channels as usize).enumerate() {
                write_component(out, i, bits, encoding, v);
            }
        }
        Format::Rgb10a2Unorm | Format::Rgb10a2Uint => {
            let packed = pack_10_10_10(packed_components(format, values));
            out[..4].copy_from_slice(&packed.to_le_bytes());
        }
    }
}

/// Encode a bone weight attribute.
///
/// Unorm formats get their quantized weights corrected with
/// [`normalize_quantized_weights`] so they sum to exactly the unorm maximum.
/// Every other format is encoded like a regular attribute.
pub fn encode_weights(format: Format, weights: &[f32], out: &mut [u8]) {
    match format {
        Format::Plain {
            channels,
            bits,
            encoding: Encoding::Unorm,
        } => {
            let b = bits as u32;
            let size = bits as usize / 8;
            let n = weights.len().min(channels as usize);
            let mut q = [0u32; 4];
            for (dst, &w) in q.iter_mut().zip(&weights[..n]) {
                *dst = quantize_unorm(w, b);
            }
            normalize_quantized_weights(&mut q[..n], unsigned_max(b));
            for (i, value) in q[..n].iter().enumerate() {
                out[i * size..(i + 1) * size].copy_from_slice(&value.to_le_bytes()[..size]);
            }
        }
        Format::Rgb10a2Unorm => {
            let mut c = packed_components(format, weights);
            let n = weights.len().min(3);
            normalize_quantized_weights(&mut c[..n], unsigned_max(10));
            out[..4].copy_from_slice(&pack_10_10_10(c).to_le_bytes());
        }
        _ => encode_attribute(format, weights, out),
    }
}

/// Redistribute quantization residue so the weights sum to exactly `max`.
///
/// A positive residue is added to the first nonzero slot. A negative residue
/// is taken from the first slot that can absorb it; slots too small to absorb
/// the remainder are zeroed and the remainder carries to the next slot.
/// An all-zero weight set is left unchanged.
pub fn normalize_quantized_weights(weights: &mut [u32], max: u32) {
    let total: u64 = weights.iter().map(|&w| w as u64).sum();
    if total == 0 {
        return;
    }

    let delta = max as i64 - total as i64;
    if delta > 0 {
        if let Some(w) = weights.iter_mut().find(|w| **w > 0) {
            *w += delta as u32;
        }
    } else if delta < 0 {
        let mut remaining = -delta as u64;
        for w in weights.iter_mut() {
            if *w as u64 > remaining {
                *w -= remaining as u32;
                return;
            }
            remaining -= *w as u64;
            *w = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    #[test]
    fn test_quantize_unorm() {
        assert_eq!(quantize_unorm(0.0, 8), 0);
        assert_eq!(quantize_unorm(1.0, 8), 255);
        assert_eq!(quantize_unorm(0.5, 8), 128);
        assert_eq!(quantize_unorm(-3.0, 8), 0);
        assert_eq!(quantize_unorm(7.0, 16), 65535);
        assert_eq!(quantize_unorm(1.0, 32), u32::MAX);
    }

    #[test]
    fn test_quantize_snorm() {
        assert_eq!(quantize_snorm(1.0, 8), 127);
        assert_eq!(quantize_snorm(-1.0, 8), -127);
        assert_eq!(quantize_snorm(0.0, 16), 0);
        assert_eq!(quantize_snorm(-2.0, 16), -32767);
        assert_eq!(quantize_snorm(0.5, 8), 64); // 63.5 rounds away from zero
        assert_eq!(quantize_snorm(-0.5, 8), -64);
    }

    #[test]
    fn test_quantize_int() {
        assert_eq!(quantize_uint(300.0, 8), 255);
        assert_eq!(quantize_uint(-1.0, 8), 0);
        assert_eq!(quantize_uint(17.0, 16), 17);
        assert_eq!(quantize_sint(-200.0, 8), -128);
        assert_eq!(quantize_sint(200.0, 8), 127);
        assert_eq!(quantize_sint(-5.0, 32), -5);
    }

    #[test]
    fn test_pack_10_10_10() {
        let packed = pack_10_10_10([1, 2, 3]);
        assert_eq!(packed, (1 << 20) | (2 << 10) | 3);
        assert_eq!(unpack_10_10_10(packed), [1, 2, 3]);

        let mut out = [0u8; 4];
        encode_attribute(Format::Rgb10a2Unorm, &[1.0, 0.0, 1.0], &mut out);
        assert_eq!(u32::from_le_bytes(out), (1023 << 20) | 1023);

        encode_attribute(Format::Rgb10a2Uint, &[5000.0, 4.0], &mut out);
        assert_eq!(unpack_10_10_10(u32::from_le_bytes(out)), [1023, 4, 0]);
    }

    #[test]
    fn test_encode_plain() {
        let mut out = [0u8; 12];
        encode_attribute(Format::parse("rgb32f").unwrap(), &[1.0, -2.0, 3.5], &mut out);
        assert_eq!(&out[4..8], &(-2.0f32).to_le_bytes());

        let mut out = [0u8; 4];
        encode_attribute(Format::parse("rg16f").unwrap(), &[0.5, 1.0], &mut out);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), f16::from_f32(0.5).to_bits());

        let mut out = [0u8; 4];
        encode_attribute(Format::parse("rgba8sn").unwrap(), &[-1.0, 1.0, 0.0, 0.5], &mut out);
        assert_eq!(out, [0x81, 0x7F, 0x00, 0x40]);
    }

    #[test]
    fn test_encode_leaves_missing_components() {
        let mut out = [0u8; 4];
        encode_attribute(Format::parse("rgba8un").unwrap(), &[1.0, 1.0], &mut out);
        assert_eq!(out, [255, 255, 0, 0]);
    }

    #[test]
    fn test_normalize_adds_positive_residue() {
        let mut w = [85, 85, 84, 0];
        normalize_quantized_weights(&mut w, 255);
        assert_eq!(w, [86, 85, 84, 0]);
    }

    #[test]
    fn test_normalize_carries_negative_residue() {
        let mut w = [1, 128, 128, 0];
        normalize_quantized_weights(&mut w, 255);
        assert_eq!(w.iter().sum::<u32>(), 255);
        assert_eq!(w, [0, 127, 128, 0]);
    }

    #[test]
    fn test_normalize_all_zero() {
        let mut w = [0u32; 4];
        normalize_quantized_weights(&mut w, 255);
        assert_eq!(w, [0; 4]);
    }

    #[test]
    fn test_weights_sum_after_quantization() {
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..1000 {
            let raw: [f32; 4] = std::array::from_fn(|_| rng.random_range(0.0..1.0));
            let total: f32 = raw.iter().sum();
            let weights = raw.map(|w| w / total);

            let mut out = [0u8; 4];
            encode_weights(Format::parse("rgba8un").unwrap(), &weights, &mut out);
            assert_eq!(out.iter().map(|&b| b as u32).sum::<u32>(), 255);

            let mut out = [0u8; 8];
            encode_weights(Format::parse("rgba16un").unwrap(), &weights, &mut out);
            let sum: u32 = out
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .sum();
            assert_eq!(sum, 65535);
        }
    }

    #[test]
    fn test_float_weights_are_not_corrected() {
        let mut out = [0u8; 8];
        encode_weights(Format::parse("rg32f").unwrap(), &[0.25, 0.5], &mut out);
        assert_eq!(&out[..4], &0.25f32.to_le_bytes());
        assert_eq!(&out[4..], &0.5f32.to_le_bytes());
    }
}
