//! CPU tone mapping for HDR (FP16 scRGB) outputs.
//!
//! When the primary output scans out `R16G16B16A16_FLOAT`, the staging
//! readback is in linear half-float and every downstream stage still
//! expects 8-bit BGRA. The mapping runs per pixel: saturation boost around
//! the pixel's luma, a mild cool shift, exposure scaling, then piecewise
//! sRGB gamma — each stage clamped back into [0, 1] before the next.
//!
//! The constants are empirical; they came out of eyeballing real HDR
//! desktops, not a colorimetry derivation.

/// Linear saturation boost factor.
pub const SATURATION: f32 = 1.2;
/// Cool shift: red multiplier.
pub const COOL_SHIFT_R: f32 = 0.96;
/// Cool shift: blue multiplier.
pub const COOL_SHIFT_B: f32 = 1.04;
/// Exposure scale applied in linear light before gamma encode.
pub const EXPOSURE: f32 = 0.78;

/// Map one FP16 RGBA (scRGB, 8 bytes/pixel, little-endian) row buffer to
/// 8-bit BGRA. `pixels` is the pixel count of the slice.
pub fn map_f16_rgba_to_bgra8(src: &[u8], pixels: usize, dst: &mut Vec<u8>) {
    debug_assert!(src.len() >= pixels * 8);
    dst.clear();
    dst.reserve(pixels * 4);

    for px in src[..pixels * 8].chunks_exact(8) {
        let r = half_to_f32(u16::from_le_bytes([px[0], px[1]]));
        let g = half_to_f32(u16::from_le_bytes([px[2], px[3]]));
        let b = half_to_f32(u16::from_le_bytes([px[4], px[5]]));
        let (r, g, b) = map_pixel(r, g, b);
        dst.push(encode_srgb(b));
        dst.push(encode_srgb(g));
        dst.push(encode_srgb(r));
        dst.push(255);
    }
}

/// The linear-light stages, exposed for tests: saturation, cool shift,
/// exposure, with a clamp between every stage. Output is linear [0, 1];
/// gamma encoding happens in [`encode_srgb`].
pub fn map_pixel(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let r = r.clamp(0.0, 1.0);
    let g = g.clamp(0.0, 1.0);
    let b = b.clamp(0.0, 1.0);

    // Saturation boost around BT.709 luma.
    let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let r = (luma + (r - luma) * SATURATION).clamp(0.0, 1.0);
    let g = (luma + (g - luma) * SATURATION).clamp(0.0, 1.0);
    let b = (luma + (b - luma) * SATURATION).clamp(0.0, 1.0);

    // Cool shift.
    let r = (r * COOL_SHIFT_R).clamp(0.0, 1.0);
    let b = (b * COOL_SHIFT_B).clamp(0.0, 1.0);

    // Exposure.
    let r = (r * EXPOSURE).clamp(0.0, 1.0);
    let g = (g * EXPOSURE).clamp(0.0, 1.0);
    let b = (b * EXPOSURE).clamp(0.0, 1.0);

    (r, g, b)
}

/// Piecewise sRGB transfer function, linear [0, 1] to an 8-bit code value.
pub fn encode_srgb(v: f32) -> u8 {
    let v = v.clamp(0.0, 1.0);
    let encoded = if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0 + 0.5) as u8
}

/// IEEE 754 half-precision to single-precision.
pub fn half_to_f32(bits: u16) -> f32 {
    let sign = (bits >> 15) as u32;
    let exponent = ((bits >> 10) & 0x1F) as u32;
    let mantissa = (bits & 0x3FF) as u32;

    let f32_bits = if exponent == 0 {
        if mantissa == 0 {
            sign << 31
        } else {
            // Subnormal half: renormalize into an f32.
            let mut exponent = 127 - 15 + 1;
            let mut mantissa = mantissa;
            while mantissa & 0x400 == 0 {
                mantissa <<= 1;
                exponent -= 1;
            }
            (sign << 31) | ((exponent as u32) << 23) | ((mantissa & 0x3FF) << 13)
        }
    } else if exponent == 0x1F {
        // Inf / NaN.
        (sign << 31) | (0xFF << 23) | (mantissa << 13)
    } else {
        (sign << 31) | ((exponent + 127 - 15) << 23) | (mantissa << 13)
    };
    f32::from_bits(f32_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_to_half(value: f32) -> u16 {
        // Good enough for test inputs: normal range only.
        let bits = value.to_bits();
        let sign = ((bits >> 16) & 0x8000) as u16;
        let exponent = ((bits >> 23) & 0xFF) as i32 - 127 + 15;
        let mantissa = ((bits >> 13) & 0x3FF) as u16;
        if exponent <= 0 {
            return sign;
        }
        sign | ((exponent as u16) << 10) | mantissa
    }

    #[test]
    fn half_round_trips_representative_values() {
        for value in [0.0f32, 0.25, 0.5, 1.0, 0.85, 2.0] {
            let decoded = half_to_f32(f32_to_half(value));
            assert!((decoded - value).abs() < 1e-3, "{value} -> {decoded}");
        }
    }

    #[test]
    fn half_handles_specials() {
        assert_eq!(half_to_f32(0x0000), 0.0);
        assert_eq!(half_to_f32(0x3C00), 1.0);
        assert_eq!(half_to_f32(0x7C00), f32::INFINITY);
        assert!(half_to_f32(0x7E00).is_nan());
        // Smallest subnormal half.
        assert!((half_to_f32(0x0001) - 5.960_464_5e-8).abs() < 1e-10);
    }

    #[test]
    fn black_stays_black_and_outputs_are_clamped() {
        assert_eq!(map_pixel(0.0, 0.0, 0.0), (0.0, 0.0, 0.0));

        // Values far above SDR white clamp before the stages run.
        let (r, g, b) = map_pixel(40.0, 40.0, 40.0);
        assert!(r <= 1.0 && g <= 1.0 && b <= 1.0);
    }

    #[test]
    fn reference_white_lands_below_full_scale() {
        let (r, g, b) = map_pixel(1.0, 1.0, 1.0);
        // Gray is invariant under the saturation stage, so only the cool
        // shift and the exposure scale remain.
        assert!((g - EXPOSURE).abs() < 1e-6);
        assert!((r - EXPOSURE * COOL_SHIFT_R).abs() < 1e-6);
        assert!((b - EXPOSURE).abs() < 1e-6, "blue clamps at 1.0 first");

        // And after gamma encode, white sits visibly below 255.
        let code = encode_srgb(g);
        assert!(code < 240, "code {code}");
        assert!(code > 200, "code {code}");
    }

    #[test]
    fn saturation_widens_channel_spread() {
        let (r, _g, b) = map_pixel(0.6, 0.3, 0.3);
        // Red was above luma, so it must gain relative to a pure exposure
        // scale; blue was below luma and must lose.
        assert!(r > 0.6 * COOL_SHIFT_R * EXPOSURE);
        assert!(b < 0.3 * COOL_SHIFT_B * EXPOSURE);
    }

    #[test]
    fn srgb_encode_hits_the_anchors() {
        assert_eq!(encode_srgb(0.0), 0);
        assert_eq!(encode_srgb(1.0), 255);
        // Linear 0.5 encodes to ~188 in sRGB.
        assert_eq!(encode_srgb(0.5), 188);
    }

    #[test]
    fn fp16_buffer_maps_to_bgra() {
        // Two pixels: pure red and pure blue at SDR white level.
        let mut src = Vec::new();
        for (r, g, b) in [(1.0f32, 0.0, 0.0), (0.0, 0.0, 1.0)] {
            for v in [r, g, b, 1.0] {
                src.extend_from_slice(&f32_to_half(v).to_le_bytes());
            }
        }
        let mut dst = Vec::new();
        map_f16_rgba_to_bgra8(&src, 2, &mut dst);
        assert_eq!(dst.len(), 8);

        // Pixel 0 (red): red channel dominant, alpha opaque.
        assert!(dst[2] > dst[0] && dst[2] > dst[1]);
        assert_eq!(dst[3], 255);
        // Pixel 1 (blue): blue channel dominant.
        assert!(dst[4] > dst[5] && dst[4] > dst[6]);
    }
}
