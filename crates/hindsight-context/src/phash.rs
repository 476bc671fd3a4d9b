//! 256-bit mean-threshold perceptual hash.
//!
//! The frame is downscaled to 16×16 by nearest neighbor, converted to
//! BT.709 luma, and each of the 256 samples contributes one bit: set iff
//! the sample exceeds the arithmetic mean. Visually similar frames land
//! within a few bits of each other; the change detector compares hashes by
//! Hamming distance.

/// Downscale grid edge; the hash has `GRID × GRID` bits.
const GRID: usize = 16;

/// Number of 64-bit words in the hash.
const WORDS: usize = (GRID * GRID) / 64;

/// A 256-bit perceptual hash as four 64-bit words. Bit *i* of the hash
/// lives in word *i / 64* at offset *i % 64*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerceptualHash(pub [u64; WORDS]);

impl PerceptualHash {
    /// Hash a BGRA frame. The buffer must hold at least `width × height × 4`
    /// bytes; callers validate geometry before reaching this point.
    pub fn compute(bgra: &[u8], width: u32, height: u32) -> Self {
        debug_assert!(bgra.len() >= width as usize * height as usize * 4);

        let w = width as usize;
        let h = height as usize;
        let mut gray = [0f32; GRID * GRID];
        let mut sum = 0f32;

        for gy in 0..GRID {
            let sy = gy * h / GRID;
            for gx in 0..GRID {
                let sx = gx * w / GRID;
                let idx = (sy * w + sx) * 4;
                let b = bgra[idx] as f32;
                let g = bgra[idx + 1] as f32;
                let r = bgra[idx + 2] as f32;
                let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
                gray[gy * GRID + gx] = luma;
                sum += luma;
            }
        }

        let mean = sum / (GRID * GRID) as f32;
        let mut words = [0u64; WORDS];
        for (i, &luma) in gray.iter().enumerate() {
            if luma > mean {
                words[i / 64] |= 1u64 << (i % 64);
            }
        }
        Self(words)
    }

    /// Number of differing bits between two hashes.
    pub fn hamming(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Compact 64-bit form (XOR of the four words) for catalog storage and
    /// coarse comparison.
    pub fn compact(&self) -> u64 {
        self.0.iter().fold(0, |acc, w| acc ^ w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solid-color frame with one bright square in the upper-left quadrant.
    fn frame_with_patch(width: u32, height: u32, patch: u32, level: u8) -> Vec<u8> {
        let mut data = vec![16u8; (width * height * 4) as usize];
        for y in 0..patch.min(height) {
            for x in 0..patch.min(width) {
                let idx = ((y * width + x) * 4) as usize;
                data[idx] = level;
                data[idx + 1] = level;
                data[idx + 2] = level;
            }
        }
        data
    }

    #[test]
    fn identical_frames_hash_identically() {
        let a = frame_with_patch(64, 64, 16, 240);
        let b = frame_with_patch(64, 64, 16, 240);
        let ha = PerceptualHash::compute(&a, 64, 64);
        let hb = PerceptualHash::compute(&b, 64, 64);
        assert_eq!(ha, hb);
        assert_eq!(ha.hamming(&hb), 0);
    }

    #[test]
    fn different_content_is_far_apart() {
        let a = frame_with_patch(64, 64, 16, 240);
        // Patch in the same place but four times the area.
        let b = frame_with_patch(64, 64, 32, 240);
        let ha = PerceptualHash::compute(&a, 64, 64);
        let hb = PerceptualHash::compute(&b, 64, 64);
        assert!(ha.hamming(&hb) > 5, "distance {}", ha.hamming(&hb));
    }

    #[test]
    fn hamming_is_a_metric() {
        let frames: Vec<Vec<u8>> = vec![
            frame_with_patch(32, 32, 8, 240),
            frame_with_patch(32, 32, 16, 240),
            frame_with_patch(32, 32, 24, 200),
        ];
        let hashes: Vec<PerceptualHash> = frames
            .iter()
            .map(|f| PerceptualHash::compute(f, 32, 32))
            .collect();

        for a in &hashes {
            assert_eq!(a.hamming(a), 0);
        }
        for a in &hashes {
            for b in &hashes {
                assert_eq!(a.hamming(b), b.hamming(a));
                for c in &hashes {
                    assert!(a.hamming(c) <= a.hamming(b) + b.hamming(c));
                }
            }
        }
    }

    #[test]
    fn bits_pack_into_words_low_to_high() {
        // A gradient frame: left half dark, right half bright. Each grid
        // row then contributes the same 16-bit pattern, so word 0 must
        // repeat that pattern in its low rows.
        let (w, h) = (32u32, 32u32);
        let mut data = vec![0u8; (w * h * 4) as usize];
        for y in 0..h {
            for x in 0..w {
                let level = if x >= w / 2 { 250 } else { 10 };
                let idx = ((y * w + x) * 4) as usize;
                data[idx] = level;
                data[idx + 1] = level;
                data[idx + 2] = level;
            }
        }
        let hash = PerceptualHash::compute(&data, w, h);
        // Grid row 0 occupies bits 0..16 of word 0: low 8 clear, high 8 set.
        assert_eq!(hash.0[0] & 0xFFFF, 0xFF00);
    }

    #[test]
    fn compact_is_xor_of_words() {
        let frame = frame_with_patch(64, 64, 20, 230);
        let hash = PerceptualHash::compute(&frame, 64, 64);
        let expected = hash.0[0] ^ hash.0[1] ^ hash.0[2] ^ hash.0[3];
        assert_eq!(hash.compact(), expected);
    }
}
