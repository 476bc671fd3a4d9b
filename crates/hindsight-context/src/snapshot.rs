//! JPEG snapshot writer for accepted context frames.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use hindsight_core::time::format_stamp;
use hindsight_core::{ContextSnapshot, RawFrame};

use crate::phash::PerceptualHash;

pub struct SnapshotWriter {
    dir: PathBuf,
    quality: u8,
}

impl SnapshotWriter {
    pub fn new(dir: PathBuf, quality: u8) -> Self {
        Self { dir, quality }
    }

    /// Encode the frame to `<dir>/<stamp>.jpg` and return its catalog
    /// record. Millisecond stamps can collide under bursty acceptance;
    /// the stamp is bumped until the name is free so no live file is
    /// overwritten.
    pub fn write(
        &self,
        frame: &RawFrame,
        hash: &PerceptualHash,
        taken_at: DateTime<Utc>,
    ) -> Result<ContextSnapshot> {
        let mut taken_at = taken_at;
        let mut path = self.dir.join(format!("{}.jpg", format_stamp(taken_at)));
        while path.exists() {
            taken_at += chrono::TimeDelta::milliseconds(1);
            path = self.dir.join(format!("{}.jpg", format_stamp(taken_at)));
        }
        let rgb = bgra_to_rgb(&frame.data, frame.width, frame.height);

        let file = File::create(&path)
            .with_context(|| format!("creating snapshot {}", path.display()))?;
        let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), self.quality);
        encoder
            .encode(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
            .with_context(|| format!("encoding snapshot {}", path.display()))?;

        Ok(ContextSnapshot {
            path,
            timestamp: taken_at,
            compact_hash: hash.compact(),
        })
    }
}

fn bgra_to_rgb(bgra: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(pixels * 3);
    for px in bgra[..pixels * 4].chunks_exact(4) {
        rgb.push(px[2]);
        rgb.push(px[1]);
        rgb.push(px[0]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;

    fn test_frame(width: u32, height: u32) -> RawFrame {
        let mut data = vec![0u8; (width * height * 4) as usize];
        for (i, px) in data.chunks_exact_mut(4).enumerate() {
            px[0] = (i % 251) as u8; // B
            px[1] = (i % 83) as u8; // G
            px[2] = (i % 17) as u8; // R
            px[3] = 255;
        }
        RawFrame {
            data: Bytes::from(data),
            width,
            height,
            timestamp_hns: 0,
        }
    }

    #[test]
    fn writes_a_decodable_jpeg_with_the_stamped_name() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(tmp.path().to_path_buf(), 85);
        let frame = test_frame(32, 24);
        let hash = PerceptualHash::compute(&frame.data, 32, 24);
        let at = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();

        let snap = writer.write(&frame, &hash, at).unwrap();
        assert_eq!(snap.path.file_name().unwrap(), "20250203_040506_000.jpg");
        assert_eq!(snap.timestamp, at);
        assert_eq!(snap.compact_hash, hash.compact());

        let decoded = image::open(&snap.path).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
    }

    #[test]
    fn bgra_channels_land_swapped() {
        let rgb = bgra_to_rgb(&[10, 20, 30, 255], 1, 1);
        assert_eq!(rgb, vec![30, 20, 10]);
    }
}
