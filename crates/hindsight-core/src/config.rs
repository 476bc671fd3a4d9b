//! Recorder configuration and on-disk layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::control::CaptureMode;

// ── RecorderConfig ────────────────────────────────────────────────────────────

/// Persisted recorder settings. Every field has a default, and the
/// camelCase aliases keep settings files written by the tray UI parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    #[serde(alias = "encodeWidth")]
    pub encode_width: u32,
    #[serde(alias = "encodeHeight")]
    pub encode_height: u32,
    #[serde(alias = "encodeFPS", alias = "encodeFps")]
    pub encode_fps: u32,
    #[serde(alias = "segmentDurationSeconds")]
    pub segment_duration_seconds: u32,
    /// Total focus history to keep; segment count is derived from this.
    #[serde(alias = "bufferDurationSeconds")]
    pub buffer_duration_seconds: u32,
    #[serde(alias = "captureMode")]
    pub capture_mode: CaptureMode,
    #[serde(alias = "ocrEnabled")]
    pub ocr_enabled: bool,
    #[serde(alias = "bitrateKbps")]
    pub bitrate_kbps: u32,
    /// Hamming-distance cutoff for the context change detector.
    #[serde(alias = "changeThreshold")]
    pub change_threshold: u32,
    #[serde(alias = "contextRetentionSeconds")]
    pub context_retention_seconds: u64,
    #[serde(alias = "maxContextFrames")]
    pub max_context_frames: usize,
    #[serde(alias = "jpegQuality")]
    pub jpeg_quality: u8,
    #[serde(alias = "baseDir")]
    pub base_dir: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            encode_width: 1920,
            encode_height: 1080,
            encode_fps: 30,
            segment_duration_seconds: 5,
            buffer_duration_seconds: 30,
            capture_mode: CaptureMode::Focus,
            ocr_enabled: false,
            bitrate_kbps: 8000,
            change_threshold: 5,
            context_retention_seconds: 120,
            max_context_frames: 120,
            jpeg_quality: 85,
            base_dir: PathBuf::from("."),
        }
    }
}

impl RecorderConfig {
    /// Segment-count cap of the focus ring buffer.
    pub fn max_segments(&self) -> usize {
        (self.buffer_duration_seconds / self.segment_duration_seconds.max(1)).max(1) as usize
    }

    /// Frames per segment at the configured rate.
    pub fn frames_per_segment(&self) -> u64 {
        self.encode_fps as u64 * self.segment_duration_seconds as u64
    }

    /// Clamp nonsense values back to defaults and round the encode
    /// geometry down to even (the NV12 planes divide by two).
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.encode_fps == 0 {
            warn!("encode_fps=0 is invalid, using {}", defaults.encode_fps);
            self.encode_fps = defaults.encode_fps;
        }
        if self.segment_duration_seconds == 0 {
            warn!(
                "segment_duration_seconds=0 is invalid, using {}",
                defaults.segment_duration_seconds
            );
            self.segment_duration_seconds = defaults.segment_duration_seconds;
        }
        if self.encode_width == 0 || self.encode_height == 0 {
            warn!(
                "encode geometry {}x{} is invalid, using {}x{}",
                self.encode_width, self.encode_height, defaults.encode_width, defaults.encode_height
            );
            self.encode_width = defaults.encode_width;
            self.encode_height = defaults.encode_height;
        }
        self.encode_width &= !1;
        self.encode_height &= !1;
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            self.jpeg_quality = defaults.jpeg_quality;
        }
        self
    }
}

// ── DataDirs ──────────────────────────────────────────────────────────────────

/// Resolved on-disk layout, all relative to the configured base directory:
///
/// ```text
/// <base>/data/focus_buffer/<stamp>.mp4     rolling MP4 segments
/// <base>/data/context_buffer/<stamp>.jpg   context snapshots
/// <base>/data/index.sqlite                 context catalog (WAL)
/// <base>/clips/<stamp>.mp4                 materialized clips
/// ```
#[derive(Debug, Clone)]
pub struct DataDirs {
    pub focus_buffer: PathBuf,
    pub context_buffer: PathBuf,
    pub index_db: PathBuf,
    pub clips: PathBuf,
}

impl DataDirs {
    /// Resolve the layout under `base` and create the directories.
    pub fn prepare(base: &Path) -> std::io::Result<Self> {
        let data = base.join("data");
        let dirs = Self {
            focus_buffer: data.join("focus_buffer"),
            context_buffer: data.join("context_buffer"),
            index_db: data.join("index.sqlite"),
            clips: base.join("clips"),
        };
        std::fs::create_dir_all(&dirs.focus_buffer)?;
        std::fs::create_dir_all(&dirs.context_buffer)?;
        std::fs::create_dir_all(&dirs.clips)?;
        Ok(dirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "encodeWidth": 1280,
            "encodeHeight": 720,
            "encodeFPS": 30,
            "segmentDurationSeconds": 5,
            "bufferDurationSeconds": 30,
            "captureMode": "context",
            "ocrEnabled": true
        }"#;

        let cfg: RecorderConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.encode_width, 1280);
        assert_eq!(cfg.encode_height, 720);
        assert_eq!(cfg.capture_mode, CaptureMode::Context);
        assert!(cfg.ocr_enabled);
        // Untouched fields fall back to defaults.
        assert_eq!(cfg.bitrate_kbps, 8000);
    }

    #[test]
    fn deserializes_snake_case_fields() {
        let json = r#"{
            "encode_width": 640,
            "encode_height": 360,
            "encode_fps": 30,
            "capture_mode": "focus"
        }"#;

        let cfg: RecorderConfig = serde_json::from_str(json).expect("valid snake_case config");
        assert_eq!(cfg.encode_width, 640);
        assert_eq!(cfg.capture_mode, CaptureMode::Focus);
    }

    #[test]
    fn max_segments_derives_from_durations() {
        let cfg = RecorderConfig::default();
        assert_eq!(cfg.max_segments(), 6);

        let cfg = RecorderConfig {
            buffer_duration_seconds: 10,
            segment_duration_seconds: 5,
            ..Default::default()
        };
        assert_eq!(cfg.max_segments(), 2);
    }

    #[test]
    fn normalized_rounds_geometry_down_to_even() {
        let cfg = RecorderConfig {
            encode_width: 1921,
            encode_height: 1081,
            ..Default::default()
        }
        .normalized();
        assert_eq!((cfg.encode_width, cfg.encode_height), (1920, 1080));
    }

    #[test]
    fn normalized_replaces_zero_rates() {
        let cfg = RecorderConfig {
            encode_fps: 0,
            segment_duration_seconds: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(cfg.encode_fps, 30);
        assert_eq!(cfg.segment_duration_seconds, 5);
    }

    #[test]
    fn prepare_creates_the_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DataDirs::prepare(tmp.path()).unwrap();
        assert!(dirs.focus_buffer.is_dir());
        assert!(dirs.context_buffer.is_dir());
        assert!(dirs.clips.is_dir());
        assert_eq!(dirs.index_db, tmp.path().join("data").join("index.sqlite"));
    }
}
