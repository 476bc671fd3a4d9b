//! MP4 segment sink.
//!
//! [`SegmentSink`] is the seam between the encoder worker's state machine
//! and the media stack: `begin` opens a segment file, `write_sample`
//! pushes one NV12 frame, `finalize` closes the MP4. The production
//! implementation builds one GStreamer pipeline per segment:
//!
//! ```text
//! appsrc (NV12, format=time) → <h264 encoder> → h264parse → mp4mux → filesink
//! ```
//!
//! Encoder element priority comes from [`crate::select`]; per-element
//! property strings follow the quirks of each encoder family.

use std::path::{Path, PathBuf};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use tracing::{debug, info, warn};

use hindsight_core::EncodeError;

// ── Media parameters ──────────────────────────────────────────────────────────

/// Output configuration shared by every segment of a run.
#[derive(Debug, Clone, Copy)]
pub struct MediaParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
}

impl MediaParams {
    /// Frame size packed as `(width << 32) | height`, the layout the
    /// platform media APIs expect for attribute blobs.
    pub fn packed_frame_size(&self) -> u64 {
        ((self.width as u64) << 32) | self.height as u64
    }

    /// Frame rate packed as `(fps << 32) | 1`.
    pub fn packed_frame_rate(&self) -> u64 {
        ((self.fps as u64) << 32) | 1
    }

    /// Duration of one sample in 100-ns units.
    pub fn sample_duration_hns(&self) -> i64 {
        10_000_000 / self.fps.max(1) as i64
    }
}

// ── SegmentSink ───────────────────────────────────────────────────────────────

/// One segment's write surface. Implementations are synchronous; the
/// encoder worker serializes all calls.
pub trait SegmentSink: Send {
    /// Open a new segment at `path`.
    fn begin(&mut self, path: &Path, params: &MediaParams) -> Result<(), EncodeError>;

    /// Append one NV12 frame. `sample_time_hns` and `duration_hns` are in
    /// 100-ns units, derived from the frame counter rather than the wall
    /// clock.
    fn write_sample(
        &mut self,
        nv12: &[u8],
        sample_time_hns: i64,
        duration_hns: i64,
    ) -> Result<(), EncodeError>;

    /// Finalize the open segment into a playable MP4.
    fn finalize(&mut self) -> Result<(), EncodeError>;
}

// ── GStreamer implementation ──────────────────────────────────────────────────

struct ActiveSegment {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    path: PathBuf,
}

/// GStreamer-backed [`SegmentSink`]. One pipeline per segment; EOS at
/// finalize flushes the mux so the file closes playable.
pub struct GstSegmentSink {
    encoder_name: String,
    active: Option<ActiveSegment>,
}

impl GstSegmentSink {
    /// `encoder_name` is the element factory chosen by the selection pass;
    /// callers fall back to `x264enc` when selection found nothing.
    pub fn new(encoder_name: impl Into<String>) -> Self {
        Self {
            encoder_name: encoder_name.into(),
            active: None,
        }
    }

    fn encoder_fragment(&self, params: &MediaParams) -> String {
        let kbps = params.bitrate_kbps;
        match self.encoder_name.as_str() {
            "nvh264enc" => format!("nvh264enc bitrate={kbps} preset=low-latency-hq"),
            "mfh264enc" => format!("mfh264enc bitrate={kbps} low-latency=true"),
            "qsvh264enc" => format!("qsvh264enc bitrate={kbps}"),
            "amfh264enc" => format!("amfh264enc bitrate={kbps}"),
            "x264enc" => format!(
                "x264enc bitrate={kbps} speed-preset=veryfast key-int-max={}",
                params.fps * 2
            ),
            other => other.to_string(),
        }
    }
}

impl SegmentSink for GstSegmentSink {
    fn begin(&mut self, path: &Path, params: &MediaParams) -> Result<(), EncodeError> {
        if self.active.is_some() {
            return Err(EncodeError::Configure {
                reason: "segment already open".into(),
            });
        }

        let MediaParams { width, height, fps, .. } = *params;
        let location = path.display();
        let encoder = self.encoder_fragment(params);
        let description = format!(
            "appsrc name=src is-live=true format=time \
             caps=video/x-raw,format=NV12,width={width},height={height},\
             framerate={fps}/1,pixel-aspect-ratio=1/1,interlace-mode=progressive \
             ! {encoder} \
             ! h264parse \
             ! mp4mux \
             ! filesink location={location}"
        );
        debug!("segment pipeline: {description}");

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| EncodeError::Configure {
                reason: format!("pipeline parse: {e}"),
            })?
            .downcast::<gst::Pipeline>()
            .map_err(|_| EncodeError::Configure {
                reason: "pipeline downcast failed".into(),
            })?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| EncodeError::Configure {
                reason: "appsrc element missing".into(),
            })?
            .downcast::<AppSrc>()
            .map_err(|_| EncodeError::Configure {
                reason: "appsrc downcast failed".into(),
            })?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncodeError::Configure {
                reason: format!("pipeline to Playing: {e}"),
            })?;

        info!(
            "segment open: {} ({width}x{height} @{fps}fps, {} kbps, {})",
            path.display(),
            params.bitrate_kbps,
            self.encoder_name
        );
        self.active = Some(ActiveSegment {
            pipeline,
            appsrc,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn write_sample(
        &mut self,
        nv12: &[u8],
        sample_time_hns: i64,
        duration_hns: i64,
    ) -> Result<(), EncodeError> {
        let active = self.active.as_ref().ok_or_else(|| EncodeError::WriteSample {
            reason: "no open segment".into(),
        })?;

        let mut buffer = gst::Buffer::with_size(nv12.len()).map_err(|e| {
            EncodeError::WriteSample {
                reason: format!("buffer alloc: {e}"),
            }
        })?;
        {
            let buffer = buffer.get_mut().expect("freshly allocated buffer");
            buffer.set_pts(gst::ClockTime::from_nseconds(sample_time_hns as u64 * 100));
            buffer.set_duration(gst::ClockTime::from_nseconds(duration_hns as u64 * 100));
            let mut map = buffer.map_writable().map_err(|e| EncodeError::WriteSample {
                reason: format!("buffer map: {e}"),
            })?;
            map.as_mut_slice().copy_from_slice(nv12);
        }

        active
            .appsrc
            .push_buffer(buffer)
            .map_err(|e| EncodeError::WriteSample {
                reason: format!("push_buffer: {e}"),
            })?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), EncodeError> {
        let active = self.active.take().ok_or_else(|| EncodeError::Finalize {
            reason: "no open segment".into(),
        })?;

        active.appsrc.end_of_stream().map_err(|e| EncodeError::Finalize {
            reason: format!("end_of_stream: {e}"),
        })?;

        // Wait for the mux to flush; without the EOS round-trip the moov
        // atom never lands and the file is unplayable.
        if let Some(bus) = active.pipeline.bus() {
            match bus.timed_pop_filtered(
                gst::ClockTime::from_seconds(10),
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) {
                Some(message) => {
                    if let gst::MessageView::Error(err) = message.view() {
                        let _ = active.pipeline.set_state(gst::State::Null);
                        return Err(EncodeError::Finalize {
                            reason: format!("pipeline error at finalize: {}", err.error()),
                        });
                    }
                }
                None => {
                    warn!("EOS wait timed out for {}", active.path.display());
                }
            }
        }

        active
            .pipeline
            .set_state(gst::State::Null)
            .map_err(|e| EncodeError::Finalize {
                reason: format!("pipeline to Null: {e}"),
            })?;

        info!("segment finalized: {}", active.path.display());
        Ok(())
    }
}

impl Drop for GstSegmentSink {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.pipeline.set_state(gst::State::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_forms_match_the_attribute_layout() {
        let params = MediaParams {
            width: 1920,
            height: 1080,
            fps: 30,
            bitrate_kbps: 8000,
        };
        assert_eq!(params.packed_frame_size(), (1920u64 << 32) | 1080);
        assert_eq!(params.packed_frame_rate(), (30u64 << 32) | 1);
    }

    #[test]
    fn sample_duration_is_in_100ns_units() {
        let params = MediaParams {
            width: 640,
            height: 360,
            fps: 30,
            bitrate_kbps: 8000,
        };
        assert_eq!(params.sample_duration_hns(), 333_333);

        let params = MediaParams { fps: 25, ..params };
        assert_eq!(params.sample_duration_hns(), 400_000);
    }
}
