//! H.264 encoder enumeration and selection.
//!
//! Candidates come from the GStreamer registry; the pick itself is a pure
//! function over the candidate list so the priority rules are testable
//! without a media stack. Priority (hardware pass first):
//!
//! 1. NVIDIA   (`nvh264enc`, NVENC)
//! 2. Intel    (`qsvh264enc` / `msdkh264enc`, Quick Sync)
//! 3. AMD      (`amfh264enc`, AMF)
//! 4. any other hardware H.264 encoder
//! 5. software fallback (`x264enc`, `openh264enc`)
//!
//! If the hardware-only pass finds nothing, the same priority runs again
//! over every H.264-named candidate. The winner steers which element the
//! segment sink instantiates and what the log says; MP4 conformance does
//! not depend on it.

use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{info, warn};

// ── Candidate model ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Vendor {
    Nvidia,
    Intel,
    Amd,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderCandidate {
    /// GStreamer element factory name, e.g. `nvh264enc`.
    pub name: String,
    /// Human-readable factory long-name.
    pub display_name: String,
    pub vendor: Vendor,
    pub hardware: bool,
}

/// Substrings that mark an encoder as H.264-capable in its friendly name.
const H264_MARKERS: &[&str] = &["h264", "h.264", "avc", "x264"];

fn is_h264_named(candidate: &EncoderCandidate) -> bool {
    let name = candidate.name.to_ascii_lowercase();
    let display = candidate.display_name.to_ascii_lowercase();
    H264_MARKERS
        .iter()
        .any(|marker| name.contains(marker) || display.contains(marker))
}

pub fn classify_vendor(name: &str, display_name: &str) -> Vendor {
    let haystack = format!(
        "{} {}",
        name.to_ascii_lowercase(),
        display_name.to_ascii_lowercase()
    );
    if haystack.contains("nvidia") || haystack.contains("nvenc") || haystack.contains("nvh264") {
        Vendor::Nvidia
    } else if haystack.contains("intel")
        || haystack.contains("qsv")
        || haystack.contains("msdk")
        || haystack.contains("quick sync")
    {
        Vendor::Intel
    } else if haystack.contains("amd") || haystack.contains("amf") {
        Vendor::Amd
    } else {
        Vendor::Other
    }
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Pick the encoder to drive. Hardware-only first; if that pass is empty,
/// retry over all H.264-named candidates.
pub fn select_encoder(candidates: &[EncoderCandidate]) -> Option<&EncoderCandidate> {
    let hardware_pick = pick_by_priority(candidates.iter().filter(|c| c.hardware));
    match hardware_pick {
        Some(winner) => Some(winner),
        None => pick_by_priority(candidates.iter()),
    }
}

fn pick_by_priority<'a>(
    pool: impl Iterator<Item = &'a EncoderCandidate>,
) -> Option<&'a EncoderCandidate> {
    pool.filter(|c| is_h264_named(c))
        .min_by_key(|c| (c.vendor, !c.hardware))
}

// ── Registry probe ────────────────────────────────────────────────────────────

/// Enumerate H.264-capable video encoder factories from the GStreamer
/// registry.
pub fn probe() -> Vec<EncoderCandidate> {
    let factories = gst::ElementFactory::factories_with_type(
        gst::ElementFactoryType::VIDEO_ENCODER,
        gst::Rank::MARGINAL,
    );

    let mut candidates = Vec::new();
    for factory in factories {
        let name = factory.name().to_string();
        let display_name = factory.longname().to_string();
        let hardware = factory.klass().contains("Hardware");
        let candidate = EncoderCandidate {
            vendor: classify_vendor(&name, &display_name),
            name,
            display_name,
            hardware,
        };
        if is_h264_named(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Probe and select, logging the outcome the way the operator will read it.
pub fn probe_and_select() -> Option<EncoderCandidate> {
    let candidates = probe();
    match select_encoder(&candidates) {
        Some(winner) => {
            info!(
                "selected H.264 encoder: {} ({}, {:?}, {})",
                winner.name,
                winner.display_name,
                winner.vendor,
                if winner.hardware { "hardware" } else { "software" }
            );
            Some(winner.clone())
        }
        None => {
            warn!("no H.264 encoder found in the media registry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, display: &str, hardware: bool) -> EncoderCandidate {
        EncoderCandidate {
            vendor: classify_vendor(name, display),
            name: name.to_string(),
            display_name: display.to_string(),
            hardware,
        }
    }

    #[test]
    fn nvidia_hardware_beats_everything() {
        let pool = vec![
            candidate("x264enc", "x264 H.264 Encoder", false),
            candidate("amfh264enc", "AMD AMF H.264 Encoder", true),
            candidate("qsvh264enc", "Intel Quick Sync H.264 Encoder", true),
            candidate("nvh264enc", "NVIDIA NVENC H.264 Encoder", true),
        ];
        assert_eq!(select_encoder(&pool).unwrap().name, "nvh264enc");
    }

    #[test]
    fn intel_beats_amd_beats_unknown_hardware() {
        let pool = vec![
            candidate("someh264enc", "Mystery H264 Hardware Encoder", true),
            candidate("amfh264enc", "AMD AMF H.264 Encoder", true),
            candidate("qsvh264enc", "Intel Quick Sync H.264 Encoder", true),
        ];
        assert_eq!(select_encoder(&pool).unwrap().name, "qsvh264enc");

        let pool = vec![
            candidate("someh264enc", "Mystery H264 Hardware Encoder", true),
            candidate("amfh264enc", "AMD AMF H.264 Encoder", true),
        ];
        assert_eq!(select_encoder(&pool).unwrap().name, "amfh264enc");
    }

    #[test]
    fn software_is_used_only_when_no_hardware_matches() {
        let pool = vec![
            candidate("x264enc", "x264 H.264 Encoder", false),
            candidate("vp9enc", "VP9 Encoder", true),
        ];
        assert_eq!(select_encoder(&pool).unwrap().name, "x264enc");
    }

    #[test]
    fn non_h264_candidates_never_win() {
        let pool = vec![
            candidate("vp9enc", "VP9 Encoder", true),
            candidate("av1enc", "AV1 Encoder", false),
        ];
        assert!(select_encoder(&pool).is_none());
        assert!(select_encoder(&[]).is_none());
    }

    #[test]
    fn h264_matching_is_case_insensitive_across_markers() {
        for display in ["Super H264 Enc", "super h.264 enc", "AVC Encoder", "X264"] {
            let c = candidate("enc", display, false);
            assert!(is_h264_named(&c), "{display}");
        }
        assert!(!is_h264_named(&candidate("enc", "HEVC Encoder", false)));
    }

    #[test]
    fn vendor_classification_reads_both_names() {
        assert_eq!(classify_vendor("nvh264enc", ""), Vendor::Nvidia);
        assert_eq!(classify_vendor("enc", "Intel Quick Sync Video"), Vendor::Intel);
        assert_eq!(classify_vendor("msdkh264enc", ""), Vendor::Intel);
        assert_eq!(classify_vendor("amfh264enc", ""), Vendor::Amd);
        assert_eq!(classify_vendor("x264enc", "x264 encoder"), Vendor::Other);
    }
}
