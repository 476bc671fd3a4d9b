//! Clip materialization: resolve a retrospective window against the ring
//! buffer and concatenate the selected segments into one output file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use hindsight_core::time::format_stamp;
use hindsight_core::{ClipError, ClipOutcome, ClipRequest};

use crate::ring::RingBuffer;

/// Materialize `[requested_at - duration, requested_at]` into
/// `<clips_dir>/<stamp>.mp4`.
///
/// Returns `Ok(None)` when the window selects no segments (no file is
/// created). When the window is wider than the buffered history, whatever
/// exists is materialized and the outcome reports the actual span.
pub fn materialize(
    ring: &RingBuffer,
    clips_dir: &Path,
    request: &ClipRequest,
) -> Result<Option<ClipOutcome>, ClipError> {
    let to = request.requested_at;
    let from = to
        - chrono::TimeDelta::from_std(request.duration)
            .unwrap_or_else(|_| chrono::TimeDelta::MAX);

    let segments = ring.segments_for_range(from, to);
    if segments.is_empty() {
        info!("clip request selected no segments");
        return Ok(None);
    }

    let path = clips_dir.join(format!("{}.mp4", format_stamp(request.requested_at)));
    let mut out = BufWriter::new(File::create(&path)?);

    for segment in &segments {
        let mut input = File::open(&segment.path).map_err(|err| {
            warn!("segment {} unreadable: {err}", segment.path.display());
            ClipError::SegmentMissing {
                path: segment.path.display().to_string(),
            }
        })?;
        io::copy(&mut input, &mut out)?;
    }
    out.flush()?;

    let span_start = segments.first().expect("non-empty").started_at;
    let span_end = segments.last().expect("non-empty").end();
    info!(
        "materialized clip {} from {} segment(s)",
        path.display(),
        segments.len()
    );

    Ok(Some(ClipOutcome {
        path,
        span_start,
        span_end,
        segment_count: segments.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use std::time::Duration;

    use hindsight_core::VideoSegment;

    fn base() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap()
    }

    /// Ring of `n` 5-second segments starting at t=0, each file holding a
    /// distinctive payload so concatenation order is checkable.
    fn seeded_ring(dir: &Path, n: usize) -> RingBuffer {
        let ring = RingBuffer::new(n.max(1), Duration::from_secs(5));
        for i in 0..n {
            let started_at = base() + chrono::TimeDelta::seconds(i as i64 * 5);
            let path = dir.join(format!("{}.mp4", format_stamp(started_at)));
            fs::write(&path, format!("segment-{i};")).unwrap();
            ring.add_segment(VideoSegment {
                path,
                started_at,
                duration: Duration::from_secs(5),
            });
        }
        ring
    }

    #[test]
    fn last_ten_seconds_of_a_thirty_second_ring() {
        let tmp = tempfile::tempdir().unwrap();
        let ring = seeded_ring(tmp.path(), 6);

        let outcome = materialize(
            &ring,
            tmp.path(),
            &ClipRequest {
                requested_at: base() + chrono::TimeDelta::seconds(30),
                duration: Duration::from_secs(10),
            },
        )
        .unwrap()
        .expect("clip produced");

        assert_eq!(outcome.segment_count, 2);
        assert_eq!(outcome.span_start, base() + chrono::TimeDelta::seconds(20));
        assert_eq!(outcome.span_end, base() + chrono::TimeDelta::seconds(30));
        assert_eq!(
            fs::read_to_string(&outcome.path).unwrap(),
            "segment-4;segment-5;"
        );
    }

    #[test]
    fn zero_duration_produces_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let ring = seeded_ring(tmp.path(), 6);

        let before: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        let outcome = materialize(
            &ring,
            tmp.path(),
            &ClipRequest {
                requested_at: base() + chrono::TimeDelta::seconds(30),
                duration: Duration::ZERO,
            },
        )
        .unwrap();
        assert!(outcome.is_none());
        let after: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(before.len(), after.len());
    }

    #[test]
    fn oversized_window_materializes_everything_available() {
        let tmp = tempfile::tempdir().unwrap();
        let ring = seeded_ring(tmp.path(), 3);

        let outcome = materialize(
            &ring,
            tmp.path(),
            &ClipRequest {
                requested_at: base() + chrono::TimeDelta::seconds(15),
                duration: Duration::from_secs(3600),
            },
        )
        .unwrap()
        .expect("clip produced");

        assert_eq!(outcome.segment_count, 3);
        assert_eq!(outcome.span_start, base());
        assert_eq!(outcome.span_end, base() + chrono::TimeDelta::seconds(15));
    }

    #[test]
    fn missing_segment_file_reports_failure_without_touching_the_ring() {
        let tmp = tempfile::tempdir().unwrap();
        let ring = seeded_ring(tmp.path(), 2);

        // Sabotage the first segment file.
        let victim = ring
            .segments_for_range(base(), base() + chrono::TimeDelta::seconds(5))
            .remove(0);
        fs::remove_file(&victim.path).unwrap();

        let err = materialize(
            &ring,
            tmp.path(),
            &ClipRequest {
                requested_at: base() + chrono::TimeDelta::seconds(10),
                duration: Duration::from_secs(10),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ClipError::SegmentMissing { .. }));
        assert_eq!(ring.count(), 2);
    }
}
