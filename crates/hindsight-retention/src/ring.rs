//! Focus ring buffer: the in-memory mirror of the segment files on disk.
//!
//! Ordered by segment creation, capped at `max_segments`; eviction deletes
//! the evicted file best-effort. A single-writer/multi-reader lock guards
//! the list — mutators take the write half, accessors the read half.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use hindsight_core::time::parse_stamp;
use hindsight_core::VideoSegment;

pub struct RingBuffer {
    entries: RwLock<Vec<VideoSegment>>,
    max_segments: usize,
    default_duration: Duration,
}

impl RingBuffer {
    pub fn new(max_segments: usize, default_duration: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_segments: max_segments.max(1),
            default_duration,
        }
    }

    /// Rebuild the ring from the segment files left by a previous run.
    ///
    /// Files are ordered by their filename stamp, tie-broken by filesystem
    /// creation time and then by path (stamps can collide across
    /// interleaved runs, so alphabetic order alone is not trusted).
    /// Durations are reconstructed by differencing successive starts; the
    /// final segment gets the configured default. The eviction pass runs
    /// once after recovery.
    pub fn recover(dir: &Path, max_segments: usize, default_duration: Duration) -> Self {
        let ring = Self::new(max_segments, default_duration);

        let mut found: Vec<(DateTime<Utc>, SystemTime, PathBuf)> = Vec::new();
        match fs::read_dir(dir) {
            Ok(read) => {
                for entry in read.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
                        continue;
                    }
                    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    let Some(stamp) = parse_stamp(stem) else {
                        debug!("ignoring unstamped file {}", path.display());
                        continue;
                    };
                    let created = entry
                        .metadata()
                        .and_then(|m| m.created().or_else(|_| m.modified()))
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    found.push((stamp, created, path));
                }
            }
            Err(err) => {
                warn!("segment directory scan failed: {err}");
                return ring;
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let starts: Vec<DateTime<Utc>> = found.iter().map(|f| f.0).collect();
        {
            let mut entries = ring.entries.write().expect("ring lock poisoned");
            for (i, (started_at, _, path)) in found.into_iter().enumerate() {
                let duration = match starts.get(i + 1) {
                    Some(next) => (*next - started_at)
                        .to_std()
                        .ok()
                        .filter(|d| !d.is_zero())
                        .unwrap_or(default_duration),
                    None => default_duration,
                };
                entries.push(VideoSegment {
                    path,
                    started_at,
                    duration,
                });
            }
            let evicted = Self::evict_locked(&mut entries, ring.max_segments);
            if !entries.is_empty() || evicted > 0 {
                info!(
                    "recovered {} segment(s), evicted {} over the cap",
                    entries.len(),
                    evicted
                );
            }
        }
        ring
    }

    /// Append a finalized segment and evict from the front past the cap.
    pub fn add_segment(&self, segment: VideoSegment) {
        let mut entries = self.entries.write().expect("ring lock poisoned");
        entries.push(segment);
        Self::evict_locked(&mut entries, self.max_segments);
    }

    /// All entries whose `[start, start + duration)` range intersects
    /// `[from, to)`, in creation order.
    pub fn segments_for_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<VideoSegment> {
        let entries = self.entries.read().expect("ring lock poisoned");
        entries
            .iter()
            .filter(|seg| seg.started_at < to && seg.end() > from)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.entries.read().expect("ring lock poisoned").len()
    }

    pub fn total_duration(&self) -> Duration {
        self.entries
            .read()
            .expect("ring lock poisoned")
            .iter()
            .map(|seg| seg.duration)
            .sum()
    }

    /// Remove front entries past `max`, deleting their files best-effort.
    fn evict_locked(entries: &mut Vec<VideoSegment>, max: usize) -> usize {
        let mut evicted = 0;
        while entries.len() > max {
            let victim = entries.remove(0);
            evicted += 1;
            match fs::remove_file(&victim.path) {
                Ok(()) => debug!("evicted segment {}", victim.path.display()),
                Err(err) => warn!(
                    "failed to delete evicted segment {}: {err}",
                    victim.path.display()
                ),
            }
        }
        evicted
    }
}
