use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running counters for one task, plus the derived figures a progress UI
/// renders.
///
/// Only the counters are stored; percentage, throughput and ETA are always
/// recomputed from them so they cannot drift from their inputs. Invariant:
/// `processed == successful + failed + skipped` and `processed <= total`,
/// maintained by routing every update through [`TaskProgress::record_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Set when processing begins; anchors throughput and ETA derivation
    pub started_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    /// Create progress counters for `total` input rows
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            started_at: None,
        }
    }

    /// Mark the moment processing started, once
    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
    }

    /// Fold one batch outcome into the counters.
    ///
    /// `processed` advances by exactly `successful + failed + skipped`, capped
    /// so it never exceeds `total`.
    pub fn record_batch(&mut self, successful: usize, failed: usize, skipped: usize) {
        let delta = successful + failed + skipped;
        let room = self.total.saturating_sub(self.processed);
        if delta <= room {
            self.successful += successful;
            self.failed += failed;
            self.skipped += skipped;
            self.processed += delta;
            return;
        }

        // A well-behaved committer never reports more rows than it was given;
        // clamp rather than break the processed <= total invariant.
        tracing::warn!(
            delta,
            room,
            total = self.total,
            "batch outcome exceeds remaining rows, clamping"
        );
        let s = successful.min(room);
        let f = failed.min(room - s);
        let k = room - s - f;
        self.successful += s;
        self.failed += f;
        self.skipped += k;
        self.processed += room;
    }

    /// Completion percentage in [0.0, 100.0]; an empty input is 100% done
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed as f64 / self.total as f64) * 100.0
    }

    /// Rows committed per second since processing started
    pub fn throughput_rows_per_sec(&self, now: DateTime<Utc>) -> Option<f64> {
        let started = self.started_at?;
        let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 || self.processed == 0 {
            return None;
        }
        Some(self.processed as f64 / elapsed)
    }

    /// Estimated seconds until completion at the current throughput
    pub fn eta_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        let rate = self.throughput_rows_per_sec(now)?;
        let remaining = self.total.saturating_sub(self.processed);
        Some(remaining as f64 / rate)
    }

    /// True once every input row has been accounted for
    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }

    /// Remaining unprocessed rows
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }
}
