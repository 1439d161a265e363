use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Export counters of one exporter.
///
/// Only mutated while the exporter lock is held; read lock-free by
/// introspection.
#[derive(Debug, Default)]
pub(crate) struct ExportCounters {
    points_received: AtomicU64,
    points_exported: AtomicU64,
    points_dropped: AtomicU64,
    export_retries: AtomicU64,
    export_failures: AtomicU64,
    exports: AtomicU64,
}

impl ExportCounters {
    pub(crate) fn inc_received(&self) {
        self.points_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_exported_points(&self, points: u64) {
        self.points_exported.fetch_add(points, Ordering::Relaxed);
    }

    pub(crate) fn inc_dropped_points(&self, points: u64) {
        self.points_dropped.fetch_add(points, Ordering::Relaxed);
    }

    pub(crate) fn inc_export_retries(&self) {
        self.export_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_export_failures(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_exports(&self) {
        self.exports.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> ExportStats {
        ExportStats {
            points_received: self.points_received.load(Ordering::Relaxed),
            points_exported: self.points_exported.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
            export_retries: self.export_retries.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
            exports: self.exports.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the export counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    /// Records handed to `export_data`.
    pub points_received: u64,
    pub points_exported: u64,
    pub points_dropped: u64,
    pub export_retries: u64,
    pub export_failures: u64,
    /// Non-empty flushes attempted.
    pub exports: u64,
}

impl ExportStats {
    /// Records accepted but neither written nor dropped yet.
    pub fn points_pending(&self) -> u64 {
        self.points_received
            .saturating_sub(self.points_exported + self.points_dropped)
    }
}
