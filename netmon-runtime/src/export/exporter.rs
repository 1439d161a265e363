use super::accounting::{ExportCounters, ExportStats};
use super::dump::{DumpSink, DumpStore, FileSink};
use crate::config::ExporterSettings;
use crate::console::{self, Console};
use crate::interface::InterfaceRef;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

struct ExportBuffer {
    data: Vec<u8>,
    num_cached_entries: u64,
    last_flush: Instant,
    dump: DumpStore,
}

/// Per-interface timeseries exporter.
///
/// Serialized points are appended to an in-memory buffer which is written to
/// the interface's current dump file when it would overflow, when the flush
/// interval has elapsed, on explicit [`flush`](Self::flush), and on drop.
/// Failures never reach callers; they show up in [`stats`](Self::stats).
pub struct TimeseriesExporter {
    interface: InterfaceRef,
    capacity: usize,
    flush_interval: Duration,
    max_retries: u32,
    buffer: Mutex<ExportBuffer>,
    counters: ExportCounters,
}

/// Exclusive access to an exporter for a sequence of operations.
pub struct ExportGuard<'a> {
    exporter: &'a TimeseriesExporter,
    buffer: MutexGuard<'a, ExportBuffer>,
}

impl ExportGuard<'_> {
    /// Same as [`TimeseriesExporter::export_data`], with the lock already held.
    pub fn export(&mut self, record: &[u8]) {
        self.exporter.append(&mut self.buffer, record);
    }

    pub fn flush(&mut self) {
        self.exporter.flush_buffer(&mut self.buffer);
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.data.len()
    }
}

impl TimeseriesExporter {
    /// Exporter writing to files under `settings.dump_dir`.
    pub fn new(interface: InterfaceRef, settings: &ExporterSettings) -> Self {
        Self::with_sink(interface, settings, Box::new(FileSink::default()))
    }

    pub fn with_sink(interface: InterfaceRef, settings: &ExporterSettings, sink: Box<dyn DumpSink>) -> Self {
        let dump = DumpStore::new(settings, &interface, sink);
        Self {
            capacity: settings.capacity,
            flush_interval: settings.flush_interval,
            max_retries: settings.max_retries,
            buffer: Mutex::new(ExportBuffer {
                data: Vec::with_capacity(settings.capacity),
                num_cached_entries: 0,
                last_flush: Instant::now(),
                dump,
            }),
            counters: ExportCounters::default(),
            interface,
        }
    }

    pub fn interface(&self) -> &InterfaceRef {
        &self.interface
    }

    /// Queue one serialized point.
    pub fn export_data(&self, record: &[u8]) {
        self.lock().export(record);
    }

    /// Take the exporter lock to run several operations atomically.
    pub fn lock(&self) -> ExportGuard<'_> {
        ExportGuard {
            exporter: self,
            buffer: self.buffer.lock(),
        }
    }

    /// Write buffered points to the dump store now.
    pub fn flush(&self) {
        self.lock().flush();
    }

    pub fn stats(&self) -> ExportStats {
        self.counters.stats()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.lock().data.len()
    }

    pub fn snapshot(&self) -> ExporterSnapshot {
        let buffer = self.buffer.lock();
        ExporterSnapshot {
            interface: self.interface.clone(),
            stats: self.counters.stats(),
            buffered_bytes: buffer.data.len(),
            cached_entries: buffer.num_cached_entries,
            capacity: self.capacity,
            flush_interval_secs: self.flush_interval.as_secs(),
            db_created: buffer.dump.is_created(),
            dump_file: buffer
                .dump
                .current_file()
                .map(|path| path.display().to_string()),
        }
    }

    /// Publish [`snapshot`](Self::snapshot) to the console as `timeseries_exporter`.
    pub fn publish(&self, console: &mut dyn Console) {
        console::publish(console, "timeseries_exporter", &self.snapshot());
    }

    fn append(&self, buffer: &mut ExportBuffer, record: &[u8]) {
        self.counters.inc_received();

        if record.len() > self.capacity {
            warn!(
                interface = %self.interface,
                size = record.len(),
                capacity = self.capacity,
                "Timeseries record larger than the export buffer, dropping it"
            );
            self.counters.inc_dropped_points(1);
            return;
        }

        if buffer.data.len() + record.len() > self.capacity {
            self.flush_buffer(buffer);
        }
        // The interval counts from the oldest buffered point.
        if buffer.data.is_empty() {
            buffer.last_flush = Instant::now();
        }
        buffer.data.extend_from_slice(record);
        buffer.num_cached_entries += 1;

        if buffer.last_flush.elapsed() >= self.flush_interval {
            self.flush_buffer(buffer);
        }
    }

    fn flush_buffer(&self, buffer: &mut ExportBuffer) {
        let now = Instant::now();
        if buffer.data.is_empty() {
            buffer.last_flush = now;
            return;
        }

        let points = buffer.num_cached_entries;
        self.counters.inc_exports();

        let written = self.ensure_dump(&mut buffer.dump) && self.write_with_retries(buffer);
        if written {
            self.counters.inc_exported_points(points);
            debug!(
                interface = %self.interface,
                points,
                bytes = buffer.data.len(),
                "Timeseries buffer flushed"
            );
        } else {
            self.counters.inc_export_failures();
            self.counters.inc_dropped_points(points);
            error!(
                interface = %self.interface,
                points,
                "Timeseries export failed, dropping buffered points"
            );
        }

        buffer.data.clear();
        buffer.num_cached_entries = 0;
        buffer.last_flush = now;
    }

    fn ensure_dump(&self, dump: &mut DumpStore) -> bool {
        let now = Utc::now();
        if !dump.needs_rotation(now) {
            return true;
        }
        match dump.create(now) {
            Ok(_) => true,
            Err(e) => {
                error!(interface = %self.interface, error = %e, "Failed to create timeseries dump");
                false
            }
        }
    }

    fn write_with_retries(&self, buffer: &mut ExportBuffer) -> bool {
        let mut attempt = 0;
        loop {
            match buffer.dump.write(&buffer.data) {
                Ok(()) => return true,
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    self.counters.inc_export_retries();
                    warn!(
                        interface = %self.interface,
                        attempt,
                        error = %e,
                        "Timeseries dump write failed, retrying"
                    );
                }
                Err(e) => {
                    warn!(interface = %self.interface, error = %e, "Timeseries dump write failed");
                    // Reopen on the next flush.
                    buffer.dump.close();
                    return false;
                }
            }
        }
    }
}

impl Drop for TimeseriesExporter {
    fn drop(&mut self) {
        let mut buffer = self.buffer.lock();
        self.flush_buffer(&mut buffer);
        buffer.dump.close();
    }
}

/// Read-only view of an exporter.
#[derive(Debug, Clone, Serialize)]
pub struct ExporterSnapshot {
    pub interface: InterfaceRef,
    #[serde(flatten)]
    pub stats: ExportStats,
    pub buffered_bytes: usize,
    pub cached_entries: u64,
    pub capacity: usize,
    pub flush_interval_secs: u64,
    pub db_created: bool,
    pub dump_file: Option<String>,
}
