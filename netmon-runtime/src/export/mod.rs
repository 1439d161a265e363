mod accounting;
mod dump;
mod exporter;

pub use accounting::ExportStats;
pub use dump::{DumpSink, DumpStore, FileSink};
pub use exporter::{ExportGuard, ExporterSnapshot, TimeseriesExporter};
