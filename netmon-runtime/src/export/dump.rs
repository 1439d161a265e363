use crate::config::ExporterSettings;
use crate::interface::InterfaceRef;
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Destination of flushed export buffers.
pub trait DumpSink: Send {
    /// Open `path` for appending, creating it if needed. Returns the current
    /// length of the file.
    fn open(&mut self, path: &Path) -> io::Result<u64>;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Cut the open file back to `len` bytes, discarding a partial write.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

/// [`DumpSink`] writing to regular files.
#[derive(Debug, Default)]
pub struct FileSink {
    file: Option<File>,
}

impl DumpSink for FileSink {
    fn open(&mut self, path: &Path) -> io::Result<u64> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        self.file = Some(file);
        Ok(len)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(not_open)?;
        file.write_all(bytes)?;
        file.flush()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.as_ref().ok_or_else(not_open)?.set_len(len)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.sync_data(),
            None => Ok(()),
        }
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "dump file not open")
}

struct ActiveDump {
    path: PathBuf,
    window_start: DateTime<Utc>,
    /// Bytes in the file after the last complete write.
    len: u64,
}

/// Rotating dump files of one interface.
///
/// Files live in `<dump_dir>/<ifid>/` and are named after the start of the
/// rotation window they cover. Content is the raw concatenation of flushed
/// buffers.
pub struct DumpStore {
    dir: PathBuf,
    base_name: String,
    rotation: Duration,
    sink: Box<dyn DumpSink>,
    current: Option<ActiveDump>,
    created: bool,
}

impl DumpStore {
    pub fn new(settings: &ExporterSettings, interface: &InterfaceRef, sink: Box<dyn DumpSink>) -> Self {
        Self {
            dir: settings.dump_dir.join(interface.id.to_string()),
            base_name: settings.base_name.clone(),
            rotation: settings.rotation,
            sink,
            current: None,
            created: false,
        }
    }

    /// True when no file is open or the open file's window has elapsed.
    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        match &self.current {
            None => true,
            Some(active) => window_start(now, self.rotation) > active.window_start,
        }
    }

    /// Open the file of the window containing `now`, closing the previous one.
    pub fn create(&mut self, now: DateTime<Utc>) -> io::Result<&Path> {
        self.close();

        let window_start = window_start(now, self.rotation);
        let path = self.dir.join(format!(
            "{}_{}.dump",
            self.base_name,
            window_start.format("%Y%m%d_%H%M%S")
        ));
        let len = self.sink.open(&path)?;
        info!(file = %path.display(), len, "Timeseries dump created");

        self.created = true;
        let active = self.current.insert(ActiveDump {
            path,
            window_start,
            len,
        });
        Ok(&active.path)
    }

    /// Append `bytes` to the open file. On failure the file is cut back to
    /// its previous length, so a retry never duplicates a partial write.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let len = self.current.as_ref().ok_or_else(not_open)?.len;
        match self.sink.write_all(bytes) {
            Ok(()) => {
                if let Some(active) = self.current.as_mut() {
                    active.len += bytes.len() as u64;
                }
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.sink.truncate(len) {
                    error!(error = %rollback, "Failed to roll back partial timeseries write");
                    self.close();
                }
                Err(e)
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(active) = self.current.take() {
            match self.sink.close() {
                Ok(()) => debug!(file = %active.path.display(), "Timeseries dump closed"),
                Err(e) => warn!(file = %active.path.display(), error = %e, "Failed to close timeseries dump"),
            }
        }
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_ref().map(|active| active.path.as_path())
    }

    /// Whether a dump file was ever created.
    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl Drop for DumpStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Start of the epoch-aligned rotation window containing `now`.
fn window_start(now: DateTime<Utc>, rotation: Duration) -> DateTime<Utc> {
    let secs = rotation.as_secs().max(1) as i64;
    let start = now.timestamp().div_euclid(secs) * secs;
    DateTime::from_timestamp(start, 0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(dir: &Path) -> ExporterSettings {
        ExporterSettings {
            dump_dir: dir.to_path_buf(),
            rotation: Duration::from_secs(3600),
            ..ExporterSettings::default()
        }
    }

    #[test]
    fn windows_are_epoch_aligned() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 42, 17).unwrap();
        assert_eq!(
            window_start(now, Duration::from_secs(3600)),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            window_start(now, Duration::from_secs(86_400)),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
    }

    /// File sink whose next write lands only partially, then fails.
    struct ShortWriteSink {
        inner: FileSink,
        short_write: bool,
    }

    impl DumpSink for ShortWriteSink {
        fn open(&mut self, path: &Path) -> io::Result<u64> {
            self.inner.open(path)
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            if std::mem::take(&mut self.short_write) {
                self.inner.write_all(&bytes[..bytes.len() / 2])?;
                return Err(io::Error::new(io::ErrorKind::WriteZero, "no space left"));
            }
            self.inner.write_all(bytes)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.inner.truncate(len)
        }

        fn close(&mut self) -> io::Result<()> {
            self.inner.close()
        }
    }

    #[test]
    fn failed_write_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ShortWriteSink {
            inner: FileSink::default(),
            short_write: false,
        };
        let mut store = DumpStore::new(&settings(dir.path()), &InterfaceRef::new(5, "eth5"), Box::new(sink));
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap();
        let path = store.create(t0).unwrap().to_path_buf();
        store.write(b"AAAA\n").unwrap();
        store.close();

        // Reopening the same window appends after the existing content.
        let sink = ShortWriteSink {
            inner: FileSink::default(),
            short_write: true,
        };
        let mut store = DumpStore::new(&settings(dir.path()), &InterfaceRef::new(5, "eth5"), Box::new(sink));
        store.create(t0).unwrap();
        assert!(store.write(b"BBBBBBBB\n").is_err());
        assert_eq!(fs::read(&path).unwrap(), b"AAAA\n");

        store.write(b"BBBBBBBB\n").unwrap();
        store.close();
        assert_eq!(fs::read(&path).unwrap(), b"AAAA\nBBBBBBBB\n");
    }

    #[test]
    fn write_without_open_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DumpStore::new(
            &settings(dir.path()),
            &InterfaceRef::new(3, "eth0"),
            Box::new(FileSink::default()),
        );
        let err = store.write(b"cpu value=1\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn creates_and_rotates_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DumpStore::new(
            &settings(dir.path()),
            &InterfaceRef::new(3, "eth0"),
            Box::new(FileSink::default()),
        );
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap();
        assert!(store.needs_rotation(t0));
        assert!(!store.is_created());

        let path = store.create(t0).unwrap().to_path_buf();
        assert_eq!(path, dir.path().join("3").join("ts_export_20240501_100000.dump"));
        store.write(b"cpu value=1\n").unwrap();
        assert!(!store.needs_rotation(t0 + chrono::Duration::minutes(30)));
        assert!(store.needs_rotation(t0 + chrono::Duration::minutes(55)));

        let next = store
            .create(t0 + chrono::Duration::minutes(55))
            .unwrap()
            .to_path_buf();
        assert_eq!(next, dir.path().join("3").join("ts_export_20240501_110000.dump"));
        store.write(b"cpu value=2\n").unwrap();
        store.close();

        assert_eq!(fs::read(&path).unwrap(), b"cpu value=1\n");
        assert_eq!(fs::read(&next).unwrap(), b"cpu value=2\n");
        assert!(store.current_file().is_none());
        assert!(store.is_created());
    }
}
