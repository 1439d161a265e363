use chrono::Utc;
use netmon::{
    ActivityContext, ActivityResult, Cadence, ExporterSettings, InterfaceRef, JsonConsole,
    PeriodicActivitiesBuilder, SchedulerSettings, Scope, TimeseriesExporter,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn settings(dump_dir: &Path, capacity: usize) -> ExporterSettings {
    ExporterSettings {
        dump_dir: dump_dir.to_path_buf(),
        capacity,
        flush_interval: Duration::from_secs(3600),
        ..ExporterSettings::default()
    }
}

fn dump_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

fn dumped_bytes(dir: &Path) -> usize {
    dump_files(dir)
        .iter()
        .map(|path| fs::read(path).map(|b| b.len()).unwrap_or(0))
        .sum()
}

#[test]
fn overflowing_append_flushes_previous_points() {
    let dir = tempfile::tempdir().unwrap();
    let eth0 = InterfaceRef::new(0, "eth0");
    let exporter = TimeseriesExporter::new(eth0, &settings(dir.path(), 1000));

    for _ in 0..3 {
        exporter.export_data(&[b'a'; 400]);
    }

    let stats = exporter.stats();
    assert_eq!(stats.exports, 1);
    assert_eq!(stats.points_exported, 2);
    assert_eq!(exporter.buffered_bytes(), 400);

    let files = dump_files(&dir.path().join("0"));
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("ts_export_"), "{name}");
    assert!(name.ends_with(".dump"), "{name}");
    assert_eq!(fs::read(&files[0]).unwrap().len(), 800);

    exporter.flush();
    assert_eq!(exporter.stats().points_exported, 3);
    assert_eq!(dumped_bytes(&dir.path().join("0")), 1200);
}

#[test]
fn concurrent_exports_within_capacity_flush_once() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = Arc::new(TimeseriesExporter::new(
        InterfaceRef::new(3, "eth3"),
        &settings(dir.path(), 8 * 64 * 16),
    ));

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let exporter = exporter.clone();
            thread::spawn(move || {
                let record = [b'0' + n as u8; 16];
                for _ in 0..64 {
                    exporter.export_data(&record);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(exporter.stats().exports, 0);
    assert_eq!(exporter.buffered_bytes(), 8 * 64 * 16);

    exporter.flush();
    let stats = exporter.stats();
    assert_eq!(stats.exports, 1);
    assert_eq!(stats.points_received, 8 * 64);
    assert_eq!(stats.points_exported, 8 * 64);
    assert_eq!(stats.points_dropped, 0);
    assert_eq!(dumped_bytes(&dir.path().join("3")), 8 * 64 * 16);
}

#[test]
fn every_received_point_is_exported_or_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let capacity = 512;
    let exporter = TimeseriesExporter::new(InterfaceRef::new(1, "eth1"), &settings(dir.path(), capacity));

    let mut expected_bytes = 0;
    for i in 0..200usize {
        let len = match i % 7 {
            0 => capacity + 1,
            1 => capacity,
            n => n * 37,
        };
        if len <= capacity {
            expected_bytes += len;
        }
        exporter.export_data(&vec![b'x'; len]);
        assert!(exporter.buffered_bytes() <= capacity);
    }
    exporter.flush();

    let stats = exporter.stats();
    assert_eq!(stats.points_received, 200);
    assert_eq!(stats.points_exported + stats.points_dropped, stats.points_received);
    assert_eq!(stats.points_pending(), 0);
    assert_eq!(stats.points_dropped, (0..200).filter(|i| i % 7 == 0).count() as u64);
    assert_eq!(dumped_bytes(&dir.path().join("1")), expected_bytes);
}

#[test]
fn unwritable_dump_dir_drops_points() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    fs::write(&blocker, "file in the way").unwrap();
    let exporter = TimeseriesExporter::new(InterfaceRef::new(2, "eth2"), &settings(&blocker, 100));

    exporter.export_data(b"iface:traffic,ifid=2 bytes=10\n");
    exporter.export_data(b"iface:traffic,ifid=2 bytes=20\n");
    exporter.flush();

    let stats = exporter.stats();
    assert_eq!(stats.exports, 1);
    assert_eq!(stats.export_failures, 1);
    assert_eq!(stats.points_dropped, 2);
    assert_eq!(stats.points_exported, 0);
    assert_eq!(exporter.buffered_bytes(), 0);
    assert!(!exporter.snapshot().db_created);
}

#[test]
fn dump_files_rotate_per_window() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings(dir.path(), 1024);
    settings.rotation = Duration::from_secs(1);
    let exporter = TimeseriesExporter::new(InterfaceRef::new(0, "eth0"), &settings);

    exporter.export_data(b"first window\n");
    exporter.flush();

    let start = Utc::now().timestamp();
    let deadline = Instant::now() + Duration::from_secs(3);
    while Utc::now().timestamp() == start && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    exporter.export_data(b"second window\n");
    exporter.flush();

    let files = dump_files(&dir.path().join("0"));
    assert_eq!(files.len(), 2);
    assert_eq!(fs::read(&files[0]).unwrap(), b"first window\n");
    assert_eq!(fs::read(&files[1]).unwrap(), b"second window\n");
    assert_eq!(
        exporter.snapshot().dump_file.as_deref(),
        Some(files[1].display().to_string().as_str())
    );
}

#[test]
fn guard_batches_points_and_snapshot_is_published() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = TimeseriesExporter::new(InterfaceRef::new(4, "eth4"), &settings(dir.path(), 4096));

    {
        let mut guard = exporter.lock();
        guard.export(b"host:traffic,ifid=4,host=10.0.0.1 bytes=1\n");
        guard.export(b"host:traffic,ifid=4,host=10.0.0.2 bytes=2\n");
        assert!(guard.buffered_bytes() > 0);
    }

    let mut console = JsonConsole::new();
    exporter.publish(&mut console);
    let table = console.get("timeseries_exporter").unwrap();
    assert_eq!(table["interface"]["name"], "eth4");
    assert_eq!(table["points_received"], 2);
    assert_eq!(table["cached_entries"], 2);
    assert_eq!(table["capacity"], 4096);
    assert_eq!(table["db_created"], false);

    exporter.flush();
    let mut console = JsonConsole::new();
    exporter.publish(&mut console);
    let table = console.get("timeseries_exporter").unwrap();
    assert_eq!(table["points_exported"], 2);
    assert_eq!(table["cached_entries"], 0);
    assert_eq!(table["db_created"], true);
}

#[test]
fn periodic_activity_feeds_exporters() {
    let dir = tempfile::tempdir().unwrap();
    let interfaces = [InterfaceRef::new(0, "eth0"), InterfaceRef::new(1, "eth1")];
    let exporters: Arc<Vec<TimeseriesExporter>> = Arc::new(
        interfaces
            .iter()
            .map(|iface| TimeseriesExporter::new(iface.clone(), &settings(dir.path(), 4096)))
            .collect(),
    );

    let scheduler_settings = SchedulerSettings {
        scripts_dir: dir.path().join("no_scripts"),
        tick: Duration::from_secs(3600),
        min_threads: 2,
        max_threads: 2,
        ..SchedulerSettings::default()
    };
    let sinks = exporters.clone();
    let scheduler = PeriodicActivitiesBuilder::with_settings(scheduler_settings)
        .interfaces(interfaces.clone())
        .register(
            "interface/traffic_points",
            Cadence::Periodic(Duration::from_secs(60)),
            Scope::PerInterface,
            move |ctx: &ActivityContext| -> ActivityResult {
                let exporter = sinks
                    .iter()
                    .find(|e| e.interface().id == ctx.interface.id)
                    .ok_or("unknown interface")?;
                let line = format!("iface:traffic,ifid={} bytes=42\n", ctx.interface.id);
                exporter.export_data(line.as_bytes());
                Ok(())
            },
        )
        .build();
    scheduler.start_periodic_activities_loop().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while exporters.iter().any(|e| e.stats().points_received == 0) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    scheduler.shutdown();

    for exporter in exporters.iter() {
        exporter.flush();
        let stats = exporter.stats();
        assert_eq!(stats.points_received, 1);
        assert_eq!(stats.points_exported, 1);
        let ifdir = dir.path().join(exporter.interface().id.to_string());
        let files = dump_files(&ifdir);
        assert_eq!(files.len(), 1);
        let content = fs::read_to_string(&files[0]).unwrap();
        assert_eq!(content, format!("iface:traffic,ifid={} bytes=42\n", exporter.interface().id));
    }
}
