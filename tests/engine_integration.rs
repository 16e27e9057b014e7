//! Integration tests for the duplicate monitoring engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dupwatch::engine::EngineState;
use dupwatch::hasher::hash_bytes;
use dupwatch::reporter::{MemoryReporter, Report, Reporter};
use dupwatch::watcher::{ChannelSource, FileEvent};
use dupwatch::{Config, Engine, Index};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn test_config(dir: &Path) -> Config {
    Config {
        shutdown_grace_seconds: 2,
        ..Config::for_directory(dir)
    }
}

async fn channel_engine(
    dir: &Path,
) -> (Engine, mpsc::Sender<FileEvent>, Arc<MemoryReporter>, PathBuf) {
    let (source, tx) = ChannelSource::new();
    let reporter = MemoryReporter::new();
    let mut engine = Engine::with_source(test_config(dir), reporter.clone(), Arc::new(source));
    engine.start().await.unwrap();
    let root = engine.root().unwrap().to_path_buf();
    (engine, tx, reporter, root)
}

/// Poll until `cond` holds or a few seconds pass.
async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

fn index_matches(index: &Index, expected: &[(PathBuf, &[u8])]) -> bool {
    index.len() == expected.len()
        && expected.iter().all(|(path, content)| {
            index
                .get(path)
                .is_some_and(|entry| entry.digest == hash_bytes(content))
        })
}

/// Three identical files and one distinct file yield exactly one group.
#[tokio::test]
async fn test_three_duplicates_one_group() {
    let tmp = TempDir::new().unwrap();
    let (mut engine, tx, reporter, root) = channel_engine(tmp.path()).await;
    let index = engine.index().unwrap();

    let files: Vec<(PathBuf, &[u8])> = vec![
        (root.join("a.txt"), b"same content"),
        (root.join("b.txt"), b"same content"),
        (root.join("c.txt"), b"same content"),
        (root.join("d.txt"), b"other content"),
    ];
    for (path, content) in &files {
        fs::write(path, content).unwrap();
        tx.send(FileEvent::Created(path.clone())).await.unwrap();
    }

    assert!(wait_for(|| index_matches(&index, &files)).await);

    reporter.take();
    let groups = engine.run_detection_cycle().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].paths,
        vec![root.join("a.txt"), root.join("b.txt"), root.join("c.txt")]
    );
    assert_eq!(
        reporter.duplicates(),
        vec![(hash_bytes(b"same content"), groups[0].paths.clone())]
    );

    engine.stop().await;
}

/// A deleted duplicate drops out of the next cycle.
#[tokio::test]
async fn test_deleted_duplicate_leaves_group() {
    let tmp = TempDir::new().unwrap();
    let (mut engine, tx, _reporter, root) = channel_engine(tmp.path()).await;
    let index = engine.index().unwrap();

    for name in ["a", "b", "c"] {
        fs::write(root.join(name), "dup").unwrap();
        tx.send(FileEvent::Created(root.join(name))).await.unwrap();
    }
    assert!(wait_for(|| index.len() == 3).await);

    fs::remove_file(root.join("c")).unwrap();
    tx.send(FileEvent::Deleted(root.join("c"))).await.unwrap();
    assert!(wait_for(|| index.len() == 2).await);

    let groups = engine.run_detection_cycle().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths, vec![root.join("a"), root.join("b")]);

    // Deleting one more leaves no duplicates at all
    fs::remove_file(root.join("b")).unwrap();
    tx.send(FileEvent::Deleted(root.join("b"))).await.unwrap();
    assert!(wait_for(|| index.len() == 1).await);
    assert!(engine.run_detection_cycle().unwrap().is_empty());

    engine.stop().await;
}

/// Empty roots and all-distinct content produce no groups.
#[tokio::test]
async fn test_no_duplicates() {
    let tmp = TempDir::new().unwrap();
    let (mut engine, tx, reporter, root) = channel_engine(tmp.path()).await;
    let index = engine.index().unwrap();

    assert!(engine.run_detection_cycle().unwrap().is_empty());

    for (i, name) in ["x", "y", "z"].iter().enumerate() {
        fs::write(root.join(name), format!("content {i}")).unwrap();
        tx.send(FileEvent::Created(root.join(name))).await.unwrap();
    }
    assert!(wait_for(|| index.len() == 3).await);

    assert!(engine.run_detection_cycle().unwrap().is_empty());
    assert!(reporter.duplicates().is_empty());

    engine.stop().await;
}

/// Deleting a path that was never indexed is silent.
#[tokio::test]
async fn test_delete_unknown_is_noop() {
    let tmp = TempDir::new().unwrap();
    let (mut engine, _tx, reporter, root) = channel_engine(tmp.path()).await;

    engine
        .handle_event(FileEvent::Deleted(root.join("never-existed")))
        .await
        .unwrap();

    assert!(engine.index().unwrap().is_empty());
    assert_eq!(reporter.error_count(), 0);
    assert_eq!(engine.stats().errors, 0);

    engine.stop().await;
}

/// Events for vanished files do not disturb the pipeline.
#[tokio::test]
async fn test_create_then_delete_race() {
    let tmp = TempDir::new().unwrap();
    let (mut engine, tx, reporter, root) = channel_engine(tmp.path()).await;
    let index = engine.index().unwrap();

    let ghost = root.join("ghost.tmp");
    tx.send(FileEvent::Created(ghost.clone())).await.unwrap();
    tx.send(FileEvent::Deleted(ghost.clone())).await.unwrap();

    fs::write(root.join("real.txt"), "real").unwrap();
    tx.send(FileEvent::Created(root.join("real.txt")))
        .await
        .unwrap();

    assert!(wait_for(|| index.len() == 1).await);
    assert!(index.get(&ghost).is_none());
    assert_eq!(reporter.error_count(), 0);
    assert_eq!(engine.state(), EngineState::Running);

    engine.stop().await;
}

/// Replaying a mixed event sequence leaves one entry per existing file with
/// its current digest.
#[tokio::test]
async fn test_replay_converges_to_filesystem() {
    let tmp = TempDir::new().unwrap();
    let (mut engine, _tx, _reporter, root) = channel_engine(tmp.path()).await;
    let index = engine.index().unwrap();

    let names = ["p0", "p1", "p2", "p3", "p4"];
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for _ in 0..200 {
        let path = root.join(names[(next() % names.len() as u64) as usize]);
        let event = match next() % 3 {
            0 => {
                fs::write(&path, format!("v{}", next() % 3)).unwrap();
                FileEvent::Created(path)
            }
            1 => {
                fs::write(&path, format!("v{}", next() % 3)).unwrap();
                FileEvent::Modified(path)
            }
            _ => {
                let _ = fs::remove_file(&path);
                FileEvent::Deleted(path)
            }
        };
        engine.handle_event(event).await.unwrap();
    }

    let mut expected = Vec::new();
    for name in names {
        let path = root.join(name);
        if let Ok(content) = fs::read(&path) {
            expected.push((path, hash_bytes(&content)));
        }
    }

    assert_eq!(index.len(), expected.len());
    for (path, digest) in expected {
        assert_eq!(index.get(&path).unwrap().digest, digest);
    }

    engine.stop().await;
}

/// Ignore patterns keep matching files out of the index.
#[tokio::test]
async fn test_ignore_patterns() {
    let tmp = TempDir::new().unwrap();
    let (source, _tx) = ChannelSource::new();
    let reporter = MemoryReporter::new();
    let config = Config {
        ignore_patterns: vec!["*.part".to_string()],
        ..test_config(tmp.path())
    };
    let mut engine = Engine::with_source(config, reporter.clone(), Arc::new(source));
    engine.start().await.unwrap();
    let root = engine.root().unwrap().to_path_buf();

    for name in ["a.part", "b.part"] {
        fs::write(root.join(name), "partial").unwrap();
        engine
            .handle_event(FileEvent::Created(root.join(name)))
            .await
            .unwrap();
    }

    assert!(engine.index().unwrap().is_empty());
    assert!(engine.run_detection_cycle().unwrap().is_empty());
    assert_eq!(engine.stats().events_ignored, 2);

    engine.stop().await;
}

/// The optional initial scan picks up files that existed before start.
#[tokio::test]
async fn test_initial_scan() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("one"), "dup").unwrap();
    fs::write(tmp.path().join("two"), "dup").unwrap();
    fs::create_dir(tmp.path().join("nested")).unwrap();
    fs::write(tmp.path().join("nested").join("three"), "dup").unwrap();

    let (source, _tx) = ChannelSource::new();
    let reporter = MemoryReporter::new();
    let config = Config {
        initial_scan: true,
        ..test_config(tmp.path())
    };
    let mut engine = Engine::with_source(config, reporter, Arc::new(source));
    engine.start().await.unwrap();
    let index = engine.index().unwrap();

    assert!(wait_for(|| index.len() == 3).await);
    let groups = engine.run_detection_cycle().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);

    engine.stop().await;
}

/// Without an initial scan, pre-existing files stay unknown.
#[tokio::test]
async fn test_index_starts_empty() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("one"), "dup").unwrap();
    fs::write(tmp.path().join("two"), "dup").unwrap();

    let (mut engine, _tx, _reporter, _root) = channel_engine(tmp.path()).await;
    assert!(engine.index().unwrap().is_empty());
    assert!(engine.run_detection_cycle().unwrap().is_empty());
    engine.stop().await;
}

/// The periodic timer runs a first cycle as soon as the engine starts.
#[tokio::test]
async fn test_timer_runs_first_cycle() {
    let tmp = TempDir::new().unwrap();
    let (mut engine, _tx, _reporter, _root) = channel_engine(tmp.path()).await;

    assert!(wait_for(|| engine.stats().cycles >= 1).await);
    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Stopped);
}

/// File reports are appended to a text sink as timestamped text lines.
#[tokio::test]
async fn test_file_report_sink() {
    let tmp = TempDir::new().unwrap();
    let watch = tmp.path().join("watch");
    let report_path = tmp.path().join("logs").join("report.txt");

    let config = Config {
        report_sink: format!("file:{}", report_path.display()),
        ..test_config(&watch)
    };
    let reporter = config.sink().unwrap().build().unwrap();
    let (source, _tx) = ChannelSource::new();
    let mut engine = Engine::with_source(config, reporter, Arc::new(source));
    engine.start().await.unwrap();
    let root = engine.root().unwrap().to_path_buf();

    for name in ["a", "b"] {
        fs::write(root.join(name), "dup").unwrap();
        engine
            .handle_event(FileEvent::Created(root.join(name)))
            .await
            .unwrap();
    }
    engine.run_detection_cycle().unwrap();
    engine.stop().await;

    let content = fs::read_to_string(&report_path).unwrap();
    assert!(content.contains(&format!("File created: {}", root.join("a").display())));
    assert!(content.contains(&format!(
        "Duplicate files detected with hash {}: {}, {}",
        hash_bytes(b"dup"),
        root.join("a").display(),
        root.join("b").display()
    )));
}

/// End to end with real OS notifications.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_notify_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let reporter = MemoryReporter::new();
    let mut engine = Engine::new(test_config(tmp.path()), reporter.clone());
    engine.start().await.unwrap();
    let root = engine.root().unwrap().to_path_buf();
    let index = engine.index().unwrap();

    // Give the backend a moment to arm
    tokio::time::sleep(Duration::from_millis(200)).await;

    let files: Vec<(PathBuf, &[u8])> = vec![
        (root.join("a.txt"), b"identical"),
        (root.join("b.txt"), b"identical"),
        (root.join("c.txt"), b"identical"),
        (root.join("d.txt"), b"distinct"),
    ];
    for (path, content) in &files {
        fs::write(path, content).unwrap();
    }

    assert!(
        wait_for(|| index_matches(&index, &files)).await,
        "index never converged: {:?}",
        index.snapshot()
    );

    let groups = engine.run_detection_cycle().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);

    fs::remove_file(root.join("c.txt")).unwrap();
    assert!(wait_for(|| index.get(&root.join("c.txt")).is_none()).await);

    let groups = engine.run_detection_cycle().unwrap();
    assert_eq!(groups[0].paths, vec![root.join("a.txt"), root.join("b.txt")]);
    assert!(reporter
        .reports()
        .iter()
        .any(|r| matches!(r, Report::FileDeleted { .. })));

    engine.stop().await;
}

/// Reporter that panics on duplicate and error reports.
struct BrokenReporter {
    inner: Arc<MemoryReporter>,
}

impl Reporter for BrokenReporter {
    fn report(&self, report: &Report) {
        match report {
            Report::DuplicatesDetected { .. } | Report::Error { .. } => {
                panic!("reporter is broken")
            }
            _ => self.inner.report(report),
        }
    }
}

/// The periodic check keeps ticking when reporting a cycle and its failure both panic.
#[tokio::test]
async fn test_detection_loop_survives_broken_reporter() {
    let tmp = TempDir::new().unwrap();
    let (source, tx) = ChannelSource::new();
    let config = Config {
        check_interval_seconds: 1,
        ..test_config(tmp.path())
    };
    let reporter = Arc::new(BrokenReporter {
        inner: MemoryReporter::new(),
    });
    let mut engine = Engine::with_source(config, reporter, Arc::new(source));
    engine.start().await.unwrap();
    let root = engine.root().unwrap().to_path_buf();
    let index = engine.index().unwrap();

    for name in ["a", "b"] {
        fs::write(root.join(name), "dup").unwrap();
        tx.send(FileEvent::Created(root.join(name))).await.unwrap();
    }
    assert!(wait_for(|| index.len() == 2).await);

    let errors = engine.stats().errors;
    let cycles = engine.stats().cycles;
    assert!(
        wait_for(|| engine.stats().cycles >= cycles + 2).await,
        "detection loop stalled at {} cycles",
        engine.stats().cycles
    );
    assert!(engine.stats().errors >= errors + 2);
    assert_eq!(engine.state(), EngineState::Running);

    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Stopped);
}

/// Renaming a directory inside the root moves its files in the index.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_notify_directory_rename() {
    let tmp = TempDir::new().unwrap();
    let reporter = MemoryReporter::new();
    let mut engine = Engine::new(test_config(tmp.path()), reporter);
    engine.start().await.unwrap();
    let root = engine.root().unwrap().to_path_buf();
    let index = engine.index().unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::create_dir(root.join("a")).unwrap();
    // Let the backend start watching the new directory before filling it
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(root.join("a").join("x"), "same").unwrap();
    fs::write(root.join("a").join("y"), "same").unwrap();

    let before: Vec<(PathBuf, &[u8])> = vec![
        (root.join("a").join("x"), b"same"),
        (root.join("a").join("y"), b"same"),
    ];
    assert!(
        wait_for(|| index_matches(&index, &before)).await,
        "files never indexed: {:?}",
        index.snapshot()
    );

    fs::rename(root.join("a"), root.join("b")).unwrap();

    let after: Vec<(PathBuf, &[u8])> = vec![
        (root.join("b").join("x"), b"same"),
        (root.join("b").join("y"), b"same"),
    ];
    assert!(
        wait_for(|| index_matches(&index, &after)).await,
        "rename not reflected: {:?}",
        index.snapshot()
    );

    let groups = engine.run_detection_cycle().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].paths,
        vec![root.join("b").join("x"), root.join("b").join("y")]
    );

    engine.stop().await;
}
