use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use picpaste::cache::{list_cached_files, CacheConfig};
use picpaste::capture::{run_capture, CaptureEvent, CaptureOutcome};
use picpaste::clipboard::{
    listener::CaptureSink, ChangeNotifier, ClipboardFormat, ListenerControl, MemoryClipboard,
    SelfWriteSuppressor,
};
use picpaste::keyboard::ComboFlag;
use picpaste::persist::CapturedImage;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!("{}_{}", prefix, nanos));
    let _ = fs::create_dir_all(&dir);
    dir
}

fn config(dir: &Path, max_files: u32) -> CacheConfig {
    CacheConfig {
        save_dir: dir.to_path_buf(),
        max_files,
        retention_hours: 0,
        sweep_interval_minutes: 0,
    }
}

fn screenshot(seed: u8) -> CapturedImage {
    CapturedImage::from_rgba(4, 3, vec![seed; 48]).expect("valid image")
}

fn saved_path(outcome: CaptureOutcome) -> PathBuf {
    match outcome {
        CaptureOutcome::Saved { path, replaced, .. } => {
            assert!(replaced, "clipboard should be replaced");
            path
        }
        other => panic!("capture failed: {:?}", other),
    }
}

#[test]
fn four_captures_with_max_three_keep_the_last_three() {
    let dir = unique_temp_dir("picpaste_pipeline_bound");
    let cfg = config(&dir, 3);
    let suppressor = SelfWriteSuppressor::new();
    let mut clipboard = MemoryClipboard::new();

    let mut paths = Vec::new();
    for seed in 0..4u8 {
        clipboard.clear();
        clipboard.put(ClipboardFormat::Bitmap, vec![seed]);
        clipboard.set_image(screenshot(seed));
        paths.push(saved_path(run_capture(&mut clipboard, &cfg, &suppressor)));
        thread::sleep(Duration::from_millis(10));
    }

    let remaining: Vec<PathBuf> = list_cached_files(&dir).into_iter().map(|f| f.path).collect();
    assert_eq!(remaining.len(), 3);
    assert!(!remaining.contains(&paths[0]), "first capture must be evicted");
    assert_eq!(remaining, paths[1..].to_vec());
    assert_eq!(clipboard.file_reference(), Some(paths[3].clone()));
    assert_eq!(clipboard.formats(), vec![ClipboardFormat::FileDrop]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn own_clipboard_write_does_not_retrigger_capture() {
    let dir = unique_temp_dir("picpaste_pipeline_suppress");
    let cfg = config(&dir, 0);
    let suppressor = SelfWriteSuppressor::new();

    let (tx, rx) = mpsc::channel::<CaptureEvent>();
    let tx = Mutex::new(tx);
    let sink: CaptureSink = Arc::new(move |event| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(event);
        }
    });
    let notifier = ChangeNotifier::new(
        sink,
        suppressor.clone(),
        ComboFlag::default(),
        ListenerControl::new(20),
    );

    let mut clipboard = MemoryClipboard::new();
    let hook_notifier = notifier.clone();
    clipboard.on_change(move || hook_notifier.notify());
    clipboard.set_image(screenshot(9));

    saved_path(run_capture(&mut clipboard, &cfg, &suppressor));
    assert_eq!(clipboard.write_count(), 1);
    assert!(
        rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "self-originated change must be swallowed"
    );
    assert_eq!(suppressor.pending(), 0);

    // 之后一次真实的外部变化照常转发
    notifier.notify();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_ok());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn failed_write_does_not_swallow_next_external_change() {
    let suppressor = SelfWriteSuppressor::new();
    let mut clipboard = MemoryClipboard::new();
    clipboard.fail_writes(true);
    let dir = unique_temp_dir("picpaste_pipeline_failwrite");
    clipboard.set_image(screenshot(1));

    match run_capture(&mut clipboard, &config(&dir, 0), &suppressor) {
        CaptureOutcome::Saved { path, replaced, .. } => {
            assert!(!replaced);
            assert!(path.exists(), "persisted file is kept");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(suppressor.try_consume(), None);

    let _ = fs::remove_dir_all(&dir);
}
