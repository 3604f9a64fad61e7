use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, Local, TimeZone};
use proptest::prelude::*;

use picpaste::cache::{
    cached_file_name, list_cached_files, purge_all, sweep_expired, CacheConfig,
};
use picpaste::clipboard::MemoryClipboard;
use picpaste::persist::{persist_image, CapturedImage};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!("{}_{}", prefix, nanos));
    let _ = fs::create_dir_all(&dir);
    dir
}

fn config(dir: &Path, max_files: u32, retention_hours: u32) -> CacheConfig {
    CacheConfig {
        save_dir: dir.to_path_buf(),
        max_files,
        retention_hours,
        sweep_interval_minutes: 60,
    }
}

fn names(dir: &Path) -> Vec<String> {
    list_cached_files(dir).iter().map(|f| f.file_name()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn cache_keeps_only_the_newest_k(captures in 1usize..12, max_files in 1u32..6) {
        let dir = unique_temp_dir("picpaste_prop_bound");
        let cfg = config(&dir, max_files, 0);
        let image = CapturedImage::from_rgba(1, 1, vec![0, 0, 0, 255]).expect("image");
        let mut clipboard = MemoryClipboard::new();
        let base = Local
            .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
            .single()
            .expect("valid base time");

        let mut written = Vec::new();
        for i in 0..captures {
            let at = base + Duration::milliseconds(10 * i as i64);
            persist_image(&mut clipboard, &image, &cfg, at).expect("persist");
            written.push(cached_file_name(at));
        }

        let expected: Vec<String> = written
            .iter()
            .skip(captures.saturating_sub(max_files as usize))
            .cloned()
            .collect();
        let remaining = names(&dir);
        let _ = fs::remove_dir_all(&dir);

        prop_assert!(remaining.len() <= max_files as usize);
        prop_assert_eq!(remaining, expected);
    }
}

#[test]
fn sweep_after_an_hour_removes_only_the_stale_capture() {
    let dir = unique_temp_dir("picpaste_sweep_scenario");
    let now = Local::now();
    let stale = dir.join(cached_file_name(now - Duration::hours(2)));
    let fresh = dir.join(cached_file_name(now - Duration::minutes(10)));
    fs::write(&stale, b"old").expect("write stale");
    fs::write(&fresh, b"new").expect("write fresh");

    let report = sweep_expired(&config(&dir, 0, 1), now);
    assert_eq!(report.removed, vec![stale.clone()]);
    assert!(!stale.exists());
    assert!(fresh.exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn purge_of_empty_cache_leaves_empty_directory() {
    let dir = unique_temp_dir("picpaste_purge_scenario");
    let report = purge_all(&dir);
    assert!(report.removed.is_empty());
    assert!(report.failed.is_empty());
    assert!(dir.is_dir());
    assert_eq!(fs::read_dir(&dir).expect("read dir").count(), 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn foreign_files_are_never_touched() {
    let dir = unique_temp_dir("picpaste_foreign");
    let foreign = [
        "capture_2024.png",
        "capture_20240101120000000.jpg",
        "Capture_20240101120000000.png",
        "notes.txt",
    ];
    for name in foreign {
        fs::write(dir.join(name), b"x").expect("write foreign");
    }
    fs::write(dir.join(cached_file_name(Local::now() - Duration::days(3))), b"x")
        .expect("write cached");

    assert_eq!(list_cached_files(&dir).len(), 1);
    sweep_expired(&config(&dir, 0, 1), Local::now());
    purge_all(&dir);
    for name in foreign {
        assert!(dir.join(name).exists(), "{} must survive", name);
    }

    let _ = fs::remove_dir_all(&dir);
}
