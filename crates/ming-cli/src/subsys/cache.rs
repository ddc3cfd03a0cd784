//! Read-through disk cache for object bodies
//!
//! Entries are spread over the cache drives by the MD5 of `bucket/key`. Each
//! entry is a directory holding the body and a small JSON file with the ETag
//! the body was stored under; a read only hits when the ETags agree.
//!
//! Both files are replaced by renaming a fully written temporary file, so a
//! reader sees either the old file or the new one. Usage above the high
//! watermark evicts the least recently used entries down to the low watermark.

use crate::config::CacheConfig;
use bytes::Bytes;
use filetime::FileTime;
use md5::{Digest, Md5};
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::IntCounter;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use wildmatch::WildMatch;

const DATA_FILE: &str = "part.1";
const META_FILE: &str = "cache.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    bucket: String,
    key: String,
    etag: String,
    size: u64,
}

/// An entry found on a cache drive
struct CachedEntry {
    dir: PathBuf,
    size: u64,
    last_used: SystemTime,
}

/// Disk cache spread over one or more drives
pub struct DiskCache {
    drives: Vec<PathBuf>,
    exclude: Vec<WildMatch>,
    quota: u8,
    capacity: u64,
    watermark_low: u8,
    watermark_high: u8,
    used: AtomicU64,
    evicting: tokio::sync::Mutex<()>,
    hits: IntCounter,
    misses: IntCounter,
}

impl DiskCache {
    /// Open the cache, creating missing drive directories
    pub fn new(config: &CacheConfig) -> io::Result<Self> {
        if config.drives.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no cache drives configured"));
        }
        for drive in &config.drives {
            if drive.exists() && !drive.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cache drive {} is not a directory", drive.display()),
                ));
            }
            std::fs::create_dir_all(drive)?;
        }

        let quota = config.quota.min(100);
        let capacity = config.max_size.unwrap_or_else(|| {
            config
                .drives
                .iter()
                .filter_map(|drive| drive_size(drive))
                .map(|total| percent_of(total, quota))
                .sum()
        });
        let used = scan_entries(&config.drives).iter().map(|entry| entry.size).sum();
        let watermark_high = config.watermark_high.min(100);

        Ok(Self {
            drives: config.drives.clone(),
            exclude: config.exclude.iter().map(|pattern| WildMatch::new(pattern)).collect(),
            quota,
            capacity,
            watermark_low: config.watermark_low.min(watermark_high),
            watermark_high,
            used: AtomicU64::new(used),
            evicting: tokio::sync::Mutex::new(()),
            hits: IntCounter::new("ming_cache_hits_total", "Object reads served from the disk cache")
                .map_err(io::Error::other)?,
            misses: IntCounter::new("ming_cache_misses_total", "Object reads that missed the disk cache")
                .map_err(io::Error::other)?,
        })
    }

    pub fn drives(&self) -> &[PathBuf] {
        &self.drives
    }

    pub fn quota(&self) -> u8 {
        self.quota
    }

    pub fn hits(&self) -> u64 {
        self.hits.get()
    }

    pub fn misses(&self) -> u64 {
        self.misses.get()
    }

    /// Bytes the cache may use across all drives; zero when unknown, which disables eviction
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently held by cached bodies
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    /// Hit and miss counters for the metrics endpoint
    pub fn collect_metrics(&self) -> Vec<MetricFamily> {
        let mut families = self.hits.collect();
        families.extend(self.misses.collect());
        families
    }

    /// Whether `bucket/key` matches an exclude pattern
    pub fn is_excluded(&self, bucket: &str, key: &str) -> bool {
        let path = format!("{bucket}/{key}");
        self.exclude.iter().any(|pattern| pattern.matches(&path))
    }

    fn entry_dir(&self, bucket: &str, key: &str) -> PathBuf {
        let digest = Md5::digest(format!("{bucket}/{key}").as_bytes());
        let drive = &self.drives[usize::from(digest[0]) % self.drives.len()];
        drive.join(hex::encode(digest))
    }

    /// Cached body for `bucket/key`, if one was stored under `etag`
    pub async fn get(&self, bucket: &str, key: &str, etag: &str) -> Option<Bytes> {
        let dir = self.entry_dir(bucket, key);
        let data = match read_meta(&dir).await {
            Some(meta) if meta.etag == etag && meta.bucket == bucket && meta.key == key => {
                tokio::fs::read(dir.join(DATA_FILE))
                    .await
                    .ok()
                    .filter(|data| data.len() as u64 == meta.size)
            }
            _ => None,
        };

        match data {
            Some(data) => {
                self.hits.inc();
                if let Err(e) = filetime::set_file_mtime(dir.join(DATA_FILE), FileTime::now()) {
                    debug!(bucket = %bucket, key = %key, error = %e, "unable to touch cache entry");
                }
                debug!(bucket = %bucket, key = %key, "cache hit");
                Some(Bytes::from(data))
            }
            None => {
                self.misses.inc();
                None
            }
        }
    }

    /// Store a body under `etag`, replacing any older entry
    pub async fn put(&self, bucket: &str, key: &str, etag: &str, data: &Bytes) -> io::Result<()> {
        let size = data.len() as u64;
        if self.capacity > 0 && size > percent_of(self.capacity, self.watermark_high) {
            debug!(bucket = %bucket, key = %key, size, "object too large to cache");
            return Ok(());
        }

        let dir = self.entry_dir(bucket, key);
        tokio::fs::create_dir_all(&dir).await?;
        let meta = CacheMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: etag.to_string(),
            size,
        };
        let meta = serde_json::to_vec(&meta).map_err(io::Error::other)?;
        let previous = tokio::fs::metadata(dir.join(DATA_FILE))
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        // Metadata goes last; a body without it never matches
        tokio::fs::remove_file(dir.join(META_FILE)).await.ok();
        write_atomic(&dir, DATA_FILE, data).await?;
        write_atomic(&dir, META_FILE, &meta).await?;

        let used = self.adjust_used(size, previous);
        if self.capacity > 0 && used > percent_of(self.capacity, self.watermark_high) {
            self.evict().await;
        }
        Ok(())
    }

    /// Drop the entry for `bucket/key`
    pub async fn invalidate(&self, bucket: &str, key: &str) {
        let dir = self.entry_dir(bucket, key);
        let size = tokio::fs::metadata(dir.join(DATA_FILE))
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                self.adjust_used(0, size);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(bucket = %bucket, key = %key, error = %e, "unable to drop cache entry"),
        }
    }

    fn adjust_used(&self, added: u64, removed: u64) -> u64 {
        let update = |used: u64| Some(used.saturating_add(added).saturating_sub(removed));
        match self.used.fetch_update(Ordering::Relaxed, Ordering::Relaxed, update) {
            Ok(old) | Err(old) => old.saturating_add(added).saturating_sub(removed),
        }
    }

    /// Remove least recently used entries until usage is at the low watermark
    async fn evict(&self) {
        let Ok(_running) = self.evicting.try_lock() else {
            return;
        };
        let drives = self.drives.clone();
        let mut entries = match tokio::task::spawn_blocking(move || scan_entries(&drives)).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "cache scan failed");
                return;
            }
        };
        entries.sort_by_key(|entry| entry.last_used);

        let target = percent_of(self.capacity, self.watermark_low);
        let mut used: u64 = entries.iter().map(|entry| entry.size).sum();
        let mut evicted = 0usize;
        for entry in entries {
            if used <= target {
                break;
            }
            match tokio::fs::remove_dir_all(&entry.dir).await {
                Ok(()) => {
                    used = used.saturating_sub(entry.size);
                    evicted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => used = used.saturating_sub(entry.size),
                Err(e) => warn!(entry = %entry.dir.display(), error = %e, "unable to evict cache entry"),
            }
        }
        self.used.store(used, Ordering::Relaxed);
        info!(evicted, used, capacity = self.capacity, "cache eviction finished");
    }
}

async fn read_meta(dir: &Path) -> Option<CacheMeta> {
    let raw = tokio::fs::read(dir.join(META_FILE)).await.ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Replace `dir/name` with `contents` through a uniquely named temporary file
async fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> io::Result<()> {
    let tmp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()));
    let result = match tokio::fs::write(&tmp, contents).await {
        Ok(()) => tokio::fs::rename(&tmp, dir.join(name)).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        tokio::fs::remove_file(&tmp).await.ok();
    }
    result
}

/// Every stored body on `drives`, with its size and last use
fn scan_entries(drives: &[PathBuf]) -> Vec<CachedEntry> {
    let mut entries = Vec::new();
    for drive in drives {
        let Ok(dirs) = std::fs::read_dir(drive) else {
            continue;
        };
        for dir in dirs.flatten() {
            let dir = dir.path();
            let Ok(meta) = std::fs::metadata(dir.join(DATA_FILE)) else {
                continue;
            };
            entries.push(CachedEntry {
                size: meta.len(),
                last_used: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                dir,
            });
        }
    }
    entries
}

fn percent_of(total: u64, percent: u8) -> u64 {
    (u128::from(total) * u128::from(percent) / 100) as u64
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn drive_size(drive: &Path) -> Option<u64> {
    let stat = nix::sys::statvfs::statvfs(drive).ok()?;
    Some(stat.blocks() as u64 * stat.fragment_size() as u64)
}

#[cfg(not(unix))]
fn drive_size(_drive: &Path) -> Option<u64> {
    None
}

/// Human readable byte size
pub fn format_bytes(bytes: u64) -> String {
    bytesize::ByteSize::b(bytes).to_string_as(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cache(dir: &TempDir, exclude: &[&str]) -> DiskCache {
        DiskCache::new(&CacheConfig {
            drives: vec![dir.path().join("d1"), dir.path().join("d2")],
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
        .unwrap()
    }

    fn bounded(dir: &TempDir, max_size: u64) -> DiskCache {
        DiskCache::new(&CacheConfig {
            drives: vec![dir.path().join("d1")],
            max_size: Some(max_size),
            watermark_low: 50,
            watermark_high: 80,
            ..Default::default()
        })
        .unwrap()
    }

    fn age(cache: &DiskCache, key: &str, secs_ago: u64) {
        let when = SystemTime::now() - Duration::from_secs(secs_ago);
        let path = cache.entry_dir("b", key).join(DATA_FILE);
        filetime::set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
    }

    #[tokio::test]
    async fn test_hit_requires_matching_etag() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, &[]);
        assert!(dir.path().join("d1").is_dir());

        assert!(cache.get("b", "k", "e1").await.is_none());
        cache.put("b", "k", "e1", &Bytes::from_static(b"body")).await.unwrap();
        assert_eq!(cache.get("b", "k", "e1").await.unwrap().as_ref(), b"body");
        assert!(cache.get("b", "k", "e2").await.is_none());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
        assert_eq!(cache.used(), 4);

        cache.invalidate("b", "k").await;
        assert!(cache.get("b", "k", "e1").await.is_none());
        assert_eq!(cache.used(), 0);
        // Nothing to drop
        cache.invalidate("b", "missing").await;
    }

    #[test]
    fn test_file_in_place_of_drive_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        let Err(err) = DiskCache::new(&CacheConfig {
            drives: vec![file],
            ..Default::default()
        }) else {
            panic!("a file was accepted as a cache drive");
        };
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[rstest]
    #[case("docs", "report.pdf", true)]
    #[case("private", "a/b", true)]
    #[case("logs", "day1.log", true)]
    #[case("logs", "day10.log", false)]
    #[case("docs", "report.txt", false)]
    fn test_exclude_patterns(#[case] bucket: &str, #[case] key: &str, #[case] excluded: bool) {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, &["*.pdf", "private/*", "logs/day?.log"]);
        assert_eq!(cache.is_excluded(bucket, key), excluded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fills_never_serve_partial_bodies() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(cache(&dir, &[]));
        let body = Bytes::from(vec![7u8; 1024 * 1024]);

        for _ in 0..20 {
            let mut tasks = Vec::new();
            for _ in 0..4 {
                let (put_cache, body) = (Arc::clone(&cache), body.clone());
                tasks.push(tokio::spawn(async move {
                    put_cache.put("b", "k", "etag1", &body).await.unwrap();
                    None::<Bytes>
                }));
                let cache = Arc::clone(&cache);
                tasks.push(tokio::spawn(async move { cache.get("b", "k", "etag1").await }));
            }
            for task in tasks {
                if let Some(data) = task.await.unwrap() {
                    assert_eq!(data.len(), body.len());
                    assert_eq!(data, body);
                }
            }
        }
        assert!(cache.hits() > 0);
    }

    #[tokio::test]
    async fn test_eviction_drops_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let cache = bounded(&dir, 1000);
        let body = Bytes::from(vec![1u8; 300]);

        cache.put("b", "old", "e", &body).await.unwrap();
        age(&cache, "old", 30);
        cache.put("b", "mid", "e", &body).await.unwrap();
        age(&cache, "mid", 20);
        assert_eq!(cache.used(), 600);

        // 900 bytes passes the 800 byte high watermark; evict to 500
        cache.put("b", "new", "e", &body).await.unwrap();
        assert_eq!(cache.used(), 300);
        assert!(cache.get("b", "old", "e").await.is_none());
        assert!(cache.get("b", "mid", "e").await.is_none());
        assert_eq!(cache.get("b", "new", "e").await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_recent_hit_survives_eviction() {
        let dir = TempDir::new().unwrap();
        // Evicting one entry is enough to reach 700 bytes
        let cache = DiskCache::new(&CacheConfig {
            drives: vec![dir.path().join("d1")],
            max_size: Some(1000),
            watermark_low: 70,
            watermark_high: 80,
            ..Default::default()
        })
        .unwrap();
        let body = Bytes::from(vec![1u8; 300]);

        cache.put("b", "first", "e", &body).await.unwrap();
        age(&cache, "first", 30);
        cache.put("b", "second", "e", &body).await.unwrap();
        age(&cache, "second", 20);
        // Reading refreshes the entry
        assert!(cache.get("b", "first", "e").await.is_some());

        cache.put("b", "third", "e", &body).await.unwrap();
        assert!(cache.get("b", "second", "e").await.is_none());
        assert!(cache.get("b", "first", "e").await.is_some());
    }

    #[tokio::test]
    async fn test_oversized_body_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = bounded(&dir, 1000);
        cache.put("b", "big", "e", &Bytes::from(vec![0u8; 900])).await.unwrap();
        assert_eq!(cache.used(), 0);
        assert!(cache.get("b", "big", "e").await.is_none());
    }

    #[tokio::test]
    async fn test_usage_counted_on_reopen() {
        let dir = TempDir::new().unwrap();
        bounded(&dir, 1000).put("b", "k", "e", &Bytes::from(vec![0u8; 100])).await.unwrap();
        assert_eq!(bounded(&dir, 1000).used(), 100);
    }

    #[rstest]
    #[case(512, "512 B")]
    #[case(2048, "2.0 KiB")]
    #[case(5 * 1024 * 1024 * 1024, "5.0 GiB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }
}
