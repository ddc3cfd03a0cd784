//! NAS backend: a directory tree on local or network-mounted storage
//!
//! Buckets are top-level directories and object keys are relative file paths.
//! Object metadata (ETag, content type, user metadata) lives in JSON sidecars
//! under `<root>/.ming.meta/<bucket>/<key>.json`. The backend has no native
//! walk; the gateway layer pages through listings instead.

use crate::listing::paginate;
use crate::{check_bucket_name, check_object_name, MAX_OBJECT_LIST};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use ming_core::{
    BackendInfo, BucketInfo, Credentials, Gateway, ListObjectsInfo, ObjectInfo, ObjectLayer, ObjectLayerError,
    ObjectOptions, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, instrument, warn};

const META_DIR: &str = ".ming.meta";
const META_SUFFIX: &str = ".json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ObjectMeta {
    etag: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    user_defined: BTreeMap<String, String>,
}

/// How to derive an ETag for files written outside the gateway
enum EtagFallback<'a> {
    Data(&'a [u8]),
    ReadFile,
    Empty,
}

/// Directory-backed object layer
#[derive(Clone, Debug)]
pub struct NasLayer {
    root: PathBuf,
    #[cfg(test)]
    stat_calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl NasLayer {
    /// Open a layer rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let meta = fs::metadata(&root).await?;
        if !meta.is_dir() {
            return Err(ObjectLayerError::Backend(format!("{} is not a directory", root.display())));
        }
        Ok(Self {
            root,
            #[cfg(test)]
            stat_calls: Arc::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    fn meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(bucket).join(format!("{key}{META_SUFFIX}"))
    }

    async fn require_bucket(&self, bucket: &str) -> Result<()> {
        match fs::metadata(self.bucket_path(bucket)).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ObjectLayerError::BucketNotFound(bucket.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ObjectLayerError::BucketNotFound(bucket.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_meta(&self, bucket: &str, key: &str) -> Option<ObjectMeta> {
        let raw = fs::read(self.meta_path(bucket, key)).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(bucket = %bucket, key = %key, error = %e, "ignoring corrupt object metadata");
                None
            }
        }
    }

    async fn object_info(&self, bucket: &str, key: &str, fallback: EtagFallback<'_>) -> Result<ObjectInfo> {
        let path = self.object_path(bucket, key);
        #[cfg(test)]
        self.stat_calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let stat = match fs::metadata(&path).await {
            Ok(stat) if stat.is_file() => stat,
            Ok(_) => return Err(not_found(bucket, key)),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(bucket, key)),
            Err(e) => return Err(e.into()),
        };

        let meta = match self.read_meta(bucket, key).await {
            Some(meta) => meta,
            None => {
                let etag = match fallback {
                    EtagFallback::Data(data) => hex::encode(Md5::digest(data)),
                    EtagFallback::ReadFile => hex::encode(Md5::digest(fs::read(&path).await?)),
                    EtagFallback::Empty => String::new(),
                };
                ObjectMeta {
                    etag,
                    ..Default::default()
                }
            }
        };

        let mod_time: DateTime<Utc> = stat.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
        let mut info = ObjectInfo::new(bucket, key, stat.len(), meta.etag).with_mod_time(mod_time);
        info.content_type = meta.content_type;
        info.user_defined = meta.user_defined;
        Ok(info)
    }

    /// Every file under a bucket, as sorted keys
    async fn collect_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let base = self.bucket_path(bucket);
        let mut keys = Vec::new();
        let mut pending = vec![base.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Ok(rel) = path.strip_prefix(&base) {
                        let key = rel
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/");
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Remove empty directories between `path` and `stop`, exclusive of `stop`
    async fn prune_empty_dirs(path: &Path, stop: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == stop || !dir.starts_with(stop) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

/// The rolled-up prefix `key` lists under, if `delimiter` follows `prefix`
fn common_prefix<'a>(key: &'a str, prefix: &str, delimiter: &str) -> Option<&'a str> {
    if delimiter.is_empty() {
        return None;
    }
    key[prefix.len()..]
        .find(delimiter)
        .map(|idx| &key[..prefix.len() + idx + delimiter.len()])
}

fn not_found(bucket: &str, key: &str) -> ObjectLayerError {
    ObjectLayerError::ObjectNotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

#[async_trait]
impl ObjectLayer for NasLayer {
    fn backend_info(&self) -> BackendInfo {
        BackendInfo {
            backend_type: "nas".to_string(),
            online: self.root.is_dir(),
        }
    }

    #[instrument(skip(self))]
    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket_name(bucket)?;
        match fs::create_dir(self.bucket_path(bucket)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ObjectLayerError::BucketExists(bucket.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        self.require_bucket(bucket).await?;
        let meta = fs::metadata(self.bucket_path(bucket)).await?;
        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(BucketInfo::new(bucket, created))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let mut buckets = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            buckets.push(self.get_bucket_info(&name).await?);
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    #[instrument(skip(self))]
    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.require_bucket(bucket).await?;
        let path = self.bucket_path(bucket);
        let mut entries = fs::read_dir(&path).await?;
        if entries.next_entry().await?.is_some() {
            return Err(ObjectLayerError::BucketNotEmpty(bucket.to_string()));
        }
        fs::remove_dir(&path).await?;
        match fs::remove_dir_all(self.root.join(META_DIR).join(bucket)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsInfo> {
        self.require_bucket(bucket).await?;
        let keys = self.collect_keys(bucket).await?;
        let limit = max_keys.unwrap_or(MAX_OBJECT_LIST).min(MAX_OBJECT_LIST);

        // Stat at most one entry past the page; that one marks it truncated.
        // Keys rolled into a common prefix are never statted.
        let mut objects = Vec::new();
        let mut entries = 0usize;
        let mut last_prefix: Option<&str> = None;
        for key in keys
            .iter()
            .filter(|k| k.starts_with(prefix) && (marker.is_empty() || k.as_str() > marker))
        {
            if entries > limit {
                break;
            }
            if let Some(cp) = common_prefix(key, prefix, delimiter) {
                if last_prefix != Some(cp) && cp > marker {
                    last_prefix = Some(cp);
                    entries += 1;
                    objects.push(ObjectInfo::new(bucket, key.as_str(), 0, ""));
                }
                continue;
            }
            match self.object_info(bucket, key, EtagFallback::Empty).await {
                Ok(info) => {
                    objects.push(info);
                    entries += 1;
                }
                // Deleted between the scan and the stat
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        debug!(bucket = %bucket, prefix = %prefix, marker = %marker, found = objects.len(), "listing");
        Ok(paginate(objects, prefix, marker, delimiter, max_keys))
    }

    async fn get_object(&self, bucket: &str, key: &str, _opts: &ObjectOptions) -> Result<(ObjectInfo, Bytes)> {
        self.require_bucket(bucket).await?;
        check_object_name(key).map_err(|_| not_found(bucket, key))?;
        let data = match fs::read(self.object_path(bucket, key)).await {
            Ok(data) => data,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                return Err(not_found(bucket, key))
            }
            Err(e) => return Err(e.into()),
        };
        let info = self.object_info(bucket, key, EtagFallback::Data(&data)).await?;
        Ok((info, Bytes::from(data)))
    }

    async fn get_object_info(&self, bucket: &str, key: &str, _opts: &ObjectOptions) -> Result<ObjectInfo> {
        self.require_bucket(bucket).await?;
        check_object_name(key).map_err(|_| not_found(bucket, key))?;
        self.object_info(bucket, key, EtagFallback::ReadFile).await
    }

    #[instrument(skip(self, data, opts), fields(size = data.len()))]
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes, opts: &ObjectOptions) -> Result<ObjectInfo> {
        check_object_name(key)?;
        self.require_bucket(bucket).await?;

        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;

        let meta = ObjectMeta {
            etag: hex::encode(Md5::digest(&data)),
            content_type: opts.content_type.clone(),
            user_defined: opts.user_defined.clone(),
        };
        let meta_path = self.meta_path(bucket, key);
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let encoded = serde_json::to_vec(&meta).map_err(|e| ObjectLayerError::Backend(e.to_string()))?;
        fs::write(&meta_path, encoded).await?;

        self.object_info(bucket, key, EtagFallback::Data(&data)).await
    }

    #[instrument(skip(self, opts))]
    async fn delete_object(&self, bucket: &str, key: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        let info = self.get_object_info(bucket, key, opts).await?;

        let path = self.object_path(bucket, key);
        fs::remove_file(&path).await?;
        Self::prune_empty_dirs(&path, &self.bucket_path(bucket)).await;

        let meta_path = self.meta_path(bucket, key);
        if fs::remove_file(&meta_path).await.is_ok() {
            Self::prune_empty_dirs(&meta_path, &self.root.join(META_DIR).join(bucket)).await;
        }
        Ok(info)
    }
}

/// The `nas` backend
#[derive(Clone, Debug)]
pub struct NasGateway {
    path: PathBuf,
}

impl NasGateway {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Gateway for NasGateway {
    fn name(&self) -> &str {
        "nas"
    }

    fn production(&self) -> bool {
        true
    }

    async fn new_gateway_layer(&self, _creds: Credentials) -> Result<Arc<dyn ObjectLayer>> {
        Ok(Arc::new(NasLayer::open(&self.path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ming_core::{GatewayLayer, WalkStatus};
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    async fn layer() -> (TempDir, NasLayer) {
        let dir = TempDir::new().unwrap();
        let layer = NasLayer::open(dir.path()).await.unwrap();
        layer.make_bucket("bucket").await.unwrap();
        (dir, layer)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_with_metadata() {
        let (_dir, layer) = layer().await;
        let mut opts = ObjectOptions {
            content_type: Some("application/json".into()),
            ..Default::default()
        };
        opts.user_defined.insert("x-amz-meta-owner".into(), "ops".into());

        let put = layer
            .put_object("bucket", "dir/doc.json", Bytes::from_static(b"{}"), &opts)
            .await
            .unwrap();
        assert_eq!(put.size, 2);
        assert_eq!(put.etag, "99914b932bd37a50b983c5e7c90ae93b");

        let (info, data) = layer
            .get_object("bucket", "dir/doc.json", &ObjectOptions::default())
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"{}");
        assert_eq!(info.content_type.as_deref(), Some("application/json"));
        assert_eq!(info.user_defined.get("x-amz-meta-owner").map(String::as_str), Some("ops"));
    }

    #[tokio::test]
    async fn test_missing_object_and_bucket() {
        let (_dir, layer) = layer().await;
        let opts = ObjectOptions::default();
        assert!(matches!(
            layer.get_object("bucket", "nope", &opts).await,
            Err(ObjectLayerError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            layer.get_object_info("missing", "k", &opts).await,
            Err(ObjectLayerError::BucketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_prunes_directories() {
        let (dir, layer) = layer().await;
        let opts = ObjectOptions::default();
        layer
            .put_object("bucket", "a/b/c.txt", Bytes::from_static(b"x"), &opts)
            .await
            .unwrap();
        layer.delete_object("bucket", "a/b/c.txt", &opts).await.unwrap();

        assert!(!dir.path().join("bucket/a").exists());
        assert!(dir.path().join("bucket").exists());
        layer.delete_bucket("bucket").await.unwrap();
        assert!(layer.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_hides_metadata_and_system_dirs() {
        let (_dir, layer) = layer().await;
        layer.make_bucket(ming_core::SYSTEM_META_BUCKET).await.unwrap();
        layer
            .put_object("bucket", "k", Bytes::from_static(b"v"), &ObjectOptions::default())
            .await
            .unwrap();

        let buckets: Vec<String> = layer.list_buckets().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(buckets, vec!["bucket"]);
    }

    #[tokio::test]
    async fn test_list_objects_nested_keys() {
        let (_dir, layer) = layer().await;
        for key in ["b/2", "a", "b/1", "c/d/e"] {
            layer
                .put_object("bucket", key, Bytes::from(key.to_string()), &ObjectOptions::default())
                .await
                .unwrap();
        }

        let page = layer.list_objects("bucket", "", "", "", None).await.unwrap();
        let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b/1", "b/2", "c/d/e"]);

        let page = layer.list_objects("bucket", "", "", "/", None).await.unwrap();
        assert_eq!(page.prefixes, vec!["b/", "c/"]);
    }

    #[tokio::test]
    async fn test_list_objects_stats_one_page() {
        use std::sync::atomic::Ordering;

        let (_dir, layer) = layer().await;
        for i in 0..50 {
            layer
                .put_object("bucket", &format!("k{i:02}"), Bytes::from_static(b"."), &ObjectOptions::default())
                .await
                .unwrap();
        }

        layer.stat_calls.store(0, Ordering::Relaxed);
        let page = layer.list_objects("bucket", "", "k10", "", Some(5)).await.unwrap();
        let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["k11", "k12", "k13", "k14", "k15"]);
        assert!(page.is_truncated);
        assert_eq!(layer.stat_calls.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn test_list_objects_skips_stat_for_rolled_up_keys() {
        use std::sync::atomic::Ordering;

        let (_dir, layer) = layer().await;
        for key in ["d/1", "d/2", "d/3", "z"] {
            layer
                .put_object("bucket", key, Bytes::from_static(b"."), &ObjectOptions::default())
                .await
                .unwrap();
        }

        layer.stat_calls.store(0, Ordering::Relaxed);
        let page = layer.list_objects("bucket", "", "", "/", Some(1)).await.unwrap();
        assert_eq!(page.prefixes, vec!["d/"]);
        assert!(page.objects.is_empty());
        assert!(page.is_truncated);
        assert_eq!(page.next_marker, "d/");
        assert_eq!(layer.stat_calls.load(Ordering::Relaxed), 1);

        let page = layer.list_objects("bucket", "", "d/", "/", Some(1)).await.unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].name, "z");
        assert!(!page.is_truncated);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, layer) = layer().await;
        let err = layer
            .put_object("bucket", "../outside", Bytes::from_static(b"x"), &ObjectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectLayerError::InvalidObjectName(_)));
    }

    #[tokio::test]
    async fn test_gateway_layer_walks_nas_through_listing() {
        let (_dir, nas) = layer().await;
        for key in ["x/1", "x/2", "y/1"] {
            nas.put_object("bucket", key, Bytes::from_static(b"."), &ObjectOptions::default())
                .await
                .unwrap();
        }

        let layer = GatewayLayer::wrap(Arc::new(nas));
        let (tx, mut rx) = mpsc::channel(ming_core::WALK_SINK_CAPACITY);
        let status = layer
            .walk(CancellationToken::new(), "bucket", "x/", tx, &ObjectOptions::default())
            .await
            .unwrap();
        assert!(matches!(status, WalkStatus::Started));

        let mut names = Vec::new();
        while let Some(obj) = rx.recv().await {
            names.push(obj.name);
        }
        assert_eq!(names, vec!["x/1", "x/2"]);
    }
}
