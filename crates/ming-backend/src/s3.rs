//! Remote S3 backend
//!
//! Talks path-style S3 to any compatible endpoint and signs every request
//! with the gateway credentials. Listing is page-based only, so the gateway
//! layer supplies the recursive walk.

use crate::sigv4::{canonical_query, encode_path, hash_payload, Signer, SigningRequest};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ming_core::{
    parse_gateway_endpoint, BackendInfo, BucketInfo, Credentials, Gateway, ListObjectsInfo, ObjectInfo, ObjectLayer,
    ObjectLayerError, ObjectOptions, Result,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default remote endpoint
pub const DEFAULT_S3_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Default signing region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Response headers never copied into object metadata
pub const DEFAULT_FILTER_KEYS: &[&str] = &[
    "Connection",
    "Transfer-Encoding",
    "Accept-Ranges",
    "Date",
    "Server",
    "Vary",
    "x-amz-bucket-region",
    "x-amz-request-id",
    "x-amz-id-2",
    "Content-Security-Policy",
    "X-Xss-Protection",
];

/// Headers mapped onto `ObjectInfo` fields rather than metadata
const OBJECT_INFO_HEADERS: &[&str] = &["Content-Length", "Content-Type", "ETag", "Last-Modified"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAllMyBucketsResult {
    #[serde(default)]
    buckets: BucketsXml,
}

#[derive(Debug, Default, Deserialize)]
struct BucketsXml {
    #[serde(rename = "Bucket", default)]
    bucket: Vec<BucketXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketXml {
    name: String,
    #[serde(default)]
    creation_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_marker: Option<String>,
    #[serde(default)]
    contents: Vec<ContentsXml>,
    #[serde(default)]
    common_prefixes: Vec<CommonPrefixXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContentsXml {
    key: String,
    #[serde(default)]
    last_modified: String,
    #[serde(rename = "ETag", default)]
    etag: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommonPrefixXml {
    prefix: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorXml {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn parse_xml<T: DeserializeOwned>(text: &str) -> Result<T> {
    quick_xml::de::from_str(text).map_err(|e| ObjectLayerError::Backend(format!("malformed S3 response: {e}")))
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_filtered(name: &str) -> bool {
    DEFAULT_FILTER_KEYS
        .iter()
        .chain(OBJECT_INFO_HEADERS)
        .any(|k| k.eq_ignore_ascii_case(name))
}

/// Build object info from response headers, dropping filtered headers
pub fn object_info_from_headers(bucket: &str, key: &str, headers: &HeaderMap) -> ObjectInfo {
    let size = header_str(headers, "content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let etag = header_str(headers, "etag").map(trim_etag).unwrap_or_default();
    let mut info = ObjectInfo::new(bucket, key, size, etag);
    if let Some(modified) = header_str(headers, "last-modified") {
        info.mod_time = parse_time(modified);
    }
    info.content_type = header_str(headers, "content-type").map(str::to_string);

    for (name, value) in headers {
        if is_filtered(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            info.user_defined.insert(name.as_str().to_string(), value.to_string());
        }
    }
    info
}

/// Remote S3 object layer
pub struct S3Layer {
    client: Client,
    base_url: String,
    host: String,
    region: String,
    signer: Signer,
    online: AtomicBool,
}

impl S3Layer {
    /// Create a layer for `endpoint` (scheme optional, https assumed)
    pub fn new(endpoint: &str, creds: &Credentials, region: &str) -> Result<Self> {
        let (host, secure) = parse_gateway_endpoint(endpoint).map_err(|e| ObjectLayerError::Backend(e.to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ObjectLayerError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("{}://{host}", if secure { "https" } else { "http" }),
            host,
            region: region.to_string(),
            signer: Signer::new(&creds.access_key, &creds.secret_key, region),
            online: AtomicBool::new(true),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(
        &self,
        method: Method,
        bucket: Option<&str>,
        key: Option<&str>,
        query: &[(&str, &str)],
        extra_headers: &[(String, String)],
        body: Bytes,
    ) -> Result<Response> {
        let raw_path = match (bucket, key) {
            (Some(bucket), Some(key)) => format!("/{bucket}/{key}"),
            (Some(bucket), None) => format!("/{bucket}"),
            _ => "/".to_string(),
        };
        let path = encode_path(&raw_path);
        let query_string = canonical_query(query);
        let url = if query_string.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query_string}", self.base_url)
        };

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hash_payload(&body);

        let mut signed: Vec<(&str, &str)> = vec![
            ("host", self.host.as_str()),
            ("x-amz-content-sha256", payload_hash.as_str()),
            ("x-amz-date", amz_date.as_str()),
        ];
        signed.extend(extra_headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let authorization = self.signer.authorization(
            &SigningRequest {
                method: method.as_str(),
                path: &path,
                query: &query_string,
                headers: &signed,
                payload_hash: &payload_hash,
            },
            now,
        );

        let mut req = self
            .client
            .request(method.clone(), &url)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .header("authorization", authorization);
        for (name, value) in extra_headers {
            req = req.header(name.as_str(), value.as_str());
        }

        debug!("Sending {} request to {}", method, url);
        let response = match req.body(body).send().await {
            Ok(response) => response,
            Err(e) => {
                self.online.store(false, Ordering::Relaxed);
                warn!(error = %e, url = %url, "S3 request failed");
                return Err(ObjectLayerError::Backend(e.to_string()));
            }
        };
        self.online.store(true, Ordering::Relaxed);

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(map_error(status, &text, bucket, key))
    }
}

/// Translate an S3 error response into an object layer error
fn map_error(status: StatusCode, body: &str, bucket: Option<&str>, key: Option<&str>) -> ObjectLayerError {
    let parsed: ErrorXml = if body.trim().is_empty() {
        ErrorXml::default()
    } else {
        parse_xml(body).unwrap_or_default()
    };
    let bucket_name = bucket.unwrap_or_default().to_string();

    match parsed.code.as_str() {
        "NoSuchBucket" => ObjectLayerError::BucketNotFound(bucket_name),
        "NoSuchKey" => ObjectLayerError::ObjectNotFound {
            bucket: bucket_name,
            key: key.unwrap_or_default().to_string(),
        },
        "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" => ObjectLayerError::BucketExists(bucket_name),
        "BucketNotEmpty" => ObjectLayerError::BucketNotEmpty(bucket_name),
        "InvalidBucketName" => ObjectLayerError::InvalidBucketName(bucket_name),
        "NotImplemented" => ObjectLayerError::NotImplemented(parsed.message),
        "" if status == StatusCode::NOT_FOUND => match key {
            Some(key) => ObjectLayerError::ObjectNotFound {
                bucket: bucket_name,
                key: key.to_string(),
            },
            None => ObjectLayerError::BucketNotFound(bucket_name),
        },
        "" => ObjectLayerError::Backend(format!("HTTP {status}")),
        code => ObjectLayerError::Backend(format!("{code}: {} (HTTP {status})", parsed.message)),
    }
}

#[async_trait]
impl ObjectLayer for S3Layer {
    fn backend_info(&self) -> BackendInfo {
        BackendInfo {
            backend_type: "s3".to_string(),
            online: self.online.load(Ordering::Relaxed),
        }
    }

    #[instrument(skip(self))]
    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        let body = if self.region == DEFAULT_REGION {
            Bytes::new()
        } else {
            Bytes::from(format!(
                r#"<CreateBucketConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>"#,
                self.region
            ))
        };
        self.request(Method::PUT, Some(bucket), None, &[], &[], body).await?;
        Ok(())
    }

    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        self.list_buckets()
            .await?
            .into_iter()
            .find(|b| b.name == bucket)
            .ok_or_else(|| ObjectLayerError::BucketNotFound(bucket.to_string()))
    }

    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = self.request(Method::GET, None, None, &[], &[], Bytes::new()).await?;
        let text = response.text().await.map_err(|e| ObjectLayerError::Backend(e.to_string()))?;
        let result: ListAllMyBucketsResult = parse_xml(&text)?;
        Ok(result
            .buckets
            .bucket
            .into_iter()
            .map(|b| BucketInfo::new(b.name, parse_time(&b.creation_date)))
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.request(Method::DELETE, Some(bucket), None, &[], &[], Bytes::new())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsInfo> {
        let max_keys = max_keys.map(|n| n.to_string());
        let mut query = vec![("prefix", prefix), ("marker", marker), ("delimiter", delimiter)];
        if let Some(max_keys) = &max_keys {
            query.push(("max-keys", max_keys.as_str()));
        }

        let response = self
            .request(Method::GET, Some(bucket), None, &query, &[], Bytes::new())
            .await?;
        let text = response.text().await.map_err(|e| ObjectLayerError::Backend(e.to_string()))?;
        let result: ListBucketResult = parse_xml(&text)?;

        Ok(ListObjectsInfo {
            objects: result
                .contents
                .into_iter()
                .map(|c| ObjectInfo::new(bucket, c.key, c.size, trim_etag(&c.etag)).with_mod_time(parse_time(&c.last_modified)))
                .collect(),
            prefixes: result.common_prefixes.into_iter().map(|p| p.prefix).collect(),
            next_marker: result.next_marker.unwrap_or_default(),
            is_truncated: result.is_truncated,
        })
    }

    #[instrument(skip(self, _opts))]
    async fn get_object(&self, bucket: &str, key: &str, _opts: &ObjectOptions) -> Result<(ObjectInfo, Bytes)> {
        let response = self
            .request(Method::GET, Some(bucket), Some(key), &[], &[], Bytes::new())
            .await?;
        let info = object_info_from_headers(bucket, key, response.headers());
        let data = response.bytes().await.map_err(|e| ObjectLayerError::Backend(e.to_string()))?;
        Ok((info, data))
    }

    async fn get_object_info(&self, bucket: &str, key: &str, _opts: &ObjectOptions) -> Result<ObjectInfo> {
        let response = self
            .request(Method::HEAD, Some(bucket), Some(key), &[], &[], Bytes::new())
            .await?;
        Ok(object_info_from_headers(bucket, key, response.headers()))
    }

    #[instrument(skip(self, data, opts), fields(size = data.len()))]
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes, opts: &ObjectOptions) -> Result<ObjectInfo> {
        let mut headers = Vec::new();
        if let Some(content_type) = &opts.content_type {
            headers.push(("content-type".to_string(), content_type.clone()));
        }
        for (name, value) in &opts.user_defined {
            let name = name.to_lowercase();
            let name = if name.starts_with("x-amz-meta-") {
                name
            } else {
                format!("x-amz-meta-{name}")
            };
            headers.push((name, value.clone()));
        }

        let size = data.len() as u64;
        let response = self
            .request(Method::PUT, Some(bucket), Some(key), &[], &headers, data)
            .await?;
        let etag = header_str(response.headers(), "etag").map(trim_etag).unwrap_or_default();

        let mut info = ObjectInfo::new(bucket, key, size, etag);
        info.content_type = opts.content_type.clone();
        info.user_defined = opts.user_defined.clone();
        Ok(info)
    }

    #[instrument(skip(self, _opts))]
    async fn delete_object(&self, bucket: &str, key: &str, _opts: &ObjectOptions) -> Result<ObjectInfo> {
        self.request(Method::DELETE, Some(bucket), Some(key), &[], &[], Bytes::new())
            .await?;
        Ok(ObjectInfo::new(bucket, key, 0, ""))
    }
}

/// The `s3` backend
#[derive(Clone, Debug)]
pub struct S3Gateway {
    endpoint: String,
    region: String,
}

impl S3Gateway {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: DEFAULT_REGION.to_string(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

impl Default for S3Gateway {
    fn default() -> Self {
        Self::new(DEFAULT_S3_ENDPOINT)
    }
}

#[async_trait]
impl Gateway for S3Gateway {
    fn name(&self) -> &str {
        "s3"
    }

    fn production(&self) -> bool {
        true
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.endpoint.clone())
    }

    async fn new_gateway_layer(&self, creds: Credentials) -> Result<Arc<dyn ObjectLayer>> {
        Ok(Arc::new(S3Layer::new(&self.endpoint, &creds, &self.region)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ming_core::{GatewayLayer, WalkStatus};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn layer(server: &MockServer) -> S3Layer {
        S3Layer::new(&server.uri(), &Credentials::new("gatewayuser", "gatewaysecret"), DEFAULT_REGION).unwrap()
    }

    fn list_page(keys: &[&str], truncated: bool) -> String {
        let contents: String = keys
            .iter()
            .map(|k| {
                format!(
                    "<Contents><Key>{k}</Key><LastModified>2024-01-02T03:04:05.000Z</LastModified>\
                     <ETag>&quot;abc&quot;</ETag><Size>7</Size></Contents>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>bucket</Name><Prefix></Prefix><Marker></Marker><MaxKeys>1000</MaxKeys><IsTruncated>{truncated}</IsTruncated>{contents}</ListBucketResult>"#
        )
    }

    #[tokio::test]
    async fn test_list_objects_signs_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket"))
            .and(query_param("prefix", "docs/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(list_page(&["docs/a", "docs/b"], false)))
            .mount(&server)
            .await;

        let page = layer(&server).list_objects("bucket", "docs/", "", "", None).await.unwrap();
        let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["docs/a", "docs/b"]);
        assert_eq!(page.objects[0].etag, "abc");
        assert_eq!(page.objects[0].size, 7);
        assert!(!page.is_truncated);

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=gatewayuser/"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        assert!(!requests[0].url.query().unwrap_or_default().contains("max-keys"));
    }

    #[tokio::test]
    async fn test_get_object_filters_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/dir/file.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"0123\"")
                    .insert_header("Content-Type", "text/plain")
                    .insert_header("x-amz-request-id", "REQ1")
                    .insert_header("Server", "AmazonS3")
                    .insert_header("x-amz-meta-owner", "ops")
                    .insert_header("Last-Modified", "Wed, 12 Oct 2009 17:50:00 GMT")
                    .set_body_bytes(b"payload".to_vec()),
            )
            .mount(&server)
            .await;

        let (info, data) = layer(&server)
            .get_object("bucket", "dir/file.txt", &ObjectOptions::default())
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"payload");
        assert_eq!(info.etag, "0123");
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
        assert_eq!(info.mod_time.timestamp(), 1255369800);
        assert_eq!(info.user_defined.get("x-amz-meta-owner").map(String::as_str), Some("ops"));
        assert!(!info.user_defined.contains_key("x-amz-request-id"));
        assert!(!info.user_defined.contains_key("server"));
        assert!(!info.user_defined.contains_key("etag"));
    }

    #[tokio::test]
    async fn test_error_codes_map_to_layer_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gone/obj"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/full"))
            .respond_with(ResponseTemplate::new(409).set_body_string(
                "<Error><Code>BucketNotEmpty</Code><Message>not empty</Message></Error>",
            ))
            .mount(&server)
            .await;

        let layer = layer(&server);
        let opts = ObjectOptions::default();
        assert!(matches!(
            layer.get_object("bucket", "missing", &opts).await,
            Err(ObjectLayerError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            layer.get_object_info("gone", "obj", &opts).await,
            Err(ObjectLayerError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            layer.delete_bucket("full").await,
            Err(ObjectLayerError::BucketNotEmpty(_))
        ));
    }

    #[tokio::test]
    async fn test_put_object_sends_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bucket/k"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"feed\""))
            .mount(&server)
            .await;

        let mut opts = ObjectOptions::default();
        opts.user_defined.insert("Color".into(), "blue".into());
        let info = layer(&server)
            .put_object("bucket", "k", Bytes::from_static(b"abc"), &opts)
            .await
            .unwrap();
        assert_eq!(info.etag, "feed");
        assert_eq!(info.size, 3);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].headers.get("x-amz-meta-color").unwrap(), "blue");
        assert_eq!(requests[0].body, b"abc");
    }

    #[tokio::test]
    async fn test_walk_falls_back_to_last_key_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket"))
            .and(query_param("marker", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(list_page(&["a", "b"], true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bucket"))
            .and(query_param("marker", "b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(list_page(&["c"], false)))
            .mount(&server)
            .await;

        let layer = GatewayLayer::wrap(Arc::new(layer(&server)));
        let (tx, mut rx) = mpsc::channel(8);
        let status = layer
            .walk(CancellationToken::new(), "bucket", "", tx, &ObjectOptions::default())
            .await
            .unwrap();
        assert!(matches!(status, WalkStatus::Started));

        let mut names = Vec::new();
        while let Some(obj) = rx.recv().await {
            names.push(obj.name);
        }
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_gateway_descriptor() {
        let gateway = S3Gateway::default();
        assert_eq!(gateway.name(), "s3");
        assert!(gateway.production());
        assert_eq!(gateway.endpoint().as_deref(), Some(DEFAULT_S3_ENDPOINT));
    }
}
