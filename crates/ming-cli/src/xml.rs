//! S3 XML response bodies

use chrono::{DateTime, SecondsFormat, Utc};
use ming_core::{BucketInfo, ListObjectsInfo};
use serde::Serialize;

const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn render<T: Serialize>(value: &T) -> String {
    match quick_xml::se::to_string(value) {
        Ok(body) => format!("{XML_HEADER}\n{body}"),
        Err(e) => {
            tracing::error!(error = %e, "unable to serialize XML response");
            XML_HEADER.to_string()
        }
    }
}

#[derive(Serialize)]
#[serde(rename = "ListAllMyBucketsResult")]
struct ListAllMyBucketsResult<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    #[serde(rename = "Owner")]
    owner: Owner<'a>,
    #[serde(rename = "Buckets")]
    buckets: Buckets,
}

#[derive(Serialize)]
struct Owner<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "DisplayName")]
    display_name: &'a str,
}

#[derive(Serialize)]
struct Buckets {
    #[serde(rename = "Bucket")]
    bucket: Vec<BucketXml>,
}

#[derive(Serialize)]
struct BucketXml {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CreationDate")]
    creation_date: String,
}

/// `GET /` response
pub fn list_all_my_buckets_result(owner: &str, buckets: &[BucketInfo]) -> String {
    render(&ListAllMyBucketsResult {
        xmlns: S3_NAMESPACE,
        owner: Owner {
            id: owner,
            display_name: owner,
        },
        buckets: Buckets {
            bucket: buckets
                .iter()
                .map(|b| BucketXml {
                    name: b.name.clone(),
                    creation_date: timestamp(b.created),
                })
                .collect(),
        },
    })
}

#[derive(Serialize)]
#[serde(rename = "ListBucketResult")]
struct ListBucketResult<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Prefix")]
    prefix: &'a str,
    #[serde(rename = "Marker")]
    marker: &'a str,
    #[serde(rename = "NextMarker", skip_serializing_if = "str::is_empty")]
    next_marker: &'a str,
    #[serde(rename = "MaxKeys")]
    max_keys: usize,
    #[serde(rename = "Delimiter", skip_serializing_if = "str::is_empty")]
    delimiter: &'a str,
    #[serde(rename = "IsTruncated")]
    is_truncated: bool,
    #[serde(rename = "Contents")]
    contents: Vec<ContentsXml>,
    #[serde(rename = "CommonPrefixes")]
    common_prefixes: Vec<CommonPrefixXml>,
}

#[derive(Serialize)]
struct ContentsXml {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "LastModified")]
    last_modified: String,
    #[serde(rename = "ETag")]
    etag: String,
    #[serde(rename = "Size")]
    size: u64,
    #[serde(rename = "StorageClass")]
    storage_class: &'static str,
}

#[derive(Serialize)]
struct CommonPrefixXml {
    #[serde(rename = "Prefix")]
    prefix: String,
}

/// Parameters echoed back in a v1 listing
pub struct ListRequest<'a> {
    pub bucket: &'a str,
    pub prefix: &'a str,
    pub marker: &'a str,
    pub delimiter: &'a str,
    pub max_keys: usize,
}

/// `GET /{bucket}` response
pub fn list_bucket_result(req: &ListRequest<'_>, page: &ListObjectsInfo) -> String {
    render(&ListBucketResult {
        xmlns: S3_NAMESPACE,
        name: req.bucket,
        prefix: req.prefix,
        marker: req.marker,
        next_marker: &page.next_marker,
        max_keys: req.max_keys,
        delimiter: req.delimiter,
        is_truncated: page.is_truncated,
        contents: page
            .objects
            .iter()
            .map(|o| ContentsXml {
                key: o.name.clone(),
                last_modified: timestamp(o.mod_time),
                etag: format!("\"{}\"", o.etag),
                size: o.size,
                storage_class: "STANDARD",
            })
            .collect(),
        common_prefixes: page
            .prefixes
            .iter()
            .map(|p| CommonPrefixXml { prefix: p.clone() })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ming_core::ObjectInfo;

    #[test]
    fn test_list_all_my_buckets() {
        let xml = list_all_my_buckets_result("ming", &[BucketInfo::new("photos", Utc::now())]);
        assert!(xml.starts_with(XML_HEADER));
        assert!(xml.contains("<ListAllMyBucketsResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">"));
        assert!(xml.contains("<Bucket><Name>photos</Name>"));
    }

    #[test]
    fn test_list_bucket_result_escapes_keys() {
        let page = ListObjectsInfo {
            objects: vec![ObjectInfo::new("b", "a&b.txt", 3, "abc")],
            prefixes: vec!["dir/".to_string()],
            next_marker: "dir/".to_string(),
            is_truncated: true,
        };
        let req = ListRequest {
            bucket: "b",
            prefix: "",
            marker: "",
            delimiter: "/",
            max_keys: 2,
        };
        let xml = list_bucket_result(&req, &page);
        assert!(xml.contains("<Key>a&amp;b.txt</Key>"));
        assert!(xml.contains("<NextMarker>dir/</NextMarker>"));
        assert!(xml.contains("<IsTruncated>true</IsTruncated>"));
        assert!(xml.contains("<CommonPrefixes><Prefix>dir/</Prefix></CommonPrefixes>"));
    }
}
