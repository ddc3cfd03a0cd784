//! S3 v1 listing over a sorted object sequence

use crate::MAX_OBJECT_LIST;
use ming_core::{ListObjectsInfo, ObjectInfo};

/// Build one listing page from objects sorted by name.
///
/// Keys at or before `marker` are skipped. With a delimiter, keys sharing a
/// sub-prefix roll up into one common prefix. `next_marker` is only filled
/// when a delimiter was given; callers without one resume from the last key.
pub fn paginate<I>(objects: I, prefix: &str, marker: &str, delimiter: &str, max_keys: Option<usize>) -> ListObjectsInfo
where
    I: IntoIterator<Item = ObjectInfo>,
{
    let limit = max_keys.unwrap_or(MAX_OBJECT_LIST).min(MAX_OBJECT_LIST);
    let mut page = ListObjectsInfo::default();
    let mut last_entry = String::new();
    let mut count = 0usize;

    for obj in objects {
        if !obj.name.starts_with(prefix) || (!marker.is_empty() && obj.name.as_str() <= marker) {
            continue;
        }

        let common_prefix = if delimiter.is_empty() {
            None
        } else {
            obj.name[prefix.len()..]
                .find(delimiter)
                .map(|idx| obj.name[..prefix.len() + idx + delimiter.len()].to_string())
        };

        if let Some(cp) = &common_prefix {
            if page.prefixes.last() == Some(cp) || cp.as_str() <= marker {
                continue;
            }
        }

        if count == limit {
            page.is_truncated = true;
            break;
        }
        count += 1;

        match common_prefix {
            Some(cp) => {
                last_entry = cp.clone();
                page.prefixes.push(cp);
            }
            None => {
                last_entry = obj.name.clone();
                page.objects.push(obj);
            }
        }
    }

    if page.is_truncated && !delimiter.is_empty() {
        page.next_marker = last_entry;
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(names: &[&str]) -> Vec<ObjectInfo> {
        names.iter().map(|n| ObjectInfo::new("b", *n, 1, "e")).collect()
    }

    fn names(page: &ListObjectsInfo) -> Vec<&str> {
        page.objects.iter().map(|o| o.name.as_str()).collect()
    }

    #[test]
    fn test_flat_listing_with_marker_and_limit() {
        let all = objects(&["a", "b", "c", "d"]);
        let page = paginate(all.clone(), "", "a", "", Some(2));
        assert_eq!(names(&page), vec!["b", "c"]);
        assert!(page.is_truncated);
        assert!(page.next_marker.is_empty());

        let page = paginate(all, "", "c", "", Some(2));
        assert_eq!(names(&page), vec!["d"]);
        assert!(!page.is_truncated);
    }

    #[test]
    fn test_delimiter_rolls_up_prefixes() {
        let all = objects(&["docs/a", "docs/b", "photos/x/1", "readme", "videos/v"]);
        let page = paginate(all.clone(), "", "", "/", None);
        assert_eq!(names(&page), vec!["readme"]);
        assert_eq!(page.prefixes, vec!["docs/", "photos/", "videos/"]);

        let page = paginate(all.clone(), "", "", "/", Some(2));
        assert_eq!(page.prefixes, vec!["docs/", "photos/"]);
        assert!(page.is_truncated);
        assert_eq!(page.next_marker, "photos/");

        let page = paginate(all, "", "photos/", "/", Some(2));
        assert_eq!(names(&page), vec!["readme"]);
        assert_eq!(page.prefixes, vec!["videos/"]);
        assert!(!page.is_truncated);
    }

    #[test]
    fn test_prefix_filter() {
        let all = objects(&["a/1", "a/2", "b/1"]);
        let page = paginate(all, "a/", "", "", None);
        assert_eq!(names(&page), vec!["a/1", "a/2"]);
    }

    #[test]
    fn test_unbounded_request_is_capped() {
        let many: Vec<ObjectInfo> = (0..MAX_OBJECT_LIST + 5)
            .map(|i| ObjectInfo::new("b", format!("k{i:05}"), 1, "e"))
            .collect();
        let page = paginate(many, "", "", "", None);
        assert_eq!(page.objects.len(), MAX_OBJECT_LIST);
        assert!(page.is_truncated);
    }
}
