//! Gateway server-side encryption setting

use crate::config::ConfigError;
use std::collections::BTreeSet;
use std::fmt;

/// Server-side encryption kinds a gateway may be asked to apply
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SseKind {
    /// Keys managed by the server (`SSE-S3`)
    S3,
    /// Keys supplied by the client (`SSE-C`)
    C,
}

impl SseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "S3",
            Self::C => "C",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "S3" | "SSE-S3" => Some(Self::S3),
            "C" | "SSE-C" => Some(Self::C),
            _ => None,
        }
    }
}

/// The set of encryption kinds requested through `MING_GATEWAY_SSE`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatewaySse(BTreeSet<SseKind>);

impl GatewaySse {
    pub fn contains(&self, kind: SseKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SseKind> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for GatewaySse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = self.0.iter().map(SseKind::as_str).collect();
        f.write_str(&kinds.join(";"))
    }
}

/// Parse a `;` separated, case-insensitive list of encryption kinds.
///
/// An empty value parses to an empty set. Unknown tokens are reported upper-cased.
pub fn parse_gateway_sse(value: &str) -> Result<GatewaySse, ConfigError> {
    let mut kinds = BTreeSet::new();
    for token in value.split(';').map(str::trim).filter(|t| !t.is_empty()) {
        let token = token.to_uppercase();
        let kind = SseKind::from_token(&token).ok_or(ConfigError::InvalidSse(token))?;
        kinds.insert(kind);
    }
    Ok(GatewaySse(kinds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_two_kinds_case_insensitive() {
        let sse = parse_gateway_sse("s3;sse-c").unwrap();
        assert_eq!(sse.len(), 2);
        assert!(sse.contains(SseKind::S3));
        assert!(sse.contains(SseKind::C));
        assert_eq!(sse.to_string(), "S3;C");
    }

    #[test]
    fn test_unknown_token_is_named() {
        let err = parse_gateway_sse("bogus").unwrap_err();
        assert!(matches!(&err, ConfigError::InvalidSse(token) if token == "BOGUS"));
        assert!(err.to_string().contains("BOGUS"));
    }

    #[test]
    fn test_unknown_token_after_valid_one() {
        assert!(matches!(
            parse_gateway_sse("S3;kms"),
            Err(ConfigError::InvalidSse(token)) if token == "KMS"
        ));
    }

    #[rstest]
    #[case("")]
    #[case(";")]
    #[case(" ; ")]
    fn test_empty_value_is_empty_set(#[case] value: &str) {
        let sse = parse_gateway_sse(value).unwrap();
        assert!(sse.is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(parse_gateway_sse("S3;sse-s3;s3").unwrap().len(), 1);
    }
}
