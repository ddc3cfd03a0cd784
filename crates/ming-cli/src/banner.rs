//! Startup banner printed once the gateway is serving

use crate::subsys::cache::format_bytes;
use ming_core::Credentials;
use std::fmt::Write;

const DOCS_URL: &str = "https://github.com/ming-gateway/ming#readme";

/// Facts shown to the operator at startup
#[derive(Debug)]
pub struct StartupBanner<'a> {
    pub backend: &'a str,
    pub production: bool,
    pub endpoints: Vec<String>,
    /// `None` hides credentials (`--anonymous`)
    pub credentials: Option<&'a Credentials>,
    pub cache_capacity: Option<u64>,
    /// Certificates served over TLS; zero for plain HTTP
    pub certificates: usize,
}

/// Drop `:80` from http and `:443` from https endpoints
pub fn strip_standard_port(endpoint: &str) -> String {
    let stripped = endpoint
        .strip_prefix("http://")
        .and_then(|rest| rest.strip_suffix(":80").map(|host| format!("http://{host}")))
        .or_else(|| {
            endpoint
                .strip_prefix("https://")
                .and_then(|rest| rest.strip_suffix(":443").map(|host| format!("https://{host}")))
        });
    stripped.unwrap_or_else(|| endpoint.to_string())
}

impl StartupBanner<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let endpoints: Vec<String> = self.endpoints.iter().map(|e| strip_standard_port(e)).collect();

        let _ = writeln!(out, "Endpoint: {}", endpoints.join("  "));
        if let Some(creds) = self.credentials {
            let _ = writeln!(out, "RootUser: {}", creds.access_key);
            let _ = writeln!(out, "RootPass: {}", creds.secret_key);
        }
        if let Some(capacity) = self.cache_capacity {
            let _ = writeln!(out, "Cache Capacity: {}", format_bytes(capacity));
        }

        if let Some(endpoint) = endpoints.first() {
            let (access_key, secret_key) = match self.credentials {
                Some(creds) => (creds.access_key.as_str(), creds.secret_key.as_str()),
                None => ("YOUR-ACCESS-KEY", "YOUR-SECRET-KEY"),
            };
            let _ = writeln!(out);
            let _ = writeln!(out, "Command-line: https://min.io/docs/minio/linux/reference/minio-mc.html");
            let _ = writeln!(
                out,
                "   $ mc alias set my{} {} {} {}",
                self.backend, endpoint, access_key, secret_key
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Documentation: {DOCS_URL}");

        if self.certificates > 0 {
            let _ = writeln!(out, "TLS: serving {} certificate(s)", self.certificates);
        }

        if !self.production {
            let _ = writeln!(out);
            let _ = writeln!(out, "*** Warning: Not Ready for Production ***");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://10.0.0.1:80", "http://10.0.0.1")]
    #[case("https://10.0.0.1:443", "https://10.0.0.1")]
    #[case("http://10.0.0.1:443", "http://10.0.0.1:443")]
    #[case("https://10.0.0.1:9000", "https://10.0.0.1:9000")]
    fn test_strip_standard_port(#[case] endpoint: &str, #[case] expected: &str) {
        assert_eq!(strip_standard_port(endpoint), expected);
    }

    #[test]
    fn test_render_full() {
        let creds = Credentials::default();
        let banner = StartupBanner {
            backend: "memory",
            production: false,
            endpoints: vec!["http://127.0.0.1:80".into(), "http://10.0.0.1:80".into()],
            credentials: Some(&creds),
            cache_capacity: Some(2048),
            certificates: 0,
        };
        let text = banner.render();
        assert!(text.starts_with("Endpoint: http://127.0.0.1  http://10.0.0.1\n"));
        assert!(text.contains("RootUser: mingadmin\n"));
        assert!(text.contains("Cache Capacity: 2.0 KiB\n"));
        assert!(text.contains("$ mc alias set mymemory http://127.0.0.1 mingadmin mingadmin\n"));
        assert!(text.contains("*** Warning: Not Ready for Production ***"));
        assert!(!text.contains("TLS:"));
    }

    #[test]
    fn test_render_anonymous_production() {
        let banner = StartupBanner {
            backend: "nas",
            production: true,
            endpoints: vec!["https://10.0.0.1:9000".into()],
            credentials: None,
            cache_capacity: None,
            certificates: 2,
        };
        let text = banner.render();
        assert!(!text.contains("RootUser"));
        assert!(text.contains("YOUR-ACCESS-KEY"));
        assert!(text.contains("TLS: serving 2 certificate(s)\n"));
        assert!(!text.contains("Warning"));
    }
}
