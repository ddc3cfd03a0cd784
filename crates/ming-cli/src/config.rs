//! Gateway configuration

use crate::sse::{parse_gateway_sse, GatewaySse};
use ming_core::Credentials;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Deployment identifier override
pub const ENV_DEPLOYMENT_ID: &str = "MING_GATEWAY_DEPLOYMENT_ID";
/// Semicolon separated server-side encryption kinds
pub const ENV_GATEWAY_SSE: &str = "MING_GATEWAY_SSE";
/// Root access key
pub const ENV_ROOT_USER: &str = "MING_ROOT_USER";
/// Root secret key
pub const ENV_ROOT_PASSWORD: &str = "MING_ROOT_PASSWORD";

/// Prefix of variables read into [`ServerConfig`]
pub const ENV_PREFIX: &str = "MING";

/// Sub-directory of the certs dir holding trusted CAs
pub const CA_DIR_NAME: &str = "CAs";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to validate credentials inherited from the shell environment: {0}")]
    InvalidCredentials(String),

    #[error("gateway server-side encryption type {0:?} is not supported")]
    InvalidSse(String),

    #[error("unable to load server configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Gateway server configuration taken from the command line
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address, `host:port`; an empty host means all interfaces
    pub address: String,
    /// Directory holding `public.crt`, `private.key` and the `CAs` directory
    pub certs_dir: PathBuf,
    /// Suppress the startup banner
    pub quiet: bool,
    /// Hide credentials from the startup banner
    pub anonymous: bool,
    /// Log as JSON
    pub json: bool,
    /// Enable debug logging
    pub debug: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: ":9000".to_string(),
            certs_dir: default_certs_dir(),
            quiet: false,
            anonymous: false,
            json: false,
            debug: false,
        }
    }
}

impl GatewayConfig {
    /// Directory of trusted CA certificates
    pub fn ca_dir(&self) -> PathBuf {
        self.certs_dir.join(CA_DIR_NAME)
    }
}

/// `$HOME/.ming/certs`, or `.ming/certs` when no home is known
pub fn default_certs_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".ming")
        .join("certs")
}

/// What to do when background IAM initialization fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IamFailurePolicy {
    /// Keep serving with IAM marked as failed
    #[default]
    Degrade,
    /// Stop the listener and exit with an error
    Exit,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directories; caching is off when empty
    pub drives: Vec<PathBuf>,
    /// `bucket/key` patterns never cached; `*` and `?` wildcards
    pub exclude: Vec<String>,
    /// Percentage of each drive the cache may use
    pub quota: u8,
    /// Byte limit used instead of the drive quota
    pub max_size: Option<u64>,
    /// Eviction stops once usage falls to this percentage of capacity
    pub watermark_low: u8,
    /// Eviction starts once usage passes this percentage of capacity
    pub watermark_high: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            drives: Vec::new(),
            exclude: Vec::new(),
            quota: 80,
            max_size: None,
            watermark_low: 70,
            watermark_high: 80,
        }
    }
}

impl CacheConfig {
    pub fn enabled(&self) -> bool {
        !self.drives.is_empty()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IamConfig {
    pub enabled: bool,
    pub failure_policy: IamFailurePolicy,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
}

/// Server configuration built from `MING_*` environment variables
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub region: String,
    pub cache: CacheConfig,
    pub iam: IamConfig,
    pub compression: CompressionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            cache: CacheConfig::default(),
            iam: IamConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.drives")
            .with_list_parse_key("cache.exclude")
            .try_parsing(true)
            .source(vars);

        let settings = config::Config::builder()
            .set_default("region", defaults.region)?
            .set_default("cache.quota", i64::from(defaults.cache.quota))?
            .add_source(env)
            .build()?;

        let mut server: Self = settings.try_deserialize()?;
        let cache = &mut server.cache;
        cache.quota = cache.quota.min(100);
        cache.watermark_high = cache.watermark_high.min(100);
        cache.watermark_low = cache.watermark_low.min(cache.watermark_high);
        Ok(server)
    }
}

/// Gateway variables read directly from the environment
#[derive(Clone, Debug, Default)]
pub struct GatewayEnv {
    pub deployment_id: Option<String>,
    pub sse: Option<String>,
    pub root_user: Option<String>,
    pub root_password: Option<String>,
}

/// Result of applying [`GatewayEnv`]
#[derive(Clone, Debug)]
pub struct EnvOverrides {
    pub deployment_id: String,
    pub credentials: Credentials,
    pub sse: Option<GatewaySse>,
}

impl GatewayEnv {
    /// Read the variables from the process environment
    pub fn from_process() -> Self {
        let read = |name: &str| std::env::var(name).ok();
        Self {
            deployment_id: read(ENV_DEPLOYMENT_ID).filter(|id| !id.is_empty()),
            sse: read(ENV_GATEWAY_SSE),
            root_user: read(ENV_ROOT_USER),
            root_password: read(ENV_ROOT_PASSWORD),
        }
    }

    /// The configured deployment id, generating one when unset
    pub fn deployment_id(&mut self) -> String {
        self.deployment_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }

    /// Validate the variables and resolve defaults
    pub fn apply(mut self) -> Result<EnvOverrides, ConfigError> {
        let mut credentials = Credentials::default();
        if let Some(user) = self.root_user.take() {
            credentials.access_key = user;
        }
        if let Some(password) = self.root_password.take() {
            credentials.secret_key = password;
        }
        if !credentials.is_valid() {
            return Err(ConfigError::InvalidCredentials(format!(
                "access key must be at least {} and secret key at least {} characters",
                ming_core::credentials::ACCESS_KEY_MIN_LEN,
                ming_core::credentials::SECRET_KEY_MIN_LEN
            )));
        }

        let sse = self.sse.as_deref().map(parse_gateway_sse).transpose()?;

        Ok(EnvOverrides {
            deployment_id: self.deployment_id(),
            credentials,
            sse,
        })
    }
}

/// One documented configuration key
#[derive(Clone, Debug, Serialize)]
pub struct HelpEntry {
    pub key: &'static str,
    pub description: &'static str,
    pub optional: bool,
}

/// Configuration keys understood by a gateway running `backend`
pub fn help_entries(backend: &str) -> Vec<HelpEntry> {
    let mut entries = vec![
        HelpEntry {
            key: ENV_ROOT_USER,
            description: "root access key, at least 3 characters",
            optional: true,
        },
        HelpEntry {
            key: ENV_ROOT_PASSWORD,
            description: "root secret key, at least 8 characters",
            optional: true,
        },
        HelpEntry {
            key: ENV_DEPLOYMENT_ID,
            description: "fixed deployment identifier",
            optional: true,
        },
        HelpEntry {
            key: ENV_GATEWAY_SSE,
            description: "server-side encryption kinds, e.g. \"S3;C\"",
            optional: true,
        },
        HelpEntry {
            key: "MING_REGION",
            description: "region reported to clients",
            optional: true,
        },
        HelpEntry {
            key: "MING_CACHE__DRIVES",
            description: "comma separated cache directories",
            optional: true,
        },
        HelpEntry {
            key: "MING_CACHE__EXCLUDE",
            description: "comma separated bucket/key patterns to keep out of the cache",
            optional: true,
        },
        HelpEntry {
            key: "MING_CACHE__QUOTA",
            description: "percentage of each cache drive to use",
            optional: true,
        },
        HelpEntry {
            key: "MING_CACHE__MAX_SIZE",
            description: "cache size limit in bytes, instead of the drive quota",
            optional: true,
        },
        HelpEntry {
            key: "MING_CACHE__WATERMARK_LOW",
            description: "percentage of cache capacity eviction frees down to",
            optional: true,
        },
        HelpEntry {
            key: "MING_CACHE__WATERMARK_HIGH",
            description: "percentage of cache capacity that starts eviction",
            optional: true,
        },
        HelpEntry {
            key: "MING_IAM__ENABLED",
            description: "load identities from the backend",
            optional: true,
        },
        HelpEntry {
            key: "MING_IAM__FAILURE_POLICY",
            description: "\"degrade\" or \"exit\" when identities fail to load",
            optional: true,
        },
        HelpEntry {
            key: "MING_COMPRESSION__ENABLED",
            description: "compress objects, when the backend supports it",
            optional: true,
        },
    ];
    if backend == "s3" {
        entries.push(HelpEntry {
            key: "ENDPOINT",
            description: "remote S3 endpoint, https is assumed without a scheme",
            optional: true,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::SseKind;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert!(!config.cache.enabled());
        assert_eq!(config.cache.quota, 80);
        assert_eq!(config.iam.failure_policy, IamFailurePolicy::Degrade);
        assert!(!config.compression.enabled);
    }

    #[test]
    fn test_server_config_from_vars() {
        let config = ServerConfig::from_vars(vars(&[
            ("MING_REGION", "eu-west-1"),
            ("MING_CACHE__DRIVES", "/tmp/c1,/tmp/c2"),
            ("MING_CACHE__EXCLUDE", "*.pdf"),
            ("MING_CACHE__QUOTA", "50"),
            ("MING_CACHE__MAX_SIZE", "1048576"),
            ("MING_CACHE__WATERMARK_LOW", "60"),
            ("MING_IAM__ENABLED", "true"),
            ("MING_IAM__FAILURE_POLICY", "exit"),
            ("MING_COMPRESSION__ENABLED", "true"),
        ]))
        .unwrap();

        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.cache.drives, vec![PathBuf::from("/tmp/c1"), PathBuf::from("/tmp/c2")]);
        assert_eq!(config.cache.exclude, vec!["*.pdf".to_string()]);
        assert_eq!(config.cache.quota, 50);
        assert_eq!(config.cache.max_size, Some(1_048_576));
        assert_eq!(config.cache.watermark_high, 80);
        assert_eq!(config.cache.watermark_low, 60);
        assert!(config.iam.enabled);
        assert_eq!(config.iam.failure_policy, IamFailurePolicy::Exit);
        assert!(config.compression.enabled);
    }

    #[test]
    fn test_env_defaults_apply() {
        let overrides = GatewayEnv::default().apply().unwrap();
        assert!(overrides.credentials.is_default());
        assert!(overrides.sse.is_none());
        assert!(!overrides.deployment_id.is_empty());
    }

    #[test]
    fn test_env_keeps_deployment_id() {
        let mut env = GatewayEnv {
            deployment_id: Some("dep-1".into()),
            ..Default::default()
        };
        assert_eq!(env.deployment_id(), "dep-1");
        assert_eq!(env.apply().unwrap().deployment_id, "dep-1");
    }

    #[test]
    fn test_env_rejects_short_credentials() {
        let env = GatewayEnv {
            root_user: Some("ab".into()),
            ..Default::default()
        };
        let err = env.apply().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCredentials(_)));
        assert!(err
            .to_string()
            .starts_with("Unable to validate credentials inherited from the shell environment"));
    }

    #[test]
    fn test_env_parses_sse() {
        let env = GatewayEnv {
            sse: Some("s3".into()),
            ..Default::default()
        };
        let sse = env.apply().unwrap().sse.unwrap();
        assert!(sse.contains(SseKind::S3));

        let env = GatewayEnv {
            sse: Some("kms".into()),
            ..Default::default()
        };
        assert!(matches!(env.apply(), Err(ConfigError::InvalidSse(token)) if token == "KMS"));
    }

    #[test]
    fn test_help_entries_for_s3_mention_endpoint() {
        assert!(help_entries("s3").iter().any(|e| e.key == "ENDPOINT"));
        assert!(!help_entries("nas").iter().any(|e| e.key == "ENDPOINT"));
    }
}
