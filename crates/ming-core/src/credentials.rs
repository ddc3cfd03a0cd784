//! Root credentials

use std::fmt;

/// Minimum access key length
pub const ACCESS_KEY_MIN_LEN: usize = 3;

/// Minimum secret key length
pub const SECRET_KEY_MIN_LEN: usize = 8;

/// Default root user when none is configured
pub const DEFAULT_ACCESS_KEY: &str = "mingadmin";

/// Default root password when none is configured
pub const DEFAULT_SECRET_KEY: &str = "mingadmin";

/// Access/secret key pair used by the gateway and handed to backends
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Check key lengths
    pub fn is_valid(&self) -> bool {
        self.access_key.chars().count() >= ACCESS_KEY_MIN_LEN
            && self.secret_key.chars().count() >= SECRET_KEY_MIN_LEN
    }

    /// Whether these are the built-in defaults
    pub fn is_default(&self) -> bool {
        self.access_key == DEFAULT_ACCESS_KEY && self.secret_key == DEFAULT_SECRET_KEY
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(DEFAULT_ACCESS_KEY, DEFAULT_SECRET_KEY)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mingadmin", "mingadmin", true)]
    #[case("abc", "12345678", true)]
    #[case("ab", "12345678", false)]
    #[case("abc", "1234567", false)]
    #[case("", "", false)]
    fn test_credential_validation(#[case] access: &str, #[case] secret: &str, #[case] valid: bool) {
        assert_eq!(Credentials::new(access, secret).is_valid(), valid);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("admin", "supersecretvalue");
        let printed = format!("{creds:?}");
        assert!(printed.contains("admin"));
        assert!(!printed.contains("supersecretvalue"));
    }

    #[test]
    fn test_default_credentials() {
        let creds = Credentials::default();
        assert!(creds.is_default());
        assert!(creds.is_valid());
    }
}
