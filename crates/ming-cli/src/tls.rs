//! TLS certificate loading

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Public certificate file name inside the certs directory
pub const PUBLIC_CERT_FILE: &str = "public.crt";
/// Private key file name inside the certs directory
pub const PRIVATE_KEY_FILE: &str = "private.key";

/// TLS loading errors
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("{present} exists but {missing} is missing")]
    Incomplete { present: PathBuf, missing: PathBuf },

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Server certificate chain and key
#[derive(Debug)]
pub struct TlsMaterial {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
    pub cert_path: PathBuf,
}

impl TlsMaterial {
    pub fn cert_count(&self) -> usize {
        self.certs.len()
    }

    /// Build a rustls server configuration on the ring provider
    pub fn server_config(&self) -> Result<Arc<rustls::ServerConfig>, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.certs.clone(), self.key.clone_key())?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

fn open(path: &Path) -> Result<BufReader<fs::File>, TlsError> {
    fs::File::open(path).map(BufReader::new).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load every PEM certificate in `path`
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first private key in `path`
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Load `public.crt` and `private.key` from `certs_dir`.
///
/// Returns `None` when neither file exists, so the gateway serves plain HTTP.
pub fn load_server_tls(certs_dir: &Path) -> Result<Option<TlsMaterial>, TlsError> {
    let cert_path = certs_dir.join(PUBLIC_CERT_FILE);
    let key_path = certs_dir.join(PRIVATE_KEY_FILE);

    match (cert_path.is_file(), key_path.is_file()) {
        (false, false) => {
            debug!(dir = %certs_dir.display(), "no TLS certificate, serving plain HTTP");
            Ok(None)
        }
        (true, false) => Err(TlsError::Incomplete {
            present: cert_path,
            missing: key_path,
        }),
        (false, true) => Err(TlsError::Incomplete {
            present: key_path,
            missing: cert_path,
        }),
        (true, true) => {
            let certs = load_certs(&cert_path)?;
            let key = load_private_key(&key_path)?;
            Ok(Some(TlsMaterial { certs, key, cert_path }))
        }
    }
}

/// Load every certificate under `ca_dir` into a root store. A missing directory gives an empty store.
pub fn load_root_cas(ca_dir: &Path) -> Result<RootCertStore, TlsError> {
    let mut store = RootCertStore::empty();
    if !ca_dir.is_dir() {
        return Ok(store);
    }

    let entries = fs::read_dir(ca_dir).map_err(|source| TlsError::Io {
        path: ca_dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let certs = match load_certs(&path) {
            Ok(certs) => certs,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable CA file");
                continue;
            }
        };
        let (added, ignored) = store.add_parsable_certificates(certs);
        debug!(path = %path.display(), added, ignored, "loaded CA certificates");
    }
    Ok(store)
}
