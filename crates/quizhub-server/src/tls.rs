use std::fmt;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::version::{TLS12, TLS13};

use crate::config::{ConfigError, TlsConfig, TlsMinVersion};

#[derive(Debug)]
pub enum TlsError {
    Read { path: String, source: std::io::Error },
    NoCertificates(String),
    NoPrivateKey(String),
    Config(ConfigError),
    Rustls(rustls::Error),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "failed to read {path}: {source}"),
            Self::NoCertificates(path) => write!(f, "no PEM certificates found in {path}"),
            Self::NoPrivateKey(path) => write!(f, "no PEM private key found in {path}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::Rustls(e) => write!(f, "invalid TLS configuration: {e}"),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<ConfigError> for TlsError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<rustls::Error> for TlsError {
    fn from(e: rustls::Error) -> Self {
        Self::Rustls(e)
    }
}

fn read_pem(path: &str) -> Result<Vec<u8>, TlsError> {
    std::fs::read(Path::new(path)).map_err(|source| TlsError::Read {
        path: path.to_string(),
        source,
    })
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = read_pem(path)?;
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_string()));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    let pem = read_pem(path)?;
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|source| TlsError::Read {
            path: path.to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_string()))
}

/// Build a rustls server config from the PEM files named in `config`.
///
/// Only TLS 1.2 and 1.3 are offered. HTTP/1.1 is the sole ALPN protocol
/// since WebSocket upgrades ride on it.
pub fn server_config(config: &TlsConfig) -> Result<rustls::ServerConfig, TlsError> {
    let versions: &[&'static rustls::SupportedProtocolVersion] = match config.min_version()? {
        TlsMinVersion::Tls12 => &[&TLS13, &TLS12],
        TlsMinVersion::Tls13 => &[&TLS13],
    };

    let certs = load_certs(&config.cert_file)?;
    let key = load_private_key(&config.key_file)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    tls.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(tls)
}

pub fn rustls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    Ok(RustlsConfig::from_config(Arc::new(server_config(config)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pems {
        dir: tempfile::TempDir,
    }

    impl Pems {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
            std::fs::write(dir.path().join("cert.pem"), certified.cert.pem()).unwrap();
            std::fs::write(dir.path().join("key.pem"), certified.key_pair.serialize_pem()).unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_string_lossy().into_owned()
        }

        fn config(&self) -> TlsConfig {
            TlsConfig {
                enabled: true,
                cert_file: self.path("cert.pem"),
                key_file: self.path("key.pem"),
                min_version: "1.2".to_string(),
            }
        }
    }

    #[test]
    fn loads_self_signed_pair() {
        let pems = Pems::new();
        let tls = server_config(&pems.config()).unwrap();
        assert_eq!(tls.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn tls13_only_builds() {
        let pems = Pems::new();
        let mut cfg = pems.config();
        cfg.min_version = "1.3".to_string();
        assert!(server_config(&cfg).is_ok());
    }

    #[test]
    fn unsupported_version_rejected() {
        let pems = Pems::new();
        let mut cfg = pems.config();
        cfg.min_version = "1.1".to_string();
        assert!(matches!(
            server_config(&cfg),
            Err(TlsError::Config(ConfigError::UnsupportedTlsVersion(_)))
        ));
    }

    #[test]
    fn missing_cert_file_reports_path() {
        let pems = Pems::new();
        let mut cfg = pems.config();
        cfg.cert_file = pems.path("absent.pem");
        let err = server_config(&cfg).unwrap_err();
        assert!(matches!(err, TlsError::Read { .. }));
        assert!(err.to_string().contains("absent.pem"));
    }

    #[test]
    fn file_without_certificates_rejected() {
        let pems = Pems::new();
        let mut cfg = pems.config();
        // A key file holds no CERTIFICATE blocks
        cfg.cert_file = pems.path("key.pem");
        assert!(matches!(server_config(&cfg), Err(TlsError::NoCertificates(_))));
    }

    #[test]
    fn file_without_key_rejected() {
        let pems = Pems::new();
        let mut cfg = pems.config();
        cfg.key_file = pems.path("cert.pem");
        assert!(matches!(server_config(&cfg), Err(TlsError::NoPrivateKey(_))));
    }
}
