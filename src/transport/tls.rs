//! rustls setup shared by the listener and the backend client.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::TlsConfig;

/// Failures while preparing TLS.
#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("failed to install rustls crypto provider")]
    CryptoProvider,

    #[error("tls requires both certFile and keyFile")]
    Incomplete,

    #[error("failed to read certificates from {path}: {source}")]
    Certificates {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    #[error("no certificates found in {path}")]
    EmptyChain { path: PathBuf },

    #[error("failed to read private key from {path}: {source}")]
    PrivateKey {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    #[error("invalid TLS material: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Install the ring provider as the process default, once.
///
/// A provider installed earlier by someone else is accepted as is.
pub fn install_crypto_provider() -> Result<(), TlsSetupError> {
    static RUSTLS_INIT: OnceLock<Result<(), ()>> = OnceLock::new();
    let init_result = RUSTLS_INIT.get_or_init(|| {
        if rustls::crypto::CryptoProvider::get_default().is_some() {
            return Ok(());
        }
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| ())
    });
    if init_result.is_err() {
        return Err(TlsSetupError::CryptoProvider);
    }
    Ok(())
}

/// Build a listener acceptor from the PEM files named in `config`.
///
/// ALPN offers `h2` and `http/1.1`.
pub fn load_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, TlsSetupError> {
    let (Some(cert_file), Some(key_file)) = (&config.cert_file, &config.key_file) else {
        return Err(TlsSetupError::Incomplete);
    };

    install_crypto_provider()?;
    let certs = load_certificates(cert_file)?;
    let key = PrivateKeyDer::from_pem_file(key_file).map_err(|source| {
        TlsSetupError::PrivateKey {
            path: key_file.clone(),
            source,
        }
    })?;

    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    info!(cert_file = %cert_file.display(), "Loaded listener TLS certificate");
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsSetupError> {
    let to_err = |source| TlsSetupError::Certificates {
        path: path.to_path_buf(),
        source,
    };

    let certs = CertificateDer::pem_file_iter(path)
        .map_err(to_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_err)?;

    if certs.is_empty() {
        return Err(TlsSetupError::EmptyChain {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}
