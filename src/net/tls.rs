//! TLS configuration and certificate loading.

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("{kind} file not found: {path}")]
    Missing { kind: &'static str, path: PathBuf },

    #[error("failed to load certificate or key: {0}")]
    Load(#[from] std::io::Error),
}

/// Load the PEM certificate chain and private key named in `config`.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    for (kind, path) in [("certificate", &config.cert_path), ("private key", &config.key_path)] {
        if !Path::new(path).exists() {
            return Err(TlsError::Missing {
                kind,
                path: PathBuf::from(path),
            });
        }
    }

    Ok(RustlsConfig::from_pem_file(&config.cert_path, &config.key_path).await?)
}
