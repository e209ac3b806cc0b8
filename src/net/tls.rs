//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Certificate file not found: {0}")]
    MissingCertificate(String),

    #[error("Private key file not found: {0}")]
    MissingKey(String),

    #[error("Invalid certificate or key: {0}")]
    Invalid(#[from] std::io::Error),
}

/// Load TLS configuration from PEM certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    if !cert_path.exists() {
        return Err(TlsError::MissingCertificate(cert_path.display().to_string()));
    }
    if !key_path.exists() {
        return Err(TlsError::MissingKey(key_path.display().to_string()));
    }
    Ok(RustlsConfig::from_pem_file(cert_path, key_path).await?)
}
