//! # TLS Transport Settings
//!
//! Certificate loading for the TCP acceptor's optional TLS wrapping.
//!
//! ## Responsibilities
//! - Load PEM certificate chains and PKCS#8 private keys
//! - Build a `tokio_rustls::TlsAcceptor` with safe defaults (TLS 1.2+)
//! - Generate self-signed certificates for development and testing

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::error::{GateError, Result};

/// Paths to the server's certificate chain and private key.
pub struct TlsServerSettings {
    cert_path: String,
    key_path: String,
}

impl TlsServerSettings {
    pub fn new<P: AsRef<Path>>(cert_path: P, key_path: P) -> Self {
        Self {
            cert_path: cert_path.as_ref().to_string_lossy().to_string(),
            key_path: key_path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// Generate a self-signed certificate for development/testing purposes.
    pub fn generate_self_signed<P: AsRef<Path>>(cert_path: P, key_path: P) -> io::Result<Self> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()])
            .map_err(|e| io::Error::other(format!("Certificate generation error: {e}")))?;

        let mut cert_file = File::create(&cert_path)?;
        cert_file.write_all(cert.cert.pem().as_bytes())?;

        let mut key_file = File::create(&key_path)?;
        key_file.write_all(cert.signing_key.serialize_pem().as_bytes())?;

        Ok(Self::new(cert_path, key_path))
    }

    /// Load the certificate and key and build the acceptor.
    pub fn load_acceptor(&self) -> Result<TlsAcceptor> {
        let cert_file = File::open(&self.cert_path)
            .map_err(|e| GateError::TlsError(format!("Failed to open cert file: {e}")))?;
        let mut cert_reader = BufReader::new(cert_file);
        let cert_chain: Vec<Certificate> = certs(&mut cert_reader)
            .map_err(|_| GateError::TlsError("Failed to parse certificate".into()))?
            .into_iter()
            .map(Certificate)
            .collect();

        let key_file = File::open(&self.key_path)
            .map_err(|e| GateError::TlsError(format!("Failed to open key file: {e}")))?;
        let mut key_reader = BufReader::new(key_file);
        let keys = pkcs8_private_keys(&mut key_reader)
            .map_err(|_| GateError::TlsError("Failed to parse private key".into()))?;

        if keys.is_empty() {
            return Err(GateError::TlsError("No private keys found".into()));
        }
        let private_key = PrivateKey(keys[0].clone());

        let config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(cert_chain, private_key)
            .map_err(|e| GateError::TlsError(format!("TLS error: {e}")))?;

        debug!(cert = %self.cert_path, "TLS acceptor loaded");
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}
