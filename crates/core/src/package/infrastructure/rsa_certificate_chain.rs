use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use crate::package::domain::certificate_chain::{CertificateChain, SignerError};

/// A single self-issued RSA signer with a validity window.
pub struct RsaCertificateChain {
    key: RsaPrivateKey,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl RsaCertificateChain {
    pub fn new(
        key: RsaPrivateKey,
        subject: impl Into<String>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            subject: subject.into(),
            not_before,
            not_after,
        }
    }

    /// Loads a PKCS#8 PEM private key, valid from now for `valid_days`.
    pub fn from_pem_file(
        path: &Path,
        subject: impl Into<String>,
        valid_days: i64,
    ) -> Result<Self, SignerError> {
        let pem = fs::read_to_string(path).map_err(|source| SignerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let key =
            RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| SignerError::Key(e.to_string()))?;
        let now = Utc::now();
        log::info!("Loaded signing key from {}", path.display());
        Ok(Self::new(key, subject, now, now + Duration::days(valid_days)))
    }
}

impl CertificateChain for RsaCertificateChain {
    fn valid(&self) -> bool {
        let now = Utc::now();
        self.not_before <= now && now < self.not_after && self.key.validate().is_ok()
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn certificate(&self) -> Result<String, SignerError> {
        let der = self
            .key
            .to_public_key()
            .to_pkcs1_der()
            .map_err(|e| SignerError::Key(e.to_string()))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let signing_key = SigningKey::<Sha256>::new(self.key.clone());
        let signature = signing_key
            .try_sign(message)
            .map_err(|e| SignerError::Sign(e.to_string()))?;
        Ok(signature.to_vec())
    }
}
