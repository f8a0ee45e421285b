use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("invalid signing key: {0}")]
    Key(String),
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("failed to read signing key {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Signs manifests.
///
/// Validity is checked when a writer is built and again just before the
/// composition is signed, since a long encode can outlive a certificate.
pub trait CertificateChain: Send + Sync {
    fn valid(&self) -> bool;

    /// Distinguished name of the leaf certificate.
    fn subject(&self) -> &str;

    /// Base64 DER of the leaf certificate, as embedded in `<dsig:X509Certificate>`.
    fn certificate(&self) -> Result<String, SignerError>;

    /// Signs `message`, returning the raw signature bytes.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;
}
