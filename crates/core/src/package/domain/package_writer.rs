use std::path::PathBuf;

use thiserror::Error;

use crate::package::domain::certificate_chain::{CertificateChain, SignerError};
use crate::package::domain::composition::CompositionPlaylist;
use crate::shared::xml_document::XmlError;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    Signing(#[from] SignerError),
    #[error("signer certificate chain is not valid")]
    InvalidSigner,
}

impl PackageError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PackageError::Io { path, source }
    }
}

/// Serializes a finished composition and its manifests into the package directory.
pub trait PackageWriter: Send + Sync {
    /// Clears any stale package and creates an empty package directory.
    fn prepare(&self) -> Result<(), PackageError>;

    /// Writes the composition playlist plus the packing list, asset map and
    /// volume index. Returns the path of the composition playlist.
    fn write(
        &self,
        cpl: &CompositionPlaylist,
        signer: Option<&dyn CertificateChain>,
    ) -> Result<PathBuf, PackageError>;
}
