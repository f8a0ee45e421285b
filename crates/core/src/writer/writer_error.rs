use std::path::PathBuf;

use thiserror::Error;

use crate::package::domain::package_writer::PackageError;
use crate::reel::domain::reel_writer::ReelWriterError;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("film is signed but the signer certificate chain is missing or not valid")]
    InvalidSigner,
    #[error("frame {frame} is outside every reel")]
    FrameOutOfRange { frame: i64 },
    #[error("frame {frame} is not on disk from an earlier run and cannot be fake-written")]
    FakeWriteNotAllowed { frame: i64 },
    #[error("frame {frame} starts a reel and cannot be a repeat")]
    RepeatNotAllowed { frame: i64 },
    #[error("reel {reel}: {source}")]
    Reel {
        reel: usize,
        #[source]
        source: ReelWriterError,
    },
    #[error("failed to move frame to disk at {path}: {source}")]
    Spill {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writer thread has stopped")]
    ThreadStopped,
    #[error("writer thread panicked")]
    ThreadPanicked,
    #[error("writer already started")]
    AlreadyStarted,
    #[error("writer was never started")]
    NotStarted,
    #[error("writer state lock poisoned")]
    Poisoned,
    #[error("frames in memory over the limit but none left to move to disk")]
    NoSpillCandidate,
    #[error(transparent)]
    Package(#[from] PackageError),
}

impl WriterError {
    pub(crate) fn reel(reel: usize) -> impl FnOnce(ReelWriterError) -> Self {
        move |source| WriterError::Reel { reel, source }
    }

    pub(crate) fn spill(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| WriterError::Spill { path, source }
    }
}
