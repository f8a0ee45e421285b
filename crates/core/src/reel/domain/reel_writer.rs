use std::path::PathBuf;

use thiserror::Error;

use crate::package::domain::composition::{ManifestReel, ReferencedReelAsset};
use crate::reel::domain::audio_buffers::AudioBuffers;
use crate::reel::domain::frame_info::FrameInfo;
use crate::reel::domain::player_subtitles::{Font, PlayerSubtitles};
use crate::shared::dcp_time::DcpTimePeriod;
use crate::shared::encoded_data::EncodedData;
use crate::shared::eyes::Eyes;
use crate::shared::xml_document::XmlError;

#[derive(Error, Debug)]
pub enum ReelWriterError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no frame info recorded for frame {frame} ({eyes})")]
    MissingFrameInfo { frame: i64, eyes: Eyes },
    #[error("cannot fake-write frame {frame}: needs {needed} bytes at offset {offset}, asset holds {available}")]
    FakeDataMissing {
        frame: i64,
        offset: u64,
        needed: u64,
        available: u64,
    },
    #[error("cannot fake-write frame {frame} ({eyes}): bytes at offset {offset} are not the recorded frame")]
    FakeDataStale { frame: i64, eyes: Eyes, offset: u64 },
    #[error("nothing to repeat before frame {frame} ({eyes})")]
    NothingToRepeat { frame: i64, eyes: Eyes },
    #[error("reel writer used before start()")]
    NotStarted,
    #[error(transparent)]
    Xml(#[from] XmlError),
}

impl ReelWriterError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ReelWriterError::Io { path, source }
    }
}

/// Builds the on-disk assets of one reel.
///
/// Video arrives strictly in order: frame indices are relative to the
/// reel's start, increase by one at a time, and in 3D alternate
/// left/right. Only the writer's consumer thread commits video.
pub trait ReelWriter: Send {
    fn period(&self) -> DcpTimePeriod;

    /// Opens the reel's assets. Called once, before anything is written.
    fn start(&mut self) -> Result<(), ReelWriterError>;

    fn write(&mut self, data: &EncodedData, frame: i64, eyes: Eyes) -> Result<(), ReelWriterError>;

    /// Records a frame of `size` bytes that is already present in the picture asset.
    fn fake_write(&mut self, frame: i64, eyes: Eyes, size: u64) -> Result<(), ReelWriterError>;

    /// Writes the last committed frame for `eyes` again at `frame`.
    fn repeat_write(&mut self, frame: i64, eyes: Eyes) -> Result<(), ReelWriterError>;

    /// One video frame's worth of audio; `None` when the audio comes from elsewhere.
    fn write_audio(&mut self, audio: Option<&AudioBuffers>) -> Result<(), ReelWriterError>;

    fn write_subtitles(&mut self, subs: &PlayerSubtitles) -> Result<(), ReelWriterError>;

    fn last_written_frame(&self) -> Option<i64>;

    fn last_written_eyes(&self) -> Eyes;

    /// Audio written so far, counted in video frames.
    fn total_written_audio_frames(&self) -> i64;

    /// First reel-relative frame whose data is not already on disk from an earlier run.
    fn first_nonexistent_frame(&self) -> i64;

    /// Reads back the record of a frame written in this or an earlier run.
    fn read_frame_info(&self, frame: i64, eyes: Eyes) -> Result<FrameInfo, ReelWriterError>;

    /// Flushes and closes the reel's assets.
    fn finish(&mut self) -> Result<(), ReelWriterError>;

    /// Describes this reel for the composition, preferring `referenced` assets
    /// that cover the same period over the reel's own.
    fn create_manifest_entry(
        &mut self,
        referenced: &[ReferencedReelAsset],
        fonts: &[Font],
    ) -> Result<ManifestReel, ReelWriterError>;

    /// Fills in the hashes of the reel's own assets; `progress` gets `(done, total)` bytes.
    fn calculate_digests(
        &mut self,
        reel: &mut ManifestReel,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<(), ReelWriterError>;
}

/// Creates the writer for each reel of a film.
pub trait ReelWriterFactory {
    fn create(
        &self,
        period: DcpTimePeriod,
        index: usize,
    ) -> Result<Box<dyn ReelWriter>, ReelWriterError>;
}
