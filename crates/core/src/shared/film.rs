use std::fmt;
use std::path::PathBuf;

use crate::shared::dcp_time::{DcpTime, DcpTimePeriod};
use crate::shared::eyes::Eyes;

/// Packaging standard the manifest is serialized for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Standard {
    Interop,
    Smpte,
}

/// CPL content kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Feature,
    Short,
    Trailer,
    Test,
    Advertisement,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::Feature => "feature",
            ContentKind::Short => "short",
            ContentKind::Trailer => "trailer",
            ContentKind::Test => "test",
            ContentKind::Advertisement => "advertisement",
        };
        f.write_str(s)
    }
}

/// Everything the writer needs to know about the program being packaged.
///
/// Immutable once a `Writer` has been built from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Film {
    pub name: String,
    /// Working directory: picture assets, frame info and spill files live here.
    pub directory: PathBuf,
    /// Name of the package directory created inside `directory`.
    pub dcp_name: String,
    pub content_kind: ContentKind,
    pub video_frame_rate: u32,
    pub length: DcpTime,
    pub three_d: bool,
    pub audio_channels: usize,
    pub audio_frame_rate: u32,
    pub standard: Standard,
    pub signed: bool,
    pub reels: Vec<DcpTimePeriod>,
}

impl Film {
    pub fn dcp_dir(&self) -> PathBuf {
        self.directory.join(&self.dcp_name)
    }

    pub fn length_in_frames(&self) -> i64 {
        self.length.frames_round(self.video_frame_rate)
    }

    /// Path of the spilled copy of a frame, or of its in-progress temp file.
    pub fn j2c_path(&self, reel: usize, frame: i64, eyes: Eyes, tmp: bool) -> PathBuf {
        let mut name = format!("{reel}_{frame}_{}.j2c", eyes.tag());
        if tmp {
            name.push_str(".tmp");
        }
        self.directory.join("j2c").join(name)
    }

    /// Stable identifier of a reel's picture asset, shared by the asset and its info file.
    pub fn video_identifier(&self, period: &DcpTimePeriod) -> String {
        let mut id = format!("{}_{}", period.from.get(), period.to.get());
        if self.three_d {
            id.push_str("_3d");
        }
        id
    }

    pub fn video_asset_path(&self, period: &DcpTimePeriod) -> PathBuf {
        self.directory
            .join("video")
            .join(format!("{}.mxf", self.video_identifier(period)))
    }

    pub fn info_file(&self, period: &DcpTimePeriod) -> PathBuf {
        self.directory
            .join("info")
            .join(self.video_identifier(period))
    }
}
