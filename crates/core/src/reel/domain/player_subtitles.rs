use std::path::PathBuf;

use crate::shared::dcp_time::DcpTime;

/// One line of subtitle text with its placement.
#[derive(Clone, Debug, PartialEq)]
pub struct SubtitleString {
    pub text: String,
    pub font: Option<String>,
    /// Vertical position as a fraction of the screen height from the top.
    pub v_position: f32,
    pub italic: bool,
}

impl SubtitleString {
    pub fn new(text: impl Into<String>, v_position: f32) -> Self {
        Self {
            text: text.into(),
            font: None,
            v_position,
            italic: false,
        }
    }
}

/// Subtitle text shown over `[from, to)` on the package timeline.
///
/// Events reach the writer in timeline order.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSubtitles {
    pub from: DcpTime,
    pub to: DcpTime,
    pub text: Vec<SubtitleString>,
}

impl PlayerSubtitles {
    pub fn new(from: DcpTime, to: DcpTime, text: Vec<SubtitleString>) -> Self {
        Self { from, to, text }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A font registered for subtitle rendering; copied into the package at finish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Font {
    pub id: String,
    pub file: Option<PathBuf>,
}

impl Font {
    pub fn new(id: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self {
            id: id.into(),
            file,
        }
    }
}
