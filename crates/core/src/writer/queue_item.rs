use std::fmt;
use std::path::PathBuf;

use crate::shared::encoded_data::EncodedData;
use crate::shared::eyes::Eyes;

/// Where the bytes of a full frame currently live.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    InMemory(EncodedData),
    /// Evicted to disk to keep memory bounded; read back at commit.
    Spilled { path: PathBuf, len: u64 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueueKind {
    /// Freshly encoded data to write.
    Full(Payload),
    /// Data already present in the reel's picture asset from an earlier run.
    Fake { size: u64 },
    /// Repeat the previous frame.
    Repeat,
}

/// A unit of video waiting to be committed to its reel.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueItem {
    pub kind: QueueKind,
    pub reel: usize,
    /// Frame index relative to the start of the reel.
    pub frame: i64,
    pub eyes: Eyes,
}

/// Sort key of a queue item: `(reel, frame, eyes)`.
pub type ItemKey = (usize, i64, Eyes);

impl QueueItem {
    pub fn new(kind: QueueKind, reel: usize, frame: i64, eyes: Eyes) -> Self {
        Self {
            kind,
            reel,
            frame,
            eyes,
        }
    }

    pub fn key(&self) -> ItemKey {
        (self.reel, self.frame, self.eyes)
    }

    /// True for a full frame whose bytes are still held in memory.
    pub fn is_in_memory(&self) -> bool {
        matches!(self.kind, QueueKind::Full(Payload::InMemory(_)))
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            QueueKind::Full(_) => "FULL",
            QueueKind::Fake { .. } => "FAKE",
            QueueKind::Repeat => "REPEAT",
        }
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reel {} frame {} {}",
            self.kind_name(),
            self.reel,
            self.frame,
            self.eyes
        )?;
        if let QueueKind::Full(Payload::Spilled { path, .. }) = &self.kind {
            write!(f, " (on disk at {})", path.display())?;
        }
        Ok(())
    }
}
