use std::fmt;

/// Which half of a stereoscopic frame a unit belongs to.
///
/// Variant order is significant: tickets for the same frame sort
/// `Both`, `Left`, `Right`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Eyes {
    Both,
    Left,
    Right,
}

impl Eyes {
    /// Short tag used in file names and log lines.
    pub fn tag(self) -> &'static str {
        match self {
            Eyes::Both => "both",
            Eyes::Left => "left",
            Eyes::Right => "right",
        }
    }
}

impl fmt::Display for Eyes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
