use crate::shared::dcp_time::{DcpTime, DcpTimePeriod};

/// How the program is cut into reels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReelType {
    /// One reel covering the whole program.
    Single,
    /// A reel boundary at the start of each piece of video content.
    ByVideoContent,
    /// Reels of roughly `bytes` each, given the picture bandwidth.
    ByLength { bytes: u64 },
}

/// The kind of a piece of content placed on the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentCategory {
    Video,
    Audio,
    Subtitle,
}

/// A piece of content and where it sits on the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentSpan {
    pub category: ContentCategory,
    pub position: DcpTime,
    pub end: DcpTime,
}

impl ContentSpan {
    pub fn new(category: ContentCategory, position: DcpTime, end: DcpTime) -> Self {
        Self {
            category,
            position,
            end,
        }
    }
}

/// Splits `[0, length)` into contiguous, non-overlapping reels.
///
/// `j2k_bandwidth` is in bits per second and only matters for
/// [`ReelType::ByLength`]. `content` must be sorted by position. Always
/// returns at least one period.
pub fn partition(
    length: DcpTime,
    video_frame_rate: u32,
    reel_type: ReelType,
    j2k_bandwidth: u64,
    content: &[ContentSpan],
) -> Vec<DcpTimePeriod> {
    let mut periods = match reel_type {
        ReelType::Single => vec![DcpTimePeriod::new(DcpTime::default(), length)],
        ReelType::ByVideoContent => by_video_content(length, content),
        ReelType::ByLength { bytes } => by_length(length, video_frame_rate, bytes, j2k_bandwidth),
    };

    periods.retain(|p| p.from < p.to);
    if periods.is_empty() {
        periods.push(DcpTimePeriod::new(DcpTime::default(), length));
    }
    periods
}

fn by_video_content(length: DcpTime, content: &[ContentSpan]) -> Vec<DcpTimePeriod> {
    let mut periods = Vec::new();
    let mut last_split: Option<DcpTime> = None;
    let mut video_end = DcpTime::default();

    for span in content
        .iter()
        .filter(|c| c.category == ContentCategory::Video)
    {
        match last_split {
            Some(split) => periods.push(DcpTimePeriod::new(split, span.position)),
            None if span.position > DcpTime::default() => {
                periods.push(DcpTimePeriod::new(DcpTime::default(), span.position));
            }
            None => {}
        }
        last_split = Some(span.position);
        video_end = video_end.max(span.end);
    }

    if let Some(split) = last_split {
        periods.push(DcpTimePeriod::new(split, video_end));
    }

    // Non-video content hanging over the end of the last video gets its own reel.
    if video_end < length {
        periods.push(DcpTimePeriod::new(video_end, length));
    }
    periods
}

fn by_length(length: DcpTime, rate: u32, bytes: u64, j2k_bandwidth: u64) -> Vec<DcpTimePeriod> {
    let bytes_per_frame = (j2k_bandwidth / rate as u64 / 8).max(1);
    let frames_per_reel = (bytes / bytes_per_frame).max(1) as i64;
    let step = DcpTime::from_frames(frames_per_reel, rate);

    let mut periods = Vec::new();
    let mut current = DcpTime::default();
    while current < length {
        let end = length.min(current + step);
        periods.push(DcpTimePeriod::new(current, end));
        current = end;
    }
    periods
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(frames: i64) -> DcpTime {
        DcpTime::from_frames(frames, 24)
    }

    fn p(from: i64, to: i64) -> DcpTimePeriod {
        DcpTimePeriod::new(t(from), t(to))
    }

    fn assert_contiguous(periods: &[DcpTimePeriod], length: DcpTime) {
        assert_eq!(periods[0].from, DcpTime::default());
        for pair in periods.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(periods.last().unwrap().to, length);
    }

    #[test]
    fn test_single() {
        let periods = partition(t(100), 24, ReelType::Single, 0, &[]);
        assert_eq!(periods, vec![p(0, 100)]);
    }

    #[test]
    fn test_empty_program_still_has_one_reel() {
        let periods = partition(t(0), 24, ReelType::ByLength { bytes: 1 }, 1, &[]);
        assert_eq!(periods.len(), 1);
    }

    #[test]
    fn test_by_length() {
        // 24 fps at 192 kbit/s = 1000 bytes per frame; 10 000 bytes = 10 frames per reel.
        let periods = partition(t(25), 24, ReelType::ByLength { bytes: 10_000 }, 192_000, &[]);
        assert_eq!(periods, vec![p(0, 10), p(10, 20), p(20, 25)]);
        assert_contiguous(&periods, t(25));
    }

    #[test]
    fn test_by_video_content() {
        let content = [
            ContentSpan::new(ContentCategory::Video, t(0), t(30)),
            ContentSpan::new(ContentCategory::Audio, t(0), t(60)),
            ContentSpan::new(ContentCategory::Video, t(30), t(50)),
        ];
        let periods = partition(t(60), 24, ReelType::ByVideoContent, 0, &content);
        assert_eq!(periods, vec![p(0, 30), p(30, 50), p(50, 60)]);
        assert_contiguous(&periods, t(60));
    }

    #[test]
    fn test_by_video_content_late_start_fills_lead_in() {
        let content = [ContentSpan::new(ContentCategory::Video, t(12), t(40))];
        let periods = partition(t(40), 24, ReelType::ByVideoContent, 0, &content);
        assert_eq!(periods, vec![p(0, 12), p(12, 40)]);
    }

    #[test]
    fn test_by_video_content_ignores_non_video() {
        let content = [ContentSpan::new(ContentCategory::Subtitle, t(10), t(20))];
        let periods = partition(t(40), 24, ReelType::ByVideoContent, 0, &content);
        assert_eq!(periods, vec![p(0, 40)]);
    }
}
