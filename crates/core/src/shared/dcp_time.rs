use std::ops::{Add, Sub};

/// Ticks per second of the package timeline.
pub const HZ: i64 = 96_000;

/// A point on the package timeline, in ticks of [`HZ`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DcpTime(i64);

impl DcpTime {
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn from_frames(frames: i64, rate: u32) -> Self {
        Self(frames * HZ / rate as i64)
    }

    pub fn from_seconds(seconds: f64) -> Self {
        Self((seconds * HZ as f64).round() as i64)
    }

    pub fn seconds(self) -> f64 {
        self.0 as f64 / HZ as f64
    }

    /// Whole frames at `rate` that fit before this time.
    pub fn frames_floor(self, rate: u32) -> i64 {
        (self.0 * rate as i64).div_euclid(HZ)
    }

    pub fn frames_round(self, rate: u32) -> i64 {
        (self.0 as f64 * rate as f64 / HZ as f64).round() as i64
    }
}

impl Add for DcpTime {
    type Output = DcpTime;

    fn add(self, rhs: DcpTime) -> DcpTime {
        DcpTime(self.0 + rhs.0)
    }
}

impl Sub for DcpTime {
    type Output = DcpTime;

    fn sub(self, rhs: DcpTime) -> DcpTime {
        DcpTime(self.0 - rhs.0)
    }
}

/// Half-open span `[from, to)` of the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DcpTimePeriod {
    pub from: DcpTime,
    pub to: DcpTime,
}

impl DcpTimePeriod {
    pub fn new(from: DcpTime, to: DcpTime) -> Self {
        Self { from, to }
    }

    pub fn duration(&self) -> DcpTime {
        self.to - self.from
    }

    pub fn contains(&self, t: DcpTime) -> bool {
        self.from <= t && t < self.to
    }

    /// Intersection of two periods, if they share any time.
    pub fn overlap(&self, other: &DcpTimePeriod) -> Option<DcpTimePeriod> {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        if from < to {
            Some(DcpTimePeriod { from, to })
        } else {
            None
        }
    }
}
