use std::collections::HashMap;
use std::time::Instant;

/// Observer for the progress of a package being written.
///
/// The writer reports through this rather than to a terminal or GUI
/// directly, so each front end decides how progress is shown.
pub trait JobReporter: Send {
    /// Start a named sub-job (encoding, digests). Progress resets.
    fn sub(&mut self, name: &str);

    /// Units done out of `total` in the current sub-job.
    fn progress(&mut self, current: u64, total: u64);

    /// Record how long a named step took, in milliseconds.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. frames held in memory).
    fn metric(&mut self, name: &str, value: f64);

    /// A notable event, such as units dropped at finish.
    fn info(&mut self, message: &str);

    /// Emit an end-of-job summary. Default: no-op.
    fn summary(&self) {}
}

/// Reporter that discards all events.
pub struct NullJobReporter;

impl JobReporter for NullJobReporter {
    fn sub(&mut self, _name: &str) {}
    fn progress(&mut self, _current: u64, _total: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Reporter for the CLI: logs progress through `log`, collects timings and
/// metrics, and prints a summary at the end.
///
/// Progress is logged at most once per `throttle_percent` of the sub-job.
pub struct LogJobReporter {
    throttle_percent: f64,
    sub_job: String,
    last_logged_percent: f64,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
}

impl LogJobReporter {
    pub fn new(throttle_percent: f64) -> Self {
        Self {
            throttle_percent: throttle_percent.max(0.1),
            sub_job: String::new(),
            last_logged_percent: f64::NEG_INFINITY,
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!("Job summary ({elapsed:.1}s total):")];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({} calls)",
                durations.len()
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            lines.push(format!("  {name}: avg {avg:.1} max {max:.0}"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for LogJobReporter {
    fn default() -> Self {
        Self::new(5.0)
    }
}

impl JobReporter for LogJobReporter {
    fn sub(&mut self, name: &str) {
        self.sub_job = name.to_string();
        self.last_logged_percent = f64::NEG_INFINITY;
        log::info!("{name}");
    }

    fn progress(&mut self, current: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = current as f64 / total as f64 * 100.0;
        if current == total || percent - self.last_logged_percent >= self.throttle_percent {
            self.last_logged_percent = percent;
            log::info!("{}: {current}/{total} ({percent:.1}%)", self.sub_job);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
