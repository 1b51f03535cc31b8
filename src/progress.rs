//! Progress reporting and cooperative cancellation.
//!
//! Long running operations take a `&mut dyn Progress` instead of writing to a
//! process wide status logger. The reporter lives exactly as long as the
//! learn or rank call it was passed to.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Receives completion percentages in `[0, 100]`.
pub trait Progress {
    fn report(&mut self, percent: f64);
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: f64) {}
}

/// Forwards reports to the `log` facade, skipping repeated values.
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
    last: Option<u32>,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last: None,
        }
    }
}

impl Progress for LogProgress {
    fn report(&mut self, percent: f64) {
        let rounded = percent.clamp(0.0, 100.0).round() as u32;
        if self.last != Some(rounded) {
            self.last = Some(rounded);
            log::info!("{}: {}%", self.label, rounded);
        }
    }
}

impl<F> Progress for F
where
    F: FnMut(f64),
{
    fn report(&mut self, percent: f64) {
        self(percent)
    }
}

/// Maps `[0, 100]` onto `[start, end]` of an outer reporter.
pub struct ProgressRange<'a> {
    inner: &'a mut dyn Progress,
    start: f64,
    end: f64,
}

impl<'a> ProgressRange<'a> {
    pub fn new(inner: &'a mut dyn Progress, start: f64, end: f64) -> Self {
        Self { inner, start, end }
    }
}

impl Progress for ProgressRange<'_> {
    fn report(&mut self, percent: f64) {
        let fraction = percent.clamp(0.0, 100.0) / 100.0;
        self.inner.report(self.start + (self.end - self.start) * fraction);
    }
}

/// Shared flag checked between ranking steps.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_progress_receives_reports() {
        let mut seen = Vec::new();
        {
            let mut reporter = |p: f64| seen.push(p);
            let progress: &mut dyn Progress = &mut reporter;
            progress.report(0.0);
            progress.report(100.0);
        }
        assert_eq!(seen, vec![0.0, 100.0]);
    }

    #[test]
    fn range_maps_into_outer_span() {
        let mut seen = Vec::new();
        {
            let mut outer = |p: f64| seen.push(p);
            let mut inner = ProgressRange::new(&mut outer, 0.0, 80.0);
            inner.report(0.0);
            inner.report(50.0);
            inner.report(100.0);
        }
        assert_eq!(seen, vec![0.0, 40.0, 80.0]);
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
