//! Progress reporting for the refresh phases that walk every commit

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Long-running refresh phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Commits,
    Diffs,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Commits => "Reading commits",
            Phase::Diffs => "Computing diffs",
        }
    }
}

pub trait ProgressHandle: Send + Sync {
    fn inc(&self, n: u64);
    fn finish(&self);
}

/// Hands out one handle per phase
pub trait ProgressReporter: Send + Sync {
    fn start(&self, phase: Phase, total: u64) -> Box<dyn ProgressHandle>;
}

/// Bars on stderr for the CLI. Invisible reporters draw nothing.
pub struct IndicatifProgress {
    visible: bool,
}

impl IndicatifProgress {
    pub fn new(visible: bool) -> Self {
        Self { visible }
    }
}

impl ProgressReporter for IndicatifProgress {
    fn start(&self, phase: Phase, total: u64) -> Box<dyn ProgressHandle> {
        if !self.visible || total == 0 {
            return Box::new(NoopHandle);
        }
        let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg:<16} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(phase.label());
        Box::new(pb)
    }
}

impl ProgressHandle for ProgressBar {
    fn inc(&self, n: u64) {
        ProgressBar::inc(self, n);
    }

    fn finish(&self) {
        self.finish_and_clear();
    }
}

/// Reporter for tests and benchmarks
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn start(&self, _phase: Phase, _total: u64) -> Box<dyn ProgressHandle> {
        Box::new(NoopHandle)
    }
}

struct NoopHandle;

impl ProgressHandle for NoopHandle {
    fn inc(&self, _n: u64) {}
    fn finish(&self) {}
}
