//! Build-wide message accounting

use stagehand_action::MessageLevel;
use stagehand_stage::{MessageSink, TracingSink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Sink that counts errors and warnings across all stages
///
/// Every message is logged through `tracing` and, when configured, handed
/// on to a downstream sink.
#[derive(Default)]
pub struct ReportingSink {
    errors: AtomicUsize,
    warnings: AtomicUsize,
    downstream: Option<Arc<dyn MessageSink>>,
}

impl ReportingSink {
    #[must_use]
    pub fn new(downstream: Option<Arc<dyn MessageSink>>) -> Self {
        Self {
            errors: AtomicUsize::new(0),
            warnings: AtomicUsize::new(0),
            downstream,
        }
    }

    /// FATAL and ERROR messages seen so far
    #[inline]
    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// WARN messages seen so far
    #[inline]
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ReportingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingSink")
            .field("errors", &self.errors())
            .field("warnings", &self.warnings())
            .finish_non_exhaustive()
    }
}

impl MessageSink for ReportingSink {
    fn message(&self, level: MessageLevel, message: &str, location: Option<&str>) {
        if level.is_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        } else if level == MessageLevel::Warn {
            self.warnings.fetch_add(1, Ordering::Relaxed);
        }
        TracingSink.message(level, message, location);
        if let Some(downstream) = &self.downstream {
            downstream.message(level, message, location);
        }
    }

    fn progress(&self, fraction: f64, description: &str) {
        TracingSink.progress(fraction, description);
        if let Some(downstream) = &self.downstream {
            downstream.progress(fraction, description);
        }
    }
}

/// Maps one stage's progress into its slice of the whole build
pub struct ScopedProgress {
    inner: Arc<dyn MessageSink>,
    base: f64,
    scale: f64,
}

impl ScopedProgress {
    /// Progress of stage `index` out of `total`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(inner: Arc<dyn MessageSink>, index: usize, total: usize) -> Self {
        let total = total.max(1) as f64;
        Self {
            inner,
            base: index as f64 / total,
            scale: 1.0 / total,
        }
    }
}

impl MessageSink for ScopedProgress {
    fn message(&self, level: MessageLevel, message: &str, location: Option<&str>) {
        self.inner.message(level, message, location);
    }

    fn progress(&self, fraction: f64, description: &str) {
        self.inner
            .progress(self.base + fraction.clamp(0.0, 1.0) * self.scale, description);
    }
}
