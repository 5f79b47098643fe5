//! Randomized-but-bounded delays between interaction steps.
//!
//! Each delay kind maps to a configured truncated normal distribution.  The
//! model is a pure function of configuration plus the injected entropy
//! source, so fixed seeds reproduce a full delay sequence in tests.

use std::time::Duration;

use rand::Rng;

use crate::config::{DelayDistribution, TimingConfig};

/// The interaction gaps the executor asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayKind {
    PreClick,
    PostClick,
    PreType,
    ScrollPause,
    ThinkingPause,
}

/// Maps delay kinds to their configured distributions.
#[derive(Debug, Clone)]
pub struct TimingModel {
    config: TimingConfig,
}

impl TimingModel {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    pub fn delay<R: Rng + ?Sized>(&self, kind: DelayKind, rng: &mut R) -> Duration {
        let dist = match kind {
            DelayKind::PreClick => &self.config.pre_click,
            DelayKind::PostClick => &self.config.post_click,
            DelayKind::PreType => &self.config.pre_type,
            DelayKind::ScrollPause => &self.config.scroll_pause,
            DelayKind::ThinkingPause => &self.config.thinking_pause,
        };
        sample_truncated_normal(dist, rng)
    }
}

/// Draw from a normal distribution and clamp into the configured bounds.
/// The result is never zero, even with a zero minimum.
fn sample_truncated_normal<R: Rng + ?Sized>(dist: &DelayDistribution, rng: &mut R) -> Duration {
    // Box-Muller transform; avoids pulling in a distributions crate for one
    // gaussian draw.
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    let raw = dist.mean_ms + z * dist.std_dev_ms;

    let min = dist.min_ms.max(1);
    let max = dist.max_ms.max(min);
    let clamped = raw.clamp(min as f64, max as f64);
    Duration::from_millis(clamped.round() as u64)
}
