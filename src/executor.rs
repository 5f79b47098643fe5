//! Interaction execution through the behavior models.
//!
//! Pointer actions travel a generated path from the session's virtual cursor
//! to a randomized point inside the target's bounding box (center-only
//! clicking is itself a detectable tell); typing follows a per-character
//! schedule with verify-after-type; scrolling moves in small increments.
//! Every generated step checks the cancellation token before dispatch, so a
//! long sequence can be interrupted promptly, and steps are dispatched
//! strictly in generated order with their generated delays.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::QuiethandConfig;
use crate::extract::{run_extraction, ExtractionResult, ExtractionSpec};
use crate::locator::ResolvedElement;
use crate::logging::QuiethandLogger;
use crate::motion::{self, Point};
use crate::page::{BoundingBox, KeyEvent, MouseEvent, PageError, PageHandle};
use crate::timing::{DelayKind, TimingModel};

/// Injectable entropy source; seedable for deterministic tests, seeded from
/// the OS otherwise.
pub struct Entropy(ChaCha8Rng);

impl Entropy {
    pub fn seeded(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn from_os() -> Self {
        Self(ChaCha8Rng::from_entropy())
    }
}

impl RngCore for Entropy {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.try_fill_bytes(dest)
    }
}

impl std::fmt::Debug for Entropy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entropy").finish_non_exhaustive()
    }
}

/// Per-session mutable state threaded through every interaction; never
/// global.
#[derive(Debug)]
pub struct InteractionState {
    /// Virtual cursor position carried between pointer actions.
    pub cursor: Point,
    pub rng: Entropy,
    pub cancel: CancellationToken,
}

impl InteractionState {
    pub fn new() -> Self {
        Self {
            cursor: Point::default(),
            rng: Entropy::from_os(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            cursor: Point::default(),
            rng: Entropy::seeded(seed),
            cancel: CancellationToken::new(),
        }
    }
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::new()
    }
}

/// The interactions callers can request against a resolved element.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click,
    Type { text: String },
    Scroll { delta_x: f64, delta_y: f64 },
    Read(ExtractionSpec),
}

/// Summary of a completed side-effect action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    /// Waypoints or keystrokes dispatched.
    pub steps: usize,
    pub elapsed: Duration,
}

/// Typed outcome of one interaction.  Cancellation is an outcome, not an
/// error: no partial-success report is ever produced.
#[derive(Debug)]
pub enum ActionOutcome {
    Completed(ActionReport),
    Extracted(ExtractionResult),
    Cancelled,
}

/// Failures surfaced by interaction execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("element found but not interactable: {0}")]
    NotInteractable(String),
    #[error("typed input did not stick after retry: expected '{expected}', field holds '{actual}'")]
    InputVerificationFailed { expected: String, actual: String },
    #[error("action timed out after {0:?}")]
    ActionTimeout(Duration),
    #[error(transparent)]
    Page(#[from] PageError),
}

/// Drives actions through the motion and timing models.
pub struct InteractionExecutor {
    config: Arc<QuiethandConfig>,
    timing: TimingModel,
    logger: Arc<QuiethandLogger>,
}

impl InteractionExecutor {
    pub fn new(config: Arc<QuiethandConfig>, logger: Arc<QuiethandLogger>) -> Self {
        let timing = TimingModel::new(config.timing.clone());
        Self {
            config,
            timing,
            logger,
        }
    }

    pub async fn perform(
        &self,
        page: &dyn PageHandle,
        element: &ResolvedElement,
        action: &Action,
        state: &mut InteractionState,
    ) -> Result<ActionOutcome, ExecutionError> {
        match action {
            Action::Click => self.click(page, element, state).await,
            Action::Type { text } => self.type_text(page, element, text, state).await,
            Action::Scroll { delta_x, delta_y } => {
                self.scroll(page, *delta_x, *delta_y, state).await
            }
            Action::Read(spec) => {
                let result = run_extraction(page, element, spec, &self.logger).await?;
                Ok(ActionOutcome::Extracted(result))
            }
        }
    }

    async fn click(
        &self,
        page: &dyn PageHandle,
        element: &ResolvedElement,
        state: &mut InteractionState,
    ) -> Result<ActionOutcome, ExecutionError> {
        let snapshot = page.describe(&element.id).await?;
        if !snapshot.interactable() {
            return Err(ExecutionError::NotInteractable(format!(
                "<{}> is hidden or disabled",
                snapshot.tag
            )));
        }

        let target = target_point(&snapshot.bbox, &mut state.rng);
        let path = motion::pointer_path(state.cursor, target, &self.config.motion, &mut state.rng);

        let started = Instant::now();
        let mut steps = 0usize;
        for waypoint in &path {
            if !sleep_or_cancel(&state.cancel, waypoint.delay).await {
                return Ok(ActionOutcome::Cancelled);
            }
            page.dispatch_mouse(&MouseEvent::moved(waypoint.x, waypoint.y))
                .await?;
            steps += 1;
        }
        state.cursor = target;

        let pre = self.timing.delay(DelayKind::PreClick, &mut state.rng);
        if !sleep_or_cancel(&state.cancel, pre).await {
            return Ok(ActionOutcome::Cancelled);
        }

        page.dispatch_mouse(&MouseEvent::pressed(target.x, target.y))
            .await?;
        page.dispatch_mouse(&MouseEvent::released(target.x, target.y))
            .await?;
        steps += 2;

        // The click already happened; the post-click gap is not a
        // cancellation point with a next step to skip.
        let post = self.timing.delay(DelayKind::PostClick, &mut state.rng);
        sleep_or_cancel(&state.cancel, post).await;

        self.logger.debug(
            format!("clicked at ({:.0}, {:.0})", target.x, target.y),
            Some("interaction"),
            None,
        );
        Ok(ActionOutcome::Completed(ActionReport {
            steps,
            elapsed: started.elapsed(),
        }))
    }

    async fn type_text(
        &self,
        page: &dyn PageHandle,
        element: &ResolvedElement,
        text: &str,
        state: &mut InteractionState,
    ) -> Result<ActionOutcome, ExecutionError> {
        let snapshot = page.describe(&element.id).await?;
        if !snapshot.interactable() {
            return Err(ExecutionError::NotInteractable(format!(
                "<{}> is hidden or disabled",
                snapshot.tag
            )));
        }

        page.focus(&element.id).await?;
        let pre = self.timing.delay(DelayKind::PreType, &mut state.rng);
        if !sleep_or_cancel(&state.cancel, pre).await {
            return Ok(ActionOutcome::Cancelled);
        }

        let started = Instant::now();
        let mut steps = 0usize;
        let mut last_value = String::new();

        // One full-string retry after a verification mismatch, then fail.
        for attempt in 0..2 {
            if attempt > 0 {
                self.logger.info(
                    "typed input mismatch, clearing field and retrying once",
                    Some("interaction"),
                    None,
                );
                page.clear_input(&element.id).await?;
            } else if !page.input_value(&element.id).await?.is_empty() {
                page.clear_input(&element.id).await?;
            }

            let schedule = motion::typing_schedule(text, &self.config.typing, &mut state.rng);
            let mut expected = String::new();
            let mut dropped = false;

            for keystroke in &schedule {
                if !sleep_or_cancel(&state.cancel, keystroke.delay).await {
                    return Ok(ActionOutcome::Cancelled);
                }
                page.dispatch_key(&KeyEvent::down_char(keystroke.ch)).await?;
                page.dispatch_key(&KeyEvent::up_char(keystroke.ch)).await?;
                steps += 1;

                // Verify-after-type: catch dropped input at the character it
                // happens rather than at the end of a long string.
                expected.push(keystroke.ch);
                last_value = page.input_value(&element.id).await?;
                if last_value != expected {
                    dropped = true;
                    break;
                }
            }

            if !dropped && last_value == text {
                return Ok(ActionOutcome::Completed(ActionReport {
                    steps,
                    elapsed: started.elapsed(),
                }));
            }
        }

        Err(ExecutionError::InputVerificationFailed {
            expected: text.to_string(),
            actual: last_value,
        })
    }

    async fn scroll(
        &self,
        page: &dyn PageHandle,
        delta_x: f64,
        delta_y: f64,
        state: &mut InteractionState,
    ) -> Result<ActionOutcome, ExecutionError> {
        let step = self.config.scroll.step_px.max(1.0);
        let started = Instant::now();
        let mut remaining_x = delta_x;
        let mut remaining_y = delta_y;
        let mut steps = 0usize;

        while (remaining_x.abs() > f64::EPSILON || remaining_y.abs() > f64::EPSILON)
            && steps < self.config.scroll.max_steps as usize
        {
            if state.cancel.is_cancelled() {
                return Ok(ActionOutcome::Cancelled);
            }

            let step_x = remaining_x.clamp(-step, step);
            let step_y = remaining_y.clamp(-step, step);
            page.dispatch_mouse(&MouseEvent::wheel(
                state.cursor.x,
                state.cursor.y,
                step_x,
                step_y,
            ))
            .await?;
            remaining_x -= step_x;
            remaining_y -= step_y;
            steps += 1;

            let more_to_go =
                remaining_x.abs() > f64::EPSILON || remaining_y.abs() > f64::EPSILON;
            if more_to_go {
                let pause = self.timing.delay(DelayKind::ScrollPause, &mut state.rng);
                if !sleep_or_cancel(&state.cancel, pause).await {
                    return Ok(ActionOutcome::Cancelled);
                }
            }
        }

        Ok(ActionOutcome::Completed(ActionReport {
            steps,
            elapsed: started.elapsed(),
        }))
    }
}

/// Random interior point, biased toward the middle band of the box but
/// never pinned to the exact center.
fn target_point<R: Rng + ?Sized>(bbox: &BoundingBox, rng: &mut R) -> Point {
    let fx = rng.gen_range(0.25..0.75);
    let fy = rng.gen_range(0.25..0.75);
    Point::new(bbox.x + bbox.width * fx, bbox.y + bbox.height * fy)
}

/// Sleep for `duration`, racing the cancellation token.  Returns `false` if
/// cancelled first.
async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
