//! Session facade over one page handle.
//!
//! A [`Session`] owns exactly one page, the per-session virtual cursor, the
//! entropy source, and the cancellation token, and wires the discovery
//! engine to the interaction executor.  Discovery and execution are a
//! strictly sequential pipeline within a session; independent sessions share
//! no mutable state.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::QuiethandConfig;
use crate::discovery::{DiscoveryEngine, ResolutionCache};
use crate::executor::{
    Action, ActionOutcome, ExecutionError, InteractionExecutor, InteractionState,
};
use crate::extract::{run_extraction, ExtractionResult, ExtractionSpec};
use crate::locator::{DiscoveryError, LocatorSpec, ResolvedElement};
use crate::logging::QuiethandLogger;
use crate::page::PageHandle;

/// Errors surfaced by the session facade.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// One logical automation session against a single browser tab.
pub struct Session {
    page: Arc<dyn PageHandle>,
    config: Arc<QuiethandConfig>,
    logger: Arc<QuiethandLogger>,
    engine: DiscoveryEngine,
    executor: InteractionExecutor,
    state: Mutex<InteractionState>,
    cache: Mutex<ResolutionCache>,
    // Kept outside the state mutex so a caller can grab the token while an
    // interaction holds the state lock.
    cancel: std::sync::Mutex<CancellationToken>,
}

impl Session {
    pub fn new(page: Arc<dyn PageHandle>, config: QuiethandConfig) -> Self {
        let logger = Arc::new(QuiethandLogger::new(config.verbose));
        Self::with_logger(page, config, logger)
    }

    pub fn with_logger(
        page: Arc<dyn PageHandle>,
        config: QuiethandConfig,
        logger: Arc<QuiethandLogger>,
    ) -> Self {
        let config = Arc::new(config);
        let engine = DiscoveryEngine::new(Arc::clone(&config), Arc::clone(&logger));
        let executor = InteractionExecutor::new(Arc::clone(&config), Arc::clone(&logger));
        let cache = ResolutionCache::new(Duration::from_millis(config.cache_ttl_ms));
        Self {
            page,
            config,
            logger,
            engine,
            executor,
            state: Mutex::new(InteractionState::new()),
            cache: Mutex::new(cache),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    /// Replace the entropy source with a seeded one; used for deterministic
    /// behavior in tests.
    pub fn seed_entropy(self, seed: u64) -> Self {
        {
            let mut state = self
                .state
                .try_lock()
                .expect("fresh session state is unlocked");
            *state = InteractionState::with_seed(seed);
        }
        self
    }

    pub fn config(&self) -> &QuiethandConfig {
        &self.config
    }

    pub fn logger(&self) -> &Arc<QuiethandLogger> {
        &self.logger
    }

    /// Token a caller can use to abort an in-flight interaction between
    /// waypoints/keystrokes.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.lock().expect("cancel lock poisoned").clone()
    }

    /// Arm a fresh cancellation token after a cancelled interaction.
    pub fn reset_cancellation(&self) {
        *self.cancel.lock().expect("cancel lock poisoned") = CancellationToken::new();
    }

    /// Resolve a locator spec to one element, fresh.
    pub async fn resolve(&self, spec: &LocatorSpec) -> Result<ResolvedElement, DiscoveryError> {
        self.engine.resolve(self.page.as_ref(), spec).await
    }

    /// Caller-side retry policy made explicit: bounded attempts with a fixed
    /// pause.  Configuration errors are fatal and never retried.
    pub async fn resolve_with_retry(
        &self,
        spec: &LocatorSpec,
        attempts: Option<u32>,
    ) -> Result<ResolvedElement, DiscoveryError> {
        let max_attempts = attempts.unwrap_or(self.config.retry_attempts).max(1);
        let pause = Duration::from_millis(self.config.retry_pause_ms);

        let mut last_err = None;
        for attempt in 0..max_attempts {
            match self.resolve(spec).await {
                Ok(resolved) => {
                    if attempt > 0 {
                        self.logger.info(
                            format!("element found on attempt {}/{max_attempts}", attempt + 1),
                            Some("discovery"),
                            None,
                        );
                    }
                    return Ok(resolved);
                }
                Err(err @ DiscoveryError::Configuration(_)) => return Err(err),
                Err(err) => {
                    last_err = Some(err);
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt ran"))
    }

    /// Opt-in cached resolution keyed by (scope, spec); entries expire on
    /// TTL or navigation, and a detached cache hit falls through to a fresh
    /// resolution.
    pub async fn resolve_cached(
        &self,
        spec: &LocatorSpec,
    ) -> Result<ResolvedElement, DiscoveryError> {
        if let Some(hit) = self.cache.lock().await.get(spec) {
            match self.page.is_detached(&hit.id).await {
                Ok(false) => {
                    self.logger
                        .debug("resolution served from cache", Some("discovery"), None);
                    return Ok(hit);
                }
                _ => {
                    self.logger.debug(
                        "cached element is stale, resolving fresh",
                        Some("discovery"),
                        None,
                    );
                }
            }
        }

        let resolved = self.resolve(spec).await?;
        self.cache
            .lock()
            .await
            .insert(spec.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Invalidate the resolution cache; the page lifecycle owner calls this
    /// on every navigation.
    pub async fn note_navigation(&self) {
        self.cache.lock().await.note_navigation();
    }

    /// Perform an action against a previously resolved element, bounded by
    /// the configured action timeout.
    pub async fn perform(
        &self,
        element: &ResolvedElement,
        action: Action,
    ) -> Result<ActionOutcome, SessionError> {
        let element = self.ensure_attached(element).await?;
        let budget = Duration::from_millis(self.config.action_timeout_ms);

        let mut state = self.state.lock().await;
        state.cancel = self.cancellation();
        match tokio::time::timeout(
            budget,
            self.executor
                .perform(self.page.as_ref(), &element, &action, &mut state),
        )
        .await
        {
            Ok(outcome) => outcome.map_err(SessionError::from),
            Err(_) => Err(ExecutionError::ActionTimeout(budget).into()),
        }
    }

    /// Read-type interaction: no motion, wraps provenance from the resolved
    /// element.
    pub async fn extract(
        &self,
        element: &ResolvedElement,
        spec: &ExtractionSpec,
    ) -> Result<ExtractionResult, SessionError> {
        let element = self.ensure_attached(element).await?;
        run_extraction(self.page.as_ref(), &element, spec, &self.logger)
            .await
            .map_err(|err| SessionError::Execution(ExecutionError::Page(err)))
    }

    /// The single allowed internal retry: a detached handle triggers one
    /// transparent re-run of the full cascade; if that re-resolution fails,
    /// the failure escalates to the caller.
    async fn ensure_attached(
        &self,
        element: &ResolvedElement,
    ) -> Result<ResolvedElement, SessionError> {
        let detached = self
            .page
            .is_detached(&element.id)
            .await
            .map_err(ExecutionError::Page)?;
        if !detached {
            return Ok(element.clone());
        }

        self.logger.info(
            "element handle went stale, re-running discovery once",
            Some("discovery"),
            None,
        );
        self.engine
            .resolve(self.page.as_ref(), &element.origin)
            .await
            .map_err(SessionError::from)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
