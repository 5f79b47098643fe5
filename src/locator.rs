//! Locator specifications and discovery outcomes.
//!
//! A [`LocatorSpec`] describes *which* element the caller wants without
//! committing to a single selector; discovery resolves it into a
//! [`ResolvedElement`] carrying provenance, so callers can always tell a
//! high-confidence direct match from a low-confidence heuristic guess.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::page::{ElementId, PageError, Scope};

/// Logical role a caller can request when exact selectors are unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SemanticRole {
    Button,
    TextInput,
    Link,
    Navigation,
    ResultItem,
    Image,
    #[default]
    Unspecified,
}

impl SemanticRole {
    pub fn is_specified(&self) -> bool {
        !matches!(self, SemanticRole::Unspecified)
    }
}

/// Caller-supplied description of which element to find.
///
/// At least one of the selector list, a specified role, or a text hint must
/// be present; an empty spec fails with a configuration error before the
/// page is touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LocatorSpec {
    /// Candidate selectors, exhausted in order.
    pub selectors: Vec<String>,
    pub role: SemanticRole,
    /// Substring or token hint matched against visible text and attributes.
    pub text_hint: Option<String>,
    pub scope: Scope,
    /// Overall discovery budget; falls back to the configured default.
    pub timeout_ms: Option<u64>,
}

impl LocatorSpec {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selectors: vec![selector.into()],
            ..Self::default()
        }
    }

    pub fn selectors<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn for_role(role: SemanticRole) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: SemanticRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_text_hint(mut self, hint: impl Into<String>) -> Self {
        self.text_hint = Some(hint.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Whether any discovery strategy has a basis to run.
    pub fn is_actionable(&self) -> bool {
        !self.selectors.is_empty()
            || self.role.is_specified()
            || self
                .text_hint
                .as_deref()
                .is_some_and(|hint| !hint.trim().is_empty())
    }
}

/// Discovery technique that produced a match, recorded for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Direct,
    SmartAttribute,
    ContentMatch,
    HeuristicRole,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::SmartAttribute => "smart-attribute",
            Strategy::ContentMatch => "content-match",
            Strategy::HeuristicRole => "heuristic-role",
        }
    }
}

/// Successful discovery outcome: an opaque handle plus provenance.
///
/// Valid for the caller's current operation only; the handle can go stale
/// whenever the page mutates, in which case the session transparently
/// re-runs discovery once using the carried origin spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedElement {
    pub id: ElementId,
    pub strategy: Strategy,
    /// Match certainty in [0, 1]; 1.0 for exact structural matches.
    pub confidence: f64,
    pub elapsed: Duration,
    /// Matched selector or heuristic reason, for diagnostics.
    pub provenance: Option<String>,
    /// The spec that produced this element, kept for stale re-resolution.
    pub origin: LocatorSpec,
}

/// Record of one strategy attempt within a failed cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    /// Best candidate score seen, if the strategy scores candidates.
    pub best_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Errors surfaced by element discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Invalid spec; fatal to the call and never retried.
    #[error("invalid locator spec: {0}")]
    Configuration(String),
    /// Every eligible strategy ran and none produced a qualifying candidate.
    #[error("no element matched after {} attempted strategies", attempts.len())]
    ElementNotFound { attempts: Vec<StrategyAttempt> },
    #[error(transparent)]
    Page(#[from] PageError),
}
