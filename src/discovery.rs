//! Element discovery: the strategy cascade.
//!
//! Strategies run strictly in priority order — direct selector, smart
//! attribute, content match, heuristic role — each inside its own slice of
//! the overall timeout budget.  The first strategy to produce a candidate at
//! or above its threshold terminates the cascade; strategies are never
//! combined or voted, which keeps resolution deterministic and auditable via
//! the recorded strategy tag.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::time::timeout;

use crate::config::QuiethandConfig;
use crate::locator::{
    DiscoveryError, LocatorSpec, ResolvedElement, Strategy, StrategyAttempt,
};
use crate::logging::QuiethandLogger;
use crate::page::{ElementId, ElementSnapshot, PageError, PageHandle};
use crate::semantic::SemanticAnalyzer;

struct Candidate {
    id: ElementId,
    confidence: f64,
    provenance: String,
}

struct StrategyOutcome {
    candidate: Option<Candidate>,
    best_score: Option<f64>,
}

/// Resolves a [`LocatorSpec`] to one physical element.
pub struct DiscoveryEngine {
    config: Arc<QuiethandConfig>,
    analyzer: SemanticAnalyzer,
    logger: Arc<QuiethandLogger>,
}

impl DiscoveryEngine {
    pub fn new(config: Arc<QuiethandConfig>, logger: Arc<QuiethandLogger>) -> Self {
        let analyzer = SemanticAnalyzer::new(config.semantic.clone());
        Self {
            config,
            analyzer,
            logger,
        }
    }

    /// Run the cascade.  Only strategies with a basis to run are attempted;
    /// an empty spec fails before the page is touched.
    pub async fn resolve(
        &self,
        page: &dyn PageHandle,
        spec: &LocatorSpec,
    ) -> Result<ResolvedElement, DiscoveryError> {
        if !spec.is_actionable() {
            return Err(DiscoveryError::Configuration(
                "locator spec needs at least one selector, a semantic role, or a text hint"
                    .to_string(),
            ));
        }

        let started = Instant::now();
        let budget =
            Duration::from_millis(spec.timeout_ms.unwrap_or(self.config.resolve_timeout_ms));

        let eligible = strategies_for(spec);
        let slice = budget / eligible.len() as u32;

        let mut attempts = Vec::new();
        for strategy in eligible {
            let outcome = timeout(slice, self.run_strategy(page, spec, strategy)).await;
            match outcome {
                Ok(Ok(StrategyOutcome {
                    candidate: Some(candidate),
                    ..
                })) => {
                    self.logger.info(
                        format!(
                            "resolved via {} (confidence {:.2})",
                            strategy.label(),
                            candidate.confidence
                        ),
                        Some("discovery"),
                        Some(json!({ "provenance": candidate.provenance })),
                    );
                    return Ok(ResolvedElement {
                        id: candidate.id,
                        strategy,
                        confidence: candidate.confidence,
                        elapsed: started.elapsed(),
                        provenance: Some(candidate.provenance),
                        origin: spec.clone(),
                    });
                }
                Ok(Ok(StrategyOutcome {
                    candidate: None,
                    best_score,
                })) => {
                    attempts.push(StrategyAttempt {
                        strategy,
                        best_score,
                        detail: None,
                    });
                }
                Ok(Err(err)) => {
                    self.logger.debug(
                        format!("{} strategy failed: {err}", strategy.label()),
                        Some("discovery"),
                        None,
                    );
                    attempts.push(StrategyAttempt {
                        strategy,
                        best_score: None,
                        detail: Some(err.to_string()),
                    });
                }
                Err(_) => {
                    attempts.push(StrategyAttempt {
                        strategy,
                        best_score: None,
                        detail: Some("timed out".to_string()),
                    });
                }
            }
        }

        self.logger.info(
            "discovery exhausted every eligible strategy",
            Some("discovery"),
            Some(json!({ "attempts": &attempts })),
        );
        Err(DiscoveryError::ElementNotFound { attempts })
    }

    async fn run_strategy(
        &self,
        page: &dyn PageHandle,
        spec: &LocatorSpec,
        strategy: Strategy,
    ) -> Result<StrategyOutcome, PageError> {
        match strategy {
            Strategy::Direct => self.try_direct(page, spec).await,
            Strategy::SmartAttribute => self.try_smart_attribute(page, spec).await,
            Strategy::ContentMatch => self.try_content_match(page, spec).await,
            Strategy::HeuristicRole => self.try_heuristic_role(page, spec).await,
        }
    }

    /// First structural match wins immediately; exact match is maximal
    /// confidence.
    async fn try_direct(
        &self,
        page: &dyn PageHandle,
        spec: &LocatorSpec,
    ) -> Result<StrategyOutcome, PageError> {
        for (index, selector) in spec.selectors.iter().enumerate() {
            let ids = match page.query(&spec.scope, selector).await {
                Ok(ids) => ids,
                Err(err) => {
                    self.logger.debug(
                        format!("selector '{selector}' failed: {err}"),
                        Some("discovery"),
                        None,
                    );
                    continue;
                }
            };
            for id in ids {
                let snapshot = match page.describe(&id).await {
                    Ok(snapshot) => snapshot,
                    Err(_) => continue,
                };
                if snapshot.interactable() {
                    return Ok(StrategyOutcome {
                        candidate: Some(Candidate {
                            id,
                            confidence: 1.0,
                            provenance: format!("selector[{index}] {selector}"),
                        }),
                        best_score: None,
                    });
                }
            }
        }
        Ok(StrategyOutcome {
            candidate: None,
            best_score: None,
        })
    }

    /// Score elements by attributes correlated with the requested role,
    /// using the configured role → attribute-pattern table.
    async fn try_smart_attribute(
        &self,
        page: &dyn PageHandle,
        spec: &LocatorSpec,
    ) -> Result<StrategyOutcome, PageError> {
        let patterns = self.config.smart_attributes_for(spec.role);
        if patterns.is_empty() {
            return Ok(StrategyOutcome {
                candidate: None,
                best_score: None,
            });
        }

        let snapshot = page.snapshot(&spec.scope).await?;
        let mut best: Option<(f64, &ElementSnapshot, Vec<String>)> = None;

        for element in &snapshot {
            if !element.interactable() {
                continue;
            }
            let mut score = 0.0;
            let mut matched = Vec::new();
            for pattern in &patterns {
                let Some(value) = element.attribute(&pattern.attribute) else {
                    continue;
                };
                let hit = match &pattern.keyword {
                    Some(keyword) => value.to_lowercase().contains(&keyword.to_lowercase()),
                    None => true,
                };
                if hit {
                    score += pattern.weight;
                    matched.push(match &pattern.keyword {
                        Some(keyword) => format!("{}~{keyword}", pattern.attribute),
                        None => pattern.attribute.clone(),
                    });
                }
            }
            let score = score.min(1.0);
            // Strict comparison keeps the first (document-order) element on
            // ties, so repeated resolution is reproducible.
            if score > 0.0 && best.as_ref().map_or(true, |(top, _, _)| score > *top) {
                best = Some((score, element, matched));
            }
        }

        let best_score = best.as_ref().map(|(score, _, _)| *score);
        let candidate = best
            .filter(|(score, _, _)| *score >= self.config.thresholds.smart_attribute_min)
            .map(|(score, element, matched)| Candidate {
                id: element.id.clone(),
                confidence: score,
                provenance: format!("attributes: {}", matched.join(", ")),
            });

        Ok(StrategyOutcome {
            candidate,
            best_score,
        })
    }

    /// Match the text hint against visible text and labeling attributes:
    /// exact, then case-insensitive substring, then fuzzy token overlap.
    async fn try_content_match(
        &self,
        page: &dyn PageHandle,
        spec: &LocatorSpec,
    ) -> Result<StrategyOutcome, PageError> {
        let Some(hint) = spec.text_hint.as_deref().map(str::trim).filter(|h| !h.is_empty())
        else {
            return Ok(StrategyOutcome {
                candidate: None,
                best_score: None,
            });
        };

        let thresholds = &self.config.thresholds;
        let snapshot = page.snapshot(&spec.scope).await?;
        let visible: Vec<&ElementSnapshot> =
            snapshot.iter().filter(|el| el.interactable()).collect();

        let tiers: [(f64, fn(&ElementSnapshot, &str) -> bool, &str); 2] = [
            (thresholds.content_exact, matches_exact, "exact"),
            (thresholds.content_substring, matches_substring, "substring"),
        ];

        let mut best_score: Option<f64> = None;
        for (confidence, predicate, tier) in tiers {
            for &element in &visible {
                if predicate(element, hint) {
                    best_score = Some(best_score.unwrap_or(0.0).max(confidence));
                    if confidence >= thresholds.content_min {
                        return Ok(StrategyOutcome {
                            candidate: Some(Candidate {
                                id: element.id.clone(),
                                confidence,
                                provenance: format!("text {tier} match for '{hint}'"),
                            }),
                            best_score,
                        });
                    }
                }
            }
        }

        // Fuzzy fallback tier: best token overlap across the scope.
        let mut fuzzy_best: Option<(f64, &ElementSnapshot)> = None;
        for &element in &visible {
            let overlap = token_overlap(hint, &element.text);
            if overlap >= thresholds.fuzzy_min_overlap
                && fuzzy_best.map_or(true, |(top, _)| overlap > top)
            {
                fuzzy_best = Some((overlap, element));
            }
        }
        if let Some((overlap, element)) = fuzzy_best {
            let confidence = thresholds.content_fuzzy;
            best_score = Some(best_score.unwrap_or(0.0).max(confidence));
            if confidence >= thresholds.content_min {
                return Ok(StrategyOutcome {
                    candidate: Some(Candidate {
                        id: element.id.clone(),
                        confidence,
                        provenance: format!(
                            "text fuzzy match for '{hint}' (overlap {overlap:.2})"
                        ),
                    }),
                    best_score,
                });
            }
        }

        Ok(StrategyOutcome {
            candidate: None,
            best_score,
        })
    }

    /// Least reliable strategy: rank everything by structural/visual
    /// plausibility for the role and accept the top candidate only above the
    /// higher heuristic bar.
    async fn try_heuristic_role(
        &self,
        page: &dyn PageHandle,
        spec: &LocatorSpec,
    ) -> Result<StrategyOutcome, PageError> {
        let snapshot = page.snapshot(&spec.scope).await?;
        let visible: Vec<ElementSnapshot> = snapshot
            .into_iter()
            .filter(ElementSnapshot::interactable)
            .collect();
        if visible.is_empty() {
            return Ok(StrategyOutcome {
                candidate: None,
                best_score: None,
            });
        }

        let ranked = self.analyzer.rank(&visible, spec.role);
        let (top_index, top_score) = ranked[0];
        let best_score = Some(top_score);

        let candidate = (top_score >= self.config.thresholds.heuristic_min).then(|| {
            let element = &visible[top_index];
            Candidate {
                id: element.id.clone(),
                confidence: top_score,
                provenance: format!("heuristic: <{}> scored {top_score:.2}", element.tag),
            }
        });

        Ok(StrategyOutcome {
            candidate,
            best_score,
        })
    }
}

/// Strategies that have a basis to run for this spec, in cascade order.
pub fn strategies_for(spec: &LocatorSpec) -> Vec<Strategy> {
    let mut strategies = Vec::with_capacity(4);
    if !spec.selectors.is_empty() {
        strategies.push(Strategy::Direct);
    }
    if spec.role.is_specified() {
        strategies.push(Strategy::SmartAttribute);
    }
    if spec
        .text_hint
        .as_deref()
        .is_some_and(|hint| !hint.trim().is_empty())
    {
        strategies.push(Strategy::ContentMatch);
    }
    if spec.role.is_specified() {
        strategies.push(Strategy::HeuristicRole);
    }
    strategies
}

fn matches_exact(element: &ElementSnapshot, hint: &str) -> bool {
    if element.text.trim() == hint {
        return true;
    }
    label_attributes(element).any(|value| value.trim() == hint)
}

fn matches_substring(element: &ElementSnapshot, hint: &str) -> bool {
    let hint = hint.to_lowercase();
    if element.text.to_lowercase().contains(&hint) {
        return true;
    }
    label_attributes(element).any(|value| value.to_lowercase().contains(&hint))
}

fn label_attributes<'a>(element: &'a ElementSnapshot) -> impl Iterator<Item = &'a str> {
    ["value", "aria-label", "placeholder", "title"]
        .into_iter()
        .filter_map(|name| element.attribute(name))
}

/// Jaccard overlap of lowercase word tokens.
fn token_overlap(hint: &str, text: &str) -> f64 {
    let hint_tokens: std::collections::HashSet<String> = hint
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let text_tokens: std::collections::HashSet<String> = text
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    if hint_tokens.is_empty() || text_tokens.is_empty() {
        return 0.0;
    }
    let shared = hint_tokens.intersection(&text_tokens).count() as f64;
    let union = hint_tokens.union(&text_tokens).count() as f64;
    shared / union
}

/// Opt-in, short-lived resolution cache keyed by the full locator spec
/// (which includes its scope), invalidated by navigation.
#[derive(Debug)]
pub struct ResolutionCache {
    ttl: Duration,
    generation: u64,
    entries: HashMap<LocatorSpec, CacheEntry>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    resolved: ResolvedElement,
    generation: u64,
    stored_at: Instant,
}

impl ResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: 0,
            entries: HashMap::new(),
        }
    }

    /// Invalidate everything; the page lifecycle owner calls this on
    /// navigation events.
    pub fn note_navigation(&mut self) {
        self.generation += 1;
        self.entries.clear();
    }

    pub fn get(&self, spec: &LocatorSpec) -> Option<ResolvedElement> {
        self.entries
            .get(spec)
            .filter(|entry| entry.generation == self.generation)
            .filter(|entry| entry.stored_at.elapsed() <= self.ttl)
            .map(|entry| entry.resolved.clone())
    }

    pub fn insert(&mut self, spec: LocatorSpec, resolved: ResolvedElement) {
        self.entries.insert(
            spec,
            CacheEntry {
                resolved,
                generation: self.generation,
                stored_at: Instant::now(),
            },
        );
    }
}
