//! Heuristic role scoring over a DOM snapshot.
//!
//! The analyzer is the last rung of the discovery cascade: given candidate
//! elements and a requested role, it ranks them by structural and visual
//! plausibility.  Scoring is a weighted sum of independent signals with
//! weights supplied by configuration.  It is a pure, read-only scan — given
//! an identical snapshot and identical weights the ranking is reproducible,
//! with ties broken by document order.

use std::cmp::Ordering;

use crate::config::SemanticWeights;
use crate::locator::SemanticRole;
use crate::page::ElementSnapshot;

/// Ranks elements by plausibility for a semantic role.
#[derive(Debug, Clone)]
pub struct SemanticAnalyzer {
    weights: SemanticWeights,
}

impl SemanticAnalyzer {
    pub fn new(weights: SemanticWeights) -> Self {
        Self { weights }
    }

    /// Score every candidate for `role`, best first.
    ///
    /// Returns `(index into candidates, score in [0, 1])` pairs.  Ties keep
    /// document order.
    pub fn rank(&self, candidates: &[ElementSnapshot], role: SemanticRole) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(index, element)| (index, self.score(element, role)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
    }

    /// Weighted plausibility of one element for `role`.
    pub fn score(&self, element: &ElementSnapshot, role: SemanticRole) -> f64 {
        if !role.is_specified() {
            return 0.0;
        }
        let w = &self.weights;
        let total_weight = w.tag + w.size + w.keyword + w.position;
        if total_weight <= f64::EPSILON {
            return 0.0;
        }

        let raw = w.tag * tag_affinity(element, role)
            + w.size * self.size_plausibility(element)
            + w.keyword * keyword_affinity(element, role)
            + w.position * self.position_bias(element, role);
        (raw / total_weight).clamp(0.0, 1.0)
    }

    /// Too-small and absurdly large elements are implausible targets.
    fn size_plausibility(&self, element: &ElementSnapshot) -> f64 {
        if !element.visible {
            return 0.0;
        }
        let area = element.bbox.area();
        if area <= 0.0 {
            return 0.0;
        }
        if area < self.weights.min_area_px {
            (area / self.weights.min_area_px).sqrt()
        } else if area > self.weights.max_area_px {
            (self.weights.max_area_px / area).sqrt()
        } else {
            1.0
        }
    }

    fn position_bias(&self, element: &ElementSnapshot, role: SemanticRole) -> f64 {
        match role {
            SemanticRole::Navigation => {
                let y = element.bbox.y.max(0.0);
                if y <= self.weights.nav_band_px {
                    1.0
                } else {
                    (self.weights.nav_band_px / y).clamp(0.0, 1.0)
                }
            }
            // Other roles carry no strong positional prior.
            _ => 0.5,
        }
    }
}

fn tag_affinity(element: &ElementSnapshot, role: SemanticRole) -> f64 {
    let tag = element.tag.as_str();
    let input_type = element.attribute("type").unwrap_or("");
    match role {
        SemanticRole::Button => match tag {
            "button" => 1.0,
            "input" if matches!(input_type, "submit" | "button") => 0.9,
            "a" => 0.4,
            "div" | "span" => 0.2,
            _ => 0.0,
        },
        SemanticRole::TextInput => match tag {
            "input" if matches!(input_type, "" | "text" | "search" | "email" | "url") => 1.0,
            "textarea" => 0.9,
            "div" if element.attribute("contenteditable").is_some() => 0.5,
            _ => 0.0,
        },
        SemanticRole::Link => match tag {
            "a" if element.attribute("href").is_some() => 1.0,
            "a" => 0.6,
            "button" => 0.2,
            _ => 0.0,
        },
        SemanticRole::Navigation => match tag {
            "nav" => 1.0,
            "header" => 0.6,
            "ul" | "ol" => 0.4,
            "div" => 0.2,
            _ => 0.0,
        },
        SemanticRole::ResultItem => match tag {
            "article" => 1.0,
            "li" => 0.9,
            "tr" => 0.8,
            "section" => 0.6,
            "div" => 0.4,
            _ => 0.0,
        },
        SemanticRole::Image => match tag {
            "img" => 1.0,
            "picture" => 0.9,
            "svg" => 0.7,
            _ => 0.0,
        },
        SemanticRole::Unspecified => 0.0,
    }
}

fn role_keywords(role: SemanticRole) -> &'static [&'static str] {
    match role {
        SemanticRole::Button => &["submit", "search", "go", "send", "ok", "continue", "add", "buy"],
        SemanticRole::TextInput => &["search", "query", "email", "name", "q"],
        SemanticRole::Link => &["more", "read", "view", "details", "next"],
        SemanticRole::Navigation => &["menu", "nav", "home"],
        SemanticRole::ResultItem => &["result", "item", "listing"],
        SemanticRole::Image | SemanticRole::Unspecified => &[],
    }
}

fn class_vocabulary(role: SemanticRole) -> &'static [&'static str] {
    match role {
        SemanticRole::Button => &["btn", "button", "submit"],
        SemanticRole::TextInput => &["input", "search", "field"],
        SemanticRole::Link => &["link"],
        SemanticRole::Navigation => &["nav", "menu", "navbar"],
        SemanticRole::ResultItem => &["result", "item", "card", "row"],
        SemanticRole::Image | SemanticRole::Unspecified => &[],
    }
}

/// Keyword affinity from visible text and labeling attributes, with a weaker
/// fallback on common class-name vocabulary.
fn keyword_affinity(element: &ElementSnapshot, role: SemanticRole) -> f64 {
    let keywords = role_keywords(role);
    if !keywords.is_empty() {
        let text = element.text.to_lowercase();
        let labels = ["aria-label", "title", "placeholder", "value", "name"]
            .iter()
            .filter_map(|attr| element.attribute(attr))
            .map(str::to_lowercase)
            .collect::<Vec<_>>();

        for keyword in keywords {
            if text.contains(keyword) || labels.iter().any(|label| label.contains(keyword)) {
                return 1.0;
            }
        }
    }

    let vocab = class_vocabulary(role);
    if !vocab.is_empty() {
        if let Some(class) = element.attribute("class") {
            let class = class.to_lowercase();
            if vocab.iter().any(|word| class.contains(word)) {
                return 0.6;
            }
        }
    }

    0.0
}
