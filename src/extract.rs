//! Read-type interaction results and the extraction logic behind them.
//!
//! An [`ExtractionResult`] always carries a confidence and the strategy that
//! located its source element; an empty value is a valid result, distinct
//! from failure.  Repeated-container extraction supports ordered fallback
//! selectors per field and required-field filtering.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::locator::{ResolvedElement, Strategy};
use crate::logging::QuiethandLogger;
use crate::page::{ElementId, PageError, PageHandle, Scope};

/// How to extract one named field from an item container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Candidate selectors, tried in order within the container.
    pub selectors: Vec<String>,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn text(name: impl Into<String>, selectors: Vec<String>) -> Self {
        Self {
            name: name.into(),
            selectors,
            kind: FieldKind::Text,
            required: false,
        }
    }

    pub fn attribute(
        name: impl Into<String>,
        selectors: Vec<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            selectors,
            kind: FieldKind::Attribute(attribute.into()),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Text,
    Attribute(String),
}

/// What a read-type interaction should pull out of the resolved element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtractionSpec {
    /// Visible text of the element.
    Text,
    /// Named attributes of the element.
    Attributes(Vec<String>),
    /// Structured sub-results for repeated containers beneath the element.
    Items {
        /// Container selectors, tried in order until one matches.
        container_selectors: Vec<String>,
        fields: Vec<FieldSpec>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
}

/// Extracted payload; shape mirrors the spec that requested it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtractedValue {
    Text(String),
    Attributes(HashMap<String, Option<String>>),
    Items(Vec<HashMap<String, Value>>),
}

impl ExtractedValue {
    pub fn is_empty(&self) -> bool {
        match self {
            ExtractedValue::Text(text) => text.trim().is_empty(),
            ExtractedValue::Attributes(map) => map.values().all(Option::is_none),
            ExtractedValue::Items(items) => items.is_empty(),
        }
    }
}

/// Immutable output of a read-type interaction, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub value: ExtractedValue,
    /// Always present, even when the value is empty.
    pub confidence: f64,
    /// Strategy that located the source element.
    pub strategy: Strategy,
    pub metadata: HashMap<String, Value>,
}

pub(crate) async fn run_extraction(
    page: &dyn PageHandle,
    element: &ResolvedElement,
    spec: &ExtractionSpec,
    logger: &QuiethandLogger,
) -> Result<ExtractionResult, PageError> {
    let mut metadata: HashMap<String, Value> = HashMap::new();
    metadata.insert("strategy".to_string(), json!(element.strategy));
    if let Some(provenance) = &element.provenance {
        metadata.insert("resolvedBy".to_string(), json!(provenance));
    }

    let value = match spec {
        ExtractionSpec::Text => {
            let snapshot = page.describe(&element.id).await?;
            ExtractedValue::Text(snapshot.text)
        }
        ExtractionSpec::Attributes(names) => {
            let snapshot = page.describe(&element.id).await?;
            let map = names
                .iter()
                .map(|name| {
                    (
                        name.clone(),
                        snapshot.attribute(name).map(str::to_string),
                    )
                })
                .collect();
            ExtractedValue::Attributes(map)
        }
        ExtractionSpec::Items {
            container_selectors,
            fields,
            max_items,
        } => {
            let items = extract_items(
                page,
                &element.id,
                container_selectors,
                fields,
                *max_items,
                &mut metadata,
                logger,
            )
            .await?;
            ExtractedValue::Items(items)
        }
    };

    logger.debug(
        format!("extraction produced {} value", if value.is_empty() { "an empty" } else { "a" }),
        Some("extract"),
        None,
    );

    Ok(ExtractionResult {
        value,
        confidence: element.confidence,
        strategy: element.strategy,
        metadata,
    })
}

/// Walk repeated containers, applying per-field fallback selectors; items
/// missing a required field are dropped rather than partially reported.
async fn extract_items(
    page: &dyn PageHandle,
    root: &ElementId,
    container_selectors: &[String],
    fields: &[FieldSpec],
    max_items: Option<usize>,
    metadata: &mut HashMap<String, Value>,
    logger: &QuiethandLogger,
) -> Result<Vec<HashMap<String, Value>>, PageError> {
    let scope = Scope::Within(root.clone());

    let mut containers: Vec<ElementId> = Vec::new();
    for (index, selector) in container_selectors.iter().enumerate() {
        match page.query(&scope, selector).await {
            Ok(found) if !found.is_empty() => {
                metadata.insert("containerSelector".to_string(), json!(selector));
                metadata.insert("containerSelectorIndex".to_string(), json!(index));
                containers = found;
                break;
            }
            Ok(_) => {}
            Err(err) => {
                logger.debug(
                    format!("container selector '{selector}' failed: {err}"),
                    Some("extract"),
                    None,
                );
            }
        }
    }

    let mut items = Vec::new();
    let mut field_provenance: HashMap<String, Value> = HashMap::new();

    for container in containers {
        if let Some(limit) = max_items {
            if items.len() >= limit {
                break;
            }
        }

        let container_scope = Scope::Within(container.clone());
        let mut item: HashMap<String, Value> = HashMap::new();
        let mut required_missing = false;

        for field in fields {
            let mut extracted: Option<Value> = None;
            for selector in &field.selectors {
                let found = match page.query(&container_scope, selector).await {
                    Ok(found) => found,
                    Err(_) => continue,
                };
                let Some(target) = found.first() else {
                    continue;
                };
                let snapshot = match page.describe(target).await {
                    Ok(snapshot) => snapshot,
                    Err(_) => continue,
                };
                extracted = Some(match &field.kind {
                    FieldKind::Text => json!(snapshot.text.trim()),
                    FieldKind::Attribute(name) => match snapshot.attribute(name) {
                        Some(value) => json!(value),
                        None => continue,
                    },
                });
                field_provenance.insert(field.name.clone(), json!(selector));
                break;
            }

            match extracted {
                Some(value) => {
                    item.insert(field.name.clone(), value);
                }
                None if field.required => {
                    required_missing = true;
                    break;
                }
                None => {}
            }
        }

        if required_missing {
            logger.debug(
                "item skipped: required field missing",
                Some("extract"),
                None,
            );
            continue;
        }
        if !item.is_empty() {
            items.push(item);
        }
    }

    metadata.insert("itemCount".to_string(), json!(items.len()));
    if !field_provenance.is_empty() {
        metadata.insert("fieldSelectors".to_string(), json!(field_provenance));
    }
    Ok(items)
}
