//! Page capability interface consumed by the interaction core.
//!
//! The core never depends on a concrete browser driver.  Everything it needs
//! from a live page is expressed through [`PageHandle`]: query by raw
//! selector, snapshot element state, dispatch low-level input events, and
//! detect detached nodes.  `adapter::chromiumoxide` provides the production
//! implementation; tests provide in-memory ones.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier for a located DOM node.
///
/// The format is adapter-defined (the chromiumoxide adapter uses a node
/// path); the core only ever passes it back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Search root for discovery: the whole document or one sub-tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    #[default]
    Document,
    Within(ElementId),
}

/// Viewport-relative element geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Read-only state of one element at observation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub id: ElementId,
    pub tag: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub visible: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ElementSnapshot {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Visible and enabled; the precondition for every pointer/key action.
    pub fn interactable(&self) -> bool {
        self.visible && self.enabled
    }
}

/// Low-level pointer event dispatched through the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseEventKind {
    Moved,
    Pressed,
    Released,
    Wheel { delta_x: f64, delta_y: f64 },
}

impl MouseEvent {
    pub fn moved(x: f64, y: f64) -> Self {
        Self {
            kind: MouseEventKind::Moved,
            x,
            y,
        }
    }

    pub fn pressed(x: f64, y: f64) -> Self {
        Self {
            kind: MouseEventKind::Pressed,
            x,
            y,
        }
    }

    pub fn released(x: f64, y: f64) -> Self {
        Self {
            kind: MouseEventKind::Released,
            x,
            y,
        }
    }

    pub fn wheel(x: f64, y: f64, delta_x: f64, delta_y: f64) -> Self {
        Self {
            kind: MouseEventKind::Wheel { delta_x, delta_y },
            x,
            y,
        }
    }
}

/// Low-level keyboard event dispatched through the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub key: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
}

impl KeyEvent {
    pub fn down_char(ch: char) -> Self {
        Self {
            kind: KeyEventKind::Down,
            key: ch.to_string(),
            text: Some(ch.to_string()),
        }
    }

    pub fn up_char(ch: char) -> Self {
        Self {
            kind: KeyEventKind::Up,
            key: ch.to_string(),
            text: None,
        }
    }

    pub fn down_named(key: impl Into<String>) -> Self {
        Self {
            kind: KeyEventKind::Down,
            key: key.into(),
            text: None,
        }
    }

    pub fn up_named(key: impl Into<String>) -> Self {
        Self {
            kind: KeyEventKind::Up,
            key: key.into(),
            text: None,
        }
    }
}

/// Errors surfaced by a [`PageHandle`] implementation.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("element is detached from the document: {0}")]
    Detached(ElementId),
    #[error("no element matches '{0}'")]
    NotFound(String),
    #[error("driver operation failed: {0}")]
    Backend(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Narrow capability interface over one browser tab.
///
/// Implementations must report elements in document order from [`query`] and
/// [`snapshot`]; the discovery cascade relies on that for deterministic tie
/// breaking.
///
/// [`query`]: PageHandle::query
/// [`snapshot`]: PageHandle::snapshot
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Structural query by raw selector within the scope.
    async fn query(&self, scope: &Scope, selector: &str) -> Result<Vec<ElementId>, PageError>;

    /// Snapshot every element in the scope, in document order.
    async fn snapshot(&self, scope: &Scope) -> Result<Vec<ElementSnapshot>, PageError>;

    /// Fresh state of a single element.
    async fn describe(&self, id: &ElementId) -> Result<ElementSnapshot, PageError>;

    /// Whether the handle no longer corresponds to a live node.
    async fn is_detached(&self, id: &ElementId) -> Result<bool, PageError>;

    async fn focus(&self, id: &ElementId) -> Result<(), PageError>;

    /// Current value of an input-like element (verify-after-type reads this).
    async fn input_value(&self, id: &ElementId) -> Result<String, PageError>;

    async fn clear_input(&self, id: &ElementId) -> Result<(), PageError>;

    async fn dispatch_mouse(&self, event: &MouseEvent) -> Result<(), PageError>;

    async fn dispatch_key(&self, event: &KeyEvent) -> Result<(), PageError>;
}
