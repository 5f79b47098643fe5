//! In-memory [`PageHandle`] used by the integration tests.
//!
//! Holds a flat element list with parent links for scoping, a simple
//! selector matcher (`tag`, `#id`, `.class`, `[attr]`, `[attr=value]` and
//! combinations), and records every dispatched input event so tests can
//! assert on the exact interaction trace.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use quiethand::page::{
    BoundingBox, ElementId, ElementSnapshot, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind,
    PageError, PageHandle, Scope,
};

#[derive(Debug, Clone)]
pub struct MockElement {
    pub id: String,
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub bbox: BoundingBox,
    pub visible: bool,
    pub enabled: bool,
    pub parent: Option<String>,
    pub value: String,
    pub detached: bool,
}

/// Builder entry point; default geometry is a plausible mid-page control.
pub fn el(id: &str, tag: &str) -> MockElement {
    MockElement {
        id: id.to_string(),
        tag: tag.to_string(),
        attributes: HashMap::new(),
        text: String::new(),
        bbox: BoundingBox {
            x: 50.0,
            y: 50.0,
            width: 120.0,
            height: 30.0,
        },
        visible: true,
        enabled: true,
        parent: None,
        value: String::new(),
        detached: false,
    }
}

#[allow(dead_code)]
impl MockElement {
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn parent(mut self, id: &str) -> Self {
        self.parent = Some(id.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn at(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bbox = BoundingBox {
            x,
            y,
            width,
            height,
        };
        self
    }

    fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot {
            id: ElementId::new(self.id.clone()),
            tag: self.tag.clone(),
            attributes: self.attributes.clone(),
            text: self.text.clone(),
            bbox: self.bbox,
            visible: self.visible,
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Dispatched {
    Mouse(MouseEvent),
    Key(KeyEvent),
}

#[derive(Default)]
pub struct MockPage {
    elements: Mutex<Vec<MockElement>>,
    events: Mutex<Vec<Dispatched>>,
    focused: Mutex<Option<String>>,
    query_calls: Mutex<usize>,
    snapshot_calls: Mutex<usize>,
    // 1-based indexes of text keydowns to swallow, simulating dropped input.
    dropped_keystrokes: Mutex<Vec<usize>>,
    key_downs_seen: Mutex<usize>,
}

#[allow(dead_code)]
impl MockPage {
    pub fn new(elements: Vec<MockElement>) -> Self {
        Self {
            elements: Mutex::new(elements),
            ..Self::default()
        }
    }

    pub fn add(&self, element: MockElement) {
        self.elements.lock().unwrap().push(element);
    }

    pub fn detach(&self, id: &str) {
        let mut elements = self.elements.lock().unwrap();
        if let Some(element) = elements.iter_mut().find(|e| e.id == id) {
            element.detached = true;
        }
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) {
        let mut elements = self.elements.lock().unwrap();
        if let Some(element) = elements.iter_mut().find(|e| e.id == id) {
            element.enabled = enabled;
        }
    }

    pub fn drop_keystroke(&self, nth: usize) {
        self.dropped_keystrokes.lock().unwrap().push(nth);
    }

    pub fn query_calls(&self) -> usize {
        *self.query_calls.lock().unwrap()
    }

    pub fn snapshot_calls(&self) -> usize {
        *self.snapshot_calls.lock().unwrap()
    }

    pub fn page_touched(&self) -> bool {
        self.query_calls() > 0 || self.snapshot_calls() > 0
    }

    pub fn value_of(&self, id: &str) -> Option<String> {
        self.elements
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.value.clone())
    }

    pub fn mouse_events(&self) -> Vec<MouseEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Dispatched::Mouse(mouse) => Some(*mouse),
                Dispatched::Key(_) => None,
            })
            .collect()
    }

    pub fn pressed_count(&self) -> usize {
        self.mouse_events()
            .iter()
            .filter(|event| event.kind == MouseEventKind::Pressed)
            .count()
    }

    pub fn wheel_events(&self) -> Vec<MouseEvent> {
        self.mouse_events()
            .into_iter()
            .filter(|event| matches!(event.kind, MouseEventKind::Wheel { .. }))
            .collect()
    }

    pub fn typed_key_downs(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    Dispatched::Key(KeyEvent {
                        kind: KeyEventKind::Down,
                        text: Some(_),
                        ..
                    })
                )
            })
            .count()
    }
}

fn in_scope(all: &[MockElement], element: &MockElement, scope: &Scope) -> bool {
    match scope {
        Scope::Document => true,
        Scope::Within(root) => {
            let mut current = element.parent.clone();
            while let Some(parent_id) = current {
                if parent_id == root.0 {
                    return true;
                }
                current = all
                    .iter()
                    .find(|e| e.id == parent_id)
                    .and_then(|e| e.parent.clone());
            }
            false
        }
    }
}

fn matches_selector(element: &MockElement, selector: &str) -> bool {
    let selector = selector.trim();
    if selector.is_empty() {
        return false;
    }

    let tag_end = selector.find(['#', '.', '[']).unwrap_or(selector.len());
    let tag = &selector[..tag_end];
    if !tag.is_empty() && tag != "*" && element.tag != tag {
        return false;
    }

    let mut rest = &selector[tag_end..];
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('#') {
            let end = stripped.find(['#', '.', '[']).unwrap_or(stripped.len());
            if element.attributes.get("id").map(String::as_str) != Some(&stripped[..end]) {
                return false;
            }
            rest = &stripped[end..];
        } else if let Some(stripped) = rest.strip_prefix('.') {
            let end = stripped.find(['#', '.', '[']).unwrap_or(stripped.len());
            let class = &stripped[..end];
            let classes = element
                .attributes
                .get("class")
                .map(String::as_str)
                .unwrap_or("");
            if !classes.split_whitespace().any(|c| c == class) {
                return false;
            }
            rest = &stripped[end..];
        } else if let Some(stripped) = rest.strip_prefix('[') {
            let Some(end) = stripped.find(']') else {
                return false;
            };
            let body = &stripped[..end];
            let matched = match body.split_once('=') {
                Some((attr, value)) => {
                    let value = value.trim_matches(|c| c == '"' || c == '\'');
                    element.attributes.get(attr.trim()).map(String::as_str) == Some(value)
                }
                None => element.attributes.contains_key(body.trim()),
            };
            if !matched {
                return false;
            }
            rest = &stripped[end + 1..];
        } else {
            return false;
        }
    }
    true
}

#[async_trait]
impl PageHandle for MockPage {
    async fn query(&self, scope: &Scope, selector: &str) -> Result<Vec<ElementId>, PageError> {
        *self.query_calls.lock().unwrap() += 1;
        let elements = self.elements.lock().unwrap();
        Ok(elements
            .iter()
            .filter(|e| !e.detached)
            .filter(|e| in_scope(elements.as_slice(), e, scope))
            .filter(|e| matches_selector(e, selector))
            .map(|e| ElementId::new(e.id.clone()))
            .collect())
    }

    async fn snapshot(&self, scope: &Scope) -> Result<Vec<ElementSnapshot>, PageError> {
        *self.snapshot_calls.lock().unwrap() += 1;
        let elements = self.elements.lock().unwrap();
        Ok(elements
            .iter()
            .filter(|e| !e.detached)
            .filter(|e| in_scope(elements.as_slice(), e, scope))
            .map(MockElement::snapshot)
            .collect())
    }

    async fn describe(&self, id: &ElementId) -> Result<ElementSnapshot, PageError> {
        let elements = self.elements.lock().unwrap();
        elements
            .iter()
            .find(|e| e.id == id.0 && !e.detached)
            .map(MockElement::snapshot)
            .ok_or_else(|| PageError::Detached(id.clone()))
    }

    async fn is_detached(&self, id: &ElementId) -> Result<bool, PageError> {
        let elements = self.elements.lock().unwrap();
        Ok(!elements.iter().any(|e| e.id == id.0 && !e.detached))
    }

    async fn focus(&self, id: &ElementId) -> Result<(), PageError> {
        let elements = self.elements.lock().unwrap();
        if !elements.iter().any(|e| e.id == id.0 && !e.detached) {
            return Err(PageError::Detached(id.clone()));
        }
        *self.focused.lock().unwrap() = Some(id.0.clone());
        Ok(())
    }

    async fn input_value(&self, id: &ElementId) -> Result<String, PageError> {
        let elements = self.elements.lock().unwrap();
        elements
            .iter()
            .find(|e| e.id == id.0 && !e.detached)
            .map(|e| e.value.clone())
            .ok_or_else(|| PageError::Detached(id.clone()))
    }

    async fn clear_input(&self, id: &ElementId) -> Result<(), PageError> {
        let mut elements = self.elements.lock().unwrap();
        let element = elements
            .iter_mut()
            .find(|e| e.id == id.0 && !e.detached)
            .ok_or_else(|| PageError::Detached(id.clone()))?;
        element.value.clear();
        Ok(())
    }

    async fn dispatch_mouse(&self, event: &MouseEvent) -> Result<(), PageError> {
        self.events.lock().unwrap().push(Dispatched::Mouse(*event));
        Ok(())
    }

    async fn dispatch_key(&self, event: &KeyEvent) -> Result<(), PageError> {
        self.events
            .lock()
            .unwrap()
            .push(Dispatched::Key(event.clone()));

        if event.kind == KeyEventKind::Down {
            if let Some(text) = &event.text {
                let mut seen = self.key_downs_seen.lock().unwrap();
                *seen += 1;
                let dropped = self.dropped_keystrokes.lock().unwrap().contains(&*seen);
                if !dropped {
                    if let Some(focused) = self.focused.lock().unwrap().clone() {
                        let mut elements = self.elements.lock().unwrap();
                        if let Some(element) =
                            elements.iter_mut().find(|e| e.id == focused && !e.detached)
                        {
                            element.value.push_str(text);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
