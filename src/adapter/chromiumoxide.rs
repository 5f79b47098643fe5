//! Chromiumoxide-backed [`PageHandle`] implementation.
//!
//! Element identity is a node path evaluated with `document.evaluate`, so
//! handles survive exactly as long as the underlying node does — a mutated
//! DOM makes the path resolve to nothing and the handle reports detached.
//! Input goes through the CDP `Input` domain rather than synthetic DOM
//! events, so dispatched events carry `isTrusted: true`.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchMouseEventParams,
};
use chromiumoxide::page::Page;
use serde_json::{json, Value};

use crate::page::{
    ElementId, ElementSnapshot, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind, PageError,
    PageHandle, Scope,
};

const JS_HELPERS: &str = r##"
function nodePath(el) {
  const parts = [];
  let current = el;
  while (current && current.nodeType === Node.ELEMENT_NODE) {
    let index = 0;
    let hasSameTypeSiblings = false;
    const siblings = current.parentElement ? Array.from(current.parentElement.children) : [];
    for (const sibling of siblings) {
      if (sibling.nodeName === current.nodeName) {
        index += 1;
        hasSameTypeSiblings = true;
        if (sibling === current) {
          break;
        }
      }
    }
    if (current.nodeName.toLowerCase() === 'html') {
      parts.unshift('html');
      break;
    }
    const tagName = current.nodeName.toLowerCase();
    parts.unshift(hasSameTypeSiblings ? tagName + '[' + index + ']' : tagName);
    current = current.parentElement;
  }
  return parts.length ? '/' + parts.join('/') : '';
}

function resolveByPath(path) {
  const result = document.evaluate(path, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
  return result.singleNodeValue;
}

function resolveScope(scopePath) {
  if (!scopePath) {
    return document;
  }
  return resolveByPath(scopePath);
}

function describeElement(el) {
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  const attributes = {};
  for (const attr of el.attributes) {
    attributes[attr.name] = attr.value;
  }
  const visible = rect.width > 0 && rect.height > 0
    && style.visibility !== 'hidden' && style.display !== 'none';
  return {
    id: nodePath(el),
    tag: el.tagName.toLowerCase(),
    attributes: attributes,
    text: (el.innerText || '').slice(0, 400),
    bbox: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
    visible: visible,
    enabled: !el.disabled,
  };
}

function collectSnapshots(root, out) {
  for (const el of root.querySelectorAll('*')) {
    out.push(describeElement(el));
    if (el.shadowRoot) {
      collectSnapshots(el.shadowRoot, out);
    }
  }
}
"##;

/// [`PageHandle`] over one live chromiumoxide page.
#[derive(Clone)]
pub struct ChromiumPageHandle {
    page: Page,
}

impl ChromiumPageHandle {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    fn script(body: &str, bindings: &[(&str, Value)]) -> Result<String, PageError> {
        let mut prelude = String::new();
        for (name, value) in bindings {
            prelude.push_str("const ");
            prelude.push_str(name);
            prelude.push_str(" = ");
            prelude.push_str(&serde_json::to_string(value)?);
            prelude.push_str(";\n");
        }
        Ok(format!(
            "(function() {{\n{JS_HELPERS}\n{prelude}{body}\n}})()"
        ))
    }

    async fn eval(&self, script: String) -> Result<Value, PageError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|err| PageError::Evaluation(err.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    fn scope_binding(scope: &Scope) -> Value {
        match scope {
            Scope::Document => Value::Null,
            Scope::Within(id) => Value::String(id.0.clone()),
        }
    }

    async fn execute_mouse(&self, params: Value) -> Result<(), PageError> {
        let command: DispatchMouseEventParams = serde_json::from_value(params)?;
        self.page
            .execute(command)
            .await
            .map_err(|err| PageError::Backend(err.to_string()))?;
        Ok(())
    }

    async fn execute_key(&self, params: Value) -> Result<(), PageError> {
        let command: DispatchKeyEventParams = serde_json::from_value(params)?;
        self.page
            .execute(command)
            .await
            .map_err(|err| PageError::Backend(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PageHandle for ChromiumPageHandle {
    async fn query(&self, scope: &Scope, selector: &str) -> Result<Vec<ElementId>, PageError> {
        let script = Self::script(
            r#"const root = resolveScope(scopePath);
if (!root) {
  return null;
}
const out = [];
root.querySelectorAll(selector).forEach((el) => {
  out.push(nodePath(el));
});
return out;"#,
            &[
                ("scopePath", Self::scope_binding(scope)),
                ("selector", json!(selector)),
            ],
        )?;
        match self.eval(script).await? {
            Value::Null => match scope {
                Scope::Within(id) => Err(PageError::Detached(id.clone())),
                Scope::Document => Ok(Vec::new()),
            },
            value => {
                let paths: Vec<String> = serde_json::from_value(value)?;
                Ok(paths.into_iter().map(ElementId).collect())
            }
        }
    }

    async fn snapshot(&self, scope: &Scope) -> Result<Vec<ElementSnapshot>, PageError> {
        let script = Self::script(
            r#"const root = resolveScope(scopePath);
if (!root) {
  return null;
}
const out = [];
collectSnapshots(root, out);
return out;"#,
            &[("scopePath", Self::scope_binding(scope))],
        )?;
        match self.eval(script).await? {
            Value::Null => match scope {
                Scope::Within(id) => Err(PageError::Detached(id.clone())),
                Scope::Document => Ok(Vec::new()),
            },
            value => Ok(serde_json::from_value(value)?),
        }
    }

    async fn describe(&self, id: &ElementId) -> Result<ElementSnapshot, PageError> {
        let script = Self::script(
            r#"const el = resolveByPath(path);
if (!el) {
  return null;
}
return describeElement(el);"#,
            &[("path", json!(id.0))],
        )?;
        match self.eval(script).await? {
            Value::Null => Err(PageError::Detached(id.clone())),
            value => Ok(serde_json::from_value(value)?),
        }
    }

    async fn is_detached(&self, id: &ElementId) -> Result<bool, PageError> {
        let script = Self::script(
            "return resolveByPath(path) === null;",
            &[("path", json!(id.0))],
        )?;
        Ok(self.eval(script).await?.as_bool().unwrap_or(true))
    }

    async fn focus(&self, id: &ElementId) -> Result<(), PageError> {
        let script = Self::script(
            r#"const el = resolveByPath(path);
if (!el) {
  return null;
}
el.focus();
return true;"#,
            &[("path", json!(id.0))],
        )?;
        match self.eval(script).await? {
            Value::Null => Err(PageError::Detached(id.clone())),
            _ => Ok(()),
        }
    }

    async fn input_value(&self, id: &ElementId) -> Result<String, PageError> {
        let script = Self::script(
            r#"const el = resolveByPath(path);
if (!el) {
  return null;
}
if ('value' in el) {
  return String(el.value);
}
return el.textContent || '';"#,
            &[("path", json!(id.0))],
        )?;
        match self.eval(script).await? {
            Value::Null => Err(PageError::Detached(id.clone())),
            Value::String(value) => Ok(value),
            other => Ok(other.to_string()),
        }
    }

    async fn clear_input(&self, id: &ElementId) -> Result<(), PageError> {
        let script = Self::script(
            r#"const el = resolveByPath(path);
if (!el) {
  return null;
}
if ('value' in el) {
  el.value = '';
}
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
return true;"#,
            &[("path", json!(id.0))],
        )?;
        match self.eval(script).await? {
            Value::Null => Err(PageError::Detached(id.clone())),
            _ => Ok(()),
        }
    }

    async fn dispatch_mouse(&self, event: &MouseEvent) -> Result<(), PageError> {
        let params = match event.kind {
            MouseEventKind::Moved => json!({
                "type": "mouseMoved",
                "x": event.x,
                "y": event.y,
            }),
            MouseEventKind::Pressed => json!({
                "type": "mousePressed",
                "x": event.x,
                "y": event.y,
                "button": "left",
                "buttons": 1,
                "clickCount": 1,
            }),
            MouseEventKind::Released => json!({
                "type": "mouseReleased",
                "x": event.x,
                "y": event.y,
                "button": "left",
                "buttons": 0,
                "clickCount": 1,
            }),
            MouseEventKind::Wheel { delta_x, delta_y } => json!({
                "type": "mouseWheel",
                "x": event.x,
                "y": event.y,
                "deltaX": delta_x,
                "deltaY": delta_y,
            }),
        };
        self.execute_mouse(params).await
    }

    async fn dispatch_key(&self, event: &KeyEvent) -> Result<(), PageError> {
        let params = match event.kind {
            KeyEventKind::Down => match &event.text {
                Some(text) => json!({
                    "type": "keyDown",
                    "key": event.key,
                    "text": text,
                }),
                None => json!({
                    "type": "rawKeyDown",
                    "key": event.key,
                }),
            },
            KeyEventKind::Up => json!({
                "type": "keyUp",
                "key": event.key,
            }),
        };
        self.execute_key(params).await
    }
}
