//! Task module seam for workflow implementations.
//!
//! Site/workflow modules stay out of the core; they plug in through the
//! [`TaskModule`] interface and are selected from an explicit
//! [`TaskRegistry`] value passed to the orchestrator at construction time.
//! Registration order is deterministic and there is no process-wide mutable
//! state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::session::{Session, SessionError};

/// Errors surfaced by task modules and the registry.
#[derive(Debug, Error)]
pub enum TaskModuleError {
    #[error("invalid parameters for task '{task}': {message}")]
    InvalidParams { task: String, message: String },
    #[error("no task module registered under '{0}'")]
    UnknownTask(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("task failed: {0}")]
    Failed(String),
}

/// A named unit of automation work executed against one session.
#[async_trait]
pub trait TaskModule: Send + Sync {
    fn name(&self) -> &str;

    /// Reject malformed parameters before any page work happens.
    fn validate_params(&self, params: &Value) -> Result<(), TaskModuleError>;

    /// Canonicalize parameters (defaults, trimming); identity by default.
    fn normalize_params(&self, params: Value) -> Value {
        params
    }

    async fn execute(&self, session: &Session, params: Value) -> Result<Value, TaskModuleError>;
}

/// Explicit, insertion-ordered registry of task modules.
#[derive(Default)]
pub struct TaskRegistry {
    modules: Vec<Arc<dyn TaskModule>>,
    index: HashMap<String, usize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module; returns `false` (and keeps the existing module)
    /// when the name is already taken.
    pub fn register(&mut self, module: Arc<dyn TaskModule>) -> bool {
        let name = module.name().to_string();
        if self.index.contains_key(&name) {
            return false;
        }
        self.index.insert(name, self.modules.len());
        self.modules.push(module);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TaskModule>> {
        self.index.get(name).map(|&i| &self.modules[i])
    }

    /// Module names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Validate, normalize, then execute the named module.
    pub async fn run(
        &self,
        name: &str,
        session: &Session,
        params: Value,
    ) -> Result<Value, TaskModuleError> {
        let module = self
            .get(name)
            .ok_or_else(|| TaskModuleError::UnknownTask(name.to_string()))?;
        module.validate_params(&params)?;
        let params = module.normalize_params(params);
        module.execute(session, params).await
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("modules", &self.names())
            .finish()
    }
}
