//! Task handler registration.
//!
//! A [`TaskHandler`] holds the logic executed for one task kind. Handlers
//! are collected in a [`HandlerRegistry`] that is handed to the pool at
//! construction and frozen from then on - there is no process-global
//! registry, the composition root owns it explicitly.
//!
//! # Examples
//!
//! ```rust
//! use forgepool::core::registry::{FnHandler, HandlerRegistry};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(FnHandler::new("echo", |task| async move {
//!     Ok(task.payload)
//! }));
//! assert!(registry.contains("echo"));
//! ```

use crate::error::PoolResult;
use crate::task::TaskSpec;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Logic executed for one task kind.
///
/// A handler receives the full task spec; the payload is opaque to the
/// pool and meaningful only here. Returning `Err` marks the attempt as
/// failed and drives the task's retry decision.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute one attempt of the given task.
    async fn run(&self, task: TaskSpec) -> PoolResult<serde_json::Value>;

    /// The task kind this handler executes.
    fn kind(&self) -> &str;
}

type HandlerFn = dyn Fn(TaskSpec) -> Pin<Box<dyn Future<Output = PoolResult<serde_json::Value>> + Send>>
    + Send
    + Sync;

/// Adapter wrapping an async closure as a [`TaskHandler`].
pub struct FnHandler {
    kind: String,
    func: Box<HandlerFn>,
}

impl FnHandler {
    /// Wrap an async closure as a handler for `kind`.
    pub fn new<F, Fut>(kind: impl Into<String>, func: F) -> Self
    where
        F: Fn(TaskSpec) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PoolResult<serde_json::Value>> + Send + 'static,
    {
        Self {
            kind: kind.into(),
            func: Box::new(move |task| {
                Box::pin(func(task))
                    as Pin<Box<dyn Future<Output = PoolResult<serde_json::Value>> + Send>>
            }),
        }
    }
}

#[async_trait]
impl TaskHandler for FnHandler {
    async fn run(&self, task: TaskSpec) -> PoolResult<serde_json::Value> {
        (self.func)(task).await
    }

    fn kind(&self) -> &str {
        &self.kind
    }
}

/// Maps task kinds to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own kind, replacing any previous
    /// handler for that kind.
    pub fn register<H: TaskHandler + 'static>(&mut self, handler: H) {
        self.handlers
            .insert(handler.kind().to_string(), Arc::new(handler));
    }

    /// Builder-style registration.
    pub fn with<H: TaskHandler + 'static>(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    /// Look up the handler for a task kind.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Whether a handler is registered for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, in no particular order.
    pub fn kinds(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
