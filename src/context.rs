//! Trace context propagation
//!
//! A [`TraceContext`] correlates all records emitted within one logical
//! operation (a request, a task, a workflow step). The binding is scoped:
//! [`bind`] pushes a context for the dynamic extent of the returned guard
//! and the previous binding is restored when the guard drops, including on
//! early error returns. Bindings are per-thread, so concurrent operations
//! on different threads never see each other's context.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifiers correlating records produced by one logical operation
///
/// `trace_id` stays stable across every record emitted within the
/// operation; `span_id` changes for sub-operations (see [`TraceContext::child`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TraceContext {
    /// Create a context with freshly generated trace and span ids
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
            user_id: None,
            session_id: None,
            request_id: None,
            service_name: None,
            operation: None,
            component: None,
            version: None,
            environment: None,
            extra: BTreeMap::new(),
        }
    }

    /// Create a sub-operation context: same trace id, fresh span id,
    /// inherited identifiers
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<TraceContext>> = const { RefCell::new(Vec::new()) };
}

/// Guard returned by [`bind`]; pops the binding when dropped
///
/// Dropping out of order is prevented by construction: guards are neither
/// `Clone` nor constructible outside this module, and lexical scoping drops
/// nested guards first.
#[must_use = "the context is unbound as soon as the guard is dropped"]
pub struct ContextGuard {
    _private: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Bind a context for the dynamic extent of the returned guard
pub fn bind(context: TraceContext) -> ContextGuard {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(context));
    ContextGuard { _private: () }
}

/// The currently bound context on this thread, if any
pub fn current() -> Option<TraceContext> {
    CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
}
