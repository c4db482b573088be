//! Explicit logger handle.
//!
//! Components receive a [`Logger`] at construction instead of reaching for a
//! process-wide logger. A logger is a cheap, cloneable wrapper around a
//! [`tracing::Span`]; children inherit the parent's fields, so a stage-level
//! event carries the pipeline, user and component that produced it.
//!
//! ```ignore
//! let root = Logger::new("stride");
//! let router = MessageRouter::new(config, classifier, root.child("router"));
//! ```

use tracing::Span;

#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// Create a root logger for a component.
    pub fn new(component: &'static str) -> Self {
        Self {
            span: tracing::info_span!("stride", component = component),
        }
    }

    /// A logger that records nothing beyond the ambient span. Useful in tests.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Derive a child logger for a sub-component.
    pub fn child(&self, component: &'static str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "component", component = component),
        }
    }

    /// Derive a child logger scoped to one user.
    pub fn with_user(&self, user_id: &str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "user", user_id = %user_id),
        }
    }

    /// Derive a child logger scoped to a named unit of work (pipeline, stage, agent run).
    pub fn scoped(&self, scope: &'static str, name: &str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "scope", scope = scope, name = %name),
        }
    }

    /// The underlying span, for `.instrument(...)` on futures.
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}
