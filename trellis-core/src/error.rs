//! Error types.
//!
//! Failures fall into three groups:
//!
//! - **Reconciliation errors** are raised while diffing a description, before
//!   any host mutation happens ([`Error::ConflictingBinding`]).
//! - **Render errors** are produced by component functions. They travel as
//!   [`RenderError`] inside [`RenderOutcome::Failed`](crate::render::RenderOutcome)
//!   and are recovered by the nearest error boundary. Only a fatal one
//!   escapes the work loop, as [`Error::Render`].
//! - **Scheduler invariant violations** ([`Error::TooManyRerenders`],
//!   [`Error::UpdateLoop`]) always abort the pass.

use std::borrow::Cow;

use thiserror::Error;

use crate::tree::NodeId;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the scheduler and reconciler.
#[derive(Debug, Error)]
pub enum Error {
    /// One element carries two values for the same attribute.
    #[error("conflicting bindings for attribute `{attr}` on <{tag}>")]
    ConflictingBinding { tag: String, attr: String },

    /// A component kept dirtying itself while rendering.
    #[error("too many re-renders: {component} (node {node}) re-rendered {limit} times in a row")]
    TooManyRerenders {
        node: NodeId,
        component: String,
        limit: usize,
    },

    /// Effects kept dirtying the tree after every pass.
    #[error("update loop: the tree was dirtied again after {limit} consecutive passes")]
    UpdateLoop { limit: usize },

    /// A component failed with an error flagged as fatal.
    #[error("fatal error while rendering {component} (node {node}): {source}")]
    Render {
        node: NodeId,
        component: String,
        #[source]
        source: RenderError,
    },

    /// A handle referred to a node that is not in the tree.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// An error returned by a component's render function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderError {
    message: Cow<'static, str>,
    fatal: bool,
}

impl RenderError {
    /// A recoverable render error.
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// Mark this error as fatal: it aborts the pass instead of being caught.
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}
