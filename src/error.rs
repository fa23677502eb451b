//! Error taxonomy
//!
//! Content errors come from the locator, execution errors from running
//! compiled pages, render errors are what callers see.

use std::io;
use thiserror::Error;

use crate::compiler::ViewFailure;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("View not found: {0}")]
    NotFound(String),

    #[error("Content for '{path}' is unavailable: {source}")]
    Unavailable {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ContentError {
    pub fn unavailable(path: impl Into<String>, source: io::Error) -> Self {
        Self::Unavailable { path: path.into(), source }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("The partial view '{0}' was not found")]
    NotFound(String),

    #[error("Partial '{}' failed to compile", .0.template)]
    Compilation(ViewFailure),

    #[error("{template} ({line}:{column}): {message}")]
    Runtime {
        template: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Render cancelled")]
    Cancelled,

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("Output error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("View not found: {0}")]
    ViewNotFound(String),

    #[error("Content source error: {0}")]
    Content(#[from] ContentError),

    #[error("Render of '{view}' failed after output was committed: {source}")]
    Committed {
        view: String,
        #[source]
        source: ExecError,
    },

    #[error("Render of '{view}' was cancelled")]
    Cancelled { view: String, partial_output: bool },

    #[error("Output error: {0}")]
    Io(#[from] io::Error),
}

impl RenderError {
    /// A missing view or partial, whether or not output was committed first.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RenderError::ViewNotFound(_)
                | RenderError::Committed {
                    source: ExecError::NotFound(_),
                    ..
                }
        )
    }

    /// True once some of the render's output reached the sink.
    pub fn is_partial_output(&self) -> bool {
        matches!(
            self,
            RenderError::Committed { .. }
                | RenderError::Cancelled {
                    partial_output: true,
                    ..
                }
        )
    }
}
