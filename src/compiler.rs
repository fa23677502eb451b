//! Template Compilation - Source In, Executable Unit or Diagnostics Out
//!
//! The compiler itself holds no state between calls. The language frontend
//! is a `TemplateBackend`; the engine only drives it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::accessor::read_source;
use crate::error::{ContentError, ExecError};
use crate::location::ViewLocation;
use crate::markup::MarkupBackend;
use crate::model::{ViewBag, ViewModel};
use crate::output::CommitWriter;

/// One compiler message, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self { line, column, message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Compilation,
    Execution,
}

/// A renderable failure: which template, and what went wrong where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewFailure {
    pub template: String,
    pub stage: FailureStage,
    pub diagnostics: Vec<Diagnostic>,
}

impl ViewFailure {
    pub fn compilation(template: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            template: template.into(),
            stage: FailureStage::Compilation,
            diagnostics,
        }
    }

    pub fn execution(template: impl Into<String>, diagnostic: Diagnostic) -> Self {
        Self {
            template: template.into(),
            stage: FailureStage::Execution,
            diagnostics: vec![diagnostic],
        }
    }
}

pub enum CompiledPage {
    Success {
        unit: Arc<dyn ExecutableUnit>,
        logical_path: String,
    },
    Failure(ViewFailure),
}

impl CompiledPage {
    pub fn is_success(&self) -> bool {
        matches!(self, CompiledPage::Success { .. })
    }

    pub fn into_unit(self) -> Result<Arc<dyn ExecutableUnit>, ViewFailure> {
        match self {
            CompiledPage::Success { unit, .. } => Ok(unit),
            CompiledPage::Failure(failure) => Err(failure),
        }
    }
}

impl fmt::Debug for CompiledPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledPage::Success { logical_path, .. } => f
                .debug_struct("Success")
                .field("logical_path", logical_path)
                .finish_non_exhaustive(),
            CompiledPage::Failure(failure) => f.debug_tuple("Failure").field(failure).finish(),
        }
    }
}

/// The language frontend/backend.
pub trait TemplateBackend: Send + Sync {
    fn compile(
        &self,
        source: &str,
        logical_path: &str,
    ) -> Result<Arc<dyn ExecutableUnit>, Vec<Diagnostic>>;
}

/// Immutable compiled code. Shareable; never executed directly.
pub trait ExecutableUnit: Send + Sync {
    /// Fresh per-render instance bound to `model`.
    fn activate<'a>(&'a self, model: &'a ViewModel) -> Box<dyn PageInstance + 'a>;
}

pub trait PageInstance {
    /// Run the page. `body` renders the wrapped content when this page is a layout.
    fn execute(
        &mut self,
        cx: &mut ExecutionContext<'_>,
        out: &mut CommitWriter<'_>,
        body: Option<&mut dyn BodyRenderer>,
    ) -> Result<(), ExecError>;
}

/// The content a layout wraps.
pub trait BodyRenderer {
    fn render_body(
        &mut self,
        cx: &mut ExecutionContext<'_>,
        out: &mut CommitWriter<'_>,
    ) -> Result<(), ExecError>;
}

/// Back-reference pages use for nested renders.
pub trait PartialRenderer {
    fn render_partial(
        &self,
        name: &str,
        cx: &mut ExecutionContext<'_>,
        out: &mut CommitWriter<'_>,
    ) -> Result<(), ExecError>;
}

/// Per-render state handed to executing pages.
pub struct ExecutionContext<'a> {
    model: &'a ViewModel,
    bag: &'a mut ViewBag,
    partials: &'a dyn PartialRenderer,
    cancel: Option<&'a AtomicBool>,
    depth: usize,
    max_depth: usize,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        model: &'a ViewModel,
        bag: &'a mut ViewBag,
        partials: &'a dyn PartialRenderer,
        cancel: Option<&'a AtomicBool>,
        max_depth: usize,
    ) -> Self {
        Self {
            model,
            bag,
            partials,
            cancel,
            depth: 0,
            max_depth,
        }
    }

    pub fn model(&self) -> &'a ViewModel {
        self.model
    }

    pub fn bag(&self) -> &ViewBag {
        &*self.bag
    }

    pub fn bag_mut(&mut self) -> &mut ViewBag {
        &mut *self.bag
    }

    /// Partial nesting level; zero for the top-level view.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn check_cancelled(&self) -> Result<(), ExecError> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(ExecError::Cancelled),
            _ => Ok(()),
        }
    }

    pub fn render_partial(&mut self, name: &str, out: &mut CommitWriter<'_>) -> Result<(), ExecError> {
        let partials = self.partials;
        partials.render_partial(name, self, out)
    }

    /// Context for a partial one level down, sharing model and bag.
    pub fn nested(&mut self) -> ExecutionContext<'_> {
        ExecutionContext {
            model: self.model,
            bag: &mut *self.bag,
            partials: self.partials,
            cancel: self.cancel,
            depth: self.depth + 1,
            max_depth: self.max_depth,
        }
    }
}

/// Compiles one view location at a time.
#[derive(Clone)]
pub struct TemplateCompiler {
    backend: Arc<dyn TemplateBackend>,
}

impl TemplateCompiler {
    pub fn new(backend: Arc<dyn TemplateBackend>) -> Self {
        Self { backend }
    }

    /// Read and compile `view`.
    ///
    /// An unreadable stream is the only hard error; template errors come back
    /// as `CompiledPage::Failure`.
    pub fn compile(&self, view: &ViewLocation) -> Result<CompiledPage, ContentError> {
        let source = read_source(view)?;
        Ok(self.compile_source(view, &source))
    }

    pub fn compile_source(&self, view: &ViewLocation, source: &str) -> CompiledPage {
        let logical_path = view.logical_path();
        match self.backend.compile(source, &view.full_name()) {
            Ok(unit) => CompiledPage::Success { unit, logical_path },
            Err(diagnostics) => {
                CompiledPage::Failure(ViewFailure::compilation(view.full_name(), diagnostics))
            }
        }
    }
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new(Arc::new(MarkupBackend::new()))
    }
}
