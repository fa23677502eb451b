//! Render Sessions - Single Entry Point
//!
//! `ViewEngine` is long-lived and shareable across threads. Each call to
//! `render` runs one `RenderSession`:
//!
//! Resolving -> Composing -> Executing -> Completed | Failed
//!
//! Compilation and pre-commit runtime failures become a diagnostic page.
//! Anything after the first committed byte propagates.

use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info_span, warn};
use uuid::Uuid;

use crate::accessor::ContentAccessor;
use crate::cache::CompiledUnitCache;
use crate::compiler::{
    Diagnostic, ExecutionContext, PartialRenderer, TemplateBackend, TemplateCompiler, ViewFailure,
};
use crate::composer::{ComposeError, ViewComposer};
use crate::config::EngineConfig;
use crate::diagnostics::render_page;
use crate::error::{ContentError, ExecError, RenderError};
use crate::hierarchy::{HierarchyChain, HierarchyResolver};
use crate::location::ViewLocationProvider;
use crate::model::{ViewBag, ViewModel};
use crate::output::CommitWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Resolving,
    Composing,
    Executing,
    Completed,
    Failed,
}

/// What a successful call to `render` produced.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// The view rendered; `bytes` went to the sink.
    Completed { bytes: usize },
    /// The view failed before any output was committed; the sink holds a diagnostic page.
    DiagnosticPage(ViewFailure),
}

impl RenderOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RenderOutcome::Completed { .. })
    }
}

/// The rendering pipeline - holds the locator, compiler and settings
pub struct ViewEngine {
    accessor: ContentAccessor,
    compiler: TemplateCompiler,
    config: EngineConfig,
    cache: Option<CompiledUnitCache>,
}

impl ViewEngine {
    pub fn new(provider: Arc<dyn ViewLocationProvider>, config: EngineConfig) -> Self {
        Self::with_compiler(provider, TemplateCompiler::default(), config)
    }

    pub fn with_backend(
        provider: Arc<dyn ViewLocationProvider>,
        backend: Arc<dyn TemplateBackend>,
        config: EngineConfig,
    ) -> Self {
        Self::with_compiler(provider, TemplateCompiler::new(backend), config)
    }

    fn with_compiler(
        provider: Arc<dyn ViewLocationProvider>,
        compiler: TemplateCompiler,
        config: EngineConfig,
    ) -> Self {
        let accessor = ContentAccessor::new(provider, config.extensions.clone());
        let cache = config.cache_compiled.then(CompiledUnitCache::new);
        Self {
            accessor,
            compiler,
            config,
            cache,
        }
    }

    pub fn accessor(&self) -> &ContentAccessor {
        &self.accessor
    }

    pub fn compiler(&self) -> &TemplateCompiler {
        &self.compiler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&CompiledUnitCache> {
        self.cache.as_ref()
    }

    pub fn resolver(&self) -> HierarchyResolver<'_> {
        HierarchyResolver::new(&self.accessor, &self.config.layout_name)
    }

    pub fn composer(&self) -> ViewComposer<'_> {
        ViewComposer::new(&self.compiler, self.cache.as_ref())
    }

    /// Render `name` against `model` into `sink`.
    pub fn render(
        &self,
        name: &str,
        model: &ViewModel,
        sink: &mut dyn Write,
    ) -> Result<RenderOutcome, RenderError> {
        RenderSession::new(self, name, None).run(model, sink)
    }

    /// Like `render`, stopping at the next layer or partial once `cancel` is set.
    pub fn render_cancellable(
        &self,
        name: &str,
        model: &ViewModel,
        sink: &mut dyn Write,
        cancel: &AtomicBool,
    ) -> Result<RenderOutcome, RenderError> {
        RenderSession::new(self, name, Some(cancel)).run(model, sink)
    }

    pub fn render_to_string(
        &self,
        name: &str,
        model: &ViewModel,
    ) -> Result<(RenderOutcome, String), RenderError> {
        let mut sink = Vec::new();
        let outcome = self.render(name, model, &mut sink)?;
        Ok((outcome, String::from_utf8_lossy(&sink).into_owned()))
    }

    /// Compile every known view on its own and collect the failures.
    pub fn check_all(&self) -> Result<Vec<ViewFailure>, ContentError> {
        let mut failures = vec![];
        for view in self.accessor.list_all()? {
            if let Err(failure) = self.compiler.compile(&view)?.into_unit() {
                failures.push(failure);
            }
        }
        Ok(failures)
    }
}

/// One end-to-end render. Also serves partial includes made while it runs.
pub struct RenderSession<'e> {
    engine: &'e ViewEngine,
    view: String,
    render_id: Uuid,
    cancel: Option<&'e AtomicBool>,
    state: Cell<SessionState>,
}

impl<'e> RenderSession<'e> {
    pub fn new(engine: &'e ViewEngine, view: &str, cancel: Option<&'e AtomicBool>) -> Self {
        Self {
            engine,
            view: view.to_string(),
            render_id: Uuid::new_v4(),
            cancel,
            state: Cell::new(SessionState::Resolving),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn render_id(&self) -> Uuid {
        self.render_id
    }

    fn transition(&self, next: SessionState) {
        debug!(from = ?self.state.get(), to = ?next, "session state");
        self.state.set(next);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .map_or(false, |flag| flag.load(std::sync::atomic::Ordering::SeqCst))
    }

    pub fn run(&self, model: &ViewModel, sink: &mut dyn Write) -> Result<RenderOutcome, RenderError> {
        let span = info_span!("render", render_id = %self.render_id(), view = %self.view);
        let _guard = span.enter();

        self.transition(SessionState::Resolving);
        if self.is_cancelled() {
            return Err(self.fatal(RenderError::Cancelled {
                view: self.view.clone(),
                partial_output: false,
            }));
        }
        let chain = match self.engine.resolver().resolve(&self.view) {
            Ok(chain) => chain,
            Err(ContentError::NotFound(_)) => {
                self.transition(SessionState::Failed);
                debug!("view not found");
                return Err(RenderError::ViewNotFound(self.view.clone()));
            }
            Err(e) => return Err(self.fatal(e.into())),
        };

        self.transition(SessionState::Composing);
        let mut out = CommitWriter::new(sink, self.engine.config.buffer_limit);
        let composed = match self.engine.composer().compose(&chain) {
            Ok(composed) => composed,
            Err(ComposeError::Failure(failure)) => return self.fail(failure, out),
            Err(ComposeError::Content(e)) => return Err(self.fatal(e.into())),
        };

        self.transition(SessionState::Executing);
        let mut bag = ViewBag::new();
        let result = {
            let mut cx = ExecutionContext::new(
                model,
                &mut bag,
                self,
                self.cancel,
                self.engine.config.max_partial_depth,
            );
            composed.execute(&mut cx, &mut out)
        };

        match result {
            Ok(()) => {
                let bytes = out.finish()?;
                self.transition(SessionState::Completed);
                Ok(RenderOutcome::Completed { bytes })
            }
            Err(e) => self.execution_failed(e, out),
        }
    }

    fn execution_failed(
        &self,
        err: ExecError,
        out: CommitWriter<'_>,
    ) -> Result<RenderOutcome, RenderError> {
        let committed = out.is_committed();
        match err {
            ExecError::NotFound(name) if !committed => {
                self.transition(SessionState::Failed);
                Err(RenderError::ViewNotFound(name))
            }
            ExecError::Cancelled => Err(self.fatal(RenderError::Cancelled {
                view: self.view.clone(),
                partial_output: committed,
            })),
            ExecError::Content(e) => Err(self.fatal(e.into())),
            ExecError::Io(e) => Err(self.fatal(e.into())),
            ExecError::Compilation(failure) if !committed => self.fail(failure, out),
            ExecError::Runtime {
                template,
                line,
                column,
                message,
            } if !committed => {
                let failure = ViewFailure::execution(template, Diagnostic::new(line, column, message));
                self.fail(failure, out)
            }
            other => {
                error!(
                    error = %other,
                    bytes = out.bytes_written(),
                    "render failed after output was committed"
                );
                Err(self.fatal(RenderError::Committed {
                    view: self.view.clone(),
                    source: other,
                }))
            }
        }
    }

    /// Replace anything buffered with the diagnostic page.
    fn fail(&self, failure: ViewFailure, mut out: CommitWriter<'_>) -> Result<RenderOutcome, RenderError> {
        warn!(
            template = %failure.template,
            diagnostics = failure.diagnostics.len(),
            "rendering diagnostic page"
        );
        self.transition(SessionState::Failed);
        out.discard();
        out.write_str(&render_page(&failure))?;
        out.finish()?;
        Ok(RenderOutcome::DiagnosticPage(failure))
    }

    fn fatal(&self, err: RenderError) -> RenderError {
        self.transition(SessionState::Failed);
        err
    }

    fn resolve_partial(&self, name: &str) -> Result<HierarchyChain, ContentError> {
        if self.engine.config.layouts_for_partials {
            return self.engine.resolver().resolve(name);
        }
        self.engine
            .accessor
            .locate(name)?
            .map(HierarchyChain::leaf_only)
            .ok_or_else(|| ContentError::NotFound(name.to_string()))
    }
}

impl PartialRenderer for RenderSession<'_> {
    fn render_partial(
        &self,
        name: &str,
        cx: &mut ExecutionContext<'_>,
        out: &mut CommitWriter<'_>,
    ) -> Result<(), ExecError> {
        debug!(partial = name, depth = cx.depth() + 1, "rendering partial");
        cx.check_cancelled()?;

        let chain = self.resolve_partial(name).map_err(|e| match e {
            ContentError::NotFound(_) => ExecError::NotFound(name.to_string()),
            other => ExecError::Content(other),
        })?;
        let composed = self.engine.composer().compose(&chain).map_err(|e| match e {
            ComposeError::Failure(failure) => ExecError::Compilation(failure),
            ComposeError::Content(other) => ExecError::Content(other),
        })?;

        let mut nested = cx.nested();
        composed.execute(&mut nested, out)
    }
}
