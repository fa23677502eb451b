//! View Composition
//!
//! Compiles a hierarchy chain root to leaf and nests the results so each
//! layout wraps the next. Execution is outer to inner.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::accessor::read_source;
use crate::cache::CompiledUnitCache;
use crate::compiler::{
    BodyRenderer, ExecutableUnit, ExecutionContext, PageInstance, TemplateCompiler, ViewFailure,
};
use crate::error::{ContentError, ExecError};
use crate::hashing::content_hash;
use crate::hierarchy::HierarchyChain;
use crate::location::ViewLocation;
use crate::output::CommitWriter;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Template '{}' failed to compile", .0.template)]
    Failure(ViewFailure),

    #[error(transparent)]
    Content(#[from] ContentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    Ancestor,
    Leaf,
}

pub struct ComposedLayer {
    pub template: String,
    pub role: LayerRole,
    unit: Arc<dyn ExecutableUnit>,
}

/// Every compiled member of one chain, outermost first.
pub struct ComposedView {
    layers: Vec<ComposedLayer>,
}

impl ComposedView {
    pub fn layers(&self) -> &[ComposedLayer] {
        &self.layers
    }

    pub fn templates(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.template.as_str()).collect()
    }

    /// Activate fresh instances and run them outer to inner.
    pub fn execute(
        &self,
        cx: &mut ExecutionContext<'_>,
        out: &mut CommitWriter<'_>,
    ) -> Result<(), ExecError> {
        let model = cx.model();
        let mut instances: Vec<Box<dyn PageInstance + '_>> =
            self.layers.iter().map(|l| l.unit.activate(model)).collect();
        run_layers(&mut instances, cx, out)
    }
}

fn run_layers(
    layers: &mut [Box<dyn PageInstance + '_>],
    cx: &mut ExecutionContext<'_>,
    out: &mut CommitWriter<'_>,
) -> Result<(), ExecError> {
    let Some((outer, inner)) = layers.split_first_mut() else {
        return Ok(());
    };
    cx.check_cancelled()?;

    if inner.is_empty() {
        return outer.execute(cx, out, None);
    }

    let mut body = InnerLayers {
        layers: inner,
        rendered: false,
    };
    outer.execute(cx, out, Some(&mut body))?;

    // a layout without a body marker gets the wrapped content appended
    if !body.rendered {
        body.render_body(cx, out)?;
    }
    Ok(())
}

struct InnerLayers<'s, 'i> {
    layers: &'s mut [Box<dyn PageInstance + 'i>],
    rendered: bool,
}

impl BodyRenderer for InnerLayers<'_, '_> {
    fn render_body(
        &mut self,
        cx: &mut ExecutionContext<'_>,
        out: &mut CommitWriter<'_>,
    ) -> Result<(), ExecError> {
        self.rendered = true;
        run_layers(self.layers, cx, out)
    }
}

pub struct ViewComposer<'c> {
    compiler: &'c TemplateCompiler,
    cache: Option<&'c CompiledUnitCache>,
}

impl<'c> ViewComposer<'c> {
    pub fn new(compiler: &'c TemplateCompiler, cache: Option<&'c CompiledUnitCache>) -> Self {
        Self { compiler, cache }
    }

    /// Compile every member root to leaf; the first failure wins.
    pub fn compose(&self, chain: &HierarchyChain) -> Result<ComposedView, ComposeError> {
        let leaf_index = chain.len() - 1;
        let mut layers = Vec::with_capacity(chain.len());

        for (i, view) in chain.members().enumerate() {
            let unit = self.compile_member(view)?;
            layers.push(ComposedLayer {
                template: view.full_name(),
                role: if i == leaf_index {
                    LayerRole::Leaf
                } else {
                    LayerRole::Ancestor
                },
                unit,
            });
        }

        Ok(ComposedView { layers })
    }

    fn compile_member(&self, view: &ViewLocation) -> Result<Arc<dyn ExecutableUnit>, ComposeError> {
        let source = read_source(view)?;
        let template = view.full_name();

        let Some(cache) = self.cache else {
            return self.compile_fresh(view, &source);
        };

        let hash = content_hash(&source);
        if let Some(unit) = cache.get(&template, &hash) {
            debug!(template = %template, "compiled unit cache hit");
            return Ok(unit);
        }
        let unit = self.compile_fresh(view, &source)?;
        cache.insert(&template, &hash, unit.clone());
        Ok(unit)
    }

    fn compile_fresh(
        &self,
        view: &ViewLocation,
        source: &str,
    ) -> Result<Arc<dyn ExecutableUnit>, ComposeError> {
        debug!(template = %view.full_name(), "compiling");
        self.compiler
            .compile_source(view, source)
            .into_unit()
            .map_err(ComposeError::Failure)
    }
}
