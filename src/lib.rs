//! ViewForge Core - View Rendering Engine
//!
//! # The Rendering Guarantees
//! 1. Views Are Named, Not Pathed
//! 2. Layouts Come From the Path Alone
//! 3. Compilation Errors Render, They Never Crash
//! 4. Every Render Owns Its Pages
//! 5. Committed Output Is Never Papered Over

pub mod accessor;
pub mod cache;
pub mod compiler;
pub mod composer;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod hashing;
pub mod hierarchy;
pub mod location;
pub mod markup;
pub mod model;
pub mod output;
pub mod session;

pub use accessor::ContentAccessor;
pub use compiler::{CompiledPage, Diagnostic, FailureStage, TemplateBackend, TemplateCompiler, ViewFailure};
pub use composer::{ComposedView, ViewComposer};
pub use config::{ConfigError, EngineConfig};
pub use error::{ContentError, ExecError, RenderError};
pub use hierarchy::{HierarchyChain, HierarchyResolver};
pub use location::{DirectoryLocator, InMemoryLocator, ViewLocation, ViewLocationProvider};
pub use markup::MarkupBackend;
pub use model::{ViewBag, ViewModel};
pub use session::{RenderOutcome, RenderSession, SessionState, ViewEngine};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
