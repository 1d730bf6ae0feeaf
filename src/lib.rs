//! # Live Render Engine
//!
//! Turns a batch of in-memory JS/TS/JSX files into a live component without
//! a build step.
//!
//! ## Pass
//!
//! 1. **Security gate**: raw-text blocklist over every file
//!    ([`security`]). Advisory only; bypassable by explicit request.
//! 2. **Export normalization** ([`exports`]): one parse per file, export
//!    syntax reduced to plain declarations, [`ExportInfo`] recorded.
//! 3. **Dependency resolution** ([`resolver`], [`loader`]): manual values
//!    and URLs plus auto-detected registry entries, loaded concurrently
//!    through a three-tier loader behind a domain allow-list.
//! 4. **Import rewriting** ([`imports`]): framework destructures, registry
//!    lookups for sibling files, property reads on dependency bindings.
//! 5. **Front end** ([`frontend`]): TypeScript stripped, JSX lowered to
//!    `React.createElement`.
//! 6. **Registry** ([`registry`]): lazy, memoized factories; one exports
//!    object per module per pass.
//! 7. **Entry resolution** ([`entry`]): callable default, else the first
//!    export that looks like a component.
//!
//! ## Runtime boundary
//!
//! The engine does not evaluate JavaScript. Evaluation, module imports and
//! script injection are capabilities of a [`ScriptHost`]. [`InertHost`]
//! implements them without evaluation.
//!
//! ## Known limitations
//!
//! - The security scan is a blocklist over raw text: comments can trigger
//!   it and obfuscation can evade it.
//! - Import cycles that read the other side's exports during module
//!   initialization observe `undefined`.
//! - Component detection is a heuristic over names and source text.
//! - Overlapping passes are not cancelled; the last one to finish wins.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod autodetect;
pub mod bridge;
pub mod config;
pub mod entry;
pub mod error;
pub mod esm_shim;
pub mod execution;
pub mod exports;
pub mod fetch;
pub mod frontend;
pub mod host;
pub mod imports;
pub mod inert;
pub mod loader;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod security;
pub mod shell;
pub mod splice;
pub mod transform;

#[cfg(test)]
mod pipeline_tests;

pub use config::EngineOptions;
pub use entry::{ComponentPredicate, HeuristicComponentPredicate};
pub use error::{EngineError, LoadError};
pub use execution::{ExecutionHost, ExecutionRequest, ExecutionResult};
pub use fetch::{FetchError, ReqwestFetcher, StaticFetcher, TextFetcher};
pub use host::{ModuleFactory, ModuleLinker, ModuleScope, RuntimeValue, ScriptHost, ValueKind};
pub use inert::{InertHost, InertValue};
pub use loader::{ModuleLoader, SharedDependencyCache};
pub use model::{Diagnostic, ExportInfo, SourceBatch, SourceFile};
pub use registry::ModuleRegistry;
pub use resolver::{DependencyTable, ManualDependency};
pub use transform::{compile_batch, CompiledModule, TransformOutput};

#[cfg(feature = "napi")]
pub use bridge::{detect_dependencies_native, transform_files_native};

/// Crate version, for hosts that cache compiled output.
#[cfg(feature = "napi")]
#[napi]
pub fn engine_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
