//! Parse/transform front end.
//!
//! Strips TypeScript, lowers JSX to classic `React.createElement` calls and
//! prints plain JavaScript. Runs after the import rewriter, so the framework
//! object it references is the factory's `React` parameter.

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_transformer::{JsxRuntime, TransformOptions, Transformer};
use std::path::Path;

use crate::error::EngineError;
use crate::exports::source_type;

pub const JSX_PRAGMA: &str = "React.createElement";
pub const JSX_PRAGMA_FRAG: &str = "React.Fragment";

fn transform_options() -> TransformOptions {
    let mut options = TransformOptions::default();
    options.jsx.runtime = JsxRuntime::Classic;
    options.jsx.pragma = Some(JSX_PRAGMA.to_string());
    options.jsx.pragma_frag = Some(JSX_PRAGMA_FRAG.to_string());
    options
}

fn join_diagnostics<E: ToString>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Compiles one rewritten file to plain JavaScript.
pub fn compile_source(file_name: &str, source: &str) -> Result<String, EngineError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type()).parse();
    if !ret.errors.is_empty() {
        return Err(EngineError::Transform {
            file: file_name.to_string(),
            message: join_diagnostics(&ret.errors),
        });
    }
    let mut program = ret.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let options = transform_options();
    let result = Transformer::new(&allocator, Path::new(file_name), &options)
        .build_with_scoping(scoping, &mut program);
    if !result.errors.is_empty() {
        return Err(EngineError::Transform {
            file: file_name.to_string(),
            message: join_diagnostics(&result.errors),
        });
    }

    Ok(Codegen::new().build(&program).code)
}
