use serde::Serialize;
use std::collections::HashMap;

use crate::error::EngineError;
use crate::exports::{analyze_module, ModuleAnalysis};
use crate::frontend::compile_source;
use crate::imports::{
    js_string, module_call, property_access, rewrite_module, RewriteContext, StarSource,
    FRAMEWORK_LOCAL, INTEROP_DEFAULT, MODULE_GETTER,
};
use crate::model::{Diagnostic, ExportInfo, SourceBatch};
use crate::resolver::DependencyTable;
use crate::shell::{build_shell, ModuleShell};

/// Parameter through which a factory receives the dependency value map.
pub const DEPENDENCIES_PARAM: &str = "__deps";
pub const REEXPORT_ALL: &str = "__reexportAll";

// ═══════════════════════════════════════════════════════════════════════════════
// PASS OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledModule {
    /// Normalized name; the registry key.
    pub name: String,
    pub file_name: String,
    pub is_entry: bool,
    /// Compiled body: imports rewritten, types stripped, JSX lowered.
    pub code: String,
    /// `(function (exports, __getModule, React, __deps) { … })`
    pub factory_source: String,
    pub export_info: ExportInfo,
    pub shell: ModuleShell,
    /// Dependency table keys this module reads from `__deps`.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOutput {
    pub modules: Vec<CompiledModule>,
    /// Normalized name of the entry module.
    pub entry: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl TransformOutput {
    pub fn module(&self, name: &str) -> Option<&CompiledModule> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn entry_module(&self) -> Option<&CompiledModule> {
        self.module(&self.entry)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASSES
// ═══════════════════════════════════════════════════════════════════════════════

/// First pass over every file. Validates the batch, then computes each
/// file's export info before any rewrite can ask for it.
pub fn analyze_batch(batch: &SourceBatch) -> Result<Vec<ModuleAnalysis>, EngineError> {
    batch.validate()?;
    batch.files().iter().map(analyze_module).collect()
}

/// Second pass: rewrite imports against the export-info map and the
/// resolved dependency table, then compile each file.
pub fn transform_batch(
    batch: &SourceBatch,
    analyses: &[ModuleAnalysis],
    framework_specifiers: &[String],
    dependencies: &DependencyTable,
) -> Result<TransformOutput, EngineError> {
    let modules: HashMap<String, ExportInfo> = analyses
        .iter()
        .map(|a| (a.normalized_name.clone(), a.export_info.clone()))
        .collect();
    let ctx = RewriteContext {
        framework_specifiers,
        modules: &modules,
        dependencies,
    };
    let safe_names: HashMap<String, String> = dependencies
        .bindings()
        .iter()
        .map(|b| (b.safe_name.clone(), b.specifier.clone()))
        .collect();

    let entry = batch
        .entry()
        .map(|f| f.normalized_name())
        .ok_or_else(|| EngineError::Config("source batch contains no files".to_string()))?;

    let mut compiled = Vec::with_capacity(analyses.len());
    let mut diagnostics = Vec::new();
    for (file, analysis) in batch.files().iter().zip(analyses) {
        diagnostics.extend(analysis.diagnostics.iter().cloned());

        let rewritten = rewrite_module(analysis, &file.content, &ctx)?;
        let code = compile_source(&file.name, &rewritten.code)?;
        let shell = build_shell(
            &code,
            &safe_names,
            &analysis.export_info,
            &rewritten.star_sources,
        );
        let factory_source = factory_source(
            &code,
            &analysis.export_info,
            &rewritten.dependencies,
            &rewritten.star_sources,
            dependencies,
        );
        diagnostics.extend(rewritten.diagnostics);

        compiled.push(CompiledModule {
            name: analysis.normalized_name.clone(),
            file_name: file.name.clone(),
            is_entry: analysis.normalized_name == entry,
            code,
            factory_source,
            export_info: analysis.export_info.clone(),
            shell,
            dependencies: rewritten.dependencies,
        });
    }

    Ok(TransformOutput {
        modules: compiled,
        entry,
        diagnostics,
    })
}

/// Both passes in one call, for callers that already know their dependency
/// names.
pub fn compile_batch(
    batch: &SourceBatch,
    framework_specifiers: &[String],
    dependencies: &DependencyTable,
) -> Result<TransformOutput, EngineError> {
    let analyses = analyze_batch(batch)?;
    transform_batch(batch, &analyses, framework_specifiers, dependencies)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORY SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

fn factory_source(
    code: &str,
    export_info: &ExportInfo,
    used_dependencies: &[String],
    star_sources: &[StarSource],
    table: &DependencyTable,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "(function (exports, {}, {}, {}) {{\n",
        MODULE_GETTER, FRAMEWORK_LOCAL, DEPENDENCIES_PARAM
    ));

    // Prologue
    out.push_str(&format!(
        "const {} = (m) => (m && m.default !== undefined ? m.default : m);\n",
        INTEROP_DEFAULT
    ));
    out.push_str(&format!(
        "const {} = (target, source) => {{ if (source) {{ for (const key of Object.keys(source)) {{ if (key !== \"default\" && !(key in target)) target[key] = source[key]; }} }} }};\n",
        REEXPORT_ALL
    ));
    for specifier in used_dependencies {
        if let Some(binding) = table.get(specifier) {
            out.push_str(&format!(
                "const {} = {}[{}];\n",
                binding.safe_name,
                DEPENDENCIES_PARAM,
                js_string(&binding.specifier)
            ));
        }
    }

    out.push_str(code);
    if !code.ends_with('\n') {
        out.push('\n');
    }

    // Epilogue
    if let Some(local) = &export_info.default_exported_identifier {
        out.push_str(&format!("exports[\"default\"] = {};\n", local));
    }
    for (exported, local) in &export_info.bindings {
        out.push_str(&format!("exports{} = {};\n", property_access(exported), local));
    }
    for star in star_sources {
        let source = match star {
            StarSource::Framework => FRAMEWORK_LOCAL.to_string(),
            StarSource::Module(name) => module_call(name),
            StarSource::Dependency(specifier) => table
                .get(specifier)
                .map(|b| b.safe_name.clone())
                .unwrap_or_else(|| "undefined".to_string()),
        };
        out.push_str(&format!("{}(exports, {});\n", REEXPORT_ALL, source));
    }
    out.push_str("return exports;\n})");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceFile;
    use crate::shell::{ShellInit, ShellStep};

    fn framework() -> Vec<String> {
        vec!["react".to_string()]
    }

    #[test]
    fn test_single_entry_round_trip() {
        let batch = SourceBatch::from_source("export default function Foo(){ return <div/> }");
        let output = compile_batch(&batch, &framework(), &DependencyTable::default()).unwrap();
        assert_eq!(output.entry, "index");
        let module = output.entry_module().unwrap();
        assert!(module.is_entry);
        assert!(module.code.contains("React.createElement(\"div\""));
        assert!(module.factory_source.starts_with("(function (exports, __getModule, React, __deps) {"));
        assert!(module.factory_source.contains("exports[\"default\"] = Foo;"));
        assert!(module.factory_source.trim_end().ends_with("return exports;\n})"));
        assert!(matches!(
            &module.shell.steps[0],
            ShellStep::Declare { init: ShellInit::Function { name, .. }, .. } if name == "Foo"
        ));
    }

    #[test]
    fn test_dependency_prologue_only_for_used() {
        let batch = SourceBatch::from_source(
            "import { motion } from 'framer-motion';\nexport default function A() { return motion; }",
        );
        let table = DependencyTable::from_specifiers(["framer-motion", "clsx"]);
        let output = compile_batch(&batch, &framework(), &table).unwrap();
        let module = output.entry_module().unwrap();
        assert!(module
            .factory_source
            .contains("const __dep_framer_motion = __deps[\"framer-motion\"];"));
        assert!(!module.factory_source.contains("__dep_clsx"));
        assert_eq!(module.dependencies, vec!["framer-motion"]);
    }

    #[test]
    fn test_auto_exported_names_in_epilogue() {
        let batch = SourceBatch::from_source("const Card = () => <p/>;");
        let output = compile_batch(&batch, &framework(), &DependencyTable::default()).unwrap();
        let module = output.entry_module().unwrap();
        assert!(module.factory_source.contains("exports.Card = Card;"));
        assert_eq!(output.diagnostics.len(), 1);
    }

    #[test]
    fn test_star_reexport_epilogue() {
        let batch = SourceBatch::new(vec![
            SourceFile::entry("index.ts", "export * from './icons';"),
            SourceFile::new("icons.ts", "export const Star = 1;"),
        ]);
        let output = compile_batch(&batch, &framework(), &DependencyTable::default()).unwrap();
        let module = output.module("index").unwrap();
        assert!(module
            .factory_source
            .contains("__reexportAll(exports, __getModule(\"icons\"));"));
    }

    #[test]
    fn test_duplicate_names_rejected_before_transform() {
        let batch = SourceBatch::new(vec![
            SourceFile::entry("App.tsx", "export default 1;"),
            SourceFile::new("./App.jsx", "export default 2;"),
        ]);
        let err = compile_batch(&batch, &framework(), &DependencyTable::default()).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_DUPLICATE_MODULE);
    }
}
