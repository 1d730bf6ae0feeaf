//! Import Rewriter (second pass)
//!
//! Turns every import, re-export and literal `require`/`import()` recorded
//! by the first pass into a runtime binding. Needs the export info of every
//! file in the batch, so it only runs once all files have been analyzed.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::exports::{
    reexport_local, DynamicKind, ImportRecord, Imported, ModuleAnalysis, ReexportKind,
};
use crate::model::{
    is_relative_specifier, join_relative, normalize_module_name, Diagnostic, ExportInfo,
    WARN_MISSING_EXPORT,
};
use crate::resolver::{DependencyBinding, DependencyTable};
use crate::splice::{apply_splices, Splice};

/// Local name the host framework object is bound to inside every factory.
pub const FRAMEWORK_LOCAL: &str = "React";
/// Registry getter parameter of every factory.
pub const MODULE_GETTER: &str = "__getModule";
pub const INTEROP_DEFAULT: &str = "__interopDefault";

pub struct RewriteContext<'a> {
    pub framework_specifiers: &'a [String],
    /// Normalized module name → export info, for every file in the batch.
    pub modules: &'a HashMap<String, ExportInfo>,
    pub dependencies: &'a DependencyTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarSource {
    Framework,
    Module(String),
    /// Dependency table key.
    Dependency(String),
}

#[derive(Debug, Clone)]
pub struct RewrittenModule {
    pub code: String,
    /// Dependency table keys referenced by this file, first use first.
    pub dependencies: Vec<String>,
    pub star_sources: Vec<StarSource>,
    pub diagnostics: Vec<Diagnostic>,
}

enum Target<'c> {
    Framework,
    Local(String, &'c ExportInfo),
    Dependency(&'c DependencyBinding),
}

impl<'a> RewriteContext<'a> {
    fn is_framework(&self, specifier: &str) -> bool {
        self.framework_specifiers.iter().any(|s| s == specifier)
    }

    /// Local file whose normalized name matches `specifier`, trying the
    /// importer's directory first for relative specifiers.
    pub fn resolve_local(&self, specifier: &str, importer: &str) -> Option<String> {
        let direct = normalize_module_name(specifier);
        if is_relative_specifier(specifier) {
            let joined = join_relative(importer, specifier);
            if self.modules.contains_key(&joined) {
                return Some(joined);
            }
        }
        self.modules.contains_key(&direct).then_some(direct)
    }

    fn resolve(&self, specifier: &str, importer: &str) -> Option<Target<'a>> {
        if self.is_framework(specifier) {
            return Some(Target::Framework);
        }
        if let Some(name) = self.resolve_local(specifier, importer) {
            let info = self.modules.get(&name)?;
            return Some(Target::Local(name, info));
        }
        self.dependencies.lookup(specifier).map(Target::Dependency)
    }
}

/// `.name` when `name` is a valid identifier, `["name"]` otherwise.
pub fn property_access(name: &str) -> String {
    if oxc_syntax::identifier::is_identifier_name(name) {
        format!(".{}", name)
    } else {
        format!("[{}]", js_string(name))
    }
}

pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

pub fn module_call(name: &str) -> String {
    format!("{}({})", MODULE_GETTER, js_string(name))
}

struct Rewriter<'c, 'a> {
    ctx: &'c RewriteContext<'a>,
    analysis: &'c ModuleAnalysis,
    splices: Vec<Splice>,
    dependencies: Vec<String>,
    star_sources: Vec<StarSource>,
    diagnostics: Vec<Diagnostic>,
}

pub fn rewrite_module(
    analysis: &ModuleAnalysis,
    source: &str,
    ctx: &RewriteContext,
) -> Result<RewrittenModule, EngineError> {
    let mut rewriter = Rewriter {
        ctx,
        analysis,
        splices: analysis.splices.clone(),
        dependencies: Vec::new(),
        star_sources: Vec::new(),
        diagnostics: Vec::new(),
    };

    for import in &analysis.imports {
        let replacement = rewriter.rewrite_import(import)?;
        rewriter
            .splices
            .push(Splice::new(import.start, import.end, replacement));
    }

    for reexport in &analysis.reexports {
        let target = rewriter.resolve_or_fail(&reexport.source)?;
        let replacement = match &reexport.kind {
            ReexportKind::Named(pairs) => pairs
                .iter()
                .map(|(imported, exported)| {
                    let imported = if imported == "default" {
                        Imported::Default
                    } else {
                        Imported::Named(imported.clone())
                    };
                    let expr = rewriter.projection(&target, &imported, &reexport.source);
                    format!("const {} = {};", reexport_local(exported), expr)
                })
                .collect::<Vec<_>>()
                .join(" "),
            ReexportKind::Namespace(exported) => {
                let expr = rewriter.projection(&target, &Imported::Namespace, &reexport.source);
                format!("const {} = {};", reexport_local(exported), expr)
            }
            ReexportKind::All => {
                let star = match &target {
                    Target::Framework => StarSource::Framework,
                    Target::Local(name, _) => StarSource::Module(name.clone()),
                    Target::Dependency(binding) => {
                        rewriter.use_dependency(binding);
                        StarSource::Dependency(binding.specifier.clone())
                    }
                };
                rewriter.star_sources.push(star);
                String::new()
            }
        };
        rewriter
            .splices
            .push(Splice::new(reexport.start, reexport.end, replacement));
    }

    for reference in &analysis.dynamic_references {
        let Some(name) = ctx.resolve_local(&reference.source, &analysis.file_name) else {
            continue;
        };
        let replacement = match reference.kind {
            DynamicKind::Require => module_call(&name),
            DynamicKind::Import => format!("Promise.resolve({})", module_call(&name)),
        };
        rewriter
            .splices
            .push(Splice::new(reference.start, reference.end, replacement));
    }

    let code = apply_splices(source, &rewriter.splices);
    Ok(RewrittenModule {
        code,
        dependencies: rewriter.dependencies,
        star_sources: rewriter.star_sources,
        diagnostics: rewriter.diagnostics,
    })
}

impl<'c, 'a> Rewriter<'c, 'a> {
    fn resolve_or_fail(&self, specifier: &str) -> Result<Target<'a>, EngineError> {
        self.ctx
            .resolve(specifier, &self.analysis.file_name)
            .ok_or_else(|| EngineError::ModuleNotFound {
                specifier: specifier.to_string(),
                importer: self.analysis.file_name.clone(),
            })
    }

    fn use_dependency(&mut self, binding: &DependencyBinding) {
        if !self.dependencies.contains(&binding.specifier) {
            self.dependencies.push(binding.specifier.clone());
        }
    }

    fn rewrite_import(&mut self, import: &ImportRecord) -> Result<String, EngineError> {
        let target = self.resolve_or_fail(&import.source)?;

        if import.side_effect_only {
            return Ok(match &target {
                Target::Local(name, _) => format!("{};", module_call(name)),
                _ => String::new(),
            });
        }

        if let Target::Framework = target {
            return Ok(framework_bindings(import));
        }

        let statements: Vec<String> = import
            .bindings
            .iter()
            .map(|binding| {
                let expr = self.projection(&target, &binding.imported, &import.source);
                format!("const {} = {};", binding.local, expr)
            })
            .collect();
        Ok(statements.join(" "))
    }

    /// Expression yielding `imported` from `target`; warns when a local
    /// target does not export it.
    fn projection(&mut self, target: &Target, imported: &Imported, specifier: &str) -> String {
        match target {
            Target::Framework => match imported {
                Imported::Named(name) => format!("{}{}", FRAMEWORK_LOCAL, property_access(name)),
                _ => FRAMEWORK_LOCAL.to_string(),
            },
            Target::Local(name, info) => {
                let call = module_call(name);
                match imported {
                    Imported::Default => {
                        if !info.has_default_export {
                            self.warn_missing(specifier, "default", info);
                        }
                        format!("{}.default", call)
                    }
                    Imported::Named(export) => {
                        if !info.has_named(export) {
                            self.warn_missing(specifier, export, info);
                        }
                        format!("{}{}", call, property_access(export))
                    }
                    Imported::Namespace => call,
                }
            }
            Target::Dependency(binding) => {
                self.use_dependency(binding);
                let safe = &binding.safe_name;
                match imported {
                    Imported::Default => format!("{}({})", INTEROP_DEFAULT, safe),
                    Imported::Named(export) => format!("{}{}", safe, property_access(export)),
                    Imported::Namespace => safe.clone(),
                }
            }
        }
    }

    fn warn_missing(&mut self, specifier: &str, export: &str, info: &ExportInfo) {
        if !info.star_reexports.is_empty() {
            return;
        }
        let message = format!(
            "'{}' is not exported by '{}'; the binding will be undefined",
            export, specifier
        );
        tracing::warn!(module = %self.analysis.normalized_name, specifier, export, "missing export");
        self.diagnostics.push(Diagnostic::new(
            WARN_MISSING_EXPORT,
            message,
            Some(&self.analysis.normalized_name),
        ));
    }
}

/// `import React, { useState, useEffect as useE } from 'react'` →
/// `const { useState, useEffect: useE } = React;`
fn framework_bindings(import: &ImportRecord) -> String {
    let mut statements = Vec::new();
    let mut destructured = Vec::new();
    for binding in &import.bindings {
        match &binding.imported {
            Imported::Named(name) if name == &binding.local => destructured.push(name.clone()),
            Imported::Named(name) => {
                if oxc_syntax::identifier::is_identifier_name(name) {
                    destructured.push(format!("{}: {}", name, binding.local));
                } else {
                    destructured.push(format!("{}: {}", js_string(name), binding.local));
                }
            }
            Imported::Default | Imported::Namespace => {
                if binding.local != FRAMEWORK_LOCAL {
                    statements.push(format!("const {} = {};", binding.local, FRAMEWORK_LOCAL));
                }
            }
        }
    }
    if !destructured.is_empty() {
        statements.push(format!(
            "const {{ {} }} = {};",
            destructured.join(", "),
            FRAMEWORK_LOCAL
        ));
    }
    statements.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exports::analyze_module;
    use crate::model::{SourceBatch, SourceFile, WARN_MISSING_EXPORT};

    fn rewrite_batch(
        files: Vec<SourceFile>,
        dependencies: &[&str],
    ) -> Result<HashMap<String, RewrittenModule>, EngineError> {
        let batch = SourceBatch::new(files);
        let analyses: Vec<ModuleAnalysis> = batch
            .files()
            .iter()
            .map(|f| analyze_module(f).unwrap())
            .collect();
        let modules: HashMap<String, ExportInfo> = analyses
            .iter()
            .map(|a| (a.normalized_name.clone(), a.export_info.clone()))
            .collect();
        let framework = vec!["react".to_string()];
        let table = DependencyTable::from_specifiers(dependencies.iter().copied());
        let ctx = RewriteContext {
            framework_specifiers: &framework,
            modules: &modules,
            dependencies: &table,
        };
        let mut out = HashMap::new();
        for (file, analysis) in batch.files().iter().zip(&analyses) {
            out.insert(
                analysis.normalized_name.clone(),
                rewrite_module(analysis, &file.content, &ctx)?,
            );
        }
        Ok(out)
    }

    #[test]
    fn test_framework_imports_destructure() {
        let out = rewrite_batch(
            vec![SourceFile::entry(
                "App.tsx",
                "import React, { useState, useEffect as useE } from 'react';\nexport default function App() { return null; }",
            )],
            &[],
        )
        .unwrap();
        let code = &out["App"].code;
        assert!(code.starts_with("const { useState, useEffect: useE } = React;"));
        assert!(!code.contains("import"));
    }

    #[test]
    fn test_framework_namespace_alias() {
        let out = rewrite_batch(
            vec![SourceFile::entry("App.tsx", "import * as R from 'react';\nexport const X = 1;")],
            &[],
        )
        .unwrap();
        assert!(out["App"].code.starts_with("const R = React;"));
    }

    #[test]
    fn test_local_imports_use_registry() {
        let out = rewrite_batch(
            vec![
                SourceFile::entry(
                    "App.tsx",
                    "import Button, { helper } from './components/Button';\nimport * as U from './utils';\nexport default function App() { return Button; }",
                ),
                SourceFile::new(
                    "components/Button.tsx",
                    "export default function Button() { return null; }\nexport const helper = 1;",
                ),
                SourceFile::new("utils.ts", "export const clamp = 1;"),
            ],
            &[],
        )
        .unwrap();
        let code = &out["App"].code;
        assert!(code.contains(r#"const Button = __getModule("components/Button").default;"#));
        assert!(code.contains(r#"const helper = __getModule("components/Button").helper;"#));
        assert!(code.contains(r#"const U = __getModule("utils");"#));
        assert!(out["App"].diagnostics.is_empty());
    }

    #[test]
    fn test_nested_relative_import() {
        let out = rewrite_batch(
            vec![
                SourceFile::entry("components/Card.tsx", "import { Title } from './Title';\nexport default Title;"),
                SourceFile::new("components/Title.tsx", "export const Title = () => null;"),
            ],
            &[],
        )
        .unwrap();
        assert!(out["components/Card"]
            .code
            .contains(r#"__getModule("components/Title").Title"#));
    }

    #[test]
    fn test_dependency_imports() {
        let out = rewrite_batch(
            vec![SourceFile::entry(
                "App.tsx",
                "import { motion } from 'framer-motion';\nimport clsx from 'clsx';\nimport * as Icons from '@icons/set/solid';\nexport const X = 1;",
            )],
            &["framer-motion", "clsx", "@icons/*"],
        )
        .unwrap();
        let module = &out["App"];
        assert!(module.code.contains("const motion = __dep_framer_motion.motion;"));
        assert!(module.code.contains("const clsx = __interopDefault(__dep_clsx);"));
        assert!(module.code.contains("const Icons = __dep__icons__;"));
        assert_eq!(module.dependencies, vec!["framer-motion", "clsx", "@icons/*"]);
    }

    #[test]
    fn test_unknown_specifier_is_module_not_found() {
        let err = rewrite_batch(
            vec![SourceFile::entry("App.tsx", "import { x } from 'left-pad';\nexport const A = x;")],
            &[],
        )
        .unwrap_err();
        match err {
            EngineError::ModuleNotFound { specifier, importer } => {
                assert_eq!(specifier, "left-pad");
                assert_eq!(importer, "App.tsx");
            }
            other => panic!("expected module not found, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_named_export_warns() {
        let out = rewrite_batch(
            vec![
                SourceFile::entry("App.tsx", "import { nope } from './utils';\nexport const A = 1;"),
                SourceFile::new("utils.ts", "export const yes = 1;"),
            ],
            &[],
        )
        .unwrap();
        let diagnostics = &out["App"].diagnostics;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, WARN_MISSING_EXPORT);
        assert!(out["App"].code.contains(r#"__getModule("utils").nope"#));
    }

    #[test]
    fn test_side_effect_and_dynamic_references() {
        let out = rewrite_batch(
            vec![
                SourceFile::entry(
                    "App.tsx",
                    "import './setup';\nimport 'react';\nconst u = require('./setup');\nconst lazy = () => import('./setup');\nexport const A = 1;",
                ),
                SourceFile::new("setup.ts", "export const ready = true;"),
            ],
            &[],
        )
        .unwrap();
        let code = &out["App"].code;
        assert!(code.starts_with(r#"__getModule("setup");"#));
        assert!(code.contains(r#"const u = __getModule("setup");"#));
        assert!(code.contains(r#"Promise.resolve(__getModule("setup"))"#));
    }

    #[test]
    fn test_reexports_become_hidden_locals() {
        let out = rewrite_batch(
            vec![
                SourceFile::entry(
                    "index.ts",
                    "export { Button as Btn } from './Button';\nexport * from './icons';",
                ),
                SourceFile::new("Button.tsx", "export const Button = () => null;"),
                SourceFile::new("icons.ts", "export const Star = 1;"),
            ],
            &[],
        )
        .unwrap();
        let module = &out["index"];
        assert!(module
            .code
            .contains(r#"const __reexport_Btn = __getModule("Button").Button;"#));
        assert_eq!(module.star_sources, vec![StarSource::Module("icons".to_string())]);
    }
}
