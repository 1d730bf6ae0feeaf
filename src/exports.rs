//! Export Normalizer (first pass)
//!
//! Parses one file, records what it exports and which imports it makes, and
//! plans the edits that turn export syntax into plain declarations. Nothing
//! is resolved here; import resolution needs every file's [`ExportInfo`]
//! first and happens in the rewriter.
//!
//! Shapes recognised:
//! - `export default Foo` → statement dropped, default = `Foo`
//! - `export default function|class Foo` → prefix dropped, default = `Foo`
//! - anonymous default (`export default () => …`) → `const __default__ = …`
//! - `export const|let|var|function|class|enum …` → prefix dropped
//! - `export { a, b as c }` → statement dropped, `c` maps to local `b`
//! - `export … from '…'` → recorded for the rewriter
//! - type-only forms → dropped

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use std::collections::HashSet;

use crate::error::EngineError;
use crate::model::{starts_with_uppercase, Diagnostic, ExportInfo, SourceFile, WARN_AUTO_EXPORT};
use crate::splice::Splice;

/// Local name bound to an anonymous default export.
pub const DEFAULT_EXPORT_LOCAL: &str = "__default__";

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Imported {
    Default,
    Named(String),
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub imported: Imported,
}

#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub start: u32,
    pub end: u32,
    pub source: String,
    pub bindings: Vec<ImportBinding>,
    /// `import './x'` with no clause at all.
    pub side_effect_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReexportKind {
    /// `(imported, exported)` pairs.
    Named(Vec<(String, String)>),
    /// `export * as ns from '…'`
    Namespace(String),
    /// `export * from '…'`
    All,
}

#[derive(Debug, Clone)]
pub struct ReexportRecord {
    pub start: u32,
    pub end: u32,
    pub source: String,
    pub kind: ReexportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicKind {
    Require,
    Import,
}

/// A `require('…')` or `import('…')` call with a literal specifier.
#[derive(Debug, Clone)]
pub struct DynamicReference {
    pub start: u32,
    pub end: u32,
    pub source: String,
    pub kind: DynamicKind,
}

#[derive(Debug, Clone)]
pub struct ModuleAnalysis {
    pub file_name: String,
    pub normalized_name: String,
    pub export_info: ExportInfo,
    /// Export-syntax edits; the rewriter applies them together with its own.
    pub splices: Vec<Splice>,
    pub imports: Vec<ImportRecord>,
    pub reexports: Vec<ReexportRecord>,
    pub dynamic_references: Vec<DynamicReference>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Hidden local that carries a re-exported value.
pub fn reexport_local(exported: &str) -> String {
    format!("__reexport_{}", crate::model::safe_variable_name(exported))
}

pub(crate) fn source_type() -> SourceType {
    SourceType::default()
        .with_typescript(true)
        .with_jsx(true)
        .with_module(true)
}

pub(crate) fn module_export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

pub(crate) fn collect_binding_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for pattern in arr.elements.iter().flatten() {
                collect_binding_names(pattern, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_binding_names(&assign.left, names),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn analyze_module(file: &SourceFile) -> Result<ModuleAnalysis, EngineError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &file.content, source_type()).parse();
    if !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(EngineError::Transform {
            file: file.name.clone(),
            message,
        });
    }
    let program = ret.program;

    let type_names = collect_type_only_names(&program);

    let mut analysis = ModuleAnalysis {
        file_name: file.name.clone(),
        normalized_name: file.normalized_name(),
        export_info: ExportInfo::default(),
        splices: Vec::new(),
        imports: Vec::new(),
        reexports: Vec::new(),
        dynamic_references: Vec::new(),
        diagnostics: Vec::new(),
    };
    let mut component_candidates: Vec<String> = Vec::new();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => analyze_import(decl, &mut analysis),
            Statement::ExportNamedDeclaration(decl) => {
                analyze_export_named(decl, &type_names, &mut analysis)
            }
            Statement::ExportDefaultDeclaration(decl) => analyze_export_default(decl, &mut analysis),
            Statement::ExportAllDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    analysis.splices.push(Splice::remove(decl.span.start, decl.span.end));
                    continue;
                }
                let source = decl.source.value.to_string();
                let kind = match &decl.exported {
                    Some(name) => {
                        let exported = module_export_name(name);
                        analysis
                            .export_info
                            .add_named(&exported, &reexport_local(&exported));
                        ReexportKind::Namespace(exported)
                    }
                    None => {
                        analysis.export_info.star_reexports.push(source.clone());
                        ReexportKind::All
                    }
                };
                analysis.reexports.push(ReexportRecord {
                    start: decl.span.start,
                    end: decl.span.end,
                    source,
                    kind,
                });
            }
            Statement::VariableDeclaration(var) => {
                for declarator in &var.declarations {
                    if let BindingPattern::BindingIdentifier(id) = &declarator.id {
                        if starts_with_uppercase(&id.name) {
                            component_candidates.push(id.name.to_string());
                        }
                    }
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    if starts_with_uppercase(&id.name) && func.body.is_some() {
                        component_candidates.push(id.name.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    // Nothing exported explicitly: treat uppercase top-level bindings as
    // potential components.
    if !analysis.export_info.has_any_export() {
        for name in &component_candidates {
            analysis.export_info.add_auto(name);
        }
        if !component_candidates.is_empty() {
            analysis.diagnostics.push(Diagnostic::new(
                WARN_AUTO_EXPORT,
                format!(
                    "No exports found; auto-exporting potential components: {}",
                    component_candidates.join(", ")
                ),
                Some(&analysis.normalized_name),
            ));
        }
    }

    let mut collector = DynamicReferenceCollector::default();
    collector.visit_program(&program);
    analysis.dynamic_references = collector.found;

    Ok(analysis)
}

fn analyze_import(decl: &ImportDeclaration, analysis: &mut ModuleAnalysis) {
    if decl.import_kind.is_type() {
        analysis.splices.push(Splice::remove(decl.span.start, decl.span.end));
        return;
    }
    let mut bindings = Vec::new();
    if let Some(specifiers) = &decl.specifiers {
        for specifier in specifiers {
            match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if s.import_kind.is_type() {
                        continue;
                    }
                    bindings.push(ImportBinding {
                        local: s.local.name.to_string(),
                        imported: match module_export_name(&s.imported) {
                            name if name == "default" => Imported::Default,
                            name => Imported::Named(name),
                        },
                    });
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    bindings.push(ImportBinding {
                        local: s.local.name.to_string(),
                        imported: Imported::Default,
                    });
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    bindings.push(ImportBinding {
                        local: s.local.name.to_string(),
                        imported: Imported::Namespace,
                    });
                }
            }
        }
    }
    analysis.imports.push(ImportRecord {
        start: decl.span.start,
        end: decl.span.end,
        source: decl.source.value.to_string(),
        bindings,
        side_effect_only: decl.specifiers.is_none(),
    });
}

fn analyze_export_named(
    decl: &ExportNamedDeclaration,
    type_names: &HashSet<String>,
    analysis: &mut ModuleAnalysis,
) {
    let whole = Splice::remove(decl.span.start, decl.span.end);
    if decl.export_kind.is_type() {
        analysis.splices.push(whole);
        return;
    }

    if let Some(declaration) = &decl.declaration {
        let info = &mut analysis.export_info;
        let declaration_start = match declaration {
            Declaration::VariableDeclaration(var) if !var.declare => {
                let mut names = Vec::new();
                for declarator in &var.declarations {
                    collect_binding_names(&declarator.id, &mut names);
                }
                for name in &names {
                    info.add_named(name, name);
                }
                Some(var.span.start)
            }
            Declaration::FunctionDeclaration(func) if !func.declare && func.body.is_some() => {
                if let Some(id) = &func.id {
                    info.add_named(&id.name, &id.name);
                }
                Some(func.span.start)
            }
            Declaration::ClassDeclaration(class) if !class.declare => {
                if let Some(id) = &class.id {
                    info.add_named(&id.name, &id.name);
                }
                Some(class.span.start)
            }
            Declaration::TSEnumDeclaration(e) if !e.declare => {
                info.add_named(&e.id.name, &e.id.name);
                Some(e.span.start)
            }
            Declaration::TSModuleDeclaration(m) if namespace_has_values(m) => {
                if let TSModuleDeclarationName::Identifier(id) = &m.id {
                    info.add_named(&id.name, &id.name);
                }
                Some(m.span.start)
            }
            // interfaces, type aliases, ambient declarations, overloads,
            // namespaces holding only types
            _ => None,
        };
        match declaration_start {
            Some(start) => analysis.splices.push(Splice::remove(decl.span.start, start)),
            None => analysis.splices.push(whole),
        }
        return;
    }

    let pairs: Vec<(String, String)> = decl
        .specifiers
        .iter()
        .filter(|s| !s.export_kind.is_type())
        .map(|s| (module_export_name(&s.local), module_export_name(&s.exported)))
        .collect();

    if let Some(source) = &decl.source {
        for (_, exported) in &pairs {
            analysis
                .export_info
                .add_named(exported, &reexport_local(exported));
        }
        analysis.reexports.push(ReexportRecord {
            start: decl.span.start,
            end: decl.span.end,
            source: source.value.to_string(),
            kind: ReexportKind::Named(pairs),
        });
        return;
    }

    // `export { a, b as c }`: aliasing lives in the exports epilogue.
    for (local, exported) in &pairs {
        if type_names.contains(local) {
            continue;
        }
        analysis.export_info.add_named(exported, local);
    }
    analysis.splices.push(whole);
}

fn analyze_export_default(decl: &ExportDefaultDeclaration, analysis: &mut ModuleAnalysis) {
    let info = &mut analysis.export_info;
    let anonymous_prefix = format!("const {} = ", DEFAULT_EXPORT_LOCAL);
    match &decl.declaration {
        ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
            if func.body.is_none() {
                analysis.splices.push(Splice::remove(decl.span.start, decl.span.end));
                return;
            }
            match &func.id {
                Some(id) => {
                    info.set_default(&id.name);
                    analysis.splices.push(Splice::remove(decl.span.start, func.span.start));
                }
                None => {
                    info.set_default(DEFAULT_EXPORT_LOCAL);
                    analysis
                        .splices
                        .push(Splice::new(decl.span.start, func.span.start, anonymous_prefix));
                }
            }
        }
        ExportDefaultDeclarationKind::ClassDeclaration(class) => match &class.id {
            Some(id) => {
                info.set_default(&id.name);
                analysis.splices.push(Splice::remove(decl.span.start, class.span.start));
            }
            None => {
                info.set_default(DEFAULT_EXPORT_LOCAL);
                analysis
                    .splices
                    .push(Splice::new(decl.span.start, class.span.start, anonymous_prefix));
            }
        },
        ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
            analysis.splices.push(Splice::remove(decl.span.start, decl.span.end));
        }
        ExportDefaultDeclarationKind::Identifier(ident) => {
            info.set_default(&ident.name);
            analysis.splices.push(Splice::remove(decl.span.start, decl.span.end));
        }
        expression => {
            info.set_default(DEFAULT_EXPORT_LOCAL);
            analysis.splices.push(Splice::new(
                decl.span.start,
                expression.span().start,
                anonymous_prefix,
            ));
        }
    }
}

/// Non-ambient namespace that emits runtime code, i.e. holds anything besides
/// interfaces, type aliases and type-only nested namespaces.
fn namespace_has_values(module: &TSModuleDeclaration) -> bool {
    if module.declare {
        return false;
    }
    match &module.body {
        Some(TSModuleDeclarationBody::TSModuleBlock(block)) => {
            block.body.iter().any(statement_has_values)
        }
        Some(TSModuleDeclarationBody::TSModuleDeclaration(inner)) => namespace_has_values(inner),
        None => false,
    }
}

fn statement_has_values(stmt: &Statement) -> bool {
    match stmt {
        Statement::TSInterfaceDeclaration(_) | Statement::TSTypeAliasDeclaration(_) => false,
        Statement::TSModuleDeclaration(inner) => namespace_has_values(inner),
        Statement::ExportNamedDeclaration(export) => match &export.declaration {
            Some(Declaration::TSInterfaceDeclaration(_))
            | Some(Declaration::TSTypeAliasDeclaration(_)) => false,
            Some(Declaration::TSModuleDeclaration(inner)) => namespace_has_values(inner),
            Some(_) => true,
            None => !export.export_kind.is_type(),
        },
        _ => true,
    }
}

fn insert_type_namespace(module: &TSModuleDeclaration, names: &mut HashSet<String>) {
    if namespace_has_values(module) {
        return;
    }
    if let TSModuleDeclarationName::Identifier(id) = &module.id {
        names.insert(id.name.to_string());
    }
}

/// Names of top-level interfaces and type aliases, which must never be
/// copied onto a runtime exports object.
fn collect_type_only_names(program: &Program) -> HashSet<String> {
    let mut names = HashSet::new();
    for stmt in &program.body {
        match stmt {
            Statement::TSInterfaceDeclaration(d) => {
                names.insert(d.id.name.to_string());
            }
            Statement::TSTypeAliasDeclaration(d) => {
                names.insert(d.id.name.to_string());
            }
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::TSInterfaceDeclaration(d)) => {
                    names.insert(d.id.name.to_string());
                }
                Some(Declaration::TSTypeAliasDeclaration(d)) => {
                    names.insert(d.id.name.to_string());
                }
                Some(Declaration::TSModuleDeclaration(d)) => insert_type_namespace(d, &mut names),
                _ => {}
            },
            Statement::TSModuleDeclaration(d) => insert_type_namespace(d, &mut names),
            Statement::ImportDeclaration(import) => {
                let whole_type = import.import_kind.is_type();
                if let Some(specifiers) = &import.specifiers {
                    for specifier in specifiers {
                        if let ImportDeclarationSpecifier::ImportSpecifier(s) = specifier {
                            if whole_type || s.import_kind.is_type() {
                                names.insert(s.local.name.to_string());
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    names
}

#[derive(Default)]
struct DynamicReferenceCollector {
    found: Vec<DynamicReference>,
}

impl<'a> Visit<'a> for DynamicReferenceCollector {
    fn visit_call_expression(&mut self, expr: &CallExpression<'a>) {
        if let Expression::Identifier(ident) = &expr.callee {
            if ident.name == "require" && expr.arguments.len() == 1 {
                if let Some(Argument::StringLiteral(lit)) = expr.arguments.first() {
                    self.found.push(DynamicReference {
                        start: expr.span.start,
                        end: expr.span.end,
                        source: lit.value.to_string(),
                        kind: DynamicKind::Require,
                    });
                }
            }
        }
        walk::walk_call_expression(self, expr);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(lit) = &expr.source {
            self.found.push(DynamicReference {
                start: expr.span.start,
                end: expr.span.end,
                source: lit.value.to_string(),
                kind: DynamicKind::Import,
            });
        }
        walk::walk_import_expression(self, expr);
    }
}
