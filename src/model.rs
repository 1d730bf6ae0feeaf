//! Core data model shared by every pass.
//!
//! A pass consumes a [`SourceBatch`] and produces per-file [`ExportInfo`]
//! records that other files' rewrites depend on. Names are always compared
//! in their normalized form (see [`normalize_module_name`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;

/// Extensions stripped during name normalization, longest first so that
/// `.tsx` wins over `.ts`.
const MODULE_EXTENSIONS: &[&str] = &[".tsx", ".ts", ".jsx", ".js", ".mjs", ".cjs"];

/// File name used when a caller submits a bare source string.
pub const DEFAULT_ENTRY_FILE: &str = "index.tsx";

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE FILES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub is_entry: bool,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            is_entry: false,
        }
    }

    pub fn entry(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            is_entry: true,
            ..Self::new(name, content)
        }
    }

    pub fn normalized_name(&self) -> String {
        normalize_module_name(&self.name)
    }
}

/// An ordered set of files submitted to one pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SourceBatch {
    files: Vec<SourceFile>,
}

impl SourceBatch {
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self { files }
    }

    /// A single source string becomes one entry file.
    pub fn from_source(code: impl Into<String>) -> Self {
        Self {
            files: vec![SourceFile::entry(DEFAULT_ENTRY_FILE, code)],
        }
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The file marked `is_entry`, else the first file.
    pub fn entry(&self) -> Option<&SourceFile> {
        self.files
            .iter()
            .find(|f| f.is_entry)
            .or_else(|| self.files.first())
    }

    pub fn normalized_names(&self) -> Vec<String> {
        self.files.iter().map(SourceFile::normalized_name).collect()
    }

    pub fn contains_module(&self, normalized: &str) -> bool {
        self.files.iter().any(|f| f.normalized_name() == normalized)
    }

    /// Rejects empty batches and batches whose names collide after
    /// normalization.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.files.is_empty() {
            return Err(EngineError::Config(
                "source batch contains no files".to_string(),
            ));
        }
        let mut seen: HashMap<String, &str> = HashMap::new();
        for file in &self.files {
            let normalized = file.normalized_name();
            if let Some(first) = seen.insert(normalized.clone(), &file.name) {
                return Err(EngineError::DuplicateModule {
                    name: normalized,
                    first: first.to_string(),
                    second: file.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<SourceFile>> for SourceBatch {
    fn from(files: Vec<SourceFile>) -> Self {
        Self::new(files)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// What a file exports, computed once per pass by the export normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportInfo {
    pub has_default_export: bool,
    pub default_exported_identifier: Option<String>,
    /// Exported-facing names in declaration order.
    pub named_exports: Vec<String>,
    /// Subset of `named_exports` synthesized by the uppercase heuristic.
    pub auto_exported: Vec<String>,
    /// Sources of `export * from '…'` statements.
    pub star_reexports: Vec<String>,
    /// `(exported, local)` pairs used to build the exports epilogue.
    #[serde(skip)]
    pub bindings: Vec<(String, String)>,
}

impl ExportInfo {
    pub fn has_named(&self, name: &str) -> bool {
        self.named_exports.iter().any(|n| n == name)
    }

    pub fn is_auto_exported(&self, name: &str) -> bool {
        self.auto_exported.iter().any(|n| n == name)
    }

    pub fn has_any_export(&self) -> bool {
        self.has_default_export || !self.named_exports.is_empty() || !self.star_reexports.is_empty()
    }

    pub(crate) fn add_named(&mut self, exported: &str, local: &str) {
        if exported == "default" {
            self.set_default(local);
            return;
        }
        if !self.has_named(exported) {
            self.named_exports.push(exported.to_string());
        }
        self.bindings.retain(|(e, _)| e != exported);
        self.bindings.push((exported.to_string(), local.to_string()));
    }

    pub(crate) fn add_auto(&mut self, name: &str) {
        self.add_named(name, name);
        if !self.is_auto_exported(name) {
            self.auto_exported.push(name.to_string());
        }
    }

    pub(crate) fn set_default(&mut self, local: &str) {
        self.has_default_export = true;
        self.default_exported_identifier = Some(local.to_string());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════════

pub const WARN_MISSING_EXPORT: &str = "LR-WARN-MISSING-EXPORT";
pub const WARN_AUTO_EXPORT: &str = "LR-WARN-AUTO-EXPORT";
pub const WARN_DEPENDENCY_SKIPPED: &str = "LR-WARN-DEPENDENCY-SKIPPED";
pub const WARN_FRAMEWORK_PRIMITIVE: &str = "LR-WARN-FRAMEWORK-PRIMITIVE";

/// A non-fatal finding surfaced alongside a pass result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub module: Option<String>,
}

impl Diagnostic {
    pub fn new(code: &str, message: impl Into<String>, module: Option<&str>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            module: module.map(str::to_string),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Strips leading `./` and `/` segments and one known extension.
///
/// `./components/Button.tsx` → `components/Button`
pub fn normalize_module_name(name: &str) -> String {
    let mut trimmed = name.trim();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    for ext in MODULE_EXTENSIONS {
        if let Some(stem) = trimmed.strip_suffix(ext) {
            if !stem.is_empty() {
                return stem.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Resolves `specifier` against the directory of `importer`, collapsing
/// `.` and `..` segments. Returns a normalized name.
pub fn join_relative(importer: &str, specifier: &str) -> String {
    let importer = normalize_module_name(importer);
    let mut segments: Vec<&str> = importer.split('/').collect();
    segments.pop();
    for part in specifier.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    normalize_module_name(&segments.join("/"))
}

pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
        || specifier == "." || specifier == ".."
}

/// Maps a package specifier onto a JS identifier: every character outside
/// `[A-Za-z0-9_]` becomes `_`.
pub fn safe_variable_name(specifier: &str) -> String {
    let mut name: String = specifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

pub fn starts_with_uppercase(name: &str) -> bool {
    name.chars().next().map_or(false, |c| c.is_uppercase())
}
