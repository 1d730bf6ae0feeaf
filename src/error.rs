//! Error taxonomy for a pass.
//!
//! Every fatal condition is an [`EngineError`] variant with a stable code.
//! The execution host turns them into structured results; nothing here is
//! ever thrown past the host.

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_POLICY: &str = "LR-ERR-POLICY";
pub const ERR_CONFIG: &str = "LR-ERR-CONFIG";
pub const ERR_DUPLICATE_MODULE: &str = "LR-ERR-DUPLICATE-MODULE";
pub const ERR_MODULE_NOT_FOUND: &str = "LR-ERR-MODULE-NOT-FOUND";
pub const ERR_DOMAIN: &str = "LR-ERR-DOMAIN";
pub const ERR_DEPENDENCY_LOAD: &str = "LR-ERR-DEPENDENCY-LOAD";
pub const ERR_TRANSFORM: &str = "LR-ERR-TRANSFORM";
pub const ERR_INSTANTIATION: &str = "LR-ERR-INSTANTIATION";
pub const ERR_NO_COMPONENT: &str = "LR-ERR-NO-COMPONENT";
pub const ERR_INTERNAL: &str = "LR-ERR-INTERNAL";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Forbidden pattern matched; recoverable by re-running with bypass.
    #[error("Security check failed: forbidden pattern `{pattern}` found in {file}")]
    ForbiddenPattern { file: String, pattern: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Duplicate module name '{name}' (from '{first}' and '{second}')")]
    DuplicateModule {
        name: String,
        first: String,
        second: String,
    },

    #[error("Module not found: '{specifier}' (imported from {importer})")]
    ModuleNotFound { specifier: String, importer: String },

    #[error("Domain not allowed: '{host}' for dependency '{specifier}' ({url})")]
    DomainNotAllowed {
        specifier: String,
        url: String,
        host: String,
    },

    #[error("Failed to load dependency '{specifier}': {source}")]
    DependencyLoad {
        specifier: String,
        #[source]
        source: LoadError,
    },

    #[error("Transform failed in {file}: {message}")]
    Transform { file: String, message: String },

    #[error("Failed to instantiate module '{module}': {message}")]
    Instantiation { module: String, message: String },

    #[error(
        "No component found in entry module '{module}'. Exports found: [{}]{}. \
         Export a function component as default, or give it an uppercase name.",
        .exports.join(", "),
        auto_note(.auto_exported)
    )]
    NoComponent {
        module: String,
        exports: Vec<String>,
        auto_exported: Vec<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

fn auto_note(auto_exported: &[String]) -> String {
    if auto_exported.is_empty() {
        String::new()
    } else {
        format!(" (auto-exported: [{}])", auto_exported.join(", "))
    }
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ForbiddenPattern { .. } => ERR_POLICY,
            EngineError::Config(_) => ERR_CONFIG,
            EngineError::DuplicateModule { .. } => ERR_DUPLICATE_MODULE,
            EngineError::ModuleNotFound { .. } => ERR_MODULE_NOT_FOUND,
            EngineError::DomainNotAllowed { .. } => ERR_DOMAIN,
            EngineError::DependencyLoad { .. } => ERR_DEPENDENCY_LOAD,
            EngineError::Transform { .. } => ERR_TRANSFORM,
            EngineError::Instantiation { .. } => ERR_INSTANTIATION,
            EngineError::NoComponent { .. } => ERR_NO_COMPONENT,
            EngineError::Internal(_) => ERR_INTERNAL,
        }
    }

    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, EngineError::ForbiddenPattern { .. })
    }

    /// Attaches the requesting specifier to a loader failure.
    pub fn from_load(specifier: &str, error: LoadError) -> Self {
        match error {
            LoadError::DomainNotAllowed { url, host } => EngineError::DomainNotAllowed {
                specifier: specifier.to_string(),
                url,
                host,
            },
            other => EngineError::DependencyLoad {
                specifier: specifier.to_string(),
                source: other,
            },
        }
    }
}

/// Failure of the multi-tier loader for one URL. `Clone` because one load
/// result is shared by every concurrent requester.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Invalid dependency URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Domain not allowed: '{host}' ({url})")]
    DomainNotAllowed { url: String, host: String },

    #[error("All loading strategies failed for {url}: import: {import}; script: {script}; fetch: {fetch}")]
    AllTiersFailed {
        url: String,
        import: String,
        script: String,
        fetch: String,
    },
}
