//! Execution Host
//!
//! Owns one pipeline: scan → analyze → resolve dependencies → transform →
//! register factories → instantiate the entry → pick the component. The
//! result of every pass is a structured [`ExecutionResult`]; errors and
//! panics never escape [`ExecutionHost::execute`].
//!
//! There is no cancellation. A request whose fingerprint equals the last
//! completed pass returns the current state without running; otherwise the
//! pass runs and its result replaces the state when it finishes, so an
//! older, slower pass can overwrite a newer one.
//!
//! Passes must be polled inside a tokio runtime with the time driver
//! enabled: the loader's script tier times out through `tokio::time`.

use futures::FutureExt;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use crate::config::EngineOptions;
use crate::entry::{resolve_component, ComponentPredicate, HeuristicComponentPredicate};
use crate::error::EngineError;
use crate::fetch::{ReqwestFetcher, TextFetcher};
use crate::host::{ModuleLinker, ModuleScope, RuntimeValue, ScriptHost};
use crate::loader::{ModuleLoader, SharedDependencyCache};
use crate::model::{Diagnostic, SourceBatch, SourceFile, WARN_FRAMEWORK_PRIMITIVE};
use crate::registry::ModuleRegistry;
use crate::resolver::{DependencyResolver, ManualDependency};
use crate::security::SecurityScanner;
use crate::transform::{analyze_batch, transform_batch, TransformOutput};

/// Framework members every component is assumed to be able to use.
pub const FRAMEWORK_PRIMITIVES: &[&str] = &[
    "createElement",
    "Fragment",
    "useState",
    "useEffect",
    "useRef",
    "useMemo",
    "useCallback",
];

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST / RESULT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ExecutionRequest<V> {
    pub batch: SourceBatch,
    pub dependencies: BTreeMap<String, ManualDependency<V>>,
    pub bypass_security: bool,
}

impl<V> ExecutionRequest<V> {
    pub fn new(batch: impl Into<SourceBatch>) -> Self {
        Self {
            batch: batch.into(),
            dependencies: BTreeMap::new(),
            bypass_security: false,
        }
    }

    pub fn from_source(code: impl Into<String>) -> Self {
        Self::new(SourceBatch::from_source(code))
    }

    pub fn with_dependency(mut self, name: impl Into<String>, dependency: ManualDependency<V>) -> Self {
        self.dependencies.insert(name.into(), dependency);
        self
    }

    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass_security = bypass;
        self
    }

    /// SHA-256 over files, dependency names and URLs, and the bypass flag.
    /// Value dependencies contribute only their name.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for file in self.batch.files() {
            hasher.update(b"file\0");
            hasher.update(file.name.as_bytes());
            hasher.update([0, file.is_entry as u8]);
            hasher.update(file.content.as_bytes());
            hasher.update([0]);
        }
        for (name, dependency) in &self.dependencies {
            hasher.update(b"dep\0");
            hasher.update(name.as_bytes());
            match dependency {
                ManualDependency::Value(_) => hasher.update(b"\0value"),
                ManualDependency::Url(url) => {
                    hasher.update(b"\0url\0");
                    hasher.update(url.as_bytes());
                }
                ManualDependency::Literal(text) => {
                    hasher.update(b"\0literal\0");
                    hasher.update(text.as_bytes());
                }
            }
            hasher.update([0]);
        }
        hasher.update([self.bypass_security as u8]);
        format!("{:x}", hasher.finalize())
    }
}

impl<V> From<Vec<SourceFile>> for ExecutionRequest<V> {
    fn from(files: Vec<SourceFile>) -> Self {
        Self::new(files)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult<V> {
    pub component: Option<V>,
    pub error: Option<String>,
    pub error_code: Option<&'static str>,
    /// Set when the security gate rejected the batch; the caller may offer
    /// [`ExecutionHost::continue_anyway`].
    pub forbidden_pattern_detected: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl<V> Default for ExecutionResult<V> {
    fn default() -> Self {
        Self {
            component: None,
            error: None,
            error_code: None,
            forbidden_pattern_detected: false,
            diagnostics: Vec::new(),
        }
    }
}

impl<V> ExecutionResult<V> {
    fn success(component: V, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            component: Some(component),
            diagnostics,
            ..Self::default()
        }
    }

    fn failure(error: &EngineError, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            component: None,
            error: Some(error.to_string()),
            error_code: Some(error.code()),
            forbidden_pattern_detected: error.is_policy_rejection(),
            diagnostics,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.component.is_some() && self.error.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ExecutionHost<H: ScriptHost> {
    host: Rc<H>,
    options: EngineOptions,
    scanner: SecurityScanner,
    fetcher: Option<Rc<dyn TextFetcher>>,
    cache: Option<SharedDependencyCache<H::Value>>,
    loader: ModuleLoader<H>,
    predicate: Rc<dyn ComponentPredicate<H::Value>>,
    on_error: Option<Rc<dyn Fn(&EngineError)>>,
    state: RefCell<ExecutionResult<H::Value>>,
    last_fingerprint: RefCell<Option<String>>,
    last_rejected: RefCell<Option<ExecutionRequest<H::Value>>>,
    last_output: RefCell<Option<Rc<TransformOutput>>>,
}

impl<H: ScriptHost> ExecutionHost<H> {
    /// Fails only on configuration errors (an invalid forbidden pattern).
    pub fn new(host: Rc<H>, options: EngineOptions) -> Result<Self, EngineError> {
        let scanner = SecurityScanner::from_sources(&options.forbidden_patterns)?;
        let fetcher: Option<Rc<dyn TextFetcher>> = match ReqwestFetcher::new() {
            Ok(fetcher) => Some(Rc::new(fetcher)),
            Err(e) => {
                tracing::warn!(error = %e, "HTTP fetcher unavailable; text loading tier disabled");
                None
            }
        };
        let loader = ModuleLoader::new(Rc::clone(&host), &options, fetcher.clone(), None);
        Ok(Self {
            host,
            options,
            scanner,
            fetcher,
            cache: None,
            loader,
            predicate: Rc::new(HeuristicComponentPredicate),
            on_error: None,
            state: RefCell::new(ExecutionResult::default()),
            last_fingerprint: RefCell::new(None),
            last_rejected: RefCell::new(None),
            last_output: RefCell::new(None),
        })
    }

    fn rebuild_loader(mut self) -> Self {
        self.loader = ModuleLoader::new(
            Rc::clone(&self.host),
            &self.options,
            self.fetcher.clone(),
            self.cache.clone(),
        );
        self
    }

    pub fn with_fetcher(mut self, fetcher: Rc<dyn TextFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self.rebuild_loader()
    }

    pub fn without_fetcher(mut self) -> Self {
        self.fetcher = None;
        self.rebuild_loader()
    }

    pub fn with_dependency_cache(mut self, cache: SharedDependencyCache<H::Value>) -> Self {
        self.cache = Some(cache);
        self.rebuild_loader()
    }

    pub fn with_component_predicate(
        mut self,
        predicate: impl ComponentPredicate<H::Value> + 'static,
    ) -> Self {
        self.predicate = Rc::new(predicate);
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&EngineError) + 'static) -> Self {
        self.on_error = Some(Rc::new(callback));
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn loader(&self) -> &ModuleLoader<H> {
        &self.loader
    }

    pub fn state(&self) -> ExecutionResult<H::Value> {
        self.state.borrow().clone()
    }

    /// Compiled modules of the last pass that got through transformation.
    pub fn last_output(&self) -> Option<Rc<TransformOutput>> {
        self.last_output.borrow().clone()
    }

    pub fn has_pending_rejection(&self) -> bool {
        self.last_rejected.borrow().is_some()
    }

    /// Re-runs the last policy-rejected request with scanning disabled.
    pub async fn continue_anyway(&self) -> ExecutionResult<H::Value> {
        let rejected = self.last_rejected.borrow_mut().take();
        match rejected {
            Some(request) => self.execute(request.with_bypass(true)).await,
            None => self.state(),
        }
    }

    pub async fn execute(&self, request: ExecutionRequest<H::Value>) -> ExecutionResult<H::Value> {
        let fingerprint = request.fingerprint();
        if self.last_fingerprint.borrow().as_deref() == Some(fingerprint.as_str()) {
            tracing::debug!("inputs unchanged since last pass");
            return self.state();
        }

        let mut diagnostics = Vec::new();
        let outcome = AssertUnwindSafe(self.run_pass(&request, &mut diagnostics))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(component)) => ExecutionResult::success(component, diagnostics),
            Ok(Err(error)) => self.fail(&error, diagnostics),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "pass panicked".to_string());
                self.fail(&EngineError::Internal(message), Vec::new())
            }
        };

        // Only the most recent pass may be continued.
        *self.last_rejected.borrow_mut() = result.forbidden_pattern_detected.then_some(request);
        *self.state.borrow_mut() = result.clone();
        *self.last_fingerprint.borrow_mut() = Some(fingerprint);
        result
    }

    fn fail(&self, error: &EngineError, diagnostics: Vec<Diagnostic>) -> ExecutionResult<H::Value> {
        tracing::error!(code = error.code(), error = %error, "pass failed");
        if let Some(callback) = &self.on_error {
            callback(error);
        }
        ExecutionResult::failure(error, diagnostics)
    }

    async fn run_pass(
        &self,
        request: &ExecutionRequest<H::Value>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<H::Value, EngineError> {
        let batch = &request.batch;
        self.scanner.scan(batch, request.bypass_security)?;

        let analyses = analyze_batch(batch)?;

        let resolver = DependencyResolver::new(Rc::clone(&self.host), &self.loader, &self.options);
        let resolved = resolver.resolve(batch, &request.dependencies).await?;
        diagnostics.extend(resolved.diagnostics);

        let output = Rc::new(transform_batch(
            batch,
            &analyses,
            &self.options.framework_specifiers,
            &resolved.table,
        )?);
        diagnostics.extend(output.diagnostics.iter().cloned());
        *self.last_output.borrow_mut() = Some(Rc::clone(&output));

        let framework = self.host.framework();
        diagnostics.extend(check_framework_primitives(&framework));

        let scope = Rc::new(ModuleScope {
            framework,
            dependencies: resolved.values,
        });
        let host = Rc::clone(&self.host);
        let mut registry = ModuleRegistry::new(move || host.new_object());
        for module in &output.modules {
            let factory = self
                .host
                .compile(module, Rc::clone(&scope))
                .map_err(|message| EngineError::Transform {
                    file: module.file_name.clone(),
                    message,
                })?;
            registry.define(module.name.clone(), factory);
        }

        let entry = output
            .entry_module()
            .ok_or_else(|| EngineError::Internal("entry module missing from output".to_string()))?;
        let exports = registry.get_module(&entry.name)?;
        let component = resolve_component(&entry.name, &exports, &entry.export_info, &*self.predicate)?;
        tracing::debug!(
            entry = %entry.name,
            modules = output.modules.len(),
            instantiated = registry.instantiated_count(),
            "pass complete"
        );
        Ok(component)
    }
}

/// Warns about standard primitives missing from the framework object.
pub fn check_framework_primitives<V: RuntimeValue>(framework: &V) -> Vec<Diagnostic> {
    let missing: Vec<&str> = FRAMEWORK_PRIMITIVES
        .iter()
        .copied()
        .filter(|name| framework.get(name).is_undefined())
        .collect();
    if missing.is_empty() {
        return Vec::new();
    }
    tracing::warn!(missing = ?missing, "framework object lacks standard primitives");
    vec![Diagnostic::new(
        WARN_FRAMEWORK_PRIMITIVE,
        format!("Framework object is missing: {}", missing.join(", ")),
        None,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inert::{InertHost, InertValue};

    #[test]
    fn test_fingerprint_covers_inputs() {
        let base: ExecutionRequest<InertValue> = ExecutionRequest::from_source("export default 1;");
        let same: ExecutionRequest<InertValue> = ExecutionRequest::from_source("export default 1;");
        assert_eq!(base.fingerprint(), same.fingerprint());
        assert_ne!(base.fingerprint(), base.clone().with_bypass(true).fingerprint());
        assert_ne!(
            base.fingerprint(),
            base.clone()
                .with_dependency("clsx", ManualDependency::from_string("https://esm.sh/clsx"))
                .fingerprint()
        );
    }

    #[test]
    fn test_missing_primitives_warn() {
        let framework = InertValue::object_from([("createElement", InertValue::function("createElement", ""))]);
        let diagnostics = check_framework_primitives(&framework);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("useState"));
        assert!(check_framework_primitives(&crate::inert::inert_framework()).is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_construction_error() {
        let options = EngineOptions {
            forbidden_patterns: vec!["(".to_string()],
            ..EngineOptions::default()
        };
        assert!(ExecutionHost::new(Rc::new(InertHost::new()), options).is_err());
    }
}
