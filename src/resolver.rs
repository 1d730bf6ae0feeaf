//! Dependency Resolver
//!
//! Merges manual dependencies and auto-detected registry entries into the
//! values and safe names a pass binds. Manual entries always win. Every load
//! of a pass is issued together and joined before transformation starts.

use futures::future::{join, join_all};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use crate::autodetect::{detect_dependencies, DetectedDependency};
use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::host::ScriptHost;
use crate::loader::{check_domain, ModuleLoader};
use crate::model::{safe_variable_name, Diagnostic, SourceBatch, WARN_DEPENDENCY_SKIPPED};

/// Prefix keeping dependency bindings clear of user identifiers.
pub const DEPENDENCY_PREFIX: &str = "__dep_";

lazy_static! {
    static ref URL_SCHEME: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCY TABLE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyBinding {
    /// Key as supplied, possibly a `prefix/*` wildcard.
    pub specifier: String,
    pub safe_name: String,
}

/// Specifier → collision-free local name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTable {
    bindings: Vec<DependencyBinding>,
}

impl DependencyTable {
    pub fn from_specifiers<I>(specifiers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut table = Self::default();
        for specifier in specifiers {
            table.insert(specifier.into());
        }
        table
    }

    pub fn insert(&mut self, specifier: String) {
        if self.get(&specifier).is_some() {
            return;
        }
        let base = format!("{}{}", DEPENDENCY_PREFIX, safe_variable_name(&specifier));
        let mut safe_name = base.clone();
        let mut suffix = 2;
        while self.bindings.iter().any(|b| b.safe_name == safe_name) {
            safe_name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.bindings.push(DependencyBinding {
            specifier,
            safe_name,
        });
    }

    pub fn bindings(&self) -> &[DependencyBinding] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Exact key lookup.
    pub fn get(&self, specifier: &str) -> Option<&DependencyBinding> {
        self.bindings.iter().find(|b| b.specifier == specifier)
    }

    /// Exact key, else the longest `prefix/*` wildcard whose prefix the
    /// specifier starts with.
    pub fn lookup(&self, specifier: &str) -> Option<&DependencyBinding> {
        if let Some(exact) = self.get(specifier) {
            return Some(exact);
        }
        self.bindings
            .iter()
            .filter_map(|b| {
                let prefix = wildcard_prefix(&b.specifier)?;
                specifier.starts_with(prefix).then_some((prefix.len(), b))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, b)| b)
    }
}

/// `prefix/` of a `prefix/*` key.
fn wildcard_prefix(key: &str) -> Option<&str> {
    key.strip_suffix('*').filter(|prefix| prefix.ends_with('/'))
}

/// Whether a table key would serve `specifier`: equal, or a `prefix/*`
/// wildcard the specifier falls under.
pub fn key_covers(key: &str, specifier: &str) -> bool {
    key == specifier || wildcard_prefix(key).map_or(false, |prefix| specifier.starts_with(prefix))
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANUAL DEPENDENCIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum ManualDependency<V> {
    /// A runtime value supplied directly.
    Value(V),
    /// A remote module reference, loaded through the loader.
    Url(String),
    /// A plain string used as-is.
    Literal(String),
}

impl<V> ManualDependency<V> {
    /// Strings with a URL scheme are remote references; anything else is a
    /// literal.
    pub fn from_string(value: impl Into<String>) -> Self {
        let value = value.into();
        if is_url(&value) {
            ManualDependency::Url(value)
        } else {
            ManualDependency::Literal(value)
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ManualDependency::Url(url) => Some(url),
            _ => None,
        }
    }
}

pub fn is_url(value: &str) -> bool {
    URL_SCHEME.is_match(value)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ResolvedDependencies<V> {
    pub table: DependencyTable,
    /// Table key → value.
    pub values: HashMap<String, V>,
    pub detected: Vec<DetectedDependency>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct DependencyResolver<'r, H: ScriptHost> {
    host: Rc<H>,
    loader: &'r ModuleLoader<H>,
    options: &'r EngineOptions,
}

impl<'r, H: ScriptHost> DependencyResolver<'r, H> {
    pub fn new(host: Rc<H>, loader: &'r ModuleLoader<H>, options: &'r EngineOptions) -> Self {
        Self {
            host,
            loader,
            options,
        }
    }

    pub async fn resolve(
        &self,
        batch: &SourceBatch,
        manual: &BTreeMap<String, ManualDependency<H::Value>>,
    ) -> Result<ResolvedDependencies<H::Value>, EngineError> {
        // Domain policy for manual URLs is checked before any load is issued.
        for (name, dependency) in manual {
            if let Some(url) = dependency.url() {
                check_domain(url, self.loader.allowed_domains())
                    .map_err(|e| EngineError::from_load(name, e))?;
            }
        }

        let manual_names: HashSet<String> = manual.keys().cloned().collect();
        let detected = if self.options.enable_auto_dependencies {
            detect_dependencies(batch, self.options, &manual_names)
        } else {
            Vec::new()
        };

        let manual_loads = manual.iter().map(|(name, dependency)| async move {
            let value = match dependency {
                ManualDependency::Value(value) => Ok(value.clone()),
                ManualDependency::Literal(text) => Ok(self.host.string_value(text)),
                ManualDependency::Url(url) => self
                    .loader
                    .load(url)
                    .await
                    .map_err(|e| EngineError::from_load(name, e)),
            };
            (name.clone(), value)
        });
        let auto_loads = detected.iter().map(|dependency| async move {
            (dependency, self.loader.load(&dependency.url).await)
        });
        let (manual_results, auto_results) =
            join(join_all(manual_loads), join_all(auto_loads)).await;

        let mut table = DependencyTable::default();
        let mut values = HashMap::new();
        let mut diagnostics = Vec::new();

        for (name, result) in manual_results {
            let value = result?;
            table.insert(name.clone());
            values.insert(name, value);
        }
        for (dependency, result) in auto_results {
            match result {
                Ok(value) => {
                    tracing::debug!(specifier = %dependency.specifier, url = %dependency.url, "auto-detected dependency loaded");
                    table.insert(dependency.specifier.clone());
                    values.insert(dependency.specifier.clone(), value);
                }
                Err(err) => {
                    tracing::warn!(specifier = %dependency.specifier, error = %err, "skipping auto-detected dependency");
                    diagnostics.push(Diagnostic::new(
                        WARN_DEPENDENCY_SKIPPED,
                        format!(
                            "Auto-detected dependency '{}' could not be loaded: {}",
                            dependency.specifier, err
                        ),
                        None,
                    ));
                }
            }
        }

        Ok(ResolvedDependencies {
            table,
            values,
            detected,
            diagnostics,
        })
    }
}
