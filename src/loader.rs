//! Multi-tier Loader
//!
//! Loads one remote dependency module by URL. The host is checked against
//! the allow-list before anything else happens. Concurrent requests for the
//! same URL share one in-flight load; completed loads are memoized per
//! loader and copied into the optional external cache.
//!
//! Tiers, tried in order until one succeeds:
//!
//! 1. native dynamic import (`ScriptHost::import_module`)
//! 2. script injection onto a unique global, with a timeout and cleanup
//!    on every outcome
//! 3. raw text fetch, lexical export shim, host evaluation
//!
//! The script tier's timeout needs a tokio runtime with the time driver.

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use url::Url;

use crate::config::EngineOptions;
use crate::error::LoadError;
use crate::esm_shim::rewrite_esm_exports;
use crate::fetch::TextFetcher;
use crate::host::ScriptHost;

/// Prefix of the globals the script tier publishes modules on.
pub const SCRIPT_GLOBAL_PREFIX: &str = "__liveRenderModule_";

type SharedLoad<V> = Shared<LocalBoxFuture<'static, Result<V, LoadError>>>;

/// URL → loaded value cache shared across loaders and passes. Clones share
/// storage.
pub struct SharedDependencyCache<V> {
    entries: Rc<RefCell<HashMap<String, V>>>,
}

impl<V> Clone for SharedDependencyCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Rc::clone(&self.entries),
        }
    }
}

impl<V> Default for SharedDependencyCache<V> {
    fn default() -> Self {
        Self {
            entries: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

impl<V: Clone> SharedDependencyCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<V> {
        self.entries.borrow().get(url).cloned()
    }

    pub fn insert(&self, url: impl Into<String>, value: V) {
        self.entries.borrow_mut().insert(url.into(), value);
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.borrow().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// Exact host match, or a subdomain of an allowed entry.
pub fn is_allowed_host(host: &str, allowed_domains: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    allowed_domains.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
    })
}

/// Parses `url` and checks its host against the allow-list.
pub fn check_domain(url: &str, allowed_domains: &[String]) -> Result<(), LoadError> {
    let parsed = Url::parse(url).map_err(|e| LoadError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let host = parsed.host_str().ok_or_else(|| LoadError::InvalidUrl {
        url: url.to_string(),
        reason: "URL has no host".to_string(),
    })?;
    if is_allowed_host(host, allowed_domains) {
        Ok(())
    } else {
        Err(LoadError::DomainNotAllowed {
            url: url.to_string(),
            host: host.to_string(),
        })
    }
}

struct LoaderInner<H: ScriptHost> {
    host: Rc<H>,
    fetcher: Option<Rc<dyn TextFetcher>>,
    allowed_domains: Vec<String>,
    script_timeout: Duration,
    memo: RefCell<HashMap<String, H::Value>>,
    external: Option<SharedDependencyCache<H::Value>>,
    in_flight: RefCell<HashMap<String, SharedLoad<H::Value>>>,
    next_global: Cell<u64>,
}

/// Cheap to clone; clones share memo and in-flight state.
pub struct ModuleLoader<H: ScriptHost> {
    inner: Rc<LoaderInner<H>>,
}

impl<H: ScriptHost> Clone for ModuleLoader<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: ScriptHost> ModuleLoader<H> {
    pub fn new(
        host: Rc<H>,
        options: &EngineOptions,
        fetcher: Option<Rc<dyn TextFetcher>>,
        external: Option<SharedDependencyCache<H::Value>>,
    ) -> Self {
        Self {
            inner: Rc::new(LoaderInner {
                host,
                fetcher,
                allowed_domains: options.allowed_domains.clone(),
                script_timeout: options.script_load_timeout(),
                memo: RefCell::new(HashMap::new()),
                external,
                in_flight: RefCell::new(HashMap::new()),
                next_global: Cell::new(0),
            }),
        }
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.inner.allowed_domains
    }

    pub fn is_memoized(&self, url: &str) -> bool {
        self.inner.memo.borrow().contains_key(url)
    }

    pub async fn load(&self, url: &str) -> Result<H::Value, LoadError> {
        check_domain(url, &self.inner.allowed_domains)?;

        if let Some(cache) = &self.inner.external {
            if let Some(value) = cache.get(url) {
                tracing::debug!(url, "dependency served from external cache");
                return Ok(value);
            }
        }
        if let Some(value) = self.inner.memo.borrow().get(url).cloned() {
            tracing::debug!(url, "dependency cache hit");
            return Ok(value);
        }

        let shared = {
            let mut in_flight = self.inner.in_flight.borrow_mut();
            match in_flight.get(url) {
                Some(pending) => {
                    tracing::debug!(url, "joining in-flight dependency load");
                    pending.clone()
                }
                None => {
                    let inner = Rc::clone(&self.inner);
                    let owned = url.to_string();
                    let pending = async move { inner.load_tiers(&owned).await }
                        .boxed_local()
                        .shared();
                    in_flight.insert(url.to_string(), pending.clone());
                    pending
                }
            }
        };

        let result = shared.clone().await;
        {
            // A late waiter must not drop a newer load started after this one.
            let mut in_flight = self.inner.in_flight.borrow_mut();
            if in_flight.get(url).map_or(false, |pending| pending.ptr_eq(&shared)) {
                in_flight.remove(url);
            }
        }
        if let Ok(value) = &result {
            self.inner
                .memo
                .borrow_mut()
                .insert(url.to_string(), value.clone());
            if let Some(cache) = &self.inner.external {
                cache.insert(url, value.clone());
            }
        }
        result
    }
}

impl<H: ScriptHost> LoaderInner<H> {
    async fn load_tiers(&self, url: &str) -> Result<H::Value, LoadError> {
        tracing::debug!(url, "dependency cache miss, loading");

        let import = match self.host.import_module(url).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        tracing::debug!(url, error = %import, "native import failed, trying script injection");

        let script = match self.load_via_script(url).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        tracing::debug!(url, error = %script, "script injection failed, trying text fetch");

        let fetch = match self.load_via_text(url).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        tracing::warn!(url, %import, %script, %fetch, "all loading strategies failed");
        Err(LoadError::AllTiersFailed {
            url: url.to_string(),
            import,
            script,
            fetch,
        })
    }

    async fn load_via_script(&self, url: &str) -> Result<H::Value, String> {
        let id = self.next_global.get();
        self.next_global.set(id + 1);
        let global = format!("{}{}", SCRIPT_GLOBAL_PREFIX, id);

        let outcome =
            tokio::time::timeout(self.script_timeout, self.host.inject_script(url, &global)).await;
        self.host.remove_script(&global);

        match outcome {
            Ok(result) => result,
            Err(_) => Err(format!(
                "timed out after {}ms",
                self.script_timeout.as_millis()
            )),
        }
    }

    async fn load_via_text(&self, url: &str) -> Result<H::Value, String> {
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| "no text fetcher configured".to_string())?;
        let text = fetcher.fetch_text(url).await.map_err(|e| e.to_string())?;
        let code = rewrite_esm_exports(&text);
        self.host.evaluate_module_text(url, &code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_exact_and_subdomain_match() {
        let allowed = domains(&["esm.sh", "jsdelivr.net"]);
        assert!(is_allowed_host("esm.sh", &allowed));
        assert!(is_allowed_host("cdn.jsdelivr.net", &allowed));
        assert!(!is_allowed_host("evilesm.sh", &allowed));
        assert!(!is_allowed_host("esm.sh.evil.com", &allowed));
    }

    #[test]
    fn test_check_domain_errors() {
        let allowed = domains(&["esm.sh"]);
        assert!(check_domain("https://esm.sh/clsx", &allowed).is_ok());
        assert!(matches!(
            check_domain("https://evil.example/x.js", &allowed),
            Err(LoadError::DomainNotAllowed { host, .. }) if host == "evil.example"
        ));
        assert!(matches!(
            check_domain("not a url", &allowed),
            Err(LoadError::InvalidUrl { .. })
        ));
    }
}
