//! Engine configuration.
//!
//! Options arrive as camelCase JSON from the host application (or are built
//! in Rust). Every field has a default, so `{}` is a valid document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::EngineError;

/// Hosts trusted to serve dependency modules.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "esm.sh",
    "cdn.jsdelivr.net",
    "unpkg.com",
    "cdn.skypack.dev",
    "ga.jspm.io",
];

/// Raw-text blocklist applied before any transformation. These are policy
/// defaults, not engine logic; callers replace them through
/// `forbiddenPatterns`.
pub const DEFAULT_FORBIDDEN_PATTERNS: &[&str] = &[
    r"document\.cookie",
    r"\blocalStorage\b",
    r"\bsessionStorage\b",
    r"\bindexedDB\b",
    r"\beval\s*\(",
    r"new\s+Function\s*\(",
    r"window\.(?:parent|top|opener)\b",
    r"navigator\.sendBeacon",
    r"\bXMLHttpRequest\b",
    r"parent\.postMessage",
];

pub const DEFAULT_FRAMEWORK_SPECIFIERS: &[&str] = &["react"];

pub const DEFAULT_SCRIPT_LOAD_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineOptions {
    pub forbidden_patterns: Vec<String>,
    pub enable_auto_dependencies: bool,
    /// Name → URL entries layered over the built-in registry.
    pub custom_dependency_registry: BTreeMap<String, String>,
    pub allowed_domains: Vec<String>,
    /// Specifiers that resolve to the host UI framework object.
    pub framework_specifiers: Vec<String>,
    pub script_load_timeout_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            forbidden_patterns: DEFAULT_FORBIDDEN_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            enable_auto_dependencies: true,
            custom_dependency_registry: BTreeMap::new(),
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            framework_specifiers: DEFAULT_FRAMEWORK_SPECIFIERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            script_load_timeout_ms: DEFAULT_SCRIPT_LOAD_TIMEOUT_MS,
        }
    }
}

impl EngineOptions {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("options parse error: {}", e)))
    }

    pub fn script_load_timeout(&self) -> Duration {
        Duration::from_millis(self.script_load_timeout_ms)
    }

    pub fn is_framework_specifier(&self, specifier: &str) -> bool {
        self.framework_specifiers.iter().any(|s| s == specifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let options = EngineOptions::from_json("{}").unwrap();
        assert_eq!(options, EngineOptions::default());
        assert!(options.enable_auto_dependencies);
        assert!(options.allowed_domains.contains(&"esm.sh".to_string()));
    }

    #[test]
    fn test_partial_document() {
        let options = EngineOptions::from_json(
            r#"{
                "enableAutoDependencies": false,
                "customDependencyRegistry": { "confetti": "https://esm.sh/canvas-confetti" },
                "allowedDomains": ["cdn.example.com"]
            }"#,
        )
        .unwrap();
        assert!(!options.enable_auto_dependencies);
        assert_eq!(options.allowed_domains, vec!["cdn.example.com".to_string()]);
        assert_eq!(
            options.custom_dependency_registry.get("confetti").map(String::as_str),
            Some("https://esm.sh/canvas-confetti")
        );
        assert_eq!(options.script_load_timeout_ms, DEFAULT_SCRIPT_LOAD_TIMEOUT_MS);
    }

    #[test]
    fn test_malformed_document_is_config_error() {
        let err = EngineOptions::from_json("{ not json").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_CONFIG);
    }
}
