//! Security Scanner
//!
//! A raw-text blocklist checked against every file before any parsing or
//! transformation. This is advisory, not containment: a pattern inside a
//! comment or string literal still matches (false positive), and trivially
//! obfuscated code (`window["ev" + "al"]`) does not (false negative). The
//! bypass flag exists so a user can explicitly continue after a rejection.

use regex::Regex;

use crate::error::EngineError;
use crate::model::SourceBatch;

#[derive(Debug, Clone)]
pub struct SecurityScanner {
    patterns: Vec<Regex>,
}

impl SecurityScanner {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// Compiles caller-supplied pattern sources. An invalid pattern is a
    /// configuration error, never silently skipped.
    pub fn from_sources<S: AsRef<str>>(sources: &[S]) -> Result<Self, EngineError> {
        let mut patterns = Vec::with_capacity(sources.len());
        for source in sources {
            let source = source.as_ref();
            let regex = Regex::new(source).map_err(|e| {
                EngineError::Config(format!("invalid forbidden pattern `{}`: {}", source, e))
            })?;
            patterns.push(regex);
        }
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    /// Tests every pattern against every file; the first match rejects the
    /// batch unless `bypass` is set.
    pub fn scan(&self, batch: &SourceBatch, bypass: bool) -> Result<(), EngineError> {
        if bypass {
            tracing::warn!("security scan bypassed by caller");
            return Ok(());
        }
        for file in batch.files() {
            for pattern in &self.patterns {
                if pattern.is_match(&file.content) {
                    tracing::warn!(file = %file.name, pattern = %pattern.as_str(), "forbidden pattern detected");
                    return Err(EngineError::ForbiddenPattern {
                        file: file.name.clone(),
                        pattern: pattern.as_str().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FORBIDDEN_PATTERNS;
    use crate::model::SourceFile;

    fn default_scanner() -> SecurityScanner {
        SecurityScanner::from_sources(DEFAULT_FORBIDDEN_PATTERNS).unwrap()
    }

    #[test]
    fn test_cookie_access_rejected() {
        let batch = SourceBatch::new(vec![
            SourceFile::entry("App.tsx", "export default function App() { return null; }"),
            SourceFile::new("steal.ts", "export const c = document.cookie;"),
        ]);
        match default_scanner().scan(&batch, false) {
            Err(EngineError::ForbiddenPattern { file, pattern }) => {
                assert_eq!(file, "steal.ts");
                assert!(pattern.contains("cookie"));
            }
            other => panic!("expected policy rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_bypass_skips_scan() {
        let batch = SourceBatch::from_source("const c = document.cookie;");
        assert!(default_scanner().scan(&batch, true).is_ok());
    }

    #[test]
    fn test_clean_source_passes() {
        let batch = SourceBatch::from_source(
            "export default function Counter() { const [n, setN] = useState(0); return n; }",
        );
        assert!(default_scanner().scan(&batch, false).is_ok());
    }

    #[test]
    fn test_comment_still_matches() {
        // Documented limitation: raw text, no syntax awareness.
        let batch = SourceBatch::from_source("// never touch localStorage here\nexport default 1;");
        assert!(default_scanner().scan(&batch, false).is_err());
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = SecurityScanner::from_sources(&["(unclosed"]).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_CONFIG);
    }
}
