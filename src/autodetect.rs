//! Dependency auto-detection.
//!
//! Fast specifier sniffing over raw source text, matched against a name→URL
//! registry. This runs before any parse, so it is text based; anything it
//! finds that is not in the registry is ignored here and reported later by
//! the import rewriter if actually imported.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::config::EngineOptions;
use crate::model::{is_relative_specifier, SourceBatch};
use crate::resolver::key_covers;

lazy_static! {
    static ref IMPORT_FROM: Regex =
        Regex::new(r#"(?m)\b(?:import|export)\s[^'";]*?\bfrom\s*['"]([^'"]+)['"]"#).unwrap();
    static ref SIDE_EFFECT_IMPORT: Regex = Regex::new(r#"(?m)\bimport\s*['"]([^'"]+)['"]"#).unwrap();
    static ref DYNAMIC_IMPORT: Regex = Regex::new(r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap();
    static ref REQUIRE_CALL: Regex = Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap();

    /// Built-in package → ES module URL table.
    pub static ref BUILTIN_REGISTRY: BTreeMap<&'static str, &'static str> = {
        let mut m = BTreeMap::new();
        m.insert("framer-motion", "https://esm.sh/framer-motion@11");
        m.insert("lucide-react", "https://esm.sh/lucide-react@0.400.0");
        m.insert("clsx", "https://esm.sh/clsx@2");
        m.insert("classnames", "https://esm.sh/classnames@2");
        m.insert("date-fns", "https://esm.sh/date-fns@3");
        m.insert("dayjs", "https://esm.sh/dayjs@1");
        m.insert("lodash", "https://esm.sh/lodash-es@4");
        m.insert("lodash-es", "https://esm.sh/lodash-es@4");
        m.insert("zustand", "https://esm.sh/zustand@4");
        m.insert("recharts", "https://esm.sh/recharts@2");
        m.insert("canvas-confetti", "https://esm.sh/canvas-confetti@1");
        m.insert("uuid", "https://esm.sh/uuid@9");
        m.insert("nanoid", "https://esm.sh/nanoid@5");
        m.insert("axios", "https://esm.sh/axios@1");
        m.insert("d3", "https://esm.sh/d3@7");
        m.insert("three", "https://esm.sh/three@0.160.0");
        m.insert("react-icons", "https://esm.sh/react-icons@5");
        m.insert("@heroicons/react", "https://esm.sh/@heroicons/react@2");
        m.insert("react-markdown", "https://esm.sh/react-markdown@9");
        m.insert("tailwind-merge", "https://esm.sh/tailwind-merge@2");
        m
    };
}

/// Every module specifier mentioned in `source`, first occurrence first.
pub fn sniff_specifiers(source: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for pattern in [&*IMPORT_FROM, &*SIDE_EFFECT_IMPORT, &*DYNAMIC_IMPORT, &*REQUIRE_CALL] {
        for caps in pattern.captures_iter(source) {
            if let Some(m) = caps.get(1) {
                found.push((m.start(), m.as_str().to_string()));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, s)| s)
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Package name of a deep import: `lodash/debounce` → `lodash`,
/// `@scope/pkg/sub` → `@scope/pkg`.
pub fn package_name(specifier: &str) -> &str {
    let mut parts = specifier.splitn(3, '/');
    let first = parts.next().unwrap_or(specifier);
    if first.starts_with('@') {
        match parts.next() {
            Some(second) => &specifier[..first.len() + 1 + second.len()],
            None => specifier,
        }
    } else {
        first
    }
}

/// Built-in table overlaid with caller-supplied entries.
pub fn merged_registry(options: &EngineOptions) -> BTreeMap<String, String> {
    let mut registry: BTreeMap<String, String> = BUILTIN_REGISTRY
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (name, url) in &options.custom_dependency_registry {
        registry.insert(name.clone(), url.clone());
    }
    registry
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedDependency {
    pub specifier: String,
    pub url: String,
}

/// Bare specifiers found in `batch` that the merged registry can serve.
///
/// Skips relative specifiers, framework specifiers, names of files in the
/// batch and anything a key in `exclude` (manually supplied names, possibly
/// `prefix/*` wildcards) would already serve.
pub fn detect_dependencies(
    batch: &SourceBatch,
    options: &EngineOptions,
    exclude: &HashSet<String>,
) -> Vec<DetectedDependency> {
    let registry = merged_registry(options);
    let local_names: HashSet<String> = batch.normalized_names().into_iter().collect();
    let mut seen = HashSet::new();
    let mut detected = Vec::new();

    for file in batch.files() {
        for specifier in sniff_specifiers(&file.content) {
            if is_relative_specifier(&specifier)
                || options.is_framework_specifier(&specifier)
                || local_names.contains(&specifier)
                || exclude.iter().any(|key| key_covers(key, &specifier))
                || !seen.insert(specifier.clone())
            {
                continue;
            }
            let url = registry
                .get(&specifier)
                .or_else(|| registry.get(package_name(&specifier)));
            match url {
                Some(url) => detected.push(DetectedDependency {
                    specifier,
                    url: url.clone(),
                }),
                None => tracing::debug!(specifier = %specifier, "no registry entry for specifier"),
            }
        }
    }
    detected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceFile;

    #[test]
    fn test_sniff_all_forms_in_order() {
        let source = r#"
import { motion } from 'framer-motion';
import "./styles.css";
const dayjs = require("dayjs");
const lazy = () => import('recharts');
export { x } from './x';
"#;
        assert_eq!(
            sniff_specifiers(source),
            vec!["framer-motion", "./styles.css", "dayjs", "recharts", "./x"]
        );
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("lodash/debounce"), "lodash");
        assert_eq!(package_name("@heroicons/react/24/solid"), "@heroicons/react");
        assert_eq!(package_name("clsx"), "clsx");
    }

    #[test]
    fn test_detect_uses_builtin_and_custom_registry() {
        let batch = SourceBatch::new(vec![
            SourceFile::entry(
                "App.tsx",
                "import React from 'react';\nimport { motion } from 'framer-motion';\nimport confetti from 'my-confetti';\nimport { x } from './utils';\nimport unknown from 'not-in-registry';",
            ),
            SourceFile::new("utils.ts", "export const x = 1;"),
        ]);
        let mut options = EngineOptions::default();
        options
            .custom_dependency_registry
            .insert("my-confetti".to_string(), "https://esm.sh/canvas-confetti".to_string());

        let detected = detect_dependencies(&batch, &options, &HashSet::new());
        assert_eq!(
            detected,
            vec![
                DetectedDependency {
                    specifier: "framer-motion".to_string(),
                    url: BUILTIN_REGISTRY["framer-motion"].to_string(),
                },
                DetectedDependency {
                    specifier: "my-confetti".to_string(),
                    url: "https://esm.sh/canvas-confetti".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_manual_names_excluded() {
        let batch = SourceBatch::from_source("import clsx from 'clsx';");
        let exclude: HashSet<String> = ["clsx".to_string()].into_iter().collect();
        assert!(detect_dependencies(&batch, &EngineOptions::default(), &exclude).is_empty());
    }

    #[test]
    fn test_manual_wildcard_excludes_covered_specifiers() {
        let batch = SourceBatch::from_source(
            "import debounce from 'lodash/debounce';\nimport { motion } from 'framer-motion';",
        );
        let exclude: HashSet<String> = ["lodash/*".to_string()].into_iter().collect();
        let detected = detect_dependencies(&batch, &EngineOptions::default(), &exclude);
        let specifiers: Vec<&str> = detected.iter().map(|d| d.specifier.as_str()).collect();
        assert_eq!(specifiers, vec!["framer-motion"]);
    }
}
