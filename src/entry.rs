//! Entry Component Resolver
//!
//! Picks "the component" out of the entry module's exports:
//!
//! 1. `default`, if callable
//! 2. else the first own property, in insertion order, that the
//!    [`ComponentPredicate`] accepts
//!
//! This is approximate and order dependent, not a type check. The predicate
//! is the single place to plug in a stricter framework-provided test.

use crate::error::EngineError;
use crate::host::RuntimeValue;
use crate::model::{starts_with_uppercase, ExportInfo};

/// Substrings of compiled function source that indicate rendered output.
pub const RENDER_MARKERS: &[&str] = &[
    "createElement(",
    "jsx(",
    "jsxs(",
    "jsxDEV(",
    "React.Fragment",
];

pub trait ComponentPredicate<V: RuntimeValue> {
    fn is_component(&self, key: &str, value: &V) -> bool;
}

/// Callable, and either named with an uppercase initial or visibly
/// producing elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicComponentPredicate;

impl<V: RuntimeValue> ComponentPredicate<V> for HeuristicComponentPredicate {
    fn is_component(&self, key: &str, value: &V) -> bool {
        if !value.is_callable() {
            return false;
        }
        let name = value.function_name().unwrap_or_else(|| key.to_string());
        if starts_with_uppercase(&name) {
            return true;
        }
        value
            .source_text()
            .map_or(false, |source| RENDER_MARKERS.iter().any(|m| source.contains(m)))
    }
}

pub fn resolve_component<V: RuntimeValue>(
    module: &str,
    exports: &V,
    export_info: &ExportInfo,
    predicate: &dyn ComponentPredicate<V>,
) -> Result<V, EngineError> {
    let default = exports.get("default");
    if default.is_callable() {
        return Ok(default);
    }

    let keys = exports.own_keys();
    for key in &keys {
        if key == "default" {
            continue;
        }
        let value = exports.get(key);
        if predicate.is_component(key, &value) {
            tracing::debug!(module, export = %key, "component resolved from named export");
            return Ok(value);
        }
    }

    Err(EngineError::NoComponent {
        module: module.to_string(),
        exports: keys,
        auto_exported: export_info.auto_exported.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inert::InertValue;

    fn resolve(exports: &InertValue) -> Result<InertValue, EngineError> {
        resolve_component("App", exports, &ExportInfo::default(), &HeuristicComponentPredicate)
    }

    #[test]
    fn test_callable_default_wins() {
        let app = InertValue::function("app", "function app() { return 1; }");
        let exports = InertValue::object_from([
            ("Header", InertValue::function("Header", "")),
            ("default", app.clone()),
        ]);
        assert!(resolve(&exports).unwrap().same_value(&app));
    }

    #[test]
    fn test_first_uppercase_named_export() {
        let exports = InertValue::object_from([
            ("helper", InertValue::function("helper", "function helper() { return 1; }")),
            ("VERSION", InertValue::string("1.0")),
            ("Card", InertValue::function("Card", "")),
            ("Panel", InertValue::function("Panel", "")),
        ]);
        assert_eq!(resolve(&exports).unwrap().function_name().as_deref(), Some("Card"));
    }

    #[test]
    fn test_lowercase_function_with_render_marker() {
        let exports = InertValue::object_from([(
            "view",
            InertValue::function("view", "function view() { return React.createElement(\"p\", null); }"),
        )]);
        assert!(resolve(&exports).is_ok());
    }

    #[test]
    fn test_no_component_lists_exports() {
        let exports = InertValue::object_from([
            ("helper", InertValue::function("helper", "function helper() {}")),
            ("count", InertValue::number(1.0)),
        ]);
        match resolve(&exports).unwrap_err() {
            EngineError::NoComponent { module, exports, .. } => {
                assert_eq!(module, "App");
                assert_eq!(exports, vec!["helper", "count"]);
            }
            other => panic!("expected no component, got {:?}", other),
        }
    }
}
