//! Module Registry
//!
//! Lazy, memoized map from normalized module name to exports object, built
//! fresh for every pass. A factory runs at most once: on a miss the exports
//! object is cached before the factory runs, so a module that re-enters
//! itself through an import cycle sees the partially populated object.
//!
//! Known limitation: there is no cycle detection or reordering. A cycle
//! whose top-level code reads the other side's exports during its own
//! initialization observes `undefined` for the side still initializing.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::host::{ModuleFactory, ModuleLinker, RuntimeValue};

/// Importer reported for lookups that come from the registry itself.
const REGISTRY_IMPORTER: &str = "module registry";

pub struct ModuleRegistry<V: RuntimeValue> {
    definitions: HashMap<String, Box<dyn ModuleFactory<V>>>,
    cache: RefCell<HashMap<String, V>>,
    make_exports: Box<dyn Fn() -> V>,
    instantiated: Cell<usize>,
}

impl<V: RuntimeValue> ModuleRegistry<V> {
    pub fn new(make_exports: impl Fn() -> V + 'static) -> Self {
        Self {
            definitions: HashMap::new(),
            cache: RefCell::new(HashMap::new()),
            make_exports: Box::new(make_exports),
            instantiated: Cell::new(0),
        }
    }

    pub fn define(&mut self, name: impl Into<String>, factory: Box<dyn ModuleFactory<V>>) {
        self.definitions.insert(name.into(), factory);
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cached exports without instantiating.
    pub fn cached(&self, name: &str) -> Option<V> {
        self.cache.borrow().get(name).cloned()
    }

    /// How many factories have run.
    pub fn instantiated_count(&self) -> usize {
        self.instantiated.get()
    }

    fn instantiate(&self, name: &str) -> Result<V, EngineError> {
        let factory = self
            .definitions
            .get(name)
            .ok_or_else(|| EngineError::ModuleNotFound {
                specifier: name.to_string(),
                importer: REGISTRY_IMPORTER.to_string(),
            })?;

        let exports = (self.make_exports)();
        self.cache
            .borrow_mut()
            .insert(name.to_string(), exports.clone());
        self.instantiated.set(self.instantiated.get() + 1);
        tracing::debug!(module = name, "instantiating module");

        // No cache borrow may be held here; the factory re-enters get_module.
        let result = factory.instantiate(exports, self);

        let value = match result {
            Ok(value) if value.is_object_like() => value,
            Ok(value) => {
                self.cache.borrow_mut().remove(name);
                return Err(EngineError::Instantiation {
                    module: name.to_string(),
                    message: format!(
                        "factory returned {} instead of an object",
                        value.kind().as_str()
                    ),
                });
            }
            Err(err) => {
                self.cache.borrow_mut().remove(name);
                return Err(match err {
                    nested @ (EngineError::Instantiation { .. }
                    | EngineError::ModuleNotFound { .. }) => nested,
                    other => EngineError::Instantiation {
                        module: name.to_string(),
                        message: other.to_string(),
                    },
                });
            }
        };
        self.cache
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }
}

impl<V: RuntimeValue> ModuleLinker<V> for ModuleRegistry<V> {
    fn get_module(&self, name: &str) -> Result<V, EngineError> {
        if let Some(cached) = self.cached(name) {
            tracing::debug!(module = name, "module cache hit");
            return Ok(cached);
        }
        self.instantiate(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::boxed_factory;
    use crate::inert::InertValue;
    use std::rc::Rc;

    fn registry() -> ModuleRegistry<InertValue> {
        ModuleRegistry::new(InertValue::object)
    }

    #[test]
    fn test_factory_runs_once() {
        let runs = Rc::new(Cell::new(0));
        let mut registry = registry();
        let counter = runs.clone();
        registry.define(
            "Button",
            boxed_factory(move |exports: InertValue, _| {
                counter.set(counter.get() + 1);
                exports.set("default", InertValue::function("Button", "function Button() {}"));
                Ok(exports)
            }),
        );

        let first = registry.get_module("Button").unwrap();
        let second = registry.get_module("Button").unwrap();
        assert!(first.same_value(&second));
        assert_eq!(runs.get(), 1);
        assert_eq!(registry.instantiated_count(), 1);
    }

    #[test]
    fn test_unknown_module() {
        let err = registry().get_module("Missing").unwrap_err();
        match err {
            EngineError::ModuleNotFound { specifier, .. } => assert_eq!(specifier, "Missing"),
            other => panic!("expected module not found, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_result_rejected() {
        let mut registry = registry();
        registry.define(
            "Bad",
            boxed_factory(|_: InertValue, _| Ok(InertValue::number(3.0))),
        );
        let err = registry.get_module("Bad").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_INSTANTIATION);
        assert!(err.to_string().contains("Bad"));
        assert!(registry.cached("Bad").is_none());
    }

    #[test]
    fn test_factory_error_wrapped_with_module_name() {
        let mut registry = registry();
        registry.define(
            "Throws",
            boxed_factory(|_: InertValue, _| {
                Err(EngineError::Internal("boom".to_string()))
            }),
        );
        match registry.get_module("Throws").unwrap_err() {
            EngineError::Instantiation { module, message } => {
                assert_eq!(module, "Throws");
                assert!(message.contains("boom"));
            }
            other => panic!("expected instantiation error, got {:?}", other),
        }
    }

    #[test]
    fn test_reentry_sees_partial_exports() {
        let mut registry = registry();
        registry.define(
            "a",
            boxed_factory(|exports: InertValue, linker| {
                let b = linker.get_module("b")?;
                exports.set("fromB", b.get("value"));
                exports.set("value", InertValue::string("A"));
                Ok(exports)
            }),
        );
        registry.define(
            "b",
            boxed_factory(|exports: InertValue, linker| {
                let a = linker.get_module("a")?;
                exports.set("fromA", a.get("value"));
                exports.set("value", InertValue::string("B"));
                Ok(exports)
            }),
        );

        let a = registry.get_module("a").unwrap();
        let b = registry.get_module("b").unwrap();
        assert_eq!(a.get("fromB").as_string().as_deref(), Some("B"));
        assert!(b.get("fromA").is_undefined());
        assert_eq!(registry.instantiated_count(), 2);
    }
}
