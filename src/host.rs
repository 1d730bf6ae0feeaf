//! Runtime capability interfaces.
//!
//! The engine never evaluates JavaScript itself. Everything that needs a
//! runtime (compiling factory source, reading exports objects, the remote
//! loader tiers) goes through a [`ScriptHost`], so the same pipeline runs
//! against a real JS engine, a browser bridge, or the non-evaluating
//! [`crate::inert::InertHost`].

use futures::future::LocalBoxFuture;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::EngineError;
use crate::transform::CompiledModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Function,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Object => "object",
            ValueKind::Function => "function",
        }
    }
}

/// A handle to a value living in the host runtime.
pub trait RuntimeValue: Clone + 'static {
    fn kind(&self) -> ValueKind;

    /// Property read; absent properties read as undefined.
    fn get(&self, key: &str) -> Self;

    /// Own enumerable keys in insertion order.
    fn own_keys(&self) -> Vec<String>;

    /// Declared name of a function value.
    fn function_name(&self) -> Option<String>;

    /// Source text of a function value, when the runtime exposes it.
    fn source_text(&self) -> Option<String>;

    /// Reference equality.
    fn same_value(&self, other: &Self) -> bool;

    fn is_callable(&self) -> bool {
        self.kind() == ValueKind::Function
    }

    fn is_undefined(&self) -> bool {
        self.kind() == ValueKind::Undefined
    }

    /// Objects and functions; what an exports object may be.
    fn is_object_like(&self) -> bool {
        matches!(self.kind(), ValueKind::Object | ValueKind::Function)
    }
}

/// Gives a running factory access to sibling modules.
pub trait ModuleLinker<V> {
    fn get_module(&self, name: &str) -> Result<V, EngineError>;
}

/// A compiled module, ready to run once.
pub trait ModuleFactory<V> {
    /// Populates `exports` and returns the module's exports value.
    fn instantiate(&self, exports: V, linker: &dyn ModuleLinker<V>) -> Result<V, EngineError>;
}

impl<V, F> ModuleFactory<V> for F
where
    F: Fn(V, &dyn ModuleLinker<V>) -> Result<V, EngineError>,
{
    fn instantiate(&self, exports: V, linker: &dyn ModuleLinker<V>) -> Result<V, EngineError> {
        self(exports, linker)
    }
}

/// Boxes a closure as a factory, fixing its signature for inference.
pub fn boxed_factory<V, F>(factory: F) -> Box<dyn ModuleFactory<V>>
where
    V: 'static,
    F: Fn(V, &dyn ModuleLinker<V>) -> Result<V, EngineError> + 'static,
{
    Box::new(factory)
}

/// Bindings every factory of one pass closes over.
pub struct ModuleScope<V> {
    pub framework: V,
    /// Dependency table key → loaded value.
    pub dependencies: HashMap<String, V>,
}

pub trait ScriptHost: 'static {
    type Value: RuntimeValue;

    /// The host UI framework object bound as `React` in every factory.
    fn framework(&self) -> Self::Value;

    /// A fresh empty object.
    fn new_object(&self) -> Self::Value;

    fn string_value(&self, value: &str) -> Self::Value;

    /// Compiles one module's factory. Hosts that forbid dynamic evaluation
    /// may instantiate from `module.shell` instead of `module.factory_source`.
    fn compile(
        &self,
        module: &CompiledModule,
        scope: Rc<ModuleScope<Self::Value>>,
    ) -> Result<Box<dyn ModuleFactory<Self::Value>>, String>;

    /// Loader tier (a): native dynamic module import.
    fn import_module(&self, url: &str) -> LocalBoxFuture<'static, Result<Self::Value, String>>;

    /// Loader tier (b): inject a module script that publishes the module's
    /// members on `global`, resolving once it has loaded.
    fn inject_script(
        &self,
        url: &str,
        global: &str,
    ) -> LocalBoxFuture<'static, Result<Self::Value, String>>;

    /// Removes the script element and global created by `inject_script`.
    fn remove_script(&self, global: &str);

    /// Loader tier (c): evaluate shimmed module text, which is a function
    /// expression taking an exports object and returning it.
    fn evaluate_module_text(&self, url: &str, code: &str) -> Result<Self::Value, String>;
}
