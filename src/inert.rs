//! Inert host
//!
//! A [`ScriptHost`] that never evaluates user code. Modules are instantiated
//! by walking their [`ModuleShell`]: functions and classes become inert
//! handles carrying their name and compiled source, literals become values,
//! imports are projected out of other modules, the framework object or
//! dependency values. Useful wherever dynamic evaluation is forbidden, and
//! as the engine's test host.
//!
//! Remote modules must be registered up front; script injection and text
//! evaluation are unavailable.

use futures::future::{self, FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::EngineError;
use crate::host::{
    boxed_factory, ModuleFactory, ModuleLinker, ModuleScope, RuntimeValue, ScriptHost, ValueKind,
};
use crate::shell::{ModuleShell, Projection, ShellInit, ShellLiteral, ShellSource, ShellStep};
use crate::transform::CompiledModule;

/// Primitives the inert framework object exposes.
pub const INERT_FRAMEWORK_MEMBERS: &[&str] = &[
    "createElement",
    "Fragment",
    "useState",
    "useEffect",
    "useRef",
    "useMemo",
    "useCallback",
    "useContext",
    "useReducer",
    "memo",
    "forwardRef",
];

// ═══════════════════════════════════════════════════════════════════════════════
// VALUES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum InertNode {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Object(RefCell<Vec<(String, InertValue)>>),
    Function { name: String, source: String },
}

/// Shared handle; clones refer to the same node.
#[derive(Debug, Clone)]
pub struct InertValue(Rc<InertNode>);

impl InertValue {
    fn from_node(node: InertNode) -> Self {
        InertValue(Rc::new(node))
    }

    pub fn undefined() -> Self {
        Self::from_node(InertNode::Undefined)
    }

    pub fn null() -> Self {
        Self::from_node(InertNode::Null)
    }

    pub fn boolean(value: bool) -> Self {
        Self::from_node(InertNode::Bool(value))
    }

    pub fn number(value: f64) -> Self {
        Self::from_node(InertNode::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::from_node(InertNode::Str(value.into()))
    }

    pub fn object() -> Self {
        Self::from_node(InertNode::Object(RefCell::new(Vec::new())))
    }

    pub fn function(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::from_node(InertNode::Function {
            name: name.into(),
            source: source.into(),
        })
    }

    /// Object built from `(key, value)` pairs, keeping their order.
    pub fn object_from<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, InertValue)>,
        K: Into<String>,
    {
        let object = Self::object();
        for (key, value) in entries {
            object.set(key, value);
        }
        object
    }

    pub fn node(&self) -> &InertNode {
        &self.0
    }

    /// Property write; a no-op on anything but objects.
    pub fn set(&self, key: impl Into<String>, value: InertValue) {
        if let InertNode::Object(entries) = self.node() {
            let key = key.into();
            let mut entries = entries.borrow_mut();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        match self.node() {
            InertNode::Object(entries) => entries.borrow().iter().any(|(k, _)| k == key),
            _ => false,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self.node() {
            InertNode::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.node() {
            InertNode::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl RuntimeValue for InertValue {
    fn kind(&self) -> ValueKind {
        match self.node() {
            InertNode::Undefined => ValueKind::Undefined,
            InertNode::Null => ValueKind::Null,
            InertNode::Bool(_) => ValueKind::Boolean,
            InertNode::Number(_) => ValueKind::Number,
            InertNode::Str(_) => ValueKind::String,
            InertNode::Object(_) => ValueKind::Object,
            InertNode::Function { .. } => ValueKind::Function,
        }
    }

    fn get(&self, key: &str) -> Self {
        match self.node() {
            InertNode::Object(entries) => entries
                .borrow()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(InertValue::undefined),
            InertNode::Function { name, .. } if key == "name" => InertValue::string(name.clone()),
            _ => InertValue::undefined(),
        }
    }

    fn own_keys(&self) -> Vec<String> {
        match self.node() {
            InertNode::Object(entries) => entries.borrow().iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        }
    }

    fn function_name(&self) -> Option<String> {
        match self.node() {
            InertNode::Function { name, .. } if !name.is_empty() => Some(name.clone()),
            _ => None,
        }
    }

    fn source_text(&self) -> Option<String> {
        match self.node() {
            InertNode::Function { source, .. } => Some(source.clone()),
            _ => None,
        }
    }

    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// An object whose members are inert functions named after the primitives.
pub fn inert_framework() -> InertValue {
    InertValue::object_from(
        INERT_FRAMEWORK_MEMBERS
            .iter()
            .map(|name| (*name, InertValue::function(*name, "function () { [native code] }"))),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST
// ═══════════════════════════════════════════════════════════════════════════════

pub struct InertHost {
    framework: InertValue,
    remote_modules: RefCell<HashMap<String, InertValue>>,
    requested: RefCell<Vec<String>>,
    removed_globals: RefCell<Vec<String>>,
}

impl Default for InertHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InertHost {
    pub fn new() -> Self {
        Self::with_framework(inert_framework())
    }

    pub fn with_framework(framework: InertValue) -> Self {
        Self {
            framework,
            remote_modules: RefCell::new(HashMap::new()),
            requested: RefCell::new(Vec::new()),
            removed_globals: RefCell::new(Vec::new()),
        }
    }

    /// Makes `value` available to the native-import tier at `url`.
    pub fn with_remote_module(self, url: impl Into<String>, value: InertValue) -> Self {
        self.remote_modules.borrow_mut().insert(url.into(), value);
        self
    }

    /// Every URL any loader tier asked for, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }

    pub fn removed_globals(&self) -> Vec<String> {
        self.removed_globals.borrow().clone()
    }

    fn record(&self, url: &str) {
        self.requested.borrow_mut().push(url.to_string());
    }
}

impl ScriptHost for InertHost {
    type Value = InertValue;

    fn framework(&self) -> InertValue {
        self.framework.clone()
    }

    fn new_object(&self) -> InertValue {
        InertValue::object()
    }

    fn string_value(&self, value: &str) -> InertValue {
        InertValue::string(value)
    }

    fn compile(
        &self,
        module: &CompiledModule,
        scope: Rc<ModuleScope<InertValue>>,
    ) -> Result<Box<dyn ModuleFactory<InertValue>>, String> {
        let shell = module.shell.clone();
        Ok(boxed_factory(move |exports: InertValue, linker| {
            run_shell(&shell, &scope, exports, linker)
        }))
    }

    fn import_module(&self, url: &str) -> LocalBoxFuture<'static, Result<InertValue, String>> {
        self.record(url);
        let result = self
            .remote_modules
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no module registered for {}", url));
        future::ready(result).boxed_local()
    }

    fn inject_script(
        &self,
        url: &str,
        _global: &str,
    ) -> LocalBoxFuture<'static, Result<InertValue, String>> {
        self.record(url);
        future::ready(Err("script injection is unavailable".to_string())).boxed_local()
    }

    fn remove_script(&self, global: &str) {
        self.removed_globals.borrow_mut().push(global.to_string());
    }

    fn evaluate_module_text(&self, url: &str, _code: &str) -> Result<InertValue, String> {
        self.record(url);
        Err("text evaluation is unavailable".to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHELL EVALUATION
// ═══════════════════════════════════════════════════════════════════════════════

fn project(value: InertValue, projection: &Projection) -> InertValue {
    match projection {
        Projection::Default => value.get("default"),
        Projection::Named(name) => value.get(name),
        Projection::Namespace => value,
    }
}

fn resolve_source(
    source: &ShellSource,
    scope: &ModuleScope<InertValue>,
    linker: &dyn ModuleLinker<InertValue>,
) -> Result<InertValue, EngineError> {
    Ok(match source {
        ShellSource::Framework { property: None } => scope.framework.clone(),
        ShellSource::Framework {
            property: Some(name),
        } => scope.framework.get(name),
        ShellSource::Module { name, projection } => project(linker.get_module(name)?, projection),
        ShellSource::Dependency {
            specifier,
            projection,
        } => {
            let value = scope
                .dependencies
                .get(specifier)
                .cloned()
                .unwrap_or_else(InertValue::undefined);
            match projection {
                // Same fallback as the factory prologue's interop helper.
                Projection::Default => {
                    let default = value.get("default");
                    if default.is_undefined() {
                        value
                    } else {
                        default
                    }
                }
                other => project(value, other),
            }
        }
    })
}

fn run_shell(
    shell: &ModuleShell,
    scope: &ModuleScope<InertValue>,
    exports: InertValue,
    linker: &dyn ModuleLinker<InertValue>,
) -> Result<InertValue, EngineError> {
    let mut env: HashMap<String, InertValue> = HashMap::new();
    let lookup = |env: &HashMap<String, InertValue>, name: &str| {
        env.get(name).cloned().unwrap_or_else(InertValue::undefined)
    };

    for step in shell.steps() {
        match step {
            ShellStep::Import { local, source } => {
                let value = resolve_source(source, scope, linker)?;
                env.insert(local.clone(), value);
            }
            ShellStep::Touch { module } => {
                linker.get_module(module)?;
            }
            ShellStep::Declare { local, init } => {
                let value = match init {
                    ShellInit::Function { name, source } | ShellInit::Class { name, source } => {
                        InertValue::function(name.clone(), source.clone())
                    }
                    ShellInit::Literal(literal) => match literal {
                        ShellLiteral::Null => InertValue::null(),
                        ShellLiteral::Bool(b) => InertValue::boolean(*b),
                        ShellLiteral::Number(n) => InertValue::number(*n),
                        ShellLiteral::Str(s) => InertValue::string(s.clone()),
                    },
                    ShellInit::Alias(name) => lookup(&env, name),
                    ShellInit::Member { object, property } => lookup(&env, object).get(property),
                    ShellInit::Opaque => InertValue::undefined(),
                };
                env.insert(local.clone(), value);
            }
            ShellStep::Export { exported, local } => {
                exports.set(exported.clone(), lookup(&env, local));
            }
            ShellStep::ReexportAll { source } => {
                let value = resolve_source(source, scope, linker)?;
                for key in value.own_keys() {
                    if key != "default" && !exports.has(&key) {
                        exports.set(key.clone(), value.get(&key));
                    }
                }
            }
        }
    }
    Ok(exports)
}
