//! End-to-end passes through the execution host on the inert runtime.

use std::cell::Cell;
use std::rc::Rc;

use crate::autodetect::BUILTIN_REGISTRY;
use crate::config::EngineOptions;
use crate::error::{ERR_DOMAIN, ERR_MODULE_NOT_FOUND, ERR_NO_COMPONENT, ERR_POLICY};
use crate::execution::{ExecutionHost, ExecutionRequest};
use crate::host::{ModuleLinker, ModuleScope, RuntimeValue, ScriptHost};
use crate::inert::{InertHost, InertValue};
use crate::model::{SourceBatch, SourceFile, WARN_DEPENDENCY_SKIPPED};
use crate::registry::ModuleRegistry;
use crate::resolver::{DependencyTable, ManualDependency};
use crate::transform::compile_batch;

fn engine(host: &Rc<InertHost>) -> ExecutionHost<InertHost> {
    ExecutionHost::new(Rc::clone(host), EngineOptions::default())
        .unwrap()
        .without_fetcher()
}

/// Compiles `files` and registers every module, without running any.
fn registry_for(files: Vec<SourceFile>) -> ModuleRegistry<InertValue> {
    let host = Rc::new(InertHost::new());
    let output = compile_batch(&SourceBatch::new(files), &["react".to_string()], &DependencyTable::default())
        .unwrap();
    let scope = Rc::new(ModuleScope {
        framework: host.framework(),
        dependencies: Default::default(),
    });
    let factory_host = Rc::clone(&host);
    let mut registry = ModuleRegistry::new(move || factory_host.new_object());
    for module in &output.modules {
        let factory = host.compile(module, Rc::clone(&scope)).unwrap();
        registry.define(module.name.clone(), factory);
    }
    registry
}

#[tokio::test]
async fn test_single_file_default_component() {
    let host = Rc::new(InertHost::new());
    let result = engine(&host)
        .execute(ExecutionRequest::from_source(
            "export default function Foo() { return <div />; }",
        ))
        .await;

    assert!(result.is_ok(), "{:?}", result.error);
    let component = result.component.unwrap();
    assert!(component.is_callable());
    assert_eq!(component.function_name().as_deref(), Some("Foo"));
    assert!(component
        .source_text()
        .unwrap()
        .contains("React.createElement(\"div\""));
}

#[tokio::test]
async fn test_multi_file_batch_with_typescript() {
    let host = Rc::new(InertHost::new());
    let files = vec![
        SourceFile::entry(
            "App.tsx",
            r#"import React, { useState } from 'react';
import Button from './components/Button';
import { format } from './utils';
export default function App() {
  const [n] = useState<number>(0);
  return <Button label={format(n)} />;
}"#,
        ),
        SourceFile::new(
            "components/Button.tsx",
            r#"interface Props { label: string }
export default function Button({ label }: Props) { return <button>{label}</button>; }"#,
        ),
        SourceFile::new("utils.ts", "export const format = (n: number): string => `#${n}`;"),
    ];
    let engine = engine(&host);
    let result = engine.execute(ExecutionRequest::new(files)).await;

    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(
        result.component.unwrap().function_name().as_deref(),
        Some("App")
    );
    let output = engine.last_output().unwrap();
    let button = output.module("components/Button").unwrap();
    assert!(!button.code.contains("interface"));
    assert!(!button.code.contains(": Props"));
    assert!(output.entry_module().unwrap().code.contains("__getModule(\"components/Button\")"));
}

#[test]
fn test_registry_instantiates_each_module_once() {
    let registry = registry_for(vec![
        SourceFile::entry(
            "App.tsx",
            "import Button from './Button';\nimport Card from './Card';\nexport default function App() { return <Card><Button /></Card>; }",
        ),
        SourceFile::new(
            "Card.tsx",
            "import Button from './Button';\nexport default function Card({ children }) { return <div>{children}<Button /></div>; }",
        ),
        SourceFile::new("Button.tsx", "export default function Button() { return <button />; }"),
    ]);

    let app = registry.get_module("App").unwrap();
    assert!(app.get("default").is_callable());
    assert_eq!(registry.instantiated_count(), 3);

    let first = registry.get_module("Button").unwrap();
    let second = registry.get_module("Button").unwrap();
    assert!(first.same_value(&second));
    assert_eq!(registry.instantiated_count(), 3);
}

#[test]
fn test_import_cycle_sees_partial_exports() {
    let registry = registry_for(vec![
        SourceFile::entry(
            "a.ts",
            "import { fromB } from './b';\nexport const fromA = 'A';\nexport const seenByA = fromB;",
        ),
        SourceFile::new(
            "b.ts",
            "import { fromA } from './a';\nexport const fromB = 'B';\nexport const seenByB = fromA;",
        ),
    ]);

    let a = registry.get_module("a").unwrap();
    let b = registry.cached("b").unwrap();
    assert_eq!(a.get("seenByA").as_string().as_deref(), Some("B"));
    assert!(b.get("seenByB").is_undefined());
    assert_eq!(a.get("fromA").as_string().as_deref(), Some("A"));
    assert_eq!(registry.instantiated_count(), 2);
}

#[tokio::test]
async fn test_missing_local_module_names_specifier() {
    let host = Rc::new(InertHost::new());
    let result = engine(&host)
        .execute(ExecutionRequest::from_source(
            "import Missing from './Missing';\nexport default function App() { return <Missing />; }",
        ))
        .await;

    assert!(result.component.is_none());
    assert_eq!(result.error_code, Some(ERR_MODULE_NOT_FOUND));
    assert!(result.error.unwrap().contains("./Missing"));
}

#[tokio::test]
async fn test_disallowed_manual_url_loads_nothing() {
    let host = Rc::new(InertHost::new());
    let request = ExecutionRequest::from_source(
        "import thing from 'thing';\nexport default function App() { return <div>{thing}</div>; }",
    )
    .with_dependency("thing", ManualDependency::from_string("https://evil.example/thing.js"));
    let result = engine(&host).execute(request).await;

    assert_eq!(result.error_code, Some(ERR_DOMAIN));
    assert!(result.error.unwrap().contains("evil.example"));
    assert!(host.requested_urls().is_empty());
}

#[tokio::test]
async fn test_manual_value_dependency_is_bound() {
    let host = Rc::new(InertHost::new());
    let widget = InertValue::function("Widget", "function Widget() {}");
    let library = InertValue::object_from([("Widget", widget.clone())]);
    let request = ExecutionRequest::from_source(
        "import { Widget } from 'my-widgets';\nexport default Widget;",
    )
    .with_dependency("my-widgets", ManualDependency::Value(library));
    let result = engine(&host).execute(request).await;

    assert!(result.is_ok(), "{:?}", result.error);
    assert!(result.component.unwrap().same_value(&widget));
}

#[tokio::test]
async fn test_auto_detected_dependency_is_loaded_and_bound() {
    let url = BUILTIN_REGISTRY["framer-motion"];
    let motion = InertValue::object_from([("div", InertValue::function("div", ""))]);
    let host = Rc::new(
        InertHost::new()
            .with_remote_module(url, InertValue::object_from([("motion", motion)])),
    );
    let engine = engine(&host);
    let result = engine
        .execute(ExecutionRequest::from_source(
            "import { motion } from 'framer-motion';\nexport default function App() { return <motion.div />; }",
        ))
        .await;

    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(host.requested_urls(), vec![url.to_string()]);
    assert!(engine.loader().is_memoized(url));
    let output = engine.last_output().unwrap();
    assert!(output
        .entry_module()
        .unwrap()
        .code
        .contains("__dep_framer_motion.motion"));
}

#[tokio::test]
async fn test_unloadable_auto_dependency_is_skipped() {
    let host = Rc::new(InertHost::new());
    let result = engine(&host)
        .execute(ExecutionRequest::from_source(
            "import clsx from 'clsx';\nexport default function App() { return <div className={clsx('a')} />; }",
        ))
        .await;

    // The dependency is dropped with a warning, so the import itself no
    // longer resolves.
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == WARN_DEPENDENCY_SKIPPED && d.message.contains("clsx")));
    assert_eq!(result.error_code, Some(ERR_MODULE_NOT_FOUND));
}

#[tokio::test]
async fn test_security_gate_and_continue_anyway() {
    let host = Rc::new(InertHost::new());
    let engine = engine(&host);
    let request = ExecutionRequest::from_source(
        "export default function App() { localStorage.getItem('k'); return <div />; }",
    );

    let rejected = engine.execute(request).await;
    assert!(rejected.forbidden_pattern_detected);
    assert_eq!(rejected.error_code, Some(ERR_POLICY));
    assert!(engine.has_pending_rejection());

    let accepted = engine.continue_anyway().await;
    assert!(accepted.is_ok(), "{:?}", accepted.error);
    assert!(!accepted.forbidden_pattern_detected);
    assert!(!engine.has_pending_rejection());
}

#[tokio::test]
async fn test_unchanged_inputs_skip_the_pass() {
    let host = Rc::new(InertHost::new());
    let failures = Rc::new(Cell::new(0));
    let counter = Rc::clone(&failures);
    let engine = engine(&host).on_error(move |_| counter.set(counter.get() + 1));
    let request: ExecutionRequest<InertValue> =
        ExecutionRequest::from_source("import x from './nowhere';\nexport default x;");

    let first = engine.execute(request.clone()).await;
    let second = engine.execute(request).await;
    assert_eq!(first.error, second.error);
    assert_eq!(failures.get(), 1);

    let changed = engine
        .execute(ExecutionRequest::from_source(
            "export default function App() { return <p />; }",
        ))
        .await;
    assert!(changed.is_ok());
    assert!(engine.state().is_ok());
    assert_eq!(failures.get(), 1);
}

#[tokio::test]
async fn test_no_component_reports_exports() {
    let host = Rc::new(InertHost::new());
    let result = engine(&host)
        .execute(ExecutionRequest::from_source(
            "export const value = 42;\nexport function helper() { return value; }",
        ))
        .await;

    assert_eq!(result.error_code, Some(ERR_NO_COMPONENT));
    let message = result.error.unwrap();
    assert!(message.contains("value"));
    assert!(message.contains("helper"));
}

#[tokio::test]
async fn test_named_component_when_default_missing() {
    let host = Rc::new(InertHost::new());
    let result = engine(&host)
        .execute(ExecutionRequest::from_source(
            "export const title = 'x';\nexport const Card = () => <section />;",
        ))
        .await;

    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(
        result.component.unwrap().function_name().as_deref(),
        Some("Card")
    );
}

#[tokio::test]
async fn test_manual_wildcard_beats_registry_package() {
    let manual = InertValue::function("manualDebounce", "function manualDebounce() {}");
    let registry_copy = InertValue::function("autoLodash", "function autoLodash() {}");
    let host = Rc::new(InertHost::new().with_remote_module(
        BUILTIN_REGISTRY["lodash"],
        InertValue::object_from([("default", registry_copy)]),
    ));
    let request = ExecutionRequest::from_source(
        "import debounce from 'lodash/debounce';\nexport default debounce;",
    )
    .with_dependency(
        "lodash/*",
        ManualDependency::Value(InertValue::object_from([("default", manual.clone())])),
    );
    let result = engine(&host).execute(request).await;

    assert!(result.is_ok(), "{:?}", result.error);
    assert!(result.component.unwrap().same_value(&manual));
    assert!(host.requested_urls().is_empty());
}

#[tokio::test]
async fn test_newer_pass_clears_pending_rejection() {
    let host = Rc::new(InertHost::new());
    let engine = engine(&host);

    let rejected = engine
        .execute(ExecutionRequest::from_source(
            "export default function Old() { localStorage.clear(); return <div />; }",
        ))
        .await;
    assert!(rejected.forbidden_pattern_detected);
    assert!(engine.has_pending_rejection());

    let newer = engine
        .execute(ExecutionRequest::from_source(
            "export default function New() { return <div />; }",
        ))
        .await;
    assert!(newer.is_ok(), "{:?}", newer.error);
    assert!(!engine.has_pending_rejection());

    let continued = engine.continue_anyway().await;
    assert_eq!(
        continued.component.unwrap().function_name().as_deref(),
        Some("New")
    );
    assert_eq!(
        engine.state().component.unwrap().function_name().as_deref(),
        Some("New")
    );
}

#[tokio::test]
async fn test_exported_namespace_survives_compilation() {
    let host = Rc::new(InertHost::new());
    let engine = engine(&host);
    let result = engine
        .execute(ExecutionRequest::from_source(
            "export namespace Theme { export const color = 'red'; }\nexport default function App() { return <p>{Theme.color}</p>; }",
        ))
        .await;

    assert!(result.is_ok(), "{:?}", result.error);
    let output = engine.last_output().unwrap();
    let entry = output.entry_module().unwrap();
    assert!(entry.export_info.has_named("Theme"));
    assert!(entry.code.contains("Theme"));
    assert!(entry.code.contains("\"red\""));
    assert!(entry.factory_source.contains("exports.Theme = Theme;"));
}
