//! Module shells.
//!
//! A shell is the ordered list of top-level binding steps of one compiled
//! module: which names it imports from where, which it declares, and which
//! it exports. Hosts that cannot evaluate JavaScript instantiate modules
//! from the shell instead of the factory source.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::Parser;
use serde::Serialize;
use std::collections::HashMap;

use crate::exports::source_type;
use crate::imports::{StarSource, FRAMEWORK_LOCAL, INTEROP_DEFAULT, MODULE_GETTER};
use crate::model::ExportInfo;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Projection {
    Default,
    Named(String),
    Namespace,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ShellSource {
    /// The framework object, or one of its properties.
    Framework { property: Option<String> },
    Module { name: String, projection: Projection },
    /// Keyed by dependency table specifier.
    Dependency { specifier: String, projection: Projection },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ShellLiteral {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ShellInit {
    Function { name: String, source: String },
    Class { name: String, source: String },
    Literal(ShellLiteral),
    Alias(String),
    Member { object: String, property: String },
    /// Anything the shell does not model; evaluates to undefined.
    Opaque,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ShellStep {
    Import { local: String, source: ShellSource },
    /// Side-effect instantiation of a local module.
    Touch { module: String },
    Declare { local: String, init: ShellInit },
    Export { exported: String, local: String },
    ReexportAll { source: ShellSource },
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleShell {
    pub steps: Vec<ShellStep>,
}

impl ModuleShell {
    pub fn steps(&self) -> &[ShellStep] {
        &self.steps
    }
}

struct ShellBuilder<'s> {
    code: &'s str,
    /// Dependency safe name → table specifier.
    dependencies: &'s HashMap<String, String>,
    steps: Vec<ShellStep>,
}

/// Derives the shell of one compiled module. `dependencies` maps the
/// prologue's safe names to dependency specifiers.
pub fn build_shell(
    code: &str,
    dependencies: &HashMap<String, String>,
    export_info: &ExportInfo,
    star_sources: &[StarSource],
) -> ModuleShell {
    let mut builder = ShellBuilder {
        code,
        dependencies,
        steps: Vec::new(),
    };

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type()).parse();
    // Compiled output always parses; a failure leaves only the export steps.
    if ret.errors.is_empty() {
        for stmt in &ret.program.body {
            builder.statement(stmt);
        }
    }

    if let Some(local) = &export_info.default_exported_identifier {
        builder.steps.push(ShellStep::Export {
            exported: "default".to_string(),
            local: local.clone(),
        });
    }
    for (exported, local) in &export_info.bindings {
        builder.steps.push(ShellStep::Export {
            exported: exported.clone(),
            local: local.clone(),
        });
    }
    for star in star_sources {
        let source = match star {
            StarSource::Framework => ShellSource::Framework { property: None },
            StarSource::Module(name) => ShellSource::Module {
                name: name.clone(),
                projection: Projection::Namespace,
            },
            StarSource::Dependency(specifier) => ShellSource::Dependency {
                specifier: specifier.clone(),
                projection: Projection::Namespace,
            },
        };
        builder.steps.push(ShellStep::ReexportAll { source });
    }

    ModuleShell {
        steps: builder.steps,
    }
}

impl<'s> ShellBuilder<'s> {
    fn slice(&self, start: u32, end: u32) -> String {
        self.code
            .get(start as usize..end as usize)
            .unwrap_or_default()
            .to_string()
    }

    fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::VariableDeclaration(var) => {
                for declarator in &var.declarations {
                    self.declarator(declarator);
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    self.steps.push(ShellStep::Declare {
                        local: id.name.to_string(),
                        init: ShellInit::Function {
                            name: id.name.to_string(),
                            source: self.slice(func.span.start, func.span.end),
                        },
                    });
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    self.steps.push(ShellStep::Declare {
                        local: id.name.to_string(),
                        init: ShellInit::Class {
                            name: id.name.to_string(),
                            source: self.slice(class.span.start, class.span.end),
                        },
                    });
                }
            }
            Statement::ExpressionStatement(expr) => {
                if let Some(module) = module_getter_argument(&expr.expression) {
                    self.steps.push(ShellStep::Touch { module });
                }
            }
            _ => {}
        }
    }

    fn declarator(&mut self, declarator: &VariableDeclarator) {
        match (&declarator.id, &declarator.init) {
            (BindingPattern::BindingIdentifier(id), Some(init)) => {
                let local = id.name.to_string();
                let step = self.classify(&local, init);
                self.steps.push(step);
            }
            (BindingPattern::ObjectPattern(pattern), Some(Expression::Identifier(object))) => {
                for prop in &pattern.properties {
                    let (Some(key), BindingPattern::BindingIdentifier(id)) =
                        (prop.key.static_name(), &prop.value)
                    else {
                        continue;
                    };
                    let local = id.name.to_string();
                    let step = if object.name == FRAMEWORK_LOCAL {
                        ShellStep::Import {
                            local,
                            source: ShellSource::Framework {
                                property: Some(key.to_string()),
                            },
                        }
                    } else {
                        ShellStep::Declare {
                            local,
                            init: ShellInit::Member {
                                object: object.name.to_string(),
                                property: key.to_string(),
                            },
                        }
                    };
                    self.steps.push(step);
                }
            }
            (pattern, _) => {
                let mut names = Vec::new();
                crate::exports::collect_binding_names(pattern, &mut names);
                for local in names {
                    self.steps.push(ShellStep::Declare {
                        local,
                        init: ShellInit::Opaque,
                    });
                }
            }
        }
    }

    fn classify(&self, local: &str, init: &Expression) -> ShellStep {
        let declare = |init: ShellInit| ShellStep::Declare {
            local: local.to_string(),
            init,
        };
        let import = |source: ShellSource| ShellStep::Import {
            local: local.to_string(),
            source,
        };

        match init.without_parentheses() {
            Expression::ArrowFunctionExpression(arrow) => declare(ShellInit::Function {
                name: local.to_string(),
                source: self.slice(arrow.span.start, arrow.span.end),
            }),
            Expression::FunctionExpression(func) => declare(ShellInit::Function {
                name: func
                    .id
                    .as_ref()
                    .map_or_else(|| local.to_string(), |id| id.name.to_string()),
                source: self.slice(func.span.start, func.span.end),
            }),
            Expression::ClassExpression(class) => declare(ShellInit::Class {
                name: class
                    .id
                    .as_ref()
                    .map_or_else(|| local.to_string(), |id| id.name.to_string()),
                source: self.slice(class.span.start, class.span.end),
            }),
            Expression::StringLiteral(s) => {
                declare(ShellInit::Literal(ShellLiteral::Str(s.value.to_string())))
            }
            Expression::NumericLiteral(n) => declare(ShellInit::Literal(ShellLiteral::Number(n.value))),
            Expression::BooleanLiteral(b) => declare(ShellInit::Literal(ShellLiteral::Bool(b.value))),
            Expression::NullLiteral(_) => declare(ShellInit::Literal(ShellLiteral::Null)),
            Expression::Identifier(ident) => {
                let name = ident.name.as_str();
                if name == FRAMEWORK_LOCAL {
                    import(ShellSource::Framework { property: None })
                } else if let Some(specifier) = self.dependencies.get(name) {
                    import(ShellSource::Dependency {
                        specifier: specifier.clone(),
                        projection: Projection::Namespace,
                    })
                } else {
                    declare(ShellInit::Alias(name.to_string()))
                }
            }
            Expression::StaticMemberExpression(member) => {
                self.member(local, &member.object, member.property.name.as_str())
            }
            Expression::ComputedMemberExpression(member) => match &member.expression {
                Expression::StringLiteral(key) => self.member(local, &member.object, &key.value),
                _ => declare(ShellInit::Opaque),
            },
            Expression::CallExpression(call) => {
                if let Some(name) = module_getter_argument(init) {
                    return import(ShellSource::Module {
                        name,
                        projection: Projection::Namespace,
                    });
                }
                if let Expression::Identifier(callee) = &call.callee {
                    if callee.name == INTEROP_DEFAULT {
                        if let Some(Argument::Identifier(arg)) = call.arguments.first() {
                            if let Some(specifier) = self.dependencies.get(arg.name.as_str()) {
                                return import(ShellSource::Dependency {
                                    specifier: specifier.clone(),
                                    projection: Projection::Default,
                                });
                            }
                        }
                    }
                }
                declare(ShellInit::Opaque)
            }
            _ => declare(ShellInit::Opaque),
        }
    }

    fn member(&self, local: &str, object: &Expression, property: &str) -> ShellStep {
        let projection = if property == "default" {
            Projection::Default
        } else {
            Projection::Named(property.to_string())
        };
        let source = if let Some(name) = module_getter_argument(object) {
            Some(ShellSource::Module { name, projection })
        } else if let Expression::Identifier(ident) = object {
            if ident.name == FRAMEWORK_LOCAL {
                Some(ShellSource::Framework {
                    property: Some(property.to_string()),
                })
            } else {
                self.dependencies
                    .get(ident.name.as_str())
                    .map(|specifier| ShellSource::Dependency {
                        specifier: specifier.clone(),
                        projection,
                    })
            }
        } else {
            None
        };

        match (source, object) {
            (Some(source), _) => ShellStep::Import {
                local: local.to_string(),
                source,
            },
            (None, Expression::Identifier(ident)) => ShellStep::Declare {
                local: local.to_string(),
                init: ShellInit::Member {
                    object: ident.name.to_string(),
                    property: property.to_string(),
                },
            },
            (None, _) => ShellStep::Declare {
                local: local.to_string(),
                init: ShellInit::Opaque,
            },
        }
    }
}

/// `__getModule("name")` → `name`.
fn module_getter_argument(expr: &Expression) -> Option<String> {
    let Expression::CallExpression(call) = expr.without_parentheses() else {
        return None;
    };
    let Expression::Identifier(callee) = &call.callee else {
        return None;
    };
    if callee.name != MODULE_GETTER || call.arguments.len() != 1 {
        return None;
    }
    match call.arguments.first() {
        Some(Argument::StringLiteral(name)) => Some(name.value.to_string()),
        _ => None,
    }
}
