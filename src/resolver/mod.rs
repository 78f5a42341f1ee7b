//! Declaration Resolver
//!
//! Given a `@Model` class, finds the functions the generator wraps for it:
//!
//! 1. **Free-function intents**: top-level `@Intent` functions whose first
//!    parameter is the model type.
//! 2. **Method intents**: `@Intent` functions declared inside the model, or
//!    extension functions whose receiver is the model.
//! 3. **Init**: the first `@Init` function returning the model type, or (for
//!    `@Init(useRetriever = true)`) the first one nested in the model's
//!    companion object.
//!
//! Resolution is a pure function of the snapshot. Missing or ambiguous
//! declarations are not errors here; [`validate`] reports them.

pub mod retriever;
pub mod validate;

use std::collections::HashSet;

use serde::Serialize;

use crate::config::GeneratorConfig;
use crate::symbols::{DeclId, Declaration, Modifier, Parameter, Property, SymbolQuery, TypeRef};

pub use retriever::{RetrieverMetaLocation, RetrieverResolver, RetrieverSite};
pub use validate::{check_init, check_intent_names, check_model_type, duplicate_intent_names};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallingConvention {
    FreeFunction,
    Method,
    ExtensionFunction,
}

impl CallingConvention {
    /// Method and extension intents receive the model as call receiver.
    pub fn is_receiver_call(&self) -> bool {
        !matches!(self, CallingConvention::FreeFunction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentDescriptor {
    #[serde(skip)]
    pub decl: DeclId,
    pub name: String,
    pub qualified_name: String,
    pub convention: CallingConvention,
    /// Parameters as declared, including the model parameter of a free function
    pub declared_parameters: Vec<Parameter>,
    pub return_type: Option<TypeRef>,
    pub is_async: bool,
    pub uses_retriever: bool,
}

impl IntentDescriptor {
    /// Parameters that cross the boundary as encoded argument strings.
    pub fn arguments(&self) -> &[Parameter] {
        match self.convention {
            CallingConvention::FreeFunction => self.declared_parameters.get(1..).unwrap_or(&[]),
            CallingConvention::Method | CallingConvention::ExtensionFunction => {
                &self.declared_parameters
            }
        }
    }

    /// Whether the host sees this intent as returning an asynchronous handle.
    pub fn is_suspending(&self) -> bool {
        self.is_async || self.uses_retriever
    }
}

/// Where the init function is declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InitPlacement {
    TopLevel,
    /// Inside a companion object; `owner` is the class declaring it
    Companion { owner: String },
    /// Inside any other class-like declaration (not callable statically)
    Nested { parent: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitDescriptor {
    #[serde(skip)]
    pub decl: DeclId,
    pub name: String,
    pub qualified_name: String,
    pub placement: InitPlacement,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<TypeRef>,
    pub is_async: bool,
    pub uses_retriever: bool,
}

impl InitDescriptor {
    pub fn is_suspending(&self) -> bool {
        self.is_async || self.uses_retriever
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    #[serde(skip)]
    pub decl: DeclId,
    pub name: String,
    pub qualified_name: String,
    pub package_name: String,
    /// Star-projected model type used for parameter matching
    pub ty: TypeRef,
    pub fields: Vec<Property>,
    pub init: Option<InitDescriptor>,
    pub intents: Vec<IntentDescriptor>,
    /// Retriever named by `@RetrieveWith` on the model itself
    pub retriever: Option<TypeRef>,
}

/// Resolves models and their functions against one snapshot.
pub struct DeclarationResolver<'a> {
    query: &'a dyn SymbolQuery,
    config: &'a GeneratorConfig,
}

impl<'a> DeclarationResolver<'a> {
    pub fn new(query: &'a dyn SymbolQuery, config: &'a GeneratorConfig) -> Self {
        Self { query, config }
    }

    /// Every non-`expect` class annotated `@Model`, in source order.
    pub fn discover_models(&self) -> Vec<DeclId> {
        self.query
            .declarations_annotated(&self.config.annotations.model)
            .into_iter()
            .filter(|id| {
                let decl = self.query.declaration(*id);
                decl.as_class().is_some() && !decl.has_modifier(Modifier::Expect)
            })
            .collect()
    }

    pub fn resolve_model(&self, model: DeclId) -> ModelDescriptor {
        let decl = self.query.declaration(model);

        let mut intents: Vec<IntentDescriptor> = self
            .resolve_intents(model)
            .into_iter()
            .map(|id| self.intent_descriptor(id, CallingConvention::FreeFunction))
            .collect();
        intents.extend(
            self.resolve_method_intents(model)
                .into_iter()
                .map(|(id, convention)| self.intent_descriptor(id, convention)),
        );

        ModelDescriptor {
            decl: model,
            name: decl.simple_name.clone(),
            qualified_name: decl.qualified_name.clone(),
            package_name: decl.package_name.clone(),
            ty: self.query.star_projected_type(model),
            fields: decl
                .as_class()
                .map(|c| c.properties.clone())
                .unwrap_or_default(),
            init: self.resolve_init(model).map(|id| self.init_descriptor(id, model)),
            intents,
            retriever: decl
                .annotation(&self.config.annotations.retrieve_with)
                .and_then(|a| a.first_type())
                .cloned(),
        }
    }

    fn intent_functions(&self) -> impl Iterator<Item = &'a Declaration> + '_ {
        let query = self.query;
        query
            .declarations_annotated(&self.config.annotations.intent)
            .into_iter()
            .map(move |id| query.declaration(id))
            .filter(|decl| decl.as_function().is_some())
    }

    /// Top-level intents taking the model as first parameter.
    pub fn resolve_intents(&self, model: DeclId) -> Vec<DeclId> {
        let model_type = self.query.star_projected_type(model);

        self.intent_functions()
            .filter(|decl| {
                let Some(function) = decl.as_function() else {
                    return false;
                };
                decl.parent.is_none()
                    && function.extension_receiver.is_none()
                    && function.parameters.first().map(|p| &p.ty) == Some(&model_type)
            })
            .map(|decl| decl.id)
            .collect()
    }

    /// Intents declared inside the model or as extensions on it.
    pub fn resolve_method_intents(&self, model: DeclId) -> Vec<(DeclId, CallingConvention)> {
        let model_name = &self.query.declaration(model).qualified_name;
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for decl in self.intent_functions() {
            let Some(function) = decl.as_function() else {
                continue;
            };

            let convention = if function
                .extension_receiver
                .as_ref()
                .map(|r| &r.name == model_name)
                .unwrap_or(false)
            {
                Some(CallingConvention::ExtensionFunction)
            } else if decl.parent == Some(model) {
                Some(CallingConvention::Method)
            } else {
                None
            };

            if let Some(convention) = convention {
                if seen.insert(decl.id) {
                    found.push((decl.id, convention));
                }
            }
        }

        found
    }

    /// First `@Init` function constructing the model, in source order.
    pub fn resolve_init(&self, model: DeclId) -> Option<DeclId> {
        let model_type = self.query.star_projected_type(model);

        self.query
            .declarations_annotated(&self.config.annotations.init)
            .into_iter()
            .find(|id| {
                let decl = self.query.declaration(*id);
                let Some(function) = decl.as_function() else {
                    return false;
                };

                if function.return_type.as_ref() == Some(&model_type) {
                    return true;
                }

                self.uses_retriever(decl, &self.config.annotations.init)
                    && self
                        .query
                        .parent(*id)
                        .and_then(|parent| parent.parent)
                        == Some(model)
            })
    }

    fn uses_retriever(&self, decl: &Declaration, annotation: &str) -> bool {
        decl.annotation(annotation)
            .and_then(|a| a.first_bool())
            .unwrap_or(false)
    }

    fn intent_descriptor(&self, id: DeclId, convention: CallingConvention) -> IntentDescriptor {
        let decl = self.query.declaration(id);
        let function = decl.as_function();

        IntentDescriptor {
            decl: id,
            name: decl.simple_name.clone(),
            qualified_name: decl.qualified_name.clone(),
            convention,
            declared_parameters: function.map(|f| f.parameters.clone()).unwrap_or_default(),
            return_type: function.and_then(|f| f.return_type.clone()),
            is_async: decl.has_modifier(Modifier::Suspend),
            uses_retriever: self.uses_retriever(decl, &self.config.annotations.intent),
        }
    }

    fn init_descriptor(&self, id: DeclId, model: DeclId) -> InitDescriptor {
        let decl = self.query.declaration(id);
        let function = decl.as_function();

        let placement = match self.query.parent(id) {
            None => InitPlacement::TopLevel,
            Some(parent) if parent.is_companion() => InitPlacement::Companion {
                owner: parent
                    .parent
                    .map(|owner| self.query.declaration(owner).qualified_name.clone())
                    .unwrap_or_else(|| self.query.declaration(model).qualified_name.clone()),
            },
            Some(parent) => InitPlacement::Nested {
                parent: parent.qualified_name.clone(),
            },
        };

        InitDescriptor {
            decl: id,
            name: decl.simple_name.clone(),
            qualified_name: decl.qualified_name.clone(),
            placement,
            parameters: function.map(|f| f.parameters.clone()).unwrap_or_default(),
            return_type: function.and_then(|f| f.return_type.clone()),
            is_async: decl.has_modifier(Modifier::Suspend),
            uses_retriever: self.uses_retriever(decl, &self.config.annotations.init),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::GeneratorConfig;
    use crate::symbols::{Annotation, AnnotationValue, TypeRef};

    pub fn annotation(name: &str) -> Annotation {
        Annotation::new(name)
    }

    pub fn model() -> Annotation {
        annotation(&GeneratorConfig::default().annotations.model)
    }

    pub fn intent() -> Annotation {
        annotation(&GeneratorConfig::default().annotations.intent)
    }

    pub fn retriever_intent() -> Annotation {
        intent().with_arg(Some("useRetriever"), AnnotationValue::Bool(true))
    }

    pub fn init() -> Annotation {
        annotation(&GeneratorConfig::default().annotations.init)
    }

    pub fn retriever_init() -> Annotation {
        init().with_arg(Some("useRetriever"), AnnotationValue::Bool(true))
    }

    pub fn retrieve_with(retriever: &str) -> Annotation {
        annotation(&GeneratorConfig::default().annotations.retrieve_with).with_arg(
            None,
            AnnotationValue::Type {
                ty: TypeRef::new(retriever),
            },
        )
    }

    pub fn retrieve_info() -> Annotation {
        annotation(&GeneratorConfig::default().annotations.retrieve_info)
    }

    pub fn retrieve_data() -> Annotation {
        annotation(&GeneratorConfig::default().annotations.retrieve_data)
    }

    pub fn int() -> TypeRef {
        TypeRef::new("kotlin.Int")
    }

    pub fn counter() -> TypeRef {
        TypeRef::new("app.Counter")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::symbols::{ClassNode, FunctionNode, Snapshot, SourceFile};

    fn counter_snapshot(extra: Vec<SourceFile>) -> Snapshot {
        let mut files = vec![SourceFile::new("app/Counter.kt", "app")
            .declare(
                ClassNode::new("Counter")
                    .at(1)
                    .annotated(model())
                    .property("count", int())
                    .member(FunctionNode::new("reset").at(2).annotated(intent()))
                    .member(FunctionNode::new("helper").at(3)),
            )
            .declare(
                FunctionNode::new("createCounter")
                    .at(10)
                    .annotated(init())
                    .returns(counter()),
            )
            .declare(
                FunctionNode::new("increment")
                    .at(20)
                    .annotated(intent())
                    .param("c", counter())
                    .param("by", int())
                    .returns(counter()),
            )
            .declare(
                FunctionNode::new("double")
                    .at(30)
                    .annotated(intent())
                    .modifier(Modifier::Suspend)
                    .receiver(counter()),
            )
            .declare(
                FunctionNode::new("unrelated")
                    .at(40)
                    .annotated(intent())
                    .param("n", int()),
            )];
        files.extend(extra);
        Snapshot::from_files(files).unwrap()
    }

    fn resolve(snapshot: &Snapshot) -> ModelDescriptor {
        let config = GeneratorConfig::default();
        let resolver = DeclarationResolver::new(snapshot, &config);
        let model = resolver.discover_models()[0];
        resolver.resolve_model(model)
    }

    #[test]
    fn test_discover_models_skips_expect() {
        let snapshot = counter_snapshot(vec![SourceFile::new("app/Other.kt", "app").declare(
            ClassNode::new("Other")
                .annotated(model())
                .modifier(Modifier::Expect),
        )]);
        let config = GeneratorConfig::default();
        let resolver = DeclarationResolver::new(&snapshot, &config);
        assert_eq!(resolver.discover_models().len(), 1);
    }

    #[test]
    fn test_resolve_counter() {
        let snapshot = counter_snapshot(vec![]);
        let model = resolve(&snapshot);

        assert_eq!(model.qualified_name, "app.Counter");
        assert_eq!(model.fields.len(), 1);

        let names: Vec<_> = model
            .intents
            .iter()
            .map(|i| (i.name.as_str(), i.convention))
            .collect();
        assert_eq!(
            names,
            vec![
                ("increment", CallingConvention::FreeFunction),
                ("reset", CallingConvention::Method),
                ("double", CallingConvention::ExtensionFunction),
            ]
        );
    }

    #[test]
    fn test_free_function_arguments_skip_model() {
        let snapshot = counter_snapshot(vec![]);
        let model = resolve(&snapshot);
        let increment = &model.intents[0];

        assert_eq!(increment.declared_parameters.len(), 2);
        assert_eq!(increment.arguments().len(), 1);
        assert_eq!(increment.arguments()[0].name, "by");
    }

    #[test]
    fn test_async_flag() {
        let snapshot = counter_snapshot(vec![]);
        let model = resolve(&snapshot);
        let double = model.intents.iter().find(|i| i.name == "double").unwrap();
        assert!(double.is_async);
        assert!(!double.uses_retriever);
        assert!(double.is_suspending());
    }

    #[test]
    fn test_resolve_top_level_init() {
        let snapshot = counter_snapshot(vec![]);
        let init = resolve(&snapshot).init.unwrap();
        assert_eq!(init.name, "createCounter");
        assert_eq!(init.placement, InitPlacement::TopLevel);
        assert!(!init.uses_retriever);
    }

    #[test]
    fn test_init_missing() {
        let snapshot = Snapshot::from_files(vec![SourceFile::new("a.kt", "app")
            .declare(ClassNode::new("Counter").annotated(model()))])
        .unwrap();
        assert!(resolve(&snapshot).init.is_none());
    }

    #[test]
    fn test_retriever_init_in_companion() {
        let snapshot = Snapshot::from_files(vec![SourceFile::new("a.kt", "app").declare(
            ClassNode::new("Counter").annotated(model()).member(
                ClassNode::companion().member(FunctionNode::new("fetch").annotated(retriever_init())),
            ),
        )])
        .unwrap();

        let init = resolve(&snapshot).init.unwrap();
        assert_eq!(init.name, "fetch");
        assert_eq!(
            init.placement,
            InitPlacement::Companion {
                owner: "app.Counter".to_string()
            }
        );
        assert!(init.uses_retriever);
        assert!(init.is_suspending());
    }

    #[test]
    fn test_plain_init_in_companion_without_return_type_not_found() {
        let snapshot = Snapshot::from_files(vec![SourceFile::new("a.kt", "app").declare(
            ClassNode::new("Counter").annotated(model()).member(
                ClassNode::companion().member(FunctionNode::new("fetch").annotated(init())),
            ),
        )])
        .unwrap();
        assert!(resolve(&snapshot).init.is_none());
    }

    #[test]
    fn test_init_nested_in_plain_class() {
        let snapshot = Snapshot::from_files(vec![SourceFile::new("a.kt", "app")
            .declare(ClassNode::new("Counter").annotated(model()))
            .declare(
                ClassNode::new("Factory").member(
                    FunctionNode::new("make")
                        .annotated(init())
                        .returns(counter()),
                ),
            )])
        .unwrap();

        let init = resolve(&snapshot).init.unwrap();
        assert_eq!(
            init.placement,
            InitPlacement::Nested {
                parent: "app.Factory".to_string()
            }
        );
    }

    #[test]
    fn test_init_in_companion_of_other_class() {
        let snapshot = Snapshot::from_files(vec![SourceFile::new("a.kt", "app")
            .declare(ClassNode::new("Counter").annotated(model()))
            .declare(
                ClassNode::new("Factory").member(
                    ClassNode::companion().member(
                        FunctionNode::new("make")
                            .annotated(init())
                            .returns(counter()),
                    ),
                ),
            )])
        .unwrap();

        let init = resolve(&snapshot).init.unwrap();
        assert_eq!(init.qualified_name, "app.Factory.Companion.make");
        assert_eq!(
            init.placement,
            InitPlacement::Companion {
                owner: "app.Factory".to_string()
            }
        );
    }

    #[test]
    fn test_init_resolution_is_deterministic() {
        let snapshot = counter_snapshot(vec![SourceFile::new("app/B.kt", "app").declare(
            FunctionNode::new("otherInit")
                .annotated(init())
                .returns(counter()),
        )]);
        let first = resolve(&snapshot).init.unwrap();
        let second = resolve(&snapshot).init.unwrap();
        assert_eq!(first.decl, second.decl);
        // "app/B.kt" sorts before "app/Counter.kt"
        assert_eq!(first.name, "otherInit");
    }

    #[test]
    fn test_model_retriever_annotation() {
        let snapshot = Snapshot::from_files(vec![SourceFile::new("a.kt", "app").declare(
            ClassNode::new("Counter")
                .annotated(model())
                .annotated(retrieve_with("app.Http")),
        )])
        .unwrap();
        assert_eq!(resolve(&snapshot).retriever, Some(TypeRef::new("app.Http")));
    }

    #[test]
    fn test_generic_model_matches_star_projection() {
        let snapshot = Snapshot::from_files(vec![SourceFile::new("a.kt", "app")
            .declare(
                ClassNode::new("Box")
                    .annotated(model())
                    .type_parameter("T"),
            )
            .declare(
                FunctionNode::new("open")
                    .annotated(intent())
                    .param("b", TypeRef::star_projected("app.Box", 1)),
            )
            .declare(
                FunctionNode::new("close")
                    .annotated(intent())
                    .param("b", TypeRef::with_args("app.Box", vec![int()])),
            )])
        .unwrap();

        let model = resolve(&snapshot);
        let names: Vec<_> = model.intents.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["open"]);
    }
}
