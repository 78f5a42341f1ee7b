//! Symbol Query Layer.
//!
//! The generator never talks to a live compiler. It reads a frozen
//! [`Snapshot`] of the annotated declarations of one compilation, built either
//! from JSON dumped by the host compiler (see [`loader`]) or programmatically
//! from [`SourceFile`] / [`ClassNode`] / [`FunctionNode`] values.
//!
//! Query results are always returned in stable source order (file path, then
//! line, then column, then nesting order) so that "first match" rules in the
//! resolver are reproducible across runs.

pub mod loader;
pub mod types;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub use loader::SnapshotLoader;
pub use types::{TypeArgument, TypeRef, Variance};

use crate::error::{KirokError, Result};

// =====================================================
// Declarations
// =====================================================

/// Handle of a declaration inside one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Suspend,
    Expect,
    Actual,
    Companion,
    Data,
    Inline,
    Override,
    Public,
    Internal,
    Private,
    Protected,
}

/// A literal annotation argument.
///
/// JSON form: `true`, `3`, `"text"` or `{"type": "com.example.MyRetriever"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Bool(bool),
    Int(i64),
    Type {
        #[serde(rename = "type")]
        ty: TypeRef,
    },
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationArgument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: AnnotationValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<AnnotationArgument>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_arg(mut self, name: Option<&str>, value: AnnotationValue) -> Self {
        self.arguments.push(AnnotationArgument {
            name: name.map(str::to_string),
            value,
        });
        self
    }

    /// Value of the first argument when it is a boolean.
    pub fn first_bool(&self) -> Option<bool> {
        match self.arguments.first().map(|a| &a.value) {
            Some(AnnotationValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Value of the first argument when it is a class literal.
    pub fn first_type(&self) -> Option<&TypeRef> {
        match self.arguments.first().map(|a| &a.value) {
            Some(AnnotationValue::Type { ty }) => Some(ty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Object,
    CompanionObject,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Class properties share the parameter shape.
pub type Property = Parameter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub class_kind: ClassKind,
    pub type_parameters: Vec<String>,
    pub properties: Vec<Property>,
    pub super_types: Vec<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub parameters: Vec<Parameter>,
    pub return_type: Option<TypeRef>,
    pub extension_receiver: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationKind {
    Class(ClassInfo),
    Function(FunctionInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub id: DeclId,
    pub simple_name: String,
    pub qualified_name: String,
    pub package_name: String,
    pub parent: Option<DeclId>,
    pub location: Location,
    pub annotations: Vec<Annotation>,
    pub modifiers: Vec<Modifier>,
    pub kind: DeclarationKind,
}

impl Declaration {
    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }

    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    pub fn as_class(&self) -> Option<&ClassInfo> {
        match &self.kind {
            DeclarationKind::Class(info) => Some(info),
            DeclarationKind::Function(_) => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionInfo> {
        match &self.kind {
            DeclarationKind::Function(info) => Some(info),
            DeclarationKind::Class(_) => None,
        }
    }

    pub fn is_companion(&self) -> bool {
        self.as_class()
            .map(|c| c.class_kind == ClassKind::CompanionObject)
            .unwrap_or(false)
            || self.has_modifier(Modifier::Companion)
    }
}

// =====================================================
// Query interface
// =====================================================

/// Read-only queries over one compilation's declarations.
///
/// Implementations must return declaration lists in stable source order.
pub trait SymbolQuery: Send + Sync {
    /// All declarations carrying the annotation with this qualified name.
    fn declarations_annotated(&self, annotation: &str) -> Vec<DeclId>;

    fn declaration(&self, id: DeclId) -> &Declaration;

    /// Class-like declaration with this qualified name.
    fn find_class(&self, qualified_name: &str) -> Option<DeclId>;

    /// Whether any declaration lives in `package` (or a subpackage).
    fn has_package(&self, package: &str) -> bool;

    fn parent(&self, id: DeclId) -> Option<&Declaration> {
        self.declaration(id).parent.map(|p| self.declaration(p))
    }

    /// Whether a value of `candidate` can be used where `target` is expected,
    /// walking declared super types transitively.
    fn is_assignable(&self, target: &str, candidate: &TypeRef) -> bool {
        if candidate.nullable {
            return false;
        }

        let mut visited = HashSet::new();
        let mut pending = vec![candidate.name.clone()];

        while let Some(name) = pending.pop() {
            if name == target {
                return true;
            }
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(class) = self.find_class(&name).and_then(|id| self.declaration(id).as_class())
            {
                pending.extend(class.super_types.iter().map(|t| t.name.clone()));
            }
        }

        false
    }

    /// Star-projected type of a class declaration (`Model` or `Model<*>`).
    fn star_projected_type(&self, id: DeclId) -> TypeRef {
        let decl = self.declaration(id);
        let arity = decl
            .as_class()
            .map(|c| c.type_parameters.len())
            .unwrap_or(0);
        TypeRef::star_projected(decl.qualified_name.clone(), arity)
    }

    /// Qualifier used in type strings: nested classes are joined to their
    /// enclosing class with `$`.
    fn qualifier(&self, qualified_name: &str) -> String {
        let Some(id) = self.find_class(qualified_name) else {
            return qualified_name.to_string();
        };
        let decl = self.declaration(id);
        match self.parent(id) {
            Some(parent) if parent.as_class().is_some() => {
                format!("{}${}", self.qualifier(&parent.qualified_name), decl.simple_name)
            }
            _ => decl.qualified_name.clone(),
        }
    }

    /// Canonical type string of `ty`.
    fn type_string(&self, ty: &TypeRef) -> String {
        ty.render_with(&|name| self.qualifier(name))
    }
}

// =====================================================
// Serializable snapshot input
// =====================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub declarations: Vec<DeclarationNode>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            package: package.into(),
            declarations: Vec::new(),
        }
    }

    pub fn declare(mut self, node: impl Into<DeclarationNode>) -> Self {
        self.declarations.push(node.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeclarationNode {
    Class(ClassNode),
    Function(FunctionNode),
}

impl From<ClassNode> for DeclarationNode {
    fn from(node: ClassNode) -> Self {
        DeclarationNode::Class(node)
    }
}

impl From<FunctionNode> for DeclarationNode {
    fn from(node: FunctionNode) -> Self {
        DeclarationNode::Function(node)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassNode {
    pub name: String,
    #[serde(default)]
    pub class_kind: ClassKind,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub type_parameters: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub super_types: Vec<TypeRef>,
    #[serde(default)]
    pub members: Vec<DeclarationNode>,
}

impl ClassNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn companion() -> Self {
        Self {
            name: "Companion".to_string(),
            class_kind: ClassKind::CompanionObject,
            ..Default::default()
        }
    }

    pub fn kind(mut self, class_kind: ClassKind) -> Self {
        self.class_kind = class_kind;
        self
    }

    pub fn at(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn type_parameter(mut self, name: impl Into<String>) -> Self {
        self.type_parameters.push(name.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.properties.push(Property::new(name, ty));
        self
    }

    pub fn super_type(mut self, ty: TypeRef) -> Self {
        self.super_types.push(ty);
        self
    }

    pub fn member(mut self, node: impl Into<DeclarationNode>) -> Self {
        self.members.push(node.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionNode {
    pub name: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub return_type: Option<TypeRef>,
    #[serde(default)]
    pub receiver: Option<TypeRef>,
}

impl FunctionNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.parameters.push(Parameter::new(name, ty));
        self
    }

    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn receiver(mut self, ty: TypeRef) -> Self {
        self.receiver = Some(ty);
        self
    }
}

// =====================================================
// Frozen snapshot
// =====================================================

/// Immutable declaration table for one generation pass.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    declarations: Vec<Declaration>,
    by_annotation: HashMap<String, Vec<DeclId>>,
    classes: HashMap<String, DeclId>,
    packages: HashSet<String>,
}

impl Snapshot {
    /// Builds a snapshot, ordering files by path.
    pub fn from_files(mut files: Vec<SourceFile>) -> Result<Self> {
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut snapshot = Snapshot::default();
        for file in &files {
            snapshot.packages.insert(file.package.clone());
            for node in &file.declarations {
                snapshot.insert(file, node, None)?;
            }
        }

        let declarations = &snapshot.declarations;
        for ids in snapshot.by_annotation.values_mut() {
            ids.sort_by(|a, b| {
                let (la, lb) = (&declarations[a.0].location, &declarations[b.0].location);
                (&la.file, la.line, la.column, a.0).cmp(&(&lb.file, lb.line, lb.column, b.0))
            });
        }

        Ok(snapshot)
    }

    pub fn from_snapshot_file(file: SnapshotFile) -> Result<Self> {
        Self::from_files(file.files)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: SnapshotFile = serde_json::from_str(content)?;
        Self::from_snapshot_file(file)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    fn insert(
        &mut self,
        file: &SourceFile,
        node: &DeclarationNode,
        parent: Option<DeclId>,
    ) -> Result<DeclId> {
        let id = DeclId(self.declarations.len());
        let prefix = match parent {
            Some(p) => self.declarations[p.0].qualified_name.clone(),
            None => file.package.clone(),
        };

        let (name, line, column, annotations, modifiers) = match node {
            DeclarationNode::Class(c) => (&c.name, c.line, c.column, &c.annotations, &c.modifiers),
            DeclarationNode::Function(f) => {
                (&f.name, f.line, f.column, &f.annotations, &f.modifiers)
            }
        };

        if name.is_empty() {
            return Err(KirokError::Snapshot(format!(
                "Unnamed declaration in {} at line {}",
                file.path, line
            )));
        }

        let qualified_name = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };

        let kind = match node {
            DeclarationNode::Class(c) => DeclarationKind::Class(ClassInfo {
                class_kind: c.class_kind,
                type_parameters: c.type_parameters.clone(),
                properties: c.properties.clone(),
                super_types: c.super_types.clone(),
            }),
            DeclarationNode::Function(f) => DeclarationKind::Function(FunctionInfo {
                parameters: f.parameters.clone(),
                return_type: f.return_type.clone(),
                extension_receiver: f.receiver.clone(),
            }),
        };

        if matches!(kind, DeclarationKind::Class(_)) {
            self.classes.insert(qualified_name.clone(), id);
        }
        for annotation in annotations {
            self.by_annotation
                .entry(annotation.name.clone())
                .or_default()
                .push(id);
        }

        self.declarations.push(Declaration {
            id,
            simple_name: name.clone(),
            qualified_name,
            package_name: file.package.clone(),
            parent,
            location: Location {
                file: file.path.clone(),
                line,
                column,
            },
            annotations: annotations.clone(),
            modifiers: modifiers.clone(),
            kind,
        });

        if let DeclarationNode::Class(c) = node {
            for member in &c.members {
                self.insert(file, member, Some(id))?;
            }
        }

        Ok(id)
    }
}

impl SymbolQuery for Snapshot {
    fn declarations_annotated(&self, annotation: &str) -> Vec<DeclId> {
        self.by_annotation
            .get(annotation)
            .cloned()
            .unwrap_or_default()
    }

    fn declaration(&self, id: DeclId) -> &Declaration {
        &self.declarations[id.0]
    }

    fn find_class(&self, qualified_name: &str) -> Option<DeclId> {
        self.classes.get(qualified_name).copied()
    }

    fn has_package(&self, package: &str) -> bool {
        let nested = format!("{}.", package);
        self.packages
            .iter()
            .any(|p| p == package || p.starts_with(&nested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let marker = Annotation::new("test.Marker");
        Snapshot::from_files(vec![
            SourceFile::new("b/Second.kt", "com.b").declare(
                FunctionNode::new("later").at(1).annotated(marker.clone()),
            ),
            SourceFile::new("a/First.kt", "com.a")
                .declare(
                    ClassNode::new("Outer")
                        .at(3)
                        .super_type(TypeRef::new("com.a.Base"))
                        .member(ClassNode::new("Inner").at(4))
                        .member(FunctionNode::new("method").at(5).annotated(marker.clone())),
                )
                .declare(ClassNode::new("Base").at(10).super_type(TypeRef::new("com.a.Root")))
                .declare(FunctionNode::new("early").at(1).annotated(marker)),
        ])
        .unwrap()
    }

    #[test]
    fn test_qualified_names() {
        let snapshot = sample();
        let inner = snapshot.find_class("com.a.Outer.Inner").unwrap();
        let decl = snapshot.declaration(inner);
        assert_eq!(decl.simple_name, "Inner");
        assert_eq!(snapshot.parent(inner).unwrap().qualified_name, "com.a.Outer");
    }

    #[test]
    fn test_annotated_in_source_order() {
        let snapshot = sample();
        let names: Vec<_> = snapshot
            .declarations_annotated("test.Marker")
            .into_iter()
            .map(|id| snapshot.declaration(id).qualified_name.clone())
            .collect();
        assert_eq!(names, vec!["com.a.early", "com.a.Outer.method", "com.b.later"]);
    }

    #[test]
    fn test_annotated_missing() {
        assert!(sample().declarations_annotated("test.Absent").is_empty());
    }

    #[test]
    fn test_qualifier_for_nested_class() {
        let snapshot = sample();
        assert_eq!(snapshot.qualifier("com.a.Outer.Inner"), "com.a.Outer$Inner");
        assert_eq!(snapshot.qualifier("com.a.Outer"), "com.a.Outer");
        assert_eq!(snapshot.qualifier("kotlin.Int"), "kotlin.Int");
    }

    #[test]
    fn test_type_string() {
        let snapshot = sample();
        let ty = TypeRef::with_args(
            "kotlin.collections.List",
            vec![TypeRef::new("com.a.Outer.Inner")],
        );
        assert_eq!(
            snapshot.type_string(&ty),
            "kotlin.collections.List<com.a.Outer$Inner>"
        );
    }

    #[test]
    fn test_is_assignable_transitive() {
        let snapshot = sample();
        assert!(snapshot.is_assignable("com.a.Root", &TypeRef::new("com.a.Outer")));
        assert!(snapshot.is_assignable("com.a.Base", &TypeRef::new("com.a.Base")));
        assert!(!snapshot.is_assignable("com.a.Outer", &TypeRef::new("com.a.Base")));
        assert!(!snapshot.is_assignable("com.a.Root", &TypeRef::new("com.a.Outer").nullable()));
    }

    #[test]
    fn test_has_package() {
        let snapshot = sample();
        assert!(snapshot.has_package("com.a"));
        assert!(snapshot.has_package("com"));
        assert!(!snapshot.has_package("kotlin.wasm"));
    }

    #[test]
    fn test_star_projected_type() {
        let snapshot = Snapshot::from_files(vec![SourceFile::new("G.kt", "g").declare(
            ClassNode::new("Box").type_parameter("T"),
        )])
        .unwrap();
        let id = snapshot.find_class("g.Box").unwrap();
        assert_eq!(snapshot.star_projected_type(id).to_string(), "g.Box<*>");
    }

    #[test]
    fn test_unnamed_declaration_rejected() {
        let result =
            Snapshot::from_files(vec![SourceFile::new("X.kt", "x").declare(FunctionNode::new(""))]);
        assert!(matches!(result, Err(KirokError::Snapshot(_))));
    }

    #[test]
    fn test_from_json() {
        let snapshot = Snapshot::from_json(
            r#"{
                "files": [{
                    "path": "Counter.kt",
                    "package": "app",
                    "declarations": [
                        {
                            "kind": "class",
                            "name": "Counter",
                            "annotations": [{"name": "io.github.devngho.kirok.Model"}],
                            "properties": [{"name": "count", "type": "kotlin.Int"}]
                        },
                        {
                            "kind": "function",
                            "name": "load",
                            "annotations": [{
                                "name": "io.github.devngho.kirok.Init",
                                "arguments": [{"value": true}]
                            }],
                            "returnType": "app.Counter"
                        }
                    ]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(snapshot.len(), 2);
        let init = snapshot.declarations_annotated("io.github.devngho.kirok.Init")[0];
        let decl = snapshot.declaration(init);
        assert_eq!(
            decl.annotation("io.github.devngho.kirok.Init").unwrap().first_bool(),
            Some(true)
        );
        assert_eq!(
            decl.as_function().unwrap().return_type,
            Some(TypeRef::new("app.Counter"))
        );
    }

    #[test]
    fn test_annotation_type_argument_json() {
        let annotation: Annotation = serde_json::from_str(
            r#"{"name": "k.RetrieveWith", "arguments": [{"value": {"type": "app.HttpRetriever"}}]}"#,
        )
        .unwrap();
        assert_eq!(annotation.first_type(), Some(&TypeRef::new("app.HttpRetriever")));
        assert_eq!(annotation.first_bool(), None);
    }
}
