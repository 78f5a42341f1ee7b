//! Manifest consumer for downstream binding generators.
//!
//! Reads `kirok_model.json` back into [`BindingModel`]s. Type strings are
//! parsed into [`TypeRef`]s and every name is resolved either through the fixed
//! builtin table or through a pluggable [`TypeResolver`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::error::{KirokError, Result};
use crate::manifest::{ManifestDocument, ParameterMap, SUSPEND_PREFIX};
use crate::symbols::{SymbolQuery, TypeRef};

// =====================================================
// Builtin types
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Int,
    String,
    Boolean,
    Double,
    Float,
    Long,
    Short,
    Byte,
    Char,
    List,
    Map,
    Set,
    Collection,
    MutableList,
    MutableMap,
    MutableSet,
    MutableCollection,
}

const BUILTIN_NAMES: &[(&str, BuiltinType)] = &[
    ("kotlin.Int", BuiltinType::Int),
    ("kotlin.String", BuiltinType::String),
    ("kotlin.Boolean", BuiltinType::Boolean),
    ("kotlin.Double", BuiltinType::Double),
    ("kotlin.Float", BuiltinType::Float),
    ("kotlin.Long", BuiltinType::Long),
    ("kotlin.Short", BuiltinType::Short),
    ("kotlin.Byte", BuiltinType::Byte),
    ("kotlin.Char", BuiltinType::Char),
    ("kotlin.collections.List", BuiltinType::List),
    ("kotlin.collections.Map", BuiltinType::Map),
    ("kotlin.collections.Set", BuiltinType::Set),
    ("kotlin.collections.Collection", BuiltinType::Collection),
    ("kotlin.collections.MutableList", BuiltinType::MutableList),
    ("kotlin.collections.MutableMap", BuiltinType::MutableMap),
    ("kotlin.collections.MutableSet", BuiltinType::MutableSet),
    ("kotlin.collections.MutableCollection", BuiltinType::MutableCollection),
];

static BUILTINS: Lazy<HashMap<&'static str, BuiltinType>> =
    Lazy::new(|| BUILTIN_NAMES.iter().copied().collect());

impl BuiltinType {
    pub fn lookup(qualified_name: &str) -> Option<Self> {
        BUILTINS.get(qualified_name).copied()
    }

    pub fn is_collection(&self) -> bool {
        !matches!(
            self,
            BuiltinType::Int
                | BuiltinType::String
                | BuiltinType::Boolean
                | BuiltinType::Double
                | BuiltinType::Float
                | BuiltinType::Long
                | BuiltinType::Short
                | BuiltinType::Byte
                | BuiltinType::Char
        )
    }
}

// =====================================================
// Resolution
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Builtin(BuiltinType),
    /// A user type, by the qualified name the resolver accepted
    Declared(String),
}

/// Hook for names outside the builtin table.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, qualified_name: &str) -> Option<TypeKind>;
}

/// Accepts every name as a declared type.
pub struct OpaqueResolver;

impl TypeResolver for OpaqueResolver {
    fn resolve(&self, qualified_name: &str) -> Option<TypeKind> {
        Some(TypeKind::Declared(qualified_name.to_string()))
    }
}

/// Accepts names of classes declared in a snapshot. Nested classes may be
/// written with `$`.
pub struct SnapshotTypeResolver<'a> {
    query: &'a dyn SymbolQuery,
}

impl<'a> SnapshotTypeResolver<'a> {
    pub fn new(query: &'a dyn SymbolQuery) -> Self {
        Self { query }
    }
}

impl TypeResolver for SnapshotTypeResolver<'_> {
    fn resolve(&self, qualified_name: &str) -> Option<TypeKind> {
        let name = qualified_name.replace('$', ".");
        self.query
            .find_class(&name)
            .map(|id| TypeKind::Declared(self.query.declaration(id).qualified_name.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub descriptor: TypeRef,
    pub kind: TypeKind,
    /// `None` for star projections
    pub arguments: Vec<Option<ResolvedType>>,
}

impl ResolvedType {
    pub fn resolve(descriptor: &TypeRef, resolver: &dyn TypeResolver) -> Result<Self> {
        let kind = match BuiltinType::lookup(&descriptor.name) {
            Some(builtin) => TypeKind::Builtin(builtin),
            None => resolver.resolve(&descriptor.name).ok_or_else(|| {
                KirokError::Manifest(format!("Failed to resolve type {}", descriptor.name))
            })?,
        };

        let arguments = descriptor
            .arguments
            .iter()
            .map(|arg| {
                arg.ty
                    .as_ref()
                    .map(|ty| Self::resolve(ty, resolver))
                    .transpose()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            descriptor: descriptor.clone(),
            kind,
            arguments,
        })
    }

    pub fn parse(text: &str, resolver: &dyn TypeResolver) -> Result<Self> {
        Self::resolve(&TypeRef::parse(text)?, resolver)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, TypeKind::Builtin(builtin) if builtin.is_collection())
    }
}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

// =====================================================
// Binding models
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingIntent {
    pub name: String,
    pub is_async: bool,
    pub parameters: IndexMap<String, ResolvedType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingModel {
    pub name: String,
    pub values: IndexMap<String, ResolvedType>,
    pub intents: Vec<BindingIntent>,
    pub init: IndexMap<String, ResolvedType>,
    pub is_init_suspend: bool,
}

fn resolve_map(
    map: &ParameterMap,
    resolver: &dyn TypeResolver,
) -> Result<IndexMap<String, ResolvedType>> {
    map.iter()
        .map(|(name, ty)| Ok((name.clone(), ResolvedType::parse(ty, resolver)?)))
        .collect()
}

pub fn load_binding_models(
    document: &ManifestDocument,
    resolver: &dyn TypeResolver,
) -> Result<Vec<BindingModel>> {
    document
        .models
        .iter()
        .map(|(name, data)| {
            let intents = data
                .intents
                .iter()
                .map(|(key, parameters)| {
                    let (name, is_async) = match key.strip_prefix(SUSPEND_PREFIX) {
                        Some(stripped) => (stripped, true),
                        None => (key.as_str(), false),
                    };
                    Ok(BindingIntent {
                        name: name.to_string(),
                        is_async,
                        parameters: resolve_map(parameters, resolver)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(BindingModel {
                name: name.to_string(),
                values: resolve_map(&data.values, resolver)?,
                intents,
                init: resolve_map(&data.init, resolver)?,
                is_init_suspend: data.is_init_suspend,
            })
        })
        .collect()
}

/// Reads a manifest file and resolves its models.
pub fn load_binding_models_from(path: &Path, resolver: &dyn TypeResolver) -> Result<Vec<BindingModel>> {
    let document = ManifestDocument::load(path)?;
    load_binding_models(&document, resolver)
}

/// A downstream generator producing host-side call stubs.
pub trait Binding: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, out_dir: &Path, models: &[BindingModel]) -> Result<()>;
}
