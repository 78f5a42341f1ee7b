//! Retriever Binding Resolver
//!
//! A retriever-backed init or intent hands two values to its retriever: an
//! *info* value (retriever configuration, typed by the retriever's
//! `Retriever<Info>` super type) and a *data* value (any `RetrieverData`).
//! Each of them is looked up in a fixed priority order, first match wins:
//!
//! 1. the wrapped function's return value itself
//! 2. one half of a `Pair` returned by the wrapped function (first = info,
//!    second = data)
//! 3. a `@RetrieveInfo` / `@RetrieveData` method on the model (intents only,
//!    an init call has no model instance yet)
//! 4. a `@RetrieveInfo` / `@RetrieveData` function in the model's companion
//! 5. nothing, a neutral default is substituted at emission time

use serde::Serialize;

use crate::config::GeneratorConfig;
use crate::error::{KirokError, Result};
use crate::symbols::{DeclId, Declaration, SymbolQuery, TypeRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "location")]
pub enum RetrieverMetaLocation {
    ReturnValueSingle {
        ty: TypeRef,
    },
    ReturnValuePair {
        ty: TypeRef,
    },
    Method {
        #[serde(skip)]
        function: DeclId,
        name: String,
        ty: TypeRef,
    },
    Companion {
        #[serde(skip)]
        function: DeclId,
        name: String,
        ty: TypeRef,
    },
    None {
        ty: Option<TypeRef>,
    },
}

impl RetrieverMetaLocation {
    pub fn ty(&self) -> Option<&TypeRef> {
        match self {
            RetrieverMetaLocation::ReturnValueSingle { ty }
            | RetrieverMetaLocation::ReturnValuePair { ty }
            | RetrieverMetaLocation::Method { ty, .. }
            | RetrieverMetaLocation::Companion { ty, .. } => Some(ty),
            RetrieverMetaLocation::None { ty } => ty.as_ref(),
        }
    }
}

/// Which kind of wrapper the lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverSite {
    Init,
    Intent,
}

/// Full retriever binding of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrieverBinding {
    pub retriever: TypeRef,
    pub info: RetrieverMetaLocation,
    pub data: RetrieverMetaLocation,
}

pub struct RetrieverResolver<'a> {
    query: &'a dyn SymbolQuery,
    config: &'a GeneratorConfig,
}

impl<'a> RetrieverResolver<'a> {
    pub fn new(query: &'a dyn SymbolQuery, config: &'a GeneratorConfig) -> Self {
        Self { query, config }
    }

    /// Resolves retriever, info and data for `function` of `model`.
    pub fn bind(&self, function: DeclId, model: DeclId, site: RetrieverSite) -> Result<RetrieverBinding> {
        let retriever = self.find_retriever(function, model)?;
        let info = self.find_retriever_info(&retriever, function, model, site);
        let data = self.find_retriever_data(function, model, site);
        tracing::debug!(
            "Retriever for {}: {} (info {:?}, data {:?})",
            self.query.declaration(function).qualified_name,
            retriever,
            info,
            data
        );
        Ok(RetrieverBinding {
            retriever,
            info,
            data,
        })
    }

    fn find_retriever_at(&self, declaration: &Declaration) -> Result<Option<TypeRef>> {
        let Some(annotation) = declaration.annotation(&self.config.annotations.retrieve_with) else {
            return Ok(None);
        };

        match annotation.first_type() {
            Some(ty) => Ok(Some(ty.clone())),
            None => Err(KirokError::Resolution(format!(
                "Retriever not found for function {}",
                declaration.qualified_name
            ))),
        }
    }

    /// `@RetrieveWith` on the function, else on the model.
    pub fn find_retriever(&self, function: DeclId, model: DeclId) -> Result<TypeRef> {
        let function_decl = self.query.declaration(function);

        if let Some(retriever) = self.find_retriever_at(function_decl)? {
            return Ok(retriever);
        }
        if let Some(retriever) = self.find_retriever_at(self.query.declaration(model))? {
            return Ok(retriever);
        }

        Err(KirokError::Resolution(format!(
            "Retriever not found for function {}",
            function_decl.qualified_name
        )))
    }

    /// Info type of a retriever: first type argument of its first super type.
    pub fn info_type(&self, retriever: &TypeRef) -> Option<TypeRef> {
        let id = self.query.find_class(&retriever.name)?;
        let class = self.query.declaration(id).as_class()?;
        class.super_types.first()?.argument(0).cloned()
    }

    fn return_type(&self, function: DeclId) -> Option<&TypeRef> {
        self.query
            .declaration(function)
            .as_function()
            .and_then(|f| f.return_type.as_ref())
    }

    fn pair_element<'t>(&self, ty: &'t TypeRef, index: usize) -> Option<&'t TypeRef> {
        if ty.name == self.config.pair_type {
            ty.argument(index)
        } else {
            None
        }
    }

    /// Providers annotated `annotation` declared on the model (methods) and in
    /// any object nested in it (companion).
    fn providers(&self, annotation: &str, model: DeclId) -> (Vec<&'a Declaration>, Vec<&'a Declaration>) {
        let query = self.query;
        let mut methods = Vec::new();
        let mut companions = Vec::new();

        for id in query.declarations_annotated(annotation) {
            let decl = query.declaration(id);
            if decl.as_function().is_none() {
                continue;
            }
            if decl.parent == Some(model) {
                methods.push(decl);
            } else if query.parent(id).and_then(|p| p.parent) == Some(model) {
                companions.push(decl);
            }
        }

        (methods, companions)
    }

    fn provider_return(decl: &Declaration) -> Option<&TypeRef> {
        decl.as_function().and_then(|f| f.return_type.as_ref())
    }

    pub fn find_retriever_info(
        &self,
        retriever: &TypeRef,
        function: DeclId,
        model: DeclId,
        site: RetrieverSite,
    ) -> RetrieverMetaLocation {
        let Some(info_type) = self.info_type(retriever) else {
            return RetrieverMetaLocation::None { ty: None };
        };

        if let Some(ret) = self.return_type(function) {
            if ret == &info_type {
                return RetrieverMetaLocation::ReturnValueSingle { ty: info_type };
            }
            if self.pair_element(ret, 0) == Some(&info_type) {
                return RetrieverMetaLocation::ReturnValuePair { ty: info_type };
            }
        }

        let (methods, companions) = self.providers(&self.config.annotations.retrieve_info, model);

        if site == RetrieverSite::Intent {
            if let Some(m) = methods
                .iter()
                .find(|m| Self::provider_return(m) == Some(&info_type))
            {
                return RetrieverMetaLocation::Method {
                    function: m.id,
                    name: m.simple_name.clone(),
                    ty: info_type,
                };
            }
        }

        if let Some(c) = companions
            .iter()
            .find(|c| Self::provider_return(c) == Some(&info_type))
        {
            return RetrieverMetaLocation::Companion {
                function: c.id,
                name: c.simple_name.clone(),
                ty: info_type,
            };
        }

        RetrieverMetaLocation::None { ty: Some(info_type) }
    }

    pub fn find_retriever_data(
        &self,
        function: DeclId,
        model: DeclId,
        site: RetrieverSite,
    ) -> RetrieverMetaLocation {
        let data_type = &self.config.retriever_data_type;
        let assignable = |ty: &TypeRef| self.query.is_assignable(data_type, ty);

        if let Some(ret) = self.return_type(function) {
            if assignable(ret) {
                return RetrieverMetaLocation::ReturnValueSingle { ty: ret.clone() };
            }
            if let Some(second) = self.pair_element(ret, 1) {
                if assignable(second) {
                    return RetrieverMetaLocation::ReturnValuePair { ty: second.clone() };
                }
            }
        }

        let (methods, companions) = self.providers(&self.config.annotations.retrieve_data, model);

        let provided = |decl: &Declaration| {
            Self::provider_return(decl)
                .map(|ty| assignable(ty))
                .unwrap_or(false)
        };

        if site == RetrieverSite::Intent {
            if let Some(m) = methods.iter().find(|m| provided(m)) {
                return RetrieverMetaLocation::Method {
                    function: m.id,
                    name: m.simple_name.clone(),
                    ty: Self::provider_return(m).cloned().unwrap_or_else(|| TypeRef::new(data_type)),
                };
            }
        }

        if let Some(c) = companions.iter().find(|c| provided(c)) {
            return RetrieverMetaLocation::Companion {
                function: c.id,
                name: c.simple_name.clone(),
                ty: Self::provider_return(c).cloned().unwrap_or_else(|| TypeRef::new(data_type)),
            };
        }

        RetrieverMetaLocation::None {
            ty: Some(TypeRef::new(data_type)),
        }
    }
}
