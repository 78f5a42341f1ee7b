//! Wrapper Synthesizer
//!
//! Turns resolved models into abstract wrapper descriptions. A wrapper is a
//! linear sequence of steps:
//!
//! ```text
//! Decode* -> [LoadModel] -> Call -> [Retrieve] -> Encode -> Return | ReturnAsync
//! ```
//!
//! Every boundary value is a string. The model travels as its own `model`
//! parameter; all remaining arguments travel as one `parameters` string holding
//! a list of independently encoded strings, decoded element by element.
//!
//! Asynchronous wrappers run every step inside one task scope created per call;
//! the emitted body returns that task's handle.

use serde::Serialize;

use crate::config::GeneratorConfig;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::resolver::retriever::RetrieverBinding;
use crate::resolver::{
    check_init, check_intent_names, check_model_type, CallingConvention, InitDescriptor,
    InitPlacement, IntentDescriptor, ModelDescriptor, RetrieverResolver, RetrieverSite,
};
use crate::symbols::{SymbolQuery, TypeRef};

/// Boundary parameter carrying the encoded model.
pub const MODEL_PARAM: &str = "model";
/// Boundary parameter carrying the encoded argument list.
pub const PARAMETERS_PARAM: &str = "parameters";

const NEXT_MODEL: &str = "nextModel";
const RESULT: &str = "result";
const RETRIEVED: &str = "retrieved";
const ENCODED: &str = "encoded";

pub const JS_EXPORT_OPT_IN: &str = "kotlin.js.ExperimentalJsExport";

// =====================================================
// Wrapper descriptions
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WrapperKind {
    Init,
    Intent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CallTarget {
    /// Top-level function, called by qualified name
    Function { qualified_name: String },
    /// Member or extension call on a local; extensions need `import`
    Member {
        receiver: String,
        name: String,
        import: Option<String>,
    },
    /// Function of the owner's companion object
    Companion { owner: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrieveStep {
    /// Variable receiving the retrieved model
    pub result: String,
    /// Variable holding the wrapped call's result
    pub source: String,
    /// Loaded model instance, intents only
    pub model_var: Option<String>,
    /// Intent name handed to the retriever, intents only
    pub intent_name: Option<String>,
    pub model_type: TypeRef,
    pub model_name: String,
    pub retriever: TypeRef,
    pub info: crate::resolver::RetrieverMetaLocation,
    pub data: crate::resolver::RetrieverMetaLocation,
}

impl RetrieveStep {
    /// Type passed to the retriever as data type, falling back to `fallback`.
    pub fn data_type(&self, fallback: &str) -> TypeRef {
        self.data
            .ty()
            .cloned()
            .unwrap_or_else(|| TypeRef::new(fallback))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step")]
pub enum Step {
    /// Decodes element `index` of the argument list into `ty`.
    Decode {
        var: String,
        index: usize,
        ty: TypeRef,
    },
    /// Decodes the `model` boundary string through the unit's load function.
    LoadModel {
        var: String,
        load_fn: String,
        source: String,
    },
    Call {
        result: Option<String>,
        target: CallTarget,
        args: Vec<String>,
    },
    Retrieve(RetrieveStep),
    Encode {
        var: String,
        value: String,
        save_fn: String,
    },
    Return {
        var: String,
    },
    ReturnAsync {
        var: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Capability {
    /// Exported to the host boundary
    BoundaryExport,
    /// Requires opting into an unstable API
    OptIn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnKind {
    SyncString,
    AsyncHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapperDescription {
    pub name: String,
    pub kind: WrapperKind,
    /// Qualified name of the wrapped function
    pub source_function: String,
    /// Boundary parameters, all string typed
    pub parameters: Vec<String>,
    pub steps: Vec<Step>,
    pub capabilities: Vec<Capability>,
    pub return_kind: ReturnKind,
}

impl WrapperDescription {
    /// Number of argument strings the wrapper decodes, the model excluded.
    pub fn boundary_arity(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Decode { .. }))
            .count()
    }

    pub fn is_async(&self) -> bool {
        self.return_kind == ReturnKind::AsyncHandle
    }

    /// Qualified names the emitted unit must import for this wrapper.
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|s| match s {
            Step::Call {
                target: CallTarget::Member {
                    import: Some(import),
                    ..
                },
                ..
            } => Some(import.as_str()),
            _ => None,
        })
    }
}

/// Everything generated for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedUnit {
    pub model: String,
    pub model_name: String,
    pub model_type: TypeRef,
    pub package: String,
    pub file_name: String,
    pub save_fn: String,
    pub load_fn: String,
    pub init: Option<WrapperDescription>,
    pub intents: Vec<WrapperDescription>,
}

impl GeneratedUnit {
    pub fn wrappers(&self) -> impl Iterator<Item = &WrapperDescription> {
        self.init.iter().chain(self.intents.iter())
    }

    /// Sorted, deduplicated imports needed by all wrappers.
    pub fn imports(&self) -> Vec<&str> {
        let mut imports: Vec<&str> = self.wrappers().flat_map(|w| w.imports()).collect();
        imports.sort_unstable();
        imports.dedup();
        imports
    }
}

// =====================================================
// Synthesis
// =====================================================

pub struct WrapperSynthesizer<'a> {
    query: &'a dyn SymbolQuery,
    config: &'a GeneratorConfig,
}

impl<'a> WrapperSynthesizer<'a> {
    pub fn new(query: &'a dyn SymbolQuery, config: &'a GeneratorConfig) -> Self {
        Self { query, config }
    }

    /// Validates `model` and synthesizes its unit. Skipped wrappers are
    /// reported to `sink`; the unit itself is always produced.
    pub fn synthesize_unit(&self, model: &ModelDescriptor, sink: &mut Diagnostics) -> GeneratedUnit {
        check_model_type(model, sink);
        let duplicates = check_intent_names(model, sink);

        let init = if check_init(model.init.as_ref(), model, sink) {
            model
                .init
                .as_ref()
                .and_then(|init| self.or_report(self.synthesize_init(init, model), sink))
        } else {
            None
        };

        let intents = model
            .intents
            .iter()
            .filter(|intent| !duplicates.contains(&intent.name))
            .filter_map(|intent| self.or_report(self.synthesize_intent(intent, model), sink))
            .collect();

        GeneratedUnit {
            model: model.qualified_name.clone(),
            model_name: model.name.clone(),
            model_type: model.ty.clone(),
            package: self.config.generated_package(&model.package_name),
            file_name: format!("{}Kirok", model.name),
            save_fn: format!("save{}", model.name),
            load_fn: format!("load{}", model.name),
            init,
            intents,
        }
    }

    fn or_report(
        &self,
        result: Result<WrapperDescription>,
        sink: &mut Diagnostics,
    ) -> Option<WrapperDescription> {
        match result {
            Ok(wrapper) => Some(wrapper),
            Err(e) => {
                let message = match e {
                    crate::error::KirokError::Resolution(message) => message,
                    other => other.to_string(),
                };
                sink.error(None, message);
                None
            }
        }
    }

    fn bind(
        &self,
        function: crate::symbols::DeclId,
        model: &ModelDescriptor,
        site: RetrieverSite,
    ) -> Result<RetrieverBinding> {
        RetrieverResolver::new(self.query, self.config).bind(function, model.decl, site)
    }

    pub fn synthesize_init(
        &self,
        init: &InitDescriptor,
        model: &ModelDescriptor,
    ) -> Result<WrapperDescription> {
        let mut steps = decode_steps(&init.parameters);
        let args: Vec<String> = (0..init.parameters.len()).map(arg_name).collect();

        let target = match &init.placement {
            InitPlacement::Companion { owner } => CallTarget::Companion {
                owner: owner.clone(),
                name: init.name.clone(),
            },
            _ => CallTarget::Function {
                qualified_name: init.qualified_name.clone(),
            },
        };

        steps.push(Step::Call {
            result: Some(RESULT.to_string()),
            target,
            args,
        });

        let encoded_value = if init.uses_retriever {
            let binding = self.bind(init.decl, model, RetrieverSite::Init)?;
            steps.push(retrieve_step(binding, model, None));
            RETRIEVED
        } else {
            RESULT
        };

        Ok(finish(
            format!("init{}", model.name),
            WrapperKind::Init,
            &init.qualified_name,
            false,
            steps,
            encoded_value,
            model,
            init.is_suspending(),
        ))
    }

    pub fn synthesize_intent(
        &self,
        intent: &IntentDescriptor,
        model: &ModelDescriptor,
    ) -> Result<WrapperDescription> {
        let arguments = intent.arguments();
        let mut steps = decode_steps(arguments);

        steps.push(Step::LoadModel {
            var: NEXT_MODEL.to_string(),
            load_fn: format!("load{}", model.name),
            source: MODEL_PARAM.to_string(),
        });

        let mut args: Vec<String> = (0..arguments.len()).map(arg_name).collect();
        let target = match intent.convention {
            CallingConvention::FreeFunction => {
                args.insert(0, NEXT_MODEL.to_string());
                CallTarget::Function {
                    qualified_name: intent.qualified_name.clone(),
                }
            }
            CallingConvention::Method => CallTarget::Member {
                receiver: NEXT_MODEL.to_string(),
                name: intent.name.clone(),
                import: None,
            },
            CallingConvention::ExtensionFunction => CallTarget::Member {
                receiver: NEXT_MODEL.to_string(),
                name: intent.name.clone(),
                import: Some(intent.qualified_name.clone()),
            },
        };

        let returns_model = intent
            .return_type
            .as_ref()
            .map(|ty| !ty.nullable && ty.name == model.qualified_name)
            .unwrap_or(false);
        let captures_result = intent.uses_retriever || returns_model;

        steps.push(Step::Call {
            result: captures_result.then(|| RESULT.to_string()),
            target,
            args,
        });

        // Mutating intents return nothing useful; the loaded instance is the next state.
        let encoded_value = if intent.uses_retriever {
            let binding = self.bind(intent.decl, model, RetrieverSite::Intent)?;
            steps.push(retrieve_step(binding, model, Some(intent)));
            RETRIEVED
        } else if returns_model {
            RESULT
        } else {
            NEXT_MODEL
        };

        Ok(finish(
            format!("{}{}", intent.name, model.name),
            WrapperKind::Intent,
            &intent.qualified_name,
            true,
            steps,
            encoded_value,
            model,
            intent.is_suspending(),
        ))
    }
}

fn arg_name(index: usize) -> String {
    format!("arg{}", index)
}

fn decode_steps(parameters: &[crate::symbols::Parameter]) -> Vec<Step> {
    parameters
        .iter()
        .enumerate()
        .map(|(index, p)| Step::Decode {
            var: arg_name(index),
            index,
            ty: p.ty.clone(),
        })
        .collect()
}

fn retrieve_step(
    binding: RetrieverBinding,
    model: &ModelDescriptor,
    intent: Option<&IntentDescriptor>,
) -> Step {
    Step::Retrieve(RetrieveStep {
        result: RETRIEVED.to_string(),
        source: RESULT.to_string(),
        model_var: intent.map(|_| NEXT_MODEL.to_string()),
        intent_name: intent.map(|i| i.name.clone()),
        model_type: model.ty.clone(),
        model_name: model.qualified_name.clone(),
        retriever: binding.retriever,
        info: binding.info,
        data: binding.data,
    })
}

#[allow(clippy::too_many_arguments)]
fn finish(
    name: String,
    kind: WrapperKind,
    source_function: &str,
    takes_model: bool,
    mut steps: Vec<Step>,
    encoded_value: &str,
    model: &ModelDescriptor,
    is_async: bool,
) -> WrapperDescription {
    let mut parameters = Vec::new();
    if takes_model {
        parameters.push(MODEL_PARAM.to_string());
    }
    if steps.iter().any(|s| matches!(s, Step::Decode { .. })) {
        parameters.push(PARAMETERS_PARAM.to_string());
    }

    steps.push(Step::Encode {
        var: ENCODED.to_string(),
        value: encoded_value.to_string(),
        save_fn: format!("save{}", model.name),
    });

    let return_kind = if is_async {
        steps.push(Step::ReturnAsync {
            var: ENCODED.to_string(),
        });
        ReturnKind::AsyncHandle
    } else {
        steps.push(Step::Return {
            var: ENCODED.to_string(),
        });
        ReturnKind::SyncString
    };

    WrapperDescription {
        name,
        kind,
        source_function: source_function.to_string(),
        parameters,
        steps,
        capabilities: vec![
            Capability::OptIn(JS_EXPORT_OPT_IN.to_string()),
            Capability::BoundaryExport,
        ],
        return_kind,
    }
}
