pub mod binding;
pub mod config;
pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod generator;
pub mod manifest;
pub mod resolver;
pub mod symbols;
pub mod synth;

pub use binding::{
    load_binding_models, load_binding_models_from, Binding, BindingIntent, BindingModel,
    BuiltinType, OpaqueResolver, ResolvedType, SnapshotTypeResolver, TypeKind, TypeResolver,
};
pub use config::{AnnotationNames, GeneratorConfig, CONFIG_FILENAME};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use emit::{Emitter, KotlinEmitter};
pub use error::{KirokError, Result};
pub use generator::{
    write_if_changed, write_output, GenerationOutput, Generator, ModelReport, RetrieverReport,
    WriteSummary,
};
pub use manifest::{export_manifest, write_manifest, ManifestDocument, ModelData, ParameterMap};
pub use resolver::retriever::RetrieverBinding;
pub use resolver::{
    CallingConvention, DeclarationResolver, InitDescriptor, InitPlacement, IntentDescriptor,
    ModelDescriptor, RetrieverMetaLocation, RetrieverResolver, RetrieverSite,
};
pub use symbols::{
    Annotation, AnnotationValue, ClassKind, ClassNode, DeclId, Declaration, FunctionNode, Modifier,
    Parameter, Snapshot, SnapshotFile, SnapshotLoader, SourceFile, SymbolQuery, TypeArgument,
    TypeRef, Variance,
};
pub use synth::{
    CallTarget, Capability, GeneratedUnit, ReturnKind, Step, WrapperDescription, WrapperKind,
    WrapperSynthesizer,
};
