//! Kotlin/Wasm renderer.
//!
//! Encoding goes through `kotlinx.serialization` JSON; asynchronous wrappers
//! return a `Promise` driven by a coroutine scope created for that call only.

use crate::error::Result;
use crate::resolver::RetrieverMetaLocation;
use crate::synth::{
    CallTarget, Capability, GeneratedUnit, RetrieveStep, ReturnKind, Step, WrapperDescription,
    PARAMETERS_PARAM,
};

use super::Emitter;

const INDENT: &str = "    ";
const ASYNC_RETURN_TYPE: &str = "kotlin.js.Promise<kotlin.js.JsAny?>";

#[derive(Default)]
struct CodeWriter {
    out: String,
    depth: usize,
}

impl CodeWriter {
    fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn open(&mut self, text: impl AsRef<str>) {
        self.line(format!("{} {{", text.as_ref()));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn finish(self) -> String {
        self.out
    }
}

pub struct KotlinEmitter {
    /// Data type used for anonymous data when no type was resolved
    retriever_data_type: String,
}

impl KotlinEmitter {
    pub fn new(retriever_data_type: impl Into<String>) -> Self {
        Self {
            retriever_data_type: retriever_data_type.into(),
        }
    }

    fn emit_header(&self, w: &mut CodeWriter, unit: &GeneratedUnit) {
        w.line(format!(
            "// Generated by kirok-gen from {}. Do not edit.",
            unit.model
        ));
        w.line(format!("package {}", unit.package));
        w.line("");

        let mut imports = vec![
            "kotlinx.serialization.decodeFromString",
            "kotlinx.serialization.encodeToString",
            "kotlinx.serialization.json.Json",
        ];
        if unit.wrappers().any(|wrapper| wrapper.is_async()) {
            imports.extend([
                "kotlinx.coroutines.CoroutineScope",
                "kotlinx.coroutines.Job",
                "kotlinx.coroutines.promise",
            ]);
        }
        imports.extend(unit.imports());
        imports.sort_unstable();
        imports.dedup();

        for import in imports {
            w.line(format!("import {}", import));
        }
        w.line("");
    }

    fn emit_save_load(&self, w: &mut CodeWriter, unit: &GeneratedUnit) {
        w.line(format!(
            "fun {}(model: {}): String = Json.encodeToString(model)",
            unit.save_fn, unit.model_type
        ));
        w.line("");
        w.line(format!(
            "fun {}(model: String): {} = Json.decodeFromString<{}>(model)",
            unit.load_fn, unit.model_type, unit.model_type
        ));
    }

    fn emit_wrapper(&self, w: &mut CodeWriter, wrapper: &WrapperDescription) {
        w.line("");
        for capability in &wrapper.capabilities {
            match capability {
                Capability::OptIn(api) => w.line(format!("@OptIn({}::class)", api)),
                Capability::BoundaryExport => w.line("@JsExport"),
            }
        }

        let params = wrapper
            .parameters
            .iter()
            .map(|p| format!("{}: String", p))
            .collect::<Vec<_>>()
            .join(", ");
        let return_type = match wrapper.return_kind {
            ReturnKind::SyncString => "String",
            ReturnKind::AsyncHandle => ASYNC_RETURN_TYPE,
        };

        w.open(format!("fun {}({}): {}", wrapper.name, params, return_type));
        if wrapper.is_async() {
            w.open("return CoroutineScope(Job()).promise");
        }

        let mut list_decoded = false;
        for step in &wrapper.steps {
            if matches!(step, Step::Decode { .. }) && !list_decoded {
                w.line(format!(
                    "val list = Json.decodeFromString<List<String>>({})",
                    PARAMETERS_PARAM
                ));
                list_decoded = true;
            }
            self.emit_step(w, step);
        }

        if wrapper.is_async() {
            w.close();
        }
        w.close();
    }

    fn emit_step(&self, w: &mut CodeWriter, step: &Step) {
        match step {
            Step::Decode { var, index, ty } => {
                w.line(format!(
                    "val {} = Json.decodeFromString<{}>(list[{}])",
                    var, ty, index
                ));
            }
            Step::LoadModel {
                var,
                load_fn,
                source,
            } => w.line(format!("val {} = {}({})", var, load_fn, source)),
            Step::Call {
                result,
                target,
                args,
            } => {
                let args = args.join(", ");
                let call = match target {
                    CallTarget::Function { qualified_name } => format!("{}({})", qualified_name, args),
                    CallTarget::Member { receiver, name, .. } => {
                        format!("{}.{}({})", receiver, name, args)
                    }
                    CallTarget::Companion { owner, name } => format!("{}.{}({})", owner, name, args),
                };
                match result {
                    Some(result) => w.line(format!("val {} = {}", result, call)),
                    None => w.line(call),
                }
            }
            Step::Retrieve(retrieve) => self.emit_retrieve(w, retrieve),
            Step::Encode {
                var,
                value,
                save_fn,
            } => w.line(format!("val {} = {}({})", var, save_fn, value)),
            Step::Return { var } => w.line(format!("return {}", var)),
            Step::ReturnAsync { var } => w.line(format!("return@promise {}.toJsString()", var)),
        }
    }

    fn provider_call(owner: &str, model_var: Option<&str>, location: &RetrieverMetaLocation) -> Option<String> {
        match location {
            RetrieverMetaLocation::Method { name, .. } => {
                model_var.map(|var| format!("{}.{}()", var, name))
            }
            RetrieverMetaLocation::Companion { name, .. } => Some(format!("{}.{}()", owner, name)),
            _ => None,
        }
    }

    fn emit_retrieve(&self, w: &mut CodeWriter, step: &RetrieveStep) {
        let model_var = step.model_var.as_deref();
        let data_type = step.data_type(&self.retriever_data_type);

        let info = match &step.info {
            RetrieverMetaLocation::ReturnValueSingle { .. } => step.source.clone(),
            RetrieverMetaLocation::ReturnValuePair { .. } => format!("{}.first", step.source),
            other => Self::provider_call(&step.model_name, model_var, other)
                .unwrap_or_else(|| "null".to_string()),
        };
        let data = match &step.data {
            RetrieverMetaLocation::ReturnValueSingle { .. } => step.source.clone(),
            RetrieverMetaLocation::ReturnValuePair { .. } => format!("{}.second", step.source),
            other => Self::provider_call(&step.model_name, model_var, other)
                .unwrap_or_else(|| format!("object : {} {{}}", data_type)),
        };

        w.line(format!("val info = {}", info));
        w.line(format!("val data = {}", data));

        let class_args = format!(
            "{}::class, {}::class, \"{}\", \"{}\", data",
            step.model_name, data_type.name, step.model_name, data_type.name
        );
        let call = match (&step.intent_name, model_var) {
            (Some(intent), Some(var)) => format!(
                "{}.intent(info, \"{}\", {}, {})",
                step.retriever.name, intent, var, class_args
            ),
            _ => format!("{}.retrieve(info, {})", step.retriever.name, class_args),
        };
        w.line(format!("val {} = {}", step.result, call));
    }
}

impl Default for KotlinEmitter {
    fn default() -> Self {
        Self::new(crate::config::GeneratorConfig::default().retriever_data_type)
    }
}

impl Emitter for KotlinEmitter {
    fn name(&self) -> &'static str {
        "kotlin"
    }

    fn file_extension(&self) -> &'static str {
        "kt"
    }

    fn emit(&self, unit: &GeneratedUnit) -> Result<String> {
        let mut w = CodeWriter::default();
        self.emit_header(&mut w, unit);
        self.emit_save_load(&mut w, unit);
        for wrapper in unit.wrappers() {
            self.emit_wrapper(&mut w, wrapper);
        }
        Ok(w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::diagnostics::Diagnostics;
    use crate::resolver::test_support::*;
    use crate::resolver::DeclarationResolver;
    use crate::symbols::{ClassNode, FunctionNode, Modifier, Snapshot, SourceFile, TypeRef};
    use crate::synth::WrapperSynthesizer;
    use std::path::PathBuf;

    fn emit(files: Vec<SourceFile>) -> (GeneratedUnit, String) {
        let snapshot = Snapshot::from_files(files).unwrap();
        let config = GeneratorConfig::default();
        let resolver = DeclarationResolver::new(&snapshot, &config);
        let model = resolver.resolve_model(resolver.discover_models()[0]);
        let unit = WrapperSynthesizer::new(&snapshot, &config)
            .synthesize_unit(&model, &mut Diagnostics::new());
        let source = KotlinEmitter::default().emit(&unit).unwrap();
        (unit, source)
    }

    fn counter() -> SourceFile {
        SourceFile::new("app/Counter.kt", "app")
            .declare(
                ClassNode::new("Counter")
                    .annotated(model())
                    .property("count", int()),
            )
            .declare(
                FunctionNode::new("createCounter")
                    .at(2)
                    .annotated(init())
                    .returns(crate::resolver::test_support::counter()),
            )
            .declare(
                FunctionNode::new("increment")
                    .at(3)
                    .annotated(intent())
                    .param("c", crate::resolver::test_support::counter())
                    .param("by", int())
                    .returns(crate::resolver::test_support::counter()),
            )
    }

    #[test]
    fn test_emit_counter() {
        let (_, source) = emit(vec![counter()]);

        assert!(source.starts_with("// Generated by kirok-gen from app.Counter."));
        assert!(source.contains("package app._kirok\n"));
        assert!(source.contains("fun saveCounter(model: app.Counter): String = Json.encodeToString(model)"));
        assert!(source.contains(
            "fun loadCounter(model: String): app.Counter = Json.decodeFromString<app.Counter>(model)"
        ));
        assert!(source.contains("@JsExport\nfun initCounter(): String {\n"));
        assert!(source.contains("    val result = app.createCounter()\n"));
        assert!(source.contains("fun incrementCounter(model: String, parameters: String): String {"));
        assert!(source.contains("    val list = Json.decodeFromString<List<String>>(parameters)\n"));
        assert!(source.contains("    val arg0 = Json.decodeFromString<kotlin.Int>(list[0])\n"));
        assert!(source.contains("    val result = app.increment(nextModel, arg0)\n"));
        assert!(source.contains("    return encoded\n"));
        assert!(!source.contains("CoroutineScope"));
    }

    #[test]
    fn test_emit_async_extension() {
        let (_, source) = emit(vec![counter().declare(
            FunctionNode::new("double")
                .at(4)
                .annotated(intent())
                .modifier(Modifier::Suspend)
                .receiver(crate::resolver::test_support::counter()),
        )]);

        assert!(source.contains("import app.double\n"));
        assert!(source.contains("import kotlinx.coroutines.promise\n"));
        assert!(source.contains(&format!(
            "fun doubleCounter(model: String): {} {{\n    return CoroutineScope(Job()).promise {{\n",
            ASYNC_RETURN_TYPE
        )));
        assert!(source.contains("        nextModel.double()\n"));
        assert!(source.contains("        return@promise encoded.toJsString()\n"));
    }

    #[test]
    fn test_emit_retriever_intent() {
        let files = vec![
            SourceFile::new("app/Lib.kt", "app")
                .declare(ClassNode::new("Info"))
                .declare(ClassNode::new("Query").super_type(TypeRef::new(
                    "io.github.devngho.kirok.RetrieverData",
                )))
                .declare(ClassNode::new("Http").super_type(TypeRef::with_args(
                    "io.github.devngho.kirok.Retriever",
                    vec![TypeRef::new("app.Info")],
                ))),
            counter().declare(
                FunctionNode::new("fetch")
                    .at(5)
                    .annotated(retriever_intent())
                    .annotated(retrieve_with("app.Http"))
                    .param("c", crate::resolver::test_support::counter())
                    .returns(TypeRef::with_args(
                        "kotlin.Pair",
                        vec![TypeRef::new("app.Info"), TypeRef::new("app.Query")],
                    )),
            ),
        ];
        let (_, source) = emit(files);

        assert!(source.contains("        val result = app.fetch(nextModel)\n"));
        assert!(source.contains("        val info = result.first\n"));
        assert!(source.contains("        val data = result.second\n"));
        assert!(source.contains(
            "        val retrieved = app.Http.intent(info, \"fetch\", nextModel, app.Counter::class, app.Query::class, \"app.Counter\", \"app.Query\", data)\n"
        ));
        assert!(source.contains("        val encoded = saveCounter(retrieved)\n"));
    }

    #[test]
    fn test_emit_none_locations() {
        let files = vec![
            SourceFile::new("app/Lib.kt", "app")
                .declare(ClassNode::new("Info"))
                .declare(ClassNode::new("Http").super_type(TypeRef::with_args(
                    "io.github.devngho.kirok.Retriever",
                    vec![TypeRef::new("app.Info")],
                ))),
            counter().declare(
                FunctionNode::new("sync")
                    .at(5)
                    .annotated(retriever_intent())
                    .annotated(retrieve_with("app.Http"))
                    .param("c", crate::resolver::test_support::counter()),
            ),
        ];
        let (_, source) = emit(files);

        assert!(source.contains("        val info = null\n"));
        assert!(source.contains(
            "        val data = object : io.github.devngho.kirok.RetrieverData {}\n"
        ));
    }

    #[test]
    fn test_emit_provider_calls() {
        let files = vec![
            SourceFile::new("app/Lib.kt", "app")
                .declare(ClassNode::new("Info"))
                .declare(ClassNode::new("Query").super_type(TypeRef::new(
                    "io.github.devngho.kirok.RetrieverData",
                )))
                .declare(ClassNode::new("Http").super_type(TypeRef::with_args(
                    "io.github.devngho.kirok.Retriever",
                    vec![TypeRef::new("app.Info")],
                ))),
            SourceFile::new("app/Counter.kt", "app")
                .declare(
                    ClassNode::new("Counter")
                        .annotated(model())
                        .annotated(retrieve_with("app.Http"))
                        .member(
                            FunctionNode::new("endpoint")
                                .at(2)
                                .annotated(retrieve_info())
                                .returns(TypeRef::new("app.Info")),
                        )
                        .member(
                            ClassNode::companion().at(3).member(
                                FunctionNode::new("query")
                                    .at(4)
                                    .annotated(retrieve_data())
                                    .returns(TypeRef::new("app.Query")),
                            ),
                        ),
                )
                .declare(
                    FunctionNode::new("sync")
                        .at(10)
                        .annotated(retriever_intent())
                        .param("c", crate::resolver::test_support::counter()),
                ),
        ];
        let (_, source) = emit(files);

        assert!(source.contains("        val info = nextModel.endpoint()\n"));
        assert!(source.contains("        val data = app.Counter.query()\n"));
        assert!(source.contains(
            "app.Http.intent(info, \"sync\", nextModel, app.Counter::class, app.Query::class, \"app.Counter\", \"app.Query\", data)"
        ));
    }

    #[test]
    fn test_relative_path() {
        let (unit, _) = emit(vec![counter()]);
        assert_eq!(
            KotlinEmitter::default().relative_path(&unit),
            PathBuf::from("app/_kirok/CounterKirok.kt")
        );
    }
}
