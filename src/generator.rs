//! Generation pass.
//!
//! One pass over one snapshot: discover models, then resolve, validate and
//! synthesize each model independently (in parallel with rayon), then export
//! the manifest. Per-model diagnostics are merged back in discovery order.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::GeneratorConfig;
use crate::diagnostics::Diagnostics;
use crate::emit::Emitter;
use crate::error::Result;
use crate::manifest::{export_manifest, write_manifest, ManifestDocument};
use crate::resolver::retriever::RetrieverBinding;
use crate::resolver::{DeclarationResolver, ModelDescriptor, RetrieverResolver, RetrieverSite};
use crate::symbols::{DeclId, SymbolQuery};
use crate::synth::{GeneratedUnit, WrapperSynthesizer};

/// Directory below the output root receiving generated sources.
pub const SOURCES_DIR: &str = "kotlin";
/// Directory below the output root receiving the manifest.
pub const RESOURCES_DIR: &str = "resources";

pub struct GenerationOutput {
    pub models: Vec<ModelDescriptor>,
    pub units: Vec<GeneratedUnit>,
    pub manifest: ManifestDocument,
    pub diagnostics: Diagnostics,
}

/// Retriever resolution of one function, for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct RetrieverReport {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<RetrieverBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub model: ModelDescriptor,
    pub retrievers: Vec<RetrieverReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: Vec<PathBuf>,
    pub unchanged: usize,
    pub manifest: Option<PathBuf>,
}

pub struct Generator<'a> {
    query: &'a dyn SymbolQuery,
    config: &'a GeneratorConfig,
}

impl<'a> Generator<'a> {
    pub fn new(query: &'a dyn SymbolQuery, config: &'a GeneratorConfig) -> Self {
        Self { query, config }
    }

    /// Whether the snapshot targets wasm.
    pub fn should_run(&self) -> bool {
        self.query.has_package(&self.config.wasm_package)
    }

    fn log_model(&self, model: &ModelDescriptor) {
        if self.config.use_log {
            tracing::info!("Building model {}", model.name);
        } else {
            tracing::debug!("Building model {}", model.name);
        }
    }

    /// Every discovered model, resolved.
    pub fn resolve_models(&self) -> Vec<ModelDescriptor> {
        let resolver = DeclarationResolver::new(self.query, self.config);
        resolver
            .discover_models()
            .par_iter()
            .map(|id| resolver.resolve_model(*id))
            .collect()
    }

    pub fn run(&self) -> GenerationOutput {
        let models = self.resolve_models();
        let synthesizer = WrapperSynthesizer::new(self.query, self.config);

        let results: Vec<(GeneratedUnit, Diagnostics)> = models
            .par_iter()
            .map(|model| {
                self.log_model(model);
                let mut sink = Diagnostics::new();
                let unit = synthesizer.synthesize_unit(model, &mut sink);
                (unit, sink)
            })
            .collect();

        let mut diagnostics = Diagnostics::new();
        let mut units = Vec::with_capacity(results.len());
        for (unit, sink) in results {
            diagnostics.extend(sink);
            units.push(unit);
        }

        let manifest = export_manifest(self.query, &models);

        tracing::debug!(
            "Generated {} units with {} errors, {} warnings",
            units.len(),
            diagnostics.error_count(),
            diagnostics.warning_count()
        );

        GenerationOutput {
            models,
            units,
            manifest,
            diagnostics,
        }
    }

    /// Resolved models with the retriever binding of every retriever-backed
    /// function.
    pub fn inspect(&self) -> Vec<ModelReport> {
        let retrievers = RetrieverResolver::new(self.query, self.config);

        self.resolve_models()
            .into_iter()
            .map(|model| {
                let mut functions: Vec<(DeclId, &str, RetrieverSite)> = Vec::new();
                if let Some(init) = model.init.as_ref().filter(|i| i.uses_retriever) {
                    functions.push((init.decl, init.qualified_name.as_str(), RetrieverSite::Init));
                }
                functions.extend(
                    model
                        .intents
                        .iter()
                        .filter(|i| i.uses_retriever)
                        .map(|i| (i.decl, i.qualified_name.as_str(), RetrieverSite::Intent)),
                );

                let reports: Vec<RetrieverReport> = functions
                    .into_iter()
                    .map(|(decl, name, site)| match retrievers.bind(decl, model.decl, site) {
                        Ok(binding) => RetrieverReport {
                            function: name.to_string(),
                            binding: Some(binding),
                            error: None,
                        },
                        Err(e) => RetrieverReport {
                            function: name.to_string(),
                            binding: None,
                            error: Some(e.to_string()),
                        },
                    })
                    .collect();

                ModelReport {
                    model,
                    retrievers: reports,
                }
            })
            .collect()
    }
}

/// Writes `content` unless the file already holds identical content.
/// Returns whether the file was written.
pub fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    if let Ok(existing) = std::fs::read(path) {
        if existing == content.as_bytes() {
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(true)
}

/// Writes units below `out_dir/kotlin` and the manifest to
/// `out_dir/resources/<manifest_file>`. Unit write failures propagate; the
/// manifest is best effort.
pub fn write_output(
    output: &GenerationOutput,
    out_dir: &Path,
    emitter: &dyn Emitter,
    config: &GeneratorConfig,
) -> Result<WriteSummary> {
    let mut summary = WriteSummary::default();
    let sources = out_dir.join(SOURCES_DIR);

    for unit in &output.units {
        let path = sources.join(emitter.relative_path(unit));
        let content = emitter.emit(unit)?;
        if write_if_changed(&path, &content)? {
            tracing::debug!("Wrote {}", path.display());
            summary.written.push(path);
        } else {
            summary.unchanged += 1;
        }
    }

    let manifest_path = out_dir.join(RESOURCES_DIR).join(&config.manifest_file);
    let unchanged = match (std::fs::read(&manifest_path), output.manifest.to_json()) {
        (Ok(existing), Ok(json)) => existing == json.as_bytes(),
        _ => false,
    };
    if unchanged || write_manifest(&manifest_path, &output.manifest) {
        summary.manifest = Some(manifest_path);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::KotlinEmitter;
    use crate::resolver::test_support::*;
    use crate::symbols::{ClassNode, FunctionNode, Snapshot, SourceFile};
    use tempfile::TempDir;

    fn snapshot(with_wasm: bool) -> Snapshot {
        let mut files = vec![
            SourceFile::new("app/Counter.kt", "app")
                .declare(ClassNode::new("Counter").annotated(model()).property("count", int()))
                .declare(FunctionNode::new("createCounter").at(2).annotated(init()).returns(counter()))
                .declare(
                    FunctionNode::new("increment")
                        .at(3)
                        .annotated(intent())
                        .param("c", counter())
                        .param("by", int())
                        .returns(counter()),
                ),
            SourceFile::new("app/Broken.kt", "app.broken")
                .declare(ClassNode::new("Broken").annotated(model()))
                .declare(FunctionNode::new("poke").at(2).annotated(retriever_intent()).param(
                    "b",
                    crate::symbols::TypeRef::new("app.broken.Broken"),
                )),
        ];
        if with_wasm {
            files.push(SourceFile::new("kotlin/wasm/Wasm.kt", "kotlin.wasm").declare(ClassNode::new("WasmExport")));
        }
        Snapshot::from_files(files).unwrap()
    }

    #[test]
    fn test_should_run_requires_wasm_package() {
        let config = GeneratorConfig::default();
        assert!(Generator::new(&snapshot(true), &config).should_run());
        assert!(!Generator::new(&snapshot(false), &config).should_run());
    }

    #[test]
    fn test_run_continues_past_broken_model() {
        let snapshot = snapshot(true);
        let config = GeneratorConfig::default();
        let output = Generator::new(&snapshot, &config).run();

        assert_eq!(output.units.len(), 2);
        let names: Vec<_> = output.units.iter().map(|u| u.model.as_str()).collect();
        // "app/Broken.kt" sorts first
        assert_eq!(names, vec!["app.broken.Broken", "app.Counter"]);

        assert_eq!(
            output.diagnostics.messages(),
            vec![
                "Init function not found. Please define init function for Broken model, then add @Init annotation to init function.",
                "Retriever not found for function app.broken.poke",
            ]
        );

        let counter = &output.units[1];
        assert!(counter.init.is_some());
        assert_eq!(counter.intents.len(), 1);
        assert!(output.manifest.models.contains_key("app.Counter"));
        assert!(output.manifest.models.contains_key("app.broken.Broken"));
    }

    #[test]
    fn test_inspect_reports_retriever_errors() {
        let snapshot = snapshot(true);
        let config = GeneratorConfig::default();
        let reports = Generator::new(&snapshot, &config).inspect();

        let broken = reports.iter().find(|r| r.model.name == "Broken").unwrap();
        assert_eq!(broken.retrievers.len(), 1);
        assert!(broken.retrievers[0].binding.is_none());
        assert!(broken.retrievers[0]
            .error
            .as_deref()
            .unwrap_or("")
            .contains("Retriever not found"));
    }

    #[test]
    fn test_write_output_skips_unchanged() {
        let dir = TempDir::new().unwrap();
        let snapshot = snapshot(true);
        let config = GeneratorConfig::default();
        let output = Generator::new(&snapshot, &config).run();
        let emitter = KotlinEmitter::default();

        let first = write_output(&output, dir.path(), &emitter, &config).unwrap();
        assert_eq!(first.written.len(), 2);
        assert!(dir.path().join("kotlin/app/_kirok/CounterKirok.kt").is_file());
        assert!(dir.path().join("resources/kirok_model.json").is_file());

        let second = write_output(&output, dir.path(), &emitter, &config).unwrap();
        assert!(second.written.is_empty());
        assert_eq!(second.unchanged, 2);
        assert!(second.manifest.is_some());
    }

    #[test]
    fn test_write_output_rewrites_stale_manifest() {
        let dir = TempDir::new().unwrap();
        let snapshot = snapshot(true);
        let config = GeneratorConfig::default();
        let output = Generator::new(&snapshot, &config).run();
        let emitter = KotlinEmitter::default();

        write_output(&output, dir.path(), &emitter, &config).unwrap();
        let manifest = dir.path().join("resources/kirok_model.json");
        let expected = std::fs::read_to_string(&manifest).unwrap();
        std::fs::write(&manifest, "{}").unwrap();

        let summary = write_output(&output, dir.path(), &emitter, &config).unwrap();
        assert_eq!(summary.manifest, Some(manifest.clone()));
        assert_eq!(std::fs::read_to_string(&manifest).unwrap(), expected);
    }

    #[test]
    fn test_write_if_changed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.txt");

        assert!(write_if_changed(&path, "one").unwrap());
        assert!(!write_if_changed(&path, "one").unwrap());
        assert!(write_if_changed(&path, "two").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        // Same length, different bytes
        assert!(write_if_changed(&path, "tw0").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "tw0");
    }
}
