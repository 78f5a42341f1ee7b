use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use indexmap::IndexMap;

use kirok_gen::binding::{load_binding_models_from, OpaqueResolver, ResolvedType};
use kirok_gen::{
    write_manifest, write_output, Generator, GeneratorConfig, KotlinEmitter, Result, Snapshot,
    SnapshotLoader,
};

#[derive(Parser)]
#[command(name = "kirok-gen")]
#[command(about = "Generates Kotlin/Wasm boundary wrappers and a model manifest for Kirok MVI models")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Generate wrappers and manifest from a snapshot directory
    kirok-gen generate build/kirok/symbols --out build/generated/kirok

    # Report resolution problems without writing anything
    kirok-gen check symbols.json

    # Write only the manifest
    kirok-gen manifest symbols.json --out kirok_model.json

    # Show resolved models and retriever bindings as JSON
    kirok-gen inspect symbols.json

    # Read a manifest back the way binding generators see it
    kirok-gen describe build/generated/kirok/resources/kirok_model.json
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to kirok.toml (defaults to kirok.toml next to the snapshot)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate wrapper sources and the model manifest
    Generate {
        /// Snapshot file or directory of snapshot files
        snapshot: PathBuf,

        /// Output root; sources go to <out>/kotlin, the manifest to <out>/resources
        #[arg(long, default_value = "build/generated/kirok")]
        out: PathBuf,

        /// Generate even when the snapshot does not target wasm
        #[arg(long)]
        force: bool,

        /// Log progress for every model
        #[arg(long)]
        use_log: bool,
    },

    /// Resolve and validate models, printing diagnostics
    Check {
        /// Snapshot file or directory of snapshot files
        snapshot: PathBuf,
    },

    /// Write only the model manifest
    Manifest {
        /// Snapshot file or directory of snapshot files
        snapshot: PathBuf,

        /// Manifest path (prints to stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print resolved models and retriever bindings as JSON
    Inspect {
        /// Snapshot file or directory of snapshot files
        snapshot: PathBuf,
    },

    /// Print the models of a manifest with resolved types
    Describe {
        /// Path to kirok_model.json
        manifest: PathBuf,
    },
}

/// Loads the configuration and the snapshot it applies to.
pub fn load(snapshot: &Path, config: Option<&Path>) -> Result<(Snapshot, GeneratorConfig)> {
    let config_dir = if snapshot.is_dir() {
        snapshot
    } else {
        snapshot.parent().unwrap_or_else(|| Path::new("."))
    };
    let config = GeneratorConfig::discover(config, config_dir)?;

    let snapshot = SnapshotLoader::new()
        .skipping(config.manifest_file.clone())
        .load(snapshot)?;

    Ok((snapshot, config))
}

pub fn generate(
    snapshot_path: &Path,
    config: Option<&Path>,
    out: &Path,
    force: bool,
    use_log: bool,
) -> Result<()> {
    let (snapshot, mut config) = load(snapshot_path, config)?;
    config.use_log |= use_log;

    let generator = Generator::new(&snapshot, &config);
    if !force && !generator.should_run() {
        println!(
            "No declarations from {} found, skipping generation (use --force to override)",
            config.wasm_package
        );
        return Ok(());
    }

    let output = generator.run();
    println!("Found {} models", output.models.len());

    let emitter = KotlinEmitter::new(config.retriever_data_type.clone());
    let summary = write_output(&output, out, &emitter, &config)?;

    println!(
        "Wrote {} files ({} unchanged)",
        summary.written.len(),
        summary.unchanged
    );
    match &summary.manifest {
        Some(path) => println!("Manifest: {}", path.display()),
        None => println!("Manifest: not written"),
    }
    println!(
        "{} errors, {} warnings",
        output.diagnostics.error_count(),
        output.diagnostics.warning_count()
    );

    Ok(())
}

/// Returns `false` when any error diagnostic was reported.
pub fn check(snapshot_path: &Path, config: Option<&Path>) -> Result<bool> {
    let (snapshot, config) = load(snapshot_path, config)?;
    let output = Generator::new(&snapshot, &config).run();

    for diagnostic in output.diagnostics.entries() {
        println!("{}", diagnostic);
    }

    let wrappers: usize = output.units.iter().map(|u| u.wrappers().count()).sum();
    println!(
        "Checked {} models ({} wrappers): {} errors, {} warnings",
        output.models.len(),
        wrappers,
        output.diagnostics.error_count(),
        output.diagnostics.warning_count()
    );

    Ok(!output.diagnostics.has_errors())
}

pub fn manifest(snapshot_path: &Path, config: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let (snapshot, config) = load(snapshot_path, config)?;
    let generator = Generator::new(&snapshot, &config);
    let models = generator.resolve_models();
    let document = kirok_gen::export_manifest(&snapshot, &models);

    match out {
        Some(path) => {
            if write_manifest(path, &document) {
                println!("Wrote manifest with {} models to {}", models.len(), path.display());
            } else {
                println!("Manifest not written");
            }
        }
        None => println!("{}", document.to_json()?),
    }

    Ok(())
}

pub fn inspect(snapshot_path: &Path, config: Option<&Path>) -> Result<()> {
    let (snapshot, config) = load(snapshot_path, config)?;
    let reports = Generator::new(&snapshot, &config).inspect();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn signature(parameters: &IndexMap<String, ResolvedType>) -> String {
    parameters
        .iter()
        .map(|(name, ty)| format!("{}: {}", name, ty))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn describe(manifest: &Path) -> Result<()> {
    let models = load_binding_models_from(manifest, &OpaqueResolver)?;

    for model in &models {
        println!("{}", model.name);
        for (name, ty) in &model.values {
            let label = if ty.is_collection() { " (collection)" } else { "" };
            println!("  val {}: {}{}", name, ty, label);
        }

        let suspend = if model.is_init_suspend { "suspend " } else { "" };
        println!("  {}init({})", suspend, signature(&model.init));

        for intent in &model.intents {
            let suspend = if intent.is_async { "suspend " } else { "" };
            println!("  {}intent {}({})", suspend, intent.name, signature(&intent.parameters));
        }
    }

    println!("\n{} models", models.len());
    Ok(())
}
