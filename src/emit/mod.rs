//! Emission backend seam.
//!
//! The synthesizer decides what a unit contains; an [`Emitter`] turns that
//! description into source text for one target.

pub mod kotlin;

use std::path::PathBuf;

pub use kotlin::KotlinEmitter;

use crate::error::Result;
use crate::synth::GeneratedUnit;

/// Trait for target-specific source rendering
pub trait Emitter: Send + Sync {
    /// Returns the target this emitter renders for
    fn name(&self) -> &'static str;

    /// File extension of emitted units, without the dot
    fn file_extension(&self) -> &'static str;

    /// Renders one unit to source text
    fn emit(&self, unit: &GeneratedUnit) -> Result<String>;

    /// Output path of a unit relative to the emitter's root: one directory per
    /// package segment.
    fn relative_path(&self, unit: &GeneratedUnit) -> PathBuf {
        let mut path: PathBuf = unit
            .package
            .split('.')
            .filter(|segment| !segment.is_empty())
            .collect();
        path.push(format!("{}.{}", unit.file_name, self.file_extension()));
        path
    }
}
