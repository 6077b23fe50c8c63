use crate::jvm::class_file::Version;
use crate::jvm::model::Class;
use crate::jvm::verifier::{ClassHierarchy, ObjectHierarchy};
use crate::jvm::Error;
use rayon::prelude::*;
use std::sync::Arc;

/// Settings shared by every class in a compilation
#[derive(Clone)]
pub struct CompileOptions {
    /// Class file version to emit (Java 8 by default)
    ///
    /// Versions before Java 7 (major 51) are rejected as [`Error::MalformedClass`], since every
    /// method body gets type-checking `StackMapTable` frames.
    pub version: Version,

    /// Used to merge reference types in stack map frames
    pub hierarchy: Arc<dyn ClassHierarchy>,
}

impl Default for CompileOptions {
    fn default() -> CompileOptions {
        CompileOptions {
            version: Version::JAVA8,
            hierarchy: Arc::new(ObjectHierarchy),
        }
    }
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Serialized class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledClass {
    /// Internal name of the class
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Compile one class into class file bytes
pub fn compile_class(class: &Class, options: &CompileOptions) -> Result<CompiledClass, Error> {
    log::debug!(
        "compiling {} ({} fields, {} methods)",
        class.name,
        class.fields.len(),
        class.methods.len()
    );
    let class_file = class.serialize(options.version, options.hierarchy.as_ref())?;
    let bytes = class_file.to_bytes()?;
    log::debug!(
        "assembled {}: {} constants, {} bytes",
        class.name,
        class_file.constants.count(),
        bytes.len()
    );
    Ok(CompiledClass {
        name: class.name.clone(),
        bytes,
    })
}

/// Compile classes in parallel
///
/// Classes share nothing while they compile, so each one goes to its own rayon task. Results
/// come back in the same order as `classes`, and a failure only affects its own class.
pub fn compile_batch(
    classes: Vec<Class>,
    options: &CompileOptions,
) -> Vec<Result<CompiledClass, Error>> {
    classes
        .into_par_iter()
        .map(|class| compile_class(&class, options))
        .collect()
}
