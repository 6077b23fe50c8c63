//! Compile an intermediate representation of classes into JVM class files
//!
//! The interesting parts live in [`jvm`]: the [`jvm::model`] input, the bytecode encoder in
//! [`jvm::code`], stack map frame inference in [`jvm::verifier`], and the binary format in
//! [`jvm::class_file`]. [`compile_class`] and [`compile_batch`] run the whole pipeline.

mod compile;
pub mod jvm;
mod util;

pub use compile::*;
