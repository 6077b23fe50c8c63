//! In-memory description of the classes to emit
//!
//! This is the input to compilation: it names things symbolically (internal class names, parsed
//! descriptors, labels) and leaves constant pool indices, byte offsets, and stack map frames to
//! the backend.
//!
//!   - __Class__ is represented using [`Class`]
//!   - __Method__ is represented using [`Method`], with an optional [`MethodBody`]
//!   - __Field__ is represented using [`Field`]
//!
//! Method bodies are linear: a list of [`Op`]s where labels are placed between operations.
//! [`CodeBuilder`] is the usual way to produce one.

mod class;
mod code_builder;
mod constant;
mod field;
mod method;

pub use class::*;
pub use code_builder::*;
pub use constant::*;
pub use field::*;
pub use method::*;
