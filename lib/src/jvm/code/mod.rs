//! Bytecode representation and generation
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file - it contains the actual
//! executable instructions. We split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may jump or end control flow
//!
//! Both are generic over how they refer to things: symbolically (class names, labels) while a
//! body is being built, and by constant pool index or byte offset once it is encoded.
//!
//! ### Code generation
//!
//! Turning a [`crate::jvm::model::MethodBody`] into a `Code` attribute happens in three passes,
//! all driven by [`serialize_code`]:
//!
//!   1. [`encode`] interns operands and lays out the bytes, widening jumps which don't fit
//!   2. [`ControlFlowGraph::analyze`] splits the encoded code into basic blocks
//!   3. [`crate::jvm::verifier::infer_frames`] computes the stack map frames
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod code;
mod control_flow;
mod encoder;
mod instructions;
mod label;

pub use code::*;
pub use control_flow::*;
pub use encoder::*;
pub use instructions::*;
pub use label::*;
