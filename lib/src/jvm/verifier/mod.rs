//! Stack map frame inference
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! The JVM checks these frames when loading a class ([verification by type-checking][0]), but it
//! does not compute them: every method has to ship a [`crate::jvm::class_file::StackMapTable`].
//! [`infer_frames`] recovers them from an encoded method body. It is a fix-point algorithm over
//! the basic blocks of the method: frames flowing into the same block are unified (see
//! [`Frame::merge`]) until nothing changes. Merging two different classes needs to know about
//! superclasses, which is what [`ClassHierarchy`] provides.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod hierarchy;
mod inference;
mod types;

pub use frame::*;
pub use hierarchy::*;
pub use inference::*;
pub use types::*;
