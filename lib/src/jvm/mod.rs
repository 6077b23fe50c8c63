//! Manipulate JVM classes
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Point {
//!     public int x;
//!
//!     public Point(int x) {
//!         this.x = x;
//!     }
//! }
//! ```
//!
//! Generating an analogous class file can be done as follows:
//!
//! ```
//! use classgen::jvm::model::{Class, CodeBuilder, Field, FieldRef, Method, MethodRef};
//! use classgen::jvm::code::{InvokeType, Instruction::*, BranchInstruction::*};
//! use classgen::jvm::class_file::Version;
//! use classgen::jvm::verifier::ObjectHierarchy;
//! use classgen::jvm::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let mut class = Class::new("me/example/Point", "java/lang/Object", ClassAccessFlags::PUBLIC);
//! class.add_field(Field::new("x", FieldType::Base(BaseType::Int), FieldAccessFlags::PUBLIC));
//!
//! // Generate the constructor method body
//! let descriptor = MethodDescriptor::new(vec![FieldType::Base(BaseType::Int)], None);
//! let mut code = CodeBuilder::new();
//! code.push_instruction(ALoad(0));
//! code.invoke(
//!     InvokeType::Special,
//!     MethodRef::new("java/lang/Object", "<init>", MethodDescriptor::new(vec![], None)),
//! );
//! code.push_instruction(ALoad(0));
//! code.push_instruction(ILoad(1));
//! code.push_instruction(PutField(FieldRef::new(
//!     "me/example/Point",
//!     "x",
//!     FieldType::Base(BaseType::Int),
//! )));
//! code.push_branch(Return);
//!
//! let constructor = Method::new("<init>", descriptor, MethodAccessFlags::PUBLIC)
//!     .with_body(code.finish());
//! class.add_method(constructor);
//!
//! // Finally, encode the class into bytes
//! let class_bytes: Vec<u8> = class.serialize(Version::JAVA8, &ObjectHierarchy)?.to_bytes()?;
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
pub mod model;
pub mod verifier;

pub use access_flags::*;
pub use class_file::{
    ClassConstantIndex, Constant, ConstantIndex, ConstantPoolOverflow, FieldRefConstantIndex,
    MethodRefConstantIndex, NameAndTypeConstantIndex, StringConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::*;
pub use errors::*;
