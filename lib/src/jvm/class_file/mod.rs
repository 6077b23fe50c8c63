//! Binary representation of class files
//!
//! Everything here mirrors a structure from chapter 4 of the JVM specification and knows how to
//! [`Serialize`] itself. Higher level code builds these up through the [`ConstantsPool`].

mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod serialize;
mod validate;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use serialize::*;
pub use validate::*;
pub use version::*;
