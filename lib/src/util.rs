//! Small data structures shared across the class file machinery

mod offset_vec;

pub use offset_vec::*;
