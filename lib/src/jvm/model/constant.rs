use crate::jvm::descriptors::{FieldType, MethodDescriptor, RefType};

/// Constant which can be pushed with `ldc` or used as a field's `ConstantValue`
#[derive(Clone, Debug, PartialEq)]
pub enum LoadableConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// A `java.lang.Class` object
    Class(RefType),
}

impl LoadableConstant {
    /// Does the constant take two stack slots (and `ldc2_w`)?
    pub fn is_wide(&self) -> bool {
        matches!(self, LoadableConstant::Long(_) | LoadableConstant::Double(_))
    }
}

/// Symbolic reference to a field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Internal name of the class declaring the field
    pub class: String,
    pub name: String,
    pub descriptor: FieldType,
}

impl FieldRef {
    pub fn new(class: impl Into<String>, name: impl Into<String>, descriptor: FieldType) -> Self {
        FieldRef {
            class: class.into(),
            name: name.into(),
            descriptor,
        }
    }
}

/// Symbolic reference to a method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Internal name of the class or interface declaring the method
    pub class: String,
    pub name: String,
    pub descriptor: MethodDescriptor,

    /// Is the owner an interface (emits a `CONSTANT_InterfaceMethodref_info`)
    pub is_interface: bool,
}

impl MethodRef {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: MethodDescriptor,
    ) -> Self {
        MethodRef {
            class: class.into(),
            name: name.into(),
            descriptor,
            is_interface: false,
        }
    }

    pub fn interface(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: MethodDescriptor,
    ) -> Self {
        MethodRef {
            is_interface: true,
            ..MethodRef::new(class, name, descriptor)
        }
    }

    /// Is this an instance initialization method
    pub fn is_init(&self) -> bool {
        self.name == "<init>"
    }
}
