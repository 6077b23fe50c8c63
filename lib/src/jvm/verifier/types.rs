use crate::jvm::class_file::{BytecodeIndex, ConstantPoolOverflow, ConstantsPool, Serialize};
use crate::jvm::descriptors::{BaseType, FieldType, RefType, RenderDescriptor};
use crate::jvm::ClassConstantIndex;
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::fmt;

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot: never written, the upper half of a `long` or `double`, or the merge of
    /// incompatible types
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In a constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but before `<init>` has been called
    ///
    ///   - during inference `U` is an [`UninitializedRef`], which remembers the class that is
    ///     being created as well as where the `new` instruction is
    ///   - when serializing into a class file, `U` is the offset of that `new` instruction
    Uninitialized(U),
}

/// Type tracked while inferring frames
pub type InferredType = VerificationType<RefType, UninitializedRef>;

/// Result of a `new` instruction whose constructor has not run yet
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct UninitializedRef {
    /// Byte offset of the `new` instruction
    pub offset: usize,

    /// What the object will be once initialized
    pub class: RefType,
}

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Does the type take two slots (category 2)?
    pub fn is_wide(&self) -> bool {
        matches!(self, VerificationType::Long | VerificationType::Double)
    }
}

impl<Cls, U> Width for VerificationType<Cls, U> {
    fn width(&self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }
}

impl<U> From<&FieldType> for VerificationType<RefType, U> {
    fn from(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type.clone()),
        }
    }
}

impl InferredType {
    pub fn object(class_name: &str) -> InferredType {
        VerificationType::Object(RefType::object(class_name))
    }

    /// Resolve the type into its serializable form, interning class names
    pub fn to_serializable(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<VerificationType<ClassConstantIndex, BytecodeIndex>, ConstantPoolOverflow> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(ref_type) => {
                VerificationType::Object(constants.get_class(&ref_type.internal_name())?)
            }
            VerificationType::Uninitialized(uninitialized) => {
                // Offsets are bounded by the code length, which is checked before inference
                VerificationType::Uninitialized(BytecodeIndex(uninitialized.offset as u16))
            }
        })
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationType::Top => f.write_str("top"),
            VerificationType::Integer => f.write_str("int"),
            VerificationType::Float => f.write_str("float"),
            VerificationType::Double => f.write_str("double"),
            VerificationType::Long => f.write_str("long"),
            VerificationType::Null => f.write_str("null"),
            VerificationType::UninitializedThis => f.write_str("uninitializedThis"),
            VerificationType::Object(ref_type) => f.write_str(&ref_type.render()),
            VerificationType::Uninitialized(uninitialized) => write!(
                f,
                "uninitialized({}) {}",
                uninitialized.offset,
                uninitialized.class.render()
            ),
        }
    }
}

impl Serialize for VerificationType<ClassConstantIndex, BytecodeIndex> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_types_collapse_to_int() {
        for base in [BaseType::Boolean, BaseType::Byte, BaseType::Char, BaseType::Short] {
            let typ: InferredType = (&FieldType::Base(base)).into();
            assert_eq!(typ, VerificationType::Integer);
        }
        let typ: InferredType = (&FieldType::long()).into();
        assert_eq!(typ.width(), 2);
    }

    #[test]
    fn serialized_tags() {
        let mut constants = ConstantsPool::new();
        let string = InferredType::object("java/lang/String")
            .to_serializable(&mut constants)
            .unwrap();
        let new_at_7 = VerificationType::Uninitialized(UninitializedRef {
            offset: 7,
            class: RefType::object("Foo"),
        })
        .to_serializable(&mut constants)
        .unwrap();

        let mut bytes = vec![];
        VerificationType::Top.serialize(&mut bytes).unwrap();
        string.serialize(&mut bytes).unwrap();
        new_at_7.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 7, 0, 2, 8, 0, 7]);
    }

    #[test]
    fn display_uses_descriptors() {
        let ints = VerificationType::Object(RefType::array(FieldType::int()));
        assert_eq!(ints.to_string(), "[I");
        assert_eq!(InferredType::Top.to_string(), "top");
    }
}
