use crate::jvm::class_file::{u16_length, Attribute, AttributeError, AttributeLike, Serialize};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::model::{FieldRef, LoadableConstant, MethodRef};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::collections::HashMap;
use std::result::Result;

/// Largest number of slots the pool may occupy, counting the unused slot 0
///
/// `constant_pool_count` is a `u16`, so the last usable index is 65534.
pub const MAX_CONSTANT_POOL_COUNT: usize = u16::MAX as usize;

/// Class file constants pool builder
///
/// The pool is append only and deduplicating: interning a constant that is structurally equal to
/// one already present returns the existing index. Indices start at 1 and `long`/`double`
/// constants take up two of them.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,
    interned: HashMap<Constant, ConstantIndex>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            interned: HashMap::new(),
        }
    }

    /// Value of `constant_pool_count` in the class file (one more than the largest index used)
    pub fn count(&self) -> usize {
        self.constants.offset_len().0
    }

    /// Number of distinct constants (long and double count once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.len() == 0
    }

    /// Look up a constant by index
    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        self.constants.get_offset(Offset(index.0 as usize)).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Get or insert a constant
    ///
    /// The pool is left untouched if the constant does not fit.
    pub fn intern(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.interned.get(&constant) {
            return Ok(*idx);
        }

        let offset = self.constants.offset_len().0;
        if offset + constant.width() > MAX_CONSTANT_POOL_COUNT {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        let idx = ConstantIndex(offset as u16);
        self.interned.insert(constant.clone(), idx);
        self.constants.push(constant);
        log::trace!("constant #{} interned", idx.0);
        Ok(idx)
    }

    /// Get or insert a utf8 constant
    pub fn get_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        self.intern(Constant::Utf8(utf8.to_owned()))
            .map(Utf8ConstantIndex)
    }

    /// Get or insert a class constant from an internal name (`java/lang/Object`, `[I`)
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        self.intern(Constant::Class(name)).map(ClassConstantIndex)
    }

    /// Get or insert a string constant
    pub fn get_string(&mut self, string: &str) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        let utf8 = self.get_utf8(string)?;
        self.intern(Constant::String(utf8)).map(StringConstantIndex)
    }

    /// Get or insert a name & type constant
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    /// Get or insert a `CONSTANT_Fieldref_info`
    pub fn get_field_ref(
        &mut self,
        field: &FieldRef,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(&field.class)?;
        let name_and_type = self.get_name_and_type(&field.name, &field.descriptor.render())?;
        self.intern(Constant::FieldRef(class, name_and_type))
            .map(FieldRefConstantIndex)
    }

    /// Get or insert a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    pub fn get_method_ref(
        &mut self,
        method: &MethodRef,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(&method.class)?;
        let name_and_type = self.get_name_and_type(&method.name, &method.descriptor.render())?;
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
            is_interface: method.is_interface,
        })
        .map(MethodRefConstantIndex)
    }

    /// Get or insert a constant which can be loaded up using `ldc`, `ldc_w`, or `ldc2_w`
    pub fn get_loadable(
        &mut self,
        constant: &LoadableConstant,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        match constant {
            LoadableConstant::Integer(integer) => self.intern(Constant::Integer(*integer)),
            LoadableConstant::Float(float) => self.intern(Constant::Float(float.to_bits())),
            LoadableConstant::Long(long) => self.intern(Constant::Long(*long)),
            LoadableConstant::Double(double) => self.intern(Constant::Double(double.to_bits())),
            LoadableConstant::String(string) => self.get_string(string).map(Into::into),
            LoadableConstant::Class(class) => {
                self.get_class(&class.internal_name()).map(Into::into)
            }
        }
    }

    /// Serialize an attribute, interning its name
    ///
    /// The body is serialized first, so an attribute that cannot be encoded (eg. a sequence
    /// longer than a `u16` count allows) leaves the pool untouched.
    pub fn get_attribute<A: AttributeLike>(
        &mut self,
        attribute: A,
    ) -> Result<Attribute, AttributeError> {
        let mut info = vec![];
        attribute
            .serialize(&mut info)
            .map_err(|err| AttributeError::Encoding {
                attribute: A::NAME,
                reason: err.to_string(),
            })?;
        let name_index = self.get_utf8(A::NAME)?;
        Ok(Attribute { name_index, info })
    }

    /// Contents of a utf8 constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Option<&str> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Some(string),
            _ => None,
        }
    }

    /// Internal name of the class a class constant refers to
    pub fn class_name(&self, index: ClassConstantIndex) -> Option<&str> {
        match self.get(index.0)? {
            Constant::Class(name) => self.utf8(*name),
            _ => None,
        }
    }

    /// Class, name, and descriptor of a field or method reference
    pub fn member_ref(&self, index: ConstantIndex) -> Option<MemberRefView<'_>> {
        let (class, name_and_type) = match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => (*class, *name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => (*class, *name_and_type),
            _ => return None,
        };
        let (name, descriptor) = match self.get(name_and_type.0)? {
            Constant::NameAndType { name, descriptor } => (*name, *descriptor),
            _ => return None,
        };
        Some(MemberRefView {
            class: self.class_name(class)?,
            name: self.utf8(name)?,
            descriptor: self.utf8(descriptor)?,
        })
    }
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        u16_length(self.count())?.serialize(writer)?;
        for (_, _, constant) in &self.constants {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

/// Borrowed view of a field or method reference
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemberRefView<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// The constant pool has run out of indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPoolOverflow {
    /// Constant that could not be added
    pub constant: Constant,

    /// Index at which the constant would have been inserted
    pub offset: usize,
}

/// Entries in the constant pool
///
/// Floating point values are stored by their bits so that constants can be hashed, which also
/// keeps distinct NaN payloads distinct.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,

        /// Is this class actually an interface
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(u32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(u64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant modified UTF-8 encoded string value
    Utf8(String),
}

impl Constant {
    pub fn float(value: f32) -> Constant {
        Constant::Float(value.to_bits())
    }

    pub fn double(value: f64) -> Constant {
        Constant::Double(value.to_bits())
    }

    /// Can this constant be the operand of `ldc`/`ldc_w`/`ldc2_w`?
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            Constant::Class(_)
                | Constant::String(_)
                | Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
        )
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                u16_length(buffer.len())?.serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(bits) => {
                4u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(bits) => {
                6u8.serialize(writer)?;
                writer.write_u64::<byteorder::BigEndian>(*bits)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Encode a string in the [modified UTF-8 format][0] used in class files
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    let mut units = [0u16; 2];
    for c in string.chars() {
        if c != '\u{0000}' && c.len_utf8() == 1 {
            buffer.push(c as u8);
            continue;
        }

        // Everything else goes through UTF-16, so supplementary characters become two surrogates
        for unit in c.encode_utf16(&mut units) {
            let code = *unit;
            if code < 0x800 {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`: the
/// index after one of those is valid but unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Index into the constant pool (always non-zero)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

macro_rules! typed_constant_index {
    ($($(#[$attr:meta])* $name:ident,)*) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
            pub struct $name(ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }
        )*
    };
}

typed_constant_index! {
    /// Index of a `CONSTANT_Utf8_info`
    Utf8ConstantIndex,
    /// Index of a `CONSTANT_String_info`
    StringConstantIndex,
    /// Index of a `CONSTANT_NameAndType_info`
    NameAndTypeConstantIndex,
    /// Index of a `CONSTANT_Class_info`
    ClassConstantIndex,
    /// Index of a `CONSTANT_Fieldref_info`
    FieldRefConstantIndex,
    /// Index of a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    MethodRefConstantIndex,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::descriptors::{FieldType, MethodDescriptor};

    #[test]
    fn interning_deduplicates() {
        let mut pool = ConstantsPool::new();
        let a = pool.get_class("java/lang/Object").unwrap();
        let b = pool.get_class("java/lang/Object").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.class_name(a), Some("java/lang/Object"));
    }

    #[test]
    fn indices_start_at_one_and_wide_constants_take_two() {
        let mut pool = ConstantsPool::new();
        let long = pool.get_loadable(&LoadableConstant::Long(7)).unwrap();
        let int = pool.get_loadable(&LoadableConstant::Integer(7)).unwrap();
        let double = pool.get_loadable(&LoadableConstant::Double(1.5)).unwrap();
        let utf8 = pool.get_utf8("x").unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(int, ConstantIndex(3));
        assert_eq!(double, ConstantIndex(4));
        assert_eq!(ConstantIndex::from(utf8), ConstantIndex(6));
        assert_eq!(pool.count(), 7);
        assert_eq!(pool.get(ConstantIndex(2)), None);
    }

    #[test]
    fn member_refs_share_their_parts() {
        let mut pool = ConstantsPool::new();
        let println = MethodRef {
            class: String::from("java/io/PrintStream"),
            name: String::from("println"),
            descriptor: MethodDescriptor::new(vec![FieldType::int()], None),
            is_interface: false,
        };
        let out = FieldRef {
            class: String::from("java/lang/System"),
            name: String::from("out"),
            descriptor: FieldType::object("java/io/PrintStream"),
        };
        let method_idx = pool.get_method_ref(&println).unwrap();
        let field_idx = pool.get_field_ref(&out).unwrap();
        let before = pool.len();
        assert_eq!(pool.get_method_ref(&println).unwrap(), method_idx);
        assert_eq!(pool.len(), before);

        let view = pool.member_ref(field_idx.into()).unwrap();
        assert_eq!(view.class, "java/lang/System");
        assert_eq!(view.name, "out");
        assert_eq!(view.descriptor, "Ljava/io/PrintStream;");

        // `java/io/PrintStream` is used as a class and inside a descriptor: one utf8 each
        let utf8s: Vec<&Constant> = pool
            .iter()
            .map(|(_, c)| c)
            .filter(|c| matches!(c, Constant::Utf8(s) if s == "java/io/PrintStream"))
            .collect();
        assert_eq!(utf8s.len(), 1);
    }

    #[test]
    fn float_constants_compare_by_bits() {
        let mut pool = ConstantsPool::new();
        let zero = pool.intern(Constant::float(0.0)).unwrap();
        let neg_zero = pool.intern(Constant::float(-0.0)).unwrap();
        assert_ne!(zero, neg_zero);
    }

    #[test]
    fn overflow_leaves_the_pool_untouched() {
        let mut pool = ConstantsPool::new();
        for i in 0..65533 {
            pool.intern(Constant::Integer(i)).unwrap();
        }
        assert_eq!(pool.count(), 65534);

        // A wide constant at 65534 would need slot 65535
        let err = pool.intern(Constant::Long(0)).unwrap_err();
        assert_eq!(err.offset, 65534);
        assert_eq!(pool.count(), 65534);

        // 65534 is the last usable index
        let last = pool.intern(Constant::Integer(-1)).unwrap();
        assert_eq!(last, ConstantIndex(65534));
        assert!(pool.intern(Constant::Integer(-2)).is_err());

        // Existing constants are still found
        assert_eq!(
            pool.intern(Constant::Integer(0)).unwrap(),
            ConstantIndex(1)
        );
    }

    #[test]
    fn unencodable_attributes_leave_the_pool_untouched() {
        use crate::jvm::class_file::{AttributeError, Exceptions};

        let mut pool = ConstantsPool::new();
        let exception = pool.get_class("java/lang/Exception").unwrap();
        let before = pool.count();
        match pool.get_attribute(Exceptions(vec![exception; 70_000])) {
            Err(AttributeError::Encoding { attribute, .. }) => assert_eq!(attribute, "Exceptions"),
            other => panic!("expected an encoding failure, got {:?}", other),
        }
        assert_eq!(pool.count(), before);

        assert!(pool.get_attribute(Exceptions(vec![exception])).is_ok());
        assert_eq!(pool.count(), before + 1);
    }

    #[test]
    fn serialized_pool_starts_with_count() {
        let mut pool = ConstantsPool::new();
        pool.get_utf8("hi").unwrap();
        let mut out = vec![];
        pool.serialize(&mut out).unwrap();
        assert_eq!(out, vec![0, 2, 1, 0, 2, b'h', b'i']);
    }
}

#[cfg(test)]
mod encode_modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
    }

    #[test]
    fn two_and_three_byte_encodings() {
        assert_eq!(encode_modified_utf8("Ąé"), vec![196, 132, 195, 169]);
        assert_eq!(encode_modified_utf8("अ"), vec![224, 164, 133]);
    }

    #[test]
    fn supplementary_characters_become_surrogate_pairs() {
        assert_eq!(
            encode_modified_utf8("\u{10000}\u{10FFFF}"),
            vec![237, 160, 128, 237, 176, 128, 237, 175, 191, 237, 191, 191]
        );
    }
}
