use crate::jvm::class_file;
use crate::jvm::class_file::{check_class, ClassFile, ConstantsPool, SourceFile, Version};
use crate::jvm::model::{Field, Method};
use crate::jvm::verifier::{ClassHierarchy, JAVA_LANG_OBJECT};
use crate::jvm::{ClassAccessFlags, Error};
use std::collections::HashSet;

/// Class or interface to emit
#[derive(Clone, Debug)]
pub struct Class {
    /// Internal name, like `java/lang/String`
    pub name: String,

    /// `None` only for `java/lang/Object`
    pub super_class: Option<String>,

    pub interfaces: Vec<String>,
    pub access_flags: ClassAccessFlags,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,

    /// Emitted as a `SourceFile` attribute
    pub source_file: Option<String>,
}

impl Class {
    /// Create a class with no members extending `super_class`
    pub fn new(
        name: impl Into<String>,
        super_class: impl Into<String>,
        access_flags: ClassAccessFlags,
    ) -> Class {
        Class {
            name: name.into(),
            super_class: Some(super_class.into()),
            interfaces: vec![],
            access_flags,
            fields: vec![],
            methods: vec![],
            source_file: None,
        }
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn add_method(&mut self, method: Method) {
        self.methods.push(method);
    }

    /// Serialize the class into a class file
    ///
    /// Constants are interned in a fixed order (header, then fields, then methods, then class
    /// attributes), so the same class always produces the same constant pool. The result is
    /// checked with [`check_class`] before it is returned.
    pub fn serialize(
        &self,
        version: Version,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<ClassFile, Error> {
        let malformed = |member: Option<String>, reason: String| Error::MalformedClass {
            class: self.name.clone(),
            member,
            offset: None,
            reason,
        };
        let overflow = |overflow| Error::pool_overflow(&self.name, None, overflow);

        if !version.has_stack_map_frames() {
            return Err(malformed(
                None,
                format!(
                    "class file version {}.{} predates `StackMapTable` frames",
                    version.major_version, version.minor_version
                ),
            ));
        }
        match &self.super_class {
            None if self.name != JAVA_LANG_OBJECT => {
                return Err(malformed(None, String::from("missing superclass")));
            }
            Some(_) if self.name == JAVA_LANG_OBJECT => {
                return Err(malformed(None, format!("{} cannot have a superclass", JAVA_LANG_OBJECT)));
            }
            _ => (),
        }
        self.check_duplicate_members()
            .map_err(|member| malformed(Some(member), String::from("declared more than once")))?;

        // Construct a fresh constant pool
        let mut constants = ConstantsPool::new();

        let this_class = constants.get_class(&self.name).map_err(overflow)?;
        let super_class = match &self.super_class {
            Some(super_class) => Some(constants.get_class(super_class).map_err(overflow)?),
            None => None,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|interface| constants.get_class(interface))
            .collect::<Result<Vec<_>, _>>()
            .map_err(overflow)?;

        // Serialize fields and methods
        let fields = self
            .fields
            .iter()
            .map(|field| field.serialize_field(&self.name, &mut constants))
            .collect::<Result<Vec<class_file::Field>, Error>>()?;
        let methods = self
            .methods
            .iter()
            .map(|method| method.serialize_method(&self.name, &mut constants, hierarchy))
            .collect::<Result<Vec<class_file::Method>, Error>>()?;

        // `SourceFile` attribute
        let mut attributes = vec![];
        if let Some(source_file) = &self.source_file {
            let source_file = constants.get_utf8(source_file).map_err(overflow)?;
            let source_file = constants
                .get_attribute(SourceFile(source_file))
                .map_err(|err| Error::attribute(&self.name, None, err))?;
            attributes.push(source_file);
        }

        let class_file = ClassFile {
            version,
            constants,
            access_flags: self.access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        check_class(&class_file).map_err(|err| malformed(err.member, err.reason))?;
        Ok(class_file)
    }

    /// Find the first field or method which shares its name and descriptor with an earlier one
    fn check_duplicate_members(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            let signature = field.signature();
            if !seen.insert(signature.clone()) {
                return Err(signature);
            }
        }
        seen.clear();
        for method in &self.methods {
            let signature = method.signature();
            if !seen.insert(signature.clone()) {
                return Err(signature);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::code::{BranchInstruction, Instruction, InvokeType};
    use crate::jvm::descriptors::{BaseType, FieldType, MethodDescriptor};
    use crate::jvm::model::{CodeBuilder, LoadableConstant, MethodRef};
    use crate::jvm::verifier::ObjectHierarchy;
    use crate::jvm::{FieldAccessFlags, MethodAccessFlags};

    fn constructor() -> Method {
        let mut code = CodeBuilder::new();
        code.push_instruction(Instruction::ALoad(0));
        code.invoke(
            InvokeType::Special,
            MethodRef::new(JAVA_LANG_OBJECT, "<init>", MethodDescriptor::new(vec![], None)),
        );
        code.push_branch(BranchInstruction::Return);
        Method::new("<init>", MethodDescriptor::new(vec![], None), MethodAccessFlags::PUBLIC)
            .with_body(code.finish())
    }

    #[test]
    fn point_class() {
        let mut class = Class::new("me/example/Point", JAVA_LANG_OBJECT, ClassAccessFlags::PUBLIC);
        class.source_file = Some(String::from("Point.java"));
        class.add_field(Field::new(
            "x",
            FieldType::Base(BaseType::Int),
            FieldAccessFlags::PUBLIC,
        ));
        class.add_field(
            Field::new(
                "ORIGIN",
                FieldType::Base(BaseType::Int),
                FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            )
            .with_constant_value(LoadableConstant::Integer(0)),
        );
        class.add_method(constructor());

        let class_file = class.serialize(Version::JAVA8, &ObjectHierarchy).unwrap();
        assert_eq!(class_file.fields.len(), 2);
        assert_eq!(class_file.fields[1].attributes.len(), 1);
        assert_eq!(class_file.methods.len(), 1);
        assert_eq!(class_file.attributes.len(), 1);
        assert!(class_file.super_class.is_some());

        let bytes = class_file.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &ClassFile::MAGIC);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 52]);
    }

    #[test]
    fn versions_without_stack_maps_are_rejected() {
        let class = Class::new("Old", JAVA_LANG_OBJECT, ClassAccessFlags::PUBLIC);
        match class.serialize(Version::major(50), &ObjectHierarchy) {
            Err(Error::MalformedClass { reason, .. }) => assert!(reason.contains("50.0"), "{}", reason),
            other => panic!("expected a malformed class, got {:?}", other.map(|_| ())),
        }
        assert!(class.serialize(Version::JAVA7, &ObjectHierarchy).is_ok());
    }

    #[test]
    fn duplicate_members_are_rejected() {
        let mut class = Class::new("Twice", JAVA_LANG_OBJECT, ClassAccessFlags::PUBLIC);
        class.add_method(constructor());
        class.add_method(constructor());
        match class.serialize(Version::JAVA8, &ObjectHierarchy) {
            Err(Error::MalformedClass { member, .. }) => {
                assert_eq!(member.as_deref(), Some("<init>()V"));
            }
            other => panic!("expected a malformed class, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn only_object_has_no_superclass() {
        let mut class = Class::new("Orphan", JAVA_LANG_OBJECT, ClassAccessFlags::PUBLIC);
        class.super_class = None;
        assert!(matches!(
            class.serialize(Version::JAVA8, &ObjectHierarchy),
            Err(Error::MalformedClass { .. })
        ));

        let mut object = Class::new(JAVA_LANG_OBJECT, JAVA_LANG_OBJECT, ClassAccessFlags::PUBLIC);
        object.super_class = None;
        let class_file = object.serialize(Version::JAVA8, &ObjectHierarchy).unwrap();
        assert_eq!(class_file.super_class, None);
    }

    #[test]
    fn method_errors_name_the_method() {
        let mut code = CodeBuilder::new();
        code.push_instruction(Instruction::IConst0);
        code.push_branch(BranchInstruction::Return);
        let mut class = Class::new("Leaky", JAVA_LANG_OBJECT, ClassAccessFlags::PUBLIC);
        class.add_method(
            Method::new(
                "leak",
                MethodDescriptor::new(vec![], Some(FieldType::Base(BaseType::Int))),
                MethodAccessFlags::STATIC,
            )
            .with_body(code.finish()),
        );
        match class.serialize(Version::JAVA8, &ObjectHierarchy) {
            Err(Error::FrameConflict { class, method, .. }) => {
                assert_eq!(class, "Leaky");
                assert_eq!(method, "leak()I");
            }
            other => panic!("expected a frame conflict, got {:?}", other.map(|_| ())),
        }
    }
}
