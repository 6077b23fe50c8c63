use crate::jvm::class_file;
use crate::jvm::class_file::{ConstantValue, ConstantsPool};
use crate::jvm::descriptors::{BaseType, FieldType, RefType, RenderDescriptor};
use crate::jvm::model::LoadableConstant;
use crate::jvm::{Error, FieldAccessFlags};

/// Field declared on a class
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub descriptor: FieldType,
    pub access_flags: FieldAccessFlags,

    /// Emitted as a `ConstantValue` attribute
    pub constant_value: Option<LoadableConstant>,
}

impl Field {
    pub fn new(name: impl Into<String>, descriptor: FieldType, access_flags: FieldAccessFlags) -> Self {
        Field {
            name: name.into(),
            descriptor,
            access_flags,
            constant_value: None,
        }
    }

    pub fn with_constant_value(mut self, constant: LoadableConstant) -> Self {
        self.constant_value = Some(constant);
        self
    }

    /// Name and descriptor, which identify the field within its class
    pub fn signature(&self) -> String {
        format!("{}:{}", self.name, self.descriptor.render())
    }

    /// Can the constant initialize a field of this type?
    fn accepts_constant(&self, constant: &LoadableConstant) -> bool {
        match (&self.descriptor, constant) {
            (FieldType::Base(BaseType::Long), LoadableConstant::Long(_))
            | (FieldType::Base(BaseType::Float), LoadableConstant::Float(_))
            | (FieldType::Base(BaseType::Double), LoadableConstant::Double(_)) => true,
            (
                FieldType::Base(
                    BaseType::Int
                    | BaseType::Short
                    | BaseType::Char
                    | BaseType::Byte
                    | BaseType::Boolean,
                ),
                LoadableConstant::Integer(_),
            ) => true,
            (FieldType::Ref(RefType::Object(class)), LoadableConstant::String(_)) => {
                class == "java/lang/String"
            }
            _ => false,
        }
    }

    pub(crate) fn serialize_field(
        &self,
        class: &str,
        constants: &mut ConstantsPool,
    ) -> Result<class_file::Field, Error> {
        let signature = self.signature();
        let overflow = |overflow| Error::pool_overflow(class, Some(&signature), overflow);

        let name_index = constants.get_utf8(&self.name).map_err(overflow)?;
        let descriptor_index = constants
            .get_utf8(&self.descriptor.render())
            .map_err(overflow)?;

        let mut attributes = vec![];

        // `ConstantValue` attribute
        if let Some(constant) = &self.constant_value {
            if !self.accepts_constant(constant) {
                return Err(Error::MalformedClass {
                    class: class.to_owned(),
                    member: Some(signature.clone()),
                    offset: None,
                    reason: format!("{:?} cannot initialize a field of this type", constant),
                });
            }
            let index = constants.get_loadable(constant).map_err(overflow)?;
            attributes.push(
                constants
                    .get_attribute(ConstantValue(index))
                    .map_err(|err| Error::attribute(class, Some(&signature), err))?,
            );
        }

        Ok(class_file::Field {
            access_flags: self.access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_values_must_match_the_field_type() {
        let mut constants = ConstantsPool::new();
        let flags = FieldAccessFlags::STATIC | FieldAccessFlags::FINAL;

        let ok = Field::new("MAX", FieldType::Base(BaseType::Short), flags)
            .with_constant_value(LoadableConstant::Integer(7));
        assert_eq!(ok.serialize_field("C", &mut constants).unwrap().attributes.len(), 1);

        let greeting = Field::new("HI", FieldType::Ref(RefType::Object(String::from("java/lang/String"))), flags)
            .with_constant_value(LoadableConstant::String(String::from("hi")));
        assert!(greeting.serialize_field("C", &mut constants).is_ok());

        let wrong = Field::new("PI", FieldType::Base(BaseType::Int), flags)
            .with_constant_value(LoadableConstant::Double(2.5));
        assert!(matches!(
            wrong.serialize_field("C", &mut constants),
            Err(Error::MalformedClass { .. })
        ));
    }

    #[test]
    fn signatures_include_the_descriptor() {
        let field = Field::new("count", FieldType::Base(BaseType::Long), FieldAccessFlags::PRIVATE);
        assert_eq!(field.signature(), "count:J");
    }
}
