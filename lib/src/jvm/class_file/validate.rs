use crate::jvm::class_file::{
    encode_modified_utf8, Attribute, ClassFile, Code, Constant, ConstantsPool,
};
use crate::jvm::{ClassConstantIndex, ConstantIndex, Utf8ConstantIndex};

/// Largest `code_length` a method may have
pub const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// A structural problem found before serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Malformed {
    /// Field or method the problem is in
    pub member: Option<String>,
    pub reason: String,
}

impl Malformed {
    fn class_level(reason: String) -> Malformed {
        Malformed {
            member: None,
            reason,
        }
    }
}

/// Check a `Code` attribute before it is serialized
///
/// Instruction operands are produced by interning so they are not checked again here.
pub fn check_code(code: &Code, constants: &ConstantsPool) -> Result<(), String> {
    let code_length = code.code_array.0.len();
    if code_length == 0 || code_length > MAX_CODE_LENGTH {
        return Err(format!(
            "code length {} is outside 1..={}",
            code_length, MAX_CODE_LENGTH
        ));
    }

    if code.exception_table.len() > u16::MAX as usize {
        return Err(format!(
            "{} exception table entries",
            code.exception_table.len()
        ));
    }

    for (i, handler) in code.exception_table.iter().enumerate() {
        let start = handler.start_pc.0 as usize;
        let end = handler.end_pc.0 as usize;
        let handler_pc = handler.handler_pc.0 as usize;
        if start >= end || end > code_length {
            return Err(format!(
                "exception table entry {} covers invalid range {}..{}",
                i, start, end
            ));
        }
        if handler_pc >= code_length {
            return Err(format!(
                "exception table entry {} has handler {} past the end of the code",
                i, handler_pc
            ));
        }
        if let Some(catch_type) = handler.catch_type {
            check_class_index(constants, catch_type)
                .map_err(|reason| format!("exception table entry {}: {}", i, reason))?;
        }
    }

    check_attributes(constants, &code.attributes)
}

/// Check that every index in the class points at a constant of the right kind and that all
/// counts fit the `u16` fields they are written into
pub fn check_class(class: &ClassFile) -> Result<(), Malformed> {
    let constants = &class.constants;

    for (index, constant) in constants.iter() {
        if let Constant::Utf8(string) = constant {
            let len = encode_modified_utf8(string).len();
            if len > u16::MAX as usize {
                return Err(Malformed::class_level(format!(
                    "utf8 constant #{} is {} bytes long",
                    index.0, len
                )));
            }
        }
    }

    check_class_index(constants, class.this_class)
        .map_err(|reason| Malformed::class_level(format!("this_class: {}", reason)))?;
    if let Some(super_class) = class.super_class {
        check_class_index(constants, super_class)
            .map_err(|reason| Malformed::class_level(format!("super_class: {}", reason)))?;
    }

    check_count("interfaces", class.interfaces.len()).map_err(Malformed::class_level)?;
    for interface in &class.interfaces {
        check_class_index(constants, *interface)
            .map_err(|reason| Malformed::class_level(format!("interface: {}", reason)))?;
    }

    check_count("fields", class.fields.len()).map_err(Malformed::class_level)?;
    for field in &class.fields {
        let name = constants.utf8(field.name_index).map(str::to_owned);
        let in_member = |reason: String| Malformed {
            member: name.clone(),
            reason,
        };
        check_utf8_index(constants, field.name_index).map_err(&in_member)?;
        check_utf8_index(constants, field.descriptor_index).map_err(&in_member)?;
        check_attributes(constants, &field.attributes).map_err(&in_member)?;
    }

    check_count("methods", class.methods.len()).map_err(Malformed::class_level)?;
    for method in &class.methods {
        let name = constants.utf8(method.name_index).map(str::to_owned);
        let in_member = |reason: String| Malformed {
            member: name.clone(),
            reason,
        };
        check_utf8_index(constants, method.name_index).map_err(&in_member)?;
        check_utf8_index(constants, method.descriptor_index).map_err(&in_member)?;
        check_attributes(constants, &method.attributes).map_err(&in_member)?;
    }

    check_attributes(constants, &class.attributes).map_err(Malformed::class_level)
}

fn check_count(what: &str, count: usize) -> Result<(), String> {
    if count > u16::MAX as usize {
        Err(format!("{} {} do not fit in a u16 count", count, what))
    } else {
        Ok(())
    }
}

fn check_attributes(constants: &ConstantsPool, attributes: &[Attribute]) -> Result<(), String> {
    check_count("attributes", attributes.len())?;
    for attribute in attributes {
        check_utf8_index(constants, attribute.name_index)?;
        if attribute.info.len() > u32::MAX as usize {
            return Err(String::from("attribute longer than 4GiB"));
        }
    }
    Ok(())
}

fn check_utf8_index(constants: &ConstantsPool, index: Utf8ConstantIndex) -> Result<(), String> {
    match constants.get(index.into()) {
        Some(Constant::Utf8(_)) => Ok(()),
        other => Err(describe_bad_index(index.into(), "utf8", other)),
    }
}

fn check_class_index(constants: &ConstantsPool, index: ClassConstantIndex) -> Result<(), String> {
    match constants.get(index.into()) {
        Some(Constant::Class(name)) => check_utf8_index(constants, *name),
        other => Err(describe_bad_index(index.into(), "class", other)),
    }
}

fn describe_bad_index(index: ConstantIndex, expected: &str, found: Option<&Constant>) -> String {
    match found {
        None => format!("index #{} is not a valid constant", index.0),
        Some(constant) => format!(
            "index #{} should be a {} constant but is {:?}",
            index.0, expected, constant
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::class_file::{BytecodeArray, BytecodeIndex, ExceptionHandler, Version};
    use crate::jvm::ClassAccessFlags;

    fn code(bytes: Vec<u8>, exception_table: Vec<ExceptionHandler>) -> Code {
        Code {
            max_stack: 1,
            max_locals: 1,
            code_array: BytecodeArray(bytes),
            exception_table,
            attributes: vec![],
        }
    }

    #[test]
    fn empty_code_is_rejected() {
        let pool = ConstantsPool::new();
        assert!(check_code(&code(vec![], vec![]), &pool).is_err());
        assert!(check_code(&code(vec![0xb1], vec![]), &pool).is_ok());
    }

    #[test]
    fn exception_ranges_must_be_inside_the_code() {
        let pool = ConstantsPool::new();
        let handler = |start, end, handler| ExceptionHandler {
            start_pc: BytecodeIndex(start),
            end_pc: BytecodeIndex(end),
            handler_pc: BytecodeIndex(handler),
            catch_type: None,
        };
        let bytes = vec![0x00, 0x00, 0xb1];
        assert!(check_code(&code(bytes.clone(), vec![handler(0, 2, 2)]), &pool).is_ok());
        assert!(check_code(&code(bytes.clone(), vec![handler(1, 1, 2)]), &pool).is_err());
        assert!(check_code(&code(bytes.clone(), vec![handler(0, 4, 2)]), &pool).is_err());
        assert!(check_code(&code(bytes, vec![handler(0, 2, 3)]), &pool).is_err());
    }

    #[test]
    fn oversized_utf8_constants_are_rejected() {
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class("Foo").unwrap();
        let class = ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::PUBLIC,
            this_class,
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        };
        assert!(check_class(&class).is_ok());

        let mut constants = class.constants;
        constants.get_utf8(&"\u{0}".repeat(40_000)).unwrap();
        let class = ClassFile { constants, ..class };
        let err = check_class(&class).unwrap_err();
        assert_eq!(err.member, None);
        assert!(err.reason.contains("80000 bytes"), "{}", err.reason);
    }
}
