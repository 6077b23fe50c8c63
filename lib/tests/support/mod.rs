//! Minimal class file reader used to check what the compiler emits
//!
//! This deliberately shares no code with the library: it only understands the subset of the
//! format the compiler produces, and decodes it from scratch.

#![allow(dead_code)]

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),

    /// Upper half of a long or double
    Unusable,
}

#[derive(Debug)]
pub struct ParsedClass {
    pub minor_version: u16,
    pub major_version: u16,

    /// Indexed by constant pool index, so entry `0` is always `None`
    pub constants: Vec<Option<PoolEntry>>,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<ParsedMember>,
    pub methods: Vec<ParsedMember>,
    pub attributes: Vec<ParsedAttribute>,
}

#[derive(Debug)]
pub struct ParsedMember {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<ParsedAttribute>,
}

#[derive(Debug, Clone)]
pub struct ParsedAttribute {
    pub name: String,
    pub info: Vec<u8>,
}

#[derive(Debug)]
pub struct ParsedCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ParsedHandler>,
    pub attributes: Vec<ParsedAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

type ParseResult<T> = Result<T, String>;

fn err(error: std::io::Error) -> String {
    format!("truncated class file: {}", error)
}

fn read_u8(reader: &mut Cursor<&[u8]>) -> ParseResult<u8> {
    reader.read_u8().map_err(err)
}

fn read_u16(reader: &mut Cursor<&[u8]>) -> ParseResult<u16> {
    reader.read_u16::<BigEndian>().map_err(err)
}

fn read_u32(reader: &mut Cursor<&[u8]>) -> ParseResult<u32> {
    reader.read_u32::<BigEndian>().map_err(err)
}

fn read_bytes(reader: &mut Cursor<&[u8]>, len: usize) -> ParseResult<Vec<u8>> {
    let mut buffer = vec![0; len];
    reader.read_exact(&mut buffer).map_err(err)?;
    Ok(buffer)
}

/// Decode modified UTF-8 (two byte NUL and surrogate pairs)
fn decode_modified_utf8(bytes: &[u8]) -> ParseResult<String> {
    let mut units: Vec<u16> = vec![];
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xe0 == 0xc0 && i + 1 < bytes.len() {
            units.push(((b & 0x1f) << 6) | (bytes[i + 1] as u16 & 0x3f));
            i += 2;
        } else if b & 0xf0 == 0xe0 && i + 2 < bytes.len() {
            units.push(
                ((b & 0x0f) << 12)
                    | ((bytes[i + 1] as u16 & 0x3f) << 6)
                    | (bytes[i + 2] as u16 & 0x3f),
            );
            i += 3;
        } else {
            return Err(format!("bad modified UTF-8 byte {:#x}", b));
        }
    }
    String::from_utf16(&units).map_err(|e| e.to_string())
}

fn read_attributes(
    reader: &mut Cursor<&[u8]>,
    constants: &[Option<PoolEntry>],
) -> ParseResult<Vec<ParsedAttribute>> {
    let count = read_u16(reader)?;
    let mut attributes = vec![];
    for _ in 0..count {
        let name = utf8_at(constants, read_u16(reader)?)?;
        let len = read_u32(reader)? as usize;
        let info = read_bytes(reader, len)?;
        attributes.push(ParsedAttribute { name, info });
    }
    Ok(attributes)
}

fn read_members(
    reader: &mut Cursor<&[u8]>,
    constants: &[Option<PoolEntry>],
) -> ParseResult<Vec<ParsedMember>> {
    let count = read_u16(reader)?;
    let mut members = vec![];
    for _ in 0..count {
        let access_flags = read_u16(reader)?;
        let name = utf8_at(constants, read_u16(reader)?)?;
        let descriptor = utf8_at(constants, read_u16(reader)?)?;
        let attributes = read_attributes(reader, constants)?;
        members.push(ParsedMember {
            access_flags,
            name,
            descriptor,
            attributes,
        });
    }
    Ok(members)
}

fn utf8_at(constants: &[Option<PoolEntry>], index: u16) -> ParseResult<String> {
    match constants.get(index as usize) {
        Some(Some(PoolEntry::Utf8(string))) => Ok(string.clone()),
        other => Err(format!("#{} is not a utf8 constant: {:?}", index, other)),
    }
}

/// Parse a whole class file, checking that there are no trailing bytes
pub fn parse_class(bytes: &[u8]) -> ParseResult<ParsedClass> {
    let mut reader = Cursor::new(bytes);

    let magic = read_u32(&mut reader)?;
    if magic != 0xCAFE_BABE {
        return Err(format!("bad magic {:#x}", magic));
    }
    let minor_version = read_u16(&mut reader)?;
    let major_version = read_u16(&mut reader)?;

    let count = read_u16(&mut reader)? as usize;
    let mut constants: Vec<Option<PoolEntry>> = vec![None];
    while constants.len() < count {
        let entry = match read_u8(&mut reader)? {
            1 => {
                let len = read_u16(&mut reader)? as usize;
                PoolEntry::Utf8(decode_modified_utf8(&read_bytes(&mut reader, len)?)?)
            }
            3 => PoolEntry::Integer(reader.read_i32::<BigEndian>().map_err(err)?),
            4 => PoolEntry::Float(reader.read_f32::<BigEndian>().map_err(err)?),
            5 => PoolEntry::Long(reader.read_i64::<BigEndian>().map_err(err)?),
            6 => PoolEntry::Double(reader.read_f64::<BigEndian>().map_err(err)?),
            7 => PoolEntry::Class(read_u16(&mut reader)?),
            8 => PoolEntry::String(read_u16(&mut reader)?),
            9 => PoolEntry::FieldRef(read_u16(&mut reader)?, read_u16(&mut reader)?),
            10 => PoolEntry::MethodRef(read_u16(&mut reader)?, read_u16(&mut reader)?),
            11 => PoolEntry::InterfaceMethodRef(read_u16(&mut reader)?, read_u16(&mut reader)?),
            12 => PoolEntry::NameAndType(read_u16(&mut reader)?, read_u16(&mut reader)?),
            tag => return Err(format!("unknown constant tag {}", tag)),
        };
        let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
        constants.push(Some(entry));
        if wide {
            constants.push(Some(PoolEntry::Unusable));
        }
    }
    if constants.len() != count {
        return Err(String::from("wide constant straddles the end of the pool"));
    }

    let access_flags = read_u16(&mut reader)?;
    let this_class = read_u16(&mut reader)?;
    let super_class = read_u16(&mut reader)?;
    let interface_count = read_u16(&mut reader)?;
    let interfaces = (0..interface_count)
        .map(|_| read_u16(&mut reader))
        .collect::<ParseResult<Vec<u16>>>()?;
    let fields = read_members(&mut reader, &constants)?;
    let methods = read_members(&mut reader, &constants)?;
    let attributes = read_attributes(&mut reader, &constants)?;

    if (reader.position() as usize) != bytes.len() {
        return Err(String::from("trailing bytes after class file"));
    }

    Ok(ParsedClass {
        minor_version,
        major_version,
        constants,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

impl ParsedClass {
    pub fn utf8(&self, index: u16) -> String {
        utf8_at(&self.constants, index).unwrap()
    }

    /// Internal name of a `CONSTANT_Class_info`
    pub fn class_name(&self, index: u16) -> String {
        match &self.constants[index as usize] {
            Some(PoolEntry::Class(name)) => self.utf8(*name),
            other => panic!("#{} is not a class constant: {:?}", index, other),
        }
    }

    pub fn method(&self, name: &str) -> &ParsedMember {
        self.methods
            .iter()
            .find(|method| method.name == name)
            .unwrap_or_else(|| panic!("no method named {}", name))
    }
}

impl ParsedMember {
    pub fn attribute(&self, name: &str) -> Option<&ParsedAttribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn code(&self, class: &ParsedClass) -> ParsedCode {
        let info = &self.attribute("Code").expect("method has no code").info;
        let mut reader = Cursor::new(info.as_slice());
        let max_stack = read_u16(&mut reader).unwrap();
        let max_locals = read_u16(&mut reader).unwrap();
        let code_length = read_u32(&mut reader).unwrap() as usize;
        let code = read_bytes(&mut reader, code_length).unwrap();
        let handler_count = read_u16(&mut reader).unwrap();
        let exception_table = (0..handler_count)
            .map(|_| ParsedHandler {
                start_pc: read_u16(&mut reader).unwrap(),
                end_pc: read_u16(&mut reader).unwrap(),
                handler_pc: read_u16(&mut reader).unwrap(),
                catch_type: read_u16(&mut reader).unwrap(),
            })
            .collect();
        let attributes = read_attributes(&mut reader, &class.constants).unwrap();
        assert_eq!(reader.position() as usize, info.len(), "trailing bytes in Code");
        ParsedCode {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        }
    }
}

impl ParsedCode {
    /// Raw body of the `StackMapTable` attribute (starting with the frame count)
    pub fn stack_map_table(&self) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == "StackMapTable")
            .map(|attribute| attribute.info.as_slice())
    }

    /// Decode the target of the 32-bit jump at `offset`
    pub fn goto_w_target(&self, offset: usize) -> usize {
        assert_eq!(self.code[offset], 0xc8, "expected goto_w at {}", offset);
        let jump = i32::from_be_bytes([
            self.code[offset + 1],
            self.code[offset + 2],
            self.code[offset + 3],
            self.code[offset + 4],
        ]);
        (offset as i64 + jump as i64) as usize
    }

    /// Decode the target of the 16-bit jump at `offset`
    pub fn short_jump_target(&self, offset: usize) -> usize {
        let jump = i16::from_be_bytes([self.code[offset + 1], self.code[offset + 2]]);
        (offset as i64 + jump as i64) as usize
    }
}
