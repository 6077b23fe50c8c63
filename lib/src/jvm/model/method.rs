use crate::jvm::class_file;
use crate::jvm::class_file::{check_code, ConstantsPool};
use crate::jvm::code::{serialize_code, BranchInstruction, Label, SymbolicInstruction};
use crate::jvm::descriptors::{MethodDescriptor, RenderDescriptor};
use crate::jvm::verifier::{ClassHierarchy, MethodContext};
use crate::jvm::{Error, MethodAccessFlags};

/// Method declared on a class
#[derive(Clone, Debug)]
pub struct Method {
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,

    /// Absent exactly for `abstract` and `native` methods
    pub body: Option<MethodBody>,

    /// Internal names of the checked exceptions in the `throws` clause
    pub exceptions: Vec<String>,
}

/// Linear method body
#[derive(Clone, Debug, Default)]
pub struct MethodBody {
    pub ops: Vec<Op>,
    pub exception_handlers: Vec<ExceptionHandler>,
}

/// One element of a method body
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Insn(SymbolicInstruction),
    Branch(BranchInstruction<Label>),

    /// Mark the position of a label: it refers to the next instruction
    Place(Label),
}

/// Protected range `[start, end)` whose exceptions are routed to `handler`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,

    /// Internal name of the caught class, `None` catches everything
    pub catch_type: Option<String>,
}

impl Method {
    pub fn new(
        name: impl Into<String>,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
    ) -> Method {
        Method {
            name: name.into(),
            descriptor,
            access_flags,
            body: None,
            exceptions: vec![],
        }
    }

    pub fn with_body(mut self, body: MethodBody) -> Method {
        self.body = Some(body);
        self
    }

    pub fn throws(mut self, exception: impl Into<String>) -> Method {
        self.exceptions.push(exception.into());
        self
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Name and descriptor, which identify the method within its class
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor.render())
    }

    /// Serialize the method, including its `Code` attribute
    pub(crate) fn serialize_method(
        &self,
        class: &str,
        constants: &mut ConstantsPool,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<class_file::Method, Error> {
        let signature = self.signature();
        let malformed = |reason: &str| Error::MalformedClass {
            class: class.to_owned(),
            member: Some(signature.clone()),
            offset: None,
            reason: reason.to_owned(),
        };
        let overflow = |overflow| Error::pool_overflow(class, Some(&signature), overflow);
        let attribute = |error| Error::attribute(class, Some(&signature), error);

        if self.descriptor.parameter_length(!self.is_static()) > 255 {
            return Err(malformed("more than 255 parameter slots"));
        }
        if self.name == "<init>" && self.is_static() {
            return Err(malformed("instance initializers cannot be static"));
        }
        match (&self.body, self.access_flags.is_bodyless()) {
            (None, false) => return Err(malformed("missing body on a concrete method")),
            (Some(_), true) => return Err(malformed("abstract or native method has a body")),
            _ => (),
        }

        let name_index = constants.get_utf8(&self.name).map_err(overflow)?;
        let descriptor_index = constants
            .get_utf8(&self.descriptor.render())
            .map_err(overflow)?;

        let mut attributes = vec![];

        // `Code` attribute
        if let Some(body) = &self.body {
            let context = MethodContext {
                class,
                name: &self.name,
                descriptor: &self.descriptor,
                is_static: self.is_static(),
            };
            let code = serialize_code(body, &context, constants, hierarchy)
                .map_err(|err| Error::in_method(class, &signature, err))?;
            check_code(&code, constants).map_err(|reason| malformed(&reason))?;
            attributes.push(constants.get_attribute(code).map_err(attribute)?);
        }

        // `Exceptions` attribute
        if !self.exceptions.is_empty() {
            let exceptions = self
                .exceptions
                .iter()
                .map(|exception| constants.get_class(exception))
                .collect::<Result<Vec<_>, _>>()
                .map_err(overflow)?;
            let exceptions = class_file::Exceptions(exceptions);
            attributes.push(constants.get_attribute(exceptions).map_err(attribute)?);
        }

        Ok(class_file::Method {
            access_flags: self.access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}
