use super::class_file::AttributeError;
use super::{Constant, ConstantPoolOverflow};
use std::fmt;

/// Everything that can go wrong turning a [`crate::jvm::model::Class`] into bytes
///
/// Each variant names the class, and where it applies the member and byte offset involved.
#[derive(Debug)]
pub enum Error {
    /// The constant pool of a class ran out of indices
    PoolOverflow {
        class: String,
        member: Option<String>,
        /// Index the constant would have been assigned
        index: usize,
        constant: Constant,
    },

    /// A method body cannot be encoded within the class file limits
    EncodingTooLarge {
        class: String,
        method: String,
        kind: TooLarge,
    },

    /// Two control flow paths reach an instruction with irreconcilable states, or an instruction
    /// finds the wrong kind of value on the stack or in a local
    FrameConflict {
        class: String,
        method: String,
        offset: usize,
        kind: FrameConflictKind,
    },

    /// The input cannot form a valid class file
    MalformedClass {
        class: String,
        member: Option<String>,
        offset: Option<usize>,
        reason: String,
    },

    IoError(std::io::Error),
}

impl Error {
    /// Attach class and method context to a failure inside a method body
    pub fn in_method(class: &str, method: &str, error: CodeError) -> Error {
        let class = class.to_owned();
        let method = method.to_owned();
        match error {
            CodeError::PoolOverflow(overflow) => Error::PoolOverflow {
                class,
                member: Some(method),
                index: overflow.offset,
                constant: overflow.constant,
            },
            CodeError::TooLarge(kind) => Error::EncodingTooLarge {
                class,
                method,
                kind,
            },
            CodeError::FrameConflict { offset, kind } => Error::FrameConflict {
                class,
                method,
                offset,
                kind,
            },
            CodeError::Malformed { offset, reason } => Error::MalformedClass {
                class,
                member: Some(method),
                offset,
                reason,
            },
        }
    }

    /// Attach class (and optionally member) context to a pool overflow
    pub fn pool_overflow(class: &str, member: Option<&str>, overflow: ConstantPoolOverflow) -> Error {
        Error::PoolOverflow {
            class: class.to_owned(),
            member: member.map(str::to_owned),
            index: overflow.offset,
            constant: overflow.constant,
        }
    }

    /// Attach class (and optionally member) context to an attribute that could not be built
    pub fn attribute(class: &str, member: Option<&str>, error: AttributeError) -> Error {
        match error {
            AttributeError::PoolOverflow(overflow) => Error::pool_overflow(class, member, overflow),
            AttributeError::Encoding { attribute, reason } => Error::MalformedClass {
                class: class.to_owned(),
                member: member.map(str::to_owned),
                offset: None,
                reason: format!("{} attribute: {}", attribute, reason),
            },
        }
    }

    /// Name of the class the error is about (if any)
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Error::PoolOverflow { class, .. }
            | Error::EncodingTooLarge { class, .. }
            | Error::FrameConflict { class, .. }
            | Error::MalformedClass { class, .. } => Some(class),
            Error::IoError(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolOverflow {
                class,
                member,
                index,
                constant,
            } => {
                write!(f, "constant pool overflow in {}", class)?;
                if let Some(member) = member {
                    write!(f, " ({})", member)?;
                }
                write!(f, ": {:?} needs index {} or later", constant, index)
            }
            Error::EncodingTooLarge {
                class,
                method,
                kind,
            } => write!(f, "{}.{} is too large: {}", class, method, kind),
            Error::FrameConflict {
                class,
                method,
                offset,
                kind,
            } => write!(f, "{}.{} at offset {}: {}", class, method, offset, kind),
            Error::MalformedClass {
                class,
                member,
                offset,
                reason,
            } => {
                write!(f, "malformed class {}", class)?;
                if let Some(member) = member {
                    write!(f, ", member {}", member)?;
                }
                if let Some(offset) = offset {
                    write!(f, " at offset {}", offset)?;
                }
                write!(f, ": {}", reason)
            }
            Error::IoError(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

/// Failure while compiling a single method body, before the class context is known
#[derive(Debug)]
pub enum CodeError {
    PoolOverflow(ConstantPoolOverflow),
    TooLarge(TooLarge),
    FrameConflict {
        offset: usize,
        kind: FrameConflictKind,
    },
    Malformed {
        offset: Option<usize>,
        reason: String,
    },
}

impl CodeError {
    pub fn malformed(reason: impl Into<String>) -> CodeError {
        CodeError::Malformed {
            offset: None,
            reason: reason.into(),
        }
    }

    pub fn malformed_at(offset: usize, reason: impl Into<String>) -> CodeError {
        CodeError::Malformed {
            offset: Some(offset),
            reason: reason.into(),
        }
    }
}

impl From<ConstantPoolOverflow> for CodeError {
    fn from(overflow: ConstantPoolOverflow) -> CodeError {
        CodeError::PoolOverflow(overflow)
    }
}

impl From<AttributeError> for CodeError {
    fn from(error: AttributeError) -> CodeError {
        match error {
            AttributeError::PoolOverflow(overflow) => CodeError::PoolOverflow(overflow),
            AttributeError::Encoding { attribute, reason } => {
                CodeError::malformed(format!("{} attribute: {}", attribute, reason))
            }
        }
    }
}

/// Which class file limit was exceeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TooLarge {
    /// Encoded code exceeds 65535 bytes
    CodeLength(usize),

    /// Branch widening did not settle within the allotted number of rounds
    WideningDiverged { rounds: usize },

    /// Operand stack depth exceeds 65535 slots
    MaxStack(usize),

    /// Local variables exceed 65535 slots
    MaxLocals(usize),
}

impl fmt::Display for TooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TooLarge::CodeLength(len) => write!(f, "code is {} bytes long", len),
            TooLarge::WideningDiverged { rounds } => {
                write!(f, "branch widening did not converge after {} rounds", rounds)
            }
            TooLarge::MaxStack(depth) => write!(f, "operand stack reaches {} slots", depth),
            TooLarge::MaxLocals(count) => write!(f, "{} local variable slots", count),
        }
    }
}

/// How two states (or a state and an instruction) disagree
///
/// Types are rendered as strings so the error outlives the analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameConflictKind {
    /// Incoming edges disagree on the operand stack depth
    StackDepth { expected: usize, found: usize },

    /// A stack slot holds an incompatible type
    StackType { expected: String, found: String },

    /// A local variable holds the wrong type for the instruction reading it
    LocalType {
        index: usize,
        expected: String,
        found: String,
    },

    /// An instruction pops more than the stack holds
    StackUnderflow,

    /// A return instruction does not match the method descriptor
    ReturnType { expected: String, found: String },

    /// A constructor returns before calling `super(...)` or `this(...)`
    UninitializedThis,

    /// A constant pool entry used by an instruction is missing or of the wrong kind
    BadConstant(u16),

    /// A descriptor in the constant pool does not parse
    BadDescriptor(String),
}

impl fmt::Display for FrameConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameConflictKind::StackDepth { expected, found } => write!(
                f,
                "stack depth mismatch: {} entries versus {} entries",
                expected, found
            ),
            FrameConflictKind::StackType { expected, found } => {
                write!(f, "stack holds {} where {} is expected", found, expected)
            }
            FrameConflictKind::LocalType {
                index,
                expected,
                found,
            } => write!(
                f,
                "local {} holds {} where {} is expected",
                index, found, expected
            ),
            FrameConflictKind::StackUnderflow => f.write_str("operand stack underflow"),
            FrameConflictKind::ReturnType { expected, found } => {
                write!(f, "returning {} from a method returning {}", found, expected)
            }
            FrameConflictKind::UninitializedThis => {
                f.write_str("constructor returns without initializing `this`")
            }
            FrameConflictKind::BadConstant(index) => {
                write!(f, "constant #{} is missing or of the wrong kind", index)
            }
            FrameConflictKind::BadDescriptor(descriptor) => {
                write!(f, "unparseable descriptor {:?}", descriptor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_context_is_attached() {
        let error = Error::in_method(
            "Main",
            "main([Ljava/lang/String;)V",
            CodeError::FrameConflict {
                offset: 12,
                kind: FrameConflictKind::StackDepth {
                    expected: 1,
                    found: 0,
                },
            },
        );
        assert_eq!(error.class_name(), Some("Main"));
        assert_eq!(
            error.to_string(),
            "Main.main([Ljava/lang/String;)V at offset 12: \
             stack depth mismatch: 1 entries versus 0 entries"
        );
    }

    #[test]
    fn pool_overflow_keeps_the_index() {
        let overflow = ConstantPoolOverflow {
            constant: Constant::Integer(1),
            offset: 65535,
        };
        match Error::in_method("A", "f()V", CodeError::from(overflow)) {
            Error::PoolOverflow { index, member, .. } => {
                assert_eq!(index, 65535);
                assert_eq!(member.as_deref(), Some("f()V"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
