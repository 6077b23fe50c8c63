//! AST of JVM bytecode, generic over how operands are represented.
//!
//! Operands start out symbolic (class names, member references, literal constants) and get
//! resolved into constant pool indices right before layout. A few deliberate departures from the
//! raw instruction set:
//!
//!   - `wide` never shows up: loads, stores, and `iinc` pick their narrow or wide form from the
//!     operand when they are serialized
//!
//!   - `ldc`, `ldc_w`, and `ldc2_w` are one instruction
//!
//!   - branches live in their own type, parametrized over the jump target representation
//!
//!   - `jsr`, `ret`, `invokedynamic`, and the monitor instructions are omitted
//!

use crate::jvm::class_file::{u16_length, Serialize};
use crate::jvm::descriptors::{BaseType, RefType};
use crate::jvm::model::{FieldRef, LoadableConstant, MethodRef};
use crate::jvm::{ClassConstantIndex, ConstantIndex, FieldRefConstantIndex, MethodRefConstantIndex};
use byteorder::WriteBytesExt;
use std::io::{Error, ErrorKind, Result};
use std::ops::Not;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction<Class, Constant, Field, Method> {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(Constant), // covers `ldc`, `ldc_w`, and `ldc2_w`
    ILoad(u16),    // covers `iload`, `iload_<n>`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore_<n>`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(Field),
    PutStatic(Field),
    GetField(Field),
    PutField(Field),
    Invoke(InvokeType, Method),
    New(Class),
    NewArray(BaseType),
    ANewArray(Class),
    ArrayLength,
    CheckCast(Class),
    InstanceOf(Class),
}

/// Instruction as it is written in a method body
pub type SymbolicInstruction = Instruction<RefType, LoadableConstant, FieldRef, MethodRef>;

/// Instruction with all operands interned into the constant pool
pub type ResolvedInstruction =
    Instruction<ClassConstantIndex, ResolvedConstant, FieldRefConstantIndex, ResolvedMethod>;

/// Interned `ldc` operand
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConstant {
    pub index: ConstantIndex,

    /// `long` and `double` constants must be loaded with `ldc2_w`
    pub wide: bool,
}

/// Interned method operand
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub index: MethodRefConstantIndex,

    /// Argument slots including the receiver (the `count` operand of `invokeinterface`)
    pub argument_slots: u8,
}

impl<Class, Constant, Field, Method> Instruction<Class, Constant, Field, Method> {
    pub fn map<Class2, Constant2, Field2, Method2, E>(
        &self,
        mut map_class: impl FnMut(&Class) -> std::result::Result<Class2, E>,
        mut map_constant: impl FnMut(&Constant) -> std::result::Result<Constant2, E>,
        mut map_field: impl FnMut(&Field) -> std::result::Result<Field2, E>,
        mut map_method: impl FnMut(InvokeType, &Method) -> std::result::Result<Method2, E>,
    ) -> std::result::Result<Instruction<Class2, Constant2, Field2, Method2>, E> {
        use Instruction::*;

        Ok(match self {
            Nop => Nop,
            AConstNull => AConstNull,
            IConstM1 => IConstM1,
            IConst0 => IConst0,
            IConst1 => IConst1,
            IConst2 => IConst2,
            IConst3 => IConst3,
            IConst4 => IConst4,
            IConst5 => IConst5,
            LConst0 => LConst0,
            LConst1 => LConst1,
            FConst0 => FConst0,
            FConst1 => FConst1,
            FConst2 => FConst2,
            DConst0 => DConst0,
            DConst1 => DConst1,
            BiPush(b) => BiPush(*b),
            SiPush(s) => SiPush(*s),
            Ldc(constant) => Ldc(map_constant(constant)?),
            ILoad(idx) => ILoad(*idx),
            LLoad(idx) => LLoad(*idx),
            FLoad(idx) => FLoad(*idx),
            DLoad(idx) => DLoad(*idx),
            ALoad(idx) => ALoad(*idx),
            IALoad => IALoad,
            LALoad => LALoad,
            FALoad => FALoad,
            DALoad => DALoad,
            AALoad => AALoad,
            BALoad => BALoad,
            CALoad => CALoad,
            SALoad => SALoad,
            IStore(idx) => IStore(*idx),
            LStore(idx) => LStore(*idx),
            FStore(idx) => FStore(*idx),
            DStore(idx) => DStore(*idx),
            AStore(idx) => AStore(*idx),
            IAStore => IAStore,
            LAStore => LAStore,
            FAStore => FAStore,
            DAStore => DAStore,
            AAStore => AAStore,
            BAStore => BAStore,
            CAStore => CAStore,
            SAStore => SAStore,
            Pop => Pop,
            Pop2 => Pop2,
            Dup => Dup,
            DupX1 => DupX1,
            DupX2 => DupX2,
            Dup2 => Dup2,
            Dup2X1 => Dup2X1,
            Dup2X2 => Dup2X2,
            Swap => Swap,
            IAdd => IAdd,
            LAdd => LAdd,
            FAdd => FAdd,
            DAdd => DAdd,
            ISub => ISub,
            LSub => LSub,
            FSub => FSub,
            DSub => DSub,
            IMul => IMul,
            LMul => LMul,
            FMul => FMul,
            DMul => DMul,
            IDiv => IDiv,
            LDiv => LDiv,
            FDiv => FDiv,
            DDiv => DDiv,
            IRem => IRem,
            LRem => LRem,
            FRem => FRem,
            DRem => DRem,
            INeg => INeg,
            LNeg => LNeg,
            FNeg => FNeg,
            DNeg => DNeg,
            ISh(s) => ISh(*s),
            LSh(s) => LSh(*s),
            IAnd => IAnd,
            LAnd => LAnd,
            IOr => IOr,
            LOr => LOr,
            IXor => IXor,
            LXor => LXor,
            IInc(idx, by) => IInc(*idx, *by),
            I2L => I2L,
            I2F => I2F,
            I2D => I2D,
            L2I => L2I,
            L2F => L2F,
            L2D => L2D,
            F2I => F2I,
            F2L => F2L,
            F2D => F2D,
            D2I => D2I,
            D2L => D2L,
            D2F => D2F,
            I2B => I2B,
            I2C => I2C,
            I2S => I2S,
            LCmp => LCmp,
            FCmp(m) => FCmp(*m),
            DCmp(m) => DCmp(*m),
            GetStatic(field) => GetStatic(map_field(field)?),
            PutStatic(field) => PutStatic(map_field(field)?),
            GetField(field) => GetField(map_field(field)?),
            PutField(field) => PutField(map_field(field)?),
            Invoke(typ, method) => Invoke(*typ, map_method(*typ, method)?),
            New(class) => New(map_class(class)?),
            NewArray(bt) => NewArray(*bt),
            ANewArray(class) => ANewArray(map_class(class)?),
            ArrayLength => ArrayLength,
            CheckCast(class) => CheckCast(map_class(class)?),
            InstanceOf(class) => InstanceOf(map_class(class)?),
        })
    }
}

impl ResolvedInstruction {
    /// Opcode of instructions whose encoding does not depend on their operand
    fn fixed_opcode(&self) -> Option<u8> {
        use Instruction::*;

        let opcode = match self {
            Nop => 0x00,
            AConstNull => 0x01,
            IConstM1 => 0x02,
            IConst0 => 0x03,
            IConst1 => 0x04,
            IConst2 => 0x05,
            IConst3 => 0x06,
            IConst4 => 0x07,
            IConst5 => 0x08,
            LConst0 => 0x09,
            LConst1 => 0x0a,
            FConst0 => 0x0b,
            FConst1 => 0x0c,
            FConst2 => 0x0d,
            DConst0 => 0x0e,
            DConst1 => 0x0f,
            BiPush(_) => 0x10,
            SiPush(_) => 0x11,
            IALoad => 0x2e,
            LALoad => 0x2f,
            FALoad => 0x30,
            DALoad => 0x31,
            AALoad => 0x32,
            BALoad => 0x33,
            CALoad => 0x34,
            SALoad => 0x35,
            IAStore => 0x4f,
            LAStore => 0x50,
            FAStore => 0x51,
            DAStore => 0x52,
            AAStore => 0x53,
            BAStore => 0x54,
            CAStore => 0x55,
            SAStore => 0x56,
            Pop => 0x57,
            Pop2 => 0x58,
            Dup => 0x59,
            DupX1 => 0x5a,
            DupX2 => 0x5b,
            Dup2 => 0x5c,
            Dup2X1 => 0x5d,
            Dup2X2 => 0x5e,
            Swap => 0x5f,
            IAdd => 0x60,
            LAdd => 0x61,
            FAdd => 0x62,
            DAdd => 0x63,
            ISub => 0x64,
            LSub => 0x65,
            FSub => 0x66,
            DSub => 0x67,
            IMul => 0x68,
            LMul => 0x69,
            FMul => 0x6a,
            DMul => 0x6b,
            IDiv => 0x6c,
            LDiv => 0x6d,
            FDiv => 0x6e,
            DDiv => 0x6f,
            IRem => 0x70,
            LRem => 0x71,
            FRem => 0x72,
            DRem => 0x73,
            INeg => 0x74,
            LNeg => 0x75,
            FNeg => 0x76,
            DNeg => 0x77,
            ISh(ShiftType::Left) => 0x78,
            LSh(ShiftType::Left) => 0x79,
            ISh(ShiftType::ArithmeticRight) => 0x7a,
            LSh(ShiftType::ArithmeticRight) => 0x7b,
            ISh(ShiftType::LogicalRight) => 0x7c,
            LSh(ShiftType::LogicalRight) => 0x7d,
            IAnd => 0x7e,
            LAnd => 0x7f,
            IOr => 0x80,
            LOr => 0x81,
            IXor => 0x82,
            LXor => 0x83,
            I2L => 0x85,
            I2F => 0x86,
            I2D => 0x87,
            L2I => 0x88,
            L2F => 0x89,
            L2D => 0x8a,
            F2I => 0x8b,
            F2L => 0x8c,
            F2D => 0x8d,
            D2I => 0x8e,
            D2L => 0x8f,
            D2F => 0x90,
            I2B => 0x91,
            I2C => 0x92,
            I2S => 0x93,
            LCmp => 0x94,
            FCmp(CompareMode::L) => 0x95,
            FCmp(CompareMode::G) => 0x96,
            DCmp(CompareMode::L) => 0x97,
            DCmp(CompareMode::G) => 0x98,
            GetStatic(_) => 0xb2,
            PutStatic(_) => 0xb3,
            GetField(_) => 0xb4,
            PutField(_) => 0xb5,
            Invoke(InvokeType::Virtual, _) => 0xb6,
            Invoke(InvokeType::Special, _) => 0xb7,
            Invoke(InvokeType::Static, _) => 0xb8,
            Invoke(InvokeType::Interface, _) => 0xb9,
            New(_) => 0xbb,
            NewArray(_) => 0xbc,
            ANewArray(_) => 0xbd,
            ArrayLength => 0xbe,
            CheckCast(_) => 0xc0,
            InstanceOf(_) => 0xc1,
            Ldc(_) | ILoad(_) | LLoad(_) | FLoad(_) | DLoad(_) | ALoad(_) | IStore(_)
            | LStore(_) | FStore(_) | DStore(_) | AStore(_) | IInc(_, _) => return None,
        };
        Some(opcode)
    }
}

impl Serialize for ResolvedInstruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        /* The load/store instructions follow the same pattern:
         *
         *   - slots 0-3 have dedicated opcodes
         *   - slots up to 255 use the regular opcode plus a byte operand
         *   - everything else is prefixed with `wide` and has a two byte operand
         */
        fn serialize_load_or_store<W: WriteBytesExt>(
            idx: u16,
            short_form_start: u8,
            normal_form: u8,
            writer: &mut W,
        ) -> Result<()> {
            match u8::try_from(idx) {
                Ok(n @ 0..=3) => (short_form_start + n).serialize(writer),
                Ok(n) => {
                    normal_form.serialize(writer)?;
                    n.serialize(writer)
                }
                Err(_) => {
                    WIDE.serialize(writer)?;
                    normal_form.serialize(writer)?;
                    idx.serialize(writer)
                }
            }
        }

        if let Some(opcode) = self.fixed_opcode() {
            opcode.serialize(writer)?;
        }

        match self {
            Instruction::BiPush(b) => b.serialize(writer)?,
            Instruction::SiPush(s) => s.serialize(writer)?,
            Instruction::Ldc(ResolvedConstant { index, wide: true }) => {
                0x14u8.serialize(writer)?;
                index.serialize(writer)?;
            }
            Instruction::Ldc(ResolvedConstant { index, wide: false }) => {
                match u8::try_from(index.0) {
                    Ok(b) => {
                        0x12u8.serialize(writer)?;
                        b.serialize(writer)?;
                    }
                    Err(_) => {
                        0x13u8.serialize(writer)?;
                        index.serialize(writer)?;
                    }
                }
            }
            Instruction::ILoad(idx) => serialize_load_or_store(*idx, 0x1a, 0x15, writer)?,
            Instruction::LLoad(idx) => serialize_load_or_store(*idx, 0x1e, 0x16, writer)?,
            Instruction::FLoad(idx) => serialize_load_or_store(*idx, 0x22, 0x17, writer)?,
            Instruction::DLoad(idx) => serialize_load_or_store(*idx, 0x26, 0x18, writer)?,
            Instruction::ALoad(idx) => serialize_load_or_store(*idx, 0x2a, 0x19, writer)?,
            Instruction::IStore(idx) => serialize_load_or_store(*idx, 0x3b, 0x36, writer)?,
            Instruction::LStore(idx) => serialize_load_or_store(*idx, 0x3f, 0x37, writer)?,
            Instruction::FStore(idx) => serialize_load_or_store(*idx, 0x43, 0x38, writer)?,
            Instruction::DStore(idx) => serialize_load_or_store(*idx, 0x47, 0x39, writer)?,
            Instruction::AStore(idx) => serialize_load_or_store(*idx, 0x4b, 0x3a, writer)?,
            Instruction::IInc(idx, diff) => match (u8::try_from(*idx), i8::try_from(*diff)) {
                (Ok(b), Ok(d)) => {
                    0x84u8.serialize(writer)?;
                    b.serialize(writer)?;
                    d.serialize(writer)?;
                }
                _ => {
                    WIDE.serialize(writer)?;
                    0x84u8.serialize(writer)?;
                    idx.serialize(writer)?;
                    diff.serialize(writer)?;
                }
            },
            Instruction::GetStatic(idx)
            | Instruction::PutStatic(idx)
            | Instruction::GetField(idx)
            | Instruction::PutField(idx) => idx.serialize(writer)?,
            Instruction::Invoke(InvokeType::Interface, method) => {
                method.index.serialize(writer)?;
                method.argument_slots.serialize(writer)?;
                0u8.serialize(writer)?;
            }
            Instruction::Invoke(_, method) => method.index.serialize(writer)?,
            Instruction::NewArray(base_type) => {
                let atype: u8 = match base_type {
                    BaseType::Boolean => 4,
                    BaseType::Char => 5,
                    BaseType::Float => 6,
                    BaseType::Double => 7,
                    BaseType::Byte => 8,
                    BaseType::Short => 9,
                    BaseType::Int => 10,
                    BaseType::Long => 11,
                };
                atype.serialize(writer)?;
            }
            Instruction::New(idx)
            | Instruction::ANewArray(idx)
            | Instruction::CheckCast(idx)
            | Instruction::InstanceOf(idx) => idx.serialize(writer)?,
            _ => (),
        }
        Ok(())
    }
}

/// Prefix for the wide forms of local variable instructions
const WIDE: u8 = 0xc4;

/// Branching JVM bytecode instruction
///
/// `Lbl` is the jump target representation: labels in a method body, absolute offsets once the
/// code is laid out, and offsets relative to the instruction right before serialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),
    GotoW(Lbl),
    TableSwitch {
        /// `default` must be at a multiple of four bytes from the start of the current method, so
        /// there is a 0-3 inclusive byte padding (recomputed during layout)
        padding: u8,
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len() - 1`
        default: Lbl,
        /// Value associated with the first jump target
        low: i32,
        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Same alignment padding as `TableSwitch`
        padding: u8,
        /// Jump target if there is no corresponding key
        default: Lbl,
        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

impl<Lbl: Copy> BranchInstruction<Lbl> {
    /// Can execution continue with the next instruction?
    pub fn can_fall_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(..)
                | BranchInstruction::IfICmp(..)
                | BranchInstruction::IfACmp(..)
                | BranchInstruction::IfNull(..)
        )
    }

    /// Conditional jumps with a signed 16-bit offset, the ones that can be rewritten around a
    /// `goto_w` when the target is out of reach
    pub fn is_conditional(&self) -> bool {
        self.can_fall_through()
    }

    /// Explicit jump targets (not counting the fall through)
    pub fn jump_targets(&self) -> Vec<Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::GotoW(lbl) => vec![*lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            BranchInstruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                all.extend(targets.iter().map(|(_, target)| *target));
                all
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => vec![],
        }
    }

    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> std::result::Result<Lbl2, E>,
    ) -> std::result::Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            GotoW(lbl) => GotoW(map_label(lbl)?),
            TableSwitch {
                padding,
                default,
                low,
                targets,
            } => TableSwitch {
                padding: *padding,
                default: map_label(default)?,
                low: *low,
                targets: targets.iter().map(&mut map_label).collect::<std::result::Result<_, E>>()?,
            },
            LookupSwitch {
                padding,
                default,
                targets,
            } => LookupSwitch {
                padding: *padding,
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| Ok((*key, map_label(lbl)?)))
                    .collect::<std::result::Result<_, E>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
        })
    }

    /// The same conditional jump, but taken exactly when this one is not
    pub fn inverted(&self, target: Lbl) -> Option<BranchInstruction<Lbl>> {
        match self {
            BranchInstruction::If(op, _) => Some(BranchInstruction::If(!*op, target)),
            BranchInstruction::IfICmp(op, _) => Some(BranchInstruction::IfICmp(!*op, target)),
            BranchInstruction::IfACmp(op, _) => Some(BranchInstruction::IfACmp(!*op, target)),
            BranchInstruction::IfNull(op, _) => Some(BranchInstruction::IfNull(!*op, target)),
            _ => None,
        }
    }

    /// Encoded width, given the padding recorded in switches
    pub fn width(&self) -> usize {
        match self {
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,
            BranchInstruction::Goto(_)
            | BranchInstruction::If(..)
            | BranchInstruction::IfICmp(..)
            | BranchInstruction::IfACmp(..)
            | BranchInstruction::IfNull(..) => 3,
            BranchInstruction::GotoW(_) => 5,
            BranchInstruction::TableSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 4 * (3 + targets.len()),
            BranchInstruction::LookupSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 8 * (1 + targets.len()),
        }
    }

    /// Set the switch padding for an instruction starting at `offset`
    pub fn align_at(&mut self, offset: usize) {
        let aligned = (4 - (offset + 1) % 4) % 4;
        match self {
            BranchInstruction::TableSwitch { padding, .. }
            | BranchInstruction::LookupSwitch { padding, .. } => *padding = aligned as u8,
            _ => (),
        }
    }
}

/// Jump offsets are relative to the start of the branch instruction
impl Serialize for BranchInstruction<i32> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        fn short_jump<W: WriteBytesExt>(opcode: u8, jump: i32, writer: &mut W) -> Result<()> {
            let jump = i16::try_from(jump).map_err(|_| {
                let msg = format!("Jump of {} does not fit in a 16-bit offset", jump);
                Error::new(ErrorKind::InvalidData, msg)
            })?;
            opcode.serialize(writer)?;
            jump.serialize(writer)
        }

        match self {
            BranchInstruction::If(comp, jump) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => 0x99,
                    OrdComparison::NE => 0x9a,
                    OrdComparison::LT => 0x9b,
                    OrdComparison::GE => 0x9c,
                    OrdComparison::GT => 0x9d,
                    OrdComparison::LE => 0x9e,
                };
                short_jump(opcode, *jump, writer)?;
            }
            BranchInstruction::IfICmp(comp, jump) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => 0x9f,
                    OrdComparison::NE => 0xa0,
                    OrdComparison::LT => 0xa1,
                    OrdComparison::GE => 0xa2,
                    OrdComparison::GT => 0xa3,
                    OrdComparison::LE => 0xa4,
                };
                short_jump(opcode, *jump, writer)?;
            }
            BranchInstruction::IfACmp(comp, jump) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xa5,
                    EqComparison::NE => 0xa6,
                };
                short_jump(opcode, *jump, writer)?;
            }
            BranchInstruction::IfNull(comp, jump) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xc6,
                    EqComparison::NE => 0xc7,
                };
                short_jump(opcode, *jump, writer)?;
            }
            BranchInstruction::Goto(jump) => short_jump(0xa7, *jump, writer)?,
            BranchInstruction::GotoW(jump) => {
                0xc8u8.serialize(writer)?;
                jump.serialize(writer)?;
            }
            BranchInstruction::TableSwitch {
                padding,
                default,
                low,
                targets,
            } => {
                0xaau8.serialize(writer)?;
                for _ in 0..*padding {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                low.serialize(writer)?;
                let count = i32::from(u16_length(targets.len())?);
                let high = low.checked_add(count - 1).ok_or_else(|| {
                    Error::new(ErrorKind::InvalidData, "tableswitch range overflows an int")
                })?;
                high.serialize(writer)?;
                for target in targets {
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::LookupSwitch {
                padding,
                default,
                targets,
            } => {
                0xabu8.serialize(writer)?;
                for _ in 0..*padding {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                i32::from(u16_length(targets.len())?).serialize(writer)?;
                for (key, target) in targets {
                    key.serialize(writer)?;
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::IReturn => 0xacu8.serialize(writer)?,
            BranchInstruction::LReturn => 0xadu8.serialize(writer)?,
            BranchInstruction::FReturn => 0xaeu8.serialize(writer)?,
            BranchInstruction::DReturn => 0xafu8.serialize(writer)?,
            BranchInstruction::AReturn => 0xb0u8.serialize(writer)?,
            BranchInstruction::Return => 0xb1u8.serialize(writer)?,
            BranchInstruction::AThrow => 0xbfu8.serialize(writer)?,
        }
        Ok(())
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,
    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}
