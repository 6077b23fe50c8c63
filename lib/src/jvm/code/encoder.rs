//! Lay out a method body into bytes
//!
//! Operands are interned into the constant pool up front, so every straight-line instruction has
//! a fixed encoding before layout starts. Only branches move around: `goto` and the `if*` family
//! have a signed 16-bit relative offset, which may not be enough. Those get widened:
//!
//! ```text,ignore,no_run
//!     goto L2      =>      goto_w L2
//!
//!     if* L2       =>      ifnot* +8
//!                          goto_w L2
//! ```
//!
//! ### Termination
//!
//! Widening a jump makes the code longer, which can push other jumps out of range. Layout is
//! therefore repeated until no new jump needs widening. Since a widened jump stays widened, every
//! round either widens at least one more jump or is the last one, so the number of rounds is at
//! most the number of jumps. The loop is still capped at [`MAX_WIDENING_ROUNDS`].
//!
//! Switch padding depends on the offset of the switch, so it is recomputed on every round.

use crate::jvm::class_file::{ConstantsPool, Serialize, MAX_CODE_LENGTH};
use crate::jvm::code::{
    BranchInstruction, Instruction, InvokeType, Label, ResolvedConstant, ResolvedInstruction,
    ResolvedMethod, SymbolicInstruction,
};
use crate::jvm::descriptors::RefType;
use crate::jvm::model::{MethodBody, Op};
use crate::jvm::{ClassConstantIndex, CodeError, FieldRefConstantIndex, TooLarge};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i16::MIN as isize, i16::MAX as isize);

/// Layout is abandoned after this many rounds of widening
pub const MAX_WIDENING_ROUNDS: usize = 64;

/// Method body laid out into bytes
#[derive(Debug)]
pub struct EncodedCode {
    pub bytes: Vec<u8>,

    /// Every instruction with its byte offset, in order
    ///
    /// A widened conditional shows up as its two actual instructions (the inverted `if*` and the
    /// `goto_w`).
    pub ops: Vec<EncodedOp>,

    pub exception_table: Vec<EncodedHandler>,

    /// Byte offset of every placed label
    pub labels: HashMap<Label, usize>,

    /// Number of jumps that needed a 32-bit offset
    pub widened: usize,
}

impl EncodedCode {
    /// Offset of the instruction following `ops[index]`
    pub fn next_offset(&self, index: usize) -> usize {
        self.ops
            .get(index + 1)
            .map(|op| op.offset)
            .unwrap_or(self.bytes.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOp {
    pub offset: usize,
    pub op: ResolvedOp,
}

/// Instruction with its operands interned and its jump targets resolved to absolute offsets
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedOp {
    Insn(ResolvedInstruction),
    Branch(BranchInstruction<usize>),
}

/// Exception table entry with byte offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHandler {
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    pub catch_type: Option<CatchType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchType {
    pub index: ClassConstantIndex,

    /// Internal name of the caught class
    pub name: String,
}

/// Element of the body being laid out
enum Item {
    Insn {
        insn: ResolvedInstruction,
        bytes: Vec<u8>,
    },
    Branch {
        branch: BranchInstruction<Label>,
        wide: bool,
    },
}

impl Item {
    fn width(&self) -> usize {
        match self {
            Item::Insn { bytes, .. } => bytes.len(),
            Item::Branch { branch, wide: true } if branch.is_conditional() => 8,
            Item::Branch { wide: true, .. } => 5,
            Item::Branch { branch, .. } => branch.width(),
        }
    }

    /// Can the branch be widened (and does it still need to be)?
    fn is_narrow_jump(&self) -> bool {
        match self {
            Item::Branch { branch, wide } => {
                !*wide && (branch.is_conditional() || matches!(branch, BranchInstruction::Goto(_)))
            }
            Item::Insn { .. } => false,
        }
    }
}

/// Encode a method body
///
/// Symbolic operands get interned into `constants` (in the order they appear in the body).
pub fn encode(body: &MethodBody, constants: &mut ConstantsPool) -> Result<EncodedCode, CodeError> {
    let (mut items, label_positions) = resolve(body, constants)?;
    if items.is_empty() {
        return Err(CodeError::malformed("method body has no instructions"));
    }

    let label_item = |label: &Label| -> Result<usize, CodeError> {
        label_positions
            .get(label)
            .copied()
            .ok_or_else(|| CodeError::malformed(format!("label {} is never placed", label)))
    };

    // Jumps must land on an instruction
    for item in &items {
        if let Item::Branch { branch, .. } = item {
            for target in branch.jump_targets() {
                if label_item(&target)? == items.len() {
                    return Err(CodeError::malformed(format!(
                        "label {} is a jump target but is placed after the last instruction",
                        target
                    )));
                }
            }
        }
    }

    // Layout until no more jumps need widening
    let mut offsets: Vec<usize> = vec![0; items.len() + 1];
    let mut widened = 0;
    let mut converged = false;
    for round in 0..MAX_WIDENING_ROUNDS {
        let mut offset = 0;
        for (idx, item) in items.iter_mut().enumerate() {
            offsets[idx] = offset;
            if let Item::Branch { branch, .. } = item {
                branch.align_at(offset);
            }
            offset += item.width();
        }
        offsets[items.len()] = offset;

        let mut widened_this_round = 0;
        for (idx, item) in items.iter_mut().enumerate() {
            if !item.is_narrow_jump() {
                continue;
            }
            if let Item::Branch { branch, wide } = item {
                for target in branch.jump_targets() {
                    let jump = offsets[label_item(&target)?] as isize - offsets[idx] as isize;
                    if !SIGNED_16BIT_JUMP_RANGE.contains(&jump) {
                        *wide = true;
                    }
                }
                if *wide {
                    widened_this_round += 1;
                }
            }
        }

        log::trace!(
            "layout round {}: {} bytes, {} jumps widened",
            round,
            offset,
            widened_this_round
        );
        if widened_this_round == 0 {
            converged = true;
            break;
        }
        widened += widened_this_round;
    }
    if !converged {
        return Err(CodeError::TooLarge(TooLarge::WideningDiverged {
            rounds: MAX_WIDENING_ROUNDS,
        }));
    }

    let code_length = offsets[items.len()];
    if code_length > MAX_CODE_LENGTH {
        return Err(CodeError::TooLarge(TooLarge::CodeLength(code_length)));
    }

    // Emit
    let mut bytes: Vec<u8> = Vec::with_capacity(code_length);
    let mut ops: Vec<EncodedOp> = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let offset = offsets[idx];
        debug_assert_eq!(bytes.len(), offset);
        match item {
            Item::Insn { insn, bytes: encoded } => {
                bytes.extend(encoded);
                ops.push(EncodedOp {
                    offset,
                    op: ResolvedOp::Insn(insn),
                });
            }
            Item::Branch { branch, wide } => {
                let absolute = branch.map_labels(|label| label_item(label).map(|i| offsets[i]))?;
                match (wide, absolute.inverted(offset + 8)) {
                    (false, _) => emit_branch(&mut bytes, &mut ops, offset, absolute)?,
                    (true, Some(inverted)) => {
                        let target = absolute.jump_targets()[0];
                        emit_branch(&mut bytes, &mut ops, offset, inverted)?;
                        let goto = BranchInstruction::GotoW(target);
                        emit_branch(&mut bytes, &mut ops, offset + 3, goto)?;
                    }
                    (true, None) => {
                        let target = absolute.jump_targets()[0];
                        let goto = BranchInstruction::GotoW(target);
                        emit_branch(&mut bytes, &mut ops, offset, goto)?;
                    }
                }
            }
        }
    }

    // Exception table
    let mut exception_table = vec![];
    for handler in &body.exception_handlers {
        let start = offsets[label_item(&handler.start)?];
        let end = offsets[label_item(&handler.end)?];
        let handler_item = label_item(&handler.handler)?;
        if start >= end {
            return Err(CodeError::malformed(format!(
                "exception range {}..{} is empty or reversed",
                handler.start, handler.end
            )));
        }
        if handler_item == offsets.len() - 1 {
            return Err(CodeError::malformed(format!(
                "exception handler {} is placed after the last instruction",
                handler.handler
            )));
        }
        let catch_type = match &handler.catch_type {
            None => None,
            Some(name) => Some(CatchType {
                index: constants.get_class(name)?,
                name: name.clone(),
            }),
        };
        exception_table.push(EncodedHandler {
            start,
            end,
            handler: offsets[handler_item],
            catch_type,
        });
    }

    let labels = label_positions
        .iter()
        .map(|(label, item)| (*label, offsets[*item]))
        .collect();

    Ok(EncodedCode {
        bytes,
        ops,
        exception_table,
        labels,
        widened,
    })
}

/// Intern operands and serialize straight-line instructions, recording which item each label
/// is placed in front of
fn resolve(
    body: &MethodBody,
    constants: &mut ConstantsPool,
) -> Result<(Vec<Item>, HashMap<Label, usize>), CodeError> {
    let mut items = vec![];
    let mut label_positions = HashMap::new();

    for op in &body.ops {
        match op {
            Op::Place(label) => {
                if label_positions.insert(*label, items.len()).is_some() {
                    return Err(CodeError::malformed(format!(
                        "label {} is placed more than once",
                        label
                    )));
                }
            }
            Op::Branch(branch) => {
                check_switch(branch)?;
                items.push(Item::Branch {
                    branch: branch.clone(),
                    wide: matches!(branch, BranchInstruction::GotoW(_)),
                });
            }
            Op::Insn(insn) => {
                let insn = resolve_instruction(insn, constants)?;
                let mut bytes = vec![];
                insn.serialize(&mut bytes)
                    .map_err(|err| CodeError::malformed(err.to_string()))?;
                items.push(Item::Insn { insn, bytes });
            }
        }
    }

    Ok((items, label_positions))
}

/// Switches need at least one case in a `tableswitch` and strictly ascending keys in a
/// `lookupswitch`
fn check_switch(branch: &BranchInstruction<Label>) -> Result<(), CodeError> {
    match branch {
        BranchInstruction::TableSwitch { low, targets, .. } => {
            if targets.is_empty() {
                return Err(CodeError::malformed("`tableswitch` has no targets"));
            }
            let last = i64::from(*low) + targets.len() as i64 - 1;
            if last > i64::from(i32::MAX) {
                return Err(CodeError::malformed(format!(
                    "`tableswitch` starting at {} with {} targets overflows an int",
                    low,
                    targets.len()
                )));
            }
        }
        BranchInstruction::LookupSwitch { targets, .. } => {
            if let Some(pair) = targets.windows(2).find(|pair| pair[0].0 >= pair[1].0) {
                return Err(CodeError::malformed(format!(
                    "`lookupswitch` keys must be strictly ascending, but {} is followed by {}",
                    pair[0].0, pair[1].0
                )));
            }
        }
        _ => (),
    }
    Ok(())
}

fn resolve_instruction(
    insn: &SymbolicInstruction,
    constants: &mut ConstantsPool,
) -> Result<ResolvedInstruction, CodeError> {
    match insn {
        Instruction::New(RefType::Array(_)) => {
            return Err(CodeError::malformed("`new` cannot create an array"));
        }
        Instruction::Invoke(InvokeType::Interface, method) if !method.is_interface => {
            return Err(CodeError::malformed(format!(
                "`invokeinterface` on {}.{}, which is not an interface method",
                method.class, method.name
            )));
        }
        _ => (),
    }

    // Each closure needs to intern, but only one of them runs at a time
    let constants = RefCell::new(constants);
    insn.map(
        |class| -> Result<ClassConstantIndex, CodeError> {
            let index = constants.borrow_mut().get_class(&class.internal_name())?;
            Ok(index)
        },
        |constant| -> Result<ResolvedConstant, CodeError> {
            let index = constants.borrow_mut().get_loadable(constant)?;
            Ok(ResolvedConstant {
                index,
                wide: constant.is_wide(),
            })
        },
        |field| -> Result<FieldRefConstantIndex, CodeError> {
            let index = constants.borrow_mut().get_field_ref(field)?;
            Ok(index)
        },
        |_, method| -> Result<ResolvedMethod, CodeError> {
            let argument_slots = u8::try_from(method.descriptor.parameter_length(true))
                .map_err(|_| {
                    CodeError::malformed(format!(
                        "call to {}.{} has more than 255 argument slots",
                        method.class, method.name
                    ))
                })?;
            let index = constants.borrow_mut().get_method_ref(method)?;
            Ok(ResolvedMethod {
                index,
                argument_slots,
            })
        },
    )
}

/// Serialize a branch whose targets are absolute offsets, and record it
fn emit_branch(
    bytes: &mut Vec<u8>,
    ops: &mut Vec<EncodedOp>,
    offset: usize,
    branch: BranchInstruction<usize>,
) -> Result<(), CodeError> {
    let relative = branch.map_labels(|target| {
        Ok::<i32, CodeError>(*target as i32 - offset as i32)
    })?;
    relative
        .serialize(bytes)
        .map_err(|err| CodeError::malformed_at(offset, err.to_string()))?;
    ops.push(EncodedOp {
        offset,
        op: ResolvedOp::Branch(branch),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::code::OrdComparison;
    use crate::jvm::model::{CodeBuilder, LoadableConstant};

    fn encode_ops(build: impl FnOnce(&mut CodeBuilder)) -> Result<EncodedCode, CodeError> {
        let mut builder = CodeBuilder::new();
        build(&mut builder);
        encode(&builder.finish(), &mut ConstantsPool::new())
    }

    #[test]
    fn narrow_branches() {
        let code = encode_ops(|code| {
            let end = code.fresh_label();
            code.push_instruction(Instruction::ILoad(0));
            code.push_branch(BranchInstruction::If(OrdComparison::EQ, end));
            code.push_instruction(Instruction::Nop);
            code.place_label(end);
            code.push_branch(BranchInstruction::Return);
        })
        .unwrap();

        assert_eq!(code.bytes, vec![0x1a, 0x99, 0x00, 0x04, 0x00, 0xb1]);
        assert_eq!(code.widened, 0);
        assert_eq!(
            code.ops[1],
            EncodedOp {
                offset: 1,
                op: ResolvedOp::Branch(BranchInstruction::If(OrdComparison::EQ, 5)),
            }
        );
    }

    #[test]
    fn backwards_jump() {
        let code = encode_ops(|code| {
            let top = code.fresh_label();
            code.place_label(top);
            code.push_instruction(Instruction::Nop);
            code.push_branch(BranchInstruction::Goto(top));
        })
        .unwrap();
        assert_eq!(code.bytes, vec![0x00, 0xa7, 0xff, 0xff]);
    }

    #[test]
    fn far_conditional_is_widened() {
        let code = encode_ops(|code| {
            let end = code.fresh_label();
            code.push_instruction(Instruction::ILoad(0));
            code.push_branch(BranchInstruction::If(OrdComparison::NE, end));
            for _ in 0..20_000 {
                code.push_instruction(Instruction::IConst0);
                code.push_instruction(Instruction::Pop);
            }
            code.place_label(end);
            code.push_branch(BranchInstruction::Return);
        })
        .unwrap();

        assert_eq!(code.widened, 1);
        // `ifeq +8` then `goto_w` to the return
        assert_eq!(&code.bytes[1..4], &[0x99, 0x00, 0x08]);
        assert_eq!(code.bytes[4], 0xc8);
        let jump = i32::from_be_bytes([code.bytes[5], code.bytes[6], code.bytes[7], code.bytes[8]]);
        let target = 4 + jump as usize;
        assert_eq!(target, code.bytes.len() - 1);
        assert_eq!(code.bytes[target], 0xb1);
        assert_eq!(code.labels.values().copied().collect::<Vec<_>>(), vec![target]);
    }

    #[test]
    fn switch_padding() {
        let code = encode_ops(|code| {
            let a = code.fresh_label();
            let b = code.fresh_label();
            code.push_instruction(Instruction::ILoad(0));
            code.push_branch(BranchInstruction::TableSwitch {
                padding: 0,
                default: a,
                low: 0,
                targets: vec![a, b],
            });
            code.place_label(a);
            code.push_branch(BranchInstruction::Return);
            code.place_label(b);
            code.push_branch(BranchInstruction::Return);
        })
        .unwrap();

        // opcode at 1, two bytes of padding, then default/low/high/targets
        assert_eq!(code.bytes[1], 0xaa);
        assert_eq!(&code.bytes[2..4], &[0, 0]);
        let switch_width = 1 + 2 + 4 * 5;
        assert_eq!(code.ops[2].offset, 1 + switch_width);
        assert_eq!(&code.bytes[4..8], &(switch_width as i32).to_be_bytes());
    }

    #[test]
    fn invalid_switches_are_malformed() {
        let empty_table = encode_ops(|code| {
            let a = code.fresh_label();
            code.push_instruction(Instruction::ILoad(0));
            code.push_branch(BranchInstruction::TableSwitch {
                padding: 0,
                default: a,
                low: 0,
                targets: vec![],
            });
            code.place_label(a);
            code.push_branch(BranchInstruction::Return);
        });
        assert!(matches!(empty_table, Err(CodeError::Malformed { .. })));

        let unsorted_keys = encode_ops(|code| {
            let a = code.fresh_label();
            code.push_instruction(Instruction::ILoad(0));
            code.push_branch(BranchInstruction::LookupSwitch {
                padding: 0,
                default: a,
                targets: vec![(5, a), (1, a), (5, a)],
            });
            code.place_label(a);
            code.push_branch(BranchInstruction::Return);
        });
        assert!(matches!(unsorted_keys, Err(CodeError::Malformed { .. })));

        let duplicate_keys = encode_ops(|code| {
            let a = code.fresh_label();
            code.push_instruction(Instruction::ILoad(0));
            code.push_branch(BranchInstruction::LookupSwitch {
                padding: 0,
                default: a,
                targets: vec![(1, a), (1, a)],
            });
            code.place_label(a);
            code.push_branch(BranchInstruction::Return);
        });
        assert!(matches!(duplicate_keys, Err(CodeError::Malformed { .. })));

        let sorted_keys = encode_ops(|code| {
            let a = code.fresh_label();
            code.push_instruction(Instruction::ILoad(0));
            code.push_branch(BranchInstruction::LookupSwitch {
                padding: 0,
                default: a,
                targets: vec![(-3, a), (1, a), (5, a)],
            });
            code.place_label(a);
            code.push_branch(BranchInstruction::Return);
        });
        assert!(sorted_keys.is_ok());
    }

    #[test]
    fn wide_operands_are_selected() {
        let mut constants = ConstantsPool::new();
        for i in 0..300 {
            constants.get_loadable(&LoadableConstant::Integer(i)).unwrap();
        }
        let mut builder = CodeBuilder::new();
        builder.push_instruction(Instruction::Ldc(LoadableConstant::Integer(299)));
        builder.push_instruction(Instruction::Ldc(LoadableConstant::Long(1)));
        builder.push_instruction(Instruction::IStore(400));
        builder.push_instruction(Instruction::Pop2);
        builder.push_branch(BranchInstruction::Return);
        let code = encode(&builder.finish(), &mut constants).unwrap();

        assert_eq!(code.bytes[0], 0x13); // ldc_w
        assert_eq!(code.bytes[3], 0x14); // ldc2_w
        assert_eq!(&code.bytes[6..10], &[0xc4, 0x36, 0x01, 0x90]); // wide istore
    }

    #[test]
    fn label_errors() {
        let duplicate = encode_ops(|code| {
            let a = code.fresh_label();
            code.place_label(a);
            code.place_label(a);
            code.push_branch(BranchInstruction::Return);
        });
        assert!(matches!(duplicate, Err(CodeError::Malformed { .. })));

        let unplaced = encode_ops(|code| {
            let a = code.fresh_label();
            code.push_branch(BranchInstruction::Goto(a));
        });
        assert!(matches!(unplaced, Err(CodeError::Malformed { .. })));

        let past_the_end = encode_ops(|code| {
            let a = code.fresh_label();
            code.push_branch(BranchInstruction::Goto(a));
            code.place_label(a);
        });
        assert!(matches!(past_the_end, Err(CodeError::Malformed { .. })));

        assert!(matches!(
            encode_ops(|_| ()),
            Err(CodeError::Malformed { .. })
        ));
    }

    #[test]
    fn exception_ranges() {
        let code = encode_ops(|code| {
            let start = code.fresh_label();
            let end = code.fresh_label();
            let handler = code.fresh_label();
            code.place_label(start);
            code.push_instruction(Instruction::Nop);
            code.place_label(end);
            code.push_branch(BranchInstruction::Return);
            code.place_label(handler);
            code.push_branch(BranchInstruction::AThrow);
            code.add_exception_handler(start, end, handler, Some("java/lang/Exception"));
        })
        .unwrap();
        assert_eq!(code.exception_table.len(), 1);
        let entry = &code.exception_table[0];
        assert_eq!((entry.start, entry.end, entry.handler), (0, 1, 2));
        assert_eq!(entry.catch_type.as_ref().unwrap().name, "java/lang/Exception");

        let reversed = encode_ops(|code| {
            let start = code.fresh_label();
            let end = code.fresh_label();
            code.place_label(end);
            code.place_label(start);
            code.push_branch(BranchInstruction::Return);
            code.add_exception_handler(start, end, end, None);
        });
        assert!(matches!(reversed, Err(CodeError::Malformed { .. })));
    }

    #[test]
    fn interface_calls_need_interface_methods() {
        use crate::jvm::descriptors::MethodDescriptor;
        use crate::jvm::model::MethodRef;

        let method = MethodRef::new("java/lang/Object", "hashCode", MethodDescriptor::new(vec![], None));
        let result = encode_ops(|code| {
            code.invoke(InvokeType::Interface, method);
            code.push_branch(BranchInstruction::Return);
        });
        assert!(matches!(result, Err(CodeError::Malformed { .. })));
    }
}
