use super::*;
use crate::jvm::class_file::{Constant, ConstantsPool};
use crate::jvm::code::{
    BranchInstruction, ControlFlowGraph, EdgeKind, EncodedCode, Instruction, InvokeType,
    ResolvedConstant, ResolvedInstruction, ResolvedMethod, ResolvedOp,
};
use crate::jvm::descriptors::{BaseType, FieldType, MethodDescriptor, ParseDescriptor, RefType};
use crate::jvm::{
    ClassConstantIndex, CodeError, ConstantIndex, FieldRefConstantIndex, FrameConflictKind,
};
use crate::util::{OffsetVec, Width};
use std::collections::BTreeSet;

/// What the inferencer needs to know about the method whose body it is analyzing
#[derive(Debug, Clone, Copy)]
pub struct MethodContext<'a> {
    /// Internal name of the class declaring the method
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a MethodDescriptor,
    pub is_static: bool,
}

impl MethodContext<'_> {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

/// Entry frame of every basic block, along with the `Code` attribute maximums
#[derive(Debug)]
pub struct InferredFrames {
    /// Indexed like [`ControlFlowGraph::blocks`], `None` for blocks that are never reached
    pub frames: Vec<Option<InferredFrame>>,
    pub max_stack: usize,
    pub max_locals: usize,
}

/// Compute the frame at the start of every reachable basic block
///
/// This is a forward dataflow analysis: a block is (re)analyzed whenever the frame flowing into
/// it changes, and frames only ever get more general so the worklist eventually drains.
pub fn infer_frames(
    cfg: &ControlFlowGraph,
    code: &EncodedCode,
    context: &MethodContext,
    constants: &ConstantsPool,
    hierarchy: &dyn ClassHierarchy,
) -> Result<InferredFrames, CodeError> {
    let entry = InferredFrame::entry(context);
    let mut max_stack = 0;
    let mut max_locals = entry.locals.len();

    let mut frames: Vec<Option<InferredFrame>> = vec![None; cfg.blocks.len()];
    let mut worklist: BTreeSet<usize> = BTreeSet::new();
    if !cfg.blocks.is_empty() {
        frames[0] = Some(entry);
        worklist.insert(0);
    }

    let mut visits = 0;
    while let Some(block_idx) = worklist.iter().next().copied() {
        worklist.remove(&block_idx);
        visits += 1;

        let block = &cfg.blocks[block_idx];
        let mut frame = match &frames[block_idx] {
            Some(frame) => frame.clone(),
            None => continue,
        };
        log::trace!("analyzing block {} at offset {}", block_idx, block.start);
        max_stack = max_stack.max(frame.stack_slots());

        let handlers: Vec<(usize, Option<&str>)> = block
            .successors
            .iter()
            .filter_map(|edge| match &edge.kind {
                EdgeKind::Exception { catch_type, .. } => {
                    Some((edge.target, catch_type.as_deref()))
                }
                _ => None,
            })
            .collect();

        for op in &code.ops[block.ops.clone()] {
            for (handler, catch_type) in &handlers {
                let incoming = InferredFrame::handler(&frame.locals, *catch_type);
                merge_into(&mut frames, &mut worklist, cfg, *handler, incoming, hierarchy)?;
            }

            let transferred = match &op.op {
                ResolvedOp::Insn(insn) => {
                    transfer_instruction(&mut frame, insn, op.offset, constants, context)
                }
                ResolvedOp::Branch(branch) => transfer_branch(&mut frame, branch, context),
            };
            transferred.map_err(|kind| CodeError::FrameConflict {
                offset: op.offset,
                kind,
            })?;
            max_stack = max_stack.max(frame.stack_slots());
            max_locals = max_locals.max(frame.locals.len());

            for (handler, catch_type) in &handlers {
                let incoming = InferredFrame::handler(&frame.locals, *catch_type);
                merge_into(&mut frames, &mut worklist, cfg, *handler, incoming, hierarchy)?;
            }
        }

        for edge in &block.successors {
            if !matches!(edge.kind, EdgeKind::Exception { .. }) {
                merge_into(
                    &mut frames,
                    &mut worklist,
                    cfg,
                    edge.target,
                    frame.clone(),
                    hierarchy,
                )?;
            }
        }
    }

    log::trace!(
        "frames converged after {} block visits ({} blocks)",
        visits,
        cfg.blocks.len()
    );
    Ok(InferredFrames {
        frames,
        max_stack,
        max_locals,
    })
}

fn merge_into(
    frames: &mut [Option<InferredFrame>],
    worklist: &mut BTreeSet<usize>,
    cfg: &ControlFlowGraph,
    target: usize,
    incoming: InferredFrame,
    hierarchy: &dyn ClassHierarchy,
) -> Result<(), CodeError> {
    let changed = match frames[target].as_mut() {
        Some(existing) => {
            existing
                .merge(&incoming, hierarchy)
                .map_err(|kind| CodeError::FrameConflict {
                    offset: cfg.blocks[target].start,
                    kind,
                })?
        }
        None => {
            frames[target] = Some(incoming);
            true
        }
    };
    if changed {
        worklist.insert(target);
    }
    Ok(())
}

/// Update a frame to reflect the effect of a straight-line instruction
pub fn transfer_instruction(
    frame: &mut InferredFrame,
    insn: &ResolvedInstruction,
    offset: usize,
    constants: &ConstantsPool,
    context: &MethodContext,
) -> Result<(), FrameConflictKind> {
    use Instruction::*;
    use VerificationType::*;

    let Frame { stack, locals } = frame;

    match insn {
        Nop => (),
        AConstNull => {
            stack.push(Null);
        }
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | BiPush(_)
        | SiPush(_) => {
            stack.push(Integer);
        }
        LConst0 | LConst1 => {
            stack.push(Long);
        }
        FConst0 | FConst1 | FConst2 => {
            stack.push(Float);
        }
        DConst0 | DConst1 => {
            stack.push(Double);
        }
        Ldc(ResolvedConstant { index, .. }) => {
            let typ = match constants.get(*index) {
                Some(Constant::Integer(_)) => Integer,
                Some(Constant::Float(_)) => Float,
                Some(Constant::Long(_)) => Long,
                Some(Constant::Double(_)) => Double,
                Some(Constant::String(_)) => InferredType::object("java/lang/String"),
                Some(Constant::Class(_)) => InferredType::object("java/lang/Class"),
                _ => return Err(FrameConflictKind::BadConstant(index.0)),
            };
            stack.push(typ);
        }

        ILoad(idx) => {
            stack.push(load_local(locals, *idx, Integer)?);
        }
        LLoad(idx) => {
            stack.push(load_local(locals, *idx, Long)?);
        }
        FLoad(idx) => {
            stack.push(load_local(locals, *idx, Float)?);
        }
        DLoad(idx) => {
            stack.push(load_local(locals, *idx, Double)?);
        }
        ALoad(idx) => {
            let typ = locals.get(*idx as usize).cloned().unwrap_or(Top);
            if !typ.is_reference() {
                return Err(FrameConflictKind::LocalType {
                    index: *idx as usize,
                    expected: String::from("reference"),
                    found: typ.to_string(),
                });
            }
            stack.push(typ);
        }

        IALoad => array_load(stack, &[BaseType::Int], Integer)?,
        LALoad => array_load(stack, &[BaseType::Long], Long)?,
        FALoad => array_load(stack, &[BaseType::Float], Float)?,
        DALoad => array_load(stack, &[BaseType::Double], Double)?,
        BALoad => array_load(stack, &[BaseType::Byte, BaseType::Boolean], Integer)?,
        CALoad => array_load(stack, &[BaseType::Char], Integer)?,
        SALoad => array_load(stack, &[BaseType::Short], Integer)?,
        AALoad => {
            pop_expecting(stack, Integer)?;
            match pop_array(stack, |elem| matches!(elem, FieldType::Ref(_)))? {
                Some(FieldType::Ref(elem)) => stack.push(Object(elem)),
                _ => stack.push(Null),
            };
        }

        IStore(idx) => {
            pop_expecting(stack, Integer)?;
            store_local(locals, *idx, Integer);
        }
        LStore(idx) => {
            pop_expecting(stack, Long)?;
            store_local(locals, *idx, Long);
        }
        FStore(idx) => {
            pop_expecting(stack, Float)?;
            store_local(locals, *idx, Float);
        }
        DStore(idx) => {
            pop_expecting(stack, Double)?;
            store_local(locals, *idx, Double);
        }
        AStore(idx) => {
            let typ = pop_reference(stack)?;
            store_local(locals, *idx, typ);
        }

        IAStore => array_store(stack, &[BaseType::Int], Integer)?,
        LAStore => array_store(stack, &[BaseType::Long], Long)?,
        FAStore => array_store(stack, &[BaseType::Float], Float)?,
        DAStore => array_store(stack, &[BaseType::Double], Double)?,
        BAStore => array_store(stack, &[BaseType::Byte, BaseType::Boolean], Integer)?,
        CAStore => array_store(stack, &[BaseType::Char], Integer)?,
        SAStore => array_store(stack, &[BaseType::Short], Integer)?,
        AAStore => {
            pop_reference(stack)?;
            pop_expecting(stack, Integer)?;
            pop_array(stack, |elem| matches!(elem, FieldType::Ref(_)))?;
        }

        Pop => {
            pop_slots(stack, 1)?;
        }
        Pop2 => {
            pop_slots(stack, 2)?;
        }
        Dup => {
            let value = pop_slots(stack, 1)?;
            stack.extend(value.iter().cloned());
            stack.extend(value);
        }
        DupX1 => {
            let value = pop_slots(stack, 1)?;
            let under = pop_slots(stack, 1)?;
            stack.extend(value.iter().cloned());
            stack.extend(under);
            stack.extend(value);
        }
        DupX2 => {
            let value = pop_slots(stack, 1)?;
            let under = pop_slots(stack, 2)?;
            stack.extend(value.iter().cloned());
            stack.extend(under);
            stack.extend(value);
        }
        Dup2 => {
            let value = pop_slots(stack, 2)?;
            stack.extend(value.iter().cloned());
            stack.extend(value);
        }
        Dup2X1 => {
            let value = pop_slots(stack, 2)?;
            let under = pop_slots(stack, 1)?;
            stack.extend(value.iter().cloned());
            stack.extend(under);
            stack.extend(value);
        }
        Dup2X2 => {
            let value = pop_slots(stack, 2)?;
            let under = pop_slots(stack, 2)?;
            stack.extend(value.iter().cloned());
            stack.extend(under);
            stack.extend(value);
        }
        Swap => {
            let top = pop_slots(stack, 1)?;
            let under = pop_slots(stack, 1)?;
            stack.extend(top);
            stack.extend(under);
        }

        IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => {
            binary(stack, Integer, Integer)?
        }
        LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => binary(stack, Long, Long)?,
        FAdd | FSub | FMul | FDiv | FRem => binary(stack, Float, Float)?,
        DAdd | DSub | DMul | DDiv | DRem => binary(stack, Double, Double)?,
        LSh(_) => binary(stack, Long, Integer)?,
        INeg => convert(stack, Integer, Integer)?,
        LNeg => convert(stack, Long, Long)?,
        FNeg => convert(stack, Float, Float)?,
        DNeg => convert(stack, Double, Double)?,

        IInc(idx, _) => {
            load_local(locals, *idx, Integer)?;
        }

        I2L => convert(stack, Integer, Long)?,
        I2F => convert(stack, Integer, Float)?,
        I2D => convert(stack, Integer, Double)?,
        L2I => convert(stack, Long, Integer)?,
        L2F => convert(stack, Long, Float)?,
        L2D => convert(stack, Long, Double)?,
        F2I => convert(stack, Float, Integer)?,
        F2L => convert(stack, Float, Long)?,
        F2D => convert(stack, Float, Double)?,
        D2I => convert(stack, Double, Integer)?,
        D2L => convert(stack, Double, Long)?,
        D2F => convert(stack, Double, Float)?,
        I2B | I2C | I2S => convert(stack, Integer, Integer)?,

        LCmp => compare(stack, Long)?,
        FCmp(_) => compare(stack, Float)?,
        DCmp(_) => compare(stack, Double)?,

        GetStatic(field) => {
            let typ = field_type(constants, *field)?;
            stack.push(InferredType::from(&typ));
        }
        PutStatic(field) => {
            let typ = field_type(constants, *field)?;
            pop_expecting(stack, InferredType::from(&typ))?;
        }
        GetField(field) => {
            let typ = field_type(constants, *field)?;
            pop_reference(stack)?;
            stack.push(InferredType::from(&typ));
        }
        PutField(field) => {
            let typ = field_type(constants, *field)?;
            pop_expecting(stack, InferredType::from(&typ))?;
            pop_reference(stack)?;
        }

        Invoke(invoke_type, ResolvedMethod { index, .. }) => {
            let index = ConstantIndex::from(*index);
            let method = constants
                .member_ref(index)
                .ok_or(FrameConflictKind::BadConstant(index.0))?;
            let descriptor = MethodDescriptor::parse(method.descriptor)
                .map_err(|_| FrameConflictKind::BadDescriptor(method.descriptor.to_owned()))?;

            for parameter in descriptor.parameters.iter().rev() {
                pop_expecting(stack, InferredType::from(parameter))?;
            }
            if *invoke_type != InvokeType::Static {
                let receiver = pop_reference(stack)?;
                if method.name == "<init>" {
                    let initialized = match &receiver {
                        UninitializedThis => InferredType::object(context.class),
                        Uninitialized(uninitialized) => Object(uninitialized.class.clone()),
                        _ => {
                            return Err(FrameConflictKind::StackType {
                                expected: String::from("uninitialized object"),
                                found: receiver.to_string(),
                            })
                        }
                    };
                    replace_all(stack, locals, &receiver, &initialized);
                }
            }
            if let Some(return_type) = &descriptor.return_type {
                stack.push(InferredType::from(return_type));
            }
        }

        New(class) => {
            let class = class_type(constants, *class)?;
            stack.push(Uninitialized(UninitializedRef { offset, class }));
        }
        NewArray(base_type) => {
            pop_expecting(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Base(*base_type))));
        }
        ANewArray(class) => {
            let class = class_type(constants, *class)?;
            pop_expecting(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Ref(class))));
        }
        ArrayLength => {
            pop_array(stack, |_| true)?;
            stack.push(Integer);
        }
        CheckCast(class) => {
            let class = class_type(constants, *class)?;
            pop_reference(stack)?;
            stack.push(Object(class));
        }
        InstanceOf(_) => {
            pop_reference(stack)?;
            stack.push(Integer);
        }
    }

    Ok(())
}

/// Update a frame to reflect the effect of a branch instruction (before jumping)
pub fn transfer_branch<Lbl>(
    frame: &mut InferredFrame,
    branch: &BranchInstruction<Lbl>,
    context: &MethodContext,
) -> Result<(), FrameConflictKind> {
    use VerificationType::*;

    match branch {
        BranchInstruction::If(_, _) => pop_expecting(&mut frame.stack, Integer)?,
        BranchInstruction::IfICmp(_, _) => {
            pop_expecting(&mut frame.stack, Integer)?;
            pop_expecting(&mut frame.stack, Integer)?;
        }
        BranchInstruction::IfACmp(_, _) => {
            pop_reference(&mut frame.stack)?;
            pop_reference(&mut frame.stack)?;
        }
        BranchInstruction::IfNull(_, _) => {
            pop_reference(&mut frame.stack)?;
        }
        BranchInstruction::Goto(_) | BranchInstruction::GotoW(_) => (),
        BranchInstruction::TableSwitch { .. } | BranchInstruction::LookupSwitch { .. } => {
            pop_expecting(&mut frame.stack, Integer)?
        }
        BranchInstruction::IReturn => transfer_return(frame, context, Some(Integer))?,
        BranchInstruction::LReturn => transfer_return(frame, context, Some(Long))?,
        BranchInstruction::FReturn => transfer_return(frame, context, Some(Float))?,
        BranchInstruction::DReturn => transfer_return(frame, context, Some(Double))?,
        BranchInstruction::AReturn => {
            transfer_return(frame, context, Some(InferredType::object(JAVA_LANG_OBJECT)))?
        }
        BranchInstruction::Return => transfer_return(frame, context, None)?,
        BranchInstruction::AThrow => {
            pop_reference(&mut frame.stack)?;
        }
    }
    Ok(())
}

fn transfer_return(
    frame: &mut InferredFrame,
    context: &MethodContext,
    returned: Option<InferredType>,
) -> Result<(), FrameConflictKind> {
    if context.is_constructor() && frame.locals.contains(&VerificationType::UninitializedThis) {
        return Err(FrameConflictKind::UninitializedThis);
    }

    let expected: Option<InferredType> = context
        .descriptor
        .return_type
        .as_ref()
        .map(InferredType::from);
    let compatible = match (&expected, &returned) {
        (None, None) => true,
        (Some(expected), Some(returned)) if expected.is_reference() => returned.is_reference(),
        (Some(expected), Some(returned)) => expected == returned,
        _ => false,
    };
    if !compatible {
        let describe = |typ: &Option<InferredType>| match typ {
            None => String::from("void"),
            Some(typ) => typ.to_string(),
        };
        return Err(FrameConflictKind::ReturnType {
            expected: describe(&expected),
            found: describe(&returned),
        });
    }

    match expected {
        Some(expected) => pop_expecting(&mut frame.stack, expected),
        None => Ok(()),
    }
}

/// Swap every occurrence of an uninitialized type once its constructor has run
fn replace_all(
    stack: &mut OffsetVec<InferredType>,
    locals: &mut [InferredType],
    original: &InferredType,
    updated: &InferredType,
) {
    let replaced: OffsetVec<InferredType> = std::mem::take(stack)
        .into_iter()
        .map(|(_, _, typ)| if typ == *original { updated.clone() } else { typ })
        .collect();
    *stack = replaced;

    for local in locals.iter_mut() {
        if local == original {
            *local = updated.clone();
        }
    }
}

fn load_local(
    locals: &[InferredType],
    index: u16,
    expected: InferredType,
) -> Result<InferredType, FrameConflictKind> {
    let found = locals.get(index as usize).unwrap_or(&VerificationType::Top);
    if *found == expected {
        Ok(expected)
    } else {
        Err(FrameConflictKind::LocalType {
            index: index as usize,
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

fn store_local(locals: &mut Vec<InferredType>, index: u16, typ: InferredType) {
    let index = index as usize;
    let width = typ.width();
    if locals.len() < index + width {
        locals.resize(index + width, VerificationType::Top);
    }

    // Overwriting the upper half of a `long` or `double` invalidates it
    if index > 0 && locals[index - 1].is_wide() {
        locals[index - 1] = VerificationType::Top;
    }
    locals[index] = typ;
    if width == 2 {
        locals[index + 1] = VerificationType::Top;
    }
}

fn pop(stack: &mut OffsetVec<InferredType>) -> Result<InferredType, FrameConflictKind> {
    stack
        .pop()
        .map(|(_, _, typ)| typ)
        .ok_or(FrameConflictKind::StackUnderflow)
}

/// Pop a value of the expected type (any initialized reference will do for a reference type)
fn pop_expecting(
    stack: &mut OffsetVec<InferredType>,
    expected: InferredType,
) -> Result<(), FrameConflictKind> {
    let found = pop(stack)?;
    let compatible = if expected.is_reference() {
        matches!(found, VerificationType::Null | VerificationType::Object(_))
    } else {
        found == expected
    };
    if compatible {
        Ok(())
    } else {
        Err(FrameConflictKind::StackType {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

fn pop_reference(stack: &mut OffsetVec<InferredType>) -> Result<InferredType, FrameConflictKind> {
    let found = pop(stack)?;
    if found.is_reference() {
        Ok(found)
    } else {
        Err(FrameConflictKind::StackType {
            expected: String::from("reference"),
            found: found.to_string(),
        })
    }
}

/// Pop an array reference, returning its element type (`None` if the array is `null`)
fn pop_array(
    stack: &mut OffsetVec<InferredType>,
    accepts: impl Fn(&FieldType) -> bool,
) -> Result<Option<FieldType>, FrameConflictKind> {
    match pop(stack)? {
        VerificationType::Null => Ok(None),
        VerificationType::Object(RefType::Array(elem)) if accepts(&elem) => Ok(Some(*elem)),
        found => Err(FrameConflictKind::StackType {
            expected: String::from("array"),
            found: found.to_string(),
        }),
    }
}

/// Pop values totalling exactly `slots` slots, returned bottom first
fn pop_slots(
    stack: &mut OffsetVec<InferredType>,
    slots: usize,
) -> Result<Vec<InferredType>, FrameConflictKind> {
    let mut popped = vec![];
    let mut popped_slots = 0;
    while popped_slots < slots {
        let typ = pop(stack)?;
        popped_slots += typ.width();
        popped.push(typ);
    }
    if popped_slots != slots {
        let found = popped.last().map(ToString::to_string).unwrap_or_default();
        return Err(FrameConflictKind::StackType {
            expected: String::from("category 1 value"),
            found,
        });
    }
    popped.reverse();
    Ok(popped)
}

fn array_load(
    stack: &mut OffsetVec<InferredType>,
    elements: &[BaseType],
    loaded: InferredType,
) -> Result<(), FrameConflictKind> {
    pop_expecting(stack, VerificationType::Integer)?;
    pop_array(stack, |elem| matches!(elem, FieldType::Base(b) if elements.contains(b)))?;
    stack.push(loaded);
    Ok(())
}

fn array_store(
    stack: &mut OffsetVec<InferredType>,
    elements: &[BaseType],
    stored: InferredType,
) -> Result<(), FrameConflictKind> {
    pop_expecting(stack, stored)?;
    pop_expecting(stack, VerificationType::Integer)?;
    pop_array(stack, |elem| matches!(elem, FieldType::Base(b) if elements.contains(b)))?;
    Ok(())
}

/// Pop the right operand then the left one, pushing a result of the left operand's type
fn binary(
    stack: &mut OffsetVec<InferredType>,
    operand: InferredType,
    right: InferredType,
) -> Result<(), FrameConflictKind> {
    pop_expecting(stack, right)?;
    pop_expecting(stack, operand.clone())?;
    stack.push(operand);
    Ok(())
}

fn convert(
    stack: &mut OffsetVec<InferredType>,
    from: InferredType,
    to: InferredType,
) -> Result<(), FrameConflictKind> {
    pop_expecting(stack, from)?;
    stack.push(to);
    Ok(())
}

fn compare(
    stack: &mut OffsetVec<InferredType>,
    operand: InferredType,
) -> Result<(), FrameConflictKind> {
    pop_expecting(stack, operand.clone())?;
    pop_expecting(stack, operand)?;
    stack.push(VerificationType::Integer);
    Ok(())
}

fn class_type(
    constants: &ConstantsPool,
    index: ClassConstantIndex,
) -> Result<RefType, FrameConflictKind> {
    let name = constants
        .class_name(index)
        .ok_or(FrameConflictKind::BadConstant(ConstantIndex::from(index).0))?;
    RefType::from_internal_name(name).map_err(|_| FrameConflictKind::BadDescriptor(name.to_owned()))
}

fn field_type(
    constants: &ConstantsPool,
    index: FieldRefConstantIndex,
) -> Result<FieldType, FrameConflictKind> {
    let index = ConstantIndex::from(index);
    let field = constants
        .member_ref(index)
        .ok_or(FrameConflictKind::BadConstant(index.0))?;
    FieldType::parse(field.descriptor)
        .map_err(|_| FrameConflictKind::BadDescriptor(field.descriptor.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::model::{FieldRef, MethodRef};
    use VerificationType::*;

    fn new_frame(locals: Vec<InferredType>, stack: Vec<InferredType>) -> InferredFrame {
        Frame {
            locals,
            stack: stack.into_iter().collect(),
        }
    }

    fn stack_of(frame: &InferredFrame) -> Vec<InferredType> {
        frame.stack.iter().map(|(_, _, t)| t.clone()).collect()
    }

    fn void() -> MethodDescriptor {
        MethodDescriptor::new(vec![], None)
    }

    #[test]
    fn arithmetic() {
        let constants = ConstantsPool::new();
        let descriptor = void();
        let context = MethodContext {
            class: "Foo",
            name: "run",
            descriptor: &descriptor,
            is_static: true,
        };

        let binops: [(InferredType, Vec<ResolvedInstruction>); 4] = [
            (Integer, vec![Instruction::IAdd, Instruction::ISub, Instruction::IXor]),
            (Long, vec![Instruction::LAdd, Instruction::LMul, Instruction::LOr]),
            (Float, vec![Instruction::FAdd, Instruction::FRem]),
            (Double, vec![Instruction::DAdd, Instruction::DDiv]),
        ];

        for (good_typ, instructions) in binops {
            for instruction in instructions {
                for typ in [Integer, Long, Float, Double, Null] {
                    let mut frame = new_frame(vec![], vec![typ.clone(), typ.clone()]);
                    let result = transfer_instruction(&mut frame, &instruction, 0, &constants, &context);
                    if typ == good_typ {
                        assert!(result.is_ok(), "{:?} on {}", instruction, typ);
                        assert_eq!(stack_of(&frame), vec![typ]);
                    } else {
                        assert!(
                            matches!(result, Err(FrameConflictKind::StackType { .. })),
                            "{:?} on {}",
                            instruction,
                            typ
                        );
                    }
                }

                let mut frame = new_frame(vec![], vec![good_typ.clone()]);
                assert_eq!(
                    transfer_instruction(&mut frame, &instruction, 0, &constants, &context),
                    Err(FrameConflictKind::StackUnderflow)
                );
            }
        }
    }

    #[test]
    fn dup_respects_categories() {
        let constants = ConstantsPool::new();
        let descriptor = void();
        let context = MethodContext {
            class: "Foo",
            name: "run",
            descriptor: &descriptor,
            is_static: true,
        };

        let mut frame = new_frame(vec![], vec![Integer, Long]);
        transfer_instruction(&mut frame, &Instruction::Dup2X1, 0, &constants, &context).unwrap();
        assert_eq!(stack_of(&frame), vec![Long, Integer, Long]);

        let mut frame = new_frame(vec![], vec![Float, Integer]);
        transfer_instruction(&mut frame, &Instruction::Dup2, 0, &constants, &context).unwrap();
        assert_eq!(stack_of(&frame), vec![Float, Integer, Float, Integer]);

        let mut frame = new_frame(vec![], vec![Long]);
        assert!(transfer_instruction(&mut frame, &Instruction::Dup, 0, &constants, &context).is_err());

        let mut frame = new_frame(vec![], vec![Integer, Float]);
        transfer_instruction(&mut frame, &Instruction::Swap, 0, &constants, &context).unwrap();
        assert_eq!(stack_of(&frame), vec![Float, Integer]);
    }

    #[test]
    fn locals_track_two_slot_values() {
        let constants = ConstantsPool::new();
        let descriptor = void();
        let context = MethodContext {
            class: "Foo",
            name: "run",
            descriptor: &descriptor,
            is_static: true,
        };

        let mut frame = new_frame(vec![], vec![Long]);
        transfer_instruction(&mut frame, &Instruction::LStore(1), 0, &constants, &context)
            .unwrap();
        assert_eq!(frame.locals, vec![Top, Long, Top]);

        let mut clobber = frame.clone();
        clobber.stack.push(Integer);
        transfer_instruction(&mut clobber, &Instruction::IStore(2), 0, &constants, &context)
            .unwrap();
        assert_eq!(clobber.locals, vec![Top, Top, Integer]);

        assert_eq!(
            transfer_instruction(&mut frame, &Instruction::ILoad(1), 0, &constants, &context),
            Err(FrameConflictKind::LocalType {
                index: 1,
                expected: String::from("int"),
                found: String::from("long"),
            })
        );
    }

    #[test]
    fn constructors_initialize_objects() {
        let mut constants = ConstantsPool::new();
        let class = constants.get_class("java/lang/StringBuilder").unwrap();
        let init = MethodRef::new(
            "java/lang/StringBuilder",
            "<init>",
            MethodDescriptor::new(vec![], None),
        );
        let init = ResolvedMethod {
            index: constants.get_method_ref(&init).unwrap(),
            argument_slots: 1,
        };

        let descriptor = void();
        let context = MethodContext {
            class: "Foo",
            name: "run",
            descriptor: &descriptor,
            is_static: true,
        };

        let mut frame = new_frame(vec![], vec![]);
        for insn in [
            Instruction::New(class),
            Instruction::Dup,
            Instruction::Invoke(InvokeType::Special, init),
        ] {
            transfer_instruction(&mut frame, &insn, 4, &constants, &context).unwrap();
        }
        assert_eq!(
            stack_of(&frame),
            vec![InferredType::object("java/lang/StringBuilder")]
        );
    }

    #[test]
    fn constructor_must_call_super() {
        let mut constants = ConstantsPool::new();
        let super_init = MethodRef::new("java/lang/Object", "<init>", void());
        let super_init = ResolvedMethod {
            index: constants.get_method_ref(&super_init).unwrap(),
            argument_slots: 1,
        };
        let descriptor = void();
        let context = MethodContext {
            class: "Foo",
            name: "<init>",
            descriptor: &descriptor,
            is_static: false,
        };

        let mut frame = InferredFrame::entry(&context);
        assert_eq!(
            transfer_branch(&mut frame.clone(), &BranchInstruction::<usize>::Return, &context),
            Err(FrameConflictKind::UninitializedThis)
        );

        transfer_instruction(&mut frame, &Instruction::ALoad(0), 0, &constants, &context).unwrap();
        let call = Instruction::Invoke(InvokeType::Special, super_init);
        transfer_instruction(&mut frame, &call, 1, &constants, &context).unwrap();
        assert_eq!(frame.locals, vec![InferredType::object("Foo")]);
        transfer_branch(&mut frame, &BranchInstruction::<usize>::Return, &context).unwrap();
    }

    #[test]
    fn fields_and_return_types() {
        let mut constants = ConstantsPool::new();
        let out = FieldRef::new(
            "java/lang/System",
            "out",
            FieldType::object("java/io/PrintStream"),
        );
        let out = constants.get_field_ref(&out).unwrap();
        let descriptor = MethodDescriptor::new(vec![], Some(FieldType::int()));
        let context = MethodContext {
            class: "Foo",
            name: "get",
            descriptor: &descriptor,
            is_static: true,
        };

        let mut frame = new_frame(vec![], vec![]);
        transfer_instruction(&mut frame, &Instruction::GetStatic(out), 0, &constants, &context)
            .unwrap();
        assert_eq!(
            stack_of(&frame),
            vec![InferredType::object("java/io/PrintStream")]
        );
        assert!(matches!(
            transfer_branch(&mut frame, &BranchInstruction::<usize>::AReturn, &context),
            Err(FrameConflictKind::ReturnType { .. })
        ));

        let mut frame = new_frame(vec![], vec![Integer]);
        transfer_branch(&mut frame, &BranchInstruction::<usize>::IReturn, &context).unwrap();
        assert!(frame.stack.len() == 0);
    }
}
