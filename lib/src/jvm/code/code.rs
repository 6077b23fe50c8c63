use crate::jvm::class_file;
use crate::jvm::class_file::{BytecodeIndex, ConstantsPool};
use crate::jvm::code::{encode, ControlFlowGraph, EncodedCode, EncodedHandler};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::model::MethodBody;
use crate::jvm::verifier::{infer_frames, ClassHierarchy, InferredFrame, MethodContext};
use crate::jvm::{CodeError, TooLarge};

const NOP: u8 = 0x00;
const ATHROW: u8 = 0xbf;

/// Compile a method body into a `Code` attribute
///
/// This runs the whole backend pipeline for one method: [`encode`] the body, partition it into
/// blocks, infer a frame for each block, then assemble the code array, exception table and
/// `StackMapTable`. Constants used by the body are interned into `constants`.
///
/// Blocks that cannot be reached get no inferred frame. Since the JVM still type-checks them,
/// their bytes are replaced with `nop ... nop athrow` and they get a frame of their own with
/// nothing but a `Throwable` on the stack.
pub fn serialize_code(
    body: &MethodBody,
    context: &MethodContext,
    constants: &mut ConstantsPool,
    hierarchy: &dyn ClassHierarchy,
) -> Result<class_file::Code, CodeError> {
    let mut code = encode(body, constants)?;
    let cfg = ControlFlowGraph::analyze(&code)?;
    let reachable = cfg.reachable_blocks();

    let falls_off_end = cfg
        .blocks
        .iter()
        .zip(&reachable)
        .find(|(block, reachable)| **reachable && block.falls_off_end);
    if let Some((block, _)) = falls_off_end {
        return Err(CodeError::malformed_at(
            block.end,
            "control flow falls off the end of the code",
        ));
    }

    let inferred = infer_frames(&cfg, &code, context, constants, hierarchy)?;
    let mut max_stack = inferred.max_stack;
    let max_locals = inferred.max_locals;

    // Neutralize dead code
    let mut dead_blocks = 0;
    for (block, _) in cfg.blocks.iter().zip(&reachable).filter(|(_, r)| !**r) {
        code.bytes[block.start..block.end].fill(NOP);
        code.bytes[block.end - 1] = ATHROW;
        dead_blocks += 1;
    }
    if dead_blocks > 0 {
        max_stack = max_stack.max(1);
        log::trace!("replaced {} unreachable blocks", dead_blocks);
    }

    // Exception table, without the dead parts of protected ranges
    let mut exception_table = vec![];
    for handler in &code.exception_table {
        for (start, end) in live_ranges(handler, &cfg, &reachable) {
            exception_table.push(class_file::ExceptionHandler {
                start_pc: bytecode_index(start),
                end_pc: bytecode_index(end),
                handler_pc: bytecode_index(handler.handler),
                catch_type: handler.catch_type.as_ref().map(|catch| catch.index),
            });
        }
    }

    // Stack map frames
    let mut previous_frame = InferredFrame::entry(context).to_serializable(constants)?;
    let mut previous_offset: Option<usize> = None;
    let mut stack_map_frames = vec![];
    for (block_idx, block) in cfg.blocks.iter().enumerate() {
        let frame = if !reachable[block_idx] {
            InferredFrame::unreachable()
        } else if block.needs_frame {
            match &inferred.frames[block_idx] {
                Some(frame) => frame.clone(),
                None => {
                    return Err(CodeError::malformed_at(
                        block.start,
                        "reachable block has no inferred frame",
                    ))
                }
            }
        } else {
            continue;
        };
        let frame = frame.to_serializable(constants)?;

        let offset_delta = match previous_offset {
            None => block.start,
            Some(previous) => block.start - previous - 1,
        };
        stack_map_frames.push(frame.stack_map_frame(offset_delta as u16, &previous_frame));
        previous_frame = frame;
        previous_offset = Some(block.start);
    }

    let max_stack =
        u16::try_from(max_stack).map_err(|_| CodeError::TooLarge(TooLarge::MaxStack(max_stack)))?;
    let max_locals = u16::try_from(max_locals)
        .map_err(|_| CodeError::TooLarge(TooLarge::MaxLocals(max_locals)))?;

    log::debug!(
        "encoded {}.{}{}: {} bytes, {} widened branches, {} frames",
        context.class,
        context.name,
        context.descriptor.render(),
        code.bytes.len(),
        code.widened,
        stack_map_frames.len()
    );

    let mut attributes = vec![];

    // Add `StackMapTable` attribute only if there are frames
    if !stack_map_frames.is_empty() {
        let stack_map_table = class_file::StackMapTable(stack_map_frames);
        attributes.push(constants.get_attribute(stack_map_table)?);
    }

    let EncodedCode { bytes, .. } = code;
    Ok(class_file::Code {
        max_stack,
        max_locals,
        code_array: class_file::BytecodeArray(bytes),
        exception_table,
        attributes,
    })
}

/// Split a protected range into the maximal sub-ranges covering only reachable blocks
fn live_ranges(
    handler: &EncodedHandler,
    cfg: &ControlFlowGraph,
    reachable: &[bool],
) -> Vec<(usize, usize)> {
    let mut ranges = vec![];
    let mut current: Option<(usize, usize)> = None;
    for (block, reachable) in cfg.blocks.iter().zip(reachable) {
        if block.start < handler.start || block.start >= handler.end {
            continue;
        }
        if !*reachable {
            ranges.extend(current.take());
            continue;
        }
        match current {
            Some((start, end)) if end == block.start => current = Some((start, block.end)),
            _ => {
                ranges.extend(current.take());
                current = Some((block.start, block.end));
            }
        }
    }
    ranges.extend(current);
    ranges
}

/// Code offsets have already been checked against the maximum code length
fn bytecode_index(offset: usize) -> BytecodeIndex {
    BytecodeIndex(offset as u16)
}
