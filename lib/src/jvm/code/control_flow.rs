use crate::jvm::code::{BranchInstruction, EncodedCode, ResolvedOp};
use crate::jvm::CodeError;
use std::collections::BTreeSet;
use std::ops::Range;

/// Basic blocks of an encoded method body, in ascending offset order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BasicBlock>,
}

/// Maximal run of instructions with one entry point
///
/// A block is either entirely inside or entirely outside every protected range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Byte offset of the first instruction
    pub start: usize,

    /// Byte offset just past the last instruction
    pub end: usize,

    /// Indices into [`EncodedCode::ops`]
    pub ops: Range<usize>,

    pub successors: Vec<Edge>,

    /// Does the JVM require a stack map frame at the start of this block?
    pub needs_frame: bool,

    /// Does the last instruction fall through past the end of the code?
    pub falls_off_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Index of the successor block
    pub target: usize,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    FallThrough,
    ConditionalBranch,

    /// `goto`, `goto_w`, or one arm of a switch
    UnconditionalBranch,

    /// Entry into a handler, from anywhere in the protected range `[start, end)`
    Exception {
        start: usize,
        end: usize,
        catch_type: Option<String>,
    },
}

impl ControlFlowGraph {
    /// Partition encoded code into basic blocks and connect them
    pub fn analyze(code: &EncodedCode) -> Result<ControlFlowGraph, CodeError> {
        let code_length = code.bytes.len();
        let op_offsets: BTreeSet<usize> = code.ops.iter().map(|op| op.offset).collect();

        // Find every offset where a block starts
        let mut leaders: BTreeSet<usize> = BTreeSet::new();
        leaders.insert(0);
        let mut branch_targets: BTreeSet<usize> = BTreeSet::new();
        for (idx, encoded) in code.ops.iter().enumerate() {
            if let ResolvedOp::Branch(branch) = &encoded.op {
                for target in branch.jump_targets() {
                    leaders.insert(target);
                    branch_targets.insert(target);
                }
                leaders.insert(code.next_offset(idx));
            }
        }
        for handler in &code.exception_table {
            leaders.insert(handler.start);
            leaders.insert(handler.end);
            leaders.insert(handler.handler);
            branch_targets.insert(handler.handler);
        }
        leaders.remove(&code_length);
        if let Some(bad) = leaders.iter().find(|leader| !op_offsets.contains(leader)) {
            return Err(CodeError::malformed_at(
                *bad,
                "block boundary falls inside an instruction",
            ));
        }

        // Partition
        let leaders: Vec<usize> = leaders.into_iter().collect();
        let mut blocks = Vec::with_capacity(leaders.len());
        let mut op_idx = 0;
        for (block_idx, start) in leaders.iter().enumerate() {
            let end = leaders.get(block_idx + 1).copied().unwrap_or(code_length);
            let first_op = op_idx;
            while op_idx < code.ops.len() && code.ops[op_idx].offset < end {
                op_idx += 1;
            }
            blocks.push(BasicBlock {
                start: *start,
                end,
                ops: first_op..op_idx,
                successors: vec![],
                needs_frame: false,
                falls_off_end: false,
            });
        }

        let block_of = |offset: usize| -> Result<usize, CodeError> {
            leaders
                .binary_search(&offset)
                .map_err(|_| CodeError::malformed_at(offset, "no block starts at this offset"))
        };

        // Connect
        let block_count = blocks.len();
        let mut entered_by_fall_through = vec![false; block_count];
        entered_by_fall_through[0] = true;
        for block_idx in 0..block_count {
            let block = &blocks[block_idx];
            let mut successors = vec![];

            let last = block.ops.end.checked_sub(1).map(|idx| &code.ops[idx].op);
            let falls_through = match last {
                Some(ResolvedOp::Branch(branch)) => {
                    let kind = if branch.is_conditional() {
                        EdgeKind::ConditionalBranch
                    } else {
                        EdgeKind::UnconditionalBranch
                    };
                    let mut targets = branch.jump_targets();
                    if matches!(branch, BranchInstruction::LookupSwitch { .. } | BranchInstruction::TableSwitch { .. }) {
                        targets.sort_unstable();
                        targets.dedup();
                    }
                    for target in targets {
                        successors.push(Edge {
                            target: block_of(target)?,
                            kind: kind.clone(),
                        });
                    }
                    branch.can_fall_through()
                }
                Some(ResolvedOp::Insn(_)) | None => true,
            };

            let mut falls_off_end = false;
            if falls_through {
                if block_idx + 1 < block_count {
                    successors.push(Edge {
                        target: block_idx + 1,
                        kind: EdgeKind::FallThrough,
                    });
                    entered_by_fall_through[block_idx + 1] = true;
                } else {
                    falls_off_end = true;
                }
            }

            for handler in &code.exception_table {
                if handler.start <= block.start && block.start < handler.end {
                    successors.push(Edge {
                        target: block_of(handler.handler)?,
                        kind: EdgeKind::Exception {
                            start: handler.start,
                            end: handler.end,
                            catch_type: handler.catch_type.as_ref().map(|c| c.name.clone()),
                        },
                    });
                }
            }

            let block = &mut blocks[block_idx];
            block.successors = successors;
            block.falls_off_end = falls_off_end;
        }

        for (block_idx, block) in blocks.iter_mut().enumerate() {
            block.needs_frame =
                branch_targets.contains(&block.start) || !entered_by_fall_through[block_idx];
        }

        log::trace!(
            "partitioned {} bytes into {} blocks",
            code_length,
            blocks.len()
        );
        Ok(ControlFlowGraph { blocks })
    }

    /// Index of the block starting at exactly this offset
    pub fn block_at(&self, offset: usize) -> Option<usize> {
        self.blocks
            .binary_search_by_key(&offset, |block| block.start)
            .ok()
    }

    /// Which blocks can be reached from the entry (along any kind of edge)
    pub fn reachable_blocks(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.blocks.len()];
        let mut to_visit = vec![];
        if !self.blocks.is_empty() {
            reachable[0] = true;
            to_visit.push(0);
        }
        while let Some(block_idx) = to_visit.pop() {
            for edge in &self.blocks[block_idx].successors {
                if !reachable[edge.target] {
                    reachable[edge.target] = true;
                    to_visit.push(edge.target);
                }
            }
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;
    use crate::jvm::code::{encode, Instruction, OrdComparison};
    use crate::jvm::model::CodeBuilder;

    fn analyze(build: impl FnOnce(&mut CodeBuilder)) -> (EncodedCode, ControlFlowGraph) {
        let mut builder = CodeBuilder::new();
        build(&mut builder);
        let code = encode(&builder.finish(), &mut ConstantsPool::new()).unwrap();
        let cfg = ControlFlowGraph::analyze(&code).unwrap();
        (code, cfg)
    }

    #[test]
    fn straight_line_is_one_block() {
        let (_, cfg) = analyze(|code| {
            code.push_instruction(Instruction::IConst0);
            code.push_instruction(Instruction::Pop);
            code.push_branch(BranchInstruction::Return);
        });
        assert_eq!(cfg.blocks.len(), 1);
        assert_eq!(cfg.blocks[0].ops, 0..3);
        assert!(cfg.blocks[0].successors.is_empty());
        assert!(!cfg.blocks[0].needs_frame);
    }

    #[test]
    fn if_else_diamond() {
        // 0: iload_0  1: ifeq 8  4: iconst_1  5: goto 9  8: iconst_2  9: ireturn
        let (_, cfg) = analyze(|code| {
            let otherwise = code.fresh_label();
            let end = code.fresh_label();
            code.push_instruction(Instruction::ILoad(0));
            code.push_branch(BranchInstruction::If(OrdComparison::EQ, otherwise));
            code.push_instruction(Instruction::IConst1);
            code.push_branch(BranchInstruction::Goto(end));
            code.place_label(otherwise);
            code.push_instruction(Instruction::IConst2);
            code.place_label(end);
            code.push_branch(BranchInstruction::IReturn);
        });

        let starts: Vec<usize> = cfg.blocks.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![0, 4, 8, 9]);
        assert_eq!(
            cfg.blocks[0].successors,
            vec![
                Edge { target: 2, kind: EdgeKind::ConditionalBranch },
                Edge { target: 1, kind: EdgeKind::FallThrough },
            ]
        );
        assert_eq!(
            cfg.blocks[1].successors,
            vec![Edge { target: 3, kind: EdgeKind::UnconditionalBranch }]
        );
        assert_eq!(
            cfg.blocks[2].successors,
            vec![Edge { target: 3, kind: EdgeKind::FallThrough }]
        );
        let needs_frame: Vec<bool> = cfg.blocks.iter().map(|b| b.needs_frame).collect();
        assert_eq!(needs_frame, vec![false, false, true, true]);
        assert_eq!(cfg.block_at(8), Some(2));
        assert_eq!(cfg.block_at(7), None);
    }

    #[test]
    fn exception_edges_and_dead_code() {
        let (_, cfg) = analyze(|code| {
            let start = code.fresh_label();
            let end = code.fresh_label();
            let handler = code.fresh_label();
            code.place_label(start);
            code.push_instruction(Instruction::Nop);
            code.place_label(end);
            code.push_branch(BranchInstruction::Return);
            code.push_instruction(Instruction::Nop); // unreachable
            code.push_branch(BranchInstruction::Return);
            code.place_label(handler);
            code.push_branch(BranchInstruction::AThrow);
            code.add_exception_handler(start, end, handler, None);
        });

        let starts: Vec<usize> = cfg.blocks.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![0, 1, 2, 4]);
        assert!(cfg.blocks[0].successors.contains(&Edge {
            target: 3,
            kind: EdgeKind::Exception {
                start: 0,
                end: 1,
                catch_type: None,
            },
        }));
        assert!(cfg.blocks[2].needs_frame);
        assert!(cfg.blocks[3].needs_frame);
        assert_eq!(cfg.reachable_blocks(), vec![true, true, false, true]);
    }

    #[test]
    fn falling_off_the_end() {
        let (_, cfg) = analyze(|code| {
            code.push_instruction(Instruction::Nop);
        });
        assert!(cfg.blocks[0].falls_off_end);
    }
}
