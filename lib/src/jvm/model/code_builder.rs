use crate::jvm::code::{
    BranchInstruction, InvokeType, Label, LabelGenerator, SymbolicInstruction,
};
use crate::jvm::model::{ExceptionHandler, FieldRef, MethodBody, MethodRef, Op};

/// Accumulates the operations of a method body from top to bottom
///
/// Nothing is checked here: label placement, stack shapes, and jump distances are all handled
/// when the body is compiled.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    labels: LabelGenerator,
    body: MethodBody,
}

impl CodeBuilder {
    pub fn new() -> CodeBuilder {
        CodeBuilder::default()
    }

    /// Generate a label which is distinct from every other label in this body
    pub fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    /// Push a straight-line instruction
    pub fn push_instruction(&mut self, insn: SymbolicInstruction) -> &mut Self {
        self.body.ops.push(Op::Insn(insn));
        self
    }

    /// Push a branch, return, or throw
    pub fn push_branch(&mut self, branch: BranchInstruction<Label>) -> &mut Self {
        self.body.ops.push(Op::Branch(branch));
        self
    }

    /// Place a label in front of the next operation
    pub fn place_label(&mut self, label: Label) -> &mut Self {
        self.body.ops.push(Op::Place(label));
        self
    }

    /// Register an exception handler covering `[start, end)`
    pub fn add_exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.body.exception_handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_owned),
        });
        self
    }

    pub fn invoke(&mut self, typ: InvokeType, method: MethodRef) -> &mut Self {
        self.push_instruction(SymbolicInstruction::Invoke(typ, method))
    }

    pub fn get_static(&mut self, field: FieldRef) -> &mut Self {
        self.push_instruction(SymbolicInstruction::GetStatic(field))
    }

    /// Push an `int` constant using the shortest instruction that fits
    pub fn push_int(&mut self, value: i32) -> &mut Self {
        use crate::jvm::model::LoadableConstant;

        let insn = match value {
            -1 => SymbolicInstruction::IConstM1,
            0 => SymbolicInstruction::IConst0,
            1 => SymbolicInstruction::IConst1,
            2 => SymbolicInstruction::IConst2,
            3 => SymbolicInstruction::IConst3,
            4 => SymbolicInstruction::IConst4,
            5 => SymbolicInstruction::IConst5,
            _ => {
                if let Ok(b) = i8::try_from(value) {
                    SymbolicInstruction::BiPush(b)
                } else if let Ok(s) = i16::try_from(value) {
                    SymbolicInstruction::SiPush(s)
                } else {
                    SymbolicInstruction::Ldc(LoadableConstant::Integer(value))
                }
            }
        };
        self.push_instruction(insn)
    }

    /// Finish building the body
    pub fn finish(self) -> MethodBody {
        self.body
    }
}
