use super::*;
use crate::jvm::class_file::{BytecodeIndex, ConstantPoolOverflow, ConstantsPool, StackMapFrame};
use crate::jvm::descriptors::{FieldType, RefType};
use crate::jvm::{ClassConstantIndex, FrameConflictKind};
use crate::util::{OffsetVec, Width};

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// While inferring, `locals` has one entry per slot (a `long` or `double` is followed by a `Top`
/// for its upper half). Serializable frames use the stack map layout instead, where those values
/// take a single entry.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame<Cls, U> {
    /// Local variables in scope
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

/// Frame tracked during inference
pub type InferredFrame = Frame<RefType, UninitializedRef>;

/// Frame ready to be encoded in a `StackMapTable`
pub type SerializableFrame = Frame<ClassConstantIndex, BytecodeIndex>;

impl InferredFrame {
    /// Frame on entry to a method: the receiver followed by the parameters
    pub fn entry(context: &MethodContext) -> InferredFrame {
        let mut locals = vec![];
        if !context.is_static {
            if context.is_constructor() && context.class != JAVA_LANG_OBJECT {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(InferredType::object(context.class));
            }
        }
        for parameter in &context.descriptor.parameters {
            let typ = InferredType::from(parameter);
            let wide = typ.is_wide();
            locals.push(typ);
            if wide {
                locals.push(VerificationType::Top);
            }
        }
        Frame {
            locals,
            stack: OffsetVec::new(),
        }
    }

    /// Frame at the start of a handler, for an exception thrown from a point with these locals
    pub fn handler(locals: &[InferredType], catch_type: Option<&str>) -> InferredFrame {
        let mut stack = OffsetVec::new();
        stack.push(InferredType::object(catch_type.unwrap_or(JAVA_LANG_THROWABLE)));
        Frame {
            locals: locals.to_vec(),
            stack,
        }
    }

    /// Frame of code that cannot be reached: it is replaced by `athrow` and only needs to hold
    /// something throwable
    pub fn unreachable() -> InferredFrame {
        InferredFrame::handler(&[], None)
    }

    /// Stack depth in slots
    pub fn stack_slots(&self) -> usize {
        self.stack.offset_len().0
    }

    /// Widen this frame so that it also accounts for `other`
    ///
    /// Returns whether anything changed. Locals that disagree become `Top`, while the stack must
    /// line up entry by entry.
    pub fn merge(
        &mut self,
        other: &InferredFrame,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<bool, FrameConflictKind> {
        if self.stack.len() != other.stack.len() {
            return Err(FrameConflictKind::StackDepth {
                expected: self.stack.len(),
                found: other.stack.len(),
            });
        }

        let mut changed = false;
        let mut stack = OffsetVec::new();
        for ((_, _, ours), (_, _, theirs)) in self.stack.iter().zip(other.stack.iter()) {
            let merged = merge_types(ours, theirs, hierarchy).ok_or_else(|| {
                FrameConflictKind::StackType {
                    expected: ours.to_string(),
                    found: theirs.to_string(),
                }
            })?;
            changed |= merged != *ours;
            stack.push(merged);
        }

        let len = self.locals.len().max(other.locals.len());
        let mut locals = Vec::with_capacity(len);
        for i in 0..len {
            let ours = self.locals.get(i).unwrap_or(&VerificationType::Top);
            let theirs = other.locals.get(i).unwrap_or(&VerificationType::Top);
            let merged = merge_types(ours, theirs, hierarchy).unwrap_or(VerificationType::Top);
            changed |= Some(&merged) != self.locals.get(i);
            locals.push(merged);
        }

        // A `long` or `double` whose upper half got clobbered is unusable
        for i in 0..locals.len() {
            if locals[i].is_wide() && locals.get(i + 1) != Some(&VerificationType::Top) {
                locals[i] = VerificationType::Top;
            }
        }

        self.stack = stack;
        self.locals = locals;
        Ok(changed)
    }

    /// Compact the frame into the stack map layout
    pub fn to_serializable(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<SerializableFrame, ConstantPoolOverflow> {
        let mut locals = vec![];
        let mut slots = self.locals.iter();
        while let Some(local) = slots.next() {
            locals.push(local.to_serializable(constants)?);
            if local.is_wide() {
                let _upper_half = slots.next();
            }
        }
        while locals.last() == Some(&VerificationType::Top) {
            locals.pop();
        }

        let stack = self
            .stack
            .iter()
            .map(|(_, _, typ)| typ.to_serializable(constants))
            .collect::<Result<OffsetVec<_>, _>>()?;

        Ok(Frame { locals, stack })
    }
}

/// Least upper bound of two verification types, if there is one
///
/// `null` merges into any reference, two classes merge to their nearest common superclass, and
/// arrays of references merge element-wise. Any other pair of different types has no bound.
pub fn merge_types(
    typ1: &InferredType,
    typ2: &InferredType,
    hierarchy: &dyn ClassHierarchy,
) -> Option<InferredType> {
    use VerificationType::*;

    match (typ1, typ2) {
        _ if typ1 == typ2 => Some(typ1.clone()),
        (Null, Object(_)) => Some(typ2.clone()),
        (Object(_), Null) => Some(typ1.clone()),
        (Object(ref1), Object(ref2)) => Some(Object(merge_ref_types(ref1, ref2, hierarchy))),
        _ => None,
    }
}

fn merge_ref_types(ref1: &RefType, ref2: &RefType, hierarchy: &dyn ClassHierarchy) -> RefType {
    match (ref1, ref2) {
        _ if ref1 == ref2 => ref1.clone(),
        (RefType::Object(class1), RefType::Object(class2)) => {
            RefType::Object(hierarchy.common_superclass(class1, class2))
        }
        (RefType::Array(elem1), RefType::Array(elem2)) => match (elem1.as_ref(), elem2.as_ref()) {
            (FieldType::Ref(elem1), FieldType::Ref(elem2)) => {
                RefType::array(FieldType::Ref(merge_ref_types(elem1, elem2, hierarchy)))
            }
            _ => RefType::object(JAVA_LANG_OBJECT),
        },
        _ => RefType::object(JAVA_LANG_OBJECT),
    }
}

impl SerializableFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none of the
    /// other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        let this_locals_len = self.locals.len();
        let prev_locals_len = previous_frame.locals.len();

        match self.stack.len() {
            0 if this_locals_len <= prev_locals_len => {
                let chopped = prev_locals_len - this_locals_len;
                let is_prefix = previous_frame.locals.starts_with(&self.locals);
                if is_prefix && chopped == 0 {
                    return StackMapFrame::SameLocalsNoStack { offset_delta };
                } else if is_prefix && chopped < 4 {
                    return StackMapFrame::ChopLocalsNoStack {
                        offset_delta,
                        chopped_k: chopped as u8,
                    };
                }
            }
            0 => {
                let appended = this_locals_len - prev_locals_len;
                if appended < 4 && self.locals.starts_with(&previous_frame.locals) {
                    return StackMapFrame::AppendLocalsNoStack {
                        offset_delta,
                        locals: self.locals[prev_locals_len..].to_vec(),
                    };
                }
            }
            1 if self.locals == previous_frame.locals => {
                if let Some((_, typ)) = self.stack.last() {
                    return StackMapFrame::SameLocalsOneStack {
                        offset_delta,
                        stack: *typ,
                    };
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.iter().map(|(_, _, t)| *t).collect(),
            locals: self.locals.clone(),
        }
    }
}
