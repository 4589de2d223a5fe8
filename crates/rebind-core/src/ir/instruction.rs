use super::{BlockId, InstrId, ValueId};
use crate::hierarchy::{MethodRef, TypeName};
use crate::resolution::DispatchKind;
use smallvec::SmallVec;

/// A dispatching call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoke {
    pub kind: DispatchKind,
    pub method: MethodRef,
    pub out: Option<ValueId>,
    /// Receiver first, then the declared parameters
    pub arguments: Vec<ValueId>,
}

impl Invoke {
    pub fn receiver(&self) -> Option<ValueId> {
        self.arguments.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// Incoming method parameter, only at the start of the entry block
    Argument { out: ValueId, index: u32 },
    ConstNumber { out: ValueId, value: i64 },
    ConstNull { out: ValueId },
    NewInstance { out: ValueId, class: TypeName },
    Invoke(Invoke),
    /// Throws when `object` is neither null nor an instance of `class`
    CheckCast {
        out: ValueId,
        object: ValueId,
        class: TypeName,
    },
    /// Re-types `src` as non-null after `origin` proved it so
    AssumeNonNull {
        out: ValueId,
        src: ValueId,
        origin: Option<InstrId>,
    },
    Goto { target: BlockId },
    If {
        condition: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return { value: Option<ValueId> },
    Throw { exception: ValueId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub id: InstrId,
    pub block: BlockId,
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn out(&self) -> Option<ValueId> {
        match &self.kind {
            InstructionKind::Argument { out, .. }
            | InstructionKind::ConstNumber { out, .. }
            | InstructionKind::ConstNull { out }
            | InstructionKind::NewInstance { out, .. }
            | InstructionKind::CheckCast { out, .. }
            | InstructionKind::AssumeNonNull { out, .. } => Some(*out),
            InstructionKind::Invoke(invoke) => invoke.out,
            InstructionKind::Goto { .. }
            | InstructionKind::If { .. }
            | InstructionKind::Return { .. }
            | InstructionKind::Throw { .. } => None,
        }
    }

    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        match &self.kind {
            InstructionKind::Argument { .. }
            | InstructionKind::ConstNumber { .. }
            | InstructionKind::ConstNull { .. }
            | InstructionKind::NewInstance { .. }
            | InstructionKind::Goto { .. } => SmallVec::new(),
            InstructionKind::Invoke(invoke) => invoke.arguments.iter().copied().collect(),
            InstructionKind::CheckCast { object, .. } => SmallVec::from_slice(&[*object]),
            InstructionKind::AssumeNonNull { src, .. } => SmallVec::from_slice(&[*src]),
            InstructionKind::If { condition, .. } => SmallVec::from_slice(&[*condition]),
            InstructionKind::Return { value } => value.iter().copied().collect(),
            InstructionKind::Throw { exception } => SmallVec::from_slice(&[*exception]),
        }
    }

    /// Replace every occurrence of `old` among the operands. Returns whether
    /// anything changed.
    pub fn replace_operand(&mut self, old: ValueId, new: ValueId) -> bool {
        let mut changed = false;
        let mut swap = |slot: &mut ValueId| {
            if *slot == old {
                *slot = new;
                changed = true;
            }
        };
        match &mut self.kind {
            InstructionKind::Invoke(invoke) => invoke.arguments.iter_mut().for_each(&mut swap),
            InstructionKind::CheckCast { object, .. } => swap(object),
            InstructionKind::AssumeNonNull { src, .. } => swap(src),
            InstructionKind::If { condition, .. } => swap(condition),
            InstructionKind::Return { value: Some(value) } => swap(value),
            InstructionKind::Throw { exception } => swap(exception),
            InstructionKind::Argument { .. }
            | InstructionKind::ConstNumber { .. }
            | InstructionKind::ConstNull { .. }
            | InstructionKind::NewInstance { .. }
            | InstructionKind::Goto { .. }
            | InstructionKind::Return { value: None } => {}
        }
        changed
    }

    /// Normal (non-exceptional) successor blocks named by a terminator
    pub fn targets(&self) -> SmallVec<[BlockId; 2]> {
        match &self.kind {
            InstructionKind::Goto { target } => SmallVec::from_slice(&[*target]),
            InstructionKind::If {
                then_block,
                else_block,
                ..
            } => SmallVec::from_slice(&[*then_block, *else_block]),
            _ => SmallVec::new(),
        }
    }

    pub fn retarget(&mut self, old: BlockId, new: BlockId) {
        match &mut self.kind {
            InstructionKind::Goto { target } if *target == old => *target = new,
            InstructionKind::If {
                then_block,
                else_block,
                ..
            } => {
                if *then_block == old {
                    *then_block = new;
                }
                if *else_block == old {
                    *else_block = new;
                }
            }
            _ => {}
        }
    }

    /// Can raise an exception, and so must be covered by the enclosing
    /// block's catch handlers
    pub fn can_throw(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Invoke(_)
                | InstructionKind::CheckCast { .. }
                | InstructionKind::NewInstance { .. }
                | InstructionKind::Throw { .. }
        )
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Goto { .. }
                | InstructionKind::If { .. }
                | InstructionKind::Return { .. }
                | InstructionKind::Throw { .. }
        )
    }

    pub fn as_invoke(&self) -> Option<&Invoke> {
        match &self.kind {
            InstructionKind::Invoke(invoke) => Some(invoke),
            _ => None,
        }
    }

    pub fn as_invoke_mut(&mut self) -> Option<&mut Invoke> {
        match &mut self.kind {
            InstructionKind::Invoke(invoke) => Some(invoke),
            _ => None,
        }
    }
}
