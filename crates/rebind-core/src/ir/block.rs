use super::{BlockId, InstrId, ValueId};
use crate::hierarchy::TypeName;

/// Merge of values flowing in from the predecessors. `operands[i]` is the
/// value arriving along the edge from `predecessors[i]` of the owning block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    pub out: ValueId,
    pub operands: Vec<ValueId>,
}

/// Exceptional edge: throwing instructions in the block transfer control to
/// `target` when the exception matches `guard` (`None` catches everything)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchHandler {
    pub guard: Option<TypeName>,
    pub target: BlockId,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub phis: Vec<Phi>,
    pub instructions: Vec<InstrId>,
    /// Both normal and exceptional predecessors
    pub predecessors: Vec<BlockId>,
    pub catch_handlers: Vec<CatchHandler>,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            phis: Vec::new(),
            instructions: Vec::new(),
            predecessors: Vec::new(),
            catch_handlers: Vec::new(),
        }
    }

    pub fn has_catch_handlers(&self) -> bool {
        !self.catch_handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn phi(&self, out: ValueId) -> Option<&Phi> {
        self.phis.iter().find(|phi| phi.out == out)
    }
}
