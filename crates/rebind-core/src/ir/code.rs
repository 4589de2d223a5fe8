use super::{
    BasicBlock, BlockId, DominatorTree, InstrId, Instruction, InstructionKind, IrDisplay, LocalInfo,
    Phi, Value, ValueDefinition, ValueId,
};
use crate::hierarchy::{MethodRef, TypeName};
use crate::names::NameTable;
use crate::types::TypeElement;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::trace;

/// Users rewritten by [`IrCode::replace_dominated_uses_except`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacedUses {
    pub instructions: Vec<InstrId>,
    /// Output values of phis that had an operand replaced
    pub phis: Vec<ValueId>,
}

impl ReplacedUses {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty() && self.phis.is_empty()
    }
}

/// The body of one method
#[derive(Debug, Clone)]
pub struct IrCode {
    method: MethodRef,
    blocks: Vec<BasicBlock>,
    block_order: Vec<BlockId>,
    instructions: Vec<Instruction>,
    values: Vec<Value>,
    entry: BlockId,
    /// Bumped on every change to the block structure
    structure_version: u64,
}

impl IrCode {
    pub(crate) fn new(method: MethodRef) -> Self {
        let entry = BlockId(0);
        Self {
            method,
            blocks: vec![BasicBlock::new(entry)],
            block_order: vec![entry],
            instructions: Vec::new(),
            values: Vec::new(),
            entry,
            structure_version: 0,
        }
    }

    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    /// The class whose code this is, used for accessibility checks
    pub fn context(&self) -> TypeName {
        self.method.holder
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn block_order(&self) -> &[BlockId] {
        &self.block_order
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.block_order.iter().map(|&id| self.block(id))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.index()]
    }

    /// Placed instructions in block order
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.blocks()
            .flat_map(|block| block.instructions.iter().map(|&id| self.instruction(id)))
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks().map(BasicBlock::len).sum()
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.index()]
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.values.iter()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        self.block_order.push(id);
        self.structure_version += 1;
        id
    }

    /// Fresh value, undefined until an instruction or phi produces it
    pub fn create_value(&mut self, ty: TypeElement) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value::new(id, ty));
        id
    }

    pub fn set_local_info(&mut self, value: ValueId, name: &str) {
        self.values[value.index()].local_info = Some(LocalInfo { name: name.into() });
    }

    /// Insert a new instruction at `index` in `block`, registering its
    /// definition and uses
    pub fn insert_instruction(&mut self, block: BlockId, index: usize, kind: InstructionKind) -> InstrId {
        let id = InstrId(self.instructions.len() as u32);
        self.instructions.push(Instruction { id, block, kind });
        self.blocks[block.index()].instructions.insert(index, id);
        self.attach(id);
        id
    }

    pub fn append_instruction(&mut self, block: BlockId, kind: InstructionKind) -> InstrId {
        let index = self.blocks[block.index()].len();
        self.insert_instruction(block, index, kind)
    }

    /// Insert immediately before `anchor` in its block
    pub fn insert_before(&mut self, anchor: InstrId, kind: InstructionKind) -> InstrId {
        let block = self.instruction(anchor).block;
        let index = self.index_in_block(anchor).unwrap_or(self.block(block).len());
        self.insert_instruction(block, index, kind)
    }

    /// Swap the instruction's kind in place. The id, block and position are
    /// kept, so anything referring to the instruction stays valid.
    pub fn replace_instruction(&mut self, id: InstrId, kind: InstructionKind) {
        self.detach(id);
        self.instructions[id.index()].kind = kind;
        self.attach(id);
    }

    fn attach(&mut self, id: InstrId) {
        let instruction = &self.instructions[id.index()];
        let out = instruction.out();
        let operands = instruction.operands();
        if let Some(out) = out {
            self.values[out.index()].definition = ValueDefinition::Instruction(id);
        }
        for operand in operands {
            self.values[operand.index()].users.insert(id);
        }
    }

    fn detach(&mut self, id: InstrId) {
        let instruction = &self.instructions[id.index()];
        let out = instruction.out();
        let operands = instruction.operands();
        if let Some(out) = out {
            let value = &mut self.values[out.index()];
            if value.definition == ValueDefinition::Instruction(id) {
                value.definition = ValueDefinition::Undefined;
            }
        }
        for operand in operands {
            self.values[operand.index()].users.shift_remove(&id);
        }
    }

    /// Add a phi to `block`. Operands must line up with the block's
    /// predecessors.
    pub fn add_phi(&mut self, block: BlockId, ty: TypeElement, operands: Vec<ValueId>) -> ValueId {
        let out = self.create_value(ty);
        self.values[out.index()].definition = ValueDefinition::Phi(block);
        for &operand in &operands {
            self.values[operand.index()].phi_users.insert(out);
        }
        self.blocks[block.index()].phis.push(Phi { out, operands });
        out
    }

    pub fn index_in_block(&self, id: InstrId) -> Option<usize> {
        let block = self.instruction(id).block;
        self.block(block).instructions.iter().position(|&i| i == id)
    }

    pub fn terminator(&self, block: BlockId) -> Option<&Instruction> {
        let last = *self.block(block).instructions.last()?;
        let instruction = self.instruction(last);
        instruction.is_terminator().then_some(instruction)
    }

    pub fn normal_successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        self.terminator(block)
            .map(Instruction::targets)
            .unwrap_or_default()
    }

    /// Normal successors followed by catch handler targets
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 4]> {
        let mut successors: SmallVec<[BlockId; 4]> =
            self.normal_successors(block).into_iter().collect();
        for handler in &self.block(block).catch_handlers {
            if !successors.contains(&handler.target) {
                successors.push(handler.target);
            }
        }
        successors
    }

    /// Split `block` before the instruction at `index`.
    ///
    /// The new block receives the tail, the normal successors and a copy of
    /// the catch handlers, and is placed right after `block` in block order.
    /// `block` falls through to it with a `goto`. Any dominator tree built
    /// before the split is stale afterwards.
    pub fn split_block(&mut self, block: BlockId, index: usize) -> BlockId {
        let new_block = BlockId(self.blocks.len() as u32);
        let tail = self.blocks[block.index()].instructions.split_off(index);
        let handlers = self.blocks[block.index()].catch_handlers.clone();
        for &id in &tail {
            self.instructions[id.index()].block = new_block;
        }

        let mut split = BasicBlock::new(new_block);
        split.instructions = tail;
        split.predecessors.push(block);
        split.catch_handlers = handlers.clone();
        self.blocks.push(split);

        let position = self
            .block_order
            .iter()
            .position(|&b| b == block)
            .map_or(self.block_order.len(), |p| p + 1);
        self.block_order.insert(position, new_block);

        for successor in self.normal_successors(new_block) {
            for predecessor in &mut self.blocks[successor.index()].predecessors {
                if *predecessor == block {
                    *predecessor = new_block;
                }
            }
        }

        // The tail keeps the exceptional edges, so handler blocks gain a
        // predecessor carrying the same incoming values
        for handler in &handlers {
            let target = &mut self.blocks[handler.target.index()];
            let Some(edge) = target.predecessors.iter().position(|&p| p == block) else {
                continue;
            };
            target.predecessors.push(new_block);
            for phi in &mut target.phis {
                if let Some(&operand) = phi.operands.get(edge) {
                    phi.operands.push(operand);
                }
            }
        }

        self.append_instruction(block, InstructionKind::Goto { target: new_block });
        self.structure_version += 1;
        trace!("Split {} at {} into {}", block, index, new_block);
        new_block
    }

    /// Does instruction `a` execute before `b` on every path reaching `b`
    pub fn instruction_dominates(&self, dominators: &DominatorTree, a: InstrId, b: InstrId) -> bool {
        let block_a = self.instruction(a).block;
        let block_b = self.instruction(b).block;
        if block_a == block_b {
            return match (self.index_in_block(a), self.index_in_block(b)) {
                (Some(ia), Some(ib)) => ia <= ib,
                _ => false,
            };
        }
        dominators.dominates(block_a, block_b)
    }

    /// The block from which `value` is available to every block it
    /// dominates. A throwing definition under catch handlers only becomes
    /// available past its block's normal successor, because the handlers
    /// are entered before the value is produced. `None` when the value is
    /// not available outside its own block.
    pub fn availability_root(&self, value: ValueId) -> Option<BlockId> {
        match self.value(value).definition {
            ValueDefinition::Undefined => None,
            ValueDefinition::Phi(block) => Some(block),
            ValueDefinition::Instruction(id) => {
                let instruction = self.instruction(id);
                let block = instruction.block;
                if !instruction.can_throw() || !self.block(block).has_catch_handlers() {
                    return Some(block);
                }
                match self.normal_successors(block).as_slice() {
                    [next] if self.block(*next).predecessors.as_slice() == [block] => Some(*next),
                    _ => None,
                }
            }
        }
    }

    /// Is `value` defined on entry to `block`, a block other than the one
    /// defining it
    pub fn available_in(&self, dominators: &DominatorTree, value: ValueId, block: BlockId) -> bool {
        self.availability_root(value)
            .is_some_and(|root| dominators.dominates(root, block))
    }

    /// Is `value` defined when control moves along the edge `from -> to`
    pub fn available_on_edge(&self, dominators: &DominatorTree, value: ValueId, from: BlockId, to: BlockId) -> bool {
        if let ValueDefinition::Instruction(id) = self.value(value).definition {
            let instruction = self.instruction(id);
            if instruction.block == from {
                let exceptional = instruction.can_throw()
                    && !self.normal_successors(from).contains(&to)
                    && self.block(from).catch_handlers.iter().any(|h| h.target == to);
                return !exceptional;
            }
        }
        self.available_in(dominators, value, from)
    }

    /// Replace uses of `value` by `replacement` wherever the use is strictly
    /// dominated by `position`, skipping the consumers in `excluded`.
    /// `replacement` must be the output of `position`.
    ///
    /// Phi operands count as uses on the edge from the corresponding
    /// predecessor. Uses reached through an exceptional edge of
    /// `position`'s block keep the original value.
    pub fn replace_dominated_uses_except(
        &mut self,
        value: ValueId,
        replacement: ValueId,
        position: InstrId,
        excluded: &FxHashSet<InstrId>,
        dominators: &DominatorTree,
    ) -> ReplacedUses {
        let mut replaced = ReplacedUses::default();
        let users: Vec<InstrId> = self.value(value).users.iter().copied().collect();
        for user in users {
            if user == position || excluded.contains(&user) {
                continue;
            }
            if self.strictly_after(dominators, position, replacement, user) && self.rewrite_single_operand(user, value, replacement) {
                replaced.instructions.push(user);
            }
        }

        let phi_users: Vec<ValueId> = self.value(value).phi_users.iter().copied().collect();
        for phi_out in phi_users {
            let ValueDefinition::Phi(phi_block) = self.value(phi_out).definition else {
                continue;
            };
            let predecessors = self.block(phi_block).predecessors.clone();
            let Some(phi_index) = self.block(phi_block).phis.iter().position(|p| p.out == phi_out) else {
                continue;
            };
            let edges: Vec<bool> = predecessors
                .iter()
                .map(|&predecessor| self.available_on_edge(dominators, replacement, predecessor, phi_block))
                .collect();
            let mut changed = false;
            let phi = &mut self.blocks[phi_block.index()].phis[phi_index];
            for (operand, available) in phi.operands.iter_mut().zip(edges) {
                if *operand == value && available {
                    *operand = replacement;
                    changed = true;
                }
            }
            if !changed {
                continue;
            }
            let still_used = phi.operands.contains(&value);
            if !still_used {
                self.values[value.index()].phi_users.shift_remove(&phi_out);
            }
            self.values[replacement.index()].phi_users.insert(phi_out);
            replaced.phis.push(phi_out);
        }

        replaced
    }

    fn strictly_after(&self, dominators: &DominatorTree, position: InstrId, defined: ValueId, user: InstrId) -> bool {
        let position_block = self.instruction(position).block;
        let user_block = self.instruction(user).block;
        if position_block == user_block {
            return match (self.index_in_block(position), self.index_in_block(user)) {
                (Some(p), Some(u)) => p < u,
                _ => false,
            };
        }
        self.available_in(dominators, defined, user_block)
    }

    /// Point one consumer at `new` instead of `old`, leaving every other use
    /// of `old` alone
    pub fn rewrite_single_operand(&mut self, instruction: InstrId, old: ValueId, new: ValueId) -> bool {
        if !self.instructions[instruction.index()].replace_operand(old, new) {
            return false;
        }
        self.values[old.index()].users.shift_remove(&instruction);
        self.values[new.index()].users.insert(instruction);
        true
    }

    pub fn display<'a>(&'a self, names: &'a NameTable) -> IrDisplay<'a> {
        IrDisplay::new(self, names)
    }
}
