use super::{BlockId, CatchHandler, InstrId, InstructionKind, Invoke, IrCode, Phi, ValueDefinition, ValueId};
use crate::hierarchy::{MethodRef, TypeName};
use crate::resolution::DispatchKind;
use crate::types::{ClassType, Nullability, PrimitiveType, TypeElement};

struct PendingPhi {
    block: BlockId,
    out: ValueId,
    incoming: Vec<(BlockId, ValueId)>,
}

/// Constructs an [`IrCode`] body block by block.
///
/// Predecessor lists are derived from terminators and catch handlers when
/// the body is finished, and phi operands are ordered to match them.
pub struct IrBuilder {
    code: IrCode,
    arguments: u32,
    pending_phis: Vec<PendingPhi>,
}

impl IrBuilder {
    pub fn new(method: MethodRef) -> Self {
        Self {
            code: IrCode::new(method),
            arguments: 0,
            pending_phis: Vec::new(),
        }
    }

    pub fn entry(&self) -> BlockId {
        self.code.entry()
    }

    pub fn new_block(&mut self) -> BlockId {
        self.code.create_block()
    }

    /// Next incoming parameter, `this` first for instance methods
    pub fn argument(&mut self, ty: TypeElement) -> ValueId {
        let out = self.code.create_value(ty);
        let index = self.arguments;
        self.arguments += 1;
        let entry = self.code.entry();
        self.code
            .append_instruction(entry, InstructionKind::Argument { out, index });
        out
    }

    pub fn block(&mut self, block: BlockId) -> BlockBuilder<'_> {
        BlockBuilder {
            builder: self,
            block,
        }
    }

    pub fn set_local_info(&mut self, value: ValueId, name: &str) {
        self.code.set_local_info(value, name);
    }

    pub fn set_dynamic_type(&mut self, value: ValueId, dynamic: ClassType) {
        self.code.value_mut(value).dynamic_type = Some(dynamic);
    }

    pub fn finish(mut self) -> IrCode {
        let order: Vec<BlockId> = self.code.block_order().to_vec();
        for &block in &order {
            self.code.block_mut(block).predecessors.clear();
        }
        for &block in &order {
            for successor in self.code.successors(block) {
                self.code.block_mut(successor).predecessors.push(block);
            }
        }

        for pending in std::mem::take(&mut self.pending_phis) {
            let predecessors = self.code.block(pending.block).predecessors.clone();
            let operands: Vec<ValueId> = predecessors
                .iter()
                .filter_map(|predecessor| {
                    pending
                        .incoming
                        .iter()
                        .find(|(block, _)| block == predecessor)
                        .map(|&(_, value)| value)
                })
                .collect();
            for &operand in &operands {
                self.code.value_mut(operand).phi_users.insert(pending.out);
            }
            self.code.value_mut(pending.out).definition = ValueDefinition::Phi(pending.block);
            self.code.block_mut(pending.block).phis.push(Phi {
                out: pending.out,
                operands,
            });
        }

        self.code
    }
}

/// Appends instructions to one block
pub struct BlockBuilder<'a> {
    builder: &'a mut IrBuilder,
    block: BlockId,
}

impl BlockBuilder<'_> {
    fn push(&mut self, kind: InstructionKind) -> InstrId {
        self.builder.code.append_instruction(self.block, kind)
    }

    fn value(&mut self, ty: TypeElement) -> ValueId {
        self.builder.code.create_value(ty)
    }

    pub fn id(&self) -> BlockId {
        self.block
    }

    pub fn new_instance(&mut self, class: TypeName) -> ValueId {
        let out = self.value(TypeElement::exact_class(class, Nullability::DefinitelyNotNull));
        self.push(InstructionKind::NewInstance { out, class });
        out
    }

    pub fn const_null(&mut self) -> ValueId {
        let out = self.value(TypeElement::Null);
        self.push(InstructionKind::ConstNull { out });
        out
    }

    pub fn const_number(&mut self, value: i64) -> ValueId {
        let out = self.value(TypeElement::Primitive(PrimitiveType::Int));
        self.push(InstructionKind::ConstNumber { out, value });
        out
    }

    /// Call without a result
    pub fn invoke(&mut self, kind: DispatchKind, method: MethodRef, arguments: &[ValueId]) -> InstrId {
        self.push(InstructionKind::Invoke(Invoke {
            kind,
            method,
            out: None,
            arguments: arguments.to_vec(),
        }))
    }

    pub fn invoke_with_result(
        &mut self,
        kind: DispatchKind,
        method: MethodRef,
        arguments: &[ValueId],
        ty: TypeElement,
    ) -> ValueId {
        let out = self.value(ty);
        self.push(InstructionKind::Invoke(Invoke {
            kind,
            method,
            out: Some(out),
            arguments: arguments.to_vec(),
        }));
        out
    }

    pub fn check_cast(&mut self, object: ValueId, class: TypeName) -> ValueId {
        let nullability = self.builder.code.value(object).ty.nullability();
        let out = self.value(TypeElement::from_class(class, nullability));
        self.push(InstructionKind::CheckCast { out, object, class });
        out
    }

    pub fn assume_non_null(&mut self, src: ValueId, origin: Option<InstrId>) -> ValueId {
        let ty = self
            .builder
            .code
            .value(src)
            .ty
            .with_nullability(Nullability::DefinitelyNotNull);
        let out = self.value(ty);
        self.push(InstructionKind::AssumeNonNull { out, src, origin });
        out
    }

    /// Phi over `(predecessor, value)` pairs, resolved when the body is
    /// finished
    pub fn phi(&mut self, ty: TypeElement, incoming: &[(BlockId, ValueId)]) -> ValueId {
        let out = self.value(ty);
        self.builder.pending_phis.push(PendingPhi {
            block: self.block,
            out,
            incoming: incoming.to_vec(),
        });
        out
    }

    pub fn catch_all(&mut self, target: BlockId) {
        self.catch(None, target);
    }

    pub fn catch(&mut self, guard: Option<TypeName>, target: BlockId) {
        self.builder
            .code
            .block_mut(self.block)
            .catch_handlers
            .push(CatchHandler { guard, target });
    }

    pub fn goto(&mut self, target: BlockId) -> InstrId {
        self.push(InstructionKind::Goto { target })
    }

    pub fn branch(&mut self, condition: ValueId, then_block: BlockId, else_block: BlockId) -> InstrId {
        self.push(InstructionKind::If {
            condition,
            then_block,
            else_block,
        })
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> InstrId {
        self.push(InstructionKind::Return { value })
    }

    pub fn throw(&mut self, exception: ValueId) -> InstrId {
        self.push(InstructionKind::Throw { exception })
    }
}
