use super::{BlockId, DominatorTree, InstrId, IrCode, ValueDefinition, ValueId};
use crate::errors::ConsistencyError;
use rustc_hash::{FxHashMap, FxHashSet};

/// Check the single-assignment invariants of a method body.
///
/// Returns every violation found; an empty list means the body is
/// consistent. Dominance is only checked in reachable blocks.
pub fn verify_ssa(code: &IrCode) -> Vec<ConsistencyError> {
    let mut errors = Vec::new();
    let dominators = DominatorTree::new(code);

    // Where each value is defined: (block, index), phis at index None
    let mut definitions: FxHashMap<ValueId, (BlockId, Option<usize>)> = FxHashMap::default();
    let mut placed: FxHashSet<InstrId> = FxHashSet::default();

    for block in code.blocks() {
        for phi in &block.phis {
            if definitions.insert(phi.out, (block.id, None)).is_some() {
                errors.push(ConsistencyError::DuplicateDefinition { value: phi.out });
            }
            if phi.operands.len() != block.predecessors.len() {
                errors.push(ConsistencyError::PhiArity {
                    value: phi.out,
                    block: block.id,
                    operands: phi.operands.len(),
                    predecessors: block.predecessors.len(),
                });
            }
        }
        for (index, &id) in block.instructions.iter().enumerate() {
            placed.insert(id);
            if let Some(out) = code.instruction(id).out() {
                if definitions.insert(out, (block.id, Some(index))).is_some() {
                    errors.push(ConsistencyError::DuplicateDefinition { value: out });
                }
            }
        }
    }

    for block in code.blocks() {
        check_terminator(code, block.id, &mut errors);
        check_edges(code, block.id, &mut errors);

        if block.has_catch_handlers() {
            let count = block
                .instructions
                .iter()
                .filter(|&&id| code.instruction(id).can_throw())
                .count();
            if count > 1 {
                errors.push(ConsistencyError::MultipleThrowingInstructions {
                    block: block.id,
                    count,
                });
            }
        }

        let reachable = dominators.is_reachable(block.id);
        for (index, &id) in block.instructions.iter().enumerate() {
            for operand in code.instruction(id).operands() {
                let Some(&(def_block, def_index)) = definitions.get(&operand) else {
                    errors.push(ConsistencyError::UndefinedOperand {
                        instruction: id,
                        value: operand,
                    });
                    continue;
                };
                if !code.value(operand).users.contains(&id) {
                    errors.push(ConsistencyError::StaleUsers {
                        value: operand,
                        instruction: id,
                    });
                }
                // Values defined by a throwing instruction under catch
                // handlers do not reach the handlers
                let dominated = if def_block == block.id {
                    def_index.map_or(true, |def_index| def_index < index)
                } else {
                    code.available_in(&dominators, operand, block.id)
                };
                if reachable && !dominated {
                    errors.push(ConsistencyError::UseNotDominated {
                        value: operand,
                        block: block.id,
                    });
                }
            }
        }

        for phi in &block.phis {
            for (operand, &predecessor) in phi.operands.iter().zip(&block.predecessors) {
                if !definitions.contains_key(operand) {
                    errors.push(ConsistencyError::UndefinedPhiOperand {
                        phi: phi.out,
                        value: *operand,
                    });
                    continue;
                }
                if dominators.is_reachable(predecessor)
                    && !code.available_on_edge(&dominators, *operand, predecessor, block.id)
                {
                    errors.push(ConsistencyError::UseNotDominated {
                        value: *operand,
                        block: predecessor,
                    });
                }
            }
        }
    }

    // Every recorded user must still read the value
    for value in code.values() {
        for &user in &value.users {
            let reads = placed.contains(&user) && code.instruction(user).operands().contains(&value.id);
            if !reads {
                errors.push(ConsistencyError::StaleUsers {
                    value: value.id,
                    instruction: user,
                });
            }
        }
        if let ValueDefinition::Instruction(id) = value.definition {
            if placed.contains(&id) && code.instruction(id).out() != Some(value.id) {
                errors.push(ConsistencyError::DuplicateDefinition { value: value.id });
            }
        }
    }

    errors
}

fn check_terminator(code: &IrCode, block: BlockId, errors: &mut Vec<ConsistencyError>) {
    let instructions = &code.block(block).instructions;
    let Some((&last, body)) = instructions.split_last() else {
        errors.push(ConsistencyError::MissingTerminator { block });
        return;
    };
    if !code.instruction(last).is_terminator() {
        errors.push(ConsistencyError::MissingTerminator { block });
    }
    for &id in body {
        if code.instruction(id).is_terminator() {
            errors.push(ConsistencyError::MisplacedTerminator {
                instruction: id,
                block,
            });
        }
    }
}

fn check_edges(code: &IrCode, block: BlockId, errors: &mut Vec<ConsistencyError>) {
    for successor in code.successors(block) {
        if !code.block(successor).predecessors.contains(&block) {
            errors.push(ConsistencyError::AsymmetricEdge {
                from: block,
                to: successor,
            });
        }
    }
    for &predecessor in &code.block(block).predecessors {
        if !code.successors(predecessor).contains(&block) {
            errors.push(ConsistencyError::AsymmetricEdge {
                from: predecessor,
                to: block,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;
    use crate::ir::{InstructionKind, IrBuilder};
    use crate::resolution::DispatchKind;
    use crate::types::{Nullability, TypeElement};

    #[test]
    fn test_well_formed_body() {
        let mut h = HierarchyBuilder::new();
        h.class("A").method("foo").finish();
        let h = h.build();
        let a = h.lookup_type("A").unwrap();
        let mut builder = IrBuilder::new(h.method_ref("A", "foo").unwrap());
        let entry = builder.entry();
        let object = builder.block(entry).new_instance(a);
        builder
            .block(entry)
            .invoke(DispatchKind::Virtual, h.method_ref("A", "foo").unwrap(), &[object]);
        builder.block(entry).ret(None);
        let code = builder.finish();

        assert_eq!(verify_ssa(&code), vec![]);
    }

    #[test]
    fn test_detects_missing_terminator() {
        let mut h = HierarchyBuilder::new();
        h.class("A").method("foo").finish();
        let h = h.build();
        let mut builder = IrBuilder::new(h.method_ref("A", "foo").unwrap());
        let entry = builder.entry();
        builder.block(entry).const_number(1);
        let code = builder.finish();

        assert_eq!(
            verify_ssa(&code),
            vec![ConsistencyError::MissingTerminator { block: entry }]
        );
    }

    #[test]
    fn test_detects_use_before_definition() {
        let mut h = HierarchyBuilder::new();
        h.class("A").method("foo").finish();
        let h = h.build();
        let a = h.lookup_type("A").unwrap();
        let mut builder = IrBuilder::new(h.method_ref("A", "foo").unwrap());
        let entry = builder.entry();
        let object = builder.block(entry).new_instance(a);
        builder.block(entry).ret(None);
        let mut code = builder.finish();

        // A use placed ahead of the definition
        code.insert_instruction(entry, 0, InstructionKind::Return { value: Some(object) });
        let errors = verify_ssa(&code);

        assert!(errors.contains(&ConsistencyError::UseNotDominated {
            value: object,
            block: entry
        }));
    }

    #[test]
    fn test_detects_two_throwing_instructions_under_handler() {
        let mut h = HierarchyBuilder::new();
        h.class("A").method("foo").finish();
        let h = h.build();
        let a = h.lookup_type("A").unwrap();
        let foo = h.method_ref("A", "foo").unwrap();
        let mut builder = IrBuilder::new(foo.clone());
        let entry = builder.entry();
        let handler = builder.new_block();
        let object = builder.block(entry).new_instance(a);
        builder.block(entry).catch_all(handler);
        builder.block(entry).invoke(DispatchKind::Virtual, foo, &[object]);
        builder.block(entry).ret(None);
        builder.block(handler).ret(None);
        let code = builder.finish();

        assert_eq!(
            verify_ssa(&code),
            vec![ConsistencyError::MultipleThrowingInstructions {
                block: entry,
                count: 2
            }]
        );
    }

    /// `guarded` casts the argument under a catch-all handler and falls
    /// through to `exit`, which returns the cast
    struct GuardedCast {
        builder: IrBuilder,
        guarded: BlockId,
        handler: BlockId,
        cast: ValueId,
        ty: TypeElement,
    }

    fn guarded_cast() -> GuardedCast {
        let mut h = HierarchyBuilder::new();
        h.interface("I").finish();
        h.class("A").implements("I").method("foo").finish();
        let h = h.build();
        let a = h.lookup_type("A").unwrap();
        let i = h.lookup_type("I").unwrap();
        let mut builder = IrBuilder::new(h.method_ref("A", "foo").unwrap());
        let object = builder.argument(TypeElement::from_class(i, Nullability::MaybeNull));
        let entry = builder.entry();
        let guarded = builder.new_block();
        let handler = builder.new_block();
        let exit = builder.new_block();
        builder.block(entry).goto(guarded);
        builder.block(guarded).catch_all(handler);
        let cast = builder.block(guarded).check_cast(object, a);
        builder.block(guarded).goto(exit);
        builder.block(exit).ret(Some(cast));
        GuardedCast {
            builder,
            guarded,
            handler,
            cast,
            ty: TypeElement::from_class(a, Nullability::MaybeNull),
        }
    }

    #[test]
    fn test_detects_handler_reading_value_of_throwing_instruction() {
        let GuardedCast {
            mut builder,
            handler,
            cast,
            ..
        } = guarded_cast();
        builder.block(handler).ret(Some(cast));
        let code = builder.finish();

        assert_eq!(
            verify_ssa(&code),
            vec![ConsistencyError::UseNotDominated {
                value: cast,
                block: handler
            }]
        );
    }

    #[test]
    fn test_detects_phi_reading_value_along_exception_edge() {
        let GuardedCast {
            mut builder,
            guarded,
            handler,
            cast,
            ty,
        } = guarded_cast();
        builder.block(handler).phi(ty, &[(guarded, cast)]);
        builder.block(handler).ret(None);
        let code = builder.finish();

        assert_eq!(
            verify_ssa(&code),
            vec![ConsistencyError::UseNotDominated {
                value: cast,
                block: guarded
            }]
        );
    }

    #[test]
    fn test_value_of_throwing_instruction_reaches_normal_successor() {
        let GuardedCast {
            mut builder, handler, ..
        } = guarded_cast();
        builder.block(handler).ret(None);
        let code = builder.finish();

        assert_eq!(verify_ssa(&code), vec![]);
    }
}
