use crate::hierarchy::ClassHierarchy;
use crate::ir::{InstructionKind, IrCode, ValueDefinition, ValueId};
use crate::types::{Nullability, TypeElement};
use indexmap::IndexSet;
use tracing::trace;

/// Local re-analysis of value types after a rewrite.
///
/// Recomputes the type of each affected value from its definition and
/// propagates to users until nothing changes. Types only ever get narrower.
pub struct TypeNarrowing<'h> {
    hierarchy: &'h ClassHierarchy,
}

impl<'h> TypeNarrowing<'h> {
    pub fn new(hierarchy: &'h ClassHierarchy) -> Self {
        Self { hierarchy }
    }

    /// Returns the values whose type changed
    pub fn narrow(&self, code: &mut IrCode, affected: &IndexSet<ValueId>) -> IndexSet<ValueId> {
        let mut narrowed = IndexSet::new();
        let mut worklist: IndexSet<ValueId> = affected.clone();

        while let Some(value) = worklist.pop() {
            let current = code.value(value).ty;
            let Some(computed) = self.compute(code, value) else {
                continue;
            };
            if computed == current || !computed.less_than_or_equal(&current, self.hierarchy) {
                continue;
            }

            trace!("Narrowed {} from {:?} to {:?}", value, current, computed);
            code.value_mut(value).ty = computed;
            narrowed.insert(value);

            let users: Vec<ValueId> = code
                .value(value)
                .users
                .iter()
                .filter_map(|&user| code.instruction(user).out())
                .chain(code.value(value).phi_users.iter().copied())
                .collect();
            worklist.extend(users);
        }

        narrowed
    }

    fn compute(&self, code: &IrCode, value: ValueId) -> Option<TypeElement> {
        match code.value(value).definition {
            ValueDefinition::Instruction(id) => match &code.instruction(id).kind {
                InstructionKind::CheckCast { object, class, .. } => {
                    let object_type = code.value(*object).ty;
                    let cast_type = TypeElement::from_class(*class, object_type.nullability());
                    if object_type.less_than_or_equal(&cast_type, self.hierarchy) {
                        Some(object_type)
                    } else {
                        Some(cast_type)
                    }
                }
                InstructionKind::AssumeNonNull { src, .. } => Some(
                    code.value(*src)
                        .ty
                        .with_nullability(Nullability::DefinitelyNotNull),
                ),
                _ => None,
            },
            ValueDefinition::Phi(block) => {
                let phi = code.block(block).phi(value)?;
                let joined = phi
                    .operands
                    .iter()
                    .map(|&operand| code.value(operand).ty)
                    .fold(TypeElement::Bottom, |acc, ty| acc.join(&ty, self.hierarchy));
                Some(joined)
            }
            ValueDefinition::Undefined => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;
    use crate::ir::IrBuilder;

    #[test]
    fn test_phi_narrows_after_operand_narrows() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").finish();
        b.class("A").implements("I").finish();
        b.class("Main").method("run").finish();
        let h = b.build();
        let a = h.lookup_type("A").unwrap();
        let i = h.lookup_type("I").unwrap();
        let maybe_i = TypeElement::from_class(i, Nullability::MaybeNull);

        let mut builder = IrBuilder::new(h.method_ref("Main", "run").unwrap());
        let entry = builder.entry();
        let left = builder.new_block();
        let right = builder.new_block();
        let join = builder.new_block();
        let first = builder.block(entry).new_instance(a);
        let second = builder.block(entry).new_instance(a);
        let condition = builder.block(entry).const_number(0);
        builder.block(entry).branch(condition, left, right);
        builder.block(left).goto(join);
        builder.block(right).goto(join);
        let merged = builder
            .block(join)
            .phi(maybe_i, &[(left, first), (right, second)]);
        builder.block(join).ret(None);
        let mut code = builder.finish();

        let affected: IndexSet<ValueId> = [merged].into_iter().collect();
        let narrowed = TypeNarrowing::new(&h).narrow(&mut code, &affected);

        assert!(narrowed.contains(&merged));
        assert_eq!(
            code.value(merged).ty,
            TypeElement::exact_class(a, Nullability::DefinitelyNotNull)
        );
    }

    #[test]
    fn test_never_widens() {
        let mut b = HierarchyBuilder::new();
        b.class("A").finish();
        b.class("B").extends("A").finish();
        b.class("Main").method("run").finish();
        let h = b.build();
        let a = h.lookup_type("A").unwrap();
        let bb = h.lookup_type("B").unwrap();

        let mut builder = IrBuilder::new(h.method_ref("Main", "run").unwrap());
        let entry = builder.entry();
        let object = builder.block(entry).new_instance(bb);
        let cast = builder.block(entry).check_cast(object, a);
        builder.block(entry).ret(None);
        let mut code = builder.finish();
        code.value_mut(cast).ty = TypeElement::exact_class(bb, Nullability::DefinitelyNotNull);

        let affected: IndexSet<ValueId> = [cast].into_iter().collect();
        let narrowed = TypeNarrowing::new(&h).narrow(&mut code, &affected);

        assert!(narrowed.is_empty());
    }
}
