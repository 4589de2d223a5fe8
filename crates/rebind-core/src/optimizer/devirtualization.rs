//! Devirtualization pass
//!
//! Rewrites dispatching call sites whose target is statically known:
//!
//! - super calls that reach the same method as plain virtual dispatch
//!   become virtual calls,
//! - virtual calls are rebound to the most specific declaration for the
//!   receiver's static type,
//! - interface calls with a single class target become virtual calls,
//!   narrowing the receiver with a check-cast when its type does not
//!   already prove the target class.
//!
//! Narrowing casts are cached per (receiver, class) and reused wherever the
//! earlier cast dominates the call site. Every rewrite leaves the method
//! consistent, and the end-of-pass check turns any violation into a fatal
//! error.

use super::type_narrowing::TypeNarrowing;
use super::{MethodOutcome, MethodPass};
use crate::config::{DevirtualizationOptions, OptimizationLevel};
use crate::errors::{OptimizerError, Result};
use crate::hierarchy::{ClassHierarchy, MethodRef, TypeName};
use crate::ir::{
    verify_ssa, BlockId, DominatorTree, InstrId, InstructionKind, Invoke, IrCode, ValueDefinition,
    ValueId,
};
use crate::resolution::{DispatchKind, ResolutionOracle};
use crate::types::TypeElement;
use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Counts of the rewrites performed on one method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub super_to_virtual: usize,
    pub rebound: usize,
    pub interface_to_virtual: usize,
    pub casts_inserted: usize,
    pub casts_reused: usize,
    pub blocks_split: usize,
}

impl RewriteStats {
    pub fn total_rewrites(&self) -> usize {
        self.super_to_virtual + self.rebound + self.interface_to_virtual
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevirtualizationResult {
    pub changed: bool,
    /// Values whose type may now be narrower than before
    pub affected_values: IndexSet<ValueId>,
    pub stats: RewriteStats,
}

/// State scoped to one method
struct MethodState {
    dominators: DominatorTree,
    /// receiver -> target class -> narrowed receiver
    casted_receivers: FxHashMap<ValueId, FxHashMap<TypeName, ValueId>>,
    /// Call sites already rewritten; their operands are left alone by use
    /// replacement
    devirtualized: FxHashSet<InstrId>,
    affected: IndexSet<ValueId>,
    stats: RewriteStats,
}

impl MethodState {
    fn new(code: &IrCode) -> Self {
        Self {
            dominators: DominatorTree::new(code),
            casted_receivers: FxHashMap::default(),
            devirtualized: FxHashSet::default(),
            affected: IndexSet::new(),
            stats: RewriteStats::default(),
        }
    }

    fn cached_cast(&self, receiver: ValueId, class: TypeName) -> Option<ValueId> {
        self.casted_receivers.get(&receiver)?.get(&class).copied()
    }
}

/// Where a new narrowing cast ended up
struct CastPlacement {
    cast: InstrId,
    value: ValueId,
    /// Block now holding the call, when the cast forced a split
    split_tail: Option<BlockId>,
}

/// How a rewrite moved the visited call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallMoved {
    /// One instruction was inserted ahead of it in the same block
    Shifted,
    /// It now heads the block split off right after the current one
    SplitInto(BlockId),
}

pub struct DevirtualizationPass {
    oracle: Arc<ResolutionOracle>,
    options: DevirtualizationOptions,
}

impl DevirtualizationPass {
    pub fn new(oracle: Arc<ResolutionOracle>, options: DevirtualizationOptions) -> Self {
        Self { oracle, options }
    }

    fn hierarchy(&self) -> &ClassHierarchy {
        self.oracle.hierarchy()
    }

    /// Rewrite every call site of `code` once, in block order
    pub fn devirtualize(&self, code: &mut IrCode) -> Result<DevirtualizationResult> {
        let mut state = MethodState::new(code);

        let mut position = 0;
        while position < code.block_order().len() {
            let mut block = code.block_order()[position];
            let mut index = 0;
            while let Some(&id) = code.block(block).instructions.get(index) {
                match self.visit(code, id, index, &mut state) {
                    None => index += 1,
                    Some(CallMoved::Shifted) => index += 2,
                    Some(CallMoved::SplitInto(tail)) => {
                        // split_block places the tail right after `block`
                        position += 1;
                        debug_assert_eq!(code.block_order()[position], tail);
                        block = tail;
                        index = 1;
                    }
                }
            }
            position += 1;
        }

        if self.options.narrow_affected_types && !state.affected.is_empty() {
            let narrowed = TypeNarrowing::new(self.hierarchy()).narrow(code, &state.affected);
            state.affected.extend(narrowed);
        }

        let violations = verify_ssa(code);
        if !violations.is_empty() {
            return Err(OptimizerError::InconsistentSsa {
                method: code.method().display(self.hierarchy().names()).to_string(),
                violations,
            });
        }

        let stats = state.stats;
        if stats.total_rewrites() > 0 {
            debug!(
                "Devirtualized {}: {} super, {} rebound, {} interface, {} casts ({} reused)",
                code.method().display(self.hierarchy().names()),
                stats.super_to_virtual,
                stats.rebound,
                stats.interface_to_virtual,
                stats.casts_inserted,
                stats.casts_reused
            );
        }

        Ok(DevirtualizationResult {
            changed: stats.total_rewrites() > 0,
            affected_values: state.affected,
            stats,
        })
    }

    /// Visit the instruction at `index` of its block. Reports where the
    /// call went when a cast was inserted ahead of it.
    fn visit(&self, code: &mut IrCode, id: InstrId, index: usize, state: &mut MethodState) -> Option<CallMoved> {
        let Some(invoke) = code.instruction(id).as_invoke() else {
            return None;
        };

        let kind = invoke.kind;
        match kind {
            DispatchKind::Super => {
                if self.options.enable_super_to_virtual && self.rewrite_super_to_virtual(code, id, state) {
                    self.rebind_to_most_specific(code, id, state);
                }
                None
            }
            DispatchKind::Virtual => {
                self.rebind_to_most_specific(code, id, state);
                None
            }
            DispatchKind::Interface => {
                if !self.options.enable_interface_devirtualization {
                    return None;
                }
                let moved = self.rewrite_interface_to_virtual(code, id, index, state);
                if code.instruction(id).as_invoke().map(|i| i.kind) == Some(DispatchKind::Virtual) {
                    self.rebind_to_most_specific(code, id, state);
                }
                moved
            }
        }
    }

    fn replace_invoke(code: &mut IrCode, id: InstrId, kind: DispatchKind, method: MethodRef) {
        let Some(invoke) = code.instruction(id).as_invoke() else {
            return;
        };
        let replacement = InstructionKind::Invoke(Invoke {
            kind,
            method,
            out: invoke.out,
            arguments: invoke.arguments.clone(),
        });
        code.replace_instruction(id, replacement);
    }

    /// Super call that reaches the same method as virtual dispatch on
    /// the receiver
    fn rewrite_super_to_virtual(&self, code: &mut IrCode, id: InstrId, state: &mut MethodState) -> bool {
        let Some(invoke) = code.instruction(id).as_invoke() else {
            return false;
        };
        let Some(receiver) = invoke.receiver() else {
            return false;
        };
        let receiver_type = code.value(receiver).best_known_type();
        let context = code.context();

        let super_result = self
            .oracle
            .resolve(DispatchKind::Super, &invoke.method, &receiver_type, context);
        let Some(super_target) = super_result.single_target() else {
            trace!("Super call has no single target");
            return false;
        };
        let virtual_result = self
            .oracle
            .resolve(DispatchKind::Virtual, &invoke.method, &receiver_type, context);
        if virtual_result.single_target() != Some(super_target) {
            trace!("Virtual dispatch on the receiver may reach another method");
            return false;
        }

        let target = super_target.clone();
        debug!(
            "Rewriting super call to virtual {}",
            target.display(self.hierarchy().names())
        );
        Self::replace_invoke(code, id, DispatchKind::Virtual, target);
        state.stats.super_to_virtual += 1;
        true
    }

    /// Rebind a virtual call to the most specific declaration visible
    /// from the receiver's static type
    fn rebind_to_most_specific(&self, code: &mut IrCode, id: InstrId, state: &mut MethodState) -> bool {
        if !self.options.enable_virtual_rebinding {
            return false;
        }
        let Some(invoke) = code.instruction(id).as_invoke() else {
            return false;
        };
        let Some(receiver) = invoke.receiver() else {
            return false;
        };
        let hierarchy = self.hierarchy();
        let context = code.context();
        let Some(receiver_class) = code.value(receiver).ty.as_class_type(hierarchy).map(|c| c.class) else {
            return false;
        };

        let declared = &invoke.method;
        let Some(resolved) = self.oracle.resolve_method(declared) else {
            return false;
        };
        if resolved.holder.is_interface || !self.oracle.is_accessible_for_virtual_dispatch(&resolved, context) {
            return false;
        }
        if receiver_class == declared.holder {
            // Already as specific as it gets
            return false;
        }
        if !hierarchy.is_subtype(receiver_class, declared.holder) {
            trace!("Receiver is not a subtype of the declared holder");
            return false;
        }

        let Some(rebound) = self.oracle.resolve_method_on_class(declared, receiver_class) else {
            return false;
        };
        if !self.oracle.is_accessible_for_virtual_dispatch(&rebound, context) {
            return false;
        }
        if !rebound.holder.is_program_class() || rebound.holder.is_interface {
            return false;
        }

        let target = rebound.method_ref();
        if &target == declared {
            return false;
        }
        debug!(
            "Rebinding {} to {}",
            declared.display(hierarchy.names()),
            target.display(hierarchy.names())
        );
        Self::replace_invoke(code, id, DispatchKind::Virtual, target);
        state.stats.rebound += 1;
        true
    }

    /// Interface call with a single class target
    fn rewrite_interface_to_virtual(
        &self,
        code: &mut IrCode,
        id: InstrId,
        index: usize,
        state: &mut MethodState,
    ) -> Option<CallMoved> {
        let invoke = code.instruction(id).as_invoke()?;
        let receiver = invoke.receiver()?;
        let hierarchy = self.hierarchy();
        let context = code.context();
        let declared_holder = invoke.method.holder;
        let out = invoke.out;

        let result = self.oracle.resolve(
            DispatchKind::Interface,
            &invoke.method,
            &code.value(receiver).best_known_type(),
            context,
        );
        let Some(target) = result.single_target().cloned() else {
            trace!("Interface call has no single target");
            return None;
        };
        let holder = target.holder;
        let lands_on_class = hierarchy.class_of(holder).is_some_and(|class| !class.is_interface);
        if !lands_on_class {
            trace!("Interface call resolves to a default method");
            return None;
        }
        if !hierarchy.is_class_accessible(holder, context) {
            trace!("Target class is not visible from the calling context");
            return None;
        }

        debug!(
            "Rewriting interface call to virtual {}",
            target.display(hierarchy.names())
        );
        Self::replace_invoke(code, id, DispatchKind::Virtual, target);
        state.stats.interface_to_virtual += 1;
        if let Some(out) = out {
            state.affected.insert(out);
        }

        let moved = if holder != declared_holder {
            self.narrow_receiver(code, id, index, receiver, holder, state)
        } else {
            None
        };
        state.devirtualized.insert(id);
        moved
    }

    /// Make the receiver of the rewritten call provably an instance of
    /// `holder`, reusing a dominating cast when there is one
    fn narrow_receiver(
        &self,
        code: &mut IrCode,
        id: InstrId,
        index: usize,
        receiver: ValueId,
        holder: TypeName,
        state: &mut MethodState,
    ) -> Option<CallMoved> {
        let hierarchy = self.hierarchy();
        let receiver_type = code.value(receiver).ty;
        let cast_type = TypeElement::from_class(holder, receiver_type.nullability());
        if receiver_type.less_than_or_equal(&cast_type, hierarchy) {
            // Already proven, a cast would be vacuous
            return None;
        }

        debug_assert!(state.dominators.is_current_for(code));
        let block = code.instruction(id).block;
        if let Some(cached) = state.cached_cast(receiver, holder) {
            if Self::cast_reaches(code, cached, block, state) {
                trace!("Reusing narrowed receiver {}", cached);
                code.rewrite_single_operand(id, receiver, cached);
                state.affected.insert(cached);
                state.stats.casts_reused += 1;
                return None;
            }
        }

        let placement = self.insert_cast(code, id, index, receiver, holder, cast_type, state);
        state
            .casted_receivers
            .entry(receiver)
            .or_default()
            .insert(holder, placement.value);
        state.affected.insert(placement.value);
        code.rewrite_single_operand(id, receiver, placement.value);

        let receiver_value = code.value(receiver);
        let replace_all = !receiver_value.has_local_info() && cast_type.less_than_or_equal(&receiver_value.ty, hierarchy);
        if replace_all {
            let mut excluded = state.devirtualized.clone();
            excluded.insert(id);
            let replaced = code.replace_dominated_uses_except(
                receiver,
                placement.value,
                placement.cast,
                &excluded,
                &state.dominators,
            );
            for user in replaced.instructions {
                if let Some(out) = code.instruction(user).out() {
                    state.affected.insert(out);
                }
            }
            state.affected.extend(replaced.phis);
        }
        Some(match placement.split_tail {
            Some(tail) => CallMoved::SplitInto(tail),
            None => CallMoved::Shifted,
        })
    }

    /// Is the cached cast defined on every path into the call's `block`.
    /// Calls are visited in order, so a cast earlier in the same block
    /// always precedes the call.
    fn cast_reaches(code: &IrCode, cast_value: ValueId, block: BlockId, state: &MethodState) -> bool {
        match code.value(cast_value).definition {
            ValueDefinition::Instruction(cast) if code.instruction(cast).block == block => true,
            ValueDefinition::Instruction(_) => code.available_in(&state.dominators, cast_value, block),
            _ => false,
        }
    }

    /// Insert `check-cast holder receiver` right before the call. When the
    /// call's block has catch handlers the block is split first, so the
    /// cast and the call each sit alone under the handlers.
    fn insert_cast(
        &self,
        code: &mut IrCode,
        id: InstrId,
        index: usize,
        receiver: ValueId,
        holder: TypeName,
        cast_type: TypeElement,
        state: &mut MethodState,
    ) -> CastPlacement {
        let value = code.create_value(cast_type);
        // Keep what is known about the runtime class
        let dynamic = code.value(receiver).dynamic_type;
        if let Some(dynamic) = dynamic.filter(|d| self.hierarchy().is_subtype(d.class, holder)) {
            code.value_mut(value).dynamic_type = Some(dynamic);
        }
        let kind = InstructionKind::CheckCast {
            out: value,
            object: receiver,
            class: holder,
        };

        let block = code.instruction(id).block;
        let (cast, split_tail) = if code.block(block).has_catch_handlers() {
            let tail = code.split_block(block, index);
            state.stats.blocks_split += 1;
            // The prefix now ends with a goto to the call's block
            let cast = code.insert_instruction(block, index, kind);
            state.dominators = DominatorTree::new(code);
            (cast, Some(tail))
        } else {
            (code.insert_instruction(block, index, kind), None)
        };

        state.stats.casts_inserted += 1;
        CastPlacement {
            cast,
            value,
            split_tail,
        }
    }
}

impl MethodPass for DevirtualizationPass {
    fn name(&self) -> &'static str {
        "devirtualization"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O2
    }

    fn run(&self, code: &mut IrCode) -> Result<MethodOutcome> {
        let result = self.devirtualize(code)?;
        Ok(MethodOutcome {
            changed: result.changed,
            affected_values: result.affected_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;
    use crate::ir::IrBuilder;
    use crate::types::Nullability;

    fn pass(hierarchy: crate::hierarchy::ClassHierarchy) -> DevirtualizationPass {
        let oracle = Arc::new(ResolutionOracle::new(Arc::new(hierarchy)));
        DevirtualizationPass::new(oracle, DevirtualizationOptions::default())
    }

    #[test]
    fn test_exact_receiver_interface_call_needs_no_cast() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").abstract_method("foo").finish();
        b.class("A").implements("I").method("foo").finish();
        b.class("Main").method("run").finish();
        let h = b.build();
        let a = h.lookup_type("A").unwrap();
        let foo = h.method_ref("I", "foo").unwrap();
        let a_foo = h.method_ref("A", "foo").unwrap();

        let mut builder = IrBuilder::new(h.method_ref("Main", "run").unwrap());
        let entry = builder.entry();
        let receiver = builder.block(entry).new_instance(a);
        let call = builder.block(entry).invoke(DispatchKind::Interface, foo, &[receiver]);
        builder.block(entry).ret(None);
        let mut code = builder.finish();

        let result = pass(h).devirtualize(&mut code).unwrap();

        let invoke = code.instruction(call).as_invoke().unwrap();
        assert!(result.changed);
        assert_eq!(invoke.kind, DispatchKind::Virtual);
        assert_eq!(invoke.method, a_foo);
        assert_eq!(invoke.arguments, vec![receiver]);
        assert_eq!(result.stats.casts_inserted, 0);
    }

    #[test]
    fn test_disabled_rewrite_leaves_call_alone() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").abstract_method("foo").finish();
        b.class("A").implements("I").method("foo").finish();
        b.class("Main").method("run").finish();
        let h = b.build();
        let a = h.lookup_type("A").unwrap();
        let foo = h.method_ref("I", "foo").unwrap();

        let mut builder = IrBuilder::new(h.method_ref("Main", "run").unwrap());
        let entry = builder.entry();
        let receiver = builder.block(entry).new_instance(a);
        let call = builder.block(entry).invoke(DispatchKind::Interface, foo, &[receiver]);
        builder.block(entry).ret(None);
        let mut code = builder.finish();

        let oracle = Arc::new(ResolutionOracle::new(Arc::new(h)));
        let options = DevirtualizationOptions {
            enable_interface_devirtualization: false,
            ..DevirtualizationOptions::default()
        };
        let result = DevirtualizationPass::new(oracle, options)
            .devirtualize(&mut code)
            .unwrap();

        assert!(!result.changed);
        assert_eq!(
            code.instruction(call).as_invoke().unwrap().kind,
            DispatchKind::Interface
        );
    }

    #[test]
    fn test_cast_inserted_for_interface_typed_receiver() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").abstract_method("foo").finish();
        b.class("A").implements("I").method("foo").finish();
        b.class("Main").method("run").finish();
        let h = b.build();
        let a = h.lookup_type("A").unwrap();
        let i = h.lookup_type("I").unwrap();
        let foo = h.method_ref("I", "foo").unwrap();

        let mut builder = IrBuilder::new(h.method_ref("Main", "run").unwrap());
        let receiver = builder.argument(TypeElement::from_class(i, Nullability::MaybeNull));
        builder.set_dynamic_type(
            receiver,
            crate::types::ClassType::exact(a, Nullability::MaybeNull),
        );
        let entry = builder.entry();
        let call = builder.block(entry).invoke(DispatchKind::Interface, foo, &[receiver]);
        builder.block(entry).ret(None);
        let mut code = builder.finish();

        let result = pass(h).devirtualize(&mut code).unwrap();

        let new_receiver = code.instruction(call).as_invoke().unwrap().arguments[0];
        assert_ne!(new_receiver, receiver);
        let ValueDefinition::Instruction(cast) = code.value(new_receiver).definition else {
            panic!("narrowed receiver has no defining instruction");
        };
        assert_eq!(code.index_in_block(cast), Some(code.index_in_block(call).unwrap() - 1));
        assert!(matches!(
            code.instruction(cast).kind,
            InstructionKind::CheckCast { object, class, .. } if object == receiver && class == a
        ));
        assert_eq!(result.stats.casts_inserted, 1);
        assert!(result.affected_values.contains(&new_receiver));
    }

    #[test]
    fn test_every_call_visited_after_consecutive_casts() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").abstract_method("foo").finish();
        b.class("A").implements("I").method("foo").finish();
        b.class("B").implements("I").method("foo").finish();
        b.class("Main").method("run").finish();
        let h = b.build();
        let i = h.lookup_type("I").unwrap();
        let foo = h.method_ref("I", "foo").unwrap();

        let mut builder = IrBuilder::new(h.method_ref("Main", "run").unwrap());
        let entry = builder.entry();
        let receivers: Vec<ValueId> = ["A", "B", "A", "B"]
            .into_iter()
            .map(|class| {
                let receiver = builder.argument(TypeElement::from_class(i, Nullability::MaybeNull));
                let exact = crate::types::ClassType::exact(h.lookup_type(class).unwrap(), Nullability::MaybeNull);
                builder.set_dynamic_type(receiver, exact);
                receiver
            })
            .collect();
        let calls: Vec<InstrId> = receivers
            .iter()
            .map(|&receiver| builder.block(entry).invoke(DispatchKind::Interface, foo.clone(), &[receiver]))
            .collect();
        builder.block(entry).ret(None);
        let mut code = builder.finish();

        let result = pass(h).devirtualize(&mut code).unwrap();

        assert_eq!(result.stats.interface_to_virtual, 4);
        assert_eq!(result.stats.casts_inserted, 4);
        for call in calls {
            assert_eq!(code.instruction(call).as_invoke().unwrap().kind, DispatchKind::Virtual);
        }
        assert!(verify_ssa(&code).is_empty());
    }
}
