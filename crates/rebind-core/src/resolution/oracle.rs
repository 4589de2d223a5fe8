use super::{DispatchKind, DispatchTargets, ResolutionResult, ResolvedMethod};
use crate::hierarchy::{ClassDef, ClassHierarchy, MemberAccess, MethodRef, MethodSignature, TypeName};
use crate::types::{ClassType, TypeElement};
use dashmap::DashMap;
use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolutionKey {
    kind: DispatchKind,
    method: MethodRef,
    receiver: TypeName,
    exact: bool,
    context: TypeName,
}

/// Selection outcome that still borrows the definitions it found
enum Selection<'h> {
    Single(ResolvedMethod<'h>),
    NoTarget,
    Ambiguous,
}

/// Answers "which method does this call site execute?"
///
/// Pure over the immutable hierarchy. Results are memoized in a concurrent
/// map so many method passes can query the same oracle in parallel.
#[derive(Debug)]
pub struct ResolutionOracle {
    hierarchy: Arc<ClassHierarchy>,
    cache: DashMap<ResolutionKey, ResolutionResult, FxBuildHasher>,
}

impl ResolutionOracle {
    pub fn new(hierarchy: Arc<ClassHierarchy>) -> Self {
        Self {
            hierarchy,
            cache: DashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    pub fn cached_results(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a call site to the method it reaches at run time.
    ///
    /// Never fails: receivers without a usable class type, unresolvable
    /// references and inaccessible targets all produce `NoTarget`.
    pub fn resolve(
        &self,
        kind: DispatchKind,
        declared: &MethodRef,
        receiver: &TypeElement,
        context: TypeName,
    ) -> ResolutionResult {
        let Some(receiver) = receiver.as_class_type(&self.hierarchy) else {
            trace!("Receiver has no class type, not resolving");
            return ResolutionResult::NoTarget;
        };

        let key = ResolutionKey {
            kind,
            method: declared.clone(),
            receiver: receiver.class,
            exact: receiver.exact,
            context,
        };
        if let Some(cached) = self.cache.get(&key) {
            return cached.value().clone();
        }

        let result = self.compute(kind, declared, receiver, context);
        self.cache.insert(key, result.clone());
        result
    }

    fn compute(
        &self,
        kind: DispatchKind,
        declared: &MethodRef,
        receiver: &ClassType,
        context: TypeName,
    ) -> ResolutionResult {
        let Some(resolved) = self.resolve_method(declared) else {
            return ResolutionResult::NoTarget;
        };

        let selection = match kind {
            DispatchKind::Super => self.lookup_super_target(declared, context),
            DispatchKind::Virtual | DispatchKind::Interface if receiver.exact => {
                self.dispatch_from(receiver.class, &resolved)
            }
            DispatchKind::Virtual | DispatchKind::Interface => {
                self.single_dispatch_target(receiver.class, &resolved)
            }
        };

        let target = match selection {
            Selection::Single(target) => target,
            Selection::NoTarget => return ResolutionResult::NoTarget,
            Selection::Ambiguous => return ResolutionResult::Ambiguous,
        };

        // Virtual and super dispatch must land on a class, never re-resolve
        // onto an interface
        if target.holder.is_interface && kind != DispatchKind::Interface {
            trace!("Target lands on an interface for {:?} dispatch", kind);
            return ResolutionResult::NoTarget;
        }
        if !self.hierarchy.is_member_accessible(
            target.holder.name,
            target.definition.access,
            context,
        ) {
            trace!("Target is not accessible from the calling context");
            return ResolutionResult::NoTarget;
        }

        ResolutionResult::SingleTarget(target.method_ref())
    }

    /// Symbolic resolution of a method reference on its own holder
    pub fn resolve_method(&self, method: &MethodRef) -> Option<ResolvedMethod<'_>> {
        let holder = self.hierarchy.class_of(method.holder)?;
        if holder.is_interface {
            self.resolve_method_on_interface(holder, &method.signature)
        } else {
            self.resolve_method_on_class(method, method.holder)
        }
    }

    /// Symbolic resolution of `method`'s signature starting at `class`: the
    /// first declaration up the superclass chain, otherwise a maximally
    /// specific superinterface method.
    pub fn resolve_method_on_class(
        &self,
        method: &MethodRef,
        class: TypeName,
    ) -> Option<ResolvedMethod<'_>> {
        let signature = &method.signature;
        for holder in self.hierarchy.superclass_chain(class) {
            if let Some(definition) = holder.lookup_method(signature) {
                return Some(ResolvedMethod { holder, definition });
            }
        }

        let candidates = self.maximally_specific_methods(class, signature);
        let mut non_abstract = candidates.iter().filter(|m| !m.definition.is_abstract);
        match (non_abstract.next(), non_abstract.next()) {
            (Some(only), None) => Some(*only),
            _ => candidates.first().copied(),
        }
    }

    fn resolve_method_on_interface<'h>(
        &'h self,
        interface: &'h ClassDef,
        signature: &MethodSignature,
    ) -> Option<ResolvedMethod<'h>> {
        if let Some(definition) = interface.lookup_method(signature) {
            return Some(ResolvedMethod {
                holder: interface,
                definition,
            });
        }

        // Interfaces inherit the public members of the root object type
        let object = self.hierarchy.class_of(self.hierarchy.object_type())?;
        if let Some(definition) = object.lookup_method(signature) {
            if definition.access == MemberAccess::Public && !definition.is_static {
                return Some(ResolvedMethod {
                    holder: object,
                    definition,
                });
            }
        }

        let candidates = self.maximally_specific_methods(interface.name, signature);
        let mut non_abstract = candidates.iter().filter(|m| !m.definition.is_abstract);
        match (non_abstract.next(), non_abstract.next()) {
            (Some(only), None) => Some(*only),
            _ => candidates.first().copied(),
        }
    }

    /// Is the resolved method a legal target of virtual dispatch from `context`
    pub fn is_accessible_for_virtual_dispatch(
        &self,
        method: &ResolvedMethod<'_>,
        context: TypeName,
    ) -> bool {
        method.definition.is_virtual()
            && self.hierarchy.is_member_accessible(
                method.holder.name,
                method.definition.access,
                context,
            )
    }

    /// All methods virtual dispatch may select for receivers bounded by
    /// `bound`, considering every instantiated concrete subtype
    pub fn lookup_dispatch_targets(&self, declared: &MethodRef, bound: TypeName) -> DispatchTargets {
        match self.resolve_method(declared) {
            Some(resolved) => self.dispatch_targets_below(bound, &resolved),
            None => DispatchTargets::default(),
        }
    }

    fn dispatch_targets_below(&self, bound: TypeName, resolved: &ResolvedMethod<'_>) -> DispatchTargets {
        let mut targets = IndexSet::new();
        // Library types may have subclasses outside the closed world
        let mut complete = self
            .hierarchy
            .class_of(bound)
            .is_some_and(ClassDef::is_program_class);

        for ty in self.hierarchy.subtypes(bound) {
            if !self.hierarchy.is_instantiated(ty) {
                continue;
            }
            match self.dispatch_from(ty, resolved) {
                Selection::Single(target) => {
                    targets.insert(target.method_ref());
                }
                Selection::NoTarget | Selection::Ambiguous => complete = false,
            }
        }

        DispatchTargets { targets, complete }
    }

    fn single_dispatch_target(&self, bound: TypeName, resolved: &ResolvedMethod<'_>) -> Selection<'_> {
        let targets = self.dispatch_targets_below(bound, resolved);
        if let Some(target) = targets.single() {
            return match self.definition_of(target) {
                Some(found) => Selection::Single(found),
                None => Selection::NoTarget,
            };
        }
        if targets.targets.is_empty() && targets.complete {
            trace!("No instantiated receiver below the bound");
            return Selection::NoTarget;
        }
        Selection::Ambiguous
    }

    fn definition_of(&self, method: &MethodRef) -> Option<ResolvedMethod<'_>> {
        let holder = self.hierarchy.class_of(method.holder)?;
        let definition = holder.lookup_method(&method.signature)?;
        Some(ResolvedMethod { holder, definition })
    }

    /// Runtime selection for a receiver whose class is exactly `start`
    fn dispatch_from(&self, start: TypeName, resolved: &ResolvedMethod<'_>) -> Selection<'_> {
        let signature = &resolved.definition.signature;
        for holder in self.hierarchy.superclass_chain(start) {
            if holder.is_interface {
                break;
            }
            let Some(definition) = holder.lookup_method(signature) else {
                continue;
            };
            let candidate = ResolvedMethod { holder, definition };
            if !self.overrides(&candidate, resolved) {
                continue;
            }
            if definition.is_abstract {
                return Selection::NoTarget;
            }
            return Selection::Single(candidate);
        }
        self.select_default_method(start, signature)
    }

    /// Whether `candidate` takes part in dispatch of `resolved`
    fn overrides(&self, candidate: &ResolvedMethod<'_>, resolved: &ResolvedMethod<'_>) -> bool {
        if std::ptr::eq(candidate.definition, resolved.definition) {
            return true;
        }
        if !candidate.definition.is_virtual() {
            return false;
        }
        match resolved.definition.access {
            MemberAccess::Private => false,
            MemberAccess::PackagePrivate => candidate.holder.package == resolved.holder.package,
            MemberAccess::Public | MemberAccess::Protected => true,
        }
    }

    /// Lookup performed by a super call: starts at the direct superclass of
    /// the calling context, independent of the receiver's dynamic type
    fn lookup_super_target(&self, declared: &MethodRef, context: TypeName) -> Selection<'_> {
        let declared_on_interface = self
            .hierarchy
            .class_of(declared.holder)
            .map_or(true, |holder| holder.is_interface);
        if declared_on_interface {
            return Selection::NoTarget;
        }
        let Some(superclass) = self
            .hierarchy
            .class_of(context)
            .and_then(|class| class.superclass)
        else {
            return Selection::NoTarget;
        };

        let signature = &declared.signature;
        for holder in self.hierarchy.superclass_chain(superclass) {
            let Some(definition) = holder.lookup_method(signature) else {
                continue;
            };
            if definition.is_static {
                continue;
            }
            if definition.is_abstract {
                return Selection::NoTarget;
            }
            return Selection::Single(ResolvedMethod { holder, definition });
        }
        self.select_default_method(superclass, signature)
    }

    /// Default method selection: exactly one non-abstract maximally specific
    /// superinterface method. More than one is a conflict.
    fn select_default_method(&self, class: TypeName, signature: &MethodSignature) -> Selection<'_> {
        let candidates = self.maximally_specific_methods(class, signature);
        let mut non_abstract = candidates.into_iter().filter(|m| !m.definition.is_abstract);
        match (non_abstract.next(), non_abstract.next()) {
            (Some(only), None) => Selection::Single(only),
            (None, _) => Selection::NoTarget,
            (Some(_), Some(_)) => {
                trace!("Conflicting default methods");
                Selection::Ambiguous
            }
        }
    }

    /// Superinterface declarations of `signature` not overridden by a
    /// declaration in a more specific superinterface
    fn maximally_specific_methods(
        &self,
        class: TypeName,
        signature: &MethodSignature,
    ) -> Vec<ResolvedMethod<'_>> {
        let candidates: Vec<ResolvedMethod<'_>> = self
            .hierarchy
            .superinterfaces(class)
            .into_iter()
            .filter_map(|interface| self.hierarchy.class_of(interface))
            .filter_map(|holder| {
                holder
                    .lookup_method(signature)
                    .filter(|definition| definition.is_virtual())
                    .map(|definition| ResolvedMethod { holder, definition })
            })
            .collect();

        candidates
            .iter()
            .filter(|candidate| {
                !candidates.iter().any(|other| {
                    other.holder.name != candidate.holder.name
                        && self.hierarchy.is_subtype(other.holder.name, candidate.holder.name)
                })
            })
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;
    use crate::types::Nullability;

    fn exact(h: &ClassHierarchy, name: &str) -> TypeElement {
        TypeElement::exact_class(h.lookup_type(name).unwrap(), Nullability::DefinitelyNotNull)
    }

    fn bounded(h: &ClassHierarchy, name: &str) -> TypeElement {
        TypeElement::from_class(h.lookup_type(name).unwrap(), Nullability::MaybeNull)
    }

    fn target(h: &ClassHierarchy, holder: &str, name: &str) -> ResolutionResult {
        ResolutionResult::SingleTarget(h.method_ref(holder, name).unwrap())
    }

    #[test]
    fn test_interface_call_on_exact_implementor() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").abstract_method("foo").finish();
        b.class("A").implements("I").method("foo").finish();
        b.class("Main").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("I", "foo").unwrap();
        let main = h.lookup_type("Main").unwrap();
        let result = oracle.resolve(DispatchKind::Interface, &declared, &exact(&h, "A"), main);

        assert_eq!(result, target(&h, "A", "foo"));
    }

    #[test]
    fn test_interface_typed_receiver_has_no_target() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").abstract_method("foo").finish();
        b.class("A").implements("I").method("foo").finish();
        b.class("B").implements("I").method("foo").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("I", "foo").unwrap();
        let a = h.lookup_type("A").unwrap();
        let result = oracle.resolve(DispatchKind::Interface, &declared, &bounded(&h, "I"), a);

        assert_eq!(result, ResolutionResult::NoTarget);
    }

    #[test]
    fn test_abstract_in_middle_resolves_to_concrete_override() {
        let mut b = HierarchyBuilder::new();
        b.class("A").method("foo").finish();
        b.class("B").extends("A").abstract_class().abstract_method("foo").finish();
        b.class("C").extends("B").method("foo").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("A", "foo").unwrap();
        let a = h.lookup_type("A").unwrap();
        let result = oracle.resolve(DispatchKind::Virtual, &declared, &exact(&h, "C"), a);
        assert_eq!(result, target(&h, "C", "foo"));

        let targets = oracle.lookup_dispatch_targets(&declared, a);
        let expected: IndexSet<MethodRef> = [
            h.method_ref("A", "foo").unwrap(),
            h.method_ref("C", "foo").unwrap(),
        ]
        .into_iter()
        .collect();
        assert!(targets.complete);
        assert_eq!(targets.targets, expected);
    }

    #[test]
    fn test_bounded_receiver_with_multiple_overrides_is_ambiguous() {
        let mut b = HierarchyBuilder::new();
        b.class("A").method("foo").finish();
        b.class("B").extends("A").method("foo").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("A", "foo").unwrap();
        let a = h.lookup_type("A").unwrap();
        let result = oracle.resolve(DispatchKind::Virtual, &declared, &bounded(&h, "A"), a);

        assert_eq!(result, ResolutionResult::Ambiguous);
    }

    #[test]
    fn test_bounded_receiver_with_single_override_in_rta() {
        let mut b = HierarchyBuilder::new();
        b.class("A").method("foo").finish();
        b.class("B").extends("A").method("foo").finish();
        b.mark_instantiated("B");
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("A", "foo").unwrap();
        let a = h.lookup_type("A").unwrap();
        let result = oracle.resolve(DispatchKind::Virtual, &declared, &bounded(&h, "A"), a);

        assert_eq!(result, target(&h, "B", "foo"));
    }

    #[test]
    fn test_library_bound_is_incomplete() {
        let mut b = HierarchyBuilder::new();
        b.class("lib.Base").library().method("foo").finish();
        b.class("Main").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("lib.Base", "foo").unwrap();
        let main = h.lookup_type("Main").unwrap();
        let result = oracle.resolve(DispatchKind::Virtual, &declared, &bounded(&h, "lib.Base"), main);

        assert_eq!(result, ResolutionResult::Ambiguous);
    }

    #[test]
    fn test_conflicting_default_methods_are_ambiguous() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").method("foo").finish();
        b.interface("J").method("foo").finish();
        b.class("A").implements("I").implements("J").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("I", "foo").unwrap();
        let a = h.lookup_type("A").unwrap();
        let result = oracle.resolve(DispatchKind::Interface, &declared, &exact(&h, "A"), a);

        assert_eq!(result, ResolutionResult::Ambiguous);
    }

    #[test]
    fn test_more_specific_default_method_wins() {
        let mut b = HierarchyBuilder::new();
        b.interface("I").method("foo").finish();
        b.interface("J").implements("I").method("foo").finish();
        b.class("A").implements("I").implements("J").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("I", "foo").unwrap();
        let a = h.lookup_type("A").unwrap();

        // Interface dispatch may land on a default method
        let result = oracle.resolve(DispatchKind::Interface, &declared, &exact(&h, "A"), a);
        assert_eq!(result, target(&h, "J", "foo"));

        // Virtual dispatch must not land on an interface
        let declared_on_class = declared.with_holder(a);
        let result = oracle.resolve(DispatchKind::Virtual, &declared_on_class, &exact(&h, "A"), a);
        assert_eq!(result, ResolutionResult::NoTarget);
    }

    #[test]
    fn test_super_lookup_starts_at_context_superclass() {
        let mut b = HierarchyBuilder::new();
        b.class("A").method("bar").finish();
        b.class("B").extends("A").method("bar").finish();
        b.class("C").extends("B").method("bar").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        // The reference names A, the runtime starts at C's superclass B
        let declared = h.method_ref("A", "bar").unwrap();
        let c = h.lookup_type("C").unwrap();
        let this = bounded(&h, "C");
        let result = oracle.resolve(DispatchKind::Super, &declared, &this, c);

        assert_eq!(result, target(&h, "B", "bar"));
    }

    #[test]
    fn test_inaccessible_target_has_no_target() {
        let mut b = HierarchyBuilder::new();
        b.class("p.A")
            .method_with("foo", &[], "void", MemberAccess::Public, false)
            .finish();
        b.class("p.B")
            .extends("p.A")
            .package_private()
            .method("foo")
            .finish();
        b.class("q.Main").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("p.A", "foo").unwrap();
        let main = h.lookup_type("q.Main").unwrap();
        let result = oracle.resolve(DispatchKind::Virtual, &declared, &exact(&h, "p.B"), main);

        assert_eq!(result, ResolutionResult::NoTarget);
    }

    #[test]
    fn test_package_private_method_is_not_overridden_across_packages() {
        let mut b = HierarchyBuilder::new();
        b.class("p.A")
            .method_with("foo", &[], "void", MemberAccess::PackagePrivate, false)
            .finish();
        b.class("q.B")
            .extends("p.A")
            .method_with("foo", &[], "void", MemberAccess::PackagePrivate, false)
            .finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("p.A", "foo").unwrap();
        let a = h.lookup_type("p.A").unwrap();
        let result = oracle.resolve(DispatchKind::Virtual, &declared, &exact(&h, "q.B"), a);

        assert_eq!(result, target(&h, "p.A", "foo"));
    }

    #[test]
    fn test_results_are_memoized() {
        let mut b = HierarchyBuilder::new();
        b.class("A").method("foo").finish();
        let h = Arc::new(b.build());
        let oracle = ResolutionOracle::new(h.clone());

        let declared = h.method_ref("A", "foo").unwrap();
        let a = h.lookup_type("A").unwrap();
        let first = oracle.resolve(DispatchKind::Virtual, &declared, &exact(&h, "A"), a);
        let second = oracle.resolve(DispatchKind::Virtual, &declared, &exact(&h, "A"), a);

        assert_eq!(first, second);
        assert_eq!(oracle.cached_results(), 1);
    }
}
