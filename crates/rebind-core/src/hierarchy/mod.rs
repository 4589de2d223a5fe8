//! Whole-program class hierarchy view
//!
//! Built once per compilation and read-only afterwards, so it can be shared
//! across worker threads behind an `Arc` without synchronization.

mod builder;
mod class;
mod references;

pub use builder::{ClassBuilder, HierarchyBuilder, OBJECT_TYPE, VOID_TYPE};
pub use class::{ClassAccess, ClassDef, ClassOrigin, MemberAccess, MethodDef};
pub use references::{MethodRef, MethodRefDisplay, MethodSignature, TypeName};

use crate::names::NameTable;
use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use tracing::debug;

/// Class hierarchy information for dispatch resolution
#[derive(Debug)]
pub struct ClassHierarchy {
    names: NameTable,
    classes: FxHashMap<TypeName, ClassDef>,
    /// type -> classes extending it and classes/interfaces implementing it
    direct_subtypes: FxHashMap<TypeName, Vec<TypeName>>,
    object: TypeName,
    /// RTA: when present, only these classes are ever allocated
    instantiated: Option<FxHashSet<TypeName>>,
}

impl ClassHierarchy {
    pub(crate) fn new(
        names: NameTable,
        definitions: Vec<ClassDef>,
        object: TypeName,
        instantiated: Option<FxHashSet<TypeName>>,
    ) -> Self {
        let mut classes = FxHashMap::default();
        let mut direct_subtypes: FxHashMap<TypeName, Vec<TypeName>> = FxHashMap::default();

        for class in definitions {
            let supertypes = class.superclass.iter().chain(class.interfaces.iter());
            for &supertype in supertypes {
                direct_subtypes.entry(supertype).or_default().push(class.name);
            }
            classes.insert(class.name, class);
        }

        debug!("Built class hierarchy with {} classes", classes.len());

        Self {
            names,
            classes,
            direct_subtypes,
            object,
            instantiated,
        }
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn object_type(&self) -> TypeName {
        self.object
    }

    pub fn class_of(&self, ty: TypeName) -> Option<&ClassDef> {
        self.classes.get(&ty)
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeName> {
        let ty = TypeName(self.names.get(name)?);
        self.classes.contains_key(&ty).then_some(ty)
    }

    /// Reference to the first method named `name` declared directly on `holder`
    pub fn method_ref(&self, holder: &str, name: &str) -> Option<MethodRef> {
        let class = self.class_of(self.lookup_type(holder)?)?;
        let symbol = self.names.get(name)?;
        class
            .methods
            .iter()
            .find(|m| m.signature.name == symbol)
            .map(|m| class.method_ref(m))
    }

    pub fn type_display(&self, ty: TypeName) -> &str {
        self.names.resolve(ty.0)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn direct_subtypes(&self, ty: TypeName) -> &[TypeName] {
        self.direct_subtypes.get(&ty).map_or(&[], Vec::as_slice)
    }

    /// `ty` and every transitive subtype, in breadth-first order
    pub fn subtypes(&self, ty: TypeName) -> IndexSet<TypeName> {
        let mut seen = IndexSet::new();
        let mut queue = VecDeque::from([ty]);
        while let Some(current) = queue.pop_front() {
            if seen.insert(current) {
                queue.extend(self.direct_subtypes(current).iter().copied());
            }
        }
        seen
    }

    /// The class itself followed by its known superclasses
    pub fn superclass_chain(&self, ty: TypeName) -> SuperclassChain<'_> {
        SuperclassChain {
            hierarchy: self,
            next: Some(ty),
            steps: 0,
        }
    }

    /// Every interface reachable from `ty` through superclasses and
    /// interface extension, nearest first. Does not include `ty` itself.
    pub fn superinterfaces(&self, ty: TypeName) -> IndexSet<TypeName> {
        let mut result = IndexSet::new();
        let mut queue = VecDeque::new();
        for class in self.superclass_chain(ty) {
            queue.extend(class.interfaces.iter().copied());
        }
        if let Some(class) = self.class_of(ty) {
            if class.is_interface {
                queue.extend(class.interfaces.iter().copied());
            }
        }
        while let Some(interface) = queue.pop_front() {
            if interface == ty || !result.insert(interface) {
                continue;
            }
            if let Some(class) = self.class_of(interface) {
                queue.extend(class.interfaces.iter().copied());
            }
        }
        result
    }

    /// Reflexive subtype check over superclasses and interfaces
    pub fn is_subtype(&self, sub: TypeName, sup: TypeName) -> bool {
        if sub == sup || sup == self.object {
            return true;
        }
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::from([sub]);
        while let Some(current) = queue.pop_front() {
            if current == sup {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(class) = self.class_of(current) {
                queue.extend(class.superclass);
                queue.extend(class.interfaces.iter().copied());
            }
        }
        false
    }

    /// Nearest common superclass; interfaces are treated as direct
    /// subclasses of the root object type
    pub fn common_superclass(&self, a: TypeName, b: TypeName) -> TypeName {
        let ancestors_of_a: FxHashSet<TypeName> = self
            .superclass_chain(a)
            .filter(|c| !c.is_interface)
            .map(|c| c.name)
            .collect();
        self.superclass_chain(b)
            .filter(|c| !c.is_interface)
            .map(|c| c.name)
            .find(|ty| ancestors_of_a.contains(ty))
            .unwrap_or(self.object)
    }

    pub fn tracks_instantiations(&self) -> bool {
        self.instantiated.is_some()
    }

    /// Whether instances of exactly this class may exist at run time
    pub fn is_instantiated(&self, ty: TypeName) -> bool {
        let Some(class) = self.class_of(ty) else {
            return false;
        };
        if !class.is_concrete() {
            return false;
        }
        match &self.instantiated {
            Some(instantiated) => instantiated.contains(&ty),
            None => true,
        }
    }

    pub fn in_same_package(&self, a: TypeName, b: TypeName) -> bool {
        match (self.class_of(a), self.class_of(b)) {
            (Some(a), Some(b)) => a.package == b.package,
            _ => false,
        }
    }

    /// Class-level visibility of `class` from code in `context`
    pub fn is_class_accessible(&self, class: TypeName, context: TypeName) -> bool {
        match self.class_of(class) {
            Some(def) => match def.access {
                ClassAccess::Public => true,
                ClassAccess::PackagePrivate => self.in_same_package(class, context),
            },
            None => false,
        }
    }

    /// Visibility of a member declared on `holder` with `access`, from code
    /// in `context`. The holder class itself must be visible too.
    pub fn is_member_accessible(
        &self,
        holder: TypeName,
        access: MemberAccess,
        context: TypeName,
    ) -> bool {
        if !self.is_class_accessible(holder, context) {
            return false;
        }
        match access {
            MemberAccess::Public => true,
            MemberAccess::Private => holder == context,
            MemberAccess::PackagePrivate => self.in_same_package(holder, context),
            MemberAccess::Protected => {
                self.in_same_package(holder, context) || self.is_subtype(context, holder)
            }
        }
    }
}

/// Iterator over a class and its superclasses
pub struct SuperclassChain<'h> {
    hierarchy: &'h ClassHierarchy,
    next: Option<TypeName>,
    steps: usize,
}

impl<'h> Iterator for SuperclassChain<'h> {
    type Item = &'h ClassDef;

    fn next(&mut self) -> Option<Self::Item> {
        // A malformed hierarchy could contain a cycle
        if self.steps > self.hierarchy.len() {
            return None;
        }
        let class = self.hierarchy.class_of(self.next?)?;
        self.steps += 1;
        self.next = class.superclass;
        Some(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClassHierarchy {
        let mut builder = HierarchyBuilder::new();
        builder.interface("p.I").abstract_method("foo").finish();
        builder.interface("p.J").implements("p.I").finish();
        builder.class("p.A").implements("p.J").method("foo").finish();
        builder.class("p.B").extends("p.A").finish();
        builder.class("q.C").extends("p.A").package_private().finish();
        builder.build()
    }

    #[test]
    fn test_subtype_through_interfaces() {
        let h = sample();
        let a = h.lookup_type("p.A").unwrap();
        let b = h.lookup_type("p.B").unwrap();
        let i = h.lookup_type("p.I").unwrap();

        assert!(h.is_subtype(b, a));
        assert!(h.is_subtype(b, i));
        assert!(!h.is_subtype(a, b));
        assert!(h.is_subtype(i, h.object_type()));
    }

    #[test]
    fn test_subtypes_transitive() {
        let h = sample();
        let i = h.lookup_type("p.I").unwrap();
        let names: Vec<&str> = h.subtypes(i).iter().map(|t| h.type_display(*t)).collect();

        assert_eq!(names, vec!["p.I", "p.J", "p.A", "p.B", "q.C"]);
    }

    #[test]
    fn test_superinterfaces_nearest_first() {
        let h = sample();
        let b = h.lookup_type("p.B").unwrap();
        let names: Vec<&str> = h
            .superinterfaces(b)
            .iter()
            .map(|t| h.type_display(*t))
            .collect();

        assert_eq!(names, vec!["p.J", "p.I"]);
    }

    #[test]
    fn test_common_superclass() {
        let h = sample();
        let b = h.lookup_type("p.B").unwrap();
        let c = h.lookup_type("q.C").unwrap();
        let a = h.lookup_type("p.A").unwrap();
        let i = h.lookup_type("p.I").unwrap();

        assert_eq!(h.common_superclass(b, c), a);
        assert_eq!(h.common_superclass(b, i), h.object_type());
    }

    #[test]
    fn test_package_private_class_access() {
        let h = sample();
        let a = h.lookup_type("p.A").unwrap();
        let c = h.lookup_type("q.C").unwrap();

        assert!(!h.is_class_accessible(c, a));
        assert!(h.is_class_accessible(a, c));
    }

    #[test]
    fn test_member_access_rules() {
        let h = sample();
        let a = h.lookup_type("p.A").unwrap();
        let b = h.lookup_type("p.B").unwrap();
        let c = h.lookup_type("q.C").unwrap();

        assert!(h.is_member_accessible(a, MemberAccess::PackagePrivate, b));
        assert!(!h.is_member_accessible(a, MemberAccess::PackagePrivate, c));
        assert!(h.is_member_accessible(a, MemberAccess::Protected, c));
        assert!(!h.is_member_accessible(a, MemberAccess::Private, b));
        assert!(h.is_member_accessible(a, MemberAccess::Private, a));
    }

    #[test]
    fn test_instantiation_tracking() {
        let mut builder = HierarchyBuilder::new();
        builder.class("A").finish();
        builder.class("B").extends("A").finish();
        builder.class("X").abstract_class().finish();
        builder.mark_instantiated("B");
        let h = builder.build();

        assert!(h.tracks_instantiations());
        assert!(!h.is_instantiated(h.lookup_type("A").unwrap()));
        assert!(h.is_instantiated(h.lookup_type("B").unwrap()));
        assert!(!h.is_instantiated(h.lookup_type("X").unwrap()));
    }
}
