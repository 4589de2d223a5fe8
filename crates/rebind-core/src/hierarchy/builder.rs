use super::class::{ClassAccess, ClassDef, ClassOrigin, MemberAccess, MethodDef};
use super::references::{MethodRef, MethodSignature, TypeName};
use super::ClassHierarchy;
use crate::names::NameTable;
use rustc_hash::FxHashSet;

/// Name of the root of every class hierarchy
pub const OBJECT_TYPE: &str = "java.lang.Object";
/// Return type of methods without a result
pub const VOID_TYPE: &str = "void";

/// Collects class definitions and produces an immutable [`ClassHierarchy`]
pub struct HierarchyBuilder {
    names: NameTable,
    classes: Vec<ClassDef>,
    object: TypeName,
    instantiated: Option<FxHashSet<TypeName>>,
}

impl HierarchyBuilder {
    /// Create a builder with the root object type already registered as a
    /// public library class
    pub fn new() -> Self {
        let mut names = NameTable::new();
        let object = TypeName(names.intern(OBJECT_TYPE));
        let package = names.intern(NameTable::package_of(OBJECT_TYPE));
        let root = ClassDef {
            name: object,
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            access: ClassAccess::Public,
            is_interface: false,
            is_abstract: false,
            origin: ClassOrigin::Library,
            package,
        };

        Self {
            names,
            classes: vec![root],
            object,
            instantiated: None,
        }
    }

    pub fn object_type(&self) -> TypeName {
        self.object
    }

    pub fn type_name(&mut self, name: &str) -> TypeName {
        TypeName(self.names.intern(name))
    }

    pub fn signature(&mut self, name: &str, params: &[&str], ret: &str) -> MethodSignature {
        let name = self.names.intern(name);
        let params: Vec<TypeName> = params.iter().map(|p| self.type_name(p)).collect();
        let ret = self.type_name(ret);
        MethodSignature::new(name, params, ret)
    }

    /// Reference to a no-argument void method
    pub fn method_ref(&mut self, holder: &str, name: &str) -> MethodRef {
        let holder = self.type_name(holder);
        let signature = self.signature(name, &[], VOID_TYPE);
        MethodRef::new(holder, signature)
    }

    /// Start a concrete public program class extending the root object type
    pub fn class(&mut self, name: &str) -> ClassBuilder<'_> {
        ClassBuilder::new(self, name, false)
    }

    /// Start a public program interface
    pub fn interface(&mut self, name: &str) -> ClassBuilder<'_> {
        ClassBuilder::new(self, name, true)
    }

    /// Record an instantiation. Once any class is marked, only marked
    /// classes are treated as possible runtime receivers.
    pub fn mark_instantiated(&mut self, name: &str) {
        let ty = self.type_name(name);
        self.instantiated.get_or_insert_with(FxHashSet::default).insert(ty);
    }

    pub fn build(self) -> ClassHierarchy {
        ClassHierarchy::new(self.names, self.classes, self.object, self.instantiated)
    }
}

impl Default for HierarchyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent definition of a single class or interface
#[must_use = "call `finish` to register the class"]
pub struct ClassBuilder<'b> {
    builder: &'b mut HierarchyBuilder,
    class: ClassDef,
}

impl<'b> ClassBuilder<'b> {
    fn new(builder: &'b mut HierarchyBuilder, name: &str, is_interface: bool) -> Self {
        let ty = builder.type_name(name);
        let package = builder.names.intern(NameTable::package_of(name));
        let class = ClassDef {
            name: ty,
            superclass: Some(builder.object),
            interfaces: Vec::new(),
            methods: Vec::new(),
            access: ClassAccess::Public,
            is_interface,
            is_abstract: is_interface,
            origin: ClassOrigin::Program,
            package,
        };
        Self { builder, class }
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.class.superclass = Some(self.builder.type_name(superclass));
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        let ty = self.builder.type_name(interface);
        self.class.interfaces.push(ty);
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.class.is_abstract = true;
        self
    }

    pub fn package_private(mut self) -> Self {
        self.class.access = ClassAccess::PackagePrivate;
        self
    }

    pub fn library(mut self) -> Self {
        self.class.origin = ClassOrigin::Library;
        self
    }

    /// Public, concrete, no-argument void method (a default method on interfaces)
    pub fn method(self, name: &str) -> Self {
        self.method_with(name, &[], VOID_TYPE, MemberAccess::Public, false)
    }

    /// Public abstract no-argument void method
    pub fn abstract_method(self, name: &str) -> Self {
        self.method_with(name, &[], VOID_TYPE, MemberAccess::Public, true)
    }

    pub fn method_with(
        mut self,
        name: &str,
        params: &[&str],
        ret: &str,
        access: MemberAccess,
        is_abstract: bool,
    ) -> Self {
        let signature = self.builder.signature(name, params, ret);
        self.class.methods.push(MethodDef {
            signature,
            access,
            is_abstract,
            is_static: false,
        });
        self
    }

    pub fn finish(self) -> TypeName {
        let ty = self.class.name;
        self.builder.classes.push(self.class);
        ty
    }
}
