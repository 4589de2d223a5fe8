use super::references::{MethodRef, MethodSignature, TypeName};
use crate::names::Symbol;

/// Visibility of a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassAccess {
    Public,
    PackagePrivate,
}

/// Visibility of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberAccess {
    Public,
    Protected,
    PackagePrivate,
    Private,
}

/// Whether a class belongs to the program being optimized or to a library
/// it links against. Library classes may not be rewritten or targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassOrigin {
    Program,
    Library,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub signature: MethodSignature,
    pub access: MemberAccess,
    pub is_abstract: bool,
    pub is_static: bool,
}

impl MethodDef {
    /// Participates in virtual dispatch
    pub fn is_virtual(&self) -> bool {
        !self.is_static && self.access != MemberAccess::Private
    }
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: TypeName,
    /// Absent only for the root object type (or unknown library roots)
    pub superclass: Option<TypeName>,
    pub interfaces: Vec<TypeName>,
    pub methods: Vec<MethodDef>,
    pub access: ClassAccess,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub origin: ClassOrigin,
    pub package: Symbol,
}

impl ClassDef {
    pub fn is_program_class(&self) -> bool {
        self.origin == ClassOrigin::Program
    }

    /// Concrete classes can be instantiated and dispatched on
    pub fn is_concrete(&self) -> bool {
        !self.is_interface && !self.is_abstract
    }

    pub fn lookup_method(&self, signature: &MethodSignature) -> Option<&MethodDef> {
        self.methods.iter().find(|m| &m.signature == signature)
    }

    pub fn method_ref(&self, method: &MethodDef) -> MethodRef {
        MethodRef::new(self.name, method.signature.clone())
    }
}
