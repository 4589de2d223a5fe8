use crate::names::{NameTable, Symbol};
use std::fmt;
use std::sync::Arc;

/// A reference type, identified by its interned fully-qualified name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(pub Symbol);

impl TypeName {
    pub fn symbol(self) -> Symbol {
        self.0
    }
}

/// Name, parameter types and return type of a method, independent of
/// the class declaring it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: Symbol,
    pub params: Arc<[TypeName]>,
    pub ret: TypeName,
}

impl MethodSignature {
    pub fn new(name: Symbol, params: impl Into<Arc<[TypeName]>>, ret: TypeName) -> Self {
        Self {
            name,
            params: params.into(),
            ret,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A symbolic method reference: declaring class plus signature.
///
/// Two references with the same signature on different holders are
/// different references even when they resolve to the same definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub holder: TypeName,
    pub signature: MethodSignature,
}

impl MethodRef {
    pub fn new(holder: TypeName, signature: MethodSignature) -> Self {
        Self { holder, signature }
    }

    pub fn name(&self) -> Symbol {
        self.signature.name
    }

    /// Same signature, different holder
    pub fn with_holder(&self, holder: TypeName) -> Self {
        Self {
            holder,
            signature: self.signature.clone(),
        }
    }

    pub fn display<'a>(&'a self, names: &'a NameTable) -> MethodRefDisplay<'a> {
        MethodRefDisplay { method: self, names }
    }
}

pub struct MethodRefDisplay<'a> {
    method: &'a MethodRef,
    names: &'a NameTable,
}

impl fmt::Display for MethodRefDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names;
        let signature = &self.method.signature;
        write!(
            f,
            "{}.{}(",
            names.resolve(self.method.holder.0),
            names.resolve(signature.name)
        )?;
        for (i, param) in signature.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", names.resolve(param.0))?;
        }
        write!(f, ")")
    }
}
