//! Dispatch resolution
//!
//! Encodes the runtime's method selection rules (override lookup up the
//! superclass chain, maximally-specific default methods, package-private
//! override boundaries, accessibility) as a pure function over the
//! immutable class hierarchy.

mod oracle;

pub use oracle::ResolutionOracle;

use crate::hierarchy::{ClassDef, MethodDef, MethodRef};
use indexmap::IndexSet;

/// How a call site selects its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    Virtual,
    Interface,
    Super,
}

impl DispatchKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            DispatchKind::Virtual => "invoke-virtual",
            DispatchKind::Interface => "invoke-interface",
            DispatchKind::Super => "invoke-super",
        }
    }
}

/// Outcome of resolving a call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    /// Exactly one concrete method executes at run time
    SingleTarget(MethodRef),
    /// Nothing reachable, e.g. an unimplemented abstract method, an
    /// inaccessible target, or a receiver without usable type information
    NoTarget,
    /// Several targets remain possible, e.g. conflicting default methods or
    /// multiple overrides below a bounded receiver type
    Ambiguous,
}

impl ResolutionResult {
    pub fn single_target(&self) -> Option<&MethodRef> {
        match self {
            ResolutionResult::SingleTarget(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, ResolutionResult::SingleTarget(_))
    }
}

/// A method definition found by symbolic resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolvedMethod<'h> {
    pub holder: &'h ClassDef,
    pub definition: &'h MethodDef,
}

impl ResolvedMethod<'_> {
    pub fn method_ref(&self) -> MethodRef {
        self.holder.method_ref(self.definition)
    }
}

/// The finite set of methods virtual dispatch may select for a bounded
/// receiver type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTargets {
    pub targets: IndexSet<MethodRef>,
    /// False when the receiver bound may have subclasses this program does
    /// not see (library types), or when some receiver class has no unique
    /// target
    pub complete: bool,
}

impl DispatchTargets {
    pub fn single(&self) -> Option<&MethodRef> {
        if self.complete && self.targets.len() == 1 {
            self.targets.first()
        } else {
            None
        }
    }
}
