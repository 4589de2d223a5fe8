use super::{BlockId, InstrId, ValueId};
use crate::types::{ClassType, TypeElement};
use indexmap::IndexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDefinition {
    /// Created but not yet attached to an instruction or phi
    Undefined,
    Instruction(InstrId),
    Phi(BlockId),
}

/// Debug information tying a value to a source-level local variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInfo {
    pub name: Box<str>,
}

#[derive(Debug, Clone)]
pub struct Value {
    pub id: ValueId,
    /// Statically inferred type
    pub ty: TypeElement,
    /// Extra knowledge about the runtime class, when an analysis proved more
    /// than the static type says
    pub dynamic_type: Option<ClassType>,
    pub definition: ValueDefinition,
    /// Instructions reading this value, in insertion order
    pub users: IndexSet<InstrId>,
    /// Phis reading this value, by their output value
    pub phi_users: IndexSet<ValueId>,
    pub local_info: Option<LocalInfo>,
}

impl Value {
    pub(crate) fn new(id: ValueId, ty: TypeElement) -> Self {
        Self {
            id,
            ty,
            dynamic_type: None,
            definition: ValueDefinition::Undefined,
            users: IndexSet::new(),
            phi_users: IndexSet::new(),
            local_info: None,
        }
    }

    /// The most precise receiver type known for dispatch
    pub fn best_known_type(&self) -> TypeElement {
        match self.dynamic_type {
            Some(dynamic) => TypeElement::Reference(dynamic),
            None => self.ty,
        }
    }

    pub fn has_local_info(&self) -> bool {
        self.local_info.is_some()
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.definition, ValueDefinition::Phi(_))
    }

    pub fn has_users(&self) -> bool {
        !self.users.is_empty() || !self.phi_users.is_empty()
    }
}
