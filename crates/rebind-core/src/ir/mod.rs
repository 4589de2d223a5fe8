//! Per-method control-flow graph in single-assignment form
//!
//! Blocks, instructions and values live in dense arenas owned by [`IrCode`]
//! and are addressed by index. Removing an instruction leaves a tombstone
//! in the arena so ids stay stable for the lifetime of the method.

mod block;
mod builder;
mod code;
mod dominators;
mod instruction;
mod printer;
mod value;
mod verify;

pub use block::{BasicBlock, CatchHandler, Phi};
pub use builder::{BlockBuilder, IrBuilder};
pub use code::{IrCode, ReplacedUses};
pub use dominators::DominatorTree;
pub use instruction::{Instruction, InstructionKind, Invoke};
pub use printer::IrDisplay;
pub use value::{LocalInfo, Value, ValueDefinition};
pub use verify::verify_ssa;

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Basic block within one method
    BlockId,
    "B"
);
define_id!(
    /// Instruction within one method
    InstrId,
    "i"
);
define_id!(
    /// SSA value within one method
    ValueId,
    "v"
);
