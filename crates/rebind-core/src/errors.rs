use crate::ir::{BlockId, InstrId, ValueId};
use thiserror::Error;

/// A violated structural invariant of a method body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("{value} is defined more than once")]
    DuplicateDefinition { value: ValueId },

    #[error("{instruction} uses undefined value {value}")]
    UndefinedOperand { instruction: InstrId, value: ValueId },

    #[error("phi {phi} reads undefined value {value}")]
    UndefinedPhiOperand { phi: ValueId, value: ValueId },

    #[error("use of {value} in {block} is not dominated by its definition")]
    UseNotDominated { value: ValueId, block: BlockId },

    #[error("user list of {value} is out of date for {instruction}")]
    StaleUsers { value: ValueId, instruction: InstrId },

    #[error("{block} has catch handlers and {count} throwing instructions")]
    MultipleThrowingInstructions { block: BlockId, count: usize },

    #[error("edge {from} -> {to} is not recorded on both ends")]
    AsymmetricEdge { from: BlockId, to: BlockId },

    #[error("phi {value} in {block} has {operands} operands for {predecessors} predecessors")]
    PhiArity {
        value: ValueId,
        block: BlockId,
        operands: usize,
        predecessors: usize,
    },

    #[error("{block} does not end with a terminator")]
    MissingTerminator { block: BlockId },

    #[error("{instruction} terminates {block} before its last instruction")]
    MisplacedTerminator { instruction: InstrId, block: BlockId },
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Internal error: a rewrite left the method in an invalid state
    #[error("Inconsistent SSA in {method} after optimization: {}", summarize(.violations))]
    InconsistentSsa {
        method: String,
        violations: Vec<ConsistencyError>,
    },
}

fn summarize(violations: &[ConsistencyError]) -> String {
    match violations {
        [] => "no violations recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconsistent_ssa_message() {
        let error = OptimizerError::InconsistentSsa {
            method: "A.foo()".to_string(),
            violations: vec![
                ConsistencyError::DuplicateDefinition { value: ValueId(3) },
                ConsistencyError::MissingTerminator { block: BlockId(1) },
            ],
        };

        assert_eq!(
            error.to_string(),
            "Inconsistent SSA in A.foo() after optimization: v3 is defined more than once (and 1 more)"
        );
    }
}
