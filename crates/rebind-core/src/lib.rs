pub mod config;
pub mod errors;
pub mod hierarchy;
pub mod ir;
pub mod names;
pub mod optimizer;
pub mod resolution;
pub mod types;

pub use config::{DevirtualizationOptions, OptimizationLevel, OptimizerConfig};
pub use errors::{ConsistencyError, OptimizerError};
pub use hierarchy::{ClassHierarchy, HierarchyBuilder, MethodRef, TypeName};
pub use ir::{DominatorTree, IrBuilder, IrCode};
pub use names::{NameTable, Symbol};
pub use optimizer::{
    DevirtualizationPass, MethodPass, Optimizer, PhaseReport, WholeProgramAnalysis,
};
pub use resolution::{DispatchKind, ResolutionOracle, ResolutionResult};
pub use types::{ClassType, Nullability, TypeElement};
