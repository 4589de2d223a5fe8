//! Whole-program analysis infrastructure for parallel optimization
//!
//! Analysis is built once sequentially, then shared (read-only) across the
//! per-method passes via Arc.

use crate::hierarchy::ClassHierarchy;
use crate::resolution::ResolutionOracle;
use std::sync::Arc;
use tracing::info;

/// Thread-safe whole-program analysis results
///
/// Cloning is cheap, every worker gets its own handle to the same hierarchy
/// and the same memoizing oracle.
#[derive(Clone, Debug)]
pub struct WholeProgramAnalysis {
    pub hierarchy: Arc<ClassHierarchy>,
    pub oracle: Arc<ResolutionOracle>,
}

impl WholeProgramAnalysis {
    pub fn build(hierarchy: ClassHierarchy) -> Self {
        Self::from_shared(Arc::new(hierarchy))
    }

    pub fn from_shared(hierarchy: Arc<ClassHierarchy>) -> Self {
        info!(
            "Whole-program analysis over {} classes (instantiation tracking: {})",
            hierarchy.len(),
            hierarchy.tracks_instantiations()
        );
        let oracle = Arc::new(ResolutionOracle::new(hierarchy.clone()));
        Self { hierarchy, oracle }
    }
}
