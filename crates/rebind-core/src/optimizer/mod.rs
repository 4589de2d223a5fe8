//! Optimization phase driver
//!
//! Passes run per method. Methods are processed in parallel on a rayon
//! pool; each method body is owned by exactly one worker for the whole
//! phase, while the hierarchy and oracle are shared read-only.

use crate::config::{OptimizationLevel, OptimizerConfig};
use crate::errors::{OptimizerError, Result};
use crate::hierarchy::MethodRef;
use crate::ir::{IrCode, ValueId};
use indexmap::IndexSet;
use rayon::prelude::*;
use tracing::{debug, info};

mod devirtualization;
pub use devirtualization::{DevirtualizationPass, DevirtualizationResult, RewriteStats};

mod type_narrowing;
pub use type_narrowing::TypeNarrowing;

mod whole_program_analysis;
pub use whole_program_analysis::WholeProgramAnalysis;

/// What one pass did to one method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodOutcome {
    pub changed: bool,
    pub affected_values: IndexSet<ValueId>,
}

/// A transformation applied to one method body at a time
pub trait MethodPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn min_level(&self) -> OptimizationLevel;

    fn run(&self, code: &mut IrCode) -> Result<MethodOutcome>;
}

#[derive(Debug, Clone)]
pub struct MethodReport {
    pub method: MethodRef,
    pub changed: bool,
    pub affected_values: IndexSet<ValueId>,
}

/// Merged result of a whole optimization phase
#[derive(Debug, Clone, Default)]
pub struct PhaseReport {
    pub methods: Vec<MethodReport>,
}

impl PhaseReport {
    pub fn changed_methods(&self) -> impl Iterator<Item = &MethodReport> + '_ {
        self.methods.iter().filter(|report| report.changed)
    }

    pub fn any_changed(&self) -> bool {
        self.methods.iter().any(|report| report.changed)
    }

    pub fn total_affected_values(&self) -> usize {
        self.methods.iter().map(|report| report.affected_values.len()).sum()
    }
}

/// Runs the configured passes over every method of the program
pub struct Optimizer {
    config: OptimizerConfig,
    passes: Vec<Box<dyn MethodPass>>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig, analysis: &WholeProgramAnalysis) -> Self {
        let devirtualization = DevirtualizationPass::new(
            analysis.oracle.clone(),
            config.devirtualization.clone(),
        );
        Self {
            config,
            passes: vec![Box::new(devirtualization)],
        }
    }

    pub fn add_pass(&mut self, pass: Box<dyn MethodPass>) {
        self.passes.push(pass);
    }

    /// Passes enabled at the configured level
    fn active_passes(&self) -> impl Iterator<Item = &dyn MethodPass> + '_ {
        let level = self.config.optimization_level;
        self.passes
            .iter()
            .map(|pass| pass.as_ref())
            .filter(move |pass| level > OptimizationLevel::O0 && pass.min_level() <= level)
    }

    pub fn pass_count(&self) -> usize {
        self.active_passes().count()
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.active_passes().map(|pass| pass.name()).collect()
    }

    /// Optimize every method. The first method failing its consistency
    /// check aborts the whole phase.
    pub fn optimize(&self, methods: &mut [IrCode]) -> Result<PhaseReport> {
        if self.pass_count() == 0 {
            info!(
                "No passes enabled at {:?}",
                self.config.optimization_level
            );
            return Ok(PhaseReport::default());
        }

        let reports = match self.config.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| OptimizerError::WorkerPool(e.to_string()))?
                .install(|| self.optimize_all(methods))?,
            None => self.optimize_all(methods)?,
        };

        let report = PhaseReport { methods: reports };
        info!(
            "Optimized {} methods, {} changed, {} affected values",
            report.methods.len(),
            report.changed_methods().count(),
            report.total_affected_values()
        );
        Ok(report)
    }

    fn optimize_all(&self, methods: &mut [IrCode]) -> Result<Vec<MethodReport>> {
        methods
            .par_iter_mut()
            .map(|code| self.optimize_method(code))
            .collect()
    }

    fn optimize_method(&self, code: &mut IrCode) -> Result<MethodReport> {
        let mut changed = false;
        let mut affected_values = IndexSet::new();
        for pass in self.active_passes() {
            let outcome = pass.run(code)?;
            if outcome.changed {
                debug!("Pass {} changed a method", pass.name());
            }
            changed |= outcome.changed;
            affected_values.extend(outcome.affected_values);
        }
        Ok(MethodReport {
            method: code.method().clone(),
            changed,
            affected_values,
        })
    }
}
