use std::time::Duration;

use crate::ast::{Module, ResolvablesIndex};

use super::error::SemanticError;

/// What the compilation is ultimately producing. The pre-codegen
/// validator keys its checks off this.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompileMode {
    #[default]
    Binary,
    Library,
    Ast,
    Ir,
}

/// Configuration handed in by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompilerConfig {
    pub mode: CompileMode,
    /// Disable tail-call detection entirely.
    pub no_tco: bool,
}

/// Per-phase bookkeeping recorded by the pipeline runner.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PhaseStat {
    pub phase: &'static str,
    pub duration: Duration,
    pub members: usize,
    pub errors_added: usize,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct PhaseMetrics {
    stats: Vec<PhaseStat>,
}

impl PhaseMetrics {
    pub fn record(&mut self, stat: PhaseStat) {
        self.stats.push(stat);
    }

    pub fn stats(&self) -> &[PhaseStat] {
        &self.stats
    }

    pub fn phases_run(&self) -> usize {
        self.stats.len()
    }
}

/// The value threaded through the pipeline: the module being transformed,
/// the accumulated errors, the driver configuration and per-phase
/// metrics. The resolvables index lives on the module itself; the
/// accessors here are the contract surface promised to the IR emitter.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SemanticPhaseState {
    pub module: Module,
    pub errors: Vec<SemanticError>,
    pub config: CompilerConfig,
    pub metrics: PhaseMetrics,
}

impl SemanticPhaseState {
    pub fn new(module: Module, config: CompilerConfig) -> SemanticPhaseState {
        SemanticPhaseState {
            module,
            errors: vec![],
            config,
            metrics: PhaseMetrics::default(),
        }
    }

    pub fn resolvables(&self) -> &ResolvablesIndex {
        &self.module.resolvables
    }

    pub fn resolvables_mut(&mut self) -> &mut ResolvablesIndex {
        &mut self.module.resolvables
    }

    pub fn push_error(&mut self, error: SemanticError) {
        self.errors.push(error);
    }

    pub fn primary_errors(&self) -> impl Iterator<Item = &SemanticError> {
        self.errors.iter().filter(|e| e.is_primary())
    }

    pub fn has_primary_errors(&self) -> bool {
        self.primary_errors().next().is_some()
    }
}
