//! ptaflow Analysis Engine
//!
//! Flow-sensitive, context-insensitive points-to analysis with on-the-fly
//! call graph construction:
//! - Generic worklist dataflow engine
//! - Points-to store and transfer functions
//! - Call-site normalization of the CFG
//! - Interprocedural stitching of resolved callees
//! - Per-line call target report

pub mod callgraph;
pub mod dataflow;
pub mod normalize;
pub mod pointer;
pub mod report;
pub mod transfer;

use callgraph::{CallClassifier, CallGraph};
use dataflow::{DataflowResult, DataflowStats, FixpointEngine};
use pointer::{PointsToSet, PointsToStore};
use ptaflow_core::{AnalysisConfig, Error, FuncId, Program, Result, ValueId};
use report::CallReport;
use serde::Serialize;
use std::collections::BTreeSet;
use transfer::PointsToVisitor;

/// Analysis result
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// Resolved callees per source line
    pub report: CallReport,
    /// In/out points-to store of every visited block
    pub states: DataflowResult<PointsToStore>,
    /// Call sites and stitched edges
    pub call_graph: CallGraph,
    /// Fixpoint counters, summed over all entries
    pub stats: DataflowStats,
    /// Blocks created by call-site normalization
    pub splits: usize,
}

impl AnalysisResult {
    /// Points-to set of `value` at the exit of `func`
    pub fn exit_set(&self, program: &Program, func: FuncId, value: ValueId) -> Option<&PointsToSet> {
        let exit = program.function(func).exit()?;
        self.states.get(&exit)?.output.lookup(value)
    }

    /// Names of what `value` (resolved in the scope of `func`) may point to
    /// when `func` returns. Values never seen by the analysis point nowhere.
    pub fn points_to_at_exit(&self, program: &Program, func: &str, value: &str) -> Result<BTreeSet<String>> {
        let func_id = program.require_function(func)?;
        let value_id = program
            .find_value(Some(func_id), value)
            .ok_or_else(|| Error::UnknownValue(format!("{}::{}", func, value)))?;
        Ok(self
            .exit_set(program, func_id, value_id)
            .map(|set| names(program, set))
            .unwrap_or_default())
    }

    /// Serializable overview for machine consumption
    pub fn summary(&self, program: &Program) -> Summary {
        let edges = self
            .call_graph
            .edges()
            .into_iter()
            .map(|edge| EdgeSummary {
                caller: program.function(edge.caller).name.clone(),
                callee: program.function(edge.callee).name.clone(),
                line: edge.line,
            })
            .collect();
        Summary {
            calls: self.report.clone(),
            edges,
            visits: self.stats.visits,
            updates: self.stats.updates,
            splits: self.splits,
        }
    }
}

/// JSON shape of an [`AnalysisResult`]
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub calls: CallReport,
    pub edges: Vec<EdgeSummary>,
    pub visits: usize,
    pub updates: usize,
    pub splits: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeSummary {
    pub caller: String,
    pub callee: String,
    pub line: u32,
}

/// Render a points-to set with value names
pub fn names(program: &Program, set: &PointsToSet) -> BTreeSet<String> {
    set.iter().map(|v| program.value_name(*v).to_string()).collect()
}

/// Main analyzer
pub struct Analyzer {
    config: AnalysisConfig,
    classifier: CallClassifier,
}

impl Analyzer {
    /// Create a new analyzer
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            classifier: CallClassifier::new(config)?,
        })
    }

    pub fn classifier(&self) -> &CallClassifier {
        &self.classifier
    }

    /// Split blocks after call sites. Idempotent.
    pub fn normalize(&self, program: &mut Program) -> Result<usize> {
        normalize::split_call_sites(program, &self.classifier)
    }

    /// Normalize `program`, then run the forward fixpoint from each entry in
    /// turn. All runs share one state map and one call graph.
    pub fn run(&self, program: &mut Program, entries: &[FuncId]) -> Result<AnalysisResult> {
        let splits = self.normalize(program)?;

        let mut visitor = PointsToVisitor::new(self.classifier.clone(), self.config.load_mode);
        let mut engine = FixpointEngine::new().with_visit_limit(self.config.max_block_visits);
        let mut states = DataflowResult::new();
        let mut stats = DataflowStats::default();
        let init = PointsToStore::new();

        for &entry in entries {
            let run = engine.forward(program, entry, &mut visitor, &mut states, &init)?;
            tracing::info!(
                entry = %program.function(entry).name,
                visits = run.visits,
                updates = run.updates,
                "fixpoint reached"
            );
            stats.visits += run.visits;
            stats.updates += run.updates;
        }

        Ok(AnalysisResult {
            report: visitor.report,
            states,
            call_graph: visitor.call_graph,
            stats,
            splits,
        })
    }

    /// Analyze from the function named `entry`
    pub fn analyze(&self, program: &mut Program, entry: &str) -> Result<AnalysisResult> {
        let entry = program.require_function(entry)?;
        self.run(program, &[entry])
    }

    /// Analyze from every function that has a body
    pub fn analyze_all(&self, program: &mut Program) -> Result<AnalysisResult> {
        let entries: Vec<FuncId> = program
            .functions()
            .filter(|(_, function)| !function.is_declaration())
            .map(|(id, _)| id)
            .collect();
        self.run(program, &entries)
    }
}
