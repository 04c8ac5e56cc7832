//! Result reporting
//!
//! Text renderings of the per-line call report, per-block states and the
//! (normalized, stitched) CFG.

use crate::callgraph::CallGraph;
use crate::dataflow::DataflowResult;
use crate::pointer::PointsToStore;
use ptaflow_core::Program;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};

/// Source line → names of the functions called there
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CallReport {
    lines: BTreeMap<u32, BTreeSet<String>>,
}

impl CallReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name` to the callees of `line`, return true if it was new
    pub fn record(&mut self, line: u32, name: &str) -> bool {
        let names = self.lines.entry(line).or_default();
        if names.contains(name) {
            return false;
        }
        names.insert(name.to_string())
    }

    pub fn targets(&self, line: u32) -> Option<&BTreeSet<String>> {
        self.lines.get(&line)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BTreeSet<String>)> {
        self.lines.iter().map(|(line, names)| (*line, names))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for CallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, names) in self.iter() {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            writeln!(f, "line {}: {}", line, names.join(", "))?;
        }
        Ok(())
    }
}

/// In/out state of every analyzed block, grouped by function
pub fn render_states(program: &Program, states: &DataflowResult<PointsToStore>) -> String {
    let mut out = String::new();
    for (func, function) in program.functions() {
        let analyzed: Vec<_> = function
            .blocks()
            .iter()
            .filter_map(|block| states.get(block).map(|state| (*block, state)))
            .collect();
        if analyzed.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} ({})", function.name, func);
        for (block, state) in analyzed {
            let _ = writeln!(out, "  {} [{}]", program.block(block).label, block);
            let _ = writeln!(out, "    in:  {}", state.input.display(program));
            let _ = writeln!(out, "    out: {}", state.output.display(program));
        }
    }
    out
}

/// Blocks of every defined function with their instruction lines and
/// successors, cross-function edges included
pub fn render_cfg(program: &Program) -> String {
    let mut out = String::new();
    for (_, function) in program.functions() {
        if function.is_declaration() {
            let _ = writeln!(out, "declare {}", function.name);
            continue;
        }
        let _ = writeln!(out, "fn {}", function.name);
        for &block in function.blocks() {
            let data = program.block(block);
            let lines: Vec<String> = data
                .insts()
                .map(|inst| program.inst(inst).line.to_string())
                .collect();
            let succs: Vec<String> = data
                .succs()
                .iter()
                .map(|succ| {
                    let target = program.block(*succ);
                    if target.func == data.func {
                        target.label.clone()
                    } else {
                        format!("{}::{}", program.function(target.func).name, target.label)
                    }
                })
                .collect();
            let exit = if data.is_exit() { " (exit)" } else { "" };
            let _ = writeln!(
                out,
                "  {}{}: lines [{}] -> [{}]",
                data.label,
                exit,
                lines.join(", "),
                succs.join(", ")
            );
        }
    }
    out
}

/// `caller -> callee @ line N`, one per resolved edge
pub fn render_call_edges(program: &Program, call_graph: &CallGraph) -> String {
    let mut out = String::new();
    for edge in call_graph.edges() {
        let _ = writeln!(
            out,
            "{} -> {} @ line {}",
            program.function(edge.caller).name,
            program.function(edge.callee).name,
            edge.line
        );
    }
    out
}
