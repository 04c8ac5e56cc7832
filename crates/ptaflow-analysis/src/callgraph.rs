//! On-the-fly call graph
//!
//! Call targets are discovered while the fixpoint runs. The first time a
//! callee shows up at a call site, its CFG is spliced into the caller's:
//!
//! ```text
//!   caller block B (ends with the call)
//!     ├──> entry(F) ... exit(F) ──┐
//!     └──> continuation  <────────┘
//! ```
//!
//! and every block of the callee is queued again so the engine re-derives its
//! facts with the new predecessor.

use crate::dataflow::DataflowContext;
use ptaflow_core::{AnalysisConfig, BlockId, Callee, Error, FuncId, InstId, Program, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// How the analysis treats a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Compiler intrinsic, ignored
    Intrinsic,
    /// Direct call to an allocation primitive
    Alloc(FuncId),
    /// Direct call to any other function
    Direct(FuncId),
    /// Call through a function pointer
    Indirect,
}

impl CallKind {
    /// Calls that may introduce call-graph edges
    pub fn is_interesting(self) -> bool {
        matches!(self, CallKind::Direct(_) | CallKind::Indirect)
    }
}

/// Recognizes intrinsics and allocation primitives by name
#[derive(Debug, Clone)]
pub struct CallClassifier {
    intrinsic: Regex,
    allocators: BTreeSet<String>,
}

impl CallClassifier {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            intrinsic: config.intrinsic_regex()?,
            allocators: config.allocators.iter().cloned().collect(),
        })
    }

    pub fn is_intrinsic(&self, name: &str) -> bool {
        self.intrinsic.is_match(name)
    }

    pub fn is_allocator(&self, name: &str) -> bool {
        self.allocators.contains(name)
    }

    pub fn classify(&self, program: &Program, callee: &Callee) -> CallKind {
        match *callee {
            Callee::Indirect(_) => CallKind::Indirect,
            Callee::Direct(func) => {
                let name = &program.function(func).name;
                if self.is_intrinsic(name) {
                    CallKind::Intrinsic
                } else if self.is_allocator(name) {
                    CallKind::Alloc(func)
                } else {
                    CallKind::Direct(func)
                }
            }
        }
    }
}

/// What is known about one call instruction
#[derive(Debug, Clone, Default)]
pub struct CallSite {
    pub line: u32,
    /// Callees recorded so far
    pub targets: BTreeSet<FuncId>,
    /// Block receiving control after the call, fixed on first resolution
    pub continuation: Option<BlockId>,
}

/// One resolved call edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEdge {
    pub site: InstId,
    pub line: u32,
    pub caller: FuncId,
    pub callee: FuncId,
}

/// Call sites and the targets resolved for them
#[derive(Debug, Default)]
pub struct CallGraph {
    sites: BTreeMap<InstId, CallSite>,
    callers: BTreeMap<InstId, FuncId>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn site(&self, call: InstId) -> Option<&CallSite> {
        self.sites.get(&call)
    }

    pub fn sites(&self) -> impl Iterator<Item = (InstId, &CallSite)> {
        self.sites.iter().map(|(id, site)| (*id, site))
    }

    /// Every resolved edge, ordered by call site then callee
    pub fn edges(&self) -> Vec<CallEdge> {
        let mut edges = Vec::new();
        for (site, record) in &self.sites {
            let Some(&caller) = self.callers.get(site) else {
                continue;
            };
            for &callee in &record.targets {
                edges.push(CallEdge {
                    site: *site,
                    line: record.line,
                    caller,
                    callee,
                });
            }
        }
        edges
    }

    pub fn num_edges(&self) -> usize {
        self.sites.values().map(|s| s.targets.len()).sum()
    }

    /// Record `callee` at the call `call` ending `block` and splice its CFG
    /// in. Returns false if the pair was already known.
    pub fn resolve(
        &mut self,
        cx: &mut DataflowContext<'_>,
        block: BlockId,
        call: InstId,
        callee: FuncId,
    ) -> Result<bool> {
        let caller_block = cx.program.block(block);
        if caller_block.last_inst() != Some(call) {
            return Err(Error::CallNotAtBlockEnd {
                block: caller_block.label.clone(),
                inst: call.0,
            });
        }
        let caller = caller_block.func;

        let line = cx.program.inst(call).line;
        let site = self.sites.entry(call).or_insert_with(|| CallSite {
            line,
            ..CallSite::default()
        });
        if !site.targets.insert(callee) {
            return Ok(false);
        }
        self.callers.insert(call, caller);

        let target = cx.program.function(callee);
        let (Some(entry), Some(exit)) = (target.entry(), target.exit()) else {
            tracing::debug!(callee = %target.name, line, "callee has no body, not stitched");
            return Ok(true);
        };

        let continuation = match site.continuation {
            Some(block) => block,
            None => {
                let block = continuation_of(cx, block, call)?;
                site.continuation = Some(block);
                block
            }
        };

        cx.program.add_succ(block, entry);
        cx.program.add_succ(exit, continuation);

        let callee_blocks = cx.program.blocks_of(callee).to_vec();
        cx.worklist.extend(callee_blocks);
        cx.worklist.push(continuation);

        tracing::debug!(
            caller = %cx.program.function(caller).name,
            callee = %cx.program.function(callee).name,
            line,
            "stitched call edge"
        );
        Ok(true)
    }
}

/// The block that follows the call `call` ending `block`.
///
/// After normalization this is the only successor of `block` within its
/// function, starting right after the call. When the call was the final
/// instruction of its block no such block exists, so an empty one is split
/// off the end of `block`; it takes over the successors and exit status.
fn continuation_of(cx: &mut DataflowContext<'_>, block: BlockId, call: InstId) -> Result<BlockId> {
    let program = &*cx.program;
    let func = program.block(block).func;
    let mut local = program
        .block(block)
        .succs()
        .iter()
        .copied()
        .filter(|s| program.block(*s).func == func);

    if let (Some(succ), None) = (local.next(), local.next()) {
        if program.block(succ).begin() == InstId(call.0 + 1) {
            return Ok(succ);
        }
    }

    let end = program.block(block).end();
    let continuation = cx.program.split(block, end)?;
    cx.worklist.push(continuation);
    tracing::debug!(
        block = %cx.program.block(block).label,
        continuation = %cx.program.block(continuation).label,
        "materialized call continuation"
    );
    Ok(continuation)
}
