//! Points-to transfer functions
//!
//! Flow-sensitive semantics per instruction:
//!
//! - Load `r = *p`: pts(r) is recomputed from scratch (strong update)
//! - Store `*p = v`: pts(p) = {v} (strong update)
//! - Call `f(a0..an)`: resolves targets, stitches new callees into the CFG
//!   and unions pts(ai) into the matching formal parameter (weak update, one
//!   state per callee)

use crate::callgraph::{CallClassifier, CallGraph, CallKind};
use crate::dataflow::{DataflowContext, DataflowVisitor};
use crate::pointer::{PointsToSet, PointsToStore};
use crate::report::CallReport;
use ptaflow_core::{BlockId, Callee, FuncId, InstId, InstKind, LoadMode, Result, ValueId};

/// The points-to analysis as a dataflow visitor
#[derive(Debug)]
pub struct PointsToVisitor {
    classifier: CallClassifier,
    load_mode: LoadMode,
    pub call_graph: CallGraph,
    pub report: CallReport,
}

impl PointsToVisitor {
    pub fn new(classifier: CallClassifier, load_mode: LoadMode) -> Self {
        Self {
            classifier,
            load_mode,
            call_graph: CallGraph::new(),
            report: CallReport::new(),
        }
    }

    fn transfer_load(&self, store: &mut PointsToStore, dest: ValueId, ptr: ValueId) {
        let loaded: PointsToSet = match self.load_mode {
            LoadMode::Dereference => {
                let pointees = store.get(ptr).clone();
                let mut loaded = PointsToSet::new();
                for pointee in pointees {
                    loaded.extend(store.get(pointee).iter().copied());
                }
                loaded
            }
            LoadMode::Contents => store.get(ptr).clone(),
        };
        store.kill(dest);
        store.add_set(dest, &loaded);
    }

    fn transfer_store(&self, store: &mut PointsToStore, ptr: ValueId, value: ValueId) {
        store.kill(ptr);
        store.add_edge(ptr, value);
    }

    fn transfer_call(
        &mut self,
        cx: &mut DataflowContext<'_>,
        block: BlockId,
        inst: InstId,
        callee: Callee,
        args: &[ValueId],
        store: &mut PointsToStore,
    ) -> Result<()> {
        let line = cx.program.inst(inst).line;

        let candidates: Vec<FuncId> = match self.classifier.classify(cx.program, &callee) {
            CallKind::Intrinsic => return Ok(()),
            CallKind::Alloc(func) => {
                // Heap objects are not modeled beyond the call site label
                self.report.record(line, &cx.program.function(func).name);
                return Ok(());
            }
            CallKind::Direct(func) => vec![func],
            CallKind::Indirect => match callee {
                Callee::Indirect(ptr) => store
                    .get(ptr)
                    .iter()
                    .filter_map(|loc| cx.program.value(*loc).as_function())
                    .collect(),
                Callee::Direct(func) => vec![func],
            },
        };

        if candidates.is_empty() {
            tracing::trace!(line, "no call targets known yet");
            return Ok(());
        }

        for func in candidates {
            self.report.record(line, &cx.program.function(func).name);
            self.call_graph.resolve(cx, block, inst, func)?;

            let formals = cx.program.function(func).params.clone();
            for (actual, formal) in args.iter().zip(formals) {
                if !cx.program.value(*actual).is_pointer {
                    continue;
                }
                let pointees = store.get(*actual).clone();
                store.add_set(formal, &pointees);
            }
        }
        Ok(())
    }
}

impl DataflowVisitor for PointsToVisitor {
    type Value = PointsToStore;

    fn merge(&self, dest: &mut PointsToStore, src: &PointsToStore) {
        dest.merge(src);
    }

    fn transfer_inst(
        &mut self,
        cx: &mut DataflowContext<'_>,
        block: BlockId,
        inst: InstId,
        store: &mut PointsToStore,
    ) -> Result<()> {
        match &cx.program.inst(inst).kind {
            InstKind::Load { dest, ptr } => {
                self.transfer_load(store, *dest, *ptr);
                Ok(())
            }
            InstKind::Store { ptr, value } => {
                self.transfer_store(store, *ptr, *value);
                Ok(())
            }
            InstKind::Call { callee, args, .. } => {
                let (callee, args) = (*callee, args.clone());
                self.transfer_call(cx, block, inst, callee, &args, store)
            }
            InstKind::Other => Ok(()),
        }
    }
}
