//! Worklist fixpoint engine
//!
//! Generic forward dataflow over the blocks of a [`Program`]. The analysis is
//! defined by a [`DataflowVisitor`]: a lattice value, a merge and a transfer
//! function per instruction.
//!
//! Transfer functions see the program and the worklist through a
//! [`DataflowContext`] and may grow both while the engine drains the
//! worklist: new edges, new blocks and new pending work are picked up by the
//! same loop. Blocks that appear mid-run start from the initial value.
//!
//! The caller must make sure `merge` and the transfer functions are monotone;
//! otherwise the loop may not terminate (see
//! [`FixpointEngine::with_visit_limit`]).

use ptaflow_core::{BlockId, Error, FuncId, InstId, Program, Result};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Pending blocks. FIFO, without duplicates.
#[derive(Debug, Default)]
pub struct Worklist {
    queue: VecDeque<BlockId>,
    pending: HashSet<BlockId>,
}

impl Worklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `block` unless it is already pending
    pub fn push(&mut self, block: BlockId) -> bool {
        if self.pending.insert(block) {
            self.queue.push_back(block);
            true
        } else {
            false
        }
    }

    pub fn extend(&mut self, blocks: impl IntoIterator<Item = BlockId>) {
        for block in blocks {
            self.push(block);
        }
    }

    pub fn pop(&mut self) -> Option<BlockId> {
        let block = self.queue.pop_front()?;
        self.pending.remove(&block);
        Some(block)
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.pending.contains(&block)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// What a transfer function may touch while the engine runs
pub struct DataflowContext<'a> {
    pub program: &'a mut Program,
    pub worklist: &'a mut Worklist,
}

/// Iteration direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A dataflow analysis
pub trait DataflowVisitor {
    /// Lattice value attached to block boundaries
    type Value: Clone + PartialEq;

    /// `dest = dest ⊔ src`
    fn merge(&self, dest: &mut Self::Value, src: &Self::Value);

    /// Apply one instruction of `block` to `value`
    fn transfer_inst(
        &mut self,
        cx: &mut DataflowContext<'_>,
        block: BlockId,
        inst: InstId,
        value: &mut Self::Value,
    ) -> Result<()>;

    /// Apply a whole block. The instruction range is read once up front, so
    /// splits performed by transfer functions do not disturb the iteration.
    fn transfer_block(
        &mut self,
        cx: &mut DataflowContext<'_>,
        block: BlockId,
        value: &mut Self::Value,
        direction: Direction,
    ) -> Result<()> {
        let insts: Vec<InstId> = cx.program.block(block).insts().collect();
        match direction {
            Direction::Forward => {
                for inst in insts {
                    self.transfer_inst(cx, block, inst, value)?;
                }
            }
            Direction::Backward => {
                for inst in insts.into_iter().rev() {
                    self.transfer_inst(cx, block, inst, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Value at a block's entry and exit
#[derive(Debug, Clone, PartialEq)]
pub struct BlockState<T> {
    pub input: T,
    pub output: T,
}

impl<T: Clone> BlockState<T> {
    fn new(init: &T) -> Self {
        Self {
            input: init.clone(),
            output: init.clone(),
        }
    }
}

/// Per-block results of a dataflow run
pub type DataflowResult<T> = BTreeMap<BlockId, BlockState<T>>;

/// Counters of one fixpoint run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataflowStats {
    /// Blocks popped from the worklist
    pub visits: usize,
    /// Visits whose output changed
    pub updates: usize,
}

/// Drives a [`DataflowVisitor`] to a fixed point
#[derive(Debug, Default)]
pub struct FixpointEngine {
    worklist: Worklist,
    max_visits: Option<usize>,
}

impl FixpointEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`Error::VisitLimitExceeded`] instead of looping forever
    pub fn with_visit_limit(mut self, limit: Option<usize>) -> Self {
        self.max_visits = limit;
        self
    }

    /// Compute a forward fixed point starting from the blocks of `func`.
    ///
    /// Existing entries of `result` are kept and refined, so several runs may
    /// share one result map.
    pub fn forward<V: DataflowVisitor>(
        &mut self,
        program: &mut Program,
        func: FuncId,
        visitor: &mut V,
        result: &mut DataflowResult<V::Value>,
        init: &V::Value,
    ) -> Result<DataflowStats> {
        let function = program.function(func);
        if function.is_declaration() {
            return Err(Error::MissingBody(function.name.clone()));
        }
        for &block in function.blocks() {
            result.entry(block).or_insert_with(|| BlockState::new(init));
            self.worklist.push(block);
        }

        let mut stats = DataflowStats::default();
        while let Some(block) = self.worklist.pop() {
            stats.visits += 1;
            if let Some(limit) = self.max_visits {
                if stats.visits > limit {
                    return Err(Error::VisitLimitExceeded(limit));
                }
            }

            let mut value = result
                .entry(block)
                .or_insert_with(|| BlockState::new(init))
                .input
                .clone();
            for pred in program.block(block).preds() {
                if let Some(state) = result.get(pred) {
                    visitor.merge(&mut value, &state.output);
                }
            }

            let state = result.entry(block).or_insert_with(|| BlockState::new(init));
            state.input = value.clone();

            let mut cx = DataflowContext {
                program: &mut *program,
                worklist: &mut self.worklist,
            };
            visitor.transfer_block(&mut cx, block, &mut value, Direction::Forward)?;

            // If outgoing value changed, propagate it along the CFG
            let state = result.entry(block).or_insert_with(|| BlockState::new(init));
            if state.output == value {
                continue;
            }
            state.output = value;
            stats.updates += 1;
            tracing::trace!(%block, "output changed");

            for succ in program.block(block).succs() {
                self.worklist.push(*succ);
            }
        }

        Ok(stats)
    }

    /// Backward dataflow is part of the interface but has no client yet
    pub fn backward<V: DataflowVisitor>(
        &mut self,
        _program: &mut Program,
        _func: FuncId,
        _visitor: &mut V,
        _result: &mut DataflowResult<V::Value>,
        _init: &V::Value,
    ) -> Result<DataflowStats> {
        Err(Error::Unsupported("backward dataflow"))
    }
}
