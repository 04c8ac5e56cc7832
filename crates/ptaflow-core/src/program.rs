//! Program model
//!
//! A [`Program`] is an arena owning every function, block, instruction and
//! value of the analyzed program. Everything is referenced by small copyable
//! indices, so edges between blocks of different functions (added by the
//! interprocedural resolver) never dangle.
//!
//! The instructions of one block are laid out contiguously in the arena, which
//! lets a block describe its instructions with a pair of `begin`/`end` markers.
//! Splitting a block only moves the markers; instructions never move.

use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Function handle
    FuncId,
    "fn"
);
define_id!(
    /// Block handle
    BlockId,
    "bb"
);
define_id!(
    /// Instruction handle; also the position in the instruction arena
    InstId,
    "i"
);
define_id!(
    /// Value handle. Every value doubles as an abstract memory location.
    ValueId,
    "v"
);

/// What a value is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// The address of a function
    Function(FuncId),
    /// A global variable
    Global,
    /// A formal parameter
    Param { func: FuncId, index: usize },
    /// A local value defined inside a function
    Local { func: FuncId },
}

/// A program value
#[derive(Debug, Clone)]
pub struct Value {
    pub name: String,
    pub kind: ValueKind,
    /// Pointer-typed values take part in parameter passing
    pub is_pointer: bool,
}

impl Value {
    /// The function this value denotes, if it is a function address
    pub fn as_function(&self) -> Option<FuncId> {
        match self.kind {
            ValueKind::Function(func) => Some(func),
            _ => None,
        }
    }
}

/// Called operand of a call instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    /// Call to a named function
    Direct(FuncId),
    /// Call through a function pointer
    Indirect(ValueId),
}

/// Instruction kinds understood by the analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    /// `dest = *ptr`
    Load { dest: ValueId, ptr: ValueId },
    /// `*ptr = value`
    Store { ptr: ValueId, value: ValueId },
    /// `dest = callee(args...)`
    Call {
        dest: Option<ValueId>,
        callee: Callee,
        args: Vec<ValueId>,
    },
    /// Anything the analysis does not interpret
    Other,
}

/// A single instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstKind,
    /// Source line (0 when unknown)
    pub line: u32,
}

impl Instruction {
    pub fn new(kind: InstKind, line: u32) -> Self {
        Self { kind, line }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, InstKind::Call { .. })
    }
}

/// A procedure. Functions without blocks are declarations.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// The value holding this function's address
    pub value: ValueId,
    pub params: Vec<ValueId>,
    pub(crate) blocks: Vec<BlockId>,
    pub(crate) entry: Option<BlockId>,
    pub(crate) exit: Option<BlockId>,
}

impl Function {
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn exit(&self) -> Option<BlockId> {
        self.exit
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A straight-line range of instructions inside one function
#[derive(Debug, Clone)]
pub struct Block {
    pub func: FuncId,
    pub label: String,
    pub(crate) begin: InstId,
    pub(crate) end: InstId,
    pub(crate) succs: BTreeSet<BlockId>,
    pub(crate) preds: BTreeSet<BlockId>,
    pub(crate) is_exit: bool,
}

impl Block {
    pub fn begin(&self) -> InstId {
        self.begin
    }

    /// One past the last instruction
    pub fn end(&self) -> InstId {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end.0 - self.begin.0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Instructions in program order
    pub fn insts(&self) -> impl DoubleEndedIterator<Item = InstId> + ExactSizeIterator {
        (self.begin.0..self.end.0).map(InstId)
    }

    pub fn last_inst(&self) -> Option<InstId> {
        if self.is_empty() {
            None
        } else {
            Some(InstId(self.end.0 - 1))
        }
    }

    pub fn succs(&self) -> &BTreeSet<BlockId> {
        &self.succs
    }

    pub fn preds(&self) -> &BTreeSet<BlockId> {
        &self.preds
    }

    pub fn is_exit(&self) -> bool {
        self.is_exit
    }
}

/// The analyzed program
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub(crate) values: Vec<Value>,
    pub(crate) functions: Vec<Function>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) insts: Vec<Instruction>,
    pub(crate) by_name: HashMap<String, FuncId>,
}

impl Program {
    /// # panic: if `id` does not belong to this program
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    /// # panic: if `id` does not belong to this program
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// # panic: if `id` does not belong to this program
    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.index()]
    }

    /// # panic: if `id` does not belong to this program
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn value_name(&self, id: ValueId) -> &str {
        &self.value(id).name
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    /// Look up a function, failing with [`Error::UnknownFunction`]
    pub fn require_function(&self, name: &str) -> Result<FuncId> {
        self.function_by_name(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }

    /// Find a value visible inside `func` by name: locals and parameters
    /// first, then globals and functions.
    pub fn find_value(&self, func: Option<FuncId>, name: &str) -> Option<ValueId> {
        let mut global = None;
        for (index, value) in self.values.iter().enumerate() {
            if value.name != name {
                continue;
            }
            let id = ValueId(index as u32);
            match value.kind {
                ValueKind::Local { func: owner } | ValueKind::Param { func: owner, .. } => {
                    if Some(owner) == func {
                        return Some(id);
                    }
                }
                ValueKind::Global | ValueKind::Function(_) => {
                    global.get_or_insert(id);
                }
            }
        }
        global
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len() as u32).map(FuncId)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn blocks_of(&self, func: FuncId) -> &[BlockId] {
        &self.function(func).blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Total number of successor edges
    pub fn edge_count(&self) -> usize {
        self.blocks.iter().map(|b| b.succs.len()).sum()
    }

    /// The block whose range contains `inst`
    pub fn block_of_inst(&self, inst: InstId) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.begin <= inst && inst < b.end)
            .map(|i| BlockId(i as u32))
    }

    /// Install the edge `from -> to` (and its inverse). Returns false if it
    /// already existed.
    pub fn add_succ(&mut self, from: BlockId, to: BlockId) -> bool {
        let inserted = self.blocks[from.index()].succs.insert(to);
        self.blocks[to.index()].preds.insert(from);
        inserted
    }

    /// Same edge as [`Program::add_succ`], named from the successor's side
    pub fn add_pred(&mut self, block: BlockId, pred: BlockId) -> bool {
        self.add_succ(pred, block)
    }

    /// Move the instructions of `block` starting at `at` into a new block of
    /// the same function.
    ///
    /// The new block takes over all successors of `block` and becomes its
    /// only successor; exit status moves along. `at` may equal the block's
    /// end, which opens an empty suffix block.
    pub fn split(&mut self, block: BlockId, at: InstId) -> Result<BlockId> {
        let (func, begin, end, label, is_exit) = {
            let b = self.block(block);
            (b.func, b.begin, b.end, b.label.clone(), b.is_exit)
        };
        if at <= begin || at > end {
            return Err(Error::SplitOutOfRange {
                block: label,
                at: at.0,
                begin: begin.0,
                end: end.0,
            });
        }

        let new_id = BlockId(self.blocks.len() as u32);
        let succs = std::mem::take(&mut self.blocks[block.index()].succs);
        for succ in &succs {
            let preds = &mut self.blocks[succ.index()].preds;
            preds.remove(&block);
            preds.insert(new_id);
        }

        let serial = self.function(func).blocks.len();
        self.blocks.push(Block {
            func,
            label: format!("{}.{}", label, serial),
            begin: at,
            end,
            succs,
            preds: BTreeSet::new(),
            is_exit,
        });
        self.functions[func.index()].blocks.push(new_id);

        let original = &mut self.blocks[block.index()];
        original.end = at;
        original.is_exit = false;
        self.add_succ(block, new_id);

        if is_exit {
            self.functions[func.index()].exit = Some(new_id);
        }
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;

    /// entry: [other, other, other] -> tail: [other]
    fn straight_line() -> (Program, FuncId, BlockId, BlockId) {
        let mut b = ProgramBuilder::new();
        let f = b.add_function("f", &[]);
        let entry = b.add_block(f, "entry");
        b.push(entry, InstKind::Other, 1);
        b.push(entry, InstKind::Other, 2);
        b.push(entry, InstKind::Other, 3);
        let tail = b.add_block(f, "tail");
        b.push(tail, InstKind::Other, 4);
        b.add_edge(entry, tail);
        let program = b.finish().unwrap();
        (program, f, entry, tail)
    }

    #[test]
    fn test_split_preserves_range() {
        let (mut program, _, entry, tail) = straight_line();
        let original: Vec<_> = program.block(entry).insts().collect();
        let at = InstId(program.block(entry).begin().0 + 1);

        let suffix = program.split(entry, at).unwrap();

        let head: Vec<_> = program.block(entry).insts().collect();
        let rest: Vec<_> = program.block(suffix).insts().collect();
        assert_eq!(head.len(), 1);
        assert_eq!(rest.len(), 2);
        let joined: Vec<_> = head.iter().chain(rest.iter()).copied().collect();
        assert_eq!(joined, original);

        // Edges: entry -> suffix -> tail
        assert_eq!(program.block(entry).succs().iter().copied().collect::<Vec<_>>(), vec![suffix]);
        assert!(program.block(suffix).succs().contains(&tail));
        assert!(program.block(tail).preds().contains(&suffix));
        assert!(!program.block(tail).preds().contains(&entry));
        assert_eq!(program.block(suffix).func, program.block(entry).func);
    }

    #[test]
    fn test_split_moves_exit() {
        let (mut program, f, _, tail) = straight_line();
        assert_eq!(program.function(f).exit(), Some(tail));
        let end = program.block(tail).end();

        let cont = program.split(tail, end).unwrap();

        assert!(program.block(cont).is_empty());
        assert!(program.block(cont).is_exit());
        assert!(!program.block(tail).is_exit());
        assert_eq!(program.function(f).exit(), Some(cont));
        assert!(program.function(f).blocks().contains(&cont));
    }

    #[test]
    fn test_split_out_of_range() {
        let (mut program, _, entry, tail) = straight_line();
        let begin = program.block(entry).begin();
        assert!(matches!(
            program.split(entry, begin),
            Err(Error::SplitOutOfRange { .. })
        ));
        // An instruction of another block is outside the range
        let foreign = program.block(tail).end();
        assert!(program.split(entry, foreign).is_err());
    }

    #[test]
    fn test_add_edge_idempotent() {
        let (mut program, _, entry, tail) = straight_line();
        let before = program.edge_count();
        assert!(!program.add_succ(entry, tail));
        assert!(!program.add_pred(tail, entry));
        assert_eq!(program.edge_count(), before);
        assert!(program.add_succ(tail, entry));
        assert!(program.block(entry).preds().contains(&tail));
    }
}
