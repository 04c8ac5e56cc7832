//! Incremental construction of a [`Program`]
//!
//! The builder is the boundary to whatever produces the CFG: it collects
//! functions, values and blocks in any order and lays the instructions out
//! contiguously per block when [`ProgramBuilder::finish`] is called.

use crate::error::{Error, Result};
use crate::program::*;
use std::collections::{BTreeSet, HashMap};

struct BlockDraft {
    func: FuncId,
    label: String,
    insts: Vec<Instruction>,
    succs: BTreeSet<BlockId>,
}

/// Builds a [`Program`]
#[derive(Default)]
pub struct ProgramBuilder {
    values: Vec<Value>,
    functions: Vec<Function>,
    blocks: Vec<BlockDraft>,
    exits: HashMap<FuncId, BlockId>,
    by_name: HashMap<String, FuncId>,
    /// Problems found while building, reported by `finish`
    errors: Vec<String>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_value(&mut self, name: &str, kind: ValueKind, is_pointer: bool) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value {
            name: name.to_string(),
            kind,
            is_pointer,
        });
        id
    }

    /// Add a global variable
    pub fn add_global(&mut self, name: &str, is_pointer: bool) -> ValueId {
        self.new_value(name, ValueKind::Global, is_pointer)
    }

    /// Add a function with `(name, is_pointer)` parameters. It stays a
    /// declaration until a block is added to it.
    pub fn add_function(&mut self, name: &str, params: &[(&str, bool)]) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        if self.by_name.insert(name.to_string(), id).is_some() {
            self.errors.push(format!("duplicate function '{}'", name));
        }
        let value = self.new_value(name, ValueKind::Function(id), true);
        let params = params
            .iter()
            .enumerate()
            .map(|(index, (param, is_pointer))| {
                self.new_value(param, ValueKind::Param { func: id, index }, *is_pointer)
            })
            .collect();
        self.functions.push(Function {
            name: name.to_string(),
            value,
            params,
            blocks: Vec::new(),
            entry: None,
            exit: None,
        });
        id
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    /// The value holding the address of `func`
    pub fn function_value(&self, func: FuncId) -> ValueId {
        self.functions[func.index()].value
    }

    pub fn param(&self, func: FuncId, index: usize) -> ValueId {
        self.functions[func.index()].params[index]
    }

    /// Add a local value of `func`
    pub fn add_local(&mut self, func: FuncId, name: &str, is_pointer: bool) -> ValueId {
        self.new_value(name, ValueKind::Local { func }, is_pointer)
    }

    /// Find a value visible inside `func`: locals and parameters first, then
    /// globals and functions
    pub fn lookup(&self, func: FuncId, name: &str) -> Option<ValueId> {
        let mut global = None;
        for (index, value) in self.values.iter().enumerate() {
            if value.name != name {
                continue;
            }
            match value.kind {
                ValueKind::Local { func: owner } | ValueKind::Param { func: owner, .. }
                    if owner == func =>
                {
                    return Some(ValueId(index as u32));
                }
                ValueKind::Global | ValueKind::Function(_) => {
                    global.get_or_insert(ValueId(index as u32));
                }
                _ => {}
            }
        }
        global
    }

    /// Append a block to `func`. The first block of a function is its entry.
    pub fn add_block(&mut self, func: FuncId, label: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockDraft {
            func,
            label: label.to_string(),
            insts: Vec::new(),
            succs: BTreeSet::new(),
        });
        self.functions[func.index()].blocks.push(id);
        id
    }

    pub fn push(&mut self, block: BlockId, kind: InstKind, line: u32) {
        self.blocks[block.index()]
            .insts
            .push(Instruction::new(kind, line));
    }

    pub fn load(&mut self, block: BlockId, dest: ValueId, ptr: ValueId, line: u32) {
        self.push(block, InstKind::Load { dest, ptr }, line);
    }

    pub fn store(&mut self, block: BlockId, ptr: ValueId, value: ValueId, line: u32) {
        self.push(block, InstKind::Store { ptr, value }, line);
    }

    pub fn call(&mut self, block: BlockId, callee: Callee, args: &[ValueId], line: u32) {
        self.push(
            block,
            InstKind::Call {
                dest: None,
                callee,
                args: args.to_vec(),
            },
            line,
        );
    }

    /// Intraprocedural control-flow edge
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if self.blocks[from.index()].func != self.blocks[to.index()].func {
            self.errors.push(format!(
                "edge {} -> {} crosses function boundaries",
                self.blocks[from.index()].label,
                self.blocks[to.index()].label
            ));
            return;
        }
        self.blocks[from.index()].succs.insert(to);
    }

    /// Designate the exit block of `func`
    pub fn set_exit(&mut self, func: FuncId, block: BlockId) {
        self.exits.insert(func, block);
    }

    /// Lay out the instructions and produce the program
    pub fn finish(mut self) -> Result<Program> {
        if !self.errors.is_empty() {
            return Err(Error::Builder(self.errors.join("; ")));
        }

        let num_values = self.values.len();
        let mut insts = Vec::new();
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for draft in &self.blocks {
            for inst in &draft.insts {
                check_operands(&inst.kind, num_values, self.functions.len())?;
            }
            let begin = InstId(insts.len() as u32);
            insts.extend(draft.insts.iter().cloned());
            blocks.push(Block {
                func: draft.func,
                label: draft.label.clone(),
                begin,
                end: InstId(insts.len() as u32),
                succs: draft.succs.clone(),
                preds: BTreeSet::new(),
                is_exit: false,
            });
        }
        for (index, draft) in self.blocks.iter().enumerate() {
            for succ in &draft.succs {
                blocks[succ.index()].preds.insert(BlockId(index as u32));
            }
        }

        for (index, func) in self.functions.iter_mut().enumerate() {
            let Some(&entry) = func.blocks.first() else {
                continue;
            };
            func.entry = Some(entry);
            let exit = match self.exits.get(&FuncId(index as u32)) {
                Some(&exit) => exit,
                None => {
                    let mut sinks = func
                        .blocks
                        .iter()
                        .copied()
                        .filter(|b| blocks[b.index()].succs.is_empty());
                    match (sinks.next(), sinks.next()) {
                        (Some(exit), None) => exit,
                        _ => return Err(Error::NoExitBlock(func.name.clone())),
                    }
                }
            };
            if blocks[exit.index()].func != FuncId(index as u32) {
                return Err(Error::Builder(format!(
                    "exit block of '{}' belongs to another function",
                    func.name
                )));
            }
            blocks[exit.index()].is_exit = true;
            func.exit = Some(exit);
        }

        tracing::debug!(
            functions = self.functions.len(),
            blocks = blocks.len(),
            instructions = insts.len(),
            "program built"
        );

        Ok(Program {
            values: self.values,
            functions: self.functions,
            blocks,
            insts,
            by_name: self.by_name,
        })
    }
}

fn check_operands(kind: &InstKind, num_values: usize, num_functions: usize) -> Result<()> {
    let check = |v: &ValueId| {
        if v.index() < num_values {
            Ok(())
        } else {
            Err(Error::UnknownValue(v.to_string()))
        }
    };
    match kind {
        InstKind::Load { dest, ptr } => {
            check(dest)?;
            check(ptr)
        }
        InstKind::Store { ptr, value } => {
            check(ptr)?;
            check(value)
        }
        InstKind::Call { dest, callee, args } => {
            if let Some(dest) = dest {
                check(dest)?;
            }
            match callee {
                Callee::Direct(f) if f.index() >= num_functions => {
                    return Err(Error::UnknownFunction(f.to_string()));
                }
                Callee::Indirect(v) => check(v)?,
                _ => {}
            }
            args.iter().try_for_each(check)
        }
        InstKind::Other => Ok(()),
    }
}
