//! Program descriptions
//!
//! A serializable description of a program's CFG, loaded from YAML or JSON:
//!
//! ```yaml
//! globals:
//!   - { name: table }
//! functions:
//!   - name: malloc
//!     params: [{ name: n, pointer: false }]
//!   - name: main
//!     blocks:
//!       - label: entry
//!         succs: [exit]
//!         insts:
//!           - { op: store, ptr: fp, value: handler, line: 3 }
//!           - { op: call, callee: fp, args: [table], line: 4 }
//!       - label: exit
//! ```
//!
//! Operand names resolve to the function's own parameters and locals first,
//! then to globals and functions. A name that resolves to nothing becomes an
//! implicit pointer-typed local of the enclosing function.

use crate::builder::ProgramBuilder;
use crate::error::{Error, Result};
use crate::program::{BlockId, Callee, FuncId, InstKind, Program, ValueId, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

fn yes() -> bool {
    true
}

/// A named, optionally pointer-typed variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDesc {
    pub name: String,
    #[serde(default = "yes")]
    pub pointer: bool,
}

/// One instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstDesc {
    Load {
        dest: String,
        ptr: String,
        #[serde(default)]
        line: u32,
    },
    Store {
        ptr: String,
        value: String,
        #[serde(default)]
        line: u32,
    },
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        dest: Option<String>,
        #[serde(default)]
        line: u32,
    },
    Other {
        #[serde(default)]
        line: u32,
    },
}

/// One basic block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDesc {
    pub label: String,
    #[serde(default)]
    pub succs: Vec<String>,
    #[serde(default)]
    pub insts: Vec<InstDesc>,
}

/// One function; without blocks it is a declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDesc {
    pub name: String,
    #[serde(default)]
    pub params: Vec<VarDesc>,
    #[serde(default)]
    pub locals: Vec<VarDesc>,
    /// Label of the exit block; inferred when absent
    #[serde(default)]
    pub exit: Option<String>,
    #[serde(default)]
    pub blocks: Vec<BlockDesc>,
}

/// A whole program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramDesc {
    #[serde(default)]
    pub globals: Vec<VarDesc>,
    #[serde(default)]
    pub functions: Vec<FunctionDesc>,
}

impl ProgramDesc {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a description file; `.json` files are parsed as JSON, everything
    /// else as YAML
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Build the described program
    pub fn build(&self) -> Result<Program> {
        let mut builder = ProgramBuilder::new();

        for global in &self.globals {
            builder.add_global(&global.name, global.pointer);
        }

        // Declare every function first so calls can refer forward
        let mut funcs = Vec::with_capacity(self.functions.len());
        for func in &self.functions {
            let params: Vec<(&str, bool)> = func
                .params
                .iter()
                .map(|p| (p.name.as_str(), p.pointer))
                .collect();
            funcs.push(builder.add_function(&func.name, &params));
        }

        for (desc, &func) in self.functions.iter().zip(&funcs) {
            for local in &desc.locals {
                builder.add_local(func, &local.name, local.pointer);
            }
            build_body(&mut builder, desc, func)?;
        }

        builder.finish()
    }
}

fn build_body(builder: &mut ProgramBuilder, desc: &FunctionDesc, func: FuncId) -> Result<()> {
    let mut labels: HashMap<&str, BlockId> = HashMap::new();
    for block in &desc.blocks {
        let id = builder.add_block(func, &block.label);
        if labels.insert(block.label.as_str(), id).is_some() {
            return Err(Error::Parse(format!(
                "duplicate block label '{}' in '{}'",
                block.label, desc.name
            )));
        }
    }

    let block_id = |label: &str| {
        labels.get(label).copied().ok_or_else(|| {
            Error::Parse(format!("unknown block '{}' in '{}'", label, desc.name))
        })
    };

    for block in &desc.blocks {
        let id = block_id(&block.label)?;
        for succ in &block.succs {
            builder.add_edge(id, block_id(succ)?);
        }
        for inst in &block.insts {
            let (kind, line) = lower_inst(builder, func, inst);
            builder.push(id, kind, line);
        }
    }

    if let Some(exit) = &desc.exit {
        builder.set_exit(func, block_id(exit)?);
    }
    Ok(())
}

fn operand(builder: &mut ProgramBuilder, func: FuncId, name: &str) -> ValueId {
    match builder.lookup(func, name) {
        Some(value) => value,
        None => builder.add_local(func, name, true),
    }
}

fn lower_inst(builder: &mut ProgramBuilder, func: FuncId, inst: &InstDesc) -> (InstKind, u32) {
    match inst {
        InstDesc::Load { dest, ptr, line } => {
            let dest = operand(builder, func, dest);
            let ptr = operand(builder, func, ptr);
            (InstKind::Load { dest, ptr }, *line)
        }
        InstDesc::Store { ptr, value, line } => {
            let ptr = operand(builder, func, ptr);
            let value = operand(builder, func, value);
            (InstKind::Store { ptr, value }, *line)
        }
        InstDesc::Call {
            callee,
            args,
            dest,
            line,
        } => {
            // Lookup prefers locals, so a local shadowing a function is indirect
            let callee = operand(builder, func, callee);
            let callee = match builder.value(callee).kind {
                ValueKind::Function(target) => Callee::Direct(target),
                _ => Callee::Indirect(callee),
            };
            let args = args.iter().map(|a| operand(builder, func, a)).collect();
            let dest = dest.as_ref().map(|d| operand(builder, func, d));
            (InstKind::Call { dest, callee, args }, *line)
        }
        InstDesc::Other { line } => (InstKind::Other, *line),
    }
}
