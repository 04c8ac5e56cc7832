//! Call-site normalization
//!
//! Splits blocks right after every call that may introduce call-graph edges,
//! so that each block ends in at most one such call. The resolver relies on
//! this to find the block that follows a call.

use crate::callgraph::CallClassifier;
use ptaflow_core::{BlockId, InstId, InstKind, Program, Result};

/// Split every block after its non-final interesting calls. Returns the
/// number of splits performed.
pub fn split_call_sites(program: &mut Program, classifier: &CallClassifier) -> Result<usize> {
    let mut splits = 0;
    let blocks: Vec<BlockId> = program.block_ids().collect();

    for block in blocks {
        let mut current = block;
        loop {
            let Some(at) = next_split_point(program, classifier, current) else {
                break;
            };
            current = program.split(current, at)?;
            splits += 1;
        }
    }

    tracing::info!(splits, "normalized call sites");
    Ok(splits)
}

/// The instruction right after the first interesting call of `block` that
/// is not the block's last instruction
fn next_split_point(program: &Program, classifier: &CallClassifier, block: BlockId) -> Option<InstId> {
    let last = program.block(block).last_inst()?;
    program
        .block(block)
        .insts()
        .filter(|&inst| inst != last)
        .find(|&inst| match &program.inst(inst).kind {
            InstKind::Call { callee, .. } => classifier.classify(program, callee).is_interesting(),
            _ => false,
        })
        .map(|inst| InstId(inst.0 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptaflow_core::{AnalysisConfig, Callee, ProgramBuilder};

    #[test]
    fn test_split_after_each_call() {
        let mut b = ProgramBuilder::new();
        let g = b.add_function("g", &[]);
        let malloc = b.add_function("malloc", &[]);
        let intrinsic = b.add_function("llvm.dbg.value", &[]);
        let main = b.add_function("main", &[]);
        let fp = b.add_local(main, "fp", true);
        let entry = b.add_block(main, "entry");
        b.push(entry, InstKind::Other, 1);
        b.call(entry, Callee::Direct(g), &[], 2);
        b.call(entry, Callee::Direct(malloc), &[], 3);
        b.call(entry, Callee::Direct(intrinsic), &[], 4);
        b.call(entry, Callee::Indirect(fp), &[], 5);
        b.push(entry, InstKind::Other, 6);
        b.call(entry, Callee::Direct(g), &[], 7);
        let mut program = b.finish().unwrap();
        let total = program.block(entry).len();
        let classifier = CallClassifier::new(&AnalysisConfig::default()).unwrap();

        let splits = split_call_sites(&mut program, &classifier).unwrap();
        // After `g` (line 2) and after `fp` (line 5); the final call stays put
        assert_eq!(splits, 2);

        let blocks = program.blocks_of(main).to_vec();
        assert_eq!(blocks.len(), 3);
        let lines: Vec<Vec<u32>> = blocks
            .iter()
            .map(|b| program.block(*b).insts().map(|i| program.inst(i).line).collect())
            .collect();
        assert_eq!(lines, vec![vec![1, 2], vec![3, 4, 5], vec![6, 7]]);
        assert_eq!(blocks.iter().map(|b| program.block(*b).len()).sum::<usize>(), total);

        // entry -> split1 -> split2, exit moved to the last piece
        assert_eq!(program.block(blocks[0]).succs().len(), 1);
        assert!(program.block(blocks[0]).succs().contains(&blocks[1]));
        assert!(program.block(blocks[1]).succs().contains(&blocks[2]));
        assert_eq!(program.function(main).exit(), Some(blocks[2]));

        // Idempotent once normalized
        assert_eq!(split_call_sites(&mut program, &classifier).unwrap(), 0);
    }

    #[test]
    fn test_no_calls_no_splits() {
        let mut b = ProgramBuilder::new();
        let main = b.add_function("main", &[]);
        let entry = b.add_block(main, "entry");
        b.push(entry, InstKind::Other, 1);
        b.push(entry, InstKind::Other, 2);
        let mut program = b.finish().unwrap();
        let classifier = CallClassifier::new(&AnalysisConfig::default()).unwrap();
        assert_eq!(split_call_sites(&mut program, &classifier).unwrap(), 0);
        assert_eq!(program.blocks_of(main).len(), 1);
    }
}
