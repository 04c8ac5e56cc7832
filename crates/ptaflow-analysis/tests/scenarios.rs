//! End-to-end scenarios: program descriptions in, per-line call report out

use pretty_assertions::assert_eq;
use ptaflow_analysis::{report, Analyzer};
use ptaflow_core::desc::ProgramDesc;
use ptaflow_core::{AnalysisConfig, Config, LoadMode, Program};
use std::collections::BTreeSet;
use std::io::Write;

const DISPATCH: &str = r#"
globals:
  - { name: handlers }
functions:
  - name: malloc
    params: [{ name: n, pointer: false }]
  - name: llvm.dbg.value
  - name: on_read
    params: [{ name: buf }]
    blocks:
      - label: entry
        insts:
          - { op: store, ptr: buf, value: handlers, line: 21 }
  - name: on_write
    params: [{ name: buf }]
    blocks:
      - label: entry
        insts:
          - { op: other, line: 31 }
  - name: main
    locals: [{ name: size, pointer: false }]
    blocks:
      - label: entry
        succs: [read, write]
        insts:
          - { op: call, callee: llvm.dbg.value, line: 2 }
          - { op: call, callee: malloc, args: [size], dest: data, line: 3 }
          - { op: store, ptr: data, value: handlers, line: 4 }
      - label: read
        succs: [dispatch]
        insts:
          - { op: store, ptr: fp, value: on_read, line: 6 }
      - label: write
        succs: [dispatch]
        insts:
          - { op: store, ptr: fp, value: on_write, line: 8 }
      - label: dispatch
        insts:
          - { op: call, callee: fp, args: [data], line: 10 }
          - { op: load, dest: out, ptr: data, line: 11 }
"#;

fn load(text: &str) -> Program {
    ProgramDesc::from_yaml_str(text).unwrap().build().unwrap()
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn dispatch_report() {
    let mut program = load(DISPATCH);
    let analyzer = Analyzer::new(&AnalysisConfig::default()).unwrap();
    let result = analyzer.analyze(&mut program, "main").unwrap();

    // Intrinsics never show up, allocators keep their label
    assert_eq!(
        result.report.to_string(),
        "line 3: malloc\nline 10: on_read, on_write\n"
    );
    assert_eq!(result.call_graph.num_edges(), 2);
    assert_eq!(
        result.points_to_at_exit(&program, "on_read", "buf").unwrap(),
        set(&["handlers"])
    );
    assert_eq!(
        result.points_to_at_exit(&program, "on_write", "buf").unwrap(),
        set(&["handlers"])
    );

    let edges = report::render_call_edges(&program, &result.call_graph);
    assert_eq!(edges, "main -> on_read @ line 10\nmain -> on_write @ line 10\n");
}

#[test]
fn dispatch_normalizes_after_indirect_call() {
    let mut program = load(DISPATCH);
    let analyzer = Analyzer::new(&AnalysisConfig::default()).unwrap();
    let result = analyzer.analyze(&mut program, "main").unwrap();

    // Only the indirect call in `dispatch` is followed by more code
    assert_eq!(result.splits, 1);
    let cfg = report::render_cfg(&program);
    assert!(cfg.contains("declare malloc"));
    assert!(cfg.contains("  dispatch: lines [10] -> [on_read::entry, on_write::entry, "));
    assert!(cfg.contains("on_read::entry"));
}

#[test]
fn dispatch_states_render() {
    let mut program = load(DISPATCH);
    let analyzer = Analyzer::new(&AnalysisConfig::default()).unwrap();
    let result = analyzer.analyze(&mut program, "main").unwrap();

    let dump = report::render_states(&program, &result.states);
    assert!(dump.starts_with("on_read ("));
    assert!(dump.contains("main ("));
    assert!(dump.contains("fp -> {on_read, on_write}"));
}

#[test]
fn contents_mode_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "entry: main").unwrap();
    writeln!(file, "analysis:").unwrap();
    writeln!(file, "  load_mode: contents").unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.analysis.load_mode, LoadMode::Contents);

    let mut program = load(
        r#"
functions:
  - name: main
    blocks:
      - label: entry
        insts:
          - { op: store, ptr: p, value: v, line: 1 }
          - { op: load, dest: r, ptr: p, line: 2 }
"#,
    );
    let entry = config.entry.as_deref().unwrap_or("main");
    let result = Analyzer::new(&config.analysis)
        .unwrap()
        .analyze(&mut program, entry)
        .unwrap();
    assert_eq!(result.points_to_at_exit(&program, "main", "r").unwrap(), set(&["v"]));
}

#[test]
fn program_from_json_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{"functions": [
            {{"name": "h", "params": [{{"name": "q"}}],
              "blocks": [{{"label": "entry", "insts": [{{"op": "other", "line": 30}}]}}]}},
            {{"name": "main", "blocks": [{{"label": "entry", "insts": [
                {{"op": "store", "ptr": "p", "value": "a", "line": 1}},
                {{"op": "call", "callee": "h", "args": ["p"], "line": 5}},
                {{"op": "store", "ptr": "p", "value": "b", "line": 6}},
                {{"op": "call", "callee": "h", "args": ["p"], "line": 8}}
            ]}}]}}
        ]}}"#
    )
    .unwrap();

    let mut program = ProgramDesc::load(file.path()).unwrap().build().unwrap();
    let result = Analyzer::new(&AnalysisConfig::default())
        .unwrap()
        .analyze_all(&mut program)
        .unwrap();
    assert_eq!(result.report.targets(5), Some(&set(&["h"])));
    assert_eq!(result.report.targets(8), Some(&set(&["h"])));
    assert_eq!(result.points_to_at_exit(&program, "h", "q").unwrap(), set(&["a", "b"]));

    let json = serde_json::to_value(result.summary(&program)).unwrap();
    assert_eq!(json["calls"]["5"], serde_json::json!(["h"]));
    assert_eq!(json["edges"].as_array().map(Vec::len), Some(2));
}
