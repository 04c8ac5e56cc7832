//! ptaflow CLI
//!
//! Command-line interface for points-to and call target analysis.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ptaflow_analysis::{report, AnalysisResult, Analyzer};
use ptaflow_core::desc::ProgramDesc;
use ptaflow_core::{Config, FuncId, Program};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ptaflow")]
#[command(author, version, about = "Flow-sensitive points-to analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve call targets of a program description
    Analyze {
        /// Program description (YAML or JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Entry function, may be repeated (default: config entry or `main`)
        #[arg(short, long = "entry", value_name = "NAME")]
        entries: Vec<String>,

        /// Analyze from every function with a body
        #[arg(long, conflicts_with = "entries")]
        all: bool,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also print the in/out points-to state of every block
        #[arg(long)]
        dump_states: bool,
    },

    /// Print the CFG after call-site normalization
    Cfg {
        /// Program description (YAML or JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            file,
            entries,
            all,
            config,
            format,
            output,
            dump_states,
        } => {
            let config = load_config(config.as_deref())?;
            cmd_analyze(&file, &config, &entries, all, format, output.as_deref(), dump_states)?;
        }
        Commands::Cfg { file, config } => {
            let config = load_config(config.as_deref())?;
            cmd_cfg(&file, &config)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn load_program(file: &Path) -> Result<Program> {
    let desc = ProgramDesc::load(file)
        .with_context(|| format!("failed to read program {}", file.display()))?;
    let program = desc
        .build()
        .with_context(|| format!("invalid program {}", file.display()))?;
    tracing::info!(
        file = %file.display(),
        functions = program.functions().count(),
        blocks = program.num_blocks(),
        "loaded program"
    );
    Ok(program)
}

fn resolve_entries(program: &Program, config: &Config, names: &[String]) -> Result<Vec<FuncId>> {
    let names: Vec<&str> = if names.is_empty() {
        vec![config.entry.as_deref().unwrap_or("main")]
    } else {
        names.iter().map(String::as_str).collect()
    };

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let Some(func) = program.function_by_name(name) else {
            bail!("entry function '{}' not found", name);
        };
        if program.function(func).is_declaration() {
            bail!("entry function '{}' has no body", name);
        }
        entries.push(func);
    }
    Ok(entries)
}

#[allow(clippy::too_many_arguments)]
fn cmd_analyze(
    file: &Path,
    config: &Config,
    entries: &[String],
    all: bool,
    format: Format,
    output: Option<&Path>,
    dump_states: bool,
) -> Result<()> {
    let mut program = load_program(file)?;
    let analyzer = Analyzer::new(&config.analysis)?;

    let result = if all {
        analyzer.analyze_all(&mut program)?
    } else {
        let entries = resolve_entries(&program, config, entries)?;
        analyzer.run(&mut program, &entries)?
    };

    let rendered = match format {
        Format::Json => {
            let mut summary = serde_json::to_value(result.summary(&program))?;
            if dump_states {
                summary["states"] = serde_json::Value::String(report::render_states(&program, &result.states));
            }
            serde_json::to_string_pretty(&summary)?
        }
        Format::Text => render_text(file, &program, &result, dump_states),
    };

    if let Some(out_path) = output {
        std::fs::write(out_path, &rendered)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        println!("   Output written to: {}", out_path.display());
    } else {
        print!("{}", rendered);
    }

    Ok(())
}

fn render_text(file: &Path, program: &Program, result: &AnalysisResult, dump_states: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("📂 Analyzed: {}\n", file.display()));
    out.push_str(&format!(
        "   {} functions, {} blocks ({} from call-site splits)\n",
        program.functions().count(),
        program.num_blocks(),
        result.splits
    ));
    out.push_str(&format!(
        "   {} block visits, {} updates\n",
        result.stats.visits, result.stats.updates
    ));

    out.push_str("\n📞 Call targets:\n");
    if result.report.is_empty() {
        out.push_str("   (none)\n");
    }
    for line in result.report.to_string().lines() {
        out.push_str(&format!("   {}\n", line));
    }

    let edges = report::render_call_edges(program, &result.call_graph);
    if !edges.is_empty() {
        out.push_str("\n🔗 Call edges:\n");
        for line in edges.lines() {
            out.push_str(&format!("   {}\n", line));
        }
    }

    if dump_states {
        out.push_str("\n📊 Block states:\n");
        out.push_str(&report::render_states(program, &result.states));
    }
    out
}

fn cmd_cfg(file: &Path, config: &Config) -> Result<()> {
    let mut program = load_program(file)?;
    let analyzer = Analyzer::new(&config.analysis)?;
    let splits = analyzer.normalize(&mut program)?;

    println!("📂 {} ({} call-site splits)", file.display(), splits);
    print!("{}", report::render_cfg(&program));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze_args() {
        let cli = Cli::try_parse_from([
            "ptaflow", "analyze", "prog.yaml", "-e", "main", "-e", "init", "--format", "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                entries, format, all, ..
            } => {
                assert_eq!(entries, vec!["main".to_string(), "init".to_string()]);
                assert_eq!(format, Format::Json);
                assert!(!all);
            }
            _ => panic!("expected analyze"),
        }

        assert!(Cli::try_parse_from(["ptaflow", "analyze", "prog.yaml", "--all", "-e", "main"]).is_err());
    }

    #[test]
    fn test_resolve_entries() {
        let program = ProgramDesc::from_yaml_str(
            r#"
functions:
  - name: ext
  - name: boot
    blocks:
      - label: entry
"#,
        )
        .unwrap()
        .build()
        .unwrap();

        let config = Config {
            entry: Some("boot".into()),
            ..Config::default()
        };
        let entries = resolve_entries(&program, &config, &[]).unwrap();
        assert_eq!(entries, vec![program.function_by_name("boot").unwrap()]);

        assert!(resolve_entries(&program, &config, &["ext".to_string()]).is_err());
        assert!(resolve_entries(&program, &Config::default(), &[]).is_err());
    }
}
