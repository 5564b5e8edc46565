//! featurestack CLI
//!
//! Validates, plans and dry-runs feature-platform declaration files.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod render;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{WrapErr, bail};
use color_eyre::Result;
use featurestack_core::ResourceKind;
use featurestack_plan::{CompiledPlan, Compiler, CompilerConfig, Declarations};
use featurestack_runtime::{Emitter, EmitterConfig, InMemoryBackend};
use render::Format;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "featurestack")]
#[command(about = "featurestack - dependency planning for feature-platform definitions", long_about = None)]
struct Cli {
    /// Log level for featurestack crates (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Input {
    /// Path to a JSON declaration document
    #[arg(short, long)]
    file: PathBuf,

    /// Do not warn about tables nothing consumes
    #[arg(long)]
    allow_unused_tables: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a declaration file without producing a plan
    Validate {
        #[command(flatten)]
        input: Input,
    },
    /// Print the ordered emission plan
    Plan {
        #[command(flatten)]
        input: Input,
    },
    /// Emit the plan to a backend
    Apply {
        #[command(flatten)]
        input: Input,
        /// Emit against an in-memory backend instead of a real one
        #[arg(long)]
        dry_run: bool,
        /// Maximum backend calls in flight
        #[arg(long, default_value_t = 1)]
        max_in_flight: usize,
        /// Source name the dry-run backend should treat as existing
        #[arg(long = "existing-source", value_name = "NAME")]
        existing_sources: Vec<String>,
    },
}

fn init_tracing(level: Option<&str>, json: bool) {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("featurestack={}", level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("featurestack=info")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load(path: &Path) -> Result<Declarations> {
    let text = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    let declarations = Declarations::from_json(&text).wrap_err_with(|| format!("parsing {}", path.display()))?;
    tracing::info!(file = %path.display(), definitions = declarations.len(), "loaded declarations");
    Ok(declarations)
}

fn compiler(input: &Input) -> Compiler {
    Compiler::new(CompilerConfig::default().with_warn_unused_tables(!input.allow_unused_tables))
}

fn compile(input: &Input) -> Result<CompiledPlan> {
    let declarations = load(&input.file)?;
    Ok(compiler(input).compile(&declarations)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref(), cli.log_json);

    match cli.command {
        Commands::Validate { input } => {
            let declarations = load(&input.file)?;
            let result = compiler(&input).compile(&declarations);
            print!("{}", render::validation(cli.format, &result)?);
            let plan = result?;
            tracing::info!(definitions = plan.len(), warnings = plan.warnings().len(), "validation passed");
            Ok(())
        }
        Commands::Plan { input } => {
            let plan = compile(&input)?;
            print!("{}", render::plan(cli.format, &plan)?);
            tracing::info!(steps = plan.len(), "plan rendered");
            Ok(())
        }
        Commands::Apply {
            input,
            dry_run,
            max_in_flight,
            existing_sources,
        } => {
            if !dry_run {
                bail!("no provisioning backend is configured; rerun with --dry-run");
            }
            let plan = compile(&input)?;
            let backend = existing_sources
                .into_iter()
                .fold(InMemoryBackend::new(), |backend, name| {
                    backend.with_existing(ResourceKind::Source, name)
                });
            let emitter = Emitter::new(EmitterConfig::default().with_max_in_flight(max_in_flight));

            let result = emitter.emit(&plan, &backend).await;
            print!("{}", render::apply(cli.format, &result)?);
            let outcome = result?;
            tracing::info!(emitted = outcome.len(), "apply finished");
            Ok(())
        }
    }
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
    fn test_apply_arguments() {
        let cli = Cli::try_parse_from([
            "featurestack",
            "apply",
            "--file",
            "defs.json",
            "--dry-run",
            "--max-in-flight",
            "4",
            "--existing-source",
            "warehouse",
            "--existing-source",
            "lake",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.format, Format::Json);
        let Commands::Apply {
            dry_run,
            max_in_flight,
            existing_sources,
            input,
        } = cli.command
        else {
            panic!("expected apply");
        };
        assert!(dry_run);
        assert_eq!(max_in_flight, 4);
        assert_eq!(existing_sources, vec!["warehouse", "lake"]);
        assert_eq!(input.file, PathBuf::from("defs.json"));
    }

    const TPCDS: &str = include_str!("../../../demos/tpcds.json");

    #[test]
    fn test_load_reads_declaration_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/tpcds.json");
        let declarations = load(&path).unwrap();
        assert_eq!(declarations.len(), Declarations::from_json(TPCDS).unwrap().len());

        let missing = load(Path::new("does/not/exist.json")).unwrap_err();
        assert!(missing.to_string().starts_with("reading does/not/exist.json"));
    }

    #[tokio::test]
    async fn test_tpcds_demo_dry_run() {
        let declarations = Declarations::from_json(TPCDS).unwrap();
        let plan = Compiler::default().compile(&declarations).unwrap();
        assert_eq!(plan.len(), declarations.len());
        assert!(plan.warnings().is_empty());

        let ids: Vec<&str> = plan.ids().into_iter().map(|id| id.as_str()).collect();
        let at = |id: &str| ids.iter().position(|x| *x == id).unwrap();
        assert!(at("tpcds_date_dim") < at("tpcds_store_sales"));
        assert!(at("tpcds_store_max_spend_last_28_days") < at("tpcds_store_big_spender_last_28_days"));
        assert_eq!(ids.last(), Some(&"tpcds_ext"));

        let backend = InMemoryBackend::new().with_existing(ResourceKind::Source, "tpcds_scale_1");
        let emitter = Emitter::new(EmitterConfig::default().with_max_in_flight(3));
        let outcome = emitter.emit(&plan, &backend).await.unwrap();
        assert_eq!(outcome.len(), plan.len());
    }
}
