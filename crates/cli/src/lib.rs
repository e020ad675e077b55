use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use context_engine::{
    AnalysisCompletion, ContextEngine, EngineConfig, FileLifecycle, ProjectContext,
    RelatedCodeQuery, RelatedReference,
};
use context_graph::{GraphDiagnostics, GraphNodeInfo, GraphStatistics, NodeId};
use context_parser::{Language, LanguageParser, ParseError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "context-engine")]
#[command(about = "Structural model and dependency graph of a codebase", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Worker count (overrides config and CONTEXT_ENGINE_WORKERS)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Compact JSON instead of pretty-printed
    #[arg(long, global = true)]
    pub compact: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a project and print completion and graph statistics
    Analyze(ProjectArgs),

    /// Show dependencies and dependents of one node
    Deps(DepsArgs),

    /// List circular dependencies
    Cycles(ProjectArgs),

    /// Find code related to a query
    Related(RelatedArgs),

    /// Parse one file and print the parse result
    Parse(ParseArgs),
}

#[derive(Args, Debug)]
pub struct ProjectArgs {
    /// Project directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct DepsArgs {
    /// Project directory
    pub path: PathBuf,

    /// Qualified node id, e.g. `src/Main.java::Main.run`
    pub id: String,
}

#[derive(Args, Debug)]
pub struct RelatedArgs {
    /// Project directory
    pub path: PathBuf,

    /// Name or attribute text to search for
    pub query: String,

    /// Maximum number of results
    #[arg(long)]
    pub limit: Option<usize>,

    /// Graph expansion depth around direct matches
    #[arg(long)]
    pub depth: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Source file to parse
    pub file: PathBuf,

    /// Language id; detected from the extension when omitted
    #[arg(long)]
    pub language: Option<String>,
}

#[derive(Serialize)]
struct AnalyzeOutput {
    root: PathBuf,
    version: u64,
    completion: AnalysisCompletion,
    statistics: GraphStatistics,
    diagnostics: GraphDiagnostics,
    files: BTreeMap<String, FileLifecycle>,
    errors: BTreeMap<String, Vec<ParseError>>,
}

#[derive(Serialize)]
struct DepsOutput {
    node: GraphNodeInfo,
    dependencies: Vec<NodeId>,
    dependents: Vec<NodeId>,
}

#[derive(Serialize)]
struct CyclesOutput {
    count: usize,
    cycles: Vec<Vec<NodeId>>,
}

#[derive(Serialize)]
struct RelatedOutput {
    query: String,
    results: Vec<RelatedReference>,
}

/// Engine configuration: file (or defaults), then env, then flags
pub fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

async fn analyzed(
    config: EngineConfig,
    path: &Path,
) -> Result<(ContextEngine, Arc<ProjectContext>)> {
    let engine = ContextEngine::new(config).context("Failed to create engine")?;
    let context = engine
        .analyze_project(path)
        .await
        .with_context(|| format!("Failed to analyze {}", path.display()))?;
    Ok((engine, context))
}

/// Run one subcommand and return its JSON document
pub async fn execute(command: Commands, config: EngineConfig) -> Result<serde_json::Value> {
    let value = match command {
        Commands::Analyze(args) => {
            let (_, context) = analyzed(config, &args.path).await?;
            let files = context
                .files()
                .iter()
                .map(|(path, state)| (path.clone(), state.lifecycle))
                .collect();
            let errors = context
                .parse_results()
                .filter(|result| !result.is_successful())
                .map(|result| (result.file_path().to_string(), result.errors().to_vec()))
                .collect();
            serde_json::to_value(AnalyzeOutput {
                root: args.path,
                version: context.version(),
                completion: context.completion(),
                statistics: context.graph().statistics(),
                diagnostics: context.graph().diagnostics(),
                files,
                errors,
            })?
        }
        Commands::Deps(args) => {
            let (_, context) = analyzed(config, &args.path).await?;
            let graph = context.graph();
            let node = graph.require(&args.id)?.clone();
            serde_json::to_value(DepsOutput {
                node,
                dependencies: graph.dependencies(&args.id).into_iter().collect(),
                dependents: graph.dependents(&args.id).into_iter().collect(),
            })?
        }
        Commands::Cycles(args) => {
            let (_, context) = analyzed(config, &args.path).await?;
            let cycles = context.graph().detect_cycles();
            serde_json::to_value(CyclesOutput {
                count: cycles.len(),
                cycles,
            })?
        }
        Commands::Related(args) => {
            let (engine, _) = analyzed(config, &args.path).await?;
            let mut query = RelatedCodeQuery::new(args.query.clone());
            if let Some(limit) = args.limit {
                query = query.with_max_results(limit);
            }
            if let Some(depth) = args.depth {
                query = query.with_neighbor_depth(depth);
            }
            serde_json::to_value(RelatedOutput {
                query: args.query,
                results: engine.find_related_code(&query),
            })?
        }
        Commands::Parse(args) => {
            let text = tokio::fs::read_to_string(&args.file)
                .await
                .with_context(|| format!("Failed to read {}", args.file.display()))?;
            let language = match args.language {
                Some(language) => language,
                None => Language::from_path(&args.file)
                    .map(|l| l.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            };
            let parser = LanguageParser::new(config.parser_config())?;
            let file_path = args.file.to_string_lossy();
            let result = parser.parse(&text, &language, &file_path).await?;
            serde_json::to_value(result.as_ref())?
        }
    };
    Ok(value)
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = load_config(&cli)?;
    log::debug!("Engine config: {config:?}");
    let compact = cli.compact;
    let value = execute(cli.command, config).await?;
    let text = if compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    print_stdout(&text)
}
