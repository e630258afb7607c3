//! SchemaSense CLI entry point.
//!
//! This binary is the composition root. It:
//!
//! 1. loads `schemasense.toml` (engine tuning and LLM access points),
//! 2. wires `tracing-subscriber` with a JSON layer and, when
//!    `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OpenTelemetry OTLP exporter,
//! 3. builds the in-memory store and the LLM factory and injects them into
//!    the column pipeline,
//! 4. runs one command and prints the resulting column features as JSON.

mod config;
mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use llm::ConfiguredLlmFactory;
use memstore::InMemoryStore;
use nodes::{
    ApprovedChange, ClassifierRegistry, ColumnPipeline, IncrementalEnrichmentService,
    PipelinePhase, PipelinePorts, WorkerPool,
};
use ontology::{DatasourceId, ProjectId, SchemaTable};
use tracing::info;

use crate::config::CliConfig;

#[derive(Debug, Parser)]
#[command(name = "schemasense", version, about = "Column semantics extraction for relational schemas")]
struct Cli {
    /// Configuration file.
    #[arg(long, short, env = "SCHEMASENSE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct Target {
    /// JSON file holding the datasource's tables, columns and statistics.
    #[arg(long)]
    schema: PathBuf,

    /// Defaults to a fresh identifier.
    #[arg(long)]
    project: Option<ProjectId>,

    /// Defaults to the datasource id of the first table in the schema file.
    #[arg(long)]
    datasource: Option<DatasourceId>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full six-phase column classification pipeline.
    Classify {
        #[command(flatten)]
        target: Target,
    },
    /// Classify the columns touched by one approved schema change.
    Enrich {
        #[command(flatten)]
        target: Target,

        /// The change as JSON, e.g. `{"kind":"new_column","table":"orders","column":"paid_at"}`.
        #[arg(long)]
        change: String,
    },
}

struct Workspace {
    store: InMemoryStore,
    llm: Arc<ConfiguredLlmFactory>,
    project: ProjectId,
    datasource: DatasourceId,
}

fn load_tables(path: &Path) -> anyhow::Result<Vec<SchemaTable>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing schema {}", path.display()))
}

fn workspace(config: &CliConfig, target: &Target) -> anyhow::Result<Workspace> {
    let tables = load_tables(&target.schema)?;
    let datasource = target
        .datasource
        .or_else(|| tables.first().map(|t| t.datasource_id))
        .context("schema file has no tables and no --datasource was given")?;
    let project = target.project.unwrap_or_else(ProjectId::new_random);

    let store = InMemoryStore::new();
    store.load_schema(project, datasource, tables);
    Ok(Workspace {
        store,
        llm: Arc::new(ConfiguredLlmFactory::new(config.llm.clone())),
        project,
        datasource,
    })
}

async fn classify(config: &CliConfig, target: &Target) -> anyhow::Result<serde_json::Value> {
    let ws = workspace(config, target)?;
    let store = Arc::new(ws.store.clone());
    let ports = PipelinePorts {
        schema: store.clone(),
        llm: ws.llm.clone(),
        metadata: store.clone(),
        ontologies: store.clone(),
        questions: store,
    };
    let pipeline = ColumnPipeline::new(
        ports,
        Arc::new(ClassifierRegistry::preloaded()),
        Arc::new(WorkerPool::new(config.engine.worker_concurrency)),
    )
    .with_temperature(config.engine.llm_temperature)
    .with_progress(Arc::new(|phase: PipelinePhase, done: usize, total: usize| {
        info!(phase = %phase, done, total, "pipeline progress");
    }));

    let summary = pipeline.run(ws.project, ws.datasource).await?;
    info!(
        profiled = summary.columns_profiled,
        classified = summary.columns_classified,
        persisted = summary.persisted.persisted,
        questions = summary.questions_created,
        "classification finished"
    );
    Ok(serde_json::json!({
        "project_id": ws.project,
        "datasource_id": ws.datasource,
        "columns_profiled": summary.columns_profiled,
        "columns_classified": summary.columns_classified,
        "enums_analyzed": summary.enums_analyzed,
        "foreign_keys_resolved": summary.foreign_keys_resolved,
        "tables_validated": summary.tables_validated,
        "persisted": summary.persisted.persisted,
        "persist_failures": summary.persisted.failed,
        "questions": ws.store.questions(ws.project),
        "features": summary.features,
    }))
}

async fn enrich(
    config: &CliConfig,
    target: &Target,
    change: &str,
) -> anyhow::Result<serde_json::Value> {
    let change: ApprovedChange = serde_json::from_str(change).context("parsing --change")?;
    let ws = workspace(config, target)?;
    let store = Arc::new(ws.store.clone());
    let service = IncrementalEnrichmentService::new(
        store.clone(),
        ws.llm.clone(),
        store,
        Arc::new(ClassifierRegistry::preloaded()),
    )
    .with_temperature(config.engine.llm_temperature);

    let features = service.apply(ws.project, ws.datasource, &change).await?;
    Ok(serde_json::json!({
        "project_id": ws.project,
        "datasource_id": ws.datasource,
        "change": change,
        "features": features,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init()?;
    let config = CliConfig::load(cli.config.as_deref())?;

    let output = match &cli.command {
        Command::Classify { target } => classify(&config, target).await?,
        Command::Enrich { target, change } => enrich(&config, target, change).await?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
