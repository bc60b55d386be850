//! Innergraph CLI - personal knowledge graphs from unstructured text

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use innergraph_core::config::Config;
use innergraph_core::domain::context::{CrawlOptions, RetrievalMode};
use innergraph_core::domain::graph::GraphStore;
use innergraph_core::domain::ingestion::IngestDocument;
use innergraph_core::domain::{Collaborators, KnowledgeGraphService, ServiceSettings};
use innergraph_core::infrastructure::SqliteGraphStore;
use innergraph_core::llm::{
    LlmClient, LlmEmbeddingProvider, LlmEntityExtractor, LlmResponseGenerator,
};
use innergraph_core::storage::{Database, DatabaseConfig};
use innergraph_core::Error;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "innergraph")]
#[command(author, version, about = "Personal knowledge graphs from unstructured text", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum ModeArg {
    #[default]
    Graph,
    Vector,
}

impl From<ModeArg> for RetrievalMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Graph => RetrievalMode::Graph,
            ModeArg::Vector => RetrievalMode::VectorOnly,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tenants
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },

    /// Ingest text into a tenant's graph
    Ingest {
        /// Tenant ID
        tenant: String,
        /// Text to ingest (omit when using --file)
        text: Option<String>,
        /// Read the text from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Document title
        #[arg(short, long)]
        title: Option<String>,
        /// Metadata entries as key=value
        #[arg(short, long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Answer a question from a tenant's graph
    Ask {
        tenant: String,
        query: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Show the context retrieved for a question without generating an answer
    Context {
        tenant: String,
        query: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Delete graph data
    Wipe {
        /// Wipe one tenant's nodes and relationships
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        tenant: Option<String>,
        /// Wipe every tenant's data and rebuild the vector index
        #[arg(long)]
        all: bool,
    },

    /// Show graph statistics
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(clap::Args, Debug)]
struct RetrievalArgs {
    /// Retrieval mode
    #[arg(short, long, value_enum, default_value_t = ModeArg::Graph)]
    mode: ModeArg,
    /// Number of similarity seeds (defaults to retrieval.top_k)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
    /// Expansion depth from each seed (defaults to retrieval.max_hops)
    #[arg(long)]
    max_hops: Option<u32>,
}

impl RetrievalArgs {
    fn options(&self, defaults: CrawlOptions) -> CrawlOptions {
        let mut options = defaults;
        if let Some(top_k) = self.top_k {
            options = options.with_top_k(top_k);
        }
        if let Some(max_hops) = self.max_hops {
            options = options.with_max_hops(max_hops);
        }
        options
    }
}

#[derive(Subcommand)]
enum TenantAction {
    /// Register a tenant
    Create { id: String },
    /// Delete a tenant and everything it owns
    Delete {
        id: String,
        #[arg(long)]
        force: bool,
    },
    /// List tenants
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show the configuration file path
    Path,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value: no '=' found in '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid key=value: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("innergraph=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        report(&e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Tenant { action } => {
            let config = Config::load()?;
            cmd_tenant(&open_store(&config).await?, action, format, quiet).await
        }

        Commands::Ingest {
            tenant,
            text,
            file,
            title,
            meta,
        } => {
            let content = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?,
                (None, None) => anyhow::bail!("Provide the text to ingest or --file <path>"),
            };

            let mut document = IngestDocument::new(content);
            if let Some(title) = title {
                document = document.with_title(title);
            }
            for (key, value) in meta {
                document = document.with_metadata(key, value);
            }

            let config = Config::load()?;
            let svc = open_service(&config).await?;
            cmd_ingest(&svc, &tenant, &document, format, quiet).await
        }

        Commands::Ask {
            tenant,
            query,
            retrieval,
        } => {
            let config = Config::load()?;
            let svc = open_service(&config).await?;
            let options = retrieval.options(svc.settings().crawl);
            cmd_ask(&svc, &tenant, &query, retrieval.mode.into(), &options, format).await
        }

        Commands::Context {
            tenant,
            query,
            retrieval,
        } => {
            let config = Config::load()?;
            let svc = open_service(&config).await?;
            let options = retrieval.options(svc.settings().crawl);
            cmd_context(&svc, &tenant, &query, retrieval.mode.into(), &options, format).await
        }

        Commands::Wipe { tenant, all } => {
            let config = Config::load()?;
            cmd_wipe(&open_store(&config).await?, tenant.as_deref(), all, quiet).await
        }

        Commands::Stats => {
            let config = Config::load()?;
            cmd_stats(&open_store(&config).await?, format).await
        }

        Commands::Config { action } => cmd_config(action, quiet),

        Commands::Doctor => cmd_doctor(quiet).await,
    }
}

/// Print an error with its code and a suggested fix when one is known
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(core) => {
            eprintln!("Error [{}]: {}", core.code(), core);
            if let Some(suggestion) = core.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", err),
    }
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteGraphStore> {
    let db = Database::new(DatabaseConfig::from_settings(&config.database)).await?;
    Ok(SqliteGraphStore::from_config(db.pool().clone(), &config.graph)?)
}

async fn open_service(config: &Config) -> anyhow::Result<KnowledgeGraphService<SqliteGraphStore>> {
    let store = open_store(config).await?;
    let client = LlmClient::from_config(&config.llm)?;

    let collaborators = Collaborators {
        extractor: Arc::new(LlmEntityExtractor::new(client.clone())),
        embedder: Arc::new(LlmEmbeddingProvider::new(
            client.clone(),
            config.graph.embedding_dimensions,
        )),
        generator: Arc::new(LlmResponseGenerator::new(client)),
    };

    Ok(KnowledgeGraphService::new(
        Arc::new(store),
        collaborators,
        ServiceSettings::from_config(config),
    )?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_tenant(
    store: &SqliteGraphStore,
    action: TenantAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match action {
        TenantAction::Create { id } => {
            let created = store.create_tenant(&id).await?;
            if !quiet {
                if created {
                    println!("Tenant '{}' created.", id);
                } else {
                    println!("Tenant '{}' already exists.", id);
                }
            }
        }
        TenantAction::Delete { id, force } => {
            if !force {
                anyhow::bail!(
                    "Deleting tenant '{}' removes its whole graph. Re-run with --force to confirm.",
                    id
                );
            }
            if store.delete_tenant(&id).await? {
                info!(tenant = %id, "Tenant deleted");
                if !quiet {
                    println!("Tenant '{}' deleted.", id);
                }
            } else {
                return Err(Error::TenantNotFound(id).into());
            }
        }
        TenantAction::List => {
            let tenants = store.list_tenants().await?;
            if format == OutputFormat::Json {
                return print_json(&tenants);
            }
            if tenants.is_empty() {
                if !quiet {
                    println!("No tenants found.");
                    println!("\nCreate one with: innergraph tenant create <id>");
                }
            } else {
                if !quiet {
                    println!("Tenants:");
                }
                for tenant in tenants {
                    println!(
                        "  {} (created {})",
                        tenant.id,
                        tenant.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn cmd_ingest(
    svc: &KnowledgeGraphService<SqliteGraphStore>,
    tenant: &str,
    document: &IngestDocument,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let outcome = svc.ingest(tenant, document).await?;

    if format == OutputFormat::Json {
        return print_json(&outcome);
    }
    if quiet {
        return Ok(());
    }

    if outcome.entities_extracted == 0 {
        println!("No entities found; the graph is unchanged.");
        return Ok(());
    }

    println!("Ingested '{}' into tenant '{}':", document.title, tenant);
    println!("  Entities extracted:     {}", outcome.entities_extracted);
    println!("  Nodes merged:           {}", outcome.nodes_merged);
    println!("  Embeddings written:     {}", outcome.embeddings_written);
    println!("  Relationships merged:   {}", outcome.relationships_merged);
    if outcome.embeddings_failed > 0 {
        println!("  Embeddings failed:      {}", outcome.embeddings_failed);
    }
    if outcome.relationships_skipped > 0 {
        println!("  Relationships skipped:  {}", outcome.relationships_skipped);
    }
    if outcome.candidates_dropped > 0 {
        println!("  Candidates dropped:     {}", outcome.candidates_dropped);
    }
    Ok(())
}

async fn cmd_ask(
    svc: &KnowledgeGraphService<SqliteGraphStore>,
    tenant: &str,
    query: &str,
    mode: RetrievalMode,
    options: &CrawlOptions,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let answer = svc.answer_with(tenant, query, mode, options).await?;

    if format == OutputFormat::Json {
        return print_json(&answer);
    }

    if answer.degraded {
        warn!(tenant = %tenant, "Answer generation failed");
        println!("(No answer could be generated. Retrieved context follows.)\n");
        println!("{}", answer.context.render());
    } else {
        println!("{}", answer.text);
    }
    Ok(())
}

async fn cmd_context(
    svc: &KnowledgeGraphService<SqliteGraphStore>,
    tenant: &str,
    query: &str,
    mode: RetrievalMode,
    options: &CrawlOptions,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let context = match mode {
        RetrievalMode::Graph => svc.build_context(tenant, query, options).await?,
        RetrievalMode::VectorOnly => svc.build_vector_context(tenant, query, options).await?,
    };

    if format == OutputFormat::Json {
        return print_json(&context);
    }

    if context.is_empty() {
        println!("No context found for this query.");
    } else {
        println!("{}", context.render());
    }
    Ok(())
}

async fn cmd_wipe(
    store: &SqliteGraphStore,
    tenant: Option<&str>,
    all: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    match (tenant, all) {
        (_, true) => {
            store.wipe_all().await?;
            if !quiet {
                println!("All graph data wiped; vector index rebuilt.");
            }
        }
        (Some(tenant), false) => {
            if !store.tenant_exists(tenant).await? {
                return Err(Error::TenantNotFound(tenant.to_string()).into());
            }
            store.wipe(tenant).await?;
            if !quiet {
                println!("Graph data for tenant '{}' wiped.", tenant);
            }
        }
        (None, false) => anyhow::bail!("Specify --tenant <id> or --all"),
    }
    Ok(())
}

async fn cmd_stats(store: &SqliteGraphStore, format: OutputFormat) -> anyhow::Result<()> {
    let stats = store.stats().await?;

    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    println!("Graph Statistics");
    println!("================");
    println!("  Tenants:        {}", stats.tenants);
    println!("  Nodes:          {}", stats.nodes);
    println!("  Relationships:  {}", stats.relationships);
    println!("  Embedded nodes: {}", stats.embedded_nodes);
    println!("  Index entries:  {}", stats.index_entries);
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Innergraph Health Check");
        println!("=======================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            Some(config)
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            None
        }
    };

    if let Some(config) = &config {
        match config.llm.redacted_api_key() {
            Ok(Some(redacted)) => {
                if !quiet {
                    println!("[OK] API Key: Configured ({})", redacted);
                }
            }
            Ok(None) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] API Key: Not configured");
                    println!("     Set INNERGRAPH_API_KEY or OPENAI_API_KEY environment variable");
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] API Key: Error - {}", e);
                }
            }
        }

        let db_config = DatabaseConfig::from_settings(&config.database);
        match Database::new(db_config).await {
            Ok(db) => match db.health_check().await {
                Ok(()) => {
                    if !quiet {
                        println!("[OK] Database: {}", db.path().display());
                    }
                    match db.migration_status().await {
                        Ok(status) if !quiet => println!(
                            "[OK] Schema: version {} of {}",
                            status.current_version, status.target_version
                        ),
                        Ok(_) => {}
                        Err(e) => {
                            all_ok = false;
                            if !quiet {
                                println!("[!!] Schema: Error - {:#}", e);
                            }
                        }
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Database: Error - {}", e);
                    }
                }
            },
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Database: Error - {:#}", e);
                }
            }
        }
    }

    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => {
                println!("[!!] Config file: Error - {}", e);
            }
        }

        println!();
        if all_ok {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("source = journal").unwrap(),
            ("source".to_string(), "journal".to_string())
        );
        assert_eq!(
            parse_key_val("url=https://a.b/?x=1").unwrap(),
            ("url".to_string(), "https://a.b/?x=1".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_ask_args_parse() {
        let cli = Cli::try_parse_from([
            "innergraph", "ask", "u1", "what do I like?", "--mode", "vector", "-k", "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                tenant,
                query,
                retrieval,
            } => {
                assert_eq!(tenant, "u1");
                assert_eq!(query, "what do I like?");
                assert_eq!(retrieval.mode, ModeArg::Vector);

                let options = retrieval.options(CrawlOptions::default());
                assert_eq!(options.top_k, 3);
                assert_eq!(options.max_hops, CrawlOptions::default().max_hops);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_ingest_args_collect_metadata() {
        let cli = Cli::try_parse_from([
            "innergraph", "ingest", "u1", "hello", "--title", "Notes", "--meta", "a=1", "--meta",
            "b=2",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest { meta, title, .. } => {
                assert_eq!(title.as_deref(), Some("Notes"));
                assert_eq!(meta.len(), 2);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_wipe_requires_target() {
        assert!(Cli::try_parse_from(["innergraph", "wipe"]).is_err());
        assert!(Cli::try_parse_from(["innergraph", "wipe", "--tenant", "u1", "--all"]).is_err());
        assert!(Cli::try_parse_from(["innergraph", "wipe", "--all"]).is_ok());
    }

    #[test]
    fn test_ingest_text_conflicts_with_file() {
        assert!(
            Cli::try_parse_from(["innergraph", "ingest", "u1", "text", "--file", "a.txt"]).is_err()
        );
    }
}
