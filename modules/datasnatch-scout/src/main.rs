use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use datasnatch_archive::{Fetcher, FetcherConfig, HttpTransport, Store};
use datasnatch_common::{load_config, AppConfig, FileConfig};
use datasnatch_graph::{connected_groups, GraphBuilder, GraphStats};
use datasnatch_scout::enrichment::Capabilities;
use datasnatch_scout::infra::{GazetteerResolver, HttpPhoneVerifier, RunLog};
use datasnatch_scout::traits::PhoneVerificationCapability;
use datasnatch_scout::{AdaptiveParser, AuthenticityScorer, EnrichmentStage, ScanPipeline};

#[derive(Parser)]
#[command(name = "datasnatch", about = "Profile ingestion, scoring and relationship graph")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, parse, enrich, score and store the given URLs, then rebuild the graph.
    Scan {
        #[arg(long = "url")]
        urls: Vec<String>,

        /// File with one URL per line. Blank lines and `#` comments are ignored.
        #[arg(long)]
        urls_file: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Rebuild the relationship graph from stored scored profiles.
    Graph {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Re-score stored profiles with the current weight table.
    Score {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// TOML config file. Overrides DATASNATCH_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory. Overrides DATA_DIR and `[store] data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

struct Settings {
    app: AppConfig,
    file: FileConfig,
    data_dir: PathBuf,
}

impl Settings {
    fn load(args: &CommonArgs) -> Result<Self> {
        let app = AppConfig::from_env()?;
        let file = match args.config.as_ref().or(app.config_path.as_ref()) {
            Some(path) => load_config(path)?,
            None => FileConfig::default(),
        };
        let data_dir = args
            .data_dir
            .clone()
            .or_else(|| file.store.data_dir.clone())
            .unwrap_or_else(|| app.data_dir.clone());
        Ok(Self { app, file, data_dir })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("datasnatch=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Scan {
            urls,
            urls_file,
            common,
        } => scan(urls, urls_file, &Settings::load(&common)?).await,
        Command::Graph { common } => graph(&Settings::load(&common)?).await,
        Command::Score { common } => rescore(&Settings::load(&common)?).await,
    }
}

async fn scan(mut urls: Vec<String>, urls_file: Option<PathBuf>, settings: &Settings) -> Result<()> {
    if let Some(path) = urls_file {
        urls.extend(read_urls(&path).await?);
    }
    if urls.is_empty() {
        anyhow::bail!("No URLs given. Use --url or --urls-file.");
    }

    let file = &settings.file;
    let store = Arc::new(Store::open(&settings.data_dir).await?);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(HttpTransport::new(&file.fetch)?);
    let fetcher = Arc::new(
        Fetcher::new(transport, FetcherConfig::from(&file.fetch))
            .with_cancel(cancel_rx.clone())
            .with_events(events_tx),
    );

    let phone_verifier = match &settings.app.phone_api_url {
        Some(url) => {
            let verifier = HttpPhoneVerifier::new(
                url.clone(),
                settings.app.phone_api_key.clone(),
                file.fetch.request_timeout(),
            )?;
            Some(Arc::new(verifier) as Arc<dyn PhoneVerificationCapability>)
        }
        None => None,
    };
    let gazetteer = GazetteerResolver::new(file.analysis.places.clone());
    info!(places = gazetteer.len(), verifier = phone_verifier.is_some(), "Capabilities configured");
    let capabilities = Capabilities {
        recognition: None,
        phone_verifier,
        location_resolver: Some(Arc::new(gazetteer)),
    };

    let enrichment = EnrichmentStage::standard(
        &file.enrichers,
        &file.analysis,
        fetcher.clone(),
        store.clone(),
        capabilities,
    );
    let parser = AdaptiveParser::from_config(&file.parser)?;
    info!(strategies = ?parser.strategy_names(), enrichers = ?enrichment.kinds(), "Pipeline ready");

    let mut pipeline = ScanPipeline::new(
        fetcher,
        Arc::new(parser),
        Arc::new(enrichment),
        Arc::new(AuthenticityScorer::new(file.scoring.clone())),
        store,
        GraphBuilder::new(file.graph.clone(), file.analysis.default_country_code.clone()),
    )
    .with_cancel(cancel_rx)
    .with_fetch_events(events_rx);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, draining in-flight pages");
            let _ = cancel_tx.send(true);
        }
    });

    let mut run_log = RunLog::new(uuid::Uuid::new_v4().to_string());
    let stats = pipeline.run(urls, &mut run_log).await;
    println!("{stats}");

    let path = run_log.save(&settings.data_dir, &stats).await?;
    info!(path = %path.display(), "Run log written");
    Ok(())
}

async fn graph(settings: &Settings) -> Result<()> {
    let store = Store::open(&settings.data_dir).await?;
    let loaded = store.load_scored_profiles().await?;
    for corrupt in &loaded.corrupt {
        warn!(error = %corrupt, "Corrupt scored profile skipped");
    }

    let builder = GraphBuilder::new(
        settings.file.graph.clone(),
        settings.file.analysis.default_country_code.clone(),
    );
    let edges = builder.build(&loaded.records);
    store.put_edges(&edges).await?;

    let groups = connected_groups(&edges);
    let largest = groups.iter().map(Vec::len).max().unwrap_or(0);
    info!(groups = groups.len(), largest, "Connected groups");
    println!("{}", GraphStats::from_edges(loaded.records.len(), &edges));
    println!("Connected groups: {} (largest {largest})", groups.len());
    Ok(())
}

async fn rescore(settings: &Settings) -> Result<()> {
    let store = Store::open(&settings.data_dir).await?;
    let loaded = store.load_scored_profiles().await?;
    let scorer = AuthenticityScorer::new(settings.file.scoring.clone());

    let (mut scored, mut unscored) = (0u32, 0u32);
    for mut record in loaded.records {
        match scorer.score_record(&mut record) {
            Ok(_) => scored += 1,
            Err(e) => {
                warn!(profile = record.id.as_str(), error = %e, "Profile left unscored");
                unscored += 1;
            }
        }
        store.put_scored_profile(&record).await?;
    }

    info!(scored, unscored, corrupt = loaded.corrupt.len(), "Re-score complete");
    println!("Re-scored {scored} profiles ({unscored} unscored, {} corrupt skipped)", loaded.corrupt.len());
    Ok(())
}

async fn read_urls(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read URL list: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
